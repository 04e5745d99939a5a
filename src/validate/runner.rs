use std::path::Path;

use anyhow::{bail, Result};
use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};

use crate::{
    config::Limits,
    group::GroupState,
    validate::{Trace, ValidationError, ALL_VALIDATORS},
};

pub struct Runner;

/// Byte range of the first JSON string literal equal to `anchor` in `input`.
fn locate(input: &str, anchor: &str) -> Option<std::ops::Range<usize>> {
    let needle = serde_json::to_string(anchor).ok()?;
    let start = input.find(&needle)?;

    Some(start..start + needle.len())
}

impl Runner {
    pub fn run_all(filename: &Path, input: &str, state: &GroupState, limits: &Limits) -> Result<()> {
        let mut failed = vec![];

        for (name, validator) in ALL_VALIDATORS {
            print!("Running validator: {}...", name);

            match validator(state, limits) {
                Ok(_) => {
                    println!(" OK");
                }
                Err(ValidationError::WithTrace(traces)) => {
                    println!(" ERROR");

                    for t in traces {
                        Self::report(filename, input, t)?;
                    }

                    failed.push(name.fg(Color::Green).to_string());
                }
            }
        }

        if !failed.is_empty() {
            bail!("Validation failed: {}.", failed.join(", "));
        }

        Ok(())
    }

    fn report(filename: &Path, input: &str, t: Trace) -> Result<()> {
        let span = t.anchor.as_deref().and_then(|a| locate(input, a));
        let report = Report::build(ReportKind::Error, (), span.clone().map(|s| s.start).unwrap_or(0));

        let message_parts = vec![
            Some(t.message),
            t.expected
                .map(|x| format!("expected `{}`", x).fg(Color::Red).to_string()),
            t.found.map(|f| format!("found {}", f.fg(Color::Blue))),
            Some(format!("in {}", filename.display())),
        ];

        let message = message_parts.into_iter().flatten().collect::<Vec<String>>();

        let mut report = report.with_message(message.join(", "));

        match span {
            Some(span) => {
                report = report.with_label(Label::new(span).with_message(t.details).with_color(Color::Blue));
            }
            None => {
                report = report.with_note(t.details);
            }
        }

        report.finish().eprint(Source::from(input))?;

        Ok(())
    }
}
