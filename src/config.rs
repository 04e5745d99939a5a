use std::path::PathBuf;

use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

/// Bounds enforced by the mutation operations.
#[derive(Debug, Clone, PartialEq, Eq, StructOpt)]
pub struct Limits {
    /// Longest accepted note, in characters
    #[structopt(long, default_value = "100", env = "PINTS_MAX_NOTE_LEN")]
    pub max_note_len: usize,

    /// Longest accepted group name, in characters
    #[structopt(long, default_value = "50", env = "PINTS_MAX_GROUP_NAME_LEN")]
    pub max_group_name_len: usize,

    /// Fewest members a group may be left with after a removal
    #[structopt(long, default_value = "2", env = "PINTS_MIN_MEMBERS")]
    pub min_members: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_note_len: 100,
            max_group_name_len: 50,
            min_members: 2,
        }
    }
}

/// Options shared by every binary.
#[derive(Debug, StructOpt)]
pub struct GlobalOptions {
    /// Directory holding one `<group>.json` per group
    #[structopt(long, env = "PINTS_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Group id, also the file stem of its document
    #[structopt(long, short, env = "PINTS_GROUP", default_value = "pub")]
    pub group: String,

    #[structopt(flatten)]
    pub limits: Limits,
}

impl GlobalOptions {
    pub fn photos_dir(&self) -> PathBuf {
        self.data_dir.join("photos")
    }
}

/// Logs go to stderr so rendered views stay clean on stdout. `RUST_LOG`
/// overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}
