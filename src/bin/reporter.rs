use anyhow::Result;
use structopt::StructOpt;

use pints::{
    config::{init_tracing, GlobalOptions},
    member::Pair,
    render,
    session::Session,
    store::JsonFileStore,
    utils::SystemClock,
};

#[derive(StructOpt)]
#[structopt(name = "pints-report", about = "Show who owes who")]
pub struct Options {
    #[structopt(flatten)]
    global: GlobalOptions,

    #[structopt(subcommand)]
    reporter: Option<Reporter>,
}

#[derive(StructOpt)]
pub enum Reporter {
    /// Unpaid pints between every pair of members
    #[structopt(name = "matrix")]
    Matrix,

    /// Who owes the most
    #[structopt(name = "tally")]
    Tally,

    /// The king and the clown
    #[structopt(name = "leaderboard")]
    Leaderboard,

    /// Every pint one member has owed another
    #[structopt(name = "history")]
    History { from: String, to: String },
}

fn open(global: &GlobalOptions) -> Result<Session<JsonFileStore>> {
    Ok(Session::open(
        JsonFileStore::new(&global.data_dir),
        &global.group,
        SystemClock,
        global.limits.clone(),
    )?)
}

fn main() -> Result<()> {
    init_tracing();

    let options = Options::from_args();
    let session = open(&options.global)?;

    match options.reporter {
        Some(Reporter::Matrix) => print!("{}", render::matrix(&session.matrix())),
        Some(Reporter::Tally) => print!("{}", render::tally(&session.tallies())),
        Some(Reporter::Leaderboard) => match session.leaderboard() {
            Some(board) => print!("{}", render::leaderboard(&board)),
            None => println!("No pints owed yet."),
        },
        Some(Reporter::History { from, to }) => {
            print!("{}", render::history(&session.history(&Pair::new(from, to))))
        }
        None => {
            println!("{}\n", session.state().name);
            if let Some(board) = session.leaderboard() {
                println!("{}", render::leaderboard(&board));
            }
            println!("{}", render::matrix(&session.matrix()));
            print!("{}", render::tally(&session.tallies()));
        }
    }

    Ok(())
}
