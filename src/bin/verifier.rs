use anyhow::Result;
use structopt::StructOpt;

use pints::{
    config::{init_tracing, GlobalOptions},
    load_group,
    store::JsonFileStore,
    utils::{Clock, SystemClock},
    validate::Runner,
};

#[derive(StructOpt)]
#[structopt(name = "pints-verify", about = "Check a stored group for integrity problems")]
pub struct Options {
    #[structopt(flatten)]
    global: GlobalOptions,
}

fn main() -> Result<()> {
    init_tracing();

    let options = Options::from_args();
    let store = JsonFileStore::new(&options.global.data_dir);
    let (path, input) = store.read_source(&options.global.group)?;
    let state = load_group(&input, SystemClock.now())?;

    println!("Validating {}...", path.display());
    Runner::run_all(&path, &input, &state, &options.global.limits)?;

    Ok(())
}
