#![deny(clippy::all)]

use anyhow::Context;
use std::{fs, path::PathBuf, process};
use structopt::StructOpt;

/// Compiles a bracket-language source file and prints the assembly listing
/// on standard output.
#[derive(Debug, StructOpt)]
#[structopt(name = "brasm")]
struct Opt {
    /// Path to the source code file
    #[structopt(parse(from_os_str))]
    source_path: PathBuf,
}

fn run(opt: Opt) -> anyhow::Result<()> {
    let source = fs::read_to_string(&opt.source_path)
        .with_context(|| format!("Failed to read file {:?}", opt.source_path))?;
    let listing = brasm::compile(&source)?;
    println!("{}", listing);
    Ok(())
}

fn main() {
    env_logger::init();
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("{:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
