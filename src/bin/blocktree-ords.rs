//! blocktree-ords CLI binary.

use std::process;

use blocktree_ords::cli::{args::*, commands::*};
use clap::Parser;

fn main() {
    let args = BlockTreeOrdsArgs::parse();

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
