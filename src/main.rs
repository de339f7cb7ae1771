mod cli;
mod console;
mod daemon;

use clap::Parser;

use crate::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = daemon::run(cli) {
        eprintln!("dbgpd: {:#}", e);
        std::process::exit(1);
    }
}
