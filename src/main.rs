use clap::Parser;
use flux_qc::cli::{Args, run};
use std::process;

fn main() {
    let args = Args::parse();

    if let Err(error) = run(args) {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}
