use clap::Parser;
use luckyhorse::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
