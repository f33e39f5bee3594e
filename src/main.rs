use clap::Parser;
use etfdesk::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
