use clap::Parser;
use ema_screener::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
