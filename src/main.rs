use std::process::ExitCode;

use clap::Parser;
use gencanvas::cli::{self, CliArgs};
use gencanvas::logger;

fn main() -> ExitCode {
    logger::init();
    gencanvas::log_info!("GenCanvas {} starting", env!("CARGO_PKG_VERSION"));
    cli::run(CliArgs::parse())
}
