//! The `vitrine` binary.

use clap::Parser;
use std::process::ExitCode;
use vitrine_cli::{CliArgs, VitrineApp};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let app = match VitrineApp::from_args("vitrine", &args) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match app.run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
