//! framecap command-line entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match framecap_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
