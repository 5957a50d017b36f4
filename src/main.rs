//! lanea CLI binary: all logic lives in `lanea_cli`, main.rs only maps its
//! exit code.

use std::process::ExitCode;

fn main() -> ExitCode {
    lanea_core::run()
}
