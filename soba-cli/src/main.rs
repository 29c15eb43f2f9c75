mod cli;

use std::process::ExitCode;

use clap::Parser;
use soba_core::SobaError;

fn main() -> ExitCode {
    let args = cli::Cli::parse();
    match cli::run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = e
                .downcast_ref::<SobaError>()
                .map(SobaError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}
