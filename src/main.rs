//! Filewarden CLI entry point.
//!
//! Parses arguments, installs logging, dispatches to the command handler,
//! and turns errors into a sanitized message plus an exit code.

use filewarden::cli::Cli;
use filewarden::commands::{self, print_error};
use filewarden::exit_codes;
use filewarden::logging;
use filewarden::sanitize::ErrorHandler;
use serde_json::Value;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    let handler = ErrorHandler::new();

    if let Err(err) = logging::init(cli.verbose, cli.log_format) {
        let sanitized = handler.handle(&err, &Value::Null);
        print_error(&sanitized);
        return ExitCode::from(sanitized.exit_code as u8);
    }

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            let sanitized = handler.handle(&err, &Value::Null);
            print_error(&sanitized);
            ExitCode::from(sanitized.exit_code as u8)
        }
    }
}
