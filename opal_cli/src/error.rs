//! Error formatting and exit-code mapping.
//!
//! Runtime and image errors are printed on stderr; the process exit code
//! distinguishes usage mistakes from execution failures.

use std::process::ExitCode;

use opal_core::RunError;
use opal_image::ImageError;

/// Successful execution.
pub const EXIT_SUCCESS: u8 = 0;
/// Runtime or image error.
pub const EXIT_ERROR: u8 = 1;
/// Command-line usage error.
pub const EXIT_USAGE_ERROR: u8 = 2;

/// Report a runtime error and return the matching exit code.
pub fn report_run_error(err: &RunError) -> ExitCode {
    eprintln!("error: {}", err);
    ExitCode::from(EXIT_ERROR)
}

/// Report an image loading/parsing error and return the matching exit code.
pub fn report_image_error(path: &str, err: &ImageError) -> ExitCode {
    eprintln!("error: {}: {}", path, err);
    ExitCode::from(EXIT_ERROR)
}

/// Report a usage error with the usage text and return the matching exit
/// code.
pub fn report_usage_error(message: &str) -> ExitCode {
    eprintln!("error: {}", message);
    eprint!("{}", crate::args::USAGE);
    ExitCode::from(EXIT_USAGE_ERROR)
}
