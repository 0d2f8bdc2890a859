//! Command-line argument parser.
//!
//! Hand-rolled for zero-overhead startup; the surface is one image path
//! plus the usual informational flags.

use std::path::PathBuf;

/// What the runner should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run an image file: `opal program.opi`
    Run(PathBuf),
    /// Print version and exit: `opal -V` / `opal --version`
    PrintVersion,
    /// Print help and exit: `opal -h` / `opal --help`
    PrintHelp,
}

/// Complete set of parsed CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpalArgs {
    pub mode: ExecutionMode,
}

/// Parse the argument list (without the program name).
///
/// Returns a usage-error message on malformed input.
pub fn parse_args<I>(args: I) -> Result<OpalArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut image: Option<PathBuf> = None;

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                return Ok(OpalArgs {
                    mode: ExecutionMode::PrintHelp,
                })
            }
            "-V" | "--version" => {
                return Ok(OpalArgs {
                    mode: ExecutionMode::PrintVersion,
                })
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option: {}", flag));
            }
            path => {
                if image.is_some() {
                    return Err(format!("unexpected extra argument: {}", path));
                }
                image = Some(PathBuf::from(path));
            }
        }
    }

    match image {
        Some(path) => Ok(OpalArgs {
            mode: ExecutionMode::Run(path),
        }),
        None => Err("no image file given".to_owned()),
    }
}

/// Usage text for `--help` and usage errors.
pub const USAGE: &str = "\
usage: opal [options] <image.opi>

Runs the image's exported main function and prints its result.

options:
  -h, --help     print this help and exit
  -V, --version  print the version and exit
";
