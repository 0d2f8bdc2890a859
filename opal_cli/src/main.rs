//! The opal image runner.
//!
//! Loads a program image, calls its exported `main` function with no
//! arguments, and prints the result.

mod args;
mod error;

use std::process::ExitCode;

use args::{parse_args, ExecutionMode, USAGE};
use error::{report_image_error, report_run_error, report_usage_error, EXIT_SUCCESS};
use opal_vm::VirtualMachine;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => return report_usage_error(&message),
    };

    match args.mode {
        ExecutionMode::PrintHelp => {
            print!("{}", USAGE);
            ExitCode::from(EXIT_SUCCESS)
        }
        ExecutionMode::PrintVersion => {
            println!("opal {}", VERSION);
            ExitCode::from(EXIT_SUCCESS)
        }
        ExecutionMode::Run(path) => {
            let pkg = match opal_image::parse_file(&path) {
                Ok(pkg) => pkg,
                Err(err) => return report_image_error(&path.display().to_string(), &err),
            };

            let mut vm = VirtualMachine::new();
            match vm.call_export_fn(pkg, "main", &[]) {
                Ok(ret) => {
                    println!("{}", ret);
                    ExitCode::from(EXIT_SUCCESS)
                }
                Err(err) => report_run_error(&err),
            }
        }
    }
}
