//! Binary entry point for the persistent compiler worker.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Request threads log to stderr too, so the handle stays unlocked.
    compiler_worker::run(std::env::args_os(), &mut io::stderr())
}
