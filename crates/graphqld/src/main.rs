//! Entry point for the `graphqld` binary.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    graphqld::run(std::env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}
