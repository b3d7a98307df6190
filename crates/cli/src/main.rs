//! WatchDir CLI - watchdir command

use clap::Parser;
use cli_lib::{finish, init_tracing, run, Cli, ABOUT};
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version go to stdout and succeed
            if !err.use_stderr() {
                let _ = err.print();
                return ExitCode::SUCCESS;
            }
            eprintln!("Too few or invalid arguments. Exiting.");
            eprintln!("{}", ABOUT);
            eprintln!();
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    init_tracing(cli.log_level());

    let status = finish(run(&cli), &mut io::stdout(), &mut io::stderr());
    ExitCode::from(status)
}
