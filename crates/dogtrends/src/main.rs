#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use clap::error::ErrorKind;
use dogtrends::cli::app::{Cli, Command, RuntimeArgs};
use dogtrends::cli::commands;
use dogtrends::config::RuntimePaths;
use dogtrends::models::EnvelopeCommandFailure;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_VERIFICATION_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };
    dogtrends::logging::init_logging();
    let command_name = command_name(&cli.command);
    eprintln!("dogtrends: starting `{command_name}`");

    match execute(cli) {
        Ok(()) => {
            eprintln!("dogtrends: completed `{command_name}` (exit_code={EXIT_SUCCESS})");
            EXIT_SUCCESS
        }
        Err(error) => {
            let exit_code = classify_runtime_error(&error);
            eprintln!("dogtrends: failed `{command_name}` (exit_code={exit_code})");
            match error
                .downcast_ref::<EnvelopeCommandFailure>()
                .map(|failure| failure.envelope().encode())
            {
                Some(Ok(encoded)) => println!("{encoded}"),
                Some(Err(encode_error)) => eprintln!("{error:#} ({encode_error:#})"),
                None => eprintln!("{error:#}"),
            }
            exit_code
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    if let Command::Schema(args) = &cli.command {
        return commands::schema::run(args);
    }

    let runtime_paths = resolve_runtime_paths(&cli.runtime)?;
    match cli.command {
        Command::Weekdays(args) => commands::weekdays::run(&args, &runtime_paths),
        Command::Dogs(args) => commands::dogs::run(&args, &runtime_paths),
        Command::Regions(args) => commands::regions::run(&args, &runtime_paths),
        Command::Report(args) => commands::report::run(&args, &runtime_paths),
        Command::Inspect(args) => commands::inspect::run(&args, &runtime_paths),
        Command::Verify(args) => commands::verify::run(&args, &runtime_paths),
        Command::Schema(args) => commands::schema::run(&args),
    }
}

fn classify_runtime_error(error: &anyhow::Error) -> i32 {
    if error
        .downcast_ref::<commands::verify::VerificationCommandFailure>()
        .is_some()
    {
        EXIT_VERIFICATION_FAILURE
    } else {
        EXIT_RUNTIME_FAILURE
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Weekdays(_) => "weekdays",
        Command::Dogs(_) => "dogs",
        Command::Regions(_) => "regions",
        Command::Report(_) => "report",
        Command::Inspect(_) => "inspect",
        Command::Verify(_) => "verify",
        Command::Schema(_) => "schema",
    }
}

fn resolve_runtime_paths(args: &RuntimeArgs) -> Result<RuntimePaths> {
    let home_dir = match &args.home_dir {
        Some(path) => path.clone(),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set; pass --home-dir"))?,
    };

    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    dogtrends::config::resolve_runtime_paths(
        &home_dir,
        &cwd,
        args.db.as_deref(),
        args.out_dir.as_deref(),
    )
}
