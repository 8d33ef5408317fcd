use clap::Parser;
use log::error;
use readclean_core::cli::{self, Cli, Commands};
use std::process::ExitCode;

fn main() -> ExitCode {
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let cli = Cli::parse();

    init_logging(verbosity_of(&cli.command));

    let config = match cli.command {
        Commands::Trim(args) => cli::build_trim_config(args),
        Commands::Demultiplex(args) => cli::build_demultiplex_config(args),
        Commands::IdentifyAdapters(args) => cli::build_identify_adapters_config(args),
    };

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(2);
        }
    };

    match readclean_core::pipeline::run(config, command_line) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn verbosity_of(command: &Commands) -> (bool, bool) {
    match command {
        Commands::Trim(args) => (args.io.verbose, args.io.quiet),
        Commands::Demultiplex(args) => (args.io.verbose, args.io.quiet),
        Commands::IdentifyAdapters(args) => (args.io.verbose, args.io.quiet),
    }
}

/// Initializes `env_logger` at a level derived from `-v`/`--quiet`, with
/// `RUST_LOG` taking precedence when set (C12).
fn init_logging((verbose, quiet): (bool, bool)) {
    let default_level = if quiet {
        log::LevelFilter::Error
    } else if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level.as_str()))
        .format_timestamp_secs()
        .init();
}
