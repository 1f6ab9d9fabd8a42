mod app;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<ExitCode> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // Show cilguard info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("cilguard", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Scan {
            path,
            config,
            bundles,
            no_verify,
            serial,
        } => {
            let safe = commands::scan::run(
                path,
                &commands::scan::ScanArgs {
                    config,
                    bundles,
                    verify_il: !*no_verify,
                    parallel: !*serial,
                },
                &cli.global,
            )?;
            Ok(if safe {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Refs { path } => {
            commands::refs::run(path, &cli.global)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
