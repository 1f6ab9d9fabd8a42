use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cilguard - sandbox verification for untrusted .NET assemblies
#[derive(Debug, Parser)]
#[command(name = "cilguard", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check an assembly against a whitelist. Exits with status 1 if it is not safe to load.
    Scan {
        /// Path to the .NET assembly file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Path to the JSON whitelist.
        #[arg(short, long, value_name = "JSON")]
        config: PathBuf,

        /// Trust every type of this assembly, e.g. other assemblies of the same bundle.
        #[arg(long = "bundle", value_name = "NAME")]
        bundles: Vec<String>,

        /// Skip IL verification.
        #[arg(long)]
        no_verify: bool,

        /// Check member references on a single thread.
        #[arg(long)]
        serial: bool,
    },

    /// List the type and member references of an assembly as the sandbox sees them.
    Refs {
        /// Path to the .NET assembly file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}
