//! CLI command definitions and dispatch.

mod extract;

use clap::{Parser, Subcommand};
use pce_oci_core::OutputFormat;

/// pce-oci - Pextra OCI image extraction.
#[derive(Parser)]
#[command(name = "pce-oci", version, about)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(short, long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Output format selected on the command line.
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Extract the layers of an OCI image into a directory
    Extract(extract::ExtractArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let output = cli.output_format();
    match cli.command {
        Command::Extract(args) => extract::execute(args, output).await,
    }
}
