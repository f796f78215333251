use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "beacon",
    about = "Assembles dashboard widgets and component comparisons from a widget catalogue",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "BEACON_CONFIG",
        global = true,
        help = "Optional JSON engine config; BEACON_* environment variables override its fields"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: BuildCommand,
}

#[derive(Debug, Subcommand)]
pub enum BuildCommand {
    /// Build one widget and print its regions.
    Widget(BuildArgs),
    /// Build one component comparison tree (requires an `orgId` binding).
    Comparison(BuildArgs),
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[arg(
        long,
        env = "BEACON_DEFINITIONS_DIR",
        help = "Catalogue directory holding widgets/*.json and comparisons/*.json"
    )]
    pub catalog: Option<PathBuf>,

    #[arg(long, help = "Widget or comparison id to build")]
    pub id: String,

    #[arg(
        long,
        help = "JSON object of placeholder bindings (strings, integers or string lists)"
    )]
    pub bindings: Option<PathBuf>,

    #[arg(
        long = "base-filters",
        help = "JSON object mapping store fields to the values they are restricted to"
    )]
    pub base_filters: Option<PathBuf>,

    #[arg(long, help = "Print compact JSON instead of pretty JSON")]
    pub compact: bool,
}
