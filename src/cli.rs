// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the offline subcommands: validate, export, diff and render.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Render, validate and diff layered cluster stacks")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Project directory holding cluster.yaml, templates/, userdata/ and plugins/
    #[arg(short, long, global = true, default_value = ".")]
    pub dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render every stack locally and check templates and userdata
    Validate {
        /// Comma-separated stack names, or "all"
        #[arg(short, long, value_delimiter = ',')]
        targets: Vec<String>,
    },

    /// Write every rendered asset to a directory
    Export {
        #[arg(short, long, default_value = "exported")]
        out: PathBuf,
    },

    /// Compare rendered stacks against a previously exported tree
    Diff {
        /// Directory written by an earlier export
        #[arg(long)]
        deployed: PathBuf,

        /// Unchanged lines shown around each change; negative shows everything
        #[arg(short, long, default_value_t = 5, allow_negative_numbers = true)]
        context: i32,

        /// Comma-separated stack names, or "all"
        #[arg(short, long, value_delimiter = ',')]
        targets: Vec<String>,
    },

    /// Print one stack's rendered template
    Render {
        #[arg(short, long)]
        stack: String,
    },
}
