//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

/// Inspect nested JSON trees
#[derive(Parser, Debug)]
#[command(name = "treemodel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log verbosity: -d info, -dd debug, -ddd trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the tree
    Show {
        /// JSON file, `-` for stdin
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Print the normalized tree JSON (every node gets `id` and `children`)
    Json {
        /// JSON file, `-` for stdin
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Single-line output
        #[arg(long)]
        compact: bool,
    },

    /// List node ids in pre-order
    Nodes {
        /// JSON file, `-` for stdin
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Find a node by id (breadth-first)
    Find {
        /// JSON file, `-` for stdin
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Node id
        id: String,

        /// Keys to project: id, meta, parent, children
        #[arg(short, long, value_delimiter = ',')]
        keys: Vec<String>,
    },

    /// Show effective settings
    Config,

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
