//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Confmirror - Read versioned configuration from local git mirrors
#[derive(Parser, Debug)]
#[command(name = "confmirror")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (TOML); CONFMIRROR__* variables override it
    #[arg(short, long, env = "CONFMIRROR_CONFIG", default_value = "confmirror.toml", global = true)]
    pub config: PathBuf,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Clone, fetch or re-clone a repository's mirror
    Ensure {
        /// Repository name from the settings
        repo: String,
    },

    /// List tags, newest first
    Tags {
        /// Repository name from the settings
        repo: String,
    },

    /// List tags strictly older than a tag
    OlderThan {
        /// Repository name from the settings
        repo: String,

        /// The reference tag
        tag: String,
    },

    /// Retrieve the files at a tag whose path contains a pattern
    ///
    /// Matching is a case-insensitive substring match on the full path.
    Files {
        /// Repository name from the settings
        repo: String,

        /// The tag to read
        tag: String,

        /// Path pattern (empty matches every file)
        #[arg(default_value = "")]
        pattern: String,

        /// Write the files below this directory instead of listing them
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check whether a file or folder exists at a tag
    Present {
        /// Repository name from the settings
        repo: String,

        /// The tag to read
        tag: String,

        /// Repository-relative path
        path: String,
    },

    /// Check whether a path differs between two tags
    Changed {
        /// Repository name from the settings
        repo: String,

        /// The older tag
        from: String,

        /// The newer tag
        to: String,

        /// Repository-relative path
        path: String,
    },
}

impl Commands {
    /// Returns the repository the command targets.
    pub fn repo(&self) -> &str {
        match self {
            Self::Ensure { repo }
            | Self::Tags { repo }
            | Self::OlderThan { repo, .. }
            | Self::Files { repo, .. }
            | Self::Present { repo, .. }
            | Self::Changed { repo, .. } => repo,
        }
    }
}
