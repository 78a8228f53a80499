//! Command-line interface definition for platform-events
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for consuming, publishing, and inspecting topics.

use clap::{Parser, Subcommand};

/// platform-events - Checkpointed consumer for platform event streams
///
/// Authenticates against the OAuth server, subscribes to a Pub/Sub API
/// topic, and writes decoded events to STDOUT as JSON lines.
#[derive(Parser, Debug, Clone)]
#[command(name = "platform-events")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for platform-events
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Consume events and print them as JSON lines
    Consume {
        /// Override the topic from config
        #[arg(short, long)]
        topic: Option<String>,

        /// Override the batch size from config
        #[arg(short, long)]
        batch_size: Option<i32>,

        /// Stop after this many committed batches
        #[arg(long)]
        max_batches: Option<u64>,
    },

    /// Publish one JSON object as an event
    Publish {
        /// Override the topic from config
        #[arg(short, long)]
        topic: Option<String>,

        /// Event body as a JSON object
        #[arg(short, long)]
        data: String,
    },

    /// Show the topic's permissions and schema id
    Topic {
        /// Override the topic from config
        #[arg(short, long)]
        topic: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Log in and show the authenticated identity
    Whoami {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

impl Commands {
    /// Topic given on the command line, if any.
    pub fn topic_override(&self) -> Option<&str> {
        match self {
            Commands::Consume { topic, .. }
            | Commands::Publish { topic, .. }
            | Commands::Topic { topic, .. } => topic.as_deref(),
            Commands::Whoami { .. } => None,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
