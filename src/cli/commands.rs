use clap::{Parser, Subcommand};
use errata::providers::Capability;
use std::path::PathBuf;

/// `errata` - AI provider router and streaming analysis engine for mistake
/// notebooks.
#[derive(Parser, Debug)]
#[command(name = "errata")]
#[command(version)]
#[command(about = "Route, stream and extract AI analyses of wrong answers.", long_about = None)]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Show the failover chain for a capability
    Providers {
        #[arg(short, long, default_value = "text", value_parser = parse_capability)]
        capability: Capability,
    },

    /// Run one analysis and print the streamed answer
    Analyze {
        /// Problem row to write the result back to
        #[arg(long)]
        problem_id: Option<i64>,

        /// Question text (defaults to the stored problem text)
        #[arg(long)]
        prompt: Option<String>,

        /// Photo of the problem (png, jpg, webp, gif)
        #[arg(long)]
        image: Option<PathBuf>,

        #[arg(long)]
        subject: Option<String>,

        /// Use the review prompt for a corrected attempt
        #[arg(long)]
        review: bool,
    },
}

fn parse_capability(value: &str) -> Result<Capability, String> {
    value
        .parse()
        .map_err(|_| format!("unknown capability '{value}' (expected text or vision)"))
}
