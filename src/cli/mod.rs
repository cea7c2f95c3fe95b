//! CLI module - Command-line interface for keyscout
//!
//! This module provides a structured CLI using clap for argument parsing.

pub mod commands;

use clap::{Parser, Subcommand};

/// keyscout - Marketplace keyword research
/// Aggregates keyword metrics from Amazon, Etsy, eBay, Shopify and Gumroad
#[derive(Parser)]
#[command(name = "keyscout")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    #[command(alias = "web", alias = "daemon")]
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Search keywords across marketplaces
    #[command(alias = "s")]
    Search {
        /// Search query
        #[arg(required = true)]
        query: Vec<String>,

        /// Platform to search; repeat for several, defaults to all
        #[arg(long, short)]
        platform: Vec<String>,

        /// Maximum number of ranked results
        #[arg(long, short)]
        limit: Option<usize>,

        /// Append related keyword suggestions
        #[arg(long)]
        related: bool,

        /// Include an up/down/stable summary
        #[arg(long)]
        trends: bool,

        /// Print the raw JSON result
        #[arg(long)]
        json: bool,
    },

    /// Show trending keywords
    #[command(alias = "t")]
    Trending {
        /// Restrict to one platform
        #[arg(long, short)]
        platform: Option<String>,

        /// Print the raw JSON result
        #[arg(long)]
        json: bool,
    },

    /// List platforms with their status and rate limits
    Platforms,

    /// Probe every enabled marketplace
    Health,

    /// Create default config file
    #[command(alias = "init")]
    InitConfig,
}
