use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `locopilot` - scheduled posting and review replies for business locations.
#[derive(Parser, Debug)]
#[command(name = "locopilot")]
#[command(version = "0.1.0")]
#[command(about = "Scheduled posting and review-reply automation.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run timers, review pollers and recovery until Ctrl-C
    Daemon,

    /// Show automation status for one location or all of them
    Status {
        /// Location id (all locations when omitted)
        location: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Store a location's automation settings from a JSON file
    Configure {
        /// Location id
        location: String,

        /// Path to the JSON settings payload
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Publish a post for a location right now, ignoring its schedule
    PostNow {
        /// Location id
        location: String,

        /// JSON file with business details to use for this post only
        #[arg(long)]
        business: Option<PathBuf>,
    },

    /// Fetch reviews and send replies for a location right now
    CheckReviews {
        /// Location id
        location: String,
    },

    /// Switch a location's automation off
    Disable {
        /// Location id
        location: String,
    },

    /// Run one pass of missed-post recovery
    Reconcile,
}
