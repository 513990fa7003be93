use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dojo-rank", version, author, about = "Belt-rank and Dan progression tracking for dojo members")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a new member
    Register {
        /// Member id
        user: String,
        /// Starting belt (white, blue, purple, brown, black)
        #[arg(long, default_value = "white")]
        belt: String,
    },
    /// Record attendance at a training session
    Checkin {
        /// Member id
        user: String,
        /// Number of sessions to record
        #[arg(long, default_value = "1")]
        times: u32,
    },
    /// Override the lifetime check-in count
    SetCheckins {
        /// Member id
        user: String,
        /// New cumulative count
        count: u32,
    },
    /// Change a member's belt
    Promote {
        /// Member id
        user: String,
        /// New belt color
        belt: String,
    },
    /// Sync Dan completions and show current progress
    Progress {
        /// Member id
        user: String,
    },
    /// Sync Dan completions without printing progress
    Sync {
        /// Member id
        user: String,
    },
    /// Show completed Dans and recent check-ins
    History {
        /// Member id
        user: String,
        /// How many recent check-ins to list
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// List all members with their belt and Dan
    Members,
    /// Print a member's rank record as JSON
    Export {
        /// Member id
        user: String,
    },
    /// Write the default config file
    InitConfig,
}
