use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track expenses offline and sync them when you're back online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote sync configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a new expense
    #[command(alias = "new")]
    Add {
        /// Amount, e.g. 12.50
        amount: String,
        /// What the money was spent on
        description: Vec<String>,
        /// Category name or ID
        #[arg(short, long)]
        category: Option<String>,
        /// Date of the expense (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// ISO currency code (defaults to the preferred currency)
        #[arg(long)]
        currency: Option<String>,
        /// Repeat frequency: daily, weekly, monthly, yearly
        #[arg(long, value_name = "FREQUENCY")]
        recurring: Option<String>,
    },
    /// List recent expenses
    List {
        /// Number of expenses to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing expense
    Edit {
        /// Expense ID or unique ID prefix
        id: String,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Category name or ID
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        /// Repeat frequency, or "none" to stop repeating
        #[arg(long, value_name = "FREQUENCY")]
        recurring: Option<String>,
    },
    /// Delete an existing expense
    Delete {
        /// Expense ID or unique ID prefix
        id: String,
    },
    /// Import expenses from a JSON file
    Import {
        /// JSON array of expenses
        path: PathBuf,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Show or change preferences
    Prefs {
        #[command(subcommand)]
        command: Option<PrefsCommands>,
    },
    /// Push local changes and pull remote ones
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Keep syncing on an interval until interrupted
    Watch,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Authenticate CLI profile with Supabase
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories
    List {
        /// Include hidden categories
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a category
    Add {
        name: String,
        /// Icon name
        #[arg(long, default_value = "tag")]
        icon: String,
        /// Hex color, e.g. #22c55e
        #[arg(long, default_value = "#64748b")]
        color: String,
    },
    /// Delete a custom category
    Delete {
        /// Category name or ID
        category: String,
    },
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Show current preferences
    Show,
    /// Change one or more preferences
    Set {
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        date_format: Option<String>,
        /// light, dark, or system
        #[arg(long)]
        theme: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show queued changes and the last successful sync
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop queued changes and the sync checkpoint
    Reset,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Seconds between background syncs in `tally watch`
        #[arg(long, value_name = "SECONDS")]
        sync_interval: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Login with Supabase email/password and store session in keychain
    Login {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Supabase account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Supabase account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show auth status for profile
    Status {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Logout profile, clear stored session and sync state
    Logout {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
