use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;

use crate::auth::default_store_path;

/// Expense tracker client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the expense API
    #[arg(
        short = 'u',
        long,
        env = "EXPENSE_API_URL",
        default_value = "http://localhost:8000/api"
    )]
    pub api_url: String,

    /// Path to the session database holding the token pair
    #[arg(short = 's', long, env = "EXPENSE_SESSION_DB")]
    pub session_db: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// HTTP connect timeout in seconds (transport default when unset)
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in with username and password
    Login {
        username: Option<String>,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        password_confirm: Option<String>,
    },

    /// Log out and forget stored tokens
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Recent expenses and totals
    Dashboard,

    /// List expenses, newest first
    List {
        #[arg(short, long, default_value = "1")]
        page: u32,
        /// Category id to filter by
        #[arg(short, long)]
        category: Option<i64>,
    },

    /// Show one expense
    Show { id: i64 },

    /// Add an expense
    Add {
        amount: String,
        description: String,
        /// Defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        notes: Option<String>,
        #[arg(short, long)]
        category: Option<i64>,
    },

    /// Replace an existing expense
    Edit {
        id: i64,
        amount: String,
        description: String,
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        notes: Option<String>,
        #[arg(short, long)]
        category: Option<i64>,
    },

    /// Delete an expense
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List categories
    Categories,

    /// Ask the AI about your expenses; starts a chat when no question is given
    Ask { question: Vec<String> },
}

impl Command {
    /// Commands that only make sense with a logged-in session
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            Command::Login { .. } | Command::Register { .. } | Command::Logout
        )
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub session_db: PathBuf,
    pub log_level: String,
    pub connect_timeout: Option<u64>,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    pub fn from_args(args: CliArgs) -> (Self, Command) {
        let config = Config {
            api_url: args.api_url.trim_end_matches('/').to_string(),
            session_db: args
                .session_db
                .map(|s| expand_tilde(&s))
                .unwrap_or_else(default_store_path),
            log_level: args.log_level,
            connect_timeout: args.connect_timeout,
        };

        (config, args.command)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_url)
            .with_context(|| format!("EXPENSE_API_URL is not a valid URL: {}", self.api_url))?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "EXPENSE_API_URL must use http or https, got {}",
                url.scheme()
            );
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
