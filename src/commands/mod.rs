pub mod chat;
pub mod threads;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::api::ConversationClient;
use crate::config::{AppConfig, NotifierKind};
use crate::error::AppError;

#[derive(Debug, Parser)]
#[command(author, version, about = "Terminal client for SmartPantry conversation threads")]
pub struct Cli {
    /// Config file (default: <config dir>/smartpantry/config.toml).
    #[arg(long, global = true, env = "SMARTPANTRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Service base URL. Overrides the config file and environment.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Existing session cookie as `name=value`.
    #[arg(long, global = true)]
    pub session: Option<String>,

    /// Reply notifier: `polling` or `push`.
    #[arg(long, global = true)]
    pub notifier: Option<NotifierKind>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage conversation threads.
    Threads {
        #[command(subcommand)]
        action: ThreadsCommand,
    },
    /// Open a thread and chat interactively.
    Open { thread_id: String },
}

#[derive(Debug, Subcommand)]
pub enum ThreadsCommand {
    List,
    Create { name: String },
    Rename { thread_id: String, name: String },
    Delete { thread_id: String },
}

impl Cli {
    /// Fold command-line overrides into a loaded config.
    pub fn apply_to(&self, config: &mut AppConfig) -> Result<(), AppError> {
        if let Some(url) = &self.base_url {
            config.base_url = url.trim().to_string();
        }
        if let Some(cookie) = &self.session {
            config.session_cookie = Some(cookie.trim().to_string());
        }
        if let Some(kind) = self.notifier {
            config.notifier = kind;
        }
        config.validate()
    }
}

pub async fn run(cli: Cli, config: AppConfig) -> Result<(), AppError> {
    let client = ConversationClient::new(&config)?;
    match cli.command {
        Command::Threads { action } => threads::run(&client, action).await,
        Command::Open { thread_id } => chat::run(client, &config, &thread_id).await,
    }
}
