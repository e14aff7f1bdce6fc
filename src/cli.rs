use clap::{Parser, Subcommand};

/// Featuregate — resource-scoped feature flag service
#[derive(Parser)]
#[command(name = "featuregate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind
        #[arg(short, long, env = "FEATUREGATE_PORT", default_value = "8080")]
        port: u16,
    },

    /// Manage API tokens without going through the HTTP API
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Mint a new API token; prints the secret exactly once
    Create {
        #[arg(long)]
        name: String,
        /// Principal to attribute the token to
        #[arg(long, default_value = "operator")]
        created_by: String,
    },
    /// List tokens (metadata only)
    List,
    /// Delete a token, invalidating its secret immediately
    Delete {
        #[arg(long)]
        id: String,
    },
}
