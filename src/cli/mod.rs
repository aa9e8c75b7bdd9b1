pub mod commands;
pub mod config;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "deck")]
#[command(about = "promptdeck CLI - share and reuse prompts from the terminal")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Sign in, sign out and manage passwords")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Browse, create and use prompts")]
    Prompts {
        #[command(subcommand)]
        cmd: commands::prompts::PromptCommands,
    },

    #[command(about = "Prompt categories")]
    Categories {
        #[command(subcommand)]
        cmd: commands::categories::CategoryCommands,
    },

    #[command(about = "User role administration")]
    Users {
        #[command(subcommand)]
        cmd: commands::users::UserCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let mut context = config::open_context().await?;

    let result = match cli.command {
        Commands::Auth { cmd } => commands::auth::handle(cmd, &context, output_format).await,
        Commands::Prompts { cmd } => commands::prompts::handle(cmd, &context, output_format).await,
        Commands::Categories { cmd } => commands::categories::handle(cmd, &context, output_format).await,
        Commands::Users { cmd } => commands::users::handle(cmd, &context, output_format).await,
    };

    context.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from(["deck", "--json", "prompts", "list", "--search", "email", "--mine"]).unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Prompts {
                cmd: commands::prompts::PromptCommands::List { mine: true, .. }
            }
        ));
    }

    #[test]
    fn parses_role_argument() {
        let id = uuid::Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["deck", "users", "set-role", &id, "admin"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Users {
                cmd: commands::users::UserCommands::SetRole {
                    role: crate::database::UserRole::Admin,
                    ..
                }
            }
        ));
        assert!(Cli::try_parse_from(["deck", "users", "set-role", &id, "owner"]).is_err());
    }

    #[test]
    fn update_rejects_conflicting_visibility() {
        let id = uuid::Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["deck", "prompts", "update", &id, "--public", "--private"]).is_err());
    }
}
