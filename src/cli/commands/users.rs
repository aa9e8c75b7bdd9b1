use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::app::AppContext;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::UserRole;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "List users (admin)")]
    List,

    #[command(about = "Change a user's role (admin)")]
    SetRole {
        #[arg(help = "User ID")]
        id: Uuid,
        #[arg(help = "admin or user")]
        role: UserRole,
    },
}

pub async fn handle(cmd: UserCommands, context: &AppContext, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::List => {
            let profiles = context.users.list().await?;
            if profiles.is_empty() {
                return output_empty_collection(&output_format, "users", "No users");
            }
            output_item(&output_format, "users", &profiles, |rows| {
                let table: Vec<Vec<String>> = rows
                    .iter()
                    .map(|p| {
                        vec![
                            p.id.to_string(),
                            p.email.clone(),
                            p.full_name.clone().unwrap_or_default(),
                            p.role.to_string(),
                            p.created_at.format("%Y-%m-%d").to_string(),
                        ]
                    })
                    .collect();
                print_table(&["id", "email", "name", "role", "joined"], &table);
            })
        }
        UserCommands::SetRole { id, role } => {
            let updated = context.users.set_role(id, role).await?;
            output_success(
                &output_format,
                &format!("{} is now {}", updated.email, updated.role),
                Some(json!({ "user": updated })),
            )
        }
    }
}
