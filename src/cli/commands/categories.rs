use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::app::AppContext;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::validation::CategoryForm;

#[derive(Subcommand)]
pub enum CategoryCommands {
    #[command(about = "List categories")]
    List,

    #[command(about = "Create a category (admin)")]
    Create {
        #[arg(help = "Category name")]
        name: String,
        #[arg(long, help = "Hex color such as #FF6B35")]
        color: String,
        #[arg(long)]
        description: Option<String>,
    },

    #[command(about = "Update a category (admin)")]
    Update {
        #[arg(help = "Category ID")]
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, help = "Hex color such as #FF6B35")]
        color: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    #[command(about = "Delete a category (admin)")]
    Delete {
        #[arg(help = "Category ID")]
        id: Uuid,
    },
}

pub async fn handle(cmd: CategoryCommands, context: &AppContext, output_format: OutputFormat) -> anyhow::Result<()> {
    let categories = &context.categories;
    match cmd {
        CategoryCommands::List => {
            let list = categories.list().await?;
            if list.is_empty() {
                return output_empty_collection(&output_format, "categories", "No categories");
            }
            output_item(&output_format, "categories", &list, |rows| {
                let table: Vec<Vec<String>> = rows
                    .iter()
                    .map(|c| {
                        vec![
                            c.id.to_string(),
                            c.name.clone(),
                            c.color.to_string(),
                            truncate(c.description.as_deref().unwrap_or(""), 50),
                        ]
                    })
                    .collect();
                print_table(&["id", "name", "color", "description"], &table);
            })
        }
        CategoryCommands::Create {
            name,
            color,
            description,
        } => {
            let form = CategoryForm {
                name,
                description,
                color,
            };
            let created = categories.create(&form).await?;
            output_success(
                &output_format,
                &format!("Created category '{}'", created.name),
                Some(json!({ "category": created })),
            )
        }
        CategoryCommands::Update {
            id,
            name,
            color,
            description,
        } => {
            let current = categories
                .list()
                .await?
                .into_iter()
                .find(|c| c.id == id)
                .ok_or_else(|| anyhow::anyhow!("Category {} not found", id))?;
            let form = CategoryForm {
                name: name.unwrap_or(current.name),
                description: description.or(current.description),
                color: color.unwrap_or_else(|| current.color.to_string()),
            };
            let updated = categories.update(id, &form).await?;
            output_success(
                &output_format,
                &format!("Updated category '{}'", updated.name),
                Some(json!({ "category": updated })),
            )
        }
        CategoryCommands::Delete { id } => {
            categories.delete(id).await?;
            output_success(&output_format, &format!("Deleted category {}", id), None)
        }
    }
}
