use clap::{Args, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::app::AppContext;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::{PromptFilters, PromptWithDetails};
use crate::services::PromptView;
use crate::validation::{parse_tags, PromptForm};

#[derive(Subcommand)]
pub enum PromptCommands {
    #[command(about = "List prompts")]
    List {
        #[arg(long, help = "Case-insensitive search over title, description and content")]
        search: Option<String>,
        #[arg(long, help = "Category ID")]
        category: Option<Uuid>,
        #[arg(long, help = "Comma-separated tags; prompts with any of them are shown")]
        tags: Option<String>,
        #[arg(long, help = "Only my prompts")]
        mine: bool,
        #[arg(long, help = "Only public prompts")]
        public: bool,
    },

    #[command(about = "Show one prompt")]
    Show {
        #[arg(help = "Prompt ID")]
        id: Uuid,
    },

    #[command(about = "Create a prompt")]
    Create(PromptArgs),

    #[command(about = "Update a prompt you own")]
    Update {
        #[arg(help = "Prompt ID")]
        id: Uuid,
        #[command(flatten)]
        fields: PromptPatchArgs,
    },

    #[command(about = "Delete a prompt you own")]
    Delete {
        #[arg(help = "Prompt ID")]
        id: Uuid,
    },

    #[command(about = "Print the prompt text and count one use")]
    Use {
        #[arg(help = "Prompt ID")]
        id: Uuid,
    },
}

#[derive(Args)]
pub struct PromptArgs {
    #[arg(long)]
    title: String,
    #[arg(long, help = "Prompt text")]
    content: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, help = "Category ID")]
    category: Option<Uuid>,
    #[arg(long, default_value = "", help = "Comma-separated tags")]
    tags: String,
    #[arg(long, help = "Visible only to you")]
    private: bool,
}

#[derive(Args)]
pub struct PromptPatchArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long, help = "Prompt text")]
    content: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, help = "Category ID")]
    category: Option<Uuid>,
    #[arg(long, help = "Remove the category", conflicts_with = "category")]
    no_category: bool,
    #[arg(long, help = "Comma-separated tags, replacing the current ones")]
    tags: Option<String>,
    #[arg(long, help = "Make visible to everyone")]
    public: bool,
    #[arg(long, help = "Make visible only to you", conflicts_with = "public")]
    private: bool,
}

impl PromptPatchArgs {
    /// Full form from the stored prompt with the given flags applied.
    fn merge(self, current: &PromptWithDetails) -> PromptForm {
        let prompt = &current.prompt;
        let category_id = if self.no_category {
            None
        } else {
            self.category.or(prompt.category_id)
        };
        let is_public = if self.public {
            true
        } else if self.private {
            false
        } else {
            prompt.is_public
        };
        PromptForm {
            title: self.title.unwrap_or_else(|| prompt.title.clone()),
            description: self.description.or_else(|| prompt.description.clone()),
            prompt_content: self.content.unwrap_or_else(|| prompt.prompt_content.clone()),
            category_id,
            tags: self.tags.unwrap_or_else(|| prompt.tags.join(", ")),
            is_public,
        }
    }
}

fn print_prompt(view: &PromptView) {
    let p = &view.prompt.prompt;
    println!("{}", p.title);
    println!("ID: {}", p.id);
    if let Some(description) = &p.description {
        println!("Description: {}", description);
    }
    if let Some(category) = &view.prompt.category {
        println!("Category: {} ({})", category.name, category.color);
    }
    if let Some(author) = &view.prompt.profile {
        println!("Author: {}", author.display_name());
    }
    if !p.tags.is_empty() {
        println!("Tags: {}", p.tags.join(", "));
    }
    println!("Visibility: {}", if p.is_public { "public" } else { "private" });
    println!("Uses: {}", p.usage_count);
    println!();
    println!("{}", p.prompt_content);
}

pub async fn handle(cmd: PromptCommands, context: &AppContext, output_format: OutputFormat) -> anyhow::Result<()> {
    let prompts = &context.prompts;
    match cmd {
        PromptCommands::List {
            search,
            category,
            tags,
            mine,
            public,
        } => {
            let created_by = if mine {
                Some(context.session.current_profile()?.id)
            } else {
                None
            };
            let filters = PromptFilters {
                category_id: category,
                search,
                is_public: public.then_some(true),
                created_by,
            };
            let tags = tags.as_deref().map(parse_tags).unwrap_or_default();
            let view = prompts.dashboard(&filters, &tags).await?;

            if view.prompts.is_empty() {
                return output_empty_collection(&output_format, "prompts", "No prompts found");
            }
            output_item(&output_format, "prompts", &view.prompts, |rows| {
                let table: Vec<Vec<String>> = rows
                    .iter()
                    .map(|v| {
                        let p = &v.prompt.prompt;
                        vec![
                            p.id.to_string(),
                            truncate(&p.title, 40),
                            v.prompt.category.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
                            p.tags.join(","),
                            p.usage_count.to_string(),
                        ]
                    })
                    .collect();
                print_table(&["id", "title", "category", "tags", "uses"], &table);
            })
        }
        PromptCommands::Show { id } => {
            let view = prompts.get(id).await?;
            output_item(&output_format, "prompt", &view, print_prompt)
        }
        PromptCommands::Create(args) => {
            let form = PromptForm {
                title: args.title,
                description: args.description,
                prompt_content: args.content,
                category_id: args.category,
                tags: args.tags,
                is_public: !args.private,
            };
            let created = prompts.create(&form).await?;
            output_success(
                &output_format,
                &format!("Created prompt '{}' ({})", created.prompt.title, created.prompt.id),
                Some(json!({ "prompt": created })),
            )
        }
        PromptCommands::Update { id, fields } => {
            let current = prompts.get(id).await?;
            let form = fields.merge(&current.prompt);
            let updated = prompts.update(id, &form).await?;
            output_success(
                &output_format,
                &format!("Updated prompt '{}'", updated.prompt.title),
                Some(json!({ "prompt": updated })),
            )
        }
        PromptCommands::Delete { id } => {
            prompts.delete(id).await?;
            output_success(&output_format, &format!("Deleted prompt {}", id), None)
        }
        PromptCommands::Use { id } => {
            let used = prompts.record_use(id).await?;
            match output_format {
                OutputFormat::Json => output_item(&output_format, "prompt", &used, |_| {}),
                OutputFormat::Text => {
                    println!("{}", used.prompt.prompt_content);
                    Ok(())
                }
            }
        }
    }
}
