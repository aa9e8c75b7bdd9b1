mod common;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::TestApp;
use promptdeck::backend::memory::MemoryOp;
use promptdeck::backend::{Backend, MemoryBackend, Table};
use promptdeck::database::{PromptFilters, PromptRepository, UserRole};
use promptdeck::filter::Filter;
use promptdeck::validation::{CategoryForm, PromptForm};
use promptdeck::AppError;

fn prompt_form(title: &str) -> PromptForm {
    PromptForm {
        title: title.to_string(),
        prompt_content: format!("{}: write it out in full detail", title),
        tags: "writing, Review ,,".to_string(),
        ..PromptForm::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_usage_increments_are_not_lost() -> Result<()> {
    let memory = Arc::new(MemoryBackend::new());
    let owner = common::seed_member(&memory, "owner@example.com", UserRole::User);
    let id = common::seed_prompt(&memory, owner, "Counter", &[]);
    let prompts = PromptRepository::new(Backend::memory(memory.clone()).store);

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let prompts = prompts.clone();
            tokio::spawn(async move { prompts.increment_usage(id).await })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result??;
    }

    assert_eq!(prompts.get_by_id(id).await?.prompt.usage_count, 25);
    Ok(())
}

#[tokio::test]
async fn search_is_case_insensitive_across_text_columns() -> Result<()> {
    let memory = Arc::new(MemoryBackend::new());
    let owner = common::seed_member(&memory, "owner@example.com", UserRole::User);
    for row in [
        json!({"title": "Email Writer", "prompt_content": "Draft a polite reply", "created_by": owner}),
        json!({"title": "Review", "description": "Checks EMAIL tone", "prompt_content": "Read the draft", "created_by": owner}),
        json!({"title": "Summary", "prompt_content": "Summarize this e-mail thread", "created_by": owner}),
        json!({"title": "Haiku", "prompt_content": "Write a poem about spring", "created_by": owner}),
    ] {
        memory.insert_row(Table::Prompts, row)?;
    }
    let prompts = PromptRepository::new(Backend::memory(memory.clone()).store);

    let filters = PromptFilters {
        search: Some("  email ".to_string()),
        ..PromptFilters::default()
    };
    let mut titles: Vec<_> = prompts
        .list(filters.to_filter())
        .await?
        .into_iter()
        .map(|p| p.prompt.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Email Writer", "Review"]);

    let blank = PromptFilters {
        search: Some("   ".to_string()),
        ..PromptFilters::default()
    };
    assert_eq!(prompts.list(blank.to_filter()).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn filters_combine_and_results_are_newest_first() -> Result<()> {
    let memory = Arc::new(MemoryBackend::new());
    let alice = common::seed_member(&memory, "alice@example.com", UserRole::User);
    let bob = common::seed_member(&memory, "bob@example.com", UserRole::User);
    let category = memory.insert_row(
        Table::Categories,
        json!({"name": "Writing", "color": "#3B82F6", "created_by": alice}),
    )?;
    let category_id: Uuid = category["id"].as_str().unwrap_or_default().parse()?;

    let base = Utc::now() - ChronoDuration::hours(1);
    for (minutes, title, owner, public, in_category) in [
        (1, "Oldest", alice, true, true),
        (2, "Private", alice, false, true),
        (3, "Bob's", bob, true, true),
        (4, "Uncategorized", alice, true, false),
        (5, "Newest", alice, true, true),
    ] {
        memory.insert_row(
            Table::Prompts,
            json!({
                "title": title,
                "prompt_content": "Some long enough prompt",
                "created_by": owner,
                "is_public": public,
                "category_id": if in_category { json!(category_id) } else { json!(null) },
                "created_at": base + ChronoDuration::minutes(minutes),
            }),
        )?;
    }
    let prompts = PromptRepository::new(Backend::memory(memory.clone()).store);

    let filters = PromptFilters {
        category_id: Some(category_id),
        is_public: Some(true),
        created_by: Some(alice),
        search: None,
    };
    let listed = prompts.list(filters.to_filter()).await?;
    let titles: Vec<_> = listed.iter().map(|p| p.prompt.title.as_str()).collect();
    assert_eq!(titles, vec!["Newest", "Oldest"]);
    assert_eq!(listed[0].category.as_ref().map(|c| c.name.as_str()), Some("Writing"));
    assert_eq!(listed[0].profile.as_ref().map(|p| p.email.as_str()), Some("alice@example.com"));

    let all = prompts.list(Filter::new()).await?;
    assert_eq!(all.first().map(|p| p.prompt.title.as_str()), Some("Newest"));
    assert_eq!(all.last().map(|p| p.prompt.title.as_str()), Some("Oldest"));
    Ok(())
}

#[tokio::test]
async fn dashboard_tag_selection_is_any_match() -> Result<()> {
    let app = TestApp::start().await?;
    let owner = common::seed_member(&app.memory, "tags@example.com", UserRole::User);
    common::seed_prompt(&app.memory, owner, "Both", &["rust", "async"]);
    common::seed_prompt(&app.memory, owner, "Rust only", &["rust"]);
    common::seed_prompt(&app.memory, owner, "Docs", &["docs"]);
    common::seed_prompt(&app.memory, owner, "Untagged", &[]);
    app.sign_in("tags@example.com").await?;

    let view = app.context.prompts.dashboard(&PromptFilters::default(), &[]).await?;
    assert_eq!(view.prompts.len(), 4);
    assert_eq!(view.available_tags, vec!["async", "docs", "rust"]);
    assert!(view.prompts.iter().all(|p| p.can_edit && p.can_delete));

    let selected = vec!["async".to_string(), "docs".to_string()];
    let view = app.context.prompts.dashboard(&PromptFilters::default(), &selected).await?;
    let mut titles: Vec<_> = view.prompts.iter().map(|p| p.prompt.prompt.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Both", "Docs"]);
    assert_eq!(view.selected_tags, selected);
    Ok(())
}

#[tokio::test]
async fn dashboard_requires_sign_in() -> Result<()> {
    let app = TestApp::start().await?;
    let err = app.context.prompts.dashboard(&PromptFilters::default(), &[]).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));
    Ok(())
}

#[tokio::test]
async fn create_prompt_normalizes_tags_and_records_author() -> Result<()> {
    let app = TestApp::start().await?;
    let author = common::seed_member(&app.memory, "author@example.com", UserRole::User);
    app.sign_in("author@example.com").await?;

    let created = app.context.prompts.create(&prompt_form("Release notes")).await?;
    assert_eq!(created.prompt.created_by, author);
    assert_eq!(created.prompt.tags, vec!["writing", "Review"]);
    assert_eq!(created.prompt.usage_count, 0);
    assert!(created.prompt.is_public);
    Ok(())
}

#[tokio::test]
async fn create_without_profile_is_an_auth_error() -> Result<()> {
    let app = TestApp::start().await?;
    app.memory.seed_user("ghost@example.com", common::PASSWORD, None);
    app.memory.fail(MemoryOp::Insert(Table::Profiles));
    app.sign_in("ghost@example.com").await?;
    app.memory.heal(MemoryOp::Insert(Table::Profiles));

    let err = app.context.prompts.create(&prompt_form("Orphan")).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));
    assert!(app.memory.rows(Table::Prompts).is_empty());
    Ok(())
}

#[tokio::test]
async fn validation_runs_before_the_backend() -> Result<()> {
    let app = TestApp::start().await?;
    common::seed_member(&app.memory, "admin@example.com", UserRole::Admin);
    app.sign_in("admin@example.com").await?;
    app.memory.fail(MemoryOp::Insert(Table::Prompts));
    app.memory.fail(MemoryOp::Insert(Table::Categories));

    let short = PromptForm {
        title: "ab".to_string(),
        prompt_content: "too short".to_string(),
        ..PromptForm::default()
    };
    match app.context.prompts.create(&short).await {
        Err(AppError::Validation { field_errors, .. }) => {
            assert!(field_errors.contains_key("title"));
            assert!(field_errors.contains_key("prompt_content"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let bad_color = CategoryForm {
        name: "Writing".to_string(),
        description: None,
        color: "#ZZZZZZ".to_string(),
    };
    match app.context.categories.create(&bad_color).await {
        Err(AppError::Validation { field_errors, .. }) => assert!(field_errors.contains_key("color")),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(app.memory.rows(Table::Categories).is_empty());
    Ok(())
}

#[tokio::test]
async fn only_owner_or_admin_may_delete() -> Result<()> {
    let app = TestApp::start().await?;
    let owner = common::seed_member(&app.memory, "owner@example.com", UserRole::User);
    common::seed_member(&app.memory, "other@example.com", UserRole::User);
    common::seed_member(&app.memory, "admin@example.com", UserRole::Admin);
    let first = common::seed_prompt(&app.memory, owner, "First", &[]);
    let second = common::seed_prompt(&app.memory, owner, "Second", &[]);

    app.sign_in("other@example.com").await?;
    let view = app.context.prompts.get(first).await?;
    assert!(!view.can_edit && !view.can_delete);
    let err = app.context.prompts.delete(first).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = app.context.prompts.update(first, &prompt_form("Hijacked")).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(app.memory.rows(Table::Prompts).len(), 2);

    app.context.session.sign_out().await;
    app.sign_in("admin@example.com").await?;
    app.context.prompts.delete(first).await?;

    app.context.session.sign_out().await;
    app.sign_in("owner@example.com").await?;
    let updated = app.context.prompts.update(second, &prompt_form("Second, revised")).await?;
    assert_eq!(updated.prompt.title, "Second, revised");
    assert!(updated.prompt.updated_at >= updated.prompt.created_at);

    let remaining: Vec<_> = app.memory.rows(Table::Prompts);
    assert_eq!(remaining.len(), 1);
    Ok(())
}

#[tokio::test]
async fn record_use_returns_incremented_prompt() -> Result<()> {
    let app = TestApp::start().await?;
    let owner = common::seed_member(&app.memory, "user@example.com", UserRole::User);
    let id = common::seed_prompt(&app.memory, owner, "Copy me", &[]);
    app.sign_in("user@example.com").await?;

    app.context.prompts.record_use(id).await?;
    let used = app.context.prompts.record_use(id).await?;
    assert_eq!(used.prompt.usage_count, 2);

    let err = app.context.prompts.record_use(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn deleting_a_category_keeps_its_prompts_listable() -> Result<()> {
    let app = TestApp::start().await?;
    common::seed_member(&app.memory, "admin@example.com", UserRole::Admin);
    app.sign_in("admin@example.com").await?;

    let category = app
        .context
        .categories
        .create(&CategoryForm {
            name: "Ops".to_string(),
            description: Some("  ".to_string()),
            color: "#10b981".to_string(),
        })
        .await?;
    assert_eq!(category.description, None);

    let form = PromptForm {
        category_id: Some(category.id),
        ..prompt_form("Runbook")
    };
    let prompt = app.context.prompts.create(&form).await?;
    assert_eq!(prompt.category.as_ref().map(|c| c.id), Some(category.id));

    app.context.categories.delete(category.id).await?;
    let view = app.context.prompts.get(prompt.prompt.id).await?;
    assert!(view.prompt.category.is_none());
    Ok(())
}

#[tokio::test]
async fn category_changes_need_an_admin() -> Result<()> {
    let app = TestApp::start().await?;
    common::seed_member(&app.memory, "member@example.com", UserRole::User);
    app.sign_in("member@example.com").await?;

    let form = CategoryForm {
        name: "Marketing".to_string(),
        description: None,
        color: "#F59E0B".to_string(),
    };
    let err = app.context.categories.create(&form).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    // Everyone signed in can read them
    assert!(app.context.categories.list().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn admins_manage_roles() -> Result<()> {
    let app = TestApp::start().await?;
    let admin = common::seed_member(&app.memory, "admin@example.com", UserRole::Admin);
    let member = common::seed_member(&app.memory, "member@example.com", UserRole::User);

    app.sign_in("member@example.com").await?;
    assert!(matches!(app.context.users.list().await, Err(AppError::Forbidden(_))));
    assert!(matches!(
        app.context.users.set_role(member, UserRole::Admin).await,
        Err(AppError::Forbidden(_))
    ));

    app.context.session.sign_out().await;
    app.sign_in("admin@example.com").await?;
    assert_eq!(app.context.users.list().await?.len(), 2);
    let promoted = app.context.users.set_role(member, UserRole::Admin).await?;
    assert!(promoted.is_admin());

    // Demoting yourself takes effect on the live session
    app.context.users.set_role(admin, UserRole::User).await?;
    assert!(!app.context.session.is_admin());
    Ok(())
}
