use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::{BackendError, Store, Table, INCREMENT_USAGE_FN};
use crate::database::models::{
    Category, CategoryInsert, CategoryUpdate, Profile, ProfileInsert, ProfileUpdate, PromptInsert, PromptUpdate,
    PromptWithDetails,
};
use crate::error::{AppError, AppResult};
use crate::filter::{Filter, SortDirection};

/// Partial update payload. Tables with an `updated_at` column stamp it.
pub trait Patch: Serialize + Send + Sync {
    fn touch(&mut self, _now: DateTime<Utc>) {}
}

/// Binds a row type to its table and its insert/update shapes.
pub trait TableRow: DeserializeOwned + Send + Sync {
    const TABLE: Table;
    type Insert: Serialize + Send + Sync;
    type Update: Patch;

    fn default_order() -> (&'static str, SortDirection);

    /// Relations embedded on every read.
    fn with_embeds(filter: Filter) -> Filter {
        filter
    }
}

impl Patch for ProfileUpdate {
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}

impl Patch for PromptUpdate {
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}

impl Patch for CategoryUpdate {}

impl TableRow for Profile {
    const TABLE: Table = Table::Profiles;
    type Insert = ProfileInsert;
    type Update = ProfileUpdate;

    fn default_order() -> (&'static str, SortDirection) {
        ("created_at", SortDirection::Desc)
    }
}

impl TableRow for Category {
    const TABLE: Table = Table::Categories;
    type Insert = CategoryInsert;
    type Update = CategoryUpdate;

    fn default_order() -> (&'static str, SortDirection) {
        ("name", SortDirection::Asc)
    }
}

impl TableRow for PromptWithDetails {
    const TABLE: Table = Table::Prompts;
    type Insert = PromptInsert;
    type Update = PromptUpdate;

    fn default_order() -> (&'static str, SortDirection) {
        ("created_at", SortDirection::Desc)
    }

    fn with_embeds(filter: Filter) -> Filter {
        filter
            .embed("category", Table::Categories, "category_id")
            .embed("profile", Table::Profiles, "created_by")
    }
}

/// Typed access to one table. The only place backend queries are built.
pub struct Repository<T> {
    store: Arc<dyn Store>,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: TableRow> Repository<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    fn decode(value: Value) -> AppResult<T> {
        serde_json::from_value(value)
            .map_err(|e| AppError::backend(format!("Malformed {} row: {}", T::TABLE, e)))
    }

    fn by_id(id: Uuid) -> Filter {
        T::with_embeds(Filter::by_id(id))
    }

    /// Rows matching `filter`, in the table's default order unless the
    /// filter sets its own.
    pub async fn list(&self, filter: Filter) -> AppResult<Vec<T>> {
        let mut filter = T::with_embeds(filter);
        if filter.order_by().is_empty() {
            let (column, sort) = T::default_order();
            filter = filter.order(column, sort);
        }
        let rows = self.store.select(T::TABLE, &filter).await.map_err(query_error)?;
        rows.into_iter().map(Self::decode).collect()
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<T>> {
        let rows = self
            .store
            .select(T::TABLE, &Self::by_id(id).limit(1))
            .await
            .map_err(query_error)?;
        rows.into_iter().next().map(Self::decode).transpose()
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<T> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("{} {} not found", T::TABLE, id)))
    }

    pub async fn create(&self, insert: &T::Insert) -> AppResult<T> {
        let row = serde_json::to_value(insert)
            .map_err(|e| AppError::backend(format!("Cannot encode {} row: {}", T::TABLE, e)))?;
        let created = self
            .store
            .insert(T::TABLE, row, &T::with_embeds(Filter::new()))
            .await
            .map_err(query_error)?;
        Self::decode(created)
    }

    pub async fn update(&self, id: Uuid, mut patch: T::Update) -> AppResult<T> {
        patch.touch(Utc::now());
        let patch = serde_json::to_value(&patch)
            .map_err(|e| AppError::backend(format!("Cannot encode {} patch: {}", T::TABLE, e)))?;
        let rows = self
            .store
            .update(T::TABLE, &Self::by_id(id), patch)
            .await
            .map_err(query_error)?;
        match rows.into_iter().next() {
            Some(row) => Self::decode(row),
            None => Err(AppError::not_found(format!("{} {} not found", T::TABLE, id))),
        }
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.store
            .delete(T::TABLE, &Filter::by_id(id))
            .await
            .map_err(query_error)
    }
}

impl Repository<Profile> {
    pub async fn get_by_email(&self, email: &str) -> AppResult<Profile> {
        let filter = Filter::new().eq("email", email).limit(1);
        let rows = self.store.select(Table::Profiles, &filter).await.map_err(query_error)?;
        match rows.into_iter().next() {
            Some(row) => Self::decode(row),
            None => Err(AppError::not_found(format!("No profile for {}", email))),
        }
    }
}

impl Repository<PromptWithDetails> {
    /// Atomic server-side `usage_count + 1`.
    pub async fn increment_usage(&self, id: Uuid) -> AppResult<()> {
        self.store
            .rpc(INCREMENT_USAGE_FN, json!({ "prompt_id": id }))
            .await
            .map_err(query_error)?;
        Ok(())
    }
}

// Data-layer failures other than a missing row or rejected token surface as
// backend errors, timeouts included.
fn query_error(err: BackendError) -> AppError {
    match err {
        BackendError::NotFound(_) | BackendError::Unauthorized(_) => AppError::from(err),
        other => {
            tracing::warn!(error = %other, "backend query failed");
            AppError::backend(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::database::models::{HexColor, UserRole};

    fn seeded() -> (Arc<MemoryBackend>, Uuid) {
        let backend = Arc::new(MemoryBackend::new());
        let id = Uuid::new_v4();
        backend
            .insert_row(Table::Profiles, json!({"id": id, "email": "owner@example.com"}))
            .unwrap();
        (backend, id)
    }

    #[tokio::test]
    async fn categories_list_by_name() {
        let (backend, owner) = seeded();
        let repo: Repository<Category> = Repository::new(backend.clone());
        for name in ["Zeta", "alpha", "Mid"] {
            repo.create(&CategoryInsert {
                name: name.into(),
                description: None,
                color: "#336699".parse::<HexColor>().unwrap(),
                created_by: owner,
            })
            .await
            .unwrap();
        }
        let names: Vec<String> = repo.list(Filter::new()).await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "Mid", "Zeta"]);
    }

    #[tokio::test]
    async fn update_stamps_profile_timestamp() {
        let (backend, id) = seeded();
        let repo: Repository<Profile> = Repository::new(backend.clone());
        let before = repo.get_by_id(id).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let after = repo.update(id, ProfileUpdate::role(UserRole::Admin)).await.unwrap();
        assert_eq!(after.role, UserRole::Admin);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let (backend, _) = seeded();
        let repo: Repository<PromptWithDetails> = Repository::new(backend);
        let missing = Uuid::new_v4();
        assert!(matches!(repo.get_by_id(missing).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            repo.update(missing, PromptUpdate::default()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(repo.find_by_id(missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prompts_embed_author() {
        let (backend, owner) = seeded();
        let repo: Repository<PromptWithDetails> = Repository::new(backend);
        let created = repo
            .create(&PromptInsert {
                title: "Release notes".into(),
                description: None,
                prompt_content: "Write release notes for the diff".into(),
                category_id: None,
                tags: vec!["writing".into()],
                is_public: true,
                created_by: owner,
            })
            .await
            .unwrap();
        assert_eq!(created.profile.as_ref().map(|p| p.id), Some(owner));
        assert!(created.category.is_none());

        repo.increment_usage(created.prompt.id).await.unwrap();
        assert_eq!(repo.get_by_id(created.prompt.id).await.unwrap().prompt.usage_count, 1);
    }

    #[tokio::test]
    async fn get_by_email_finds_profile() {
        let (backend, id) = seeded();
        let repo: Repository<Profile> = Repository::new(backend);
        assert_eq!(repo.get_by_email("owner@example.com").await.unwrap().id, id);
        assert!(matches!(repo.get_by_email("nobody@example.com").await, Err(AppError::NotFound(_))));
    }
}
