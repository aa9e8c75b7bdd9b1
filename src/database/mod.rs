//! Data-access layer: typed rows over the backend [`Store`](crate::backend::Store).

pub mod models;
pub mod repository;

pub use models::*;
pub use repository::{Patch, Repository, TableRow};

pub type ProfileRepository = Repository<Profile>;
pub type CategoryRepository = Repository<Category>;
pub type PromptRepository = Repository<PromptWithDetails>;
