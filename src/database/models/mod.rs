pub mod category;
pub mod profile;
pub mod prompt;

pub use category::{Category, CategoryInsert, CategoryUpdate, HexColor, InvalidHexColor};
pub use profile::{Profile, ProfileInsert, ProfileUpdate, UserRole};
pub use prompt::{filter_by_tags, Prompt, PromptFilters, PromptInsert, PromptUpdate, PromptWithDetails};
