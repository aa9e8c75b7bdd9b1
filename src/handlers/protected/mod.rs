// handlers/protected/mod.rs - Handlers that need a signed-in user
//
// The gate has already redirected anonymous requests to /login.

pub mod dashboard;
pub mod prompts;

pub use dashboard::*;
pub use prompts::*;
