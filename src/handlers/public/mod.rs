// handlers/public/mod.rs - Handlers reachable without a session
//
// Every form is validated before the backend is contacted.

pub mod auth;
pub mod health;

pub use auth::*;
pub use health::*;
