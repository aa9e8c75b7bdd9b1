// handlers/elevated/mod.rs - Administration below /admin
//
// The gate only renders these for resolved admin profiles; the services
// check the role again.

pub mod categories;
pub mod overview;
pub mod users;

pub use categories::*;
pub use overview::*;
pub use users::*;
