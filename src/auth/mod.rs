//! Session/auth manager and the identity types shared with the backend.

pub mod claims;
pub mod manager;
pub mod session;

pub use claims::{Claims, JwtError};
pub use manager::{ManagerOptions, ProfileStatus, SessionManager, SessionState, SessionSummary, Subscription};
pub use session::{AuthChangeEvent, AuthEvent, Session, User, UserMetadata};
