// handlers/mod.rs - Three tiers matching the authorization gate
//
// public    → no session required (/login, /register, /forgot-password, /logout)
// protected → signed in (/dashboard/*)
// elevated  → signed in with the admin role (/admin/*)

pub mod elevated;
pub mod protected;
pub mod public;
