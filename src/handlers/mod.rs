pub mod auth;
pub mod guests;
