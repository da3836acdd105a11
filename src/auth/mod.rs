//! Session tokens, sign-in flows and the user's own profile.

pub mod profile;
pub mod session;
pub mod tokens;
pub mod validate;
