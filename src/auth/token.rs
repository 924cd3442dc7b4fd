//! Token models: redacted secrets, issued token sets, and decoded identity claims.

pub mod claims;
pub mod secret;
pub mod set;
