//! Provider-facing metadata (data) and the registry that owns it.
//!
//! Provider differences — endpoints, supported scopes, claim names, response
//! encodings, PKCE requirements — live entirely in [`ProviderMetadata`]. Flows select
//! behavior from those flags, so adding a provider means registering metadata and
//! credentials, never writing new flow code.

pub mod metadata;
pub mod registry;
pub mod well_known;

pub use metadata::*;
pub use registry::*;
