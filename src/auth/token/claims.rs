//! Decoded identity claims in their canonical shape.

// self
use crate::_prelude::*;

/// Canonical identity attributes decoded from an identity token.
///
/// Values are translated from provider-specific claim names via the provider's claim
/// map and recomputed on demand; the engine never persists them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
	/// Stable subject identifier assigned by the provider.
	pub subject: String,
	/// Issuer the token was minted by.
	pub issuer: Option<String>,
	/// Audience the token was minted for (the client identifier).
	pub audience: Option<String>,
	/// End-user email, when the provider includes one.
	pub email: Option<String>,
	/// End-user display name, when the provider includes one.
	pub name: Option<String>,
	/// Instant the token was issued at.
	pub issued_at: Option<OffsetDateTime>,
	/// Instant the token expires at.
	pub expires_at: Option<OffsetDateTime>,
}
