//! Issued token sets and their builder.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, token::secret::TokenSecret},
};

/// Errors produced by [`TokenSetBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenSetBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no token type was provided.
	#[error("Token type is required.")]
	MissingTokenType,
	/// Issued when the expiry instant precedes the issued-at instant.
	#[error("Expiry must not precede the issued-at instant.")]
	ExpiryBeforeIssue,
}

/// Bundle of access/refresh/identity tokens issued for one authorization.
///
/// A set is never mutated in place: refresh produces a new set that atomically
/// supersedes the old one inside the token manager.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
	/// Provider that minted the tokens.
	pub provider: ProviderId,
	/// Normalized scopes granted to this set.
	pub scope: ScopeSet,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Raw encoded identity token, if the provider issued one.
	pub id_token: Option<TokenSecret>,
	/// Token type reported by the provider (usually `Bearer`).
	pub token_type: String,
	/// Instant the set was produced by the exchange or refresh.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from the provider-reported lifetime; `None` means the set
	/// never expires on its own but stays refreshable on 401 feedback.
	pub expires_at: Option<OffsetDateTime>,
	/// Nonce bound to the authorization request this set was exchanged from; used to
	/// check the identity token's replay-protection claim.
	pub nonce: Option<String>,
}
impl TokenSet {
	/// Safety margin subtracted from `expires_at` before a set counts as usable.
	///
	/// The identity-token codec applies the same tolerance to `exp`/`iat`/`nbf` checks.
	pub const EXPIRY_SKEW: Duration = Duration::seconds(30);

	/// Returns a builder for the provider + scope pair.
	pub fn builder(provider: ProviderId, scope: ScopeSet) -> TokenSetBuilder {
		TokenSetBuilder::new(provider, scope)
	}

	/// Returns true while `instant` is comfortably before expiry (skew applied).
	///
	/// Sets without an expiry are always considered fresh.
	pub fn is_fresh_at(&self, instant: OffsetDateTime) -> bool {
		match self.expires_at {
			Some(expires_at) => instant < expires_at - Self::EXPIRY_SKEW,
			None => true,
		}
	}

	/// Convenience helper that checks freshness against the current UTC instant.
	pub fn is_fresh(&self) -> bool {
		self.is_fresh_at(OffsetDateTime::now_utc())
	}

	/// Formats the `Authorization` header value for authenticated requests.
	pub fn authorization_header(&self) -> String {
		format!("{} {}", self.token_type, self.access_token.expose())
	}
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("provider", &self.provider)
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenSet`].
#[derive(Clone, Debug)]
pub struct TokenSetBuilder {
	provider: ProviderId,
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	id_token: Option<TokenSecret>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	nonce: Option<String>,
}
impl TokenSetBuilder {
	fn new(provider: ProviderId, scope: ScopeSet) -> Self {
		Self {
			provider,
			scope,
			access_token: None,
			refresh_token: None,
			id_token: None,
			token_type: None,
			issued_at: None,
			expires_in: None,
			nonce: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an already-wrapped refresh token secret, when carrying one forward.
	pub fn refresh_secret(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Provides the raw encoded identity token.
	pub fn id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the token type reported by the provider.
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Binds the authorization-request nonce for later identity decoding.
	pub fn nonce(mut self, nonce: Option<String>) -> Self {
		self.nonce = nonce;

		self
	}

	/// Consumes the builder and produces a [`TokenSet`].
	pub fn build(self) -> Result<TokenSet, TokenSetBuilderError> {
		let access_token = self.access_token.ok_or(TokenSetBuilderError::MissingAccessToken)?;
		let token_type = self.token_type.ok_or(TokenSetBuilderError::MissingTokenType)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match self.expires_in {
			Some(delta) if delta.is_negative() =>
				return Err(TokenSetBuilderError::ExpiryBeforeIssue),
			Some(delta) => Some(issued_at + delta),
			None => None,
		};

		Ok(TokenSet {
			provider: self.provider,
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			id_token: self.id_token,
			token_type,
			issued_at,
			expires_at,
			nonce: self.nonce,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn provider() -> ProviderId {
		ProviderId::new("test").expect("Provider fixture should be valid.")
	}

	fn scope() -> ScopeSet {
		ScopeSet::new(["email"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn builder_derives_expiry_from_lifetime() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let set = TokenSet::builder(provider(), scope())
			.access_token("access")
			.token_type("Bearer")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token set builder should succeed.");

		assert_eq!(set.expires_at, Some(macros::datetime!(2025-01-01 01:00 UTC)));
		assert!(set.is_fresh_at(macros::datetime!(2025-01-01 00:59:29 UTC)));
		assert!(!set.is_fresh_at(macros::datetime!(2025-01-01 00:59:31 UTC)), "Skew applies.");
	}

	#[test]
	fn builder_rejects_negative_lifetimes() {
		let err = TokenSet::builder(provider(), scope())
			.access_token("access")
			.token_type("Bearer")
			.expires_in(Duration::seconds(-1))
			.build()
			.expect_err("Negative lifetime must be rejected.");

		assert_eq!(err, TokenSetBuilderError::ExpiryBeforeIssue);
	}

	#[test]
	fn sets_without_expiry_never_go_stale() {
		let set = TokenSet::builder(provider(), scope())
			.access_token("access")
			.token_type("Bearer")
			.build()
			.expect("Token set builder should succeed.");

		assert!(set.is_fresh_at(macros::datetime!(2100-01-01 00:00 UTC)));
	}

	#[test]
	fn authorization_header_joins_type_and_secret() {
		let set = TokenSet::builder(provider(), scope())
			.access_token("abc")
			.token_type("Bearer")
			.build()
			.expect("Token set builder should succeed.");

		assert_eq!(set.authorization_header(), "Bearer abc");
		assert!(!format!("{set:?}").contains("abc"), "Debug output must redact secrets.");
	}
}
