//! Validated provider descriptors consumed by every flow.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet},
};

/// Wire encoding a provider uses for token endpoint responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEncoding {
	/// `application/json` bodies (the OAuth 2.0 default).
	#[default]
	Json,
	/// `application/x-www-form-urlencoded` bodies (GitHub's default).
	Form,
}
impl TokenEncoding {
	/// Media type to request via the `Accept` header.
	pub fn accept(self) -> &'static str {
		match self {
			TokenEncoding::Json => "application/json",
			TokenEncoding::Form => "application/x-www-form-urlencoded",
		}
	}
}

/// Translation table from canonical identity attributes to provider claim names.
///
/// Defaults follow the standard OIDC claim names; providers that deviate override the
/// affected fields only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimMap {
	/// Claim carrying the stable subject identifier.
	pub subject: String,
	/// Claim carrying the issuer.
	pub issuer: String,
	/// Claim carrying the audience.
	pub audience: String,
	/// Claim carrying the end-user email.
	pub email: String,
	/// Claim carrying the end-user display name.
	pub name: String,
	/// Claim carrying the issued-at timestamp.
	pub issued_at: String,
	/// Claim carrying the expiry timestamp.
	pub expires_at: String,
	/// Claim carrying the replay-protection nonce.
	pub nonce: String,
}
impl Default for ClaimMap {
	fn default() -> Self {
		Self {
			subject: "sub".into(),
			issuer: "iss".into(),
			audience: "aud".into(),
			email: "email".into(),
			name: "name".into(),
			issued_at: "iat".into(),
			expires_at: "exp".into(),
			nonce: "nonce".into(),
		}
	}
}

/// Endpoint set declared by a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the end-user is redirected to.
	pub authorization: Url,
	/// Token endpoint used for exchanges and refreshes.
	pub token: Url,
	/// Optional RFC 7009 revocation endpoint.
	pub revocation: Option<Url>,
	/// Optional JWKS endpoint publishing identity-token signing keys.
	pub jwks: Option<Url>,
}

/// Immutable descriptor of a provider's endpoints, scopes, and quirks.
///
/// Instances are validated at build time and never mutate after registration, which is
/// what makes lock-free concurrent reads from the registry safe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
	/// Provider identifier.
	pub id: ProviderId,
	/// Endpoint definitions.
	pub endpoints: ProviderEndpoints,
	/// Expected `iss` value of identity tokens, when the provider mints them.
	pub issuer: Option<String>,
	/// Scopes the provider accepts; authorization requests must stay inside this set.
	pub supported_scopes: ScopeSet,
	/// Canonical-to-provider claim name translation.
	pub claim_map: ClaimMap,
	/// Indicates whether authorization requests must carry a PKCE challenge.
	pub requires_pkce: bool,
	/// Wire encoding of token endpoint responses.
	pub token_encoding: TokenEncoding,
}
impl ProviderMetadata {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderMetadataBuilder {
		ProviderMetadataBuilder::new(id)
	}

	fn validate(&self) -> Result<(), ProviderMetadataError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;

		if let Some(revocation) = self.endpoints.revocation.as_ref() {
			validate_endpoint("revocation", revocation)?;
		}
		if let Some(jwks) = self.endpoints.jwks.as_ref() {
			validate_endpoint("jwks", jwks)?;
		}

		Ok(())
	}
}

/// Errors raised while constructing or validating provider metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderMetadataError {
	/// Authorization endpoint is required.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is required.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must be absolute HTTPS URIs.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`ProviderMetadata`] values.
#[derive(Debug)]
pub struct ProviderMetadataBuilder {
	id: ProviderId,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	revocation_endpoint: Option<Url>,
	jwks_endpoint: Option<Url>,
	issuer: Option<String>,
	supported_scopes: ScopeSet,
	claim_map: ClaimMap,
	requires_pkce: bool,
	token_encoding: TokenEncoding,
}
impl ProviderMetadataBuilder {
	fn new(id: ProviderId) -> Self {
		Self {
			id,
			authorization_endpoint: None,
			token_endpoint: None,
			revocation_endpoint: None,
			jwks_endpoint: None,
			issuer: None,
			supported_scopes: ScopeSet::default(),
			claim_map: ClaimMap::default(),
			requires_pkce: false,
			token_encoding: TokenEncoding::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the optional revocation endpoint.
	pub fn revocation_endpoint(mut self, url: Url) -> Self {
		self.revocation_endpoint = Some(url);

		self
	}

	/// Sets the optional JWKS endpoint.
	pub fn jwks_endpoint(mut self, url: Url) -> Self {
		self.jwks_endpoint = Some(url);

		self
	}

	/// Sets the expected identity-token issuer.
	pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
		self.issuer = Some(issuer.into());

		self
	}

	/// Declares the scopes the provider accepts.
	pub fn supported_scopes(mut self, scopes: ScopeSet) -> Self {
		self.supported_scopes = scopes;

		self
	}

	/// Overrides the claim translation table.
	pub fn claim_map(mut self, claim_map: ClaimMap) -> Self {
		self.claim_map = claim_map;

		self
	}

	/// Requires a PKCE challenge on every authorization request.
	pub fn requires_pkce(mut self, requires_pkce: bool) -> Self {
		self.requires_pkce = requires_pkce;

		self
	}

	/// Sets the token endpoint response encoding.
	pub fn token_encoding(mut self, encoding: TokenEncoding) -> Self {
		self.token_encoding = encoding;

		self
	}

	/// Consumes the builder and validates the resulting metadata.
	pub fn build(self) -> Result<ProviderMetadata, ProviderMetadataError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderMetadataError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderMetadataError::MissingTokenEndpoint)?;
		let metadata = ProviderMetadata {
			id: self.id,
			endpoints: ProviderEndpoints {
				authorization,
				token,
				revocation: self.revocation_endpoint,
				jwks: self.jwks_endpoint,
			},
			issuer: self.issuer,
			supported_scopes: self.supported_scopes,
			claim_map: self.claim_map,
			requires_pkce: self.requires_pkce,
			token_encoding: self.token_encoding,
		};

		metadata.validate()?;

		Ok(metadata)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderMetadataError> {
	if url.scheme() != "https" {
		Err(ProviderMetadataError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}
