//! Registry mapping provider identifiers to metadata + configured credentials.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, TokenSecret},
	error::ConfigError,
	provider::metadata::ProviderMetadata,
};

/// Client credentials configured for one provider registration.
#[derive(Clone)]
pub struct ClientCredentials {
	/// Public OAuth client identifier.
	pub client_id: String,
	/// Confidential client secret; absent for public/PKCE-only clients.
	pub client_secret: Option<TokenSecret>,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
}
impl ClientCredentials {
	/// Creates credentials for a public client.
	pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
		Self { client_id: client_id.into(), client_secret: None, redirect_uri }
	}

	/// Attaches a confidential client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("redirect_uri", &self.redirect_uri)
			.finish()
	}
}

/// One resolved registration: immutable metadata plus the credentials bound to it.
#[derive(Clone, Debug)]
pub struct RegisteredProvider {
	/// Shared provider metadata.
	pub metadata: Arc<ProviderMetadata>,
	/// Shared client credentials.
	pub credentials: Arc<ClientCredentials>,
}

/// Maps provider identifiers to metadata and credentials.
///
/// Registration happens at startup; afterwards the registry is read-mostly and every
/// flow resolves through a shared reference — there is no implicit global instance.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
	entries: RwLock<HashMap<ProviderId, RegisteredProvider>>,
}
impl ProviderRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a provider, failing when the identifier is already taken.
	pub fn register(
		&self,
		metadata: ProviderMetadata,
		credentials: ClientCredentials,
	) -> Result<(), ConfigError> {
		let mut entries = self.entries.write();

		if entries.contains_key(&metadata.id) {
			return Err(ConfigError::DuplicateProvider { provider: metadata.id.to_string() });
		}

		entries.insert(metadata.id.clone(), RegisteredProvider {
			metadata: Arc::new(metadata),
			credentials: Arc::new(credentials),
		});

		Ok(())
	}

	/// Resolves a provider registration by identifier.
	pub fn resolve(&self, provider: &ProviderId) -> Result<RegisteredProvider, ConfigError> {
		self.entries
			.read()
			.get(provider)
			.cloned()
			.ok_or_else(|| ConfigError::UnknownProvider { provider: provider.to_string() })
	}

	/// Identifiers of every registered provider.
	pub fn provider_ids(&self) -> Vec<ProviderId> {
		self.entries.read().keys().cloned().collect()
	}
}
