//! Token set lifecycle: storage, transparent refresh, identity decoding, revocation.
//!
//! The manager keys everything by caller-supplied [`SessionKey`]s and guarantees that
//! concurrent demands for an expired set coalesce into a single upstream refresh: the
//! first caller through the per-key guard performs the call, everyone else observes the
//! replaced set after the guard releases.

// self
use crate::{
	_prelude::*,
	auth::{IdentityClaims, ProviderId, SessionKey, TokenSet},
	codec::{self, IdTokenKey, JwkSet},
	error::{ConfigError, ProtocolError, TransientError},
	http::{GatewayRequest, GatewayResponse, HttpGateway},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderRegistry,
};

/// Owns issued token sets and performs every post-authorization provider call.
pub struct TokenManager {
	registry: Arc<ProviderRegistry>,
	gateway: Arc<dyn HttpGateway>,
	sets: RwLock<HashMap<SessionKey, TokenSet>>,
	refresh_guards: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
	// JWKS documents barely rotate; one fetch per provider per process is enough.
	jwks_cache: Mutex<HashMap<ProviderId, Arc<JwkSet>>>,
}
impl TokenManager {
	/// Creates a manager over the shared registry and gateway.
	pub fn new(registry: Arc<ProviderRegistry>, gateway: Arc<dyn HttpGateway>) -> Self {
		Self {
			registry,
			gateway,
			sets: Default::default(),
			refresh_guards: Default::default(),
			jwks_cache: Default::default(),
		}
	}

	/// Stores a token set under the key, atomically replacing any previous set.
	pub fn store(&self, key: SessionKey, set: TokenSet) {
		self.sets.write().insert(key, set);
	}

	/// Returns the stored set without freshness checks or side effects.
	pub fn current(&self, key: &SessionKey) -> Option<TokenSet> {
		self.sets.read().get(key).cloned()
	}

	/// Removes and returns the stored set.
	///
	/// The per-key refresh guard is dropped alongside the set, so long-lived managers do
	/// not accumulate guards for keys that no longer hold tokens. Callers already queued
	/// on the old guard still serialize against each other and then observe the missing
	/// set.
	pub fn remove(&self, key: &SessionKey) -> Option<TokenSet> {
		self.refresh_guards.lock().remove(key);

		self.sets.write().remove(key)
	}

	/// Returns a usable token set, refreshing it first when it has gone stale.
	///
	/// Fresh sets return immediately without locking. Stale sets funnel through the
	/// per-key guard; whichever caller wins re-checks freshness after acquisition, so a
	/// refresh completed by the winner satisfies every queued caller without another
	/// upstream call. Unknown keys and unrefreshable stale sets yield
	/// [`Error::TokenExpired`].
	pub async fn get_valid(&self, key: &SessionKey) -> Result<TokenSet> {
		if let Some(set) = self.current(key)
			&& set.is_fresh()
		{
			return Ok(set);
		}

		let guard = self.refresh_guard(key);
		let _singleflight = guard.lock().await;
		let set = self.current(key).ok_or(Error::TokenExpired)?;

		if set.is_fresh() {
			return Ok(set);
		}

		self.refresh_locked(key, set).await
	}

	/// Forces a refresh regardless of local freshness.
	///
	/// Callers use this after the provider answered `401` for a set the manager still
	/// considered fresh (or for sets without a known expiry).
	pub async fn refresh(&self, key: &SessionKey) -> Result<TokenSet> {
		let guard = self.refresh_guard(key);
		let _singleflight = guard.lock().await;
		let set = self.current(key).ok_or(Error::TokenExpired)?;

		self.refresh_locked(key, set).await
	}

	/// Formats an `Authorization` header value from a guaranteed-fresh set.
	pub async fn bearer_header(&self, key: &SessionKey) -> Result<String> {
		Ok(self.get_valid(key).await?.authorization_header())
	}

	/// Verifies and decodes the stored identity token into canonical claims.
	///
	/// Key material comes from the provider's JWKS endpoint when declared (fetched once
	/// and cached), falling back to the client secret for HS256 providers. When
	/// `expected_nonce` is `None`, the nonce bound at authorization time is used.
	pub async fn decode_identity(
		&self,
		key: &SessionKey,
		expected_nonce: Option<&str>,
	) -> Result<IdentityClaims> {
		let set = self.current(key).ok_or(Error::TokenExpired)?;
		let id_token = set.id_token.as_ref().ok_or(ConfigError::MissingIdToken)?;
		let registration = self.registry.resolve(&set.provider)?;
		let metadata = &registration.metadata;
		let credentials = &registration.credentials;
		let id_token_key = if let Some(jwks_url) = metadata.endpoints.jwks.clone() {
			IdTokenKey::Jwks(self.jwks(&set.provider, jwks_url).await?)
		} else if let Some(secret) = credentials.client_secret.clone() {
			IdTokenKey::ClientSecret(secret)
		} else {
			return Err(ConfigError::MissingSigningKey { provider: set.provider.to_string() }.into());
		};
		let claims = codec::decode_identity_token(
			id_token.expose(),
			&id_token_key,
			metadata.issuer.as_deref(),
			&credentials.client_id,
			expected_nonce.or(set.nonce.as_deref()),
			&metadata.claim_map,
		)?;

		Ok(claims)
	}

	/// Revokes the stored set upstream (RFC 7009) and drops it locally.
	///
	/// Providers without a revocation endpoint only get the local drop. The refresh
	/// token is the revocation target when present, since revoking it invalidates the
	/// whole grant; otherwise the access token is revoked directly.
	pub async fn revoke(&self, key: &SessionKey) -> Result<()> {
		const KIND: FlowKind = FlowKind::Revoke;

		let set = self.current(key).ok_or(Error::TokenExpired)?;
		let span = FlowSpan::new(KIND, &set.provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.revoke_inner(&set)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result?;
		self.remove(key);

		Ok(())
	}

	async fn revoke_inner(&self, set: &TokenSet) -> Result<()> {
		let registration = self.registry.resolve(&set.provider)?;
		let Some(revocation) = registration.metadata.endpoints.revocation.clone() else {
			return Ok(());
		};
		let credentials = &registration.credentials;
		let (token, hint) = match set.refresh_token.as_ref() {
			Some(refresh_token) => (refresh_token.expose(), "refresh_token"),
			None => (set.access_token.expose(), "access_token"),
		};
		let mut fields =
			vec![("token", token), ("token_type_hint", hint), ("client_id", &credentials.client_id)];

		if let Some(secret) = credentials.client_secret.as_ref() {
			fields.push(("client_secret", secret.expose()));
		}

		let request = GatewayRequest::form_post(
			revocation,
			&fields,
			registration.metadata.token_encoding.accept(),
		);
		let response = self.gateway.send(request).await?;

		if !response.is_success() {
			return Err(exchange_failure(&response).into());
		}

		Ok(())
	}

	/// Performs the upstream refresh; the caller must hold the per-key guard.
	async fn refresh_locked(&self, key: &SessionKey, current: TokenSet) -> Result<TokenSet> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, &current.provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_inner(key, current)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn refresh_inner(&self, key: &SessionKey, current: TokenSet) -> Result<TokenSet> {
		let refresh_token = current.refresh_token.clone().ok_or(Error::TokenExpired)?;
		let registration = self.registry.resolve(&current.provider)?;
		let metadata = &registration.metadata;
		let credentials = &registration.credentials;
		let mut fields = vec![
			("grant_type", "refresh_token"),
			("refresh_token", refresh_token.expose()),
			("client_id", credentials.client_id.as_str()),
		];

		if let Some(secret) = credentials.client_secret.as_ref() {
			fields.push(("client_secret", secret.expose()));
		}

		let request = GatewayRequest::form_post(
			metadata.endpoints.token.clone(),
			&fields,
			metadata.token_encoding.accept(),
		);
		let response = self.gateway.send(request).await?;

		if !response.is_success() {
			// `invalid_grant` means the refresh token itself is dead; keeping the set would
			// only produce the same failure forever.
			if let Some(error) = codec::decode_error_response(&response.body)
				&& error.error == "invalid_grant"
			{
				self.remove(key);

				return Err(Error::RefreshRevoked);
			}

			return Err(exchange_failure(&response).into());
		}

		let decoded = codec::decode_token_response(&response.body, metadata.token_encoding)?;
		let scope = match decoded.scope.as_deref() {
			Some(raw) => raw.parse().map_err(|_| ProtocolError::MalformedResponse {
				detail: "scope parameter is not a valid scope list".into(),
			})?,
			None => current.scope.clone(),
		};
		let mut builder = TokenSet::builder(current.provider.clone(), scope)
			.access_token(decoded.access_token)
			.token_type(decoded.token_type)
			.refresh_secret(
				// Providers that do not rotate refresh tokens omit the field; the prior
				// secret stays valid in that case.
				decoded.refresh_token.map(crate::auth::TokenSecret::new).or(current.refresh_token),
			);

		if let Some(seconds) = decoded.expires_in {
			builder = builder.expires_in(Duration::seconds(seconds));
		}

		builder = match decoded.id_token {
			// A newly minted identity token is not bound to the original nonce.
			Some(id_token) => builder.id_token(id_token).nonce(None),
			None => {
				if let Some(id_token) = current.id_token.as_ref() {
					builder = builder.id_token(id_token.expose());
				}

				builder.nonce(current.nonce)
			},
		};

		let refreshed = builder.build().map_err(ConfigError::from)?;

		// Inserted while the per-key guard is still held, so queued callers observe the
		// replacement before they get a chance to start their own refresh.
		self.store(key.clone(), refreshed.clone());

		Ok(refreshed)
	}

	async fn jwks(&self, provider: &ProviderId, url: Url) -> Result<Arc<JwkSet>> {
		if let Some(jwks) = self.jwks_cache.lock().get(provider).cloned() {
			return Ok(jwks);
		}

		// The cache lock is not held across the fetch; a racing duplicate fetch is
		// harmless and the last writer wins.
		let response = self.gateway.send(GatewayRequest::get_json(url)).await?;

		if !response.is_success() {
			return Err(TransientError::transport_message(format!(
				"JWKS endpoint answered HTTP {}",
				response.status
			))
			.into());
		}

		let jwks: JwkSet =
			serde_json::from_slice(&response.body).map_err(|err| ProtocolError::MalformedResponse {
				detail: format!("JWKS document: {err}"),
			})?;
		let jwks = Arc::new(jwks);

		self.jwks_cache.lock().insert(provider.clone(), jwks.clone());

		Ok(jwks)
	}

	fn refresh_guard(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
		self.refresh_guards.lock().entry(key.clone()).or_default().clone()
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("registry", &self.registry)
			.field("sets", &self.sets.read().len())
			.finish_non_exhaustive()
	}
}

fn exchange_failure(response: &GatewayResponse) -> ProtocolError {
	ProtocolError::TokenExchangeFailed { status: response.status, body: response.body_text() }
}
