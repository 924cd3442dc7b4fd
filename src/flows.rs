//! Authorization Code flow: redirect construction and callback completion.
//!
//! [`AuthorizationFlow::begin`] builds the provider redirect and records a pending
//! authorization keyed by a fingerprint of the state token. [`AuthorizationFlow::complete`]
//! consumes that entry exactly once and exchanges the returned code for a [`TokenSet`].

mod pending;

use pending::PendingStore;

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, TokenSet},
	codec,
	error::{ConfigError, ProtocolError},
	http::{GatewayRequest, GatewayResponse, HttpGateway},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	pkce::{self, PkcePair},
	provider::{ProviderRegistry, RegisteredProvider},
};

/// Scope that switches a plain OAuth authorization into an OIDC one.
const OPENID_SCOPE: &str = "openid";

/// Default lifetime of a pending authorization between `begin` and `complete`.
pub const DEFAULT_PENDING_TTL: Duration = Duration::minutes(10);

/// Redirect material returned by [`AuthorizationFlow::begin`].
#[derive(Clone, Debug)]
pub struct AuthorizationTicket {
	/// Fully-formed authorization URL to send the end-user to.
	pub authorize_url: Url,
	/// Opaque state token that must round-trip through the callback.
	pub state: String,
}

/// Query parameters captured from the provider's redirect back to the client.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
	/// Round-tripped state token.
	pub state: String,
	/// Authorization code, on success.
	pub code: Option<String>,
	/// OAuth error code, on denial.
	pub error: Option<String>,
	/// Optional human-readable denial description.
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Captures a successful callback carrying an authorization code.
	pub fn success(state: impl Into<String>, code: impl Into<String>) -> Self {
		Self { state: state.into(), code: Some(code.into()), ..Default::default() }
	}

	/// Captures a denial callback carrying an error code.
	pub fn denied(
		state: impl Into<String>,
		error: impl Into<String>,
		description: Option<String>,
	) -> Self {
		Self {
			state: state.into(),
			error: Some(error.into()),
			error_description: description,
			..Default::default()
		}
	}

	/// Extracts callback parameters from the full redirect URL.
	pub fn from_redirect_url(url: &Url) -> Result<Self, ProtocolError> {
		let mut params = Self::default();

		for (key, value) in url.query_pairs() {
			let value = value.into_owned();

			match key.as_ref() {
				"state" => params.state = value,
				"code" => params.code = Some(value),
				"error" => params.error = Some(value),
				"error_description" => params.error_description = Some(value),
				_ => {},
			}
		}

		if params.state.is_empty() {
			return Err(ProtocolError::MalformedResponse {
				detail: "callback carries no state parameter".into(),
			});
		}

		Ok(params)
	}
}

/// Orchestrates the Authorization Code flow for every registered provider.
///
/// The flow holds no per-provider code: everything provider-specific is read off the
/// resolved metadata at call time.
pub struct AuthorizationFlow {
	registry: Arc<ProviderRegistry>,
	gateway: Arc<dyn HttpGateway>,
	pending: PendingStore,
}
impl AuthorizationFlow {
	/// Creates a flow over the shared registry and gateway.
	pub fn new(registry: Arc<ProviderRegistry>, gateway: Arc<dyn HttpGateway>) -> Self {
		Self { registry, gateway, pending: PendingStore::new(DEFAULT_PENDING_TTL) }
	}

	/// Overrides how long a pending authorization stays consumable.
	pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
		self.pending = PendingStore::new(ttl);

		self
	}

	/// Builds the authorization redirect and records the attempt as pending.
	///
	/// Fails with [`ConfigError::UnsupportedScope`] when any requested scope falls
	/// outside the provider's supported set. A nonce is generated only for OIDC
	/// requests (those containing the `openid` scope); a PKCE challenge is attached
	/// whenever the provider metadata requires one.
	pub fn begin(&self, provider: &ProviderId, scopes: ScopeSet) -> Result<AuthorizationTicket> {
		const KIND: FlowKind = FlowKind::Authorize;

		let _span = FlowSpan::new(KIND, provider).entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = self.begin_inner(provider, scopes);

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Completes a callback: consumes the pending entry and exchanges the code.
	///
	/// Denial callbacks surface as [`ProtocolError::AuthorizationDenied`]; an unknown,
	/// expired, or replayed state surfaces as [`ProtocolError::InvalidState`]. The
	/// pending entry is consumed atomically, so a given state completes at most once
	/// even under concurrent callbacks.
	pub async fn complete(
		&self,
		provider: &ProviderId,
		callback: CallbackParams,
	) -> Result<TokenSet> {
		const KIND: FlowKind = FlowKind::Exchange;

		let span = FlowSpan::new(KIND, provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_inner(provider, callback)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	fn begin_inner(&self, provider: &ProviderId, scopes: ScopeSet) -> Result<AuthorizationTicket> {
		let registration = self.registry.resolve(provider)?;
		let metadata = &registration.metadata;

		if let Some(scope) = scopes.first_not_in(&metadata.supported_scopes) {
			return Err(ConfigError::UnsupportedScope {
				provider: provider.to_string(),
				scope: scope.to_owned(),
			}
			.into());
		}

		let state = pkce::state_token();
		let nonce = scopes.contains(OPENID_SCOPE).then(pkce::nonce_token);
		let pkce_pair = metadata.requires_pkce.then(PkcePair::generate);
		let authorize_url = build_authorize_url(
			&registration,
			&scopes,
			&state,
			nonce.as_deref(),
			pkce_pair.as_ref(),
		);

		self.pending.insert(
			&state,
			provider.clone(),
			scopes,
			nonce,
			pkce_pair.map(|pair| pair.verifier().clone()),
		);

		Ok(AuthorizationTicket { authorize_url, state })
	}

	async fn complete_inner(
		&self,
		provider: &ProviderId,
		callback: CallbackParams,
	) -> Result<TokenSet> {
		if let Some(code) = callback.error {
			return Err(ProtocolError::AuthorizationDenied {
				code,
				description: callback.error_description,
			}
			.into());
		}

		// Reject garbled callbacks before touching the pending entry; a valid retry with
		// the same state must still be able to complete.
		let code = callback.code.ok_or_else(|| ProtocolError::MalformedResponse {
			detail: "callback carries neither code nor error".into(),
		})?;
		let registration = self.registry.resolve(provider)?;
		let pending =
			self.pending.consume(&callback.state, provider).ok_or(ProtocolError::InvalidState)?;
		let metadata = &registration.metadata;
		let credentials = &registration.credentials;
		let mut fields = vec![
			("grant_type", "authorization_code"),
			("code", code.as_str()),
			("redirect_uri", credentials.redirect_uri.as_str()),
			("client_id", credentials.client_id.as_str()),
		];

		if let Some(secret) = credentials.client_secret.as_ref() {
			fields.push(("client_secret", secret.expose()));
		}
		if let Some(verifier) = pending.code_verifier.as_ref() {
			fields.push(("code_verifier", verifier.expose()));
		}

		let request = GatewayRequest::form_post(
			metadata.endpoints.token.clone(),
			&fields,
			metadata.token_encoding.accept(),
		);
		let response = self.gateway.send(request).await?;

		if !response.is_success() {
			return Err(exchange_failure(&response).into());
		}

		let decoded = codec::decode_token_response(&response.body, metadata.token_encoding)?;
		let scope = match decoded.scope.as_deref() {
			Some(raw) => raw.parse().map_err(|_| ProtocolError::MalformedResponse {
				detail: "scope parameter is not a valid scope list".into(),
			})?,
			// Providers may omit the echo; the requested scopes are the best estimate then.
			None => pending.scope,
		};
		let mut builder = TokenSet::builder(pending.provider, scope)
			.access_token(decoded.access_token)
			.token_type(decoded.token_type)
			.nonce(pending.nonce);

		if let Some(seconds) = decoded.expires_in {
			builder = builder.expires_in(Duration::seconds(seconds));
		}
		if let Some(refresh_token) = decoded.refresh_token {
			builder = builder.refresh_token(refresh_token);
		}
		if let Some(id_token) = decoded.id_token {
			builder = builder.id_token(id_token);
		}

		Ok(builder.build().map_err(ConfigError::from)?)
	}
}
impl Debug for AuthorizationFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationFlow").field("registry", &self.registry).finish_non_exhaustive()
	}
}

fn build_authorize_url(
	registration: &RegisteredProvider,
	scopes: &ScopeSet,
	state: &str,
	nonce: Option<&str>,
	pkce_pair: Option<&PkcePair>,
) -> Url {
	let mut url = registration.metadata.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", &registration.credentials.client_id);
	pairs.append_pair("redirect_uri", registration.credentials.redirect_uri.as_str());

	if !scopes.is_empty() {
		pairs.append_pair("scope", &scopes.normalized());
	}

	pairs.append_pair("state", state);

	if let Some(nonce) = nonce {
		pairs.append_pair("nonce", nonce);
	}
	if let Some(pkce_pair) = pkce_pair {
		pairs.append_pair("code_challenge", pkce_pair.challenge());
		pairs.append_pair("code_challenge_method", pkce_pair.method().as_str());
	}

	drop(pairs);

	url
}

fn exchange_failure(response: &GatewayResponse) -> ProtocolError {
	ProtocolError::TokenExchangeFailed { status: response.status, body: response.body_text() }
}
