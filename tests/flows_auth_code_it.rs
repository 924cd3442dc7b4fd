// self
use oidc_broker::{
	_preludet::*,
	auth::{ProviderId, ScopeSet},
	error::{ConfigError, ProtocolError, TransientError},
	flows::{AuthorizationFlow, CallbackParams},
	pkce,
	provider::{ClientCredentials, ProviderMetadata, ProviderRegistry, well_known},
};

fn provider(id: &str) -> ProviderId {
	ProviderId::new(id).expect("Provider identifier fixture should be valid.")
}

fn scopes(entries: &[&str]) -> ScopeSet {
	ScopeSet::new(entries.iter().copied()).expect("Scope fixture should be valid.")
}

fn build_flow(metadata: ProviderMetadata, secret: Option<&str>) -> (Arc<StubGateway>, AuthorizationFlow) {
	let registry = Arc::new(ProviderRegistry::new());
	let mut credentials = ClientCredentials::new(
		"client-id",
		Url::parse("https://app.example.com/callback").expect("Redirect URI fixture should parse."),
	);

	if let Some(secret) = secret {
		credentials = credentials.with_client_secret(secret);
	}

	registry.register(metadata, credentials).expect("Registration fixture should succeed.");

	let gateway = Arc::new(StubGateway::default());

	(gateway.clone(), AuthorizationFlow::new(registry, gateway))
}

fn query_value(url: &Url, key: &str) -> Option<String> {
	url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

fn form_value(request: &oidc_broker::http::GatewayRequest, key: &str) -> Option<String> {
	request.form_fields().into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

#[tokio::test]
async fn github_round_trip_decodes_the_form_response() {
	let (gateway, flow) = build_flow(well_known::github(), Some("client-secret"));
	let github = provider("github");
	let ticket =
		flow.begin(&github, scopes(&["read:user"])).expect("Begin should succeed for GitHub.");

	assert!(ticket.state.len() >= 32, "State must carry real entropy.");
	assert_eq!(query_value(&ticket.authorize_url, "response_type").as_deref(), Some("code"));
	assert_eq!(query_value(&ticket.authorize_url, "scope").as_deref(), Some("read:user"));

	gateway.push(form_response(200, "access_token=gho_abc&token_type=bearer&scope=read%3Auser"));

	let set = flow
		.complete(&github, CallbackParams::success(&ticket.state, "code-1"))
		.await
		.expect("Exchange should succeed.");

	assert_eq!(set.access_token.expose(), "gho_abc");
	assert_eq!(set.token_type, "bearer");
	assert!(set.scope.contains("read:user"));
	assert_eq!(set.expires_at, None, "GitHub reports no lifetime.");

	let request = gateway.requests().pop().expect("One exchange request should be recorded.");

	assert_eq!(form_value(&request, "grant_type").as_deref(), Some("authorization_code"));
	assert_eq!(form_value(&request, "code").as_deref(), Some("code-1"));
	assert_eq!(form_value(&request, "client_id").as_deref(), Some("client-id"));
	assert_eq!(form_value(&request, "client_secret").as_deref(), Some("client-secret"));
	assert_eq!(
		form_value(&request, "redirect_uri").as_deref(),
		Some("https://app.example.com/callback")
	);
}

#[tokio::test]
async fn json_exchange_derives_the_expiry_instant() {
	let (gateway, flow) = build_flow(well_known::google(), Some("client-secret"));
	let google = provider("google");
	let ticket = flow.begin(&google, scopes(&["email"])).expect("Begin should succeed for Google.");

	gateway.push(json_response(
		200,
		r#"{"access_token":"ya29.abc","token_type":"Bearer","expires_in":3600,"refresh_token":"1//rt"}"#,
	));

	let before = OffsetDateTime::now_utc();
	let set = flow
		.complete(&google, CallbackParams::success(&ticket.state, "code-2"))
		.await
		.expect("Exchange should succeed.");
	let expires_at = set.expires_at.expect("Expiry should derive from expires_in.");

	assert!(expires_at >= before + Duration::seconds(3590));
	assert!(expires_at <= OffsetDateTime::now_utc() + Duration::seconds(3610));
	assert_eq!(set.refresh_token.as_ref().map(|secret| secret.expose()), Some("1//rt"));
}

#[tokio::test]
async fn unknown_states_are_rejected_without_an_upstream_call() {
	let (gateway, flow) = build_flow(well_known::github(), None);
	let err = flow
		.complete(&provider("github"), CallbackParams::success("forged-state", "code"))
		.await
		.expect_err("Unknown state must be rejected.");

	assert!(matches!(err, Error::Protocol(ProtocolError::InvalidState)));
	assert_eq!(gateway.calls(), 0, "No token request may be issued for an invalid state.");
}

#[tokio::test]
async fn states_are_single_use() {
	let (gateway, flow) = build_flow(well_known::github(), None);
	let github = provider("github");
	let ticket = flow.begin(&github, scopes(&["read:user"])).expect("Begin should succeed.");

	gateway.push(form_response(200, "access_token=gho_abc&token_type=bearer"));
	flow.complete(&github, CallbackParams::success(&ticket.state, "code-1"))
		.await
		.expect("First completion should succeed.");

	let err = flow
		.complete(&github, CallbackParams::success(&ticket.state, "code-1"))
		.await
		.expect_err("Replay must be rejected.");

	assert!(matches!(err, Error::Protocol(ProtocolError::InvalidState)));
	assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn pkce_verifier_hashes_to_the_published_challenge() {
	let metadata = {
		let mut google = well_known::google();

		google.requires_pkce = true;

		google
	};
	let (gateway, flow) = build_flow(metadata, Some("client-secret"));
	let google = provider("google");
	let ticket = flow.begin(&google, scopes(&["email"])).expect("Begin should succeed.");
	let challenge =
		query_value(&ticket.authorize_url, "code_challenge").expect("Challenge should be present.");

	assert_eq!(
		query_value(&ticket.authorize_url, "code_challenge_method").as_deref(),
		Some("S256")
	);

	gateway.push(json_response(200, r#"{"access_token":"abc","token_type":"Bearer"}"#));
	flow.complete(&google, CallbackParams::success(&ticket.state, "code-3"))
		.await
		.expect("Exchange should succeed.");

	let request = gateway.requests().pop().expect("One exchange request should be recorded.");
	let verifier = form_value(&request, "code_verifier").expect("Verifier should be sent.");

	assert_eq!(pkce::code_challenge(&verifier), challenge);
}

#[tokio::test]
async fn denied_callbacks_carry_the_provider_error_code() {
	let (gateway, flow) = build_flow(well_known::github(), None);
	let github = provider("github");
	let ticket = flow.begin(&github, scopes(&["read:user"])).expect("Begin should succeed.");
	let err = flow
		.complete(
			&github,
			CallbackParams::denied(&ticket.state, "access_denied", Some("user said no".into())),
		)
		.await
		.expect_err("Denial must surface.");

	assert!(matches!(
		err,
		Error::Protocol(ProtocolError::AuthorizationDenied { ref code, ref description })
			if code == "access_denied" && description.as_deref() == Some("user said no")
	));
	assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn unsupported_scopes_fail_before_any_redirect_is_built() {
	let (_, flow) = build_flow(well_known::github(), None);
	let err = flow
		.begin(&provider("github"), scopes(&["read:user", "drive.readonly"]))
		.expect_err("Out-of-range scope must fail.");

	assert!(matches!(
		err,
		Error::Config(ConfigError::UnsupportedScope { ref scope, .. }) if scope == "drive.readonly"
	));
}

#[tokio::test]
async fn exchange_failures_surface_status_and_body() {
	let (gateway, flow) = build_flow(well_known::github(), None);
	let github = provider("github");
	let ticket = flow.begin(&github, scopes(&["read:user"])).expect("Begin should succeed.");

	gateway.push(json_response(400, r#"{"error":"bad_verification_code"}"#));

	let err = flow
		.complete(&github, CallbackParams::success(&ticket.state, "stale-code"))
		.await
		.expect_err("Non-2xx exchange must fail.");

	assert!(matches!(
		err,
		Error::Protocol(ProtocolError::TokenExchangeFailed { status: 400, ref body })
			if body.contains("bad_verification_code")
	));
}

#[tokio::test]
async fn transport_outages_surface_as_transient() {
	let (_, flow) = build_flow(well_known::github(), None);
	let github = provider("github");
	let ticket = flow.begin(&github, scopes(&["read:user"])).expect("Begin should succeed.");
	// The stub has nothing scripted, which doubles as a transport outage.
	let err = flow
		.complete(&github, CallbackParams::success(&ticket.state, "code"))
		.await
		.expect_err("Outage must fail.");

	assert!(matches!(err, Error::Transient(TransientError::TransportUnavailable { .. })));
}
