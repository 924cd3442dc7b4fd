// self
use oidc_broker::{
	_preludet::*,
	auth::{ProviderId, ScopeSet, SessionKey, TokenSet},
	manager::TokenManager,
	provider::{ClientCredentials, ProviderRegistry, well_known},
};

fn session(id: &str) -> SessionKey {
	SessionKey::new(id).expect("Session key fixture should be valid.")
}

fn build_manager() -> (Arc<StubGateway>, TokenManager) {
	let registry = Arc::new(ProviderRegistry::new());

	registry
		.register(
			well_known::google(),
			ClientCredentials::new(
				"client-id",
				Url::parse("https://app.example.com/callback")
					.expect("Redirect URI fixture should parse."),
			)
			.with_client_secret("client-secret"),
		)
		.expect("Registration fixture should succeed.");

	let gateway = Arc::new(StubGateway::default());

	(gateway.clone(), TokenManager::new(registry, gateway))
}

fn seeded_set(expires_in: Option<Duration>, refresh_token: Option<&str>) -> TokenSet {
	let mut builder = TokenSet::builder(
		ProviderId::new("google").expect("Provider id should be valid."),
		ScopeSet::new(["email"]).expect("Scope fixture should be valid."),
	)
	.access_token("stale-access")
	.token_type("Bearer")
	.issued_at(OffsetDateTime::now_utc() - Duration::hours(2))
	.refresh_secret(refresh_token.map(oidc_broker::auth::TokenSecret::new));

	if let Some(expires_in) = expires_in {
		builder = builder.expires_in(expires_in);
	}

	builder.build().expect("Token set fixture should build.")
}

const ROTATED: &str = r#"{"access_token":"fresh-access","token_type":"Bearer","expires_in":3600,"refresh_token":"rotated-refresh"}"#;

#[tokio::test]
async fn expired_sets_refresh_transparently() {
	let (gateway, manager) = build_manager();
	let key = session("user-1");

	manager.store(key.clone(), seeded_set(Some(Duration::hours(1)), Some("old-refresh")));
	gateway.push(json_response(200, ROTATED));

	let set = manager.get_valid(&key).await.expect("Stale set should be refreshed.");

	assert_eq!(set.access_token.expose(), "fresh-access");
	assert_eq!(set.refresh_token.as_ref().map(|secret| secret.expose()), Some("rotated-refresh"));
	assert_eq!(gateway.calls(), 1);

	let request = gateway.requests().pop().expect("One refresh request should be recorded.");
	let fields = request.form_fields();

	assert!(fields.contains(&("grant_type".into(), "refresh_token".into())));
	assert!(fields.contains(&("refresh_token".into(), "old-refresh".into())));
	assert!(fields.contains(&("client_secret".into(), "client-secret".into())));

	// The replacement is stored, so the next demand is served locally.
	let again = manager.get_valid(&key).await.expect("Refreshed set should be fresh.");

	assert_eq!(again.access_token.expose(), "fresh-access");
	assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn concurrent_demands_coalesce_into_one_refresh() {
	let (gateway, manager) = build_manager();
	let key = session("user-2");

	manager.store(key.clone(), seeded_set(Some(Duration::hours(1)), Some("old-refresh")));

	// Two responses are scripted on purpose: a second upstream call would succeed and
	// inflate the call counter instead of failing the stub.
	gateway.push(json_response(200, ROTATED));
	gateway.push(json_response(200, ROTATED));

	let (first, second) = tokio::join!(manager.get_valid(&key), manager.get_valid(&key));
	let first = first.expect("First demand should succeed.");
	let second = second.expect("Second demand should succeed.");

	assert_eq!(first.access_token.expose(), "fresh-access");
	assert_eq!(second.access_token.expose(), "fresh-access");
	assert_eq!(gateway.calls(), 1, "Exactly one upstream refresh may happen.");
}

#[tokio::test]
async fn unrotated_refresh_tokens_are_carried_forward() {
	let (gateway, manager) = build_manager();
	let key = session("user-3");

	manager.store(key.clone(), seeded_set(Some(Duration::hours(1)), Some("keep-me")));
	gateway.push(json_response(
		200,
		r#"{"access_token":"fresh-access","token_type":"Bearer","expires_in":3600}"#,
	));

	let set = manager.get_valid(&key).await.expect("Refresh should succeed.");

	assert_eq!(set.refresh_token.as_ref().map(|secret| secret.expose()), Some("keep-me"));
}

#[tokio::test]
async fn invalid_grant_drops_the_set_and_expires_the_key() {
	let (gateway, manager) = build_manager();
	let key = session("user-4");

	manager.store(key.clone(), seeded_set(Some(Duration::hours(1)), Some("revoked-refresh")));
	gateway.push(json_response(400, r#"{"error":"invalid_grant"}"#));

	let err = manager.refresh(&key).await.expect_err("Revoked refresh must fail.");

	assert!(matches!(err, Error::RefreshRevoked));

	// The dead set is gone; further demands report expiry without upstream calls.
	let err = manager.get_valid(&key).await.expect_err("Key must now be expired.");

	assert!(matches!(err, Error::TokenExpired));
	assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn the_expiry_skew_counts_nearly_expired_sets_as_stale() {
	let (gateway, manager) = build_manager();
	let key = session("user-5");
	let set = TokenSet::builder(
		ProviderId::new("google").expect("Provider id should be valid."),
		ScopeSet::new(["email"]).expect("Scope fixture should be valid."),
	)
	.access_token("nearly-expired")
	.token_type("Bearer")
	.expires_in(Duration::seconds(10))
	.refresh_token("old-refresh")
	.build()
	.expect("Token set fixture should build.");

	manager.store(key.clone(), set);
	gateway.push(json_response(200, ROTATED));

	// 10s of remaining lifetime is inside the 30s safety margin.
	let refreshed = manager.get_valid(&key).await.expect("Nearly-expired set should refresh.");

	assert_eq!(refreshed.access_token.expose(), "fresh-access");
	assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn forced_refresh_ignores_local_freshness() {
	let (gateway, manager) = build_manager();
	let key = session("user-6");
	let set = TokenSet::builder(
		ProviderId::new("google").expect("Provider id should be valid."),
		ScopeSet::new(["email"]).expect("Scope fixture should be valid."),
	)
	.access_token("still-fresh")
	.token_type("Bearer")
	.expires_in(Duration::hours(1))
	.refresh_token("old-refresh")
	.build()
	.expect("Token set fixture should build.");

	manager.store(key.clone(), set);
	gateway.push(json_response(200, ROTATED));

	let refreshed = manager.refresh(&key).await.expect("Forced refresh should succeed.");

	assert_eq!(refreshed.access_token.expose(), "fresh-access");
	assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn stale_sets_without_a_refresh_token_expire() {
	let (gateway, manager) = build_manager();
	let key = session("user-7");

	manager.store(key.clone(), seeded_set(Some(Duration::hours(1)), None));

	let err = manager.get_valid(&key).await.expect_err("Unrefreshable set must expire.");

	assert!(matches!(err, Error::TokenExpired));
	assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn non_expiring_sets_stay_valid_until_a_forced_refresh() {
	let (gateway, manager) = build_manager();
	let key = session("user-8");

	manager.store(key.clone(), seeded_set(None, Some("old-refresh")));

	let set = manager.get_valid(&key).await.expect("Non-expiring set should be served.");

	assert_eq!(set.access_token.expose(), "stale-access");
	assert_eq!(gateway.calls(), 0);

	gateway.push(json_response(200, ROTATED));

	// After 401 feedback from the resource server, callers force a rotation.
	let refreshed = manager.refresh(&key).await.expect("Forced refresh should succeed.");

	assert_eq!(refreshed.access_token.expose(), "fresh-access");
	assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn revocation_posts_the_refresh_token_and_drops_the_set() {
	let (gateway, manager) = build_manager();
	let key = session("user-9");

	manager.store(key.clone(), seeded_set(Some(Duration::hours(1)), Some("doomed-refresh")));
	gateway.push(json_response(200, "{}"));
	manager.revoke(&key).await.expect("Revocation should succeed.");

	let request = gateway.requests().pop().expect("One revocation request should be recorded.");
	let fields = request.form_fields();

	assert!(fields.contains(&("token".into(), "doomed-refresh".into())));
	assert!(fields.contains(&("token_type_hint".into(), "refresh_token".into())));
	assert!(manager.current(&key).is_none());
}
