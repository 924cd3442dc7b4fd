//! Hard-coded metadata for common providers.
//!
//! These are plain default registrations: each constructor returns ordinary
//! [`ProviderMetadata`] that callers register with their own credentials, exactly like
//! a hand-built descriptor. No provider gets bespoke flow code.

// self
use crate::{
	auth::{ProviderId, ScopeSet},
	provider::metadata::{ProviderMetadata, TokenEncoding},
};
use url::Url;

/// Google (full OIDC: JSON token responses, JWKS-signed identity tokens).
pub fn google() -> ProviderMetadata {
	ProviderMetadata::builder(expect_id("google"))
		.authorization_endpoint(expect_url("https://accounts.google.com/o/oauth2/v2/auth"))
		.token_endpoint(expect_url("https://oauth2.googleapis.com/token"))
		.revocation_endpoint(expect_url("https://oauth2.googleapis.com/revoke"))
		.jwks_endpoint(expect_url("https://www.googleapis.com/oauth2/v3/certs"))
		.issuer("https://accounts.google.com")
		.supported_scopes(expect_scopes(&["openid", "email", "profile"]))
		.token_encoding(TokenEncoding::Json)
		.build()
		.expect("Google metadata is statically valid.")
}

/// GitHub (plain OAuth 2.0: form-encoded token responses, no identity tokens).
pub fn github() -> ProviderMetadata {
	ProviderMetadata::builder(expect_id("github"))
		.authorization_endpoint(expect_url("https://github.com/login/oauth/authorize"))
		.token_endpoint(expect_url("https://github.com/login/oauth/access_token"))
		.supported_scopes(expect_scopes(&[
			"read:user",
			"user:email",
			"repo",
			"gist",
			"notifications",
		]))
		.token_encoding(TokenEncoding::Form)
		.build()
		.expect("GitHub metadata is statically valid.")
}

/// Yandex (JSON token responses, revocation endpoint, no JWKS).
pub fn yandex() -> ProviderMetadata {
	ProviderMetadata::builder(expect_id("yandex"))
		.authorization_endpoint(expect_url("https://oauth.yandex.ru/authorize"))
		.token_endpoint(expect_url("https://oauth.yandex.ru/token"))
		.revocation_endpoint(expect_url("https://oauth.yandex.ru/revoke_token"))
		.supported_scopes(expect_scopes(&["login:email", "login:info", "login:avatar"]))
		.token_encoding(TokenEncoding::Json)
		.build()
		.expect("Yandex metadata is statically valid.")
}

fn expect_id(id: &str) -> ProviderId {
	ProviderId::new(id).expect("Well-known provider identifiers are statically valid.")
}

fn expect_url(url: &str) -> Url {
	Url::parse(url).expect("Well-known endpoint URLs are statically valid.")
}

fn expect_scopes(scopes: &[&str]) -> ScopeSet {
	ScopeSet::new(scopes.iter().copied()).expect("Well-known scopes are statically valid.")
}
