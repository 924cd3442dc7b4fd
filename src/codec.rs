//! Wire codec for token endpoint responses and identity tokens.
//!
//! Token responses arrive either as JSON or form-encoded bodies depending on the
//! provider ([`TokenEncoding`]); both decode into the same [`TokenResponse`] shape.
//! Identity tokens are verified with a hard HS256/RS256 allow-list — the `none`
//! algorithm is rejected before any cryptographic work happens — and every check
//! failure maps to its own [`SecurityError`] variant so callers can tell "expired"
//! from "forged".

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde_json::Value;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{IdentityClaims, TokenSecret, TokenSet},
	error::{ProtocolError, SecurityError},
	provider::{ClaimMap, TokenEncoding},
};

/// Validated fields of a successful token endpoint response.
///
/// `access_token` and `token_type` are guaranteed non-empty; a body missing either
/// never makes it past [`decode_token_response`].
#[derive(Clone, Debug)]
pub struct TokenResponse {
	/// Issued access token.
	pub access_token: String,
	/// Token type (usually `bearer`).
	pub token_type: String,
	/// Lifetime in seconds, when the provider reports one.
	pub expires_in: Option<i64>,
	/// Issued refresh token, when the provider rotates or grants one.
	pub refresh_token: Option<String>,
	/// Raw encoded identity token, for OIDC providers.
	pub id_token: Option<String>,
	/// Granted scope as a space-delimited string, when echoed back.
	pub scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTokenResponse {
	access_token: Option<String>,
	token_type: Option<String>,
	expires_in: Option<i64>,
	refresh_token: Option<String>,
	id_token: Option<String>,
	scope: Option<String>,
}

/// RFC 6749 §5.2 error payload carried by non-2xx token endpoint responses.
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorResponse {
	/// OAuth error code (e.g. `invalid_grant`).
	pub error: String,
	/// Optional human-readable description.
	pub error_description: Option<String>,
}

/// Key material used to verify identity-token signatures.
#[derive(Clone, Debug)]
pub enum IdTokenKey {
	/// HS256 shared secret; per OIDC core, symmetric identity tokens are signed with
	/// the client secret.
	ClientSecret(TokenSecret),
	/// RS256 key set fetched from the provider's JWKS endpoint.
	Jwks(Arc<JwkSet>),
}

/// JWKS document published by an OIDC provider.
#[derive(Clone, Debug, Deserialize)]
pub struct JwkSet {
	/// Published keys.
	pub keys: Vec<Jwk>,
}
impl JwkSet {
	fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
		match kid {
			Some(kid) => self.keys.iter().find(|key| key.kid.as_deref() == Some(kid)),
			// Providers with a single active key may omit `kid` from token headers.
			None => self.keys.first(),
		}
	}
}

/// A single JSON Web Key (RSA components only; that is all RS256 needs).
#[derive(Clone, Debug, Deserialize)]
pub struct Jwk {
	/// Key type (`RSA` for every key this engine can use).
	pub kty: String,
	/// Key identifier matched against the token header.
	#[serde(default)]
	pub kid: Option<String>,
	/// Declared algorithm, when present.
	#[serde(default)]
	pub alg: Option<String>,
	/// RSA modulus (base64url).
	#[serde(default)]
	pub n: Option<String>,
	/// RSA public exponent (base64url).
	#[serde(default)]
	pub e: Option<String>,
}

/// Decodes a token endpoint success body according to the provider's encoding.
pub fn decode_token_response(
	body: &[u8],
	encoding: TokenEncoding,
) -> Result<TokenResponse, ProtocolError> {
	let raw = match encoding {
		TokenEncoding::Json => decode_json_response(body)?,
		TokenEncoding::Form => decode_form_response(body)?,
	};
	let access_token = raw
		.access_token
		.filter(|token| !token.is_empty())
		.ok_or_else(|| malformed("missing access_token"))?;
	let token_type = raw
		.token_type
		.filter(|token_type| !token_type.is_empty())
		.ok_or_else(|| malformed("missing token_type"))?;

	Ok(TokenResponse {
		access_token,
		token_type,
		expires_in: raw.expires_in,
		refresh_token: raw.refresh_token,
		id_token: raw.id_token,
		scope: raw.scope,
	})
}

/// Extracts an RFC 6749 error payload from a non-2xx body, when one is present.
///
/// Providers are inconsistent about the encoding of error bodies, so both JSON and
/// form decoding are attempted regardless of the declared token encoding.
pub fn decode_error_response(body: &[u8]) -> Option<ErrorResponse> {
	if let Ok(response) = serde_json::from_slice::<ErrorResponse>(body) {
		return Some(response);
	}

	let mut error = None;
	let mut description = None;

	for (key, value) in form_urlencoded::parse(body) {
		match key.as_ref() {
			"error" => error = Some(value.into_owned()),
			"error_description" => description = Some(value.into_owned()),
			_ => {},
		}
	}

	error.map(|error| ErrorResponse { error, error_description: description })
}

/// Verifies and decodes an identity token into canonical claims.
///
/// Checks, in order: signing algorithm against the allow-list, signature against the
/// resolved key, `exp`/`iat`/`nbf` with the [`TokenSet::EXPIRY_SKEW`] tolerance,
/// issuer, audience, and finally the nonce when one is expected.
pub fn decode_identity_token(
	id_token: &str,
	key: &IdTokenKey,
	expected_issuer: Option<&str>,
	expected_audience: &str,
	expected_nonce: Option<&str>,
	claim_map: &ClaimMap,
) -> Result<IdentityClaims, SecurityError> {
	let header = parse_header(id_token)?;
	let algorithm = match header.alg.as_str() {
		"HS256" => Algorithm::HS256,
		"RS256" => Algorithm::RS256,
		_ => return Err(SecurityError::DisallowedAlgorithm { alg: header.alg }),
	};
	let decoding_key = resolve_key(key, algorithm, header.kid.as_deref())?;
	let mut validation = Validation::new(algorithm);

	validation.leeway = TokenSet::EXPIRY_SKEW.whole_seconds().unsigned_abs();
	validation.set_audience(&[expected_audience]);

	if let Some(issuer) = expected_issuer {
		validation.set_issuer(&[issuer]);
	}

	let decoded =
		jsonwebtoken::decode::<serde_json::Map<String, Value>>(id_token, &decoding_key, &validation)
			.map_err(|err| map_decode_error(err.kind(), &header))?;
	let claims = decoded.claims;

	validate_immaturity(&claims, claim_map)?;
	validate_nonce(&claims, claim_map, expected_nonce)?;
	translate_claims(&claims, claim_map)
}

#[derive(Debug, Deserialize)]
struct RawHeader {
	alg: String,
	#[serde(default)]
	kid: Option<String>,
}

fn parse_header(id_token: &str) -> Result<RawHeader, SecurityError> {
	let segment = id_token.split('.').next().ok_or(SecurityError::MalformedIdToken)?;
	let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| SecurityError::MalformedIdToken)?;

	serde_json::from_slice(&bytes).map_err(|_| SecurityError::MalformedIdToken)
}

fn resolve_key(
	key: &IdTokenKey,
	algorithm: Algorithm,
	kid: Option<&str>,
) -> Result<DecodingKey, SecurityError> {
	let unknown = || SecurityError::UnknownSigningKey { kid: kid.map(str::to_owned) };

	match (key, algorithm) {
		(IdTokenKey::ClientSecret(secret), Algorithm::HS256) =>
			Ok(DecodingKey::from_secret(secret.expose().as_bytes())),
		(IdTokenKey::Jwks(jwks), Algorithm::RS256) => {
			let jwk = jwks.find(kid).filter(|jwk| jwk.kty == "RSA").ok_or_else(unknown)?;
			let (n, e) = jwk.n.as_deref().zip(jwk.e.as_deref()).ok_or_else(unknown)?;

			DecodingKey::from_rsa_components(n, e).map_err(|_| unknown())
		},
		// Key material family does not fit the token's declared algorithm.
		_ => Err(unknown()),
	}
}

fn map_decode_error(kind: &ErrorKind, header: &RawHeader) -> SecurityError {
	match kind {
		ErrorKind::ExpiredSignature => SecurityError::TokenExpiredClaim,
		ErrorKind::ImmatureSignature => SecurityError::TokenNotYetValid,
		ErrorKind::InvalidAudience => SecurityError::AudienceMismatch,
		ErrorKind::InvalidIssuer => SecurityError::IssuerMismatch,
		ErrorKind::InvalidSignature => SecurityError::InvalidSignature,
		ErrorKind::InvalidAlgorithm =>
			SecurityError::DisallowedAlgorithm { alg: header.alg.clone() },
		ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => SecurityError::AudienceMismatch,
		ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => SecurityError::IssuerMismatch,
		_ => SecurityError::MalformedIdToken,
	}
}

fn validate_immaturity(
	claims: &serde_json::Map<String, Value>,
	claim_map: &ClaimMap,
) -> Result<(), SecurityError> {
	let now = OffsetDateTime::now_utc().unix_timestamp();
	let skew = TokenSet::EXPIRY_SKEW.whole_seconds();

	// `exp` is enforced by the JWT validation; `nbf` and `iat` are checked here with the
	// same tolerance because validation treats them as optional.
	if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64)
		&& nbf > now + skew
	{
		return Err(SecurityError::TokenNotYetValid);
	}
	if let Some(iat) = claims.get(&claim_map.issued_at).and_then(Value::as_i64)
		&& iat > now + skew
	{
		return Err(SecurityError::TokenNotYetValid);
	}

	Ok(())
}

fn validate_nonce(
	claims: &serde_json::Map<String, Value>,
	claim_map: &ClaimMap,
	expected_nonce: Option<&str>,
) -> Result<(), SecurityError> {
	let Some(expected) = expected_nonce else { return Ok(()) };
	let claimed = claims.get(&claim_map.nonce).and_then(Value::as_str);

	if claimed == Some(expected) { Ok(()) } else { Err(SecurityError::NonceMismatch) }
}

fn translate_claims(
	claims: &serde_json::Map<String, Value>,
	claim_map: &ClaimMap,
) -> Result<IdentityClaims, SecurityError> {
	let subject = claims
		.get(&claim_map.subject)
		.and_then(stringify)
		.ok_or(SecurityError::MalformedIdToken)?;

	Ok(IdentityClaims {
		subject,
		issuer: claims.get(&claim_map.issuer).and_then(stringify),
		audience: claims.get(&claim_map.audience).and_then(stringify),
		email: claims.get(&claim_map.email).and_then(stringify),
		name: claims.get(&claim_map.name).and_then(stringify),
		issued_at: claims.get(&claim_map.issued_at).and_then(timestamp),
		expires_at: claims.get(&claim_map.expires_at).and_then(timestamp),
	})
}

fn stringify(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		// `aud` may legally be an array; the first entry is the primary audience.
		Value::Array(entries) => entries.first().and_then(stringify),
		_ => None,
	}
}

fn timestamp(value: &Value) -> Option<OffsetDateTime> {
	value.as_i64().and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
}

fn decode_json_response(body: &[u8]) -> Result<RawTokenResponse, ProtocolError> {
	let deserializer = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(deserializer).map_err(|err| malformed(err.to_string()))
}

fn decode_form_response(body: &[u8]) -> Result<RawTokenResponse, ProtocolError> {
	let mut response = RawTokenResponse::default();

	for (key, value) in form_urlencoded::parse(body) {
		let value = value.into_owned();

		match key.as_ref() {
			"access_token" => response.access_token = Some(value),
			"token_type" => response.token_type = Some(value),
			"expires_in" => {
				response.expires_in = Some(
					value.parse().map_err(|_| malformed("expires_in is not a number"))?,
				);
			},
			"refresh_token" => response.refresh_token = Some(value),
			"id_token" => response.id_token = Some(value),
			"scope" => response.scope = Some(value),
			_ => {},
		}
	}

	Ok(response)
}

fn malformed(detail: impl Into<String>) -> ProtocolError {
	ProtocolError::MalformedResponse { detail: detail.into() }
}
