//! Opaque token generation: authorization state, OIDC nonces, and PKCE pairs.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret};

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256). Plain is deliberately not offered.
	S256,
}
impl CodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			CodeChallengeMethod::S256 => "S256",
		}
	}
}

/// PKCE verifier/challenge pair generated for one authorization attempt.
#[derive(Clone)]
pub struct PkcePair {
	verifier: TokenSecret,
	challenge: String,
	method: CodeChallengeMethod,
}
impl PkcePair {
	/// Generates a fresh verifier and its S256 challenge.
	pub fn generate() -> Self {
		let verifier = random_token(PKCE_VERIFIER_LEN);
		let challenge = code_challenge(&verifier);

		Self { verifier: TokenSecret::new(verifier), challenge, method: CodeChallengeMethod::S256 }
	}

	/// Secret verifier sent with the token exchange.
	pub fn verifier(&self) -> &TokenSecret {
		&self.verifier
	}

	/// Public challenge sent with the authorization redirect.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}

	/// Challenge method (currently always `S256`).
	pub fn method(&self) -> CodeChallengeMethod {
		self.method
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

/// Generates an opaque CSRF-protection state token.
pub fn state_token() -> String {
	random_token(STATE_LEN)
}

/// Generates an opaque OIDC replay-protection nonce.
pub fn nonce_token() -> String {
	random_token(NONCE_LEN)
}

/// SHA-256 fingerprint (base64, no padding) of an opaque token.
///
/// The pending-authorization store is keyed by this fingerprint rather than the raw
/// state, so callback lookup compares digests instead of raw secrets.
pub fn fingerprint(token: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(token.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// S256 code challenge (RFC 7636) for a verifier.
pub fn code_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_token(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
