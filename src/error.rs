//! Error taxonomy shared across flows, the token manager, and the codec.
//!
//! Variants are grouped by how callers should react: [`ConfigError`] is fatal at setup
//! time, [`ProtocolError`] is the definitive failure of one authorization attempt,
//! [`SecurityError`] is never retryable and never carries sensitive material,
//! [`TransientError`] is safe to retry with backoff, and [`Error::TokenExpired`] /
//! [`Error::RefreshRevoked`] signal that the caller must re-run the authorization flow.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; not retryable.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// OAuth protocol violation; the authorization attempt is definitively failed.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// Identity-token verification failure; never retryable, never suppressed.
	#[error(transparent)]
	Security(#[from] SecurityError),
	/// Temporary transport failure; the caller may retry the whole flow step.
	#[error(transparent)]
	Transient(#[from] TransientError),

	/// No usable token set exists for the key and no refresh is possible.
	#[error("Token set is expired and cannot be refreshed.")]
	TokenExpired,
	/// The provider rejected the refresh token; the stored set has been dropped.
	#[error("Refresh token has been revoked by the provider.")]
	RefreshRevoked,
}

/// Configuration and registration failures raised at setup time.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A provider with the same identifier is already registered.
	#[error("Provider `{provider}` is already registered.")]
	DuplicateProvider {
		/// Offending provider identifier.
		provider: String,
	},
	/// No provider is registered under the identifier.
	#[error("Provider `{provider}` is not registered.")]
	UnknownProvider {
		/// Requested provider identifier.
		provider: String,
	},
	/// A requested scope is outside the provider's supported set.
	#[error("Provider `{provider}` does not support the `{scope}` scope.")]
	UnsupportedScope {
		/// Provider identifier.
		provider: String,
		/// Scope that failed the subset check.
		scope: String,
	},
	/// Provider metadata failed validation.
	#[error("Provider metadata is invalid.")]
	InvalidMetadata(#[from] crate::provider::ProviderMetadataError),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token set builder validation failed.
	#[error("Unable to build token set.")]
	TokenBuild(#[from] crate::auth::TokenSetBuilderError),
	/// Identity decoding was requested for a set without an identity token.
	#[error("Token set does not carry an identity token.")]
	MissingIdToken,
	/// Identity decoding needs key material the provider never declared.
	#[error("Provider `{provider}` declares neither a JWKS endpoint nor a client secret.")]
	MissingSigningKey {
		/// Provider identifier.
		provider: String,
	},
}

/// OAuth protocol failures surfaced as an authorization attempt's definitive outcome.
///
/// None of these are retried automatically: authorization codes are single-use, so a
/// retry with the same code would fail at the provider anyway.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// Callback state is unknown, expired, already consumed, or bound to another provider.
	#[error("Authorization state is unknown, expired, or already consumed.")]
	InvalidState,
	/// The provider redirected back with an error instead of a code.
	#[error("Authorization was denied by the provider: {code}.")]
	AuthorizationDenied {
		/// OAuth `error` code from the callback.
		code: String,
		/// Optional `error_description` from the callback.
		description: Option<String>,
	},
	/// Token response could not be parsed or lacks required fields.
	#[error("Token response is malformed: {detail}.")]
	MalformedResponse {
		/// Human-readable parse failure summary.
		detail: String,
	},
	/// Token endpoint answered with a non-2xx status.
	#[error("Token exchange failed with HTTP {status}.")]
	TokenExchangeFailed {
		/// HTTP status code returned by the provider.
		status: u16,
		/// Raw provider error body, for caller-side diagnostics.
		body: String,
	},
}

/// Identity-token verification failures.
///
/// Each check surfaces as its own variant so callers can distinguish "expired" from
/// "forged". Messages never include token or claim material.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SecurityError {
	/// The signing algorithm is outside the allow-list (`none` is always rejected).
	#[error("Identity token uses a disallowed signing algorithm: {alg}.")]
	DisallowedAlgorithm {
		/// Algorithm name from the JOSE header.
		alg: String,
	},
	/// No verification key matches the token's key identifier.
	#[error("No signing key matches the identity token header.")]
	UnknownSigningKey {
		/// Key identifier from the JOSE header, when present.
		kid: Option<String>,
	},
	/// Signature verification failed.
	#[error("Identity token signature is invalid.")]
	InvalidSignature,
	/// The `exp` claim is in the past (beyond the clock-skew tolerance).
	#[error("Identity token has expired.")]
	TokenExpiredClaim,
	/// The `nbf` or `iat` claim is in the future (beyond the clock-skew tolerance).
	#[error("Identity token is not yet valid.")]
	TokenNotYetValid,
	/// The `aud` claim does not contain the expected audience.
	#[error("Identity token audience does not match the client.")]
	AudienceMismatch,
	/// The `iss` claim does not match the provider's issuer.
	#[error("Identity token issuer does not match the provider.")]
	IssuerMismatch,
	/// The `nonce` claim does not match the value bound at authorization time.
	#[error("Identity token nonce does not match the authorization request.")]
	NonceMismatch,
	/// The token is not a structurally valid JWT or lacks required claims.
	#[error("Identity token is malformed.")]
	MalformedIdToken,
}

/// Temporary transport failures (safe to retry with backoff).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// The gateway could not complete the call (DNS, TCP, TLS, timeout).
	#[error("Provider endpoint is unreachable.")]
	TransportUnavailable {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
}
impl TransientError {
	/// Wraps a transport-specific error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::TransportUnavailable { source: Box::new(src) }
	}

	/// Wraps a plain message when no structured transport error exists.
	pub fn transport_message(message: impl Into<String>) -> Self {
		Self::TransportUnavailable { source: message.into().into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransientError {
	fn from(e: ReqwestError) -> Self {
		Self::transport(e)
	}
}
