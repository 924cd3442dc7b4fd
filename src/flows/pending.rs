// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, TokenSecret},
	pkce,
};

/// Secrets and bindings captured when an authorization redirect is built.
///
/// The raw state token is never stored; entries are keyed by its SHA-256 fingerprint so
/// callback lookup compares digests rather than secrets.
#[derive(Clone, Debug)]
pub(super) struct PendingAuthorization {
	pub provider: ProviderId,
	pub scope: ScopeSet,
	pub nonce: Option<String>,
	pub code_verifier: Option<TokenSecret>,
	pub expires_at: OffsetDateTime,
}

/// In-memory store of authorizations awaiting their callback.
#[derive(Debug)]
pub(super) struct PendingStore {
	ttl: Duration,
	entries: Mutex<HashMap<String, PendingAuthorization>>,
}
impl PendingStore {
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, entries: Default::default() }
	}

	/// Records a pending authorization under the state token's fingerprint.
	pub fn insert(
		&self,
		state: &str,
		provider: ProviderId,
		scope: ScopeSet,
		nonce: Option<String>,
		code_verifier: Option<TokenSecret>,
	) {
		let now = OffsetDateTime::now_utc();
		let mut entries = self.entries.lock();

		purge(&mut entries, now);
		entries.insert(pkce::fingerprint(state), PendingAuthorization {
			provider,
			scope,
			nonce,
			code_verifier,
			expires_at: now + self.ttl,
		});
	}

	/// Removes and returns the entry bound to `state`.
	///
	/// Removal happens under a single lock acquisition, so two racing callbacks with the
	/// same state can never both succeed. Expired entries and entries bound to a
	/// different provider yield `None` exactly like unknown states.
	pub fn consume(&self, state: &str, provider: &ProviderId) -> Option<PendingAuthorization> {
		let now = OffsetDateTime::now_utc();
		let mut entries = self.entries.lock();

		purge(&mut entries, now);

		let entry = entries.remove(&pkce::fingerprint(state))?;

		(&entry.provider == provider).then_some(entry)
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}
}

fn purge(entries: &mut HashMap<String, PendingAuthorization>, now: OffsetDateTime) {
	entries.retain(|_, entry| entry.expires_at > now);
}
