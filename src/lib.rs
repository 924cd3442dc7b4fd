//! Provider-agnostic OAuth 2.0 / OpenID Connect client engine—authorization code + PKCE flows,
//! transparent refresh, and identity-token validation behind one metadata-driven API.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod codec;
pub mod error;
pub mod flows;
pub mod http;
pub mod manager;
pub mod obs;
pub mod pkce;
pub mod provider;
#[doc(hidden)]
pub mod _preludet {
	//! Stub transports and fixtures shared by unit and integration tests.

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};

	pub use crate::_prelude::*;

	// self
	use crate::{
		error::TransientError,
		http::{GatewayFuture, GatewayRequest, GatewayResponse, HttpGateway},
	};

	/// Scripted [`HttpGateway`] that replays canned responses and counts upstream calls.
	///
	/// Responses are served from a FIFO queue first; once the queue drains, the repeat
	/// response (if any) is cloned for every further call. With neither configured, `send`
	/// fails with [`TransientError::TransportUnavailable`], which doubles as a transport
	/// outage fixture.
	#[derive(Debug, Default)]
	pub struct StubGateway {
		queue: Mutex<VecDeque<GatewayResponse>>,
		repeat: Mutex<Option<GatewayResponse>>,
		calls: AtomicUsize,
		requests: Mutex<Vec<GatewayRequest>>,
	}
	impl StubGateway {
		/// Creates a gateway that answers every call with the same JSON body.
		pub fn repeat_json(status: u16, body: impl Into<String>) -> Self {
			let gateway = Self::default();

			*gateway.repeat.lock() = Some(json_response(status, body));

			gateway
		}

		/// Queues a one-shot response served before the repeat response.
		pub fn push(&self, response: GatewayResponse) {
			self.queue.lock().push_back(response);
		}

		/// Number of `send` invocations observed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Snapshot of every request dispatched through the gateway.
		pub fn requests(&self) -> Vec<GatewayRequest> {
			self.requests.lock().clone()
		}

		fn next_response(&self) -> Option<GatewayResponse> {
			self.queue.lock().pop_front().or_else(|| self.repeat.lock().clone())
		}
	}
	impl HttpGateway for StubGateway {
		fn send(&self, request: GatewayRequest) -> GatewayFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.requests.lock().push(request);

			let response = self.next_response();

			Box::pin(async move {
				response.ok_or_else(|| {
					TransientError::transport_message("Stub gateway has no response scripted.")
				})
			})
		}
	}

	/// Builds a [`crate::http::ReqwestGateway`] that accepts the self-signed certificates
	/// produced by `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_gateway() -> crate::http::ReqwestGateway {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestGateway::with_client(client)
	}

	/// Builds a JSON [`GatewayResponse`] fixture.
	pub fn json_response(status: u16, body: impl Into<String>) -> GatewayResponse {
		GatewayResponse {
			status,
			headers: vec![("content-type".into(), "application/json".into())],
			body: body.into().into_bytes(),
		}
	}

	/// Builds a form-encoded [`GatewayResponse`] fixture.
	pub fn form_response(status: u16, body: impl Into<String>) -> GatewayResponse {
		GatewayResponse {
			status,
			headers: vec![("content-type".into(), "application/x-www-form-urlencoded".into())],
			body: body.into().into_bytes(),
		}
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
