//! Transport boundary for every outbound provider call.
//!
//! [`HttpGateway`] is the engine's only dependency on an HTTP stack: flows hand it a
//! fully built [`GatewayRequest`] and receive either a structured [`GatewayResponse`]
//! or a [`TransientError`]. Retries, pooling, and per-call timeouts all belong to the
//! gateway implementation, never to the core — a timed-out call simply surfaces as
//! [`TransientError::TransportUnavailable`].

// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::TransientError};

/// HTTP methods the engine issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayMethod {
	/// `GET`, used for JWKS document fetches.
	Get,
	/// `POST`, used for token exchange, refresh, and revocation.
	Post,
}
impl GatewayMethod {
	/// Returns the method's wire name.
	pub fn as_str(self) -> &'static str {
		match self {
			GatewayMethod::Get => "GET",
			GatewayMethod::Post => "POST",
		}
	}
}

/// Outbound request handed to the gateway.
#[derive(Clone, Debug)]
pub struct GatewayRequest {
	/// HTTP method.
	pub method: GatewayMethod,
	/// Absolute target URL.
	pub url: Url,
	/// Header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
}
impl GatewayRequest {
	/// Builds a plain `GET` request with an `Accept: application/json` header.
	pub fn get_json(url: Url) -> Self {
		Self {
			method: GatewayMethod::Get,
			url,
			headers: vec![("accept".into(), "application/json".into())],
			body: None,
		}
	}

	/// Builds a form-encoded `POST` request (RFC 6749 token endpoint shape).
	///
	/// `accept` controls the media type requested back; providers such as GitHub answer
	/// form-encoded unless JSON is asked for explicitly.
	pub fn form_post(url: Url, fields: &[(&str, &str)], accept: &'static str) -> Self {
		let mut serializer = form_urlencoded::Serializer::new(String::new());

		for (key, value) in fields {
			serializer.append_pair(key, value);
		}

		let body = serializer.finish().into_bytes();

		Self {
			method: GatewayMethod::Post,
			url,
			headers: vec![
				("content-type".into(), "application/x-www-form-urlencoded".into()),
				("accept".into(), accept.into()),
			],
			body: Some(body),
		}
	}

	/// Returns the decoded form body pairs, if the request carries one.
	///
	/// Test stubs use this to assert on the exact fields a flow dispatched.
	pub fn form_fields(&self) -> Vec<(String, String)> {
		self.body
			.as_deref()
			.map(|body| form_urlencoded::parse(body).into_owned().collect())
			.unwrap_or_default()
	}
}

/// Structured response returned by the gateway.
#[derive(Clone, Debug)]
pub struct GatewayResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header name/value pairs (names lowercased by implementations).
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl GatewayResponse {
	/// Returns true for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Lossy UTF-8 view of the body, for error reporting.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Boxed response future returned by [`HttpGateway::send`].
pub type GatewayFuture<'a> =
	Pin<Box<dyn Future<Output = Result<GatewayResponse, TransientError>> + 'a + Send>>;

/// Pluggable request executor consumed by flows and the token manager.
///
/// Implementations must be `Send + Sync` so one gateway can serve arbitrarily many
/// concurrent in-flight authorization attempts. Every status code — including 4xx/5xx —
/// comes back as a [`GatewayResponse`]; only transport-level failures map to
/// [`TransientError`].
pub trait HttpGateway
where
	Self: Send + Sync,
{
	/// Executes a single request without internal retries.
	fn send(&self, request: GatewayRequest) -> GatewayFuture<'_>;
}

/// Thin [`HttpGateway`] over a shared [`ReqwestClient`].
///
/// Configure the wrapped client with the desired timeout and redirect policy; token
/// endpoints return results directly, so redirect following should stay disabled.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestGateway(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestGateway {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpGateway for ReqwestGateway {
	fn send(&self, request: GatewayRequest) -> GatewayFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				GatewayMethod::Get => reqwest::Method::GET,
				GatewayMethod::Post => reqwest::Method::POST,
			};
			let mut builder = client.request(method, request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(TransientError::from)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(TransientError::from)?.to_vec();

			Ok(GatewayResponse { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn form_post_encodes_fields_and_headers() {
		let url = Url::parse("https://example.com/token").expect("URL fixture should parse.");
		let request = GatewayRequest::form_post(
			url,
			&[("grant_type", "authorization_code"), ("code", "c o/de")],
			"application/json",
		);

		assert_eq!(request.method, GatewayMethod::Post);
		assert_eq!(
			request.body.as_deref(),
			Some("grant_type=authorization_code&code=c+o%2Fde".as_bytes())
		);
		assert!(request
			.headers
			.iter()
			.any(|(name, value)| name == "content-type"
				&& value == "application/x-www-form-urlencoded"));

		let fields = request.form_fields();

		assert!(fields.contains(&("code".into(), "c o/de".into())));
	}

	#[test]
	fn success_statuses_cover_the_2xx_range() {
		let mut response = GatewayResponse { status: 200, headers: Vec::new(), body: Vec::new() };

		assert!(response.is_success());

		response.status = 299;

		assert!(response.is_success());

		response.status = 400;

		assert!(!response.is_success());
	}
}
