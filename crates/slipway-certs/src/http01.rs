//! Ephemeral HTTP-01 challenge server.
//!
//! Bound on a free port of the configured bind address for the duration of
//! one certificate request. The reverse proxy forwards
//! `/.well-known/acme-challenge/` traffic to whatever address is currently
//! published, so the CA reaches this server through port 80.

use axum::{
	extract::{Path, State},
	routing::get,
	Router,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

type TokenMap = Arc<RwLock<HashMap<Box<str>, Box<str>>>>;

pub struct ChallengeServer {
	tokens: TokenMap,
	shutdown: CancellationToken,
	ip: String,
	port: u16,
}

impl ChallengeServer {
	/// Binds an ephemeral port on `ip` and starts serving challenge
	/// responses until the server is dropped.
	pub async fn bind(ip: &str) -> SwResult<Self> {
		let parsed: IpAddr = ip.parse()?;
		let listener = tokio::net::TcpListener::bind((parsed, 0)).await?;
		let port = listener.local_addr()?.port();

		let tokens: TokenMap = Arc::new(RwLock::new(HashMap::new()));
		let shutdown = CancellationToken::new();

		let router = Router::new()
			.route("/.well-known/acme-challenge/{token}", get(serve_challenge))
			.with_state(tokens.clone());

		let cancel = shutdown.clone();
		tokio::spawn(async move {
			let serve = axum::serve(listener, router)
				.with_graceful_shutdown(async move { cancel.cancelled().await });
			if let Err(err) = serve.await {
				warn!("challenge server error: {}", err);
			}
		});

		info!("HTTP-01 challenge server listening on {}:{}", ip, port);
		Ok(Self { tokens, shutdown, ip: ip.to_string(), port })
	}

	pub fn ip(&self) -> &str {
		&self.ip
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn insert(&self, token: &str, key_authorization: &str) {
		self.tokens.write().insert(token.into(), key_authorization.into());
	}
}

impl Drop for ChallengeServer {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

async fn serve_challenge(
	State(tokens): State<TokenMap>,
	Path(token): Path<String>,
) -> SwResult<String> {
	debug!("ACME challenge request for token {}", token);
	match tokens.read().get(token.as_str()) {
		Some(key_authorization) => Ok(key_authorization.to_string()),
		None => Err(Error::NotFound),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn serves_published_tokens() {
		let server = ChallengeServer::bind("127.0.0.1").await.unwrap();
		server.insert("tok-1", "tok-1.keyauth");

		let url = format!(
			"http://127.0.0.1:{}/.well-known/acme-challenge/tok-1",
			server.port()
		);
		let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
		assert_eq!(body, "tok-1.keyauth");

		let missing = format!(
			"http://127.0.0.1:{}/.well-known/acme-challenge/unknown",
			server.port()
		);
		let status = reqwest::get(&missing).await.unwrap().status();
		assert_eq!(status.as_u16(), 404);
	}
}

// vim: ts=4
