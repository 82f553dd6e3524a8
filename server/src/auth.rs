//! Superuser session tokens for the admin API.
//!
//! Login issues an HS256 JWT bound to the superuser email; protected
//! handlers take the [`Auth`] extractor. The signing secret is generated at
//! startup, so tokens do not outlive the launcher process.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

const TOKEN_LIFETIME_SECS: i64 = 24 * 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	sub: String,
	exp: i64,
}

pub fn new_secret() -> Box<[u8]> {
	let mut secret = vec![0u8; 32];
	rand::rng().fill_bytes(&mut secret);
	secret.into_boxed_slice()
}

pub fn issue_token(secret: &[u8], email: &str) -> SwResult<String> {
	let claims = Claims {
		sub: email.to_string(),
		exp: Timestamp::from_now(TOKEN_LIFETIME_SECS).0,
	};
	encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).map_err(|err| {
		warn!("failed to issue token: {}", err);
		Error::Internal("failed to issue token".into())
	})
}

fn verify_token(secret: &[u8], token: &str) -> SwResult<String> {
	let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &Validation::default())
		.map_err(|_| Error::Unauthorized)?;
	Ok(data.claims.sub)
}

/// Authenticated superuser context, extracted from the `Authorization`
/// bearer token.
#[derive(Debug, Clone)]
pub struct Auth {
	pub email: Box<str>,
}

impl FromRequestParts<App> for Auth {
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
		let header = parts
			.headers
			.get(axum::http::header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.ok_or(Error::Unauthorized)?;
		let token = header.strip_prefix("Bearer ").unwrap_or(header);
		let email = verify_token(&state.jwt_secret, token)?;
		Ok(Auth { email: email.into() })
	}
}


// vim: ts=4
