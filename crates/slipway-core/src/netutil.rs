//! Network utilities: free-port probing and proxy forwarding headers.

use axum::http::{header::HeaderName, HeaderMap, HeaderValue};
use std::net::IpAddr;

use crate::prelude::*;

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Binds to `<ip>:0`, reads back the kernel-assigned port and releases the
/// listener. The port may be taken again by someone else before it is used;
/// callers bind it immediately after.
pub async fn get_available_port(ip: &str) -> SwResult<(String, u16)> {
	let parsed: IpAddr = ip.parse()?;
	let listener = tokio::net::TcpListener::bind((parsed, 0)).await?;
	let port = listener.local_addr()?.port();
	Ok((ip.to_string(), port))
}

/// Returns the original client address, preferring forwarding headers set by
/// an upstream proxy.
pub fn real_ip(headers: &HeaderMap, remote_ip: &str) -> String {
	if let Some(ip) = headers.get(X_REAL_IP).and_then(|v| v.to_str().ok()) {
		return ip.to_string();
	}
	if let Some(ip) = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
		return ip.to_string();
	}
	remote_ip.to_string()
}

/// Rewrites the forwarding headers for a proxied request: `Host` is set to
/// the target, the client address is appended to `X-Forwarded-For`, and the
/// inbound scheme is recorded in `X-Forwarded-Proto`.
pub fn prepare_forward_headers(
	headers: &mut HeaderMap,
	target_host: &str,
	remote_ip: &str,
	secure: bool,
) {
	let client_ip = real_ip(headers, remote_ip);

	if let Ok(host) = HeaderValue::from_str(target_host) {
		headers.insert(axum::http::header::HOST, host.clone());
		headers.insert(X_FORWARDED_HOST, host);
	}
	if let Ok(ip) = HeaderValue::from_str(&client_ip) {
		headers.insert(X_REAL_IP, ip);
	}

	let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
		Some(existing) if !existing.is_empty() => format!("{}, {}", existing, remote_ip),
		_ => remote_ip.to_string(),
	};
	if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
		headers.insert(X_FORWARDED_FOR, value);
	}

	let proto = if secure { "https" } else { "http" };
	headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
}

/// Builds `scheme://host[:port]uri`, omitting the port when it is the
/// default for the scheme.
pub fn build_host_url(scheme: &str, host: &str, port: u16, uri: &str) -> String {
	let default = match scheme {
		"https" => 443,
		_ => 80,
	};
	if port == default {
		format!("{}://{}{}", scheme, host, uri)
	} else {
		format!("{}://{}:{}{}", scheme, host, port, uri)
	}
}


// vim: ts=4
