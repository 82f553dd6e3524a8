//! Publishes the address of the currently running HTTP-01 challenge server.
//!
//! The HTTP-01 provider stands its challenge server up on an ephemeral port
//! of the bind address; the reverse proxy reads the published address to
//! route `/.well-known/acme-challenge/` traffic there. Passed around as an
//! explicit `Arc` value, never as global state.

use parking_lot::RwLock;
use std::net::IpAddr;

use crate::prelude::*;

#[derive(Debug, Default)]
pub struct ChallengeAddressPublisher {
	address: RwLock<Option<(Box<str>, u16)>>,
}

impl ChallengeAddressPublisher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn publish(&self, ip: &str, port: u16) -> SwResult<()> {
		let _: IpAddr = ip.parse()?;
		if port == 0 {
			return Err(Error::ValidationError("port cannot be zero".into()));
		}
		*self.address.write() = Some((ip.into(), port));
		Ok(())
	}

	/// The `http://ip:port` base URL of the challenge server, if published.
	pub fn resolve_address(&self) -> SwResult<String> {
		match self.address.read().as_ref() {
			Some((ip, port)) => Ok(format!("http://{}:{}", ip, port)),
			None => Err(Error::InvalidState("no challenge address published".into())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unpublished_address_fails() {
		let publisher = ChallengeAddressPublisher::new();
		assert!(publisher.resolve_address().is_err());
	}

	#[test]
	fn publish_then_resolve() {
		let publisher = ChallengeAddressPublisher::new();
		publisher.publish("127.0.0.1", 8099).unwrap();
		assert_eq!(publisher.resolve_address().unwrap(), "http://127.0.0.1:8099");
	}

	#[test]
	fn invalid_ip_is_rejected() {
		let publisher = ChallengeAddressPublisher::new();
		assert!(publisher.publish("bogus", 8099).is_err());
	}
}

// vim: ts=4
