//! Install-token capture.
//!
//! On first boot the upstream application prints its one-time installer URL
//! on stdout. The stdout interceptor sniffs every write for it; the token is
//! stored on the service row and retired again when the management proxy
//! observes a successful superuser creation.

use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

use slipway_types::store::StoreAdapter;

use crate::prelude::*;

/// Only the head of a write is examined; the URL appears near the start of
/// the boot banner.
const SNIFF_WINDOW: usize = 2048;

static INSTALL_URL: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"https?://[^/]+/_/#/pbinstal/([A-Za-z0-9._-]+)").ok());

/// Extracts the install token from a chunk of process output, if present.
pub fn extract_install_token(data: &[u8]) -> Option<String> {
	let head = &data[..data.len().min(SNIFF_WINDOW)];
	let text = std::str::from_utf8(head).ok()?;
	if !text.contains("/pbinstal/") {
		return None;
	}
	let regex = INSTALL_URL.as_ref()?;
	let captures = regex.captures(text)?;
	Some(captures.get(1)?.as_str().to_string())
}

pub struct InstallTokenUsecase {
	store: Arc<dyn StoreAdapter>,
}

impl InstallTokenUsecase {
	pub fn new(store: Arc<dyn StoreAdapter>) -> Arc<Self> {
		Arc::new(Self { store })
	}

	pub async fn set_install_token(&self, service_id: &str, token: &str) -> SwResult<()> {
		if token.is_empty() {
			return Ok(());
		}
		self.store.set_service_install_token(service_id, token).await
	}

	/// Retires every matching token.
	pub async fn clean_install_token(&self, token: &str) -> SwResult<()> {
		if token.is_empty() {
			return Ok(());
		}
		self.store.clean_service_install_token(token).await
	}
}


// vim: ts=4
