//! Read-through caches over the record store for the proxy hot path.
//!
//! Entries live for 15 minutes and are actively invalidated by row-change
//! subscriptions, which keeps the caches safe under concurrent admin-API
//! edits.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use slipway_types::store::{
	ChangeKind, Collection, ServiceEndpoint, StoreAdapter,
};

use crate::prelude::*;

const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

struct TtlCache<V> {
	entries: RwLock<HashMap<Box<str>, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
	fn new() -> Self {
		Self { entries: RwLock::new(HashMap::new()) }
	}

	fn get(&self, key: &str) -> Option<V> {
		let entries = self.entries.read();
		let (inserted, value) = entries.get(key)?;
		if inserted.elapsed() >= CACHE_TTL {
			return None;
		}
		Some(value.clone())
	}

	fn insert(&self, key: &str, value: V) {
		self.entries.write().insert(key.into(), (Instant::now(), value));
	}

	fn invalidate(&self, key: &str) {
		self.entries.write().remove(key);
	}
}

// Service discovery //
//*******************//

pub struct ServiceDiscovery {
	store: Arc<dyn StoreAdapter>,
	cache: TtlCache<ServiceEndpoint>,
}

impl ServiceDiscovery {
	pub fn new(store: Arc<dyn StoreAdapter>) -> Arc<Self> {
		Arc::new(Self { store, cache: TtlCache::new() })
	}

	/// Endpoint of a running, non-deleted service.
	pub async fn find_running_service_by_id(&self, id: &str) -> SwResult<ServiceEndpoint> {
		if let Some(endpoint) = self.cache.get(id) {
			return Ok(endpoint);
		}
		let endpoint = self.store.find_running_service(id).await?;
		self.cache.insert(id, endpoint.clone());
		Ok(endpoint)
	}

	pub fn invalidate(&self, id: &str) {
		debug!("invalidating service cache entry {}", id);
		self.cache.invalidate(id);
	}
}

// Domain discovery //
//******************//

/// The two target kinds a domain binding can point at.
#[derive(Debug, Clone)]
pub enum DomainTarget {
	Service(Box<str>),
	ProxyEntry(Box<str>),
}

pub struct DomainDiscovery {
	store: Arc<dyn StoreAdapter>,
	cache: TtlCache<DomainTarget>,
}

impl DomainDiscovery {
	pub fn new(store: Arc<dyn StoreAdapter>) -> Arc<Self> {
		Arc::new(Self { store, cache: TtlCache::new() })
	}

	pub async fn find_target_by_domain(&self, domain: &str) -> SwResult<DomainTarget> {
		if let Some(target) = self.cache.get(domain) {
			return Ok(target);
		}

		let binding = self.store.find_domain_binding(domain).await?;
		let target = match (binding.service_id, binding.proxy_entry_id) {
			(Some(service_id), _) => DomainTarget::Service(service_id),
			(None, Some(proxy_entry_id)) => DomainTarget::ProxyEntry(proxy_entry_id),
			(None, None) => return Err(Error::NotFound),
		};
		self.cache.insert(domain, target.clone());
		Ok(target)
	}

	pub fn invalidate(&self, domain: &str) {
		debug!("invalidating domain cache entry {}", domain);
		self.cache.invalidate(domain);
	}
}

// Proxy entry discovery //
//***********************//

pub struct ProxyEntryDiscovery {
	store: Arc<dyn StoreAdapter>,
	cache: TtlCache<Box<str>>,
}

impl ProxyEntryDiscovery {
	pub fn new(store: Arc<dyn StoreAdapter>) -> Arc<Self> {
		Arc::new(Self { store, cache: TtlCache::new() })
	}

	/// Target URL of an enabled, non-deleted proxy entry.
	pub async fn find_enabled_proxy_entry_by_id(&self, id: &str) -> SwResult<Box<str>> {
		if let Some(url) = self.cache.get(id) {
			return Ok(url);
		}
		let entry = self.store.find_enabled_proxy_entry(id).await?;
		self.cache.insert(id, entry.target_url.clone());
		Ok(entry.target_url)
	}

	pub fn invalidate(&self, id: &str) {
		debug!("invalidating proxy entry cache entry {}", id);
		self.cache.invalidate(id);
	}
}

/// Wires the row-change subscriptions that keep the caches honest.
pub fn register_invalidation_hooks(
	store: &Arc<dyn StoreAdapter>,
	services: Arc<ServiceDiscovery>,
	domains: Arc<DomainDiscovery>,
	proxy_entries: Arc<ProxyEntryDiscovery>,
) {
	for kind in [ChangeKind::Update, ChangeKind::Delete] {
		let services = services.clone();
		store.subscribe(
			Collection::Services,
			kind,
			Arc::new(move |change| services.invalidate(&change.id)),
		);

		let proxy_entries = proxy_entries.clone();
		store.subscribe(
			Collection::ProxyEntries,
			kind,
			Arc::new(move |change| proxy_entries.invalidate(&change.id)),
		);
	}

	// Domain bindings are keyed by the domain name; creation also
	// invalidates so a negative lookup cannot stick
	for kind in [ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete] {
		let domains = domains.clone();
		store.subscribe(
			Collection::Domains,
			kind,
			Arc::new(move |change| {
				if let Some(domain) = change.key.as_deref() {
					domains.invalidate(domain);
				}
			}),
		);
	}
}

// vim: ts=4
