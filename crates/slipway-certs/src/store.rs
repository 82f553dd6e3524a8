//! Certificate store: append-only timestamped PEM folders on disk with an
//! in-memory read cache.
//!
//! Layout: `<certs_dir>/<domain>/<YYYY-MM-DD_HH-MM-SS>/{certificate.pem,
//! private_key.pem}`. The latest certificate is the folder with the
//! lexicographically greatest name; the 1 s timestamp resolution is backed
//! by a numeric suffix on collision so rapid renewals never overwrite.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use x509_parser::parse_x509_certificate;

use crate::prelude::*;

const CERT_FILE_NAME: &str = "certificate.pem";
const PRIVATE_KEY_FILE_NAME: &str = "private_key.pem";

/// A PEM certificate/key pair plus the remaining validity derived at
/// resolve time.
#[derive(Debug, Clone)]
pub struct Certificate {
	pub cert_pem: Box<str>,
	pub key_pem: Box<str>,
	pub ttl: Duration,
}

pub trait CertificateStore: Send + Sync {
	/// Persists a new certificate version for the domain.
	fn store(&self, domain: &str, cert: &Certificate) -> SwResult<()>;
	/// Resolves and validates the latest certificate for the domain.
	fn resolve(&self, domain: &str) -> SwResult<Certificate>;
}

// Disk store //
//************//

pub struct TlsStore {
	root: PathBuf,
}

impl TlsStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// Picks a fresh folder name: the current timestamp, suffixed with the
	/// first free `-<n>` when a same-second write already exists.
	fn output_dir(&self, domain: &str) -> PathBuf {
		let base = Timestamp::now().folder_name();
		let domain_dir = self.root.join(domain);
		let mut candidate = domain_dir.join(&base);
		let mut n = 0;
		while candidate.exists() {
			n += 1;
			candidate = domain_dir.join(format!("{}-{}", base, n));
		}
		candidate
	}

	fn latest_dir(&self, domain: &str) -> SwResult<PathBuf> {
		let domain_dir = self.root.join(domain);
		let entries = match std::fs::read_dir(&domain_dir) {
			Ok(entries) => entries,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				return Err(Error::CertificateNotFound(domain.into()));
			}
			Err(err) => return Err(err.into()),
		};

		let mut latest: Option<String> = None;
		for entry in entries {
			let entry = entry?;
			if !entry.file_type()?.is_dir() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().into_owned();
			if latest.as_deref().is_none_or(|cur| name.as_str() > cur) {
				latest = Some(name);
			}
		}

		match latest {
			Some(name) => Ok(domain_dir.join(name)),
			None => Err(Error::CertificateNotFound(domain.into())),
		}
	}
}

/// Parses the leaf certificate, checks the validity window and fills in the
/// remaining TTL.
pub fn validate(cert: &mut Certificate) -> SwResult<()> {
	let block = pem::parse(cert.cert_pem.as_bytes()).map_err(|_| Error::InvalidPem)?;
	let (_, parsed) = parse_x509_certificate(block.contents()).map_err(|_| Error::InvalidPem)?;

	let now = Timestamp::now().0;
	let not_before = parsed.validity().not_before.timestamp();
	let not_after = parsed.validity().not_after.timestamp();
	if now < not_before || now > not_after {
		return Err(Error::CertificateExpired);
	}

	cert.ttl = Duration::from_secs((not_after - now).max(0) as u64);
	Ok(())
}

impl CertificateStore for TlsStore {
	fn store(&self, domain: &str, cert: &Certificate) -> SwResult<()> {
		let dir = self.output_dir(domain);
		std::fs::create_dir_all(&dir)?;
		std::fs::write(dir.join(CERT_FILE_NAME), cert.cert_pem.as_bytes())?;
		std::fs::write(dir.join(PRIVATE_KEY_FILE_NAME), cert.key_pem.as_bytes())?;
		Ok(())
	}

	fn resolve(&self, domain: &str) -> SwResult<Certificate> {
		let dir = self.latest_dir(domain)?;
		let cert_pem = read_pem_file(&dir.join(CERT_FILE_NAME), domain)?;
		let key_pem = read_pem_file(&dir.join(PRIVATE_KEY_FILE_NAME), domain)?;

		let mut cert = Certificate { cert_pem, key_pem, ttl: Duration::ZERO };
		validate(&mut cert)?;
		Ok(cert)
	}
}

fn read_pem_file(path: &Path, domain: &str) -> SwResult<Box<str>> {
	match std::fs::read_to_string(path) {
		Ok(data) => Ok(data.into_boxed_str()),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
			Err(Error::CertificateNotFound(domain.into()))
		}
		Err(err) => Err(err.into()),
	}
}

// Cache layer //
//*************//

const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
	cert: Certificate,
	inserted: Instant,
}

/// Wraps a store with an expiring in-memory map. Every successful `store`
/// primes the cache; readers revalidate freshness through the certificate's
/// own `ttl` field.
pub struct CachedCertStore<S> {
	store: S,
	cache: RwLock<HashMap<Box<str>, CacheEntry>>,
}

impl<S: CertificateStore> CachedCertStore<S> {
	pub fn new(store: S) -> Self {
		Self { store, cache: RwLock::new(HashMap::new()) }
	}

	fn prime(&self, domain: &str, cert: Certificate) {
		self.cache
			.write()
			.insert(domain.into(), CacheEntry { cert, inserted: Instant::now() });
	}
}

impl<S: CertificateStore> CertificateStore for CachedCertStore<S> {
	fn store(&self, domain: &str, cert: &Certificate) -> SwResult<()> {
		self.store.store(domain, cert)?;
		let mut cert = cert.clone();
		// Derive the TTL so cached reads match a disk resolve
		if validate(&mut cert).is_ok() {
			self.prime(domain, cert);
		}
		Ok(())
	}

	fn resolve(&self, domain: &str) -> SwResult<Certificate> {
		{
			let cache = self.cache.read();
			if let Some(entry) = cache.get(domain) {
				if entry.inserted.elapsed() < CACHE_TTL {
					return Ok(entry.cert.clone());
				}
			}
		}

		let cert = self.store.resolve(domain)?;
		self.prime(domain, cert.clone());
		Ok(cert)
	}
}


// vim: ts=4
