//! YAML configuration with defaults, minimum clamps and validation.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prelude::*;

const MIN_RELEASE_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
const MIN_COMMAND_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const MIN_CERTIFICATE_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const MIN_CERT_REQUEST_PLANNER_INTERVAL: Duration = Duration::from_secs(5 * 60);
const MIN_CERT_REQUEST_EXECUTOR_INTERVAL: Duration = Duration::from_secs(60);
const MIN_CERTIFICATE_TTL: Duration = Duration::from_secs(720 * 3600);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertConfig {
	pub provider: Option<String>,
	#[serde(default)]
	pub props: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configs {
	bind_address: Option<String>,
	listen_address: Option<String>,
	http_port: Option<u16>,
	https: Option<bool>,
	https_port: Option<u16>,
	disable_https_redirect: Option<bool>,
	domain: Option<String>,
	data_dir: Option<String>,
	download_dir: Option<String>,
	certificates_dir: Option<String>,
	accounts_dir: Option<String>,
	#[serde(default, with = "humantime_serde")]
	release_sync_interval: Option<Duration>,
	#[serde(default, with = "humantime_serde")]
	command_check_interval: Option<Duration>,
	#[serde(default, with = "humantime_serde")]
	certificate_check_interval: Option<Duration>,
	#[serde(default, with = "humantime_serde")]
	cert_request_planner_interval: Option<Duration>,
	#[serde(default, with = "humantime_serde")]
	cert_request_executor_interval: Option<Duration>,
	#[serde(default, with = "humantime_serde")]
	min_certificate_ttl: Option<Duration>,
	max_domain_cert_attempts: Option<u32>,
	acme_email: Option<String>,
	#[serde(default)]
	cert: CertConfig,
}

fn clamped(value: Option<Duration>, default: Duration, min: Duration, key: &str) -> Duration {
	let value = value.unwrap_or(default);
	if value < min {
		warn!("configured {} {:?} is below the minimum, clamping to {:?}", key, value, min);
		return min;
	}
	value
}

impl Configs {
	pub fn bind_address(&self) -> &str {
		self.bind_address.as_deref().unwrap_or("127.0.0.1")
	}

	pub fn listen_address(&self) -> &str {
		self.listen_address.as_deref().unwrap_or("0.0.0.0")
	}

	pub fn http_port(&self) -> u16 {
		self.http_port.unwrap_or(7080)
	}

	pub fn is_https_enabled(&self) -> bool {
		self.https.unwrap_or(false)
	}

	pub fn https_port(&self) -> u16 {
		self.https_port.unwrap_or(8443)
	}

	pub fn is_https_redirect_disabled(&self) -> bool {
		self.disable_https_redirect.unwrap_or(false)
	}

	pub fn domain(&self) -> &str {
		self.domain.as_deref().unwrap_or("pb.labenv.test")
	}

	pub fn data_dir(&self) -> PathBuf {
		PathBuf::from(self.data_dir.as_deref().unwrap_or("./data"))
	}

	pub fn download_dir(&self) -> PathBuf {
		PathBuf::from(self.download_dir.as_deref().unwrap_or("./downloads"))
	}

	pub fn certificates_dir(&self) -> PathBuf {
		PathBuf::from(self.certificates_dir.as_deref().unwrap_or("./.certificates"))
	}

	pub fn accounts_dir(&self) -> PathBuf {
		PathBuf::from(self.accounts_dir.as_deref().unwrap_or("./.accounts"))
	}

	pub fn release_sync_interval(&self) -> Duration {
		clamped(
			self.release_sync_interval,
			Duration::from_secs(10 * 60),
			MIN_RELEASE_SYNC_INTERVAL,
			"release_sync_interval",
		)
	}

	pub fn command_check_interval(&self) -> Duration {
		clamped(
			self.command_check_interval,
			MIN_COMMAND_CHECK_INTERVAL,
			MIN_COMMAND_CHECK_INTERVAL,
			"command_check_interval",
		)
	}

	pub fn certificate_check_interval(&self) -> Duration {
		clamped(
			self.certificate_check_interval,
			Duration::from_secs(3600),
			MIN_CERTIFICATE_CHECK_INTERVAL,
			"certificate_check_interval",
		)
	}

	pub fn cert_request_planner_interval(&self) -> Duration {
		clamped(
			self.cert_request_planner_interval,
			MIN_CERT_REQUEST_PLANNER_INTERVAL,
			MIN_CERT_REQUEST_PLANNER_INTERVAL,
			"cert_request_planner_interval",
		)
	}

	pub fn cert_request_executor_interval(&self) -> Duration {
		clamped(
			self.cert_request_executor_interval,
			MIN_CERT_REQUEST_EXECUTOR_INTERVAL,
			MIN_CERT_REQUEST_EXECUTOR_INTERVAL,
			"cert_request_executor_interval",
		)
	}

	pub fn min_certificate_ttl(&self) -> Duration {
		clamped(
			self.min_certificate_ttl,
			MIN_CERTIFICATE_TTL,
			MIN_CERTIFICATE_TTL,
			"min_certificate_ttl",
		)
	}

	pub fn max_domain_cert_attempts(&self) -> u32 {
		self.max_domain_cert_attempts.unwrap_or(3).clamp(1, 5)
	}

	pub fn acme_email(&self) -> String {
		match self.acme_email.as_deref() {
			Some(email) if !email.is_empty() => email.to_string(),
			_ => format!("admin@{}", self.domain()),
		}
	}

	pub fn cert_provider(&self) -> &str {
		self.cert.provider.as_deref().unwrap_or("selfsigned")
	}

	pub fn cert_prop(&self, key: &str) -> Option<&str> {
		self.cert.props.get(key).map(String::as_str)
	}

	fn validate(&self) -> SwResult<()> {
		if self.bind_address().parse::<IpAddr>().is_err() {
			return Err(Error::ConfigError(format!(
				"invalid bind_address: {}",
				self.bind_address()
			)));
		}
		if self.listen_address().parse::<IpAddr>().is_err() {
			return Err(Error::ConfigError(format!(
				"invalid listen_address: {}",
				self.listen_address()
			)));
		}
		if self.http_port() == 0 {
			return Err(Error::ConfigError("invalid http_port: must be 1..65535".into()));
		}
		if self.domain().is_empty() {
			return Err(Error::ConfigError("domain must not be empty".into()));
		}
		slipway_certs::providers::ProviderKind::parse(self.cert_provider())?;
		Ok(())
	}
}

/// Loads the configuration file; a missing path yields the defaults.
/// Invalid configuration is fatal at startup.
pub fn load(path: Option<&Path>) -> SwResult<Configs> {
	let configs = match path {
		None => Configs::default(),
		Some(path) => {
			let raw = std::fs::read_to_string(path).map_err(|err| {
				Error::ConfigError(format!("failed to read config file {:?}: {}", path, err))
			})?;
			parse(&raw)?
		}
	};
	configs.validate()?;
	if let Some(path) = path {
		info!("loaded config file {:?}", path);
	}
	Ok(configs)
}

pub fn parse(raw: &str) -> SwResult<Configs> {
	serde_yaml::from_str(raw)
		.map_err(|err| Error::ConfigError(format!("failed to parse config: {}", err)))
}

/// Example configuration printed by `slipway gen-config`.
pub const EXAMPLE: &str = "\
# Address managed service instances and the management API bind to
bind_address: 127.0.0.1
# Address the public proxy listeners bind to
listen_address: 0.0.0.0
http_port: 7080
https: false
https_port: 8443
disable_https_redirect: false
# Apex domain; services are served at <service-id>.<domain>
domain: pb.labenv.test
data_dir: ./data
download_dir: ./downloads
certificates_dir: ./.certificates
accounts_dir: ./.accounts
release_sync_interval: 10m
command_check_interval: 10s
certificate_check_interval: 1h
cert_request_planner_interval: 5m
cert_request_executor_interval: 1m
min_certificate_ttl: 720h
max_domain_cert_attempts: 3
# Defaults to admin@<domain>
#acme_email: admin@pb.labenv.test
cert:
  # selfsigned, mkcert or cloudflare
  provider: selfsigned
  #props:
  #  auth_token: <cloudflare-api-token>
";

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_the_documented_table() {
		let configs = Configs::default();
		assert_eq!(configs.bind_address(), "127.0.0.1");
		assert_eq!(configs.listen_address(), "0.0.0.0");
		assert_eq!(configs.http_port(), 7080);
		assert!(!configs.is_https_enabled());
		assert_eq!(configs.https_port(), 8443);
		assert_eq!(configs.domain(), "pb.labenv.test");
		assert_eq!(configs.release_sync_interval(), Duration::from_secs(600));
		assert_eq!(configs.command_check_interval(), Duration::from_secs(10));
		assert_eq!(configs.certificate_check_interval(), Duration::from_secs(3600));
		assert_eq!(configs.min_certificate_ttl(), Duration::from_secs(720 * 3600));
		assert_eq!(configs.max_domain_cert_attempts(), 3);
		assert_eq!(configs.acme_email(), "admin@pb.labenv.test");
		assert_eq!(configs.cert_provider(), "selfsigned");
		assert!(configs.validate().is_ok());
	}

	#[test]
	fn intervals_below_minimum_are_clamped() {
		let configs = parse(
			"release_sync_interval: 1m\ncommand_check_interval: 10ms\nmin_certificate_ttl: 1h\n",
		)
		.unwrap();
		assert_eq!(configs.release_sync_interval(), Duration::from_secs(300));
		assert_eq!(configs.command_check_interval(), Duration::from_secs(10));
		assert_eq!(configs.min_certificate_ttl(), Duration::from_secs(720 * 3600));
	}

	#[test]
	fn attempts_are_clamped_to_range() {
		let configs = parse("max_domain_cert_attempts: 9\n").unwrap();
		assert_eq!(configs.max_domain_cert_attempts(), 5);
		let configs = parse("max_domain_cert_attempts: 0\n").unwrap();
		assert_eq!(configs.max_domain_cert_attempts(), 1);
	}

	#[test]
	fn invalid_bind_address_is_fatal() {
		let configs = parse("bind_address: not-an-ip\n").unwrap();
		assert!(matches!(configs.validate(), Err(Error::ConfigError(_))));
	}

	#[test]
	fn unknown_provider_is_fatal() {
		let configs = parse("cert:\n  provider: letsencrypt\n").unwrap();
		assert!(matches!(configs.validate(), Err(Error::UnsupportedProvider(_))));
	}

	#[test]
	fn example_config_parses_and_validates() {
		let configs = parse(EXAMPLE).unwrap();
		assert!(configs.validate().is_ok());
		assert_eq!(configs.domain(), "pb.labenv.test");
	}

	#[test]
	fn full_yaml_roundtrip() {
		let configs = parse(
			"bind_address: 127.0.0.2
listen_address: 0.0.0.0
https: true
https_port: 443
domain: apps.example.org
acme_email: ops@example.org
cert:
  provider: cloudflare
  props:
    auth_token: cf-token
",
		)
		.unwrap();
		assert!(configs.is_https_enabled());
		assert_eq!(configs.https_port(), 443);
		assert_eq!(configs.acme_email(), "ops@example.org");
		assert_eq!(configs.cert_provider(), "cloudflare");
		assert_eq!(configs.cert_prop("auth_token"), Some("cf-token"));
	}
}

// vim: ts=4
