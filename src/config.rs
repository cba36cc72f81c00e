//! Configuration for the DNS server.
//!
//! This module defines the configuration structures and methods to load
//! configuration from environment variables.

use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
};

use crate::errors::DnsError;

/// Default TTL for synthesized records in seconds (60 hours).
pub const DEFAULT_TTL: u32 = 60 * 60 * 60;

/// Maximum size of DNS packets in bytes.
pub const MAX_PACKET_SIZE: usize = 4096;

/// Smallest accepted UDP receive buffer; every DNS client must handle 512-byte messages.
pub const MIN_PACKET_SIZE: usize = 512;

/// Default listen port for both UDP and TCP.
pub const DEFAULT_PORT: u16 = 10053;

/// The zone this server answers for. Immutable once the server has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneConfig {
    /// Suffix under which dotted-quad labels resolve to their embedded address.
    pub wildcard_domain: String,

    /// Nameserver returned in synthesized NS answers.
    pub ns_domain: String,

    /// Address of this server, returned as glue for the nameserver.
    pub responder_ip: Ipv4Addr,

    /// Time-to-live applied to every synthesized record.
    pub ttl: u32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            wildcard_domain: "xip.io".into(),
            ns_domain: "ns-1.xip.io".into(),
            responder_ip: Ipv4Addr::LOCALHOST,
            ttl: DEFAULT_TTL,
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the UDP and TCP listeners to.
    pub bind_addr: SocketAddr,

    /// Maximum size of DNS packets.
    pub max_packet_size: usize,

    /// Diagnostic verbosity, mapped onto the default log filter.
    pub debug_level: u8,

    /// The zone served by this process.
    pub zone: ZoneConfig,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    ///
    /// # Returns
    /// A `Result` containing either the loaded `ServerConfig` or a `DnsError`.
    pub fn from_env() -> Result<Self, DnsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DnsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ZoneConfig::default();

        let port: u16 = parse_var(&lookup, "DNS_PORT", DEFAULT_PORT)?;

        let bind_ip: IpAddr = lookup("DNS_BIND_IP")
            .unwrap_or_else(|| "0.0.0.0".into())
            .trim()
            .parse()
            .map_err(|_| DnsError::Config("Invalid DNS_BIND_IP address".into()))?;

        let responder_ip = match lookup("MY_IP") {
            Some(v) => v
                .trim()
                .parse::<Ipv4Addr>()
                .map_err(|_| DnsError::Config(format!("Invalid MY_IP address: {}", v)))?,
            None => defaults.responder_ip,
        };

        let wildcard_domain = normalize_domain(
            &lookup("WILDCARD_DOMAIN").unwrap_or(defaults.wildcard_domain),
        );
        if wildcard_domain.is_empty() {
            return Err(DnsError::Config("WILDCARD_DOMAIN must not be empty".into()));
        }

        let ns_domain = normalize_domain(&lookup("NS_DOMAIN").unwrap_or(defaults.ns_domain));
        if ns_domain.is_empty() {
            return Err(DnsError::Config("NS_DOMAIN must not be empty".into()));
        }

        let max_packet_size: usize = parse_var(&lookup, "DNS_MAX_PACKET_SIZE", MAX_PACKET_SIZE)?;
        if max_packet_size < MIN_PACKET_SIZE {
            return Err(DnsError::Config(format!(
                "DNS_MAX_PACKET_SIZE must be at least {}, got {}",
                MIN_PACKET_SIZE, max_packet_size
            )));
        }

        Ok(Self {
            bind_addr: SocketAddr::new(bind_ip, port),
            max_packet_size,
            debug_level: parse_var(&lookup, "DEBUG_LEVEL", 0)?,
            zone: ZoneConfig {
                wildcard_domain,
                ns_domain,
                responder_ip,
                ttl: parse_var(&lookup, "DNS_TTL", DEFAULT_TTL)?,
            },
        })
    }

    /// Default `env_logger` filter for the configured debug level.
    ///
    /// Level 1 adds the compiled wildcard pattern, level 2 adds per-query lines and
    /// wildcard matches, level 3 adds every lookup and miss.
    pub fn default_log_filter(&self) -> &'static str {
        match self.debug_level {
            0 => "info",
            1 => "info,xip_dns_server::wildcard=debug",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, DnsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| DnsError::Config(format!("Invalid {} value: {}", key, v))),
        None => Ok(default),
    }
}

/// Lowercase a domain name and drop surrounding whitespace and the root dot.
pub fn normalize_domain(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, DnsError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:10053".parse::<SocketAddr>().unwrap());
        assert_eq!(config.zone, ZoneConfig::default());
        assert_eq!(config.zone.ttl, 216_000);
        assert_eq!(config.debug_level, 0);
        assert_eq!(config.default_log_filter(), "info");
    }

    #[test]
    fn overrides_are_applied_and_normalized() {
        let config = load(&[
            ("WILDCARD_DOMAIN", "Nip.Example."),
            ("NS_DOMAIN", "NS1.nip.example"),
            ("MY_IP", "192.0.2.10"),
            ("DNS_PORT", "5353"),
            ("DNS_TTL", "300"),
            ("DEBUG_LEVEL", "3"),
        ])
        .unwrap();
        assert_eq!(config.zone.wildcard_domain, "nip.example");
        assert_eq!(config.zone.ns_domain, "ns1.nip.example");
        assert_eq!(config.zone.responder_ip, Ipv4Addr::new(192, 0, 2, 10));
        assert_eq!(config.zone.ttl, 300);
        assert_eq!(config.bind_addr.port(), 5353);
        assert_eq!(config.default_log_filter(), "trace");
    }

    #[test]
    fn debug_levels_add_detail_one_step_at_a_time() {
        let filter = |level: &str| load(&[("DEBUG_LEVEL", level)]).unwrap().default_log_filter();
        assert_eq!(filter("0"), "info");
        assert_eq!(filter("1"), "info,xip_dns_server::wildcard=debug");
        assert_eq!(filter("2"), "debug");
        assert_eq!(filter("3"), "trace");
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(load(&[("MY_IP", "not-an-ip")]), Err(DnsError::Config(_))));
        assert!(matches!(load(&[("DNS_PORT", "99999")]), Err(DnsError::Config(_))));
        assert!(matches!(load(&[("DNS_TTL", "-1")]), Err(DnsError::Config(_))));
        assert!(matches!(load(&[("DEBUG_LEVEL", "loud")]), Err(DnsError::Config(_))));
        assert!(matches!(load(&[("WILDCARD_DOMAIN", " . ")]), Err(DnsError::Config(_))));
    }

    #[test]
    fn packet_size_must_parse_and_fit_a_message() {
        assert!(matches!(load(&[("DNS_MAX_PACKET_SIZE", "abc")]), Err(DnsError::Config(_))));
        assert!(matches!(load(&[("DNS_MAX_PACKET_SIZE", "0")]), Err(DnsError::Config(_))));
        assert!(matches!(load(&[("DNS_MAX_PACKET_SIZE", "511")]), Err(DnsError::Config(_))));
        assert_eq!(load(&[("DNS_MAX_PACKET_SIZE", "512")]).unwrap().max_packet_size, 512);
    }
}
