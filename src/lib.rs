//! xip DNS Server Library
//!
//! An authoritative DNS server that answers `<anything>.<a>.<b>.<c>.<d>.<wildcard-domain>`
//! with the address `a.b.c.d`, plus synthesized NS and SOA records for the zone.
//! It handles DNS queries over UDP and TCP and never forwards or caches.

// Define modules
pub mod errors;
pub mod config;
pub mod wildcard;
pub mod resolver;
pub mod dns;
pub mod handlers;
pub mod utils;

// Re-export commonly used items
pub use errors::DnsError;
pub use config::{ServerConfig, ZoneConfig};
pub use resolver::{resolve, LookupResult, Question, RData, RecordClass, RecordType, Resolver, ResourceRecord};
pub use wildcard::WildcardMatcher;
