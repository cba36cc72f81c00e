//! Resolution engine.
//!
//! Decides, for one decoded question, which synthesized records answer it or whether the
//! name is absent from the zone. Nothing here performs I/O or keeps state between calls.

use log::{debug, trace};

use crate::config::{normalize_domain, ZoneConfig};
use crate::errors::DnsError;
use crate::wildcard::WildcardMatcher;

/// Record types the engine distinguishes. Anything else is carried as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            other => RecordType::Other(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::Other(other) => other,
        }
    }
}

/// Query classes. The engine does not dispatch on class; it is kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    IN,
    CH,
    HS,
    ANY,
    Other(u16),
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            3 => RecordClass::CH,
            4 => RecordClass::HS,
            255 => RecordClass::ANY,
            other => RecordClass::Other(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::CH => 3,
            RecordClass::HS => 4,
            RecordClass::ANY => 255,
            RecordClass::Other(other) => other,
        }
    }
}

/// A decoded question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub class: RecordClass,
    pub qtype: RecordType,
}

impl Question {
    pub fn new(name: impl Into<String>, class: RecordClass, qtype: RecordType) -> Self {
        Self {
            name: name.into(),
            class,
            qtype,
        }
    }
}

/// Record payloads the engine can synthesize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    /// Dotted-quad text. Taken verbatim from the query name, so octets may exceed 255.
    A { address: String },
    NS { nameserver: String },
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
}

impl RData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RData::A { .. } => RecordType::A,
            RData::NS { .. } => RecordType::NS,
            RData::SOA { .. } => RecordType::SOA,
        }
    }
}

/// One synthesized resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub ttl: u32,
    /// Set when this server is authoritative for `name`.
    pub auth: bool,
    pub data: RData,
}

/// Outcome of one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Answered {
        answers: Vec<ResourceRecord>,
        authority: Vec<ResourceRecord>,
        additional: Vec<ResourceRecord>,
    },
    /// The zone holds nothing for `name`; encoded as an authoritative NXDOMAIN.
    NotAuthoritative { name: String },
}

impl LookupResult {
    fn answer(record: ResourceRecord) -> Self {
        LookupResult::Answered {
            answers: vec![record],
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }
}

/// The resolver for one zone: configuration plus its compiled wildcard matcher.
#[derive(Debug, Clone)]
pub struct Resolver {
    zone: ZoneConfig,
    matcher: WildcardMatcher,
}

impl Resolver {
    /// Build a resolver. Fails only if the wildcard domain cannot be compiled.
    pub fn new(zone: ZoneConfig) -> Result<Self, DnsError> {
        let zone = ZoneConfig {
            wildcard_domain: normalize_domain(&zone.wildcard_domain),
            ..zone
        };
        let matcher = WildcardMatcher::new(&zone.wildcard_domain)?;
        Ok(Self { zone, matcher })
    }

    pub fn zone(&self) -> &ZoneConfig {
        &self.zone
    }

    /// Whether `name` is the wildcard domain or lies below it.
    pub fn in_zone(&self, name: &str) -> bool {
        let name = normalize_domain(name);
        let domain = &self.zone.wildcard_domain;
        name == *domain
            || (name.len() > domain.len()
                && name.ends_with(domain.as_str())
                && name.as_bytes()[name.len() - domain.len() - 1] == b'.')
    }

    /// Resolve a question against the zone.
    pub fn resolve(&self, question: &Question) -> LookupResult {
        let name = question.name.as_str();
        trace!("address {} ({:?} {:?})", name, question.class, question.qtype);

        match question.qtype {
            RecordType::NS => self.lookup_nameservers(name),
            RecordType::SOA => LookupResult::answer(self.soa_record(name)),
            _ => match self.local_lookup(name) {
                Some(address) => LookupResult::answer(ResourceRecord {
                    name: name.to_string(),
                    ttl: self.zone.ttl,
                    auth: true,
                    data: RData::A {
                        address: address.to_string(),
                    },
                }),
                None => {
                    trace!("unknown {}", name);
                    LookupResult::NotAuthoritative {
                        name: name.to_string(),
                    }
                }
            },
        }
    }

    fn lookup_nameservers(&self, name: &str) -> LookupResult {
        if !self.in_zone(name) {
            trace!("unknown {}", name);
            return LookupResult::NotAuthoritative {
                name: name.to_string(),
            };
        }

        let ns = ResourceRecord {
            name: name.to_string(),
            ttl: self.zone.ttl,
            auth: true,
            data: RData::NS {
                nameserver: self.zone.ns_domain.clone(),
            },
        };
        let glue = ResourceRecord {
            name: name.to_string(),
            ttl: self.zone.ttl,
            auth: false,
            data: RData::A {
                address: self.zone.responder_ip.to_string(),
            },
        };

        LookupResult::Answered {
            answers: vec![ns],
            authority: Vec::new(),
            additional: vec![glue],
        }
    }

    fn soa_record(&self, name: &str) -> ResourceRecord {
        let ttl = self.zone.ttl;
        ResourceRecord {
            name: name.to_string(),
            ttl,
            auth: true,
            data: RData::SOA {
                mname: self.zone.wildcard_domain.clone(),
                rname: self.zone.wildcard_domain.clone(),
                serial: 0,
                refresh: ttl,
                retry: 0,
                expire: ttl.saturating_mul(24),
                minimum: ttl,
            },
        }
    }

    fn local_lookup<'a>(&self, name: &'a str) -> Option<&'a str> {
        trace!("lookup {}", name);
        let address = self.matcher.match_name(name)?;
        debug!("wildcard {} --> {}", name, address);
        Some(address)
    }
}

/// One-shot resolution for callers holding only a `ZoneConfig`.
///
/// Compiles the wildcard pattern on every call; long-lived servers should build a
/// `Resolver` once and share it.
pub fn resolve(question: &Question, zone: &ZoneConfig) -> Result<LookupResult, DnsError> {
    Ok(Resolver::new(zone.clone())?.resolve(question))
}
