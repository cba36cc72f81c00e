//! Wildcard name matching.
//!
//! Recognizes names of the form `<label>.<a>.<b>.<c>.<d>.<wildcard-domain>` and
//! `<a>.<b>.<c>.<d>.<wildcard-domain>` and extracts the embedded dotted quad.

use log::debug;
use regex::{Regex, RegexBuilder};

use crate::errors::DnsError;

/// Compiled matcher for one wildcard domain.
#[derive(Debug, Clone)]
pub struct WildcardMatcher {
    pattern: Regex,
}

impl WildcardMatcher {
    /// Compile a matcher for `wildcard_domain`.
    ///
    /// The domain is escaped, so it is matched literally. Octets are plain digit runs with
    /// no range check: `999.1.2.3.<domain>` matches.
    pub fn new(wildcard_domain: &str) -> Result<Self, DnsError> {
        let domain = wildcard_domain.trim_end_matches('.');
        let pattern = format!(
            r"^(?:.*\.)?(?P<ipaddr>[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)\.{}\.?$",
            regex::escape(domain)
        );
        debug!("wildcard {}", pattern);

        let pattern = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| DnsError::Config(format!("Invalid wildcard domain {}: {}", domain, e)))?;
        Ok(Self { pattern })
    }

    /// Return the dotted-quad text embedded in `name`, if any.
    pub fn match_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(name)
            .and_then(|caps| caps.name("ipaddr"))
            .map(|m| m.as_str())
    }
}
