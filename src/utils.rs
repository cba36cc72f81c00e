//! Utility functions for DNS operations.
//!
//! This module provides helper functions for parsing and encoding DNS data.

use crate::resolver::{Question, RecordClass, RecordType};

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// Offset just past the QNAME of the first question, or `None` if it runs off the packet.
fn skip_qname(query: &[u8]) -> Option<usize> {
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos)? as usize;
        if len == 0 {
            return Some(pos + 1);
        }
        // Compression pointers are not valid in a question we are asked.
        if len & 0xC0 != 0 {
            return None;
        }
        pos += len + 1;
    }
}

/// Offset just past the first question (QNAME, QTYPE, QCLASS).
pub fn question_end(query: &[u8]) -> Option<usize> {
    let end = skip_qname(query)? + 4;
    (end <= query.len()).then_some(end)
}

/// Extract the domain name from a DNS query packet.
///
/// # Arguments
/// * `query` - The DNS query packet.
///
/// # Returns
/// An `Option` containing the domain name if successfully extracted.
pub fn extract_domain(query: &[u8]) -> Option<String> {
    if query.len() < HEADER_LEN {
        return None;
    }

    let mut pos = HEADER_LEN;
    let mut domain = String::new();

    loop {
        let len = *query.get(pos)? as usize;
        if len == 0 {
            break;
        }
        if len & 0xC0 != 0 {
            return None;
        }
        pos += 1;

        if pos + len > query.len() {
            return None;
        }

        if !domain.is_empty() {
            domain.push('.');
        }

        // Bytes that are not UTF-8 cannot match the zone; keep them visible as U+FFFD
        domain.push_str(&String::from_utf8_lossy(&query[pos..pos + len]));
        pos += len;
    }

    // Verify we have enough data for QTYPE/QCLASS
    if pos + 5 > query.len() {
        return None;
    }

    Some(domain)
}

/// Extract the query type from a DNS query packet.
pub fn extract_query_type(query: &[u8]) -> Option<u16> {
    let pos = skip_qname(query)?;
    if pos + 1 < query.len() {
        Some(u16::from_be_bytes([query[pos], query[pos + 1]]))
    } else {
        None
    }
}

/// Extract the query class from a DNS query packet.
pub fn extract_query_class(query: &[u8]) -> Option<u16> {
    let pos = skip_qname(query)? + 2;
    if pos + 1 < query.len() {
        Some(u16::from_be_bytes([query[pos], query[pos + 1]]))
    } else {
        None
    }
}

/// Decode the first question of a query into the resolver's terms.
pub fn extract_question(query: &[u8]) -> Option<Question> {
    let name = extract_domain(query)?;
    let qtype = extract_query_type(query)?;
    let class = extract_query_class(query)?;
    Some(Question::new(name, RecordClass::from(class), RecordType::from(qtype)))
}

/// Encode a domain name in DNS wire format.
///
/// # Arguments
/// * `name` - The domain name to encode.
///
/// # Returns
/// A vector of bytes containing the encoded domain name.
pub fn encode_dns_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for part in name.trim_end_matches('.').split('.') {
        if part.is_empty() || part.len() > 63 {
            continue; // Skip invalid labels
        }
        out.push(part.len() as u8);
        out.extend_from_slice(part.as_bytes());
    }
    out.push(0); // Null terminator
    out
}

/// Skip a possibly compressed owner name in a resource record.
fn skip_name(query: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *query.get(pos)?;
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2);
        }
        if len == 0 {
            return Some(pos + 1);
        }
        pos += len as usize + 1;
    }
}

/// Locate the OPT pseudo-record in the additional section.
///
/// Returns the offset of its TYPE field.
fn find_opt_record(query: &[u8]) -> Option<usize> {
    if query.len() < HEADER_LEN {
        return None;
    }

    let ancount = u16::from_be_bytes([query[6], query[7]]) as usize;
    let nscount = u16::from_be_bytes([query[8], query[9]]) as usize;
    let arcount = u16::from_be_bytes([query[10], query[11]]) as usize;
    if arcount == 0 {
        return None;
    }

    let mut pos = question_end(query)?;

    for index in 0..(ancount + nscount + arcount) {
        let type_pos = skip_name(query, pos)?;
        // TYPE, CLASS, TTL, RDLENGTH
        if type_pos + 10 > query.len() {
            return None;
        }
        if index >= ancount + nscount
            && query[pos] == 0
            && u16::from_be_bytes([query[type_pos], query[type_pos + 1]]) == 41
        {
            return Some(type_pos);
        }
        let rdlength = u16::from_be_bytes([query[type_pos + 8], query[type_pos + 9]]) as usize;
        pos = type_pos + 10 + rdlength;
    }

    None
}

/// Check if a DNS query packet has an OPT record (EDNS).
pub fn has_opt_record(query: &[u8]) -> bool {
    find_opt_record(query).is_some()
}

/// Extract the EDNS payload size from a DNS query packet.
pub fn extract_edns_payload_size(query: &[u8]) -> Option<u16> {
    let pos = find_opt_record(query)?;
    // The CLASS field of an OPT record carries the payload size
    Some(u16::from_be_bytes([query[pos + 2], query[pos + 3]]))
}

/// Extract the DO (DNSSEC OK) bit from a DNS query packet.
pub fn extract_do_bit(query: &[u8]) -> bool {
    match find_opt_record(query) {
        // TTL bytes: extended RCODE, version, then the flags word
        Some(pos) => query[pos + 6] & 0x80 != 0,
        None => false,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::encode_dns_name;

    /// Build a single-question query, optionally with an OPT record.
    pub fn build_query(id: u16, name: &str, qtype: u16, qclass: u16, edns: Option<(u16, bool)>) -> Vec<u8> {
        let mut q = Vec::new();
        q.extend_from_slice(&id.to_be_bytes());
        q.extend_from_slice(&[0x01, 0x00]); // RD
        q.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        q.extend_from_slice(&[0x00, if edns.is_some() { 1 } else { 0 }]);
        q.extend_from_slice(&encode_dns_name(name));
        q.extend_from_slice(&qtype.to_be_bytes());
        q.extend_from_slice(&qclass.to_be_bytes());
        if let Some((size, do_bit)) = edns {
            q.push(0);
            q.extend_from_slice(&41u16.to_be_bytes());
            q.extend_from_slice(&size.to_be_bytes());
            q.extend_from_slice(&[0, 0, if do_bit { 0x80 } else { 0 }, 0]);
            q.extend_from_slice(&[0, 0]);
        }
        q
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::build_query;
    use super::*;

    #[test]
    fn decodes_question_fields() {
        let q = build_query(7, "www.10.0.0.1.xip.io", 6, 1, None);
        assert_eq!(extract_domain(&q).as_deref(), Some("www.10.0.0.1.xip.io"));
        assert_eq!(extract_query_type(&q), Some(6));
        assert_eq!(extract_query_class(&q), Some(1));
        assert_eq!(question_end(&q), Some(q.len()));
        assert_eq!(
            extract_question(&q),
            Some(Question::new("www.10.0.0.1.xip.io", RecordClass::IN, RecordType::SOA))
        );
    }

    #[test]
    fn non_utf8_labels_decode_lossily() {
        let mut q = build_query(7, "zz.example.com", 1, 1, None);
        q[HEADER_LEN + 1] = 0xFF;
        assert_eq!(extract_domain(&q).as_deref(), Some("\u{FFFD}z.example.com"));
    }

    #[test]
    fn root_name_decodes_to_empty() {
        let q = build_query(1, ".", 2, 1, None);
        assert_eq!(extract_domain(&q).as_deref(), Some(""));
    }

    #[test]
    fn truncated_packets_are_rejected() {
        let q = build_query(7, "xip.io", 1, 1, None);
        assert_eq!(extract_domain(&q[..5]), None);
        assert_eq!(extract_domain(&q[..q.len() - 2]), None);
        assert_eq!(extract_question(&q[..15]), None);
    }

    #[test]
    fn edns_fields_are_read() {
        let q = build_query(9, "xip.io", 1, 1, Some((1232, true)));
        assert!(has_opt_record(&q));
        assert_eq!(extract_edns_payload_size(&q), Some(1232));
        assert!(extract_do_bit(&q));

        let plain = build_query(9, "xip.io", 1, 1, None);
        assert!(!has_opt_record(&plain));
        assert_eq!(extract_edns_payload_size(&plain), None);
        assert!(!extract_do_bit(&plain));
    }

    #[test]
    fn encodes_names() {
        assert_eq!(encode_dns_name("xip.io."), b"\x03xip\x02io\x00".to_vec());
        assert_eq!(encode_dns_name(""), vec![0]);
    }
}
