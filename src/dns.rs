//! DNS protocol implementation.
//!
//! This module turns resolver results into DNS response messages.

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::errors::DnsError;
use crate::resolver::{LookupResult, RData, ResourceRecord};
use crate::utils::{
    encode_dns_name, extract_do_bit, extract_domain, extract_edns_payload_size, has_opt_record,
    question_end, HEADER_LEN,
};

/// RCODE for a successful answer.
pub const RCODE_NOERROR: u8 = 0;

/// RCODE for a failure inside the server.
pub const RCODE_SERVFAIL: u8 = 2;

/// RCODE for a name that does not exist.
pub const RCODE_NXDOMAIN: u8 = 3;

/// RCODE for an unsupported opcode.
pub const RCODE_NOTIMP: u8 = 4;

/// Class IN, used for every record we emit.
const CLASS_IN: [u8; 2] = [0x00, 0x01];

/// Send a DNS response over TCP.
///
/// # Arguments
/// * `stream` - The TCP stream to send the response on.
/// * `response` - The DNS response to send.
///
/// # Returns
/// A `Result` indicating success or failure.
pub async fn send_tcp_response(stream: &mut TcpStream, response: &[u8]) -> io::Result<()> {
    stream.write_all(&(response.len() as u16).to_be_bytes()).await?;
    stream.write_all(response).await
}

/// Build the response for a resolver result.
///
/// `Answered` becomes a NOERROR response carrying the three sections; `NotAuthoritative`
/// becomes an authoritative NXDOMAIN.
///
/// # Arguments
/// * `query` - The DNS query.
/// * `result` - What the resolver decided for the query's question.
///
/// # Returns
/// A `Result` containing the response or an error.
pub fn build_response(query: &[u8], result: &LookupResult) -> Result<Vec<u8>, DnsError> {
    match result {
        LookupResult::Answered {
            answers,
            authority,
            additional,
        } => build_answer_response(query, answers, authority, additional),
        LookupResult::NotAuthoritative { .. } => build_nxdomain_response(query)
            .ok_or_else(|| DnsError::Protocol("Invalid question format".into())),
    }
}

/// Build a NOERROR response with the given sections.
pub fn build_answer_response(
    query: &[u8],
    answers: &[ResourceRecord],
    authority: &[ResourceRecord],
    additional: &[ResourceRecord],
) -> Result<Vec<u8>, DnsError> {
    let qend = question_end(query)
        .ok_or_else(|| DnsError::Protocol("Invalid question format".into()))?;
    let qname = extract_domain(query).unwrap_or_default();
    let has_edns = has_opt_record(query);

    let mut response = Vec::with_capacity(512);
    write_header(
        &mut response,
        query,
        RCODE_NOERROR,
        [
            1,
            answers.len() as u16,
            authority.len() as u16,
            additional.len() as u16 + u16::from(has_edns),
        ],
    );

    // Copy question section from query
    response.extend_from_slice(&query[HEADER_LEN..qend]);

    for record in answers.iter().chain(authority).chain(additional) {
        encode_record(&mut response, record, &qname)?;
    }

    if has_edns {
        write_opt_record(&mut response, query);
    }

    Ok(response)
}

/// Build a DNS response for a "name error" (NXDOMAIN).
///
/// # Arguments
/// * `query` - The DNS query.
///
/// # Returns
/// An `Option` containing the response, or `None` if the query has no readable question.
pub fn build_nxdomain_response(query: &[u8]) -> Option<Vec<u8>> {
    build_empty_response(query, RCODE_NXDOMAIN)
}

/// Build a DNS response for a "server failure" (SERVFAIL).
///
/// Used when an answer was decided but cannot be put on the wire, so the client
/// neither caches the name as missing nor receives a bogus record.
///
/// # Arguments
/// * `query` - The DNS query.
///
/// # Returns
/// An `Option` containing the response, or `None` if the query has no readable question.
pub fn build_servfail_response(query: &[u8]) -> Option<Vec<u8>> {
    build_empty_response(query, RCODE_SERVFAIL)
}

/// Echo the question with no records and the given RCODE.
fn build_empty_response(query: &[u8], rcode: u8) -> Option<Vec<u8>> {
    let qend = question_end(query)?;
    let has_edns = has_opt_record(query);

    let mut resp = Vec::with_capacity(512);
    write_header(&mut resp, query, rcode, [1, 0, 0, u16::from(has_edns)]);
    resp.extend_from_slice(&query[HEADER_LEN..qend]);

    if has_edns {
        write_opt_record(&mut resp, query);
    }

    Some(resp)
}

/// Build a DNS response for a "not implemented" error.
///
/// The question is echoed when it can be read; otherwise the response carries the header only.
///
/// # Arguments
/// * `query` - The DNS query.
///
/// # Returns
/// An `Option` containing the response, or `None` if the packet is shorter than a header.
pub fn build_not_implemented_response(query: &[u8]) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }

    let qend = question_end(query);
    let has_edns = qend.is_some() && has_opt_record(query);

    let mut resp = Vec::with_capacity(512);
    write_header(
        &mut resp,
        query,
        RCODE_NOTIMP,
        [u16::from(qend.is_some()), 0, 0, u16::from(has_edns)],
    );

    if let Some(qend) = qend {
        resp.extend_from_slice(&query[HEADER_LEN..qend]);
    }

    if has_edns {
        write_opt_record(&mut resp, query);
    }

    Some(resp)
}

/// Write the response header.
///
/// QR and AA are set, OPCODE and RD are copied from the query, RA is clear since
/// this server never recurses.
fn write_header(out: &mut Vec<u8>, query: &[u8], rcode: u8, counts: [u16; 4]) {
    // Transaction ID
    out.extend_from_slice(&query[..2]);

    let opcode = query[2] & 0x78;
    let rd = query[2] & 0x01;
    out.push(0x80 | opcode | 0x04 | rd);
    out.push(rcode & 0x0F);

    for count in counts {
        out.extend_from_slice(&count.to_be_bytes());
    }
}

/// Append one resource record.
///
/// Owner names equal to the question name are written as a pointer to the question.
fn encode_record(out: &mut Vec<u8>, record: &ResourceRecord, qname: &str) -> Result<(), DnsError> {
    if record.name.trim_end_matches('.').eq_ignore_ascii_case(qname) {
        out.extend_from_slice(&[0xc0, 0x0c]);
    } else {
        out.extend_from_slice(&encode_dns_name(&record.name));
    }

    out.extend_from_slice(&u16::from(record.data.record_type()).to_be_bytes());
    out.extend_from_slice(&CLASS_IN);
    out.extend_from_slice(&record.ttl.to_be_bytes());

    let rdata = encode_rdata(&record.data)?;
    out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    out.extend_from_slice(&rdata);
    Ok(())
}

fn encode_rdata(data: &RData) -> Result<Vec<u8>, DnsError> {
    match data {
        RData::A { address } => {
            // The matcher does not range-check octets, so this is where 999.x.x.x is rejected
            let octets: Vec<u8> = address
                .split('.')
                .filter_map(|s| s.parse::<u8>().ok())
                .collect();

            if octets.len() != 4 || address.split('.').count() != 4 {
                return Err(DnsError::Protocol(format!("Invalid IPv4 address: {}", address)));
            }
            Ok(octets)
        }
        RData::NS { nameserver } => Ok(encode_dns_name(nameserver)),
        RData::SOA {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } => {
            let mut rdata = encode_dns_name(mname);
            rdata.extend_from_slice(&encode_dns_name(rname));
            for value in [serial, refresh, retry, expire, minimum] {
                rdata.extend_from_slice(&value.to_be_bytes());
            }
            Ok(rdata)
        }
    }
}

/// Append an OPT record mirroring the query's payload size and DO bit.
fn write_opt_record(out: &mut Vec<u8>, query: &[u8]) {
    let opt_payload_size = extract_edns_payload_size(query).unwrap_or(4096);
    let do_bit = extract_do_bit(query);

    out.push(0x00); // Root domain
    out.extend_from_slice(&[0x00, 0x29]); // TYPE OPT
    out.extend_from_slice(&opt_payload_size.to_be_bytes()); // UDP payload size
    out.push(0x00); // Extended RCODE
    out.push(0x00); // EDNS version
    if do_bit {
        out.extend_from_slice(&[0x80, 0x00]); // Flags with DO bit set
    } else {
        out.extend_from_slice(&[0x00, 0x00]); // Flags with DO bit clear
    }
    out.extend_from_slice(&[0x00, 0x00]); // RDATA length
}
