//! Request handlers for the DNS server.
//!
//! This module provides functions for handling DNS requests over UDP and TCP.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream, UdpSocket},
    task,
};

use crate::config::ServerConfig;
use crate::dns::{
    build_not_implemented_response, build_response, build_servfail_response, send_tcp_response,
};
use crate::errors::DnsError;
use crate::resolver::Resolver;
use crate::utils::{extract_question, HEADER_LEN};

/// Run the UDP DNS server.
///
/// # Arguments
/// * `config` - The server configuration.
/// * `resolver` - The shared resolver.
///
/// # Returns
/// A `Result` indicating success or failure.
pub async fn run_udp_server(config: ServerConfig, resolver: Arc<Resolver>) -> Result<(), DnsError> {
    let socket = UdpSocket::bind(config.bind_addr).await?;
    info!("UDP DNS server listening on {}", config.bind_addr);
    serve_udp(socket, config.max_packet_size, resolver).await
}

/// Serve queries arriving on an already bound UDP socket.
pub async fn serve_udp(
    socket: UdpSocket,
    max_packet_size: usize,
    resolver: Arc<Resolver>,
) -> Result<(), DnsError> {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; max_packet_size];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((amt, src)) => {
                let query = buf[..amt].to_vec();
                let socket = socket.clone();
                let resolver = resolver.clone();
                task::spawn(async move {
                    if let Err(e) = handle_udp_query(query, src, socket, resolver).await {
                        warn!("UDP query error: {}", e);
                    }
                });
            }
            Err(e) => error!("UDP receive error: {}", e),
        }
    }
}

/// Handle a UDP DNS query.
///
/// # Arguments
/// * `query` - The DNS query.
/// * `src` - The source address of the query.
/// * `socket` - The UDP socket to send the response on.
/// * `resolver` - The shared resolver.
///
/// # Returns
/// A `Result` indicating success or failure.
pub async fn handle_udp_query(
    query: Vec<u8>,
    src: SocketAddr,
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
) -> Result<(), DnsError> {
    debug!("UDP query from {}", src);
    if let Some(response) = process_query(&query, &resolver) {
        socket.send_to(&response, src).await?;
    }
    Ok(())
}

/// Run the TCP DNS server.
///
/// # Arguments
/// * `config` - The server configuration.
/// * `resolver` - The shared resolver.
///
/// # Returns
/// A `Result` indicating success or failure.
pub async fn run_tcp_server(config: ServerConfig, resolver: Arc<Resolver>) -> Result<(), DnsError> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("TCP DNS server listening on {}", config.bind_addr);
    serve_tcp(listener, resolver).await
}

/// Accept connections on an already bound TCP listener.
pub async fn serve_tcp(listener: TcpListener, resolver: Arc<Resolver>) -> Result<(), DnsError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let resolver = resolver.clone();
                task::spawn(async move {
                    if let Err(e) = handle_tcp_connection(stream, addr, resolver).await {
                        warn!("TCP connection error: {}", e);
                    }
                });
            }
            Err(e) => error!("TCP accept error: {}", e),
        }
    }
}

/// Handle a TCP DNS connection.
///
/// Queries are read one length-prefixed message at a time until the client closes.
///
/// # Arguments
/// * `stream` - The TCP stream.
/// * `addr` - The client address.
/// * `resolver` - The shared resolver.
///
/// # Returns
/// A `Result` indicating success or failure.
pub async fn handle_tcp_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    resolver: Arc<Resolver>,
) -> Result<(), DnsError> {
    loop {
        // Read the 2-byte length prefix
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let len = u16::from_be_bytes(len_buf) as usize;

        // Read the DNS query
        let mut query = vec![0u8; len];
        stream.read_exact(&mut query).await?;

        debug!("TCP query from {}", addr);
        match process_query(&query, &resolver) {
            Some(response) => send_tcp_response(&mut stream, &response).await?,
            // Nothing sensible to answer; the stream may be out of sync
            None => return Ok(()),
        }
    }
}

/// Decode, resolve and encode one query.
///
/// Returns `None` when the packet is dropped: shorter than a header, a response rather
/// than a query, or carrying no readable question.
pub fn process_query(query: &[u8], resolver: &Resolver) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        debug!("Received malformed query");
        return None;
    }

    if query[2] & 0x80 != 0 {
        debug!("Ignoring packet with QR set");
        return None;
    }

    let opcode = (query[2] & 0x78) >> 3;
    if opcode != 0 {
        return build_not_implemented_response(query);
    }

    let question = match extract_question(query) {
        Some(q) => q,
        None => {
            debug!("Failed to extract question from query");
            return None;
        }
    };

    debug!("Processing query for {} ({:?})", question.name, question.qtype);

    let result = resolver.resolve(&question);
    match build_response(query, &result) {
        Ok(resp) => Some(resp),
        Err(e) => {
            warn!("Failed to encode answer for {}: {}", question.name, e);
            build_servfail_response(query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneConfig;
    use crate::dns::{RCODE_NOERROR, RCODE_NOTIMP, RCODE_NXDOMAIN, RCODE_SERVFAIL};
    use crate::utils::test_support::build_query;

    fn resolver() -> Resolver {
        Resolver::new(ZoneConfig::default()).unwrap()
    }

    #[test]
    fn answers_wildcard_query() {
        let query = build_query(3, "foo.10.0.0.7.xip.io", 1, 1, None);
        let resp = process_query(&query, &resolver()).unwrap();
        assert_eq!(resp[3] & 0x0F, RCODE_NOERROR);
        assert_eq!(&resp[resp.len() - 4..], &[10, 0, 0, 7]);
    }

    #[test]
    fn out_of_range_address_is_a_server_failure() {
        let query = build_query(3, "999.1.2.3.xip.io", 1, 1, None);
        let resp = process_query(&query, &resolver()).unwrap();
        assert_eq!(resp[3] & 0x0F, RCODE_SERVFAIL);
        assert_eq!(u16::from_be_bytes([resp[6], resp[7]]), 0);
    }

    #[test]
    fn non_utf8_label_is_answered_nxdomain() {
        let mut query = build_query(3, "zz.example.com", 1, 1, None);
        query[HEADER_LEN + 1] = 0xFF;
        let resp = process_query(&query, &resolver()).unwrap();
        assert_eq!(&resp[..2], &[0, 3]);
        assert_eq!(resp[2] & 0x04, 0x04);
        assert_eq!(resp[3] & 0x0F, RCODE_NXDOMAIN);
        assert_eq!(&resp[HEADER_LEN..], &query[HEADER_LEN..]);
    }

    #[test]
    fn drops_short_packets_and_responses() {
        assert!(process_query(&[0u8; 11], &resolver()).is_none());

        let mut query = build_query(3, "1.2.3.4.xip.io", 1, 1, None);
        query[2] |= 0x80;
        assert!(process_query(&query, &resolver()).is_none());
    }

    #[test]
    fn other_opcodes_are_not_implemented() {
        let mut query = build_query(3, "xip.io", 1, 1, None);
        query[2] |= 2 << 3; // STATUS
        let resp = process_query(&query, &resolver()).unwrap();
        assert_eq!(resp[3] & 0x0F, RCODE_NOTIMP);
    }
}
