//! Stats Ingester (C2).
//!
//! Grounded on `examples/original_source/slave/shadowsocks/manager_ng.go`'s
//! `StatRecvHandler`/`Listen`: a UDP socket on `127.0.0.1:<mgrPort>`, datagrams
//! of the form `stat: {"<port>":<bytes>}\0`. Parsing is a pure function so it
//! is unit-testable without a live socket (spec.md, SPEC_FULL.md §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatParseError {
    #[error("unrecognized command")]
    UnrecognizedCommand,
    #[error("malformed JSON body")]
    MalformedJson,
    #[error("stat body must contain exactly one key, found {0}")]
    WrongKeyCount(usize),
    #[error("port {0} is not a valid decimal port number")]
    InvalidPort(String),
    #[error("negative traffic value")]
    NegativeTraffic,
}

/// Parses one `stat:` datagram body into `(port, cumulative_bytes)`.
///
/// Accepts an optional trailing NUL byte and surrounding whitespace, per
/// spec.md §6's exact wire description: "the 5-byte prefix `stat:` then a
/// space then a one-key JSON object `{"<port>": <bytes>}` then a single
/// NUL byte".
pub fn parse_stat_datagram(data: &[u8]) -> Result<(u16, i64), StatParseError> {
    let trimmed = data.strip_suffix(&[0u8]).unwrap_or(data);
    let text = std::str::from_utf8(trimmed).map_err(|_| StatParseError::MalformedJson)?;
    let text = text.trim();

    let Some(body) = text.strip_prefix("stat:") else {
        return Err(StatParseError::UnrecognizedCommand);
    };
    let body = body.trim();

    let parsed: HashMap<String, i64> =
        serde_json::from_str(body).map_err(|_| StatParseError::MalformedJson)?;

    if parsed.len() != 1 {
        return Err(StatParseError::WrongKeyCount(parsed.len()));
    }

    let (port_str, traffic) = parsed.into_iter().next().expect("checked len == 1");
    let port: u16 = port_str
        .parse()
        .map_err(|_| StatParseError::InvalidPort(port_str))?;
    if traffic < 0 {
        return Err(StatParseError::NegativeTraffic);
    }
    Ok((port, traffic))
}

/// Binds the UDP stats socket. Split from `serve` so `main` can follow
/// spec.md §4.3's strict startup order (bind UDP, then `Restore`, then bind
/// TCP, then serve) without racing a background task against `Restore`.
pub async fn bind(manager_port: u16) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(("127.0.0.1", manager_port)).await?;
    tracing::info!(port = manager_port, "stats ingester listening");
    Ok(socket)
}

/// Services datagrams on an already-bound socket until `cancel` fires.
pub async fn serve(
    socket: UdpSocket,
    supervisor: Arc<Supervisor>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("stats ingester shutting down");
                return Ok(());
            }
            result = socket.recv_from(&mut buf) => {
                let (n, from) = match result {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::warn!(error = %err, "stats socket read error");
                        continue;
                    }
                };
                tracing::debug!(%from, bytes = n, "received stats datagram");
                match parse_stat_datagram(&buf[..n]) {
                    Ok((port, traffic)) => {
                        if !supervisor.record_traffic(port, traffic).await {
                            tracing::warn!(port, "stats datagram for unknown port, dropped");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "dropped malformed stats datagram");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_datagram() {
        let data = b"stat: {\"20000\":12345}\0";
        assert_eq!(parse_stat_datagram(data), Ok((20000, 12345)));
    }

    #[test]
    fn parses_without_trailing_nul() {
        let data = b"stat: {\"20000\":12345}";
        assert_eq!(parse_stat_datagram(data), Ok((20000, 12345)));
    }

    #[test]
    fn rejects_unrecognized_command() {
        let data = b"ping: {}\0";
        assert_eq!(parse_stat_datagram(data), Err(StatParseError::UnrecognizedCommand));
    }

    #[test]
    fn rejects_multi_key_body() {
        let data = b"stat: {\"20000\":1,\"20001\":2}\0";
        assert_eq!(
            parse_stat_datagram(data),
            Err(StatParseError::WrongKeyCount(2))
        );
    }

    #[test]
    fn rejects_negative_traffic() {
        let data = b"stat: {\"20000\":-1}\0";
        assert_eq!(parse_stat_datagram(data), Err(StatParseError::NegativeTraffic));
    }

    #[test]
    fn rejects_malformed_json() {
        let data = b"stat: not json\0";
        assert_eq!(parse_stat_datagram(data), Err(StatParseError::MalformedJson));
    }
}
