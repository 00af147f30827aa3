//! ICAP connection accept loop and per-transaction state machine
//! (spec.md §4.7).
//!
//! `READ_REQUEST_LINE → READ_HEADERS → DISPATCH(method) →
//! { OPTIONS_RESPONSE | REQMOD_PIPELINE | RESPMOD_PIPELINE | 405 } →
//! CLOSE`. Keep-alive is advertised in `OPTIONS` but, per spec.md §4.7,
//! the simplest compliant implementation closes after each transaction —
//! this one does.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use super::message::{read_header_block, Preamble};
use super::{encapsulated, options, reqmod, respmod, IcapError, IcapResponse};
use crate::config::TokenFormat;
use crate::token_engine::TokenEngine;

/// Per-read deadline guarding against slow-loris connections (spec.md §5).
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every accepted ICAP connection.
pub struct IcapState {
    engine: Arc<TokenEngine>,
    token_format: TokenFormat,
}

impl IcapState {
    /// Build ICAP server state over a shared token engine.
    #[must_use]
    pub fn new(engine: Arc<TokenEngine>, token_format: TokenFormat) -> Self {
        Self { engine, token_format }
    }
}

/// Accept connections on `listener` until `shutdown` resolves, handling
/// each on its own task.
pub async fn serve(listener: TcpListener, state: Arc<IcapState>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &state).await {
                                debug!(peer = %peer, error = %e, "ICAP connection closed with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "ICAP accept failed"),
                }
            }
            _ = shutdown.changed() => {
                debug!("ICAP listener shutting down");
                return;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: &IcapState) -> Result<(), IcapError> {
    let mut reader = BufReader::new(stream);

    match run_transaction(&mut reader, state).await {
        Ok(response) => {
            reader
                .into_inner()
                .write_all(&response)
                .await
                .map_err(|e| IcapError::Io(e.to_string()))?;
            Ok(())
        }
        Err(e) => {
            // Best-effort status line per spec.md §4.7/§9: the connection
            // is still aborted (no response body, no further reads), but
            // a caching proxy waiting on this socket gets a status rather
            // than a silent close. Write failures here are swallowed —
            // the connection is already being torn down on error.
            let _ = reader.into_inner().write_all(best_effort_status(&e)).await;
            Err(e)
        }
    }
}

async fn run_transaction(reader: &mut BufReader<TcpStream>, state: &IcapState) -> Result<Vec<u8>, IcapError> {
    let header_bytes = tokio::time::timeout(READ_TIMEOUT, read_header_block(reader))
        .await
        .map_err(|_| IcapError::Timeout)??;
    let icap_headers = Preamble::parse(&header_bytes)?;

    let method = icap_headers.method().unwrap_or_default();
    let uri = icap_headers.uri().unwrap_or_default();

    let response = match method {
        "OPTIONS" => options::response(uri),
        "REQMOD" => dispatch_reqmod(&icap_headers, reader, state).await?,
        "RESPMOD" => dispatch_respmod(&icap_headers, reader, state).await?,
        other => {
            warn!(method = other, "ICAP method not allowed");
            b"ICAP/1.0 405 Method Not Allowed\r\n\r\n".to_vec()
        }
    };
    Ok(response)
}

/// Status line to attempt writing before closing a connection that
/// failed framing or timed out — never a full response, just enough for
/// the proxy on the other end to see something other than a dropped
/// socket.
fn best_effort_status(e: &IcapError) -> &'static [u8] {
    match e {
        IcapError::Timeout => b"ICAP/1.0 408 Request Timeout\r\n\r\n",
        IcapError::Framing(_) => b"ICAP/1.0 500 Server Error\r\n\r\n",
        IcapError::Io(_) => b"ICAP/1.0 500 Server Error\r\n\r\n",
    }
}

async fn dispatch_reqmod(
    icap_headers: &Preamble,
    reader: &mut BufReader<TcpStream>,
    state: &IcapState,
) -> Result<Vec<u8>, IcapError> {
    let encapsulated_value = icap_headers
        .header("Encapsulated")
        .ok_or_else(|| IcapError::Framing("REQMOD request missing Encapsulated header".to_string()))?;
    let sections = encapsulated::parse(encapsulated_value)?;

    let result = tokio::time::timeout(
        READ_TIMEOUT,
        reqmod::handle(&sections, reader, &state.engine, state.token_format),
    )
    .await
    .map_err(|_| IcapError::Timeout)?;

    match result {
        Ok(response) => Ok(response.to_bytes()),
        Err(e) => Err(e),
    }
}

async fn dispatch_respmod(
    icap_headers: &Preamble,
    reader: &mut BufReader<TcpStream>,
    state: &IcapState,
) -> Result<Vec<u8>, IcapError> {
    let encapsulated_value = icap_headers
        .header("Encapsulated")
        .ok_or_else(|| IcapError::Framing("RESPMOD request missing Encapsulated header".to_string()))?;
    let sections = encapsulated::parse(encapsulated_value)?;

    let result = tokio::time::timeout(
        READ_TIMEOUT,
        respmod::handle(&sections, reader, &state.engine, state.token_format),
    )
    .await
    .map_err(|_| IcapError::Timeout)?;

    match result {
        Ok(response) => Ok(response.to_bytes()),
        Err(e) => Err(e),
    }
}
