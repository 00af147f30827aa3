//! Errors internal to ICAP connection handling.
//!
//! Every variant here aborts the connection without a response body, per
//! spec.md §4.7's failure semantics. `server::handle_connection` still
//! attempts to write a best-effort status line for each of these before
//! closing the socket (see `server::best_effort_status`) — "no response
//! body" does not mean "no bytes at all".

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IcapError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("read timed out")]
    Timeout,
}
