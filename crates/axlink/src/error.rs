//! Error types for the link engine.

use std::io;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the KISS/AX.25 link engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the underlying TCP transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The initial TCP connection to the KISS host could not be established.
    #[error("connecting to KISS host {host}:{port}: {source}")]
    Connect {
        /// The KISS host that was being dialed.
        host: String,
        /// The KISS port that was being dialed.
        port: u16,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The transport was lost (read error or EOF) after a successful connect.
    #[error("transport lost: {0}")]
    Lost(String),

    /// A handshake exhausted its retry budget without a UA.
    #[error("no response from {peer} after {attempts} attempt(s)")]
    HandshakeTimeout {
        /// The peer callsign that was being called.
        peer: String,
        /// The number of SABM(E) attempts made.
        attempts: u32,
    },

    /// The peer actively refused the connection (repeated DM) during handshake.
    #[error("{peer} refused the connection (disconnected mode)")]
    Refused {
        /// The peer callsign that was being called.
        peer: String,
    },

    /// An operation was attempted after the engine was closed.
    #[error("engine is closed")]
    Closed,

    /// A callsign string did not parse as a valid AX.25 address.
    #[error("invalid callsign {0:?}")]
    InvalidCallsign(String),

    /// A received byte buffer was too short to contain a valid address field.
    #[error("short frame: {0}")]
    ShortFrame(String),

    /// An operation that requires an established link was attempted while
    /// disconnected or mid-handshake.
    #[error("not connected")]
    NotConnected,
}
