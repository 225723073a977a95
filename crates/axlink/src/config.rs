//! Engine configuration. Supplied by the caller at startup; this engine
//! never persists configuration to disk.

use crate::addr::Callsign;

/// Configuration for one [`crate::engine::AxEngine`] instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// KISS TNC host (e.g. a Direwolf instance).
    pub host: String,
    /// KISS TNC TCP port (Direwolf's default is 8001).
    pub port: u16,
    /// This station's callsign.
    pub mycall: Callsign,
    /// Number of handshake attempts before giving up on a `call()`.
    pub retries: u32,
    /// Echo locally sent text back as a status line.
    pub local_echo: bool,
    /// Use CRLF instead of a bare CR as the connected-mode line terminator.
    pub crlf: bool,
}

impl EngineConfig {
    pub fn new(host: impl Into<String>, port: u16, mycall: Callsign) -> Self {
        Self {
            host: host.into(),
            port,
            mycall,
            retries: 3,
            local_echo: false,
            crlf: false,
        }
    }
}
