//! KISS/AX.25 link-layer engine for packet-radio terminals.
//!
//! This crate drives a connected-mode AX.25 link (and UI/datagram frames)
//! over a KISS TNC reachable via TCP (e.g. Direwolf). It owns the
//! handshake, sequencing, keepalive, and pager-prompt detection; it does
//! not own a terminal UI, command parser, or history/readline — those are
//! for the binary that embeds it.
//!
//! # Example
//!
//! ```ignore
//! use axlink::{AxEngine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> axlink::Result<()> {
//!     let mycall = "N0CALL".parse()?;
//!     let config = EngineConfig::new("127.0.0.1", 8001, mycall);
//!     let (engine, mut events) = AxEngine::connect(config).await?;
//!
//!     engine.call("W1AW".parse()?, vec![]).await?;
//!     engine.send_text("hello").await?;
//!     engine.close().await;
//!     Ok(())
//! }
//! ```

pub mod addr;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod kiss;
pub mod link;
pub mod pager;
pub mod timers;
pub mod transport;

pub use addr::Callsign;
pub use config::EngineConfig;
pub use engine::{AxEngine, EngineEvent, StatusSnapshot};
pub use error::{Error, Result};
pub use link::LinkEvent;
