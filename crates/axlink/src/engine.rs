//! The public engine API: connect, call, send, disconnect, and the event
//! stream a terminal (or test) drives against.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::sleep;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::addr::Callsign;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::frame::parse_frame;
use crate::link::{Effect, LinkContext, LinkEvent, LinkState, RetryOutcome};
use crate::timers::{HANDSHAKE_RETRY_WAIT, KEEPALIVE_INTERVAL, sleep_or_cancelled};
use crate::transport::{self, TransportWriter};

/// Events surfaced to whatever is driving the engine (a terminal UI, a test
/// harness). One-to-one with [`crate::link::LinkEvent`], plus the
/// transport-level notifications the link state machine can't see.
pub type EngineEvent = LinkEvent;

/// A point-in-time snapshot for a `/status`-style display.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: &'static str,
    pub peer: Option<String>,
    pub unproto_mode: bool,
    /// Persistent unproto send target, set via [`AxEngine::enter_unproto`].
    pub unproto_dest: Option<String>,
    pub local_echo: bool,
    pub crlf: bool,
    pub retries: u32,
    pub pager_pending: bool,
}

/// A running KISS/AX.25 link engine: owns the transport and the connected-
/// mode state machine, and drives a background read loop and keepalive
/// timer until [`AxEngine::close`] is called (or the engine is dropped).
pub struct AxEngine {
    writer: Arc<Mutex<TransportWriter>>,
    link: Arc<Mutex<LinkContext>>,
    cancel: CancellationToken,
    events_tx: UnboundedSender<EngineEvent>,
    notify: Arc<Notify>,
    config: EngineConfig,
}

impl AxEngine {
    /// Dial the configured KISS host and start the background read and
    /// keepalive loops. Returns the engine handle plus the event stream.
    pub async fn connect(config: EngineConfig) -> Result<(Self, UnboundedReceiverStream<EngineEvent>)> {
        let (reader, writer) = transport::connect(&config.host, config.port).await?;
        let writer = Arc::new(Mutex::new(writer));

        let mut link = LinkContext::new(config.mycall.clone());
        link.set_retries(config.retries);
        link.set_local_echo(config.local_echo);
        link.set_crlf(config.crlf);
        let link = Arc::new(Mutex::new(link));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let notify = Arc::new(Notify::new());

        spawn_read_loop(reader, Arc::clone(&writer), Arc::clone(&link), events_tx.clone(), cancel.clone(), Arc::clone(&notify));
        spawn_keepalive_loop(Arc::clone(&writer), Arc::clone(&link), cancel.clone());

        let engine = Self { writer, link, cancel, events_tx, notify, config };
        Ok((engine, UnboundedReceiverStream::new(events_rx)))
    }

    /// Originate a connection to `peer`, retrying the SABME/SABM handshake
    /// up to the configured retry count. Resolves once UA (or an implicit
    /// I-frame banner) arrives, or once the retry budget is exhausted.
    pub async fn call(&self, peer: Callsign, digis: Vec<Callsign>) -> Result<()> {
        let peer_label = peer.to_string();
        {
            let mut link = self.link.lock().await;
            let effects = link.start_call(peer, digis);
            drop(link);
            self.dispatch(effects).await;
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Closed);
            }
            let woke_early = tokio::select! {
                _ = self.notify.notified() => true,
                _ = sleep(HANDSHAKE_RETRY_WAIT) => false,
                _ = self.cancel.cancelled() => return Err(Error::Closed),
            };

            let mut link = self.link.lock().await;
            if link.is_connected() {
                return Ok(());
            }
            // A peer's second DM drives the link straight to `Disconnected`
            // without going through `retry_tick`'s exhaustion path (see
            // `LinkContext::handle_dm`) - catch that here or this loop never
            // terminates for a peer that actively refuses the connection.
            if matches!(link.state(), LinkState::Disconnected) {
                drop(link);
                return Err(Error::Refused { peer: peer_label });
            }
            if woke_early {
                continue;
            }
            match link.retry_tick() {
                RetryOutcome::Continue(effects) => {
                    drop(link);
                    self.dispatch(effects).await;
                }
                RetryOutcome::Exhausted { peer, attempts } => {
                    drop(link);
                    return Err(Error::HandshakeTimeout { peer: peer.to_string(), attempts });
                }
            }
        }
    }

    /// Tear down the current connection, sending DISC if connected.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        let effects = link.disconnect();
        drop(link);
        self.dispatch(effects).await;
    }

    /// Send a line of text. While handshaking or disconnected, it's queued
    /// to flush automatically once the link comes up.
    pub async fn send_text(&self, line: &str) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.is_connected() {
            let effects = link.send_text(line)?;
            drop(link);
            self.dispatch(effects).await;
        } else {
            let peer_label = link.state().peer().map(|p| p.to_string()).unwrap_or_else(|| "(pending)".into());
            link.queue_after_connect(line.to_string());
            drop(link);
            let _ = self.events_tx.send(LinkEvent::Status(format!(
                "[QUEUED] Will send after link to {peer_label} comes up."
            )));
        }
        Ok(())
    }

    /// Send a UI (unproto) frame, independent of connected-mode state.
    pub async fn send_unproto(&self, dest: Callsign, digis: Vec<Callsign>, message: &str) -> Result<()> {
        let mut link = self.link.lock().await;
        let effects = link.send_unproto(dest, digis, message);
        drop(link);
        self.dispatch(effects).await;
        Ok(())
    }

    /// Send `message` to persistent unproto mode's stored target (set via
    /// [`Self::enter_unproto`]). Returns [`Error::NotConnected`] if no
    /// persistent target is set.
    pub async fn send_unproto_persistent(&self, message: &str) -> Result<()> {
        let mut link = self.link.lock().await;
        let Some((dest, digis)) = link.unproto_target() else {
            drop(link);
            return Err(Error::NotConnected);
        };
        let (dest, digis) = (dest.clone(), digis.to_vec());
        let effects = link.send_unproto(dest, digis, message);
        drop(link);
        self.dispatch(effects).await;
        Ok(())
    }

    /// Reply to a pending pager prompt with a bare carriage return.
    pub async fn pager_continue(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        let effects = link.pager_continue()?;
        drop(link);
        self.dispatch(effects).await;
        Ok(())
    }

    /// Reply to a pending pager prompt with "A" (abort).
    pub async fn pager_abort(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        let effects = link.pager_abort()?;
        drop(link);
        self.dispatch(effects).await;
        Ok(())
    }

    pub async fn set_unproto_mode(&self, on: bool) {
        self.link.lock().await.set_unproto_mode(on);
    }

    /// Enter persistent unproto mode: plain text lines are sent as UI
    /// frames to `dest` until [`Self::exit_unproto`] (or `/upexit`) is called.
    pub async fn enter_unproto(&self, dest: Callsign, digis: Vec<Callsign>) {
        self.link.lock().await.enter_unproto(dest, digis);
    }

    /// Exit persistent unproto mode, clearing the stored target.
    pub async fn exit_unproto(&self) {
        self.link.lock().await.exit_unproto();
    }

    pub async fn set_local_echo(&self, on: bool) {
        self.link.lock().await.set_local_echo(on);
    }

    pub async fn set_crlf(&self, on: bool) {
        self.link.lock().await.set_crlf(on);
    }

    pub async fn set_retries(&self, retries: u32) {
        self.link.lock().await.set_retries(retries);
    }

    pub async fn status(&self) -> StatusSnapshot {
        let link = self.link.lock().await;
        StatusSnapshot {
            state: link.state().label(),
            peer: link.state().peer().map(|p| p.to_string()),
            unproto_mode: link.unproto_mode(),
            unproto_dest: link.unproto_target().map(|(d, _)| d.to_string()),
            local_echo: link.local_echo(),
            crlf: link.crlf(),
            retries: link.retries(),
            pager_pending: link.more_prompt_pending(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cancel the background loops and shut down the transport. The engine
    /// is unusable after this; build a new one to reconnect.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.writer.lock().await.close().await;
    }

    async fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(frame) => {
                    if let Err(e) = self.writer.lock().await.send_frame(&frame).await {
                        warn!(error = %e, "failed to send frame");
                    }
                }
                Effect::Event(event) => {
                    let _ = self.events_tx.send(event);
                }
            }
        }
    }
}

fn spawn_read_loop(
    mut reader: transport::TransportReader,
    writer: Arc<Mutex<TransportWriter>>,
    link: Arc<Mutex<LinkContext>>,
    events_tx: UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
    notify: Arc<Notify>,
) {
    tokio::spawn(async move {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let frames = tokio::select! {
                result = reader.poll_frames() => result,
                _ = cancel.cancelled() => break,
            };
            let frames = match frames {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(error = %e, "KISS transport lost");
                    let _ = events_tx.send(LinkEvent::Disconnected { reason: e.to_string() });
                    break;
                }
            };
            for raw in frames {
                let parsed = match parse_frame(&raw) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed AX.25 frame");
                        continue;
                    }
                };
                let mut link = link.lock().await;
                let effects = link.handle_frame(&parsed);
                drop(link);
                notify.notify_waiters();
                for effect in effects {
                    match effect {
                        Effect::Send(frame) => {
                            if let Err(e) = writer.lock().await.send_frame(&frame).await {
                                warn!(error = %e, "failed to send frame");
                            }
                        }
                        Effect::Event(event) => {
                            let _ = events_tx.send(event);
                        }
                    }
                }
            }
        }
        info!("read loop exiting");
    });
}

fn spawn_keepalive_loop(writer: Arc<Mutex<TransportWriter>>, link: Arc<Mutex<LinkContext>>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            if sleep_or_cancelled(KEEPALIVE_INTERVAL, &cancel).await {
                break;
            }
            if let Some(frame) = link.lock().await.keepalive_poll() {
                if let Err(e) = writer.lock().await.send_frame(&frame).await {
                    warn!(error = %e, "failed to send keepalive poll");
                }
            }
        }
    });
}
