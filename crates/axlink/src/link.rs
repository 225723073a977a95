//! The LAPB connected-mode state machine, plus UI/datagram handling.
//!
//! This module is deliberately synchronous and I/O-free: [`LinkContext`]
//! consumes parsed frames and user requests, and returns [`Effect`]s for the
//! engine to carry out (write bytes, emit an event). That keeps the entire
//! sequencing/handshake/pager logic unit-testable without a socket.

use crate::addr::Callsign;
use crate::error::{Error, Result};
use crate::frame::{
    self, FrameKind, ParsedFrame, SFrameKind, UFrameKind, build_i_frame, build_s_frame,
    build_u_frame, build_ui_frame,
};
use crate::pager::{self, TailWindow};

/// Which handshake frame is currently outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// AX.25 2.2 extended-mode probe, tried first.
    Sabme,
    /// AX.25 2.0 fallback, tried on every attempt after the first.
    Sabm,
}

/// Connection state. Each variant carries exactly the data that's only
/// meaningful in that state, so "peer is set" and "sequence numbers exist"
/// are compile-time facts rather than runtime invariants to uphold by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    AwaitUa {
        peer: Callsign,
        digis: Vec<Callsign>,
        attempt: u32,
        probe: ProbeKind,
        dm_fallback_tried: bool,
    },
    Connected {
        peer: Callsign,
        digis: Vec<Callsign>,
        vs: u8,
        vr: u8,
        appbuf: String,
    },
}

impl LinkState {
    pub fn label(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "DISCONNECTED",
            LinkState::AwaitUa { .. } => "AWAIT_UA",
            LinkState::Connected { .. } => "CONNECTED",
        }
    }

    pub fn peer(&self) -> Option<&Callsign> {
        match self {
            LinkState::Disconnected => None,
            LinkState::AwaitUa { peer, .. } => Some(peer),
            LinkState::Connected { peer, .. } => Some(peer),
        }
    }
}

/// Side effect of feeding a frame or request into the link: either bytes to
/// write to the transport, or an event to surface to the application.
#[derive(Debug, Clone)]
pub enum Effect {
    Send(Vec<u8>),
    Event(LinkEvent),
}

/// Events the link surfaces to whatever is driving it (a terminal UI, a test).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A generic status line (connect progress, disconnect notices, ...).
    Status(String),
    /// A decoded line of connected-mode traffic.
    Rx(String),
    /// A decoded UI frame, only surfaced while unproto/monitor mode is on.
    RxUi { src: String, dest: String, text: String },
    Connected { peer: String },
    Disconnected { reason: String },
    /// A pager ("--More--") prompt was detected in the incoming stream.
    PagerPrompt,
}

/// Outcome of a handshake retry tick.
pub enum RetryOutcome {
    /// Still waiting; probe frame(s) to send (may be empty if no longer
    /// relevant, e.g. the link already connected).
    Continue(Vec<Effect>),
    /// Retry budget exhausted with no response.
    Exhausted { peer: Callsign, attempts: u32 },
}

/// All mutable link state: the LAPB state machine, QoL toggles, the
/// handshake-deferred send queue, and pager-prompt tracking.
pub struct LinkContext {
    mycall: Callsign,
    state: LinkState,
    unproto_mode: bool,
    unproto_dest: Option<Callsign>,
    unproto_digis: Vec<Callsign>,
    local_echo: bool,
    crlf: bool,
    retries: u32,
    pending_after_connect: Vec<String>,
    tail: TailWindow,
    more_prompt_pending: bool,
}

impl LinkContext {
    pub fn new(mycall: Callsign) -> Self {
        Self {
            mycall,
            state: LinkState::Disconnected,
            unproto_mode: false,
            unproto_dest: None,
            unproto_digis: Vec::new(),
            local_echo: false,
            crlf: false,
            retries: 3,
            pending_after_connect: Vec::new(),
            tail: TailWindow::new(),
            more_prompt_pending: false,
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected { .. })
    }

    pub fn more_prompt_pending(&self) -> bool {
        self.more_prompt_pending
    }

    /// Toggle monitor-only unproto mode (receive UI frames) without setting
    /// a persistent send target. See [`Self::enter_unproto`] for the
    /// "send to DEST" persistent mode a terminal command drives.
    pub fn set_unproto_mode(&mut self, on: bool) {
        self.unproto_mode = on;
        if !on {
            self.unproto_dest = None;
            self.unproto_digis.clear();
        }
    }

    pub fn unproto_mode(&self) -> bool {
        self.unproto_mode
    }

    /// Enter persistent unproto mode: plain text lines are sent as UI
    /// frames to `dest` (via `digis`) until [`Self::exit_unproto`].
    pub fn enter_unproto(&mut self, dest: Callsign, digis: Vec<Callsign>) {
        self.unproto_mode = true;
        self.unproto_dest = Some(dest);
        self.unproto_digis = digis;
    }

    /// Exit persistent unproto mode, clearing the stored target.
    pub fn exit_unproto(&mut self) {
        self.set_unproto_mode(false);
    }

    /// The target of persistent unproto mode, if one was set via
    /// [`Self::enter_unproto`].
    pub fn unproto_target(&self) -> Option<(&Callsign, &[Callsign])> {
        self.unproto_dest.as_ref().map(|d| (d, self.unproto_digis.as_slice()))
    }

    pub fn set_local_echo(&mut self, on: bool) {
        self.local_echo = on;
    }

    pub fn local_echo(&self) -> bool {
        self.local_echo
    }

    pub fn set_crlf(&mut self, on: bool) {
        self.crlf = on;
    }

    pub fn crlf(&self) -> bool {
        self.crlf
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries.max(1);
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn newline(&self) -> &'static str {
        if self.crlf { "\r\n" } else { "\r" }
    }

    fn digis_label(digis: &[Callsign]) -> String {
        if digis.is_empty() {
            String::new()
        } else {
            let joined = digis.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",");
            format!(" via {joined}")
        }
    }

    /// Begin calling `peer`. Resets sequence state and fires the first probe
    /// (SABME); subsequent attempts are driven by [`Self::retry_tick`].
    pub fn start_call(&mut self, peer: Callsign, digis: Vec<Callsign>) -> Vec<Effect> {
        self.pending_after_connect.clear();
        let frame = build_u_frame(&peer, &self.mycall, &digis, true, frame::ctrl::SABME, true);
        let label = Self::digis_label(&digis);
        let status = format!(
            "[LINK] Calling {peer}{label} (attempt 1/{}, SABME) ...",
            self.retries
        );
        self.state = LinkState::AwaitUa {
            peer,
            digis,
            attempt: 1,
            probe: ProbeKind::Sabme,
            dm_fallback_tried: false,
        };
        vec![Effect::Send(frame), Effect::Event(LinkEvent::Status(status))]
    }

    /// Called each time a per-attempt retry timer elapses. Sends the next
    /// probe (always SABM after the first) or reports exhaustion.
    pub fn retry_tick(&mut self) -> RetryOutcome {
        let LinkState::AwaitUa { peer, digis, attempt, .. } = &self.state else {
            return RetryOutcome::Continue(Vec::new());
        };
        let (peer, digis, attempt) = (peer.clone(), digis.clone(), *attempt);

        if attempt >= self.retries {
            self.state = LinkState::Disconnected;
            return RetryOutcome::Exhausted { peer, attempts: attempt };
        }

        let next_attempt = attempt + 1;
        let frame = build_u_frame(&peer, &self.mycall, &digis, true, frame::ctrl::SABM, true);
        let label = Self::digis_label(&digis);
        let status = format!(
            "[LINK] Calling {peer}{label} (attempt {next_attempt}/{}, SABM) ...",
            self.retries
        );
        self.state = LinkState::AwaitUa {
            peer,
            digis,
            attempt: next_attempt,
            probe: ProbeKind::Sabm,
            dm_fallback_tried: false,
        };
        RetryOutcome::Continue(vec![Effect::Send(frame), Effect::Event(LinkEvent::Status(status))])
    }

    /// Disconnect, sending DISC if currently connected.
    pub fn disconnect(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let LinkState::Connected { peer, digis, .. } = &self.state {
            effects.push(Effect::Send(build_u_frame(
                peer,
                &self.mycall,
                digis,
                true,
                frame::ctrl::DISC,
                true,
            )));
        }
        self.state = LinkState::Disconnected;
        self.pending_after_connect.clear();
        self.more_prompt_pending = false;
        effects.push(Effect::Event(LinkEvent::Status("[LINK] Disconnected.".into())));
        effects
    }

    /// Queue a line of text to be sent once the handshake completes.
    pub fn queue_after_connect(&mut self, line: String) {
        self.pending_after_connect.push(line);
    }

    fn flush_pending(&mut self) -> Vec<Effect> {
        let lines = std::mem::take(&mut self.pending_after_connect);
        if lines.is_empty() {
            return Vec::new();
        }
        let mut effects = vec![Effect::Event(LinkEvent::Status(format!(
            "[SEND] Flushing {} queued line(s) after connect ...",
            lines.len()
        )))];
        for line in lines {
            effects.extend(self.send_text(&line).unwrap_or_default());
        }
        effects
    }

    /// Send a line of connected-mode text as an I-frame. Returns
    /// [`Error::NotConnected`] if there's no established link (callers
    /// wanting handshake-deferred queueing should use
    /// [`Self::queue_after_connect`] instead while `AWAIT_UA`).
    pub fn send_text(&mut self, line: &str) -> Result<Vec<Effect>> {
        let LinkState::Connected { peer, digis, vs, vr, .. } = &mut self.state else {
            return Err(Error::NotConnected);
        };
        let wire = format!("{line}{}", self.newline());
        let frame = build_i_frame(peer, &self.mycall, digis, *vs, *vr, false, wire.as_bytes());
        *vs = (*vs + 1) & 0x07;
        let mut effects = vec![Effect::Send(frame)];
        if self.local_echo {
            effects.push(Effect::Event(LinkEvent::Status(format!("> {line}"))));
        }
        Ok(effects)
    }

    /// Send a pager continue (bare carriage return) and clear the flag.
    pub fn pager_continue(&mut self) -> Result<Vec<Effect>> {
        self.more_prompt_pending = false;
        self.send_text("")
    }

    /// Send a pager abort ("A") and clear the flag.
    pub fn pager_abort(&mut self) -> Result<Vec<Effect>> {
        self.more_prompt_pending = false;
        self.send_text("A")
    }

    /// Send a UI (unproto) frame. Independent of connected-mode state.
    pub fn send_unproto(&mut self, dest: Callsign, digis: Vec<Callsign>, message: &str) -> Vec<Effect> {
        let frame = build_ui_frame(&dest, &self.mycall, &digis, message.as_bytes());
        let label = Self::digis_label(&digis);
        vec![
            Effect::Send(frame),
            Effect::Event(LinkEvent::Status(format!("[UNPROTO] {dest}{label} :: {message}"))),
        ]
    }

    fn check_pager_prompt(&mut self, line: &str) -> Option<Effect> {
        self.tail.push(line);
        if pager::detect(line, &self.tail) {
            self.more_prompt_pending = true;
            Some(Effect::Event(LinkEvent::PagerPrompt))
        } else {
            None
        }
    }

    /// Feed a freshly parsed AX.25 frame into the state machine.
    pub fn handle_frame(&mut self, parsed: &ParsedFrame) -> Vec<Effect> {
        match &parsed.kind {
            FrameKind::I { ns, nr: _, pf } => self.handle_i_frame(parsed, *ns, *pf),
            FrameKind::Ui => self.handle_ui_frame(parsed),
            FrameKind::U { kind, pf } => self.handle_u_frame(parsed, *kind, *pf),
            FrameKind::S { kind, nr, pf } => self.handle_s_frame(parsed, *kind, *nr, *pf),
        }
    }

    fn handle_i_frame(&mut self, parsed: &ParsedFrame, ns: u8, pf: bool) -> Vec<Effect> {
        let mut effects = Vec::new();

        // An I-frame banner can arrive before we see a UA; that's an implicit connect.
        if let LinkState::AwaitUa { peer, digis, .. } = &self.state {
            let (peer, digis) = (peer.clone(), digis.clone());
            effects.push(Effect::Event(LinkEvent::Connected { peer: peer.to_string() }));
            effects.push(Effect::Event(LinkEvent::Status(format!(
                "[LINK] CONNECTED to {peer} (implicit)"
            ))));
            self.state = LinkState::Connected { peer, digis, vs: 0, vr: 0, appbuf: String::new() };
        }

        let LinkState::Connected { peer, digis, vr, appbuf, .. } = &mut self.state else {
            return effects;
        };

        if ns != *vr {
            // Out of sequence: ACK current vr without advancing it.
            effects.push(Effect::Send(build_s_frame(
                peer,
                &self.mycall,
                digis,
                false,
                SFrameKind::Rr,
                *vr,
                false,
            )));
            return effects;
        }

        *vr = (*vr + 1) & 0x07;
        effects.push(Effect::Send(build_s_frame(
            peer,
            &self.mycall,
            digis,
            false,
            SFrameKind::Rr,
            *vr,
            pf,
        )));

        let text = String::from_utf8_lossy(&parsed.info).replace("\r\n", "\n").replace('\r', "\n");
        appbuf.push_str(&text);

        while let Some(idx) = self.state_appbuf().and_then(|b| b.find('\n')) {
            let line = {
                let LinkState::Connected { appbuf, .. } = &mut self.state else { unreachable!() };
                let line = appbuf[..idx].trim_end().to_string();
                *appbuf = appbuf[idx + 1..].to_string();
                line
            };
            effects.push(Effect::Event(LinkEvent::Rx(line.clone())));
            if let Some(e) = self.check_pager_prompt(&line) {
                effects.push(e);
            }
        }

        if pf {
            let remainder = self.state_appbuf().map(|b| b.trim_end().to_string());
            if let Some(peek) = remainder.filter(|s| !s.is_empty()) {
                effects.push(Effect::Event(LinkEvent::Rx(peek.clone())));
                if let Some(e) = self.check_pager_prompt(&peek) {
                    effects.push(e);
                }
                if let LinkState::Connected { appbuf, .. } = &mut self.state {
                    appbuf.clear();
                }
            }
        }

        effects
    }

    fn state_appbuf(&self) -> Option<&str> {
        match &self.state {
            LinkState::Connected { appbuf, .. } => Some(appbuf),
            _ => None,
        }
    }

    fn handle_ui_frame(&mut self, parsed: &ParsedFrame) -> Vec<Effect> {
        if !self.unproto_mode {
            return Vec::new();
        }
        let text = String::from_utf8_lossy(&parsed.info)
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .trim_end()
            .to_string();
        vec![Effect::Event(LinkEvent::RxUi {
            src: parsed.src.to_string(),
            dest: parsed.dest.to_string(),
            text,
        })]
    }

    fn handle_u_frame(&mut self, parsed: &ParsedFrame, kind: UFrameKind, pf: bool) -> Vec<Effect> {
        match kind {
            UFrameKind::Ua => self.handle_ua(),
            UFrameKind::Dm => self.handle_dm(),
            UFrameKind::Frmr => self.handle_frmr(),
            UFrameKind::Disc => self.handle_disc(parsed, pf),
            UFrameKind::Sabm | UFrameKind::Sabme => Vec::new(),
        }
    }

    fn handle_ua(&mut self) -> Vec<Effect> {
        let LinkState::AwaitUa { peer, digis, .. } = &self.state else {
            return Vec::new();
        };
        let (peer, digis) = (peer.clone(), digis.clone());
        self.state = LinkState::Connected { peer: peer.clone(), digis, vs: 0, vr: 0, appbuf: String::new() };
        let mut effects = vec![
            Effect::Event(LinkEvent::Connected { peer: peer.to_string() }),
            Effect::Event(LinkEvent::Status(format!("[LINK] CONNECTED to {peer}"))),
        ];
        effects.extend(self.flush_pending());
        effects
    }

    fn handle_dm(&mut self) -> Vec<Effect> {
        if let LinkState::AwaitUa { peer, dm_fallback_tried, digis, .. } = &mut self.state {
            if !*dm_fallback_tried {
                *dm_fallback_tried = true;
                let frame = build_u_frame(peer, &self.mycall, digis, true, frame::ctrl::SABM, true);
                return vec![
                    Effect::Send(frame),
                    Effect::Event(LinkEvent::Status(
                        "[LINK] Peer sent DM; retrying with SABM (v2.0)...".into(),
                    )),
                ];
            }
        }
        self.state = LinkState::Disconnected;
        vec![Effect::Event(LinkEvent::Disconnected { reason: "disconnected mode (DM) from peer".into() })]
    }

    fn handle_frmr(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::Event(LinkEvent::Status(
            "[LINK] FRMR (frame reject) from peer.".into(),
        ))];
        if let LinkState::AwaitUa { peer, digis, .. } = &self.state {
            effects.push(Effect::Send(build_u_frame(
                peer,
                &self.mycall,
                digis,
                true,
                frame::ctrl::SABM,
                true,
            )));
        }
        effects
    }

    fn handle_disc(&mut self, parsed: &ParsedFrame, pf: bool) -> Vec<Effect> {
        let LinkState::Connected { peer, digis, .. } = &self.state else {
            return Vec::new();
        };
        let _ = (parsed, pf);
        // Always reply UA with F=1, regardless of the DISC's P/F bit.
        let frame = build_u_frame(peer, &self.mycall, digis, false, frame::ctrl::UA, true);
        self.state = LinkState::Disconnected;
        self.pending_after_connect.clear();
        vec![
            Effect::Send(frame),
            Effect::Event(LinkEvent::Status("[LINK] Peer requested DISC - disconnected.".into())),
        ]
    }

    fn handle_s_frame(&mut self, parsed: &ParsedFrame, kind: SFrameKind, _nr: u8, pf: bool) -> Vec<Effect> {
        let LinkState::Connected { peer, digis, vr, .. } = &self.state else {
            return Vec::new();
        };
        let _ = kind;
        if pf && parsed.command {
            vec![Effect::Send(build_s_frame(
                peer,
                &self.mycall,
                digis,
                false,
                SFrameKind::Rr,
                *vr,
                true,
            ))]
        } else {
            Vec::new()
        }
    }

    /// Build the periodic keepalive poll (RR command, P=1), or `None` if
    /// there's no active connection or a pager prompt is pending (matching
    /// the source's choice not to interrupt a paging session).
    pub fn keepalive_poll(&self) -> Option<Vec<u8>> {
        if self.more_prompt_pending {
            return None;
        }
        let LinkState::Connected { peer, digis, vr, .. } = &self.state else {
            return None;
        };
        Some(build_s_frame(peer, &self.mycall, digis, true, SFrameKind::Rr, *vr, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        s.parse().unwrap()
    }

    fn ctx() -> LinkContext {
        LinkContext::new(call("N0CALL"))
    }

    fn ua_from(peer: &Callsign, mycall: &Callsign) -> ParsedFrame {
        let raw = build_u_frame(mycall, peer, &[], false, frame::ctrl::UA, true);
        frame::parse_frame(&raw).unwrap()
    }

    #[test]
    fn handshake_reaches_connected_on_ua() {
        let mut link = ctx();
        let effects = link.start_call(call("W1AW"), vec![]);
        assert!(matches!(effects[0], Effect::Send(_)));
        assert!(link.state().label() == "AWAIT_UA");

        let ua = ua_from(&call("W1AW"), &call("N0CALL"));
        let effects = link.handle_frame(&ua);
        assert!(link.is_connected());
        assert!(effects.iter().any(|e| matches!(e, Effect::Event(LinkEvent::Connected { .. }))));
    }

    #[test]
    fn retry_tick_falls_back_to_sabm_then_exhausts() {
        let mut link = ctx();
        link.set_retries(2);
        link.start_call(call("W1AW"), vec![]);
        match link.retry_tick() {
            RetryOutcome::Continue(effects) => {
                assert!(effects.iter().any(|e| matches!(e, Effect::Send(_))));
            }
            RetryOutcome::Exhausted { .. } => panic!("should still be retrying"),
        }
        match link.retry_tick() {
            RetryOutcome::Exhausted { attempts, .. } => assert_eq!(attempts, 2),
            RetryOutcome::Continue(_) => panic!("should be exhausted"),
        }
        assert_eq!(link.state().label(), "DISCONNECTED");
    }

    #[test]
    fn dm_during_handshake_falls_back_once_then_disconnects() {
        let mut link = ctx();
        link.start_call(call("W1AW"), vec![]);
        let dm_raw = build_u_frame(&call("N0CALL"), &call("W1AW"), &[], false, frame::ctrl::DM, true);
        let dm = frame::parse_frame(&dm_raw).unwrap();

        let effects = link.handle_frame(&dm);
        assert!(effects.iter().any(|e| matches!(e, Effect::Send(_))));
        assert_eq!(link.state().label(), "AWAIT_UA");

        let effects = link.handle_frame(&dm);
        assert!(effects.iter().any(|e| matches!(e, Effect::Event(LinkEvent::Disconnected { .. }))));
        assert_eq!(link.state().label(), "DISCONNECTED");
    }

    #[test]
    fn connected_text_queues_until_ua_then_flushes() {
        let mut link = ctx();
        link.start_call(call("W1AW"), vec![]);
        assert!(link.send_text("hello").is_err());
        link.queue_after_connect("hello".into());

        let ua = ua_from(&call("W1AW"), &call("N0CALL"));
        let effects = link.handle_frame(&ua);
        let sends = effects.iter().filter(|e| matches!(e, Effect::Send(_))).count();
        assert!(sends >= 1, "expected the queued line to be flushed as an I-frame");
    }

    #[test]
    fn pager_prompt_sets_flag_and_continue_clears_it() {
        let mut link = ctx();
        link.start_call(call("W1AW"), vec![]);
        let ua = ua_from(&call("W1AW"), &call("N0CALL"));
        link.handle_frame(&ua);

        let i_raw = build_i_frame(&call("N0CALL"), &call("W1AW"), &[], 0, 0, true, b"--More--\r");
        let i_frame = frame::parse_frame(&i_raw).unwrap();
        let effects = link.handle_frame(&i_frame);
        assert!(effects.iter().any(|e| matches!(e, Effect::Event(LinkEvent::PagerPrompt))));
        assert!(link.more_prompt_pending());

        link.pager_continue().unwrap();
        assert!(!link.more_prompt_pending());
    }

    #[test]
    fn out_of_sequence_i_frame_does_not_advance_vr() {
        let mut link = ctx();
        link.start_call(call("W1AW"), vec![]);
        let ua = ua_from(&call("W1AW"), &call("N0CALL"));
        link.handle_frame(&ua);

        let i_raw = build_i_frame(&call("N0CALL"), &call("W1AW"), &[], 5, 0, false, b"oops\r");
        let i_frame = frame::parse_frame(&i_raw).unwrap();
        link.handle_frame(&i_frame);
        match link.state() {
            LinkState::Connected { vr, .. } => assert_eq!(*vr, 0),
            other => panic!("expected connected state, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_sends_disc_when_connected() {
        let mut link = ctx();
        link.start_call(call("W1AW"), vec![]);
        let ua = ua_from(&call("W1AW"), &call("N0CALL"));
        link.handle_frame(&ua);

        let effects = link.disconnect();
        assert!(effects.iter().any(|e| matches!(e, Effect::Send(_))));
        assert_eq!(link.state().label(), "DISCONNECTED");
    }
}
