//! AX.25 frame composition and parsing (modulo-8 LAPB + UI).

use winnow::Parser;
use winnow::binary::u8 as take_u8;
use winnow::error::ContextError;
use winnow::token::rest;

use crate::addr::{Callsign, build_address_field, parse_address_field};
use crate::error::{Error, Result};

/// Control-octet constants, mirrored exactly from the wire protocol.
pub mod ctrl {
    pub const SABM: u8 = 0x2F;
    pub const SABME: u8 = 0x6F;
    pub const UA: u8 = 0x63;
    pub const DISC: u8 = 0x43;
    pub const DM: u8 = 0x0F;
    pub const FRMR: u8 = 0x87;
    pub const UI: u8 = 0x03;

    pub const S_RR: u8 = 0x01;
    pub const S_RNR: u8 = 0x05;
    pub const S_REJ: u8 = 0x09;

    /// Poll/Final bit, shared by U- and S-frames (and by I-frames).
    pub const PF: u8 = 0x10;
}

/// PID value for "no layer 3" text, the only PID this engine emits.
pub const PID_NO_L3: u8 = 0xF0;

/// The three AX.25 supervisory frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SFrameKind {
    Rr,
    Rnr,
    Rej,
}

/// The U-frame types this engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UFrameKind {
    Sabm,
    Sabme,
    Ua,
    Disc,
    Dm,
    Frmr,
}

/// The decoded kind and control-field contents of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    I { ns: u8, nr: u8, pf: bool },
    S { kind: SFrameKind, nr: u8, pf: bool },
    U { kind: UFrameKind, pf: bool },
    Ui,
}

/// A fully parsed AX.25 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub dest: Callsign,
    pub src: Callsign,
    pub digis: Vec<Callsign>,
    pub kind: FrameKind,
    /// PID byte, present for I-frames and UI-frames.
    pub pid: Option<u8>,
    /// Info field, present for I-frames and UI-frames.
    pub info: Vec<u8>,
    /// Whether the frame was sent with command orientation (destination
    /// SSID byte's C-bit set).
    pub command: bool,
}

/// Build a U-frame (SABM/SABME/DISC/DM/FRMR/UA) with no info field.
pub fn build_u_frame(
    dest: &Callsign,
    src: &Callsign,
    digis: &[Callsign],
    command: bool,
    control: u8,
    pf: bool,
) -> Vec<u8> {
    let mut out = build_address_field(dest, src, digis, command);
    out.push(control | if pf { ctrl::PF } else { 0 });
    out
}

/// Build an S-frame (RR/RNR/REJ).
pub fn build_s_frame(
    dest: &Callsign,
    src: &Callsign,
    digis: &[Callsign],
    command: bool,
    kind: SFrameKind,
    nr: u8,
    pf: bool,
) -> Vec<u8> {
    let base = match kind {
        SFrameKind::Rr => ctrl::S_RR,
        SFrameKind::Rnr => ctrl::S_RNR,
        SFrameKind::Rej => ctrl::S_REJ,
    };
    let control = base | ((nr & 0x07) << 5) | if pf { ctrl::PF } else { 0 };
    let mut out = build_address_field(dest, src, digis, command);
    out.push(control);
    out
}

/// Build an I-frame carrying `info` under PID 0xF0.
pub fn build_i_frame(
    dest: &Callsign,
    src: &Callsign,
    digis: &[Callsign],
    ns: u8,
    nr: u8,
    pf: bool,
    info: &[u8],
) -> Vec<u8> {
    let control = ((ns & 0x07) << 1) | ((nr & 0x07) << 5) | if pf { ctrl::PF } else { 0 };
    let mut out = build_address_field(dest, src, digis, true);
    out.push(control);
    out.push(PID_NO_L3);
    out.extend_from_slice(info);
    out
}

/// Build a UI frame. The destination C-bit is always set (command
/// orientation), as the source always originates UI frames.
pub fn build_ui_frame(
    dest: &Callsign,
    src: &Callsign,
    digis: &[Callsign],
    info: &[u8],
) -> Vec<u8> {
    let mut out = build_address_field(dest, src, digis, true);
    out.push(ctrl::UI);
    out.push(PID_NO_L3);
    out.extend_from_slice(info);
    out
}

/// Parse a raw (already KISS-unescaped) AX.25 frame.
pub fn parse_frame(raw: &[u8]) -> Result<ParsedFrame> {
    let field = parse_address_field(raw)?;
    let rest_bytes = &raw[field.end_offset..];
    let mut input = rest_bytes;
    let control: u8 = take_u8::<_, ContextError>
        .parse_next(&mut input)
        .map_err(|_| Error::ShortFrame("missing control octet".into()))?;

    let command = crate::addr::decode_command_bit(&raw[0..7]);

    if control & 0x01 == 0 {
        // I-frame: PID then info.
        let pid: u8 = take_u8::<_, ContextError>
            .parse_next(&mut input)
            .map_err(|_| Error::ShortFrame("I-frame missing PID".into()))?;
        let info: &[u8] = rest::<_, ContextError>
            .parse_next(&mut input)
            .unwrap_or(&[]);
        return Ok(ParsedFrame {
            dest: field.dest,
            src: field.src,
            digis: field.digis,
            kind: FrameKind::I {
                ns: (control >> 1) & 0x07,
                nr: (control >> 5) & 0x07,
                pf: control & ctrl::PF != 0,
            },
            pid: Some(pid),
            info: info.to_vec(),
            command,
        });
    }

    if control & 0x03 == 0x01 {
        // S-frame.
        let base = control & 0x0F;
        let kind = match base {
            ctrl::S_RR => SFrameKind::Rr,
            ctrl::S_RNR => SFrameKind::Rnr,
            ctrl::S_REJ => SFrameKind::Rej,
            other => {
                return Err(Error::ShortFrame(format!("unknown S-frame type {other:#04x}")));
            }
        };
        return Ok(ParsedFrame {
            dest: field.dest,
            src: field.src,
            digis: field.digis,
            kind: FrameKind::S {
                kind,
                nr: (control >> 5) & 0x07,
                pf: control & ctrl::PF != 0,
            },
            pid: None,
            info: Vec::new(),
            command,
        });
    }

    // U-frame (or UI, which is also a U-frame type).
    let base = control & 0xEF; // clear P/F
    let pf = control & ctrl::PF != 0;
    if base == ctrl::UI {
        let pid: u8 = take_u8::<_, ContextError>
            .parse_next(&mut input)
            .map_err(|_| Error::ShortFrame("UI frame missing PID".into()))?;
        let info: &[u8] = rest::<_, ContextError>
            .parse_next(&mut input)
            .unwrap_or(&[]);
        return Ok(ParsedFrame {
            dest: field.dest,
            src: field.src,
            digis: field.digis,
            kind: FrameKind::Ui,
            pid: Some(pid),
            info: info.to_vec(),
            command,
        });
    }

    let kind = match base {
        ctrl::SABM => UFrameKind::Sabm,
        ctrl::SABME => UFrameKind::Sabme,
        ctrl::UA => UFrameKind::Ua,
        ctrl::DISC => UFrameKind::Disc,
        ctrl::DM => UFrameKind::Dm,
        ctrl::FRMR => UFrameKind::Frmr,
        other => return Err(Error::ShortFrame(format!("unknown U-frame type {other:#04x}"))),
    };
    Ok(ParsedFrame {
        dest: field.dest,
        src: field.src,
        digis: field.digis,
        kind: FrameKind::U { kind, pf },
        pid: None,
        info: Vec::new(),
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        s.parse().unwrap()
    }

    #[test]
    fn roundtrip_i_frame() {
        let dest = call("W1AW");
        let src = call("N0CALL");
        let raw = build_i_frame(&dest, &src, &[], 3, 5, true, b"hi\r");
        let parsed = parse_frame(&raw).unwrap();
        assert_eq!(parsed.dest, dest);
        assert_eq!(parsed.src, src);
        assert_eq!(parsed.pid, Some(PID_NO_L3));
        assert_eq!(parsed.info, b"hi\r");
        match parsed.kind {
            FrameKind::I { ns, nr, pf } => {
                assert_eq!(ns, 3);
                assert_eq!(nr, 5);
                assert!(pf);
            }
            other => panic!("expected I-frame, got {other:?}"),
        }
    }

    #[test]
    fn roundtrip_sabme_with_poll() {
        let dest = call("W1AW");
        let src = call("N0CALL");
        let raw = build_u_frame(&dest, &src, &[], true, ctrl::SABME, true);
        let parsed = parse_frame(&raw).unwrap();
        assert!(parsed.command);
        match parsed.kind {
            FrameKind::U { kind, pf } => {
                assert_eq!(kind, UFrameKind::Sabme);
                assert!(pf);
            }
            other => panic!("expected U-frame, got {other:?}"),
        }
    }

    #[test]
    fn roundtrip_rr_response() {
        let dest = call("W1AW");
        let src = call("N0CALL");
        let raw = build_s_frame(&dest, &src, &[], false, SFrameKind::Rr, 2, true);
        let parsed = parse_frame(&raw).unwrap();
        assert!(!parsed.command);
        match parsed.kind {
            FrameKind::S { kind, nr, pf } => {
                assert_eq!(kind, SFrameKind::Rr);
                assert_eq!(nr, 2);
                assert!(pf);
            }
            other => panic!("expected S-frame, got {other:?}"),
        }
    }

    #[test]
    fn roundtrip_ui_frame() {
        let dest = call("CQ");
        let src = call("K0XYZ");
        let raw = build_ui_frame(&dest, &src, &[], b"test");
        let parsed = parse_frame(&raw).unwrap();
        assert_eq!(parsed.kind, FrameKind::Ui);
        assert_eq!(parsed.info, b"test");
    }

    #[test]
    fn nr_wraps_mod_8() {
        let dest = call("W1AW");
        let src = call("N0CALL");
        let raw = build_s_frame(&dest, &src, &[], true, SFrameKind::Rr, 7, false);
        let parsed = parse_frame(&raw).unwrap();
        match parsed.kind {
            FrameKind::S { nr, .. } => assert_eq!(nr, 7),
            other => panic!("expected S-frame, got {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_is_rejected() {
        assert!(parse_frame(&[0u8; 5]).is_err());
    }
}
