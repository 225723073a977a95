//! AX.25 callsign and address-field encoding.
//!
//! An AX.25 address is 7 bytes: six shifted-ASCII callsign characters
//! (right-padded with shifted spaces) followed by an SSID byte carrying the
//! secondary station ID, the C/H bit, and the last-address marker.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const ADDR_LEN: usize = 7;

/// An amateur-radio callsign plus SSID, e.g. `W1AW-5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callsign {
    base: String,
    ssid: u8,
}

impl Callsign {
    /// Build a callsign from a base string and SSID, uppercasing the base.
    ///
    /// `base` must be 1-6 ASCII letters/digits and `ssid` must be 0-15.
    pub fn new(base: impl Into<String>, ssid: u8) -> Result<Self> {
        let base = base.into().to_uppercase();
        if base.is_empty() || base.len() > 6 || !base.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::InvalidCallsign(base));
        }
        if ssid > 15 {
            return Err(Error::InvalidCallsign(format!("{base}-{ssid}")));
        }
        Ok(Self { base, ssid })
    }

    /// The base callsign, without SSID, always uppercase.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The SSID, always in 0..=15.
    pub fn ssid(&self) -> u8 {
        self.ssid
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid == 0 {
            write!(f, "{}", self.base)
        } else {
            write!(f, "{}-{}", self.base, self.ssid)
        }
    }
}

impl FromStr for Callsign {
    type Err = Error;

    /// Parses `"CALL"` or `"CALL-SSID"`, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_uppercase();
        match s.split_once('-') {
            Some((base, ssid)) => {
                let ssid: u8 = ssid
                    .parse()
                    .map_err(|_| Error::InvalidCallsign(s.clone()))?;
                Self::new(base, ssid)
            }
            None => Self::new(s, 0),
        }
    }
}

/// Encode an AX.25 address field (one 7-byte address).
///
/// `is_command` sets the C-bit on a terminal address (destination or
/// source); `has_been_repeated` sets the H-bit on a digipeater address that
/// has already relayed the frame. Per AX.25, these share bit 7 of the SSID
/// byte, so only one of the two ever applies to a given address.
pub fn encode_address(
    call: &Callsign,
    is_last: bool,
    is_command: bool,
    has_been_repeated: bool,
) -> [u8; ADDR_LEN] {
    let mut out = [0u8; ADDR_LEN];
    let padded: Vec<u8> = call
        .base()
        .bytes()
        .chain(std::iter::repeat(b' '))
        .take(6)
        .collect();
    for (i, &ch) in padded.iter().enumerate() {
        out[i] = (ch << 1) & 0xFE;
    }
    let mut ssid_byte = 0x60 | ((call.ssid() & 0x0F) << 1);
    if is_command || has_been_repeated {
        ssid_byte |= 0x80;
    }
    if is_last {
        ssid_byte |= 0x01;
    }
    out[6] = ssid_byte;
    out
}

/// Decode a single 7-byte AX.25 address into `(Callsign, is_last)`.
pub fn decode_address(bytes: &[u8]) -> Result<(Callsign, bool)> {
    if bytes.len() < ADDR_LEN {
        return Err(Error::ShortFrame(format!(
            "address field needs {ADDR_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let base: String = bytes[..6]
        .iter()
        .map(|&b| ((b >> 1) & 0x7F) as char)
        .collect::<String>()
        .trim_end()
        .to_string();
    let ssid = (bytes[6] >> 1) & 0x0F;
    let is_last = bytes[6] & 0x01 != 0;
    let call = Callsign::new(base, ssid)?;
    Ok((call, is_last))
}

/// The C-bit (or H-bit, for a digipeater) of a decoded address.
pub fn decode_command_bit(bytes: &[u8]) -> bool {
    bytes.len() >= ADDR_LEN && (bytes[6] & 0x80) != 0
}

/// A parsed AX.25 address field: destination, source, and digipeater path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressField {
    pub dest: Callsign,
    pub src: Callsign,
    pub digis: Vec<Callsign>,
    /// Offset of the first byte after the address field.
    pub end_offset: usize,
}

/// Parse destination, source, and digipeater addresses from a raw frame.
///
/// Scans forward in 7-byte strides until an address with the last-address
/// bit set is consumed. Fails if fewer than 14 bytes remain or no
/// terminating address appears within the buffer.
pub fn parse_address_field(bytes: &[u8]) -> Result<AddressField> {
    if bytes.len() < 2 * ADDR_LEN {
        return Err(Error::ShortFrame(format!(
            "address field needs at least {} bytes, got {}",
            2 * ADDR_LEN,
            bytes.len()
        )));
    }
    let (dest, _) = decode_address(&bytes[0..ADDR_LEN])?;
    let (src, mut last) = decode_address(&bytes[ADDR_LEN..2 * ADDR_LEN])?;

    let mut offset = 2 * ADDR_LEN;
    let mut digis = Vec::new();
    while !last {
        if offset + ADDR_LEN > bytes.len() {
            return Err(Error::ShortFrame(
                "address field never terminated".to_string(),
            ));
        }
        let (digi, is_last) = decode_address(&bytes[offset..offset + ADDR_LEN])?;
        digis.push(digi);
        last = is_last;
        offset += ADDR_LEN;
    }

    Ok(AddressField {
        dest,
        src,
        digis,
        end_offset: offset,
    })
}

/// Build a full address field: destination, source, then digipeaters.
///
/// `cmd` is the frame's command orientation: when `true`, the destination's
/// C-bit is set and the source's is clear; when `false` (a response), the
/// reverse. None of the supplied digipeaters are marked as already-repeated
/// (this engine only originates digipeated frames, it does not forward).
pub fn build_address_field(
    dest: &Callsign,
    src: &Callsign,
    digis: &[Callsign],
    cmd: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(ADDR_LEN * (2 + digis.len()));
    out.extend(encode_address(dest, false, cmd, false));
    out.extend(encode_address(src, digis.is_empty(), !cmd, false));
    for (i, digi) in digis.iter().enumerate() {
        let is_last = i == digis.len() - 1;
        out.extend(encode_address(digi, is_last, false, false));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_address() {
        let call = Callsign::new("w1aw", 5).unwrap();
        let bytes = encode_address(&call, true, true, false);
        let (decoded, is_last) = decode_address(&bytes).unwrap();
        assert_eq!(decoded.base(), "W1AW");
        assert_eq!(decoded.ssid(), 5);
        assert!(is_last);
        assert!(decode_command_bit(&bytes));
    }

    #[test]
    fn short_base_pads_with_space() {
        let call = Callsign::new("n0cal", 0).unwrap();
        let bytes = encode_address(&call, false, false, false);
        // 'N','0','C','A','L' shifted, then a shifted space.
        assert_eq!(bytes[5], (b' ' << 1) & 0xFE);
    }

    #[test]
    fn callsign_parses_ssid_suffix() {
        let c: Callsign = "n0call-12".parse().unwrap();
        assert_eq!(c.base(), "N0CALL");
        assert_eq!(c.ssid(), 12);
        assert_eq!(c.to_string(), "N0CALL-12");
    }

    #[test]
    fn callsign_rejects_bad_ssid() {
        assert!(Callsign::new("W1AW", 16).is_err());
        assert!("W1AW-99".parse::<Callsign>().is_err());
    }

    #[test]
    fn parse_address_field_direct() {
        let dest = Callsign::new("N0CALL", 0).unwrap();
        let src = Callsign::new("W1AW", 0).unwrap();
        let field = build_address_field(&dest, &src, &[], true);
        let parsed = parse_address_field(&field).unwrap();
        assert_eq!(parsed.dest, dest);
        assert_eq!(parsed.src, src);
        assert!(parsed.digis.is_empty());
        assert_eq!(parsed.end_offset, 14);
    }

    #[test]
    fn parse_address_field_with_digis() {
        let dest = Callsign::new("CQ", 0).unwrap();
        let src = Callsign::new("N0CALL", 0).unwrap();
        let digis = vec![
            Callsign::new("WIDE1", 1).unwrap(),
            Callsign::new("WIDE2", 1).unwrap(),
        ];
        let field = build_address_field(&dest, &src, &digis, true);
        let parsed = parse_address_field(&field).unwrap();
        assert_eq!(parsed.digis, digis);
        assert_eq!(parsed.end_offset, 28);
    }

    #[test]
    fn parse_address_field_too_short_fails() {
        assert!(parse_address_field(&[0u8; 10]).is_err());
    }

    #[test]
    fn parse_address_field_unterminated_fails() {
        let dest = Callsign::new("N0CALL", 0).unwrap();
        let src = Callsign::new("W1AW", 0).unwrap();
        // Build with a digi but strip the trailing address so last-bit never appears.
        let digis = vec![Callsign::new("WIDE1", 1).unwrap()];
        let mut field = build_address_field(&dest, &src, &digis, true);
        field.truncate(14); // drop the digipeater bytes entirely
        // src wasn't marked last (digis non-empty), so this must fail.
        assert!(parse_address_field(&field).is_err());
    }
}
