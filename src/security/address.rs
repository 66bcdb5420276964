//! Address classification for outbound targets.
//!
//! # Responsibilities
//! - Parse IPv4 dotted-quad and IPv6 literals into fixed-width byte arrays
//! - Decide whether an address is private, loopback, link-local, multicast
//!   or reserved
//!
//! # Design Decisions
//! - Parsers are pure and return an explicit error; callers that only need a
//!   verdict use [`is_private_literal`], which treats malformed input as private
//! - IPv4-mapped, IPv4-compatible, NAT64 and 6to4 IPv6 addresses are classified by
//!   their embedded IPv4 address
//! - Leading zeros in IPv4 octets are rejected (octal ambiguity)

use std::net::IpAddr;
use thiserror::Error;

/// A literal that is not a well-formed IPv4 or IPv6 address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed address literal '{literal}': {reason}")]
pub struct AddressParseError {
    pub literal: String,
    pub reason: &'static str,
}

impl AddressParseError {
    fn new(literal: &str, reason: &'static str) -> Self {
        Self {
            literal: literal.to_string(),
            reason,
        }
    }
}

/// Parse a dotted-quad IPv4 literal.
pub fn parse_ipv4(input: &str) -> Result<[u8; 4], AddressParseError> {
    let mut octets = [0u8; 4];
    let mut count = 0;

    for part in input.split('.') {
        if count == 4 {
            return Err(AddressParseError::new(input, "too many octets"));
        }
        if part.is_empty() || part.len() > 3 {
            return Err(AddressParseError::new(input, "bad octet length"));
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressParseError::new(input, "non-decimal octet"));
        }
        if part.len() > 1 && part.starts_with('0') {
            return Err(AddressParseError::new(input, "leading zero in octet"));
        }
        let value: u16 = part
            .parse()
            .map_err(|_| AddressParseError::new(input, "non-decimal octet"))?;
        if value > 255 {
            return Err(AddressParseError::new(input, "octet out of range"));
        }
        octets[count] = value as u8;
        count += 1;
    }

    if count != 4 {
        return Err(AddressParseError::new(input, "expected four octets"));
    }
    Ok(octets)
}

/// Parse an IPv6 literal, optionally wrapped in `[...]`.
///
/// Supports `::` compression and a trailing embedded dotted-quad
/// (`::ffff:192.0.2.1`). Zone identifiers are rejected.
pub fn parse_ipv6(input: &str) -> Result<[u8; 16], AddressParseError> {
    let literal = match input.strip_prefix('[') {
        Some(rest) => rest
            .strip_suffix(']')
            .ok_or_else(|| AddressParseError::new(input, "unbalanced brackets"))?,
        None => input,
    };

    if literal.is_empty() {
        return Err(AddressParseError::new(input, "empty literal"));
    }
    if literal.contains('%') {
        return Err(AddressParseError::new(input, "zone identifiers are not accepted"));
    }

    let (head, tail, compressed) = match literal.find("::") {
        Some(idx) => {
            let tail = &literal[idx + 2..];
            if tail.contains("::") {
                return Err(AddressParseError::new(input, "multiple '::'"));
            }
            (&literal[..idx], tail, true)
        }
        None => (literal, "", false),
    };

    // An embedded IPv4 tail may only appear in the final position.
    let head_groups = parse_groups(input, head, !compressed)?;
    let tail_groups = if compressed {
        parse_groups(input, tail, true)?
    } else {
        Vec::new()
    };

    let total = head_groups.len() + tail_groups.len();
    if compressed && total > 7 {
        return Err(AddressParseError::new(input, "'::' must stand for at least one group"));
    }
    if !compressed && total != 8 {
        return Err(AddressParseError::new(input, "expected eight groups"));
    }

    let mut groups = [0u16; 8];
    groups[..head_groups.len()].copy_from_slice(&head_groups);
    groups[8 - tail_groups.len()..].copy_from_slice(&tail_groups);

    let mut bytes = [0u8; 16];
    for (i, group) in groups.iter().enumerate() {
        let [hi, lo] = group.to_be_bytes();
        bytes[i * 2] = hi;
        bytes[i * 2 + 1] = lo;
    }
    Ok(bytes)
}

fn parse_groups(
    input: &str,
    section: &str,
    allow_ipv4_tail: bool,
) -> Result<Vec<u16>, AddressParseError> {
    if section.is_empty() {
        return Ok(Vec::new());
    }

    let pieces: Vec<&str> = section.split(':').collect();
    let mut groups = Vec::with_capacity(pieces.len() + 1);

    for (idx, piece) in pieces.iter().enumerate() {
        let last = idx + 1 == pieces.len();
        if piece.is_empty() {
            return Err(AddressParseError::new(input, "empty group"));
        }
        if piece.contains('.') {
            if !(last && allow_ipv4_tail) {
                return Err(AddressParseError::new(input, "misplaced IPv4 tail"));
            }
            let [a, b, c, d] = parse_ipv4(piece)
                .map_err(|_| AddressParseError::new(input, "bad embedded IPv4 tail"))?;
            groups.push(u16::from_be_bytes([a, b]));
            groups.push(u16::from_be_bytes([c, d]));
            continue;
        }
        if piece.len() > 4 || !piece.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressParseError::new(input, "bad hex group"));
        }
        let value = u16::from_str_radix(piece, 16)
            .map_err(|_| AddressParseError::new(input, "bad hex group"))?;
        groups.push(value);
    }

    if groups.len() > 8 {
        return Err(AddressParseError::new(input, "too many groups"));
    }
    Ok(groups)
}

/// Private/reserved verdict for an IPv4 address.
pub fn is_private_v4(octets: [u8; 4]) -> bool {
    let [a, b, _, _] = octets;
    a == 0                                  // 0.0.0.0/8
        || a == 10                          // 10.0.0.0/8
        || (a == 100 && (b & 0xC0) == 64)   // 100.64.0.0/10 (CGN)
        || a == 127                         // 127.0.0.0/8
        || (a == 169 && b == 254)           // 169.254.0.0/16
        || (a == 172 && (b & 0xF0) == 16)   // 172.16.0.0/12
        || (a == 192 && b == 168)           // 192.168.0.0/16
        || a >= 224                         // 224.0.0.0/4 multicast, 240.0.0.0/4 reserved
}

/// Private/reserved verdict for an IPv6 address.
pub fn is_private_v6(bytes: [u8; 16]) -> bool {
    let embedded = [bytes[12], bytes[13], bytes[14], bytes[15]];
    let upper_zero = bytes[..10].iter().all(|b| *b == 0);

    if bytes.iter().all(|b| *b == 0) {
        return true; // ::
    }
    if bytes[..15].iter().all(|b| *b == 0) && bytes[15] == 1 {
        return true; // ::1
    }
    if (bytes[0] & 0xFE) == 0xFC {
        return true; // fc00::/7
    }
    if bytes[0] == 0xFE && (bytes[1] & 0xC0) == 0x80 {
        return true; // fe80::/10
    }
    if upper_zero && bytes[10] == 0xFF && bytes[11] == 0xFF {
        return is_private_v4(embedded); // ::ffff:a.b.c.d
    }
    if upper_zero && bytes[10] == 0 && bytes[11] == 0 {
        return is_private_v4(embedded); // deprecated ::a.b.c.d
    }
    if bytes[..4] == [0x00, 0x64, 0xFF, 0x9B] && bytes[4..12].iter().all(|b| *b == 0) {
        return is_private_v4(embedded); // 64:ff9b::/96 NAT64
    }
    if bytes[0] == 0x20 && bytes[1] == 0x02 {
        return is_private_v4([bytes[2], bytes[3], bytes[4], bytes[5]]); // 2002::/16 6to4
    }
    false
}

/// Classify a literal, surfacing parse failures.
pub fn classify_literal(literal: &str) -> Result<bool, AddressParseError> {
    if literal.contains(':') || literal.starts_with('[') {
        return parse_ipv6(literal).map(is_private_v6);
    }
    parse_ipv4(literal).map(is_private_v4)
}

/// Fail-closed verdict for a literal: malformed input counts as private.
pub fn is_private_literal(literal: &str) -> bool {
    classify_literal(literal).unwrap_or(true)
}

/// Verdict for an already-parsed address (e.g. a DNS answer).
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4.octets()),
        IpAddr::V6(v6) => is_private_v6(v6.octets()),
    }
}
