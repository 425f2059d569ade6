//! The Salt Channel v2 wire codec (§4.1, component C2).
//!
//! Pure, allocation-free `encode_*`/`decode_*` functions. Every function
//! operates on a "frame body": the bytes after the 4-byte size prefix, i.e.
//! type(1) + flags(1) + payload, per §6's "internally, messages carry a
//! 1-byte type and 1-byte flags as the first two bytes of their body".
//!
//! Wire-format decision (recorded in full in `DESIGN.md`): §4.1 describes
//! App/MultiApp's flags as part of their "Cleartext" (i.e. pre-encryption)
//! payload, and §4.1 separately says "Type byte 6 indicates encrypted-
//! container wrapping App(5) or MultiApp(11)". This codec therefore always
//! puts `TYPE_ENCRYPTED` (6) at the *outer*, cleartext frame level for
//! application messages, and keeps the true inner type (5 or 11) together
//! with the LastFlag-bearing flags byte *inside* the AEAD plaintext -- only
//! readable after a successful decrypt. M1/M2/A1/A2 are unencrypted and use
//! their own type byte directly at the outer level, matching the rest of
//! §4.1 unambiguously.

use std::convert::TryFrom;

use crate::crypto::{
    AEAD_NONCEBYTES, AEAD_OVERHEAD, CryptoProvider, DH_PUBLICKEYBYTES, SIGNATUREBYTES,
    SIGN_PUBLICKEYBYTES,
};
use crate::error::SaltError;

/// Size of the frame's length prefix.
pub const SIZE_PREFIX_BYTES: usize = 4;
/// Size of the type+flags header present on every frame body.
pub const HEADER_BYTES: usize = 2;

/// M1: client hello.
pub const TYPE_M1: u8 = 1;
/// M2: host hello / reject.
pub const TYPE_M2: u8 = 2;
/// M3: host authentication (encrypted).
pub const TYPE_M3: u8 = 3;
/// M4: client authentication (encrypted).
pub const TYPE_M4: u8 = 4;
/// App: single application message, as revealed inside an encrypted container.
pub const TYPE_APP: u8 = 5;
/// The outer wire type for any encrypted application-message container
/// (wraps [`TYPE_APP`] or [`TYPE_MULTI_APP`]).
pub const TYPE_ENCRYPTED: u8 = 6;
/// A1: pre-handshake discovery query.
pub const TYPE_A1: u8 = 8;
/// A2: pre-handshake discovery response.
pub const TYPE_A2: u8 = 9;
/// MultiApp: batched application messages, as revealed inside an encrypted container.
pub const TYPE_MULTI_APP: u8 = 11;

/// The 10-byte Salt Channel v2 protocol identifier carried in M1.
pub const PROTOCOL_ID: &[u8; 10] = b"SCv2------";

/// M1 flag bit requesting host peer-key pinning.
pub const M1_FLAG_PIN_REQUESTED: u8 = 0b0000_0001;
/// M1 flag bit requesting (unsupported, ignored) ticket resume.
pub const M1_FLAG_TICKET_REQUESTED: u8 = 0b0001_0000;
/// M2 flag bit: host has no such server / rejected the pinned key.
pub const M2_FLAG_NO_SUCH_SERVER: u8 = 0b0000_0001;
/// M2 flag bit: resume-by-ticket is not supported.
pub const M2_FLAG_RESUME_NOT_SUPPORTED: u8 = 0b0001_0000;
/// The high bit of a flags byte: "no further messages from this side".
pub const LAST_FLAG: u8 = 0b1000_0000;

/// Signature label prepended to the handshake hash for host's Signature1.
pub const SIG1_LABEL: &[u8; 8] = b"SC-SIG01";
/// Signature label prepended to the handshake hash for client's Signature2.
pub const SIG2_LABEL: &[u8; 8] = b"SC-SIG02";

/// Default ceiling on the number of payloads accepted in a single MultiApp
/// frame (Design Note / Open Question (b): the original left this
/// unbounded; this crate bounds decode work by default).
pub const DEFAULT_MAX_MULTI_APP_COUNT: u16 = 127;
/// Maximum number of `(p1, p2)` pairs a single A2 response may list.
pub const MAX_A2_PAIRS: usize = 127;
/// Width of each protocol/profile string field inside an A2 pair.
pub const A2_FIELD_BYTES: usize = 10;

// ---------------------------------------------------------------------
// M1
// ---------------------------------------------------------------------

/// A decoded M1 message.
#[derive(Debug, Clone, Copy)]
pub struct M1<'a> {
    /// Client requested the host pin its peer (signing) key.
    pub pin_requested: bool,
    /// Client requested (unsupported) ticket resume; always ignored.
    pub ticket_requested: bool,
    /// Client's ephemeral DH public key.
    pub client_dh_pub: [u8; DH_PUBLICKEYBYTES],
    /// The host signing public key the client expects, if pinning was requested.
    pub peer_sig_key: Option<&'a [u8; SIGN_PUBLICKEYBYTES]>,
}

/// Encodes M1 into `buf`, returning the frame body length.
pub fn encode_m1(
    buf: &mut [u8],
    pin_requested: bool,
    ticket_requested: bool,
    client_dh_pub: &[u8; DH_PUBLICKEYBYTES],
    peer_sig_key: Option<&[u8; SIGN_PUBLICKEYBYTES]>,
) -> Result<usize, SaltError> {
    let len = HEADER_BYTES + PROTOCOL_ID.len() + DH_PUBLICKEYBYTES
        + if peer_sig_key.is_some() { SIGN_PUBLICKEYBYTES } else { 0 };
    if buf.len() < len {
        return Err(SaltError::ConfigError("buffer too small to encode M1"));
    }
    let mut flags = 0u8;
    if pin_requested {
        flags |= M1_FLAG_PIN_REQUESTED;
    }
    if ticket_requested {
        flags |= M1_FLAG_TICKET_REQUESTED;
    }
    buf[0] = TYPE_M1;
    buf[1] = flags;
    let mut off = HEADER_BYTES;
    buf[off..off + PROTOCOL_ID.len()].copy_from_slice(PROTOCOL_ID);
    off += PROTOCOL_ID.len();
    buf[off..off + DH_PUBLICKEYBYTES].copy_from_slice(client_dh_pub);
    off += DH_PUBLICKEYBYTES;
    if let Some(key) = peer_sig_key {
        buf[off..off + SIGN_PUBLICKEYBYTES].copy_from_slice(key);
        off += SIGN_PUBLICKEYBYTES;
    }
    Ok(off)
}

/// Decodes an M1 frame body.
pub fn decode_m1(buf: &[u8]) -> Result<M1, SaltError> {
    if buf.len() < HEADER_BYTES + PROTOCOL_ID.len() + DH_PUBLICKEYBYTES {
        return Err(SaltError::ParseError("M1 too short"));
    }
    if buf[0] != TYPE_M1 {
        return Err(SaltError::ParseError("expected M1 type"));
    }
    let flags = buf[1];
    let pin_requested = flags & M1_FLAG_PIN_REQUESTED != 0;
    let ticket_requested = flags & M1_FLAG_TICKET_REQUESTED != 0;
    let mut off = HEADER_BYTES;
    if &buf[off..off + PROTOCOL_ID.len()] != PROTOCOL_ID {
        return Err(SaltError::ParseError("unrecognized protocol id in M1"));
    }
    off += PROTOCOL_ID.len();
    let mut client_dh_pub = [0u8; DH_PUBLICKEYBYTES];
    client_dh_pub.copy_from_slice(&buf[off..off + DH_PUBLICKEYBYTES]);
    off += DH_PUBLICKEYBYTES;

    let peer_sig_key = if pin_requested {
        if buf.len() < off + SIGN_PUBLICKEYBYTES {
            return Err(SaltError::ParseError("M1 missing pinned peer key"));
        }
        let key: &[u8; SIGN_PUBLICKEYBYTES] = <&[u8; SIGN_PUBLICKEYBYTES]>::try_from(
            &buf[off..off + SIGN_PUBLICKEYBYTES],
        )
        .expect("slice length checked above");
        off += SIGN_PUBLICKEYBYTES;
        Some(key)
    } else {
        None
    };

    if off != buf.len() {
        return Err(SaltError::ParseError("M1 has trailing bytes"));
    }

    Ok(M1 { pin_requested, ticket_requested, client_dh_pub, peer_sig_key })
}

// ---------------------------------------------------------------------
// M2
// ---------------------------------------------------------------------

/// A decoded M2 message.
#[derive(Debug, Clone, Copy)]
pub struct M2 {
    /// Host has no such server / rejected the client's pinned key.
    pub no_such_server: bool,
    /// Host does not support ticket resume.
    pub resume_not_supported: bool,
    /// Host's ephemeral DH public key. Meaningless when `no_such_server`.
    pub host_dh_pub: [u8; DH_PUBLICKEYBYTES],
}

/// Encodes M2 into `buf`, returning the frame body length.
pub fn encode_m2(
    buf: &mut [u8],
    no_such_server: bool,
    resume_not_supported: bool,
    host_dh_pub: &[u8; DH_PUBLICKEYBYTES],
) -> Result<usize, SaltError> {
    let len = HEADER_BYTES + DH_PUBLICKEYBYTES;
    if buf.len() < len {
        return Err(SaltError::ConfigError("buffer too small to encode M2"));
    }
    let mut flags = 0u8;
    if no_such_server {
        flags |= M2_FLAG_NO_SUCH_SERVER;
    }
    if resume_not_supported {
        flags |= M2_FLAG_RESUME_NOT_SUPPORTED;
    }
    buf[0] = TYPE_M2;
    buf[1] = flags;
    buf[HEADER_BYTES..len].copy_from_slice(host_dh_pub);
    Ok(len)
}

/// Decodes an M2 frame body.
pub fn decode_m2(buf: &[u8]) -> Result<M2, SaltError> {
    let len = HEADER_BYTES + DH_PUBLICKEYBYTES;
    if buf.len() != len {
        return Err(SaltError::ParseError("M2 has the wrong length"));
    }
    if buf[0] != TYPE_M2 {
        return Err(SaltError::ParseError("expected M2 type"));
    }
    let flags = buf[1];
    let mut host_dh_pub = [0u8; DH_PUBLICKEYBYTES];
    host_dh_pub.copy_from_slice(&buf[HEADER_BYTES..len]);
    Ok(M2 {
        no_such_server: flags & M2_FLAG_NO_SUCH_SERVER != 0,
        resume_not_supported: flags & M2_FLAG_RESUME_NOT_SUPPORTED != 0,
        host_dh_pub,
    })
}

// ---------------------------------------------------------------------
// M3 / M4 (encrypted signature messages)
// ---------------------------------------------------------------------

const SIG_MSG_PLAINTEXT_LEN: usize = SIGN_PUBLICKEYBYTES + SIGNATUREBYTES;

/// Encodes and AEAD-seals an M3 (`type` = [`TYPE_M3`]) or M4
/// (`type` = [`TYPE_M4`]) message in place.
///
/// `buf` must have room for `HEADER_BYTES + SIG_MSG_PLAINTEXT_LEN +
/// AEAD_OVERHEAD` bytes; returns the resulting frame body length.
fn encode_sig_message(
    buf: &mut [u8],
    msg_type: u8,
    crypto: &impl CryptoProvider,
    key: &[u8; 32],
    nonce_bytes: &[u8; AEAD_NONCEBYTES],
    signing_pub: &[u8; SIGN_PUBLICKEYBYTES],
    signature: &[u8; SIGNATUREBYTES],
) -> Result<usize, SaltError> {
    let needed = HEADER_BYTES + SIG_MSG_PLAINTEXT_LEN + AEAD_OVERHEAD;
    if buf.len() < needed {
        return Err(SaltError::ConfigError("buffer too small to encode M3/M4"));
    }
    buf[0] = msg_type;
    buf[1] = 0;
    let body = &mut buf[HEADER_BYTES..];
    body[..SIGN_PUBLICKEYBYTES].copy_from_slice(signing_pub);
    body[SIGN_PUBLICKEYBYTES..SIG_MSG_PLAINTEXT_LEN].copy_from_slice(signature);
    let ct_len = crypto.aead_encrypt(body, SIG_MSG_PLAINTEXT_LEN, key, nonce_bytes)?;
    Ok(HEADER_BYTES + ct_len)
}

/// Decodes and AEAD-opens an M3/M4 message in place, returning the signing
/// public key and signature carried inside.
fn decode_sig_message(
    buf: &mut [u8],
    expected_type: u8,
    crypto: &impl CryptoProvider,
    key: &[u8; 32],
    nonce_bytes: &[u8; AEAD_NONCEBYTES],
) -> Result<([u8; SIGN_PUBLICKEYBYTES], [u8; SIGNATUREBYTES]), SaltError> {
    if buf.len() < HEADER_BYTES {
        return Err(SaltError::ParseError("M3/M4 too short"));
    }
    if buf[0] != expected_type {
        return Err(SaltError::ParseError("unexpected type for M3/M4"));
    }
    let ct_len = buf.len() - HEADER_BYTES;
    if ct_len != SIG_MSG_PLAINTEXT_LEN + AEAD_OVERHEAD {
        return Err(SaltError::ParseError("M3/M4 ciphertext has the wrong length"));
    }
    let body = &mut buf[HEADER_BYTES..];
    let pt_len = crypto.aead_decrypt(body, ct_len, key, nonce_bytes)?;
    if pt_len != SIG_MSG_PLAINTEXT_LEN {
        return Err(SaltError::ParseError("M3/M4 plaintext has the wrong length"));
    }
    let mut signing_pub = [0u8; SIGN_PUBLICKEYBYTES];
    signing_pub.copy_from_slice(&body[..SIGN_PUBLICKEYBYTES]);
    let mut signature = [0u8; SIGNATUREBYTES];
    signature.copy_from_slice(&body[SIGN_PUBLICKEYBYTES..SIG_MSG_PLAINTEXT_LEN]);
    Ok((signing_pub, signature))
}

/// Encodes M3 in place. See [`encode_sig_message`].
pub fn encode_m3(
    buf: &mut [u8],
    crypto: &impl CryptoProvider,
    key: &[u8; 32],
    nonce_bytes: &[u8; AEAD_NONCEBYTES],
    host_sign_pub: &[u8; SIGN_PUBLICKEYBYTES],
    signature1: &[u8; SIGNATUREBYTES],
) -> Result<usize, SaltError> {
    encode_sig_message(buf, TYPE_M3, crypto, key, nonce_bytes, host_sign_pub, signature1)
}

/// Decodes M3 in place. See [`decode_sig_message`].
pub fn decode_m3(
    buf: &mut [u8],
    crypto: &impl CryptoProvider,
    key: &[u8; 32],
    nonce_bytes: &[u8; AEAD_NONCEBYTES],
) -> Result<([u8; SIGN_PUBLICKEYBYTES], [u8; SIGNATUREBYTES]), SaltError> {
    decode_sig_message(buf, TYPE_M3, crypto, key, nonce_bytes)
}

/// Encodes M4 in place. See [`encode_sig_message`].
pub fn encode_m4(
    buf: &mut [u8],
    crypto: &impl CryptoProvider,
    key: &[u8; 32],
    nonce_bytes: &[u8; AEAD_NONCEBYTES],
    client_sign_pub: &[u8; SIGN_PUBLICKEYBYTES],
    signature2: &[u8; SIGNATUREBYTES],
) -> Result<usize, SaltError> {
    encode_sig_message(buf, TYPE_M4, crypto, key, nonce_bytes, client_sign_pub, signature2)
}

/// Decodes M4 in place. See [`decode_sig_message`].
pub fn decode_m4(
    buf: &mut [u8],
    crypto: &impl CryptoProvider,
    key: &[u8; 32],
    nonce_bytes: &[u8; AEAD_NONCEBYTES],
) -> Result<([u8; SIGN_PUBLICKEYBYTES], [u8; SIGNATUREBYTES]), SaltError> {
    decode_sig_message(buf, TYPE_M4, crypto, key, nonce_bytes)
}

// ---------------------------------------------------------------------
// App / MultiApp inner plaintext (wrapped by the framer's encryption)
// ---------------------------------------------------------------------

/// Encodes a single App message's inner plaintext: `type(App) || flags ||
/// timestamp(4) || payload`. Returns the plaintext length written.
pub fn encode_app_inner(buf: &mut [u8], last: bool, timestamp_ms: u32, payload: &[u8]) -> Result<usize, SaltError> {
    let len = HEADER_BYTES + 4 + payload.len();
    if buf.len() < len {
        return Err(SaltError::ConfigError("buffer too small to encode App"));
    }
    buf[0] = TYPE_APP;
    buf[1] = if last { LAST_FLAG } else { 0 };
    buf[HEADER_BYTES..HEADER_BYTES + 4].copy_from_slice(&timestamp_ms.to_le_bytes());
    buf[HEADER_BYTES + 4..len].copy_from_slice(payload);
    Ok(len)
}

/// A decoded App message.
#[derive(Debug, Clone, Copy)]
pub struct DecodedApp<'a> {
    /// The sender set LastFlag: no further messages will follow.
    pub last: bool,
    /// Milliseconds since the sender's t0, or 0 if it has no clock.
    pub timestamp_ms: u32,
    /// The application payload.
    pub payload: &'a [u8],
}

/// Decodes a single App message's inner plaintext.
pub fn decode_app_inner(buf: &[u8]) -> Result<DecodedApp, SaltError> {
    if buf.len() < HEADER_BYTES + 4 {
        return Err(SaltError::ParseError("App too short"));
    }
    if buf[0] != TYPE_APP {
        return Err(SaltError::ParseError("expected App type"));
    }
    let last = buf[1] & LAST_FLAG != 0;
    let mut ts_bytes = [0u8; 4];
    ts_bytes.copy_from_slice(&buf[HEADER_BYTES..HEADER_BYTES + 4]);
    let timestamp_ms = u32::from_le_bytes(ts_bytes);
    Ok(DecodedApp { last, timestamp_ms, payload: &buf[HEADER_BYTES + 4..] })
}

/// Encodes a MultiApp message's inner plaintext: `type(MultiApp) || flags ||
/// timestamp(4) || count(2) || (length(2) || payload) x count`.
pub fn encode_multi_app_inner(
    buf: &mut [u8],
    last: bool,
    timestamp_ms: u32,
    payloads: &[&[u8]],
) -> Result<usize, SaltError> {
    if payloads.len() > u16::MAX as usize {
        return Err(SaltError::ConfigError("too many MultiApp payloads"));
    }
    let mut needed = HEADER_BYTES + 4 + 2;
    for p in payloads {
        needed += 2 + p.len();
    }
    if buf.len() < needed {
        return Err(SaltError::ConfigError("buffer too small to encode MultiApp"));
    }
    buf[0] = TYPE_MULTI_APP;
    buf[1] = if last { LAST_FLAG } else { 0 };
    let mut off = HEADER_BYTES;
    buf[off..off + 4].copy_from_slice(&timestamp_ms.to_le_bytes());
    off += 4;
    buf[off..off + 2].copy_from_slice(&(payloads.len() as u16).to_le_bytes());
    off += 2;
    for p in payloads {
        buf[off..off + 2].copy_from_slice(&(p.len() as u16).to_le_bytes());
        off += 2;
        buf[off..off + p.len()].copy_from_slice(p);
        off += p.len();
    }
    Ok(off)
}

/// A cursor over the payloads contained in a decoded MultiApp message.
/// Yields each payload slice in order without allocating.
#[derive(Debug, Clone, Copy)]
pub struct MultiAppCursor<'a> {
    /// The sender set LastFlag: no further messages will follow.
    pub last: bool,
    /// Milliseconds since the sender's t0, or 0 if it has no clock.
    pub timestamp_ms: u32,
    remaining: &'a [u8],
    remaining_count: u16,
}

impl<'a> Iterator for MultiAppCursor<'a> {
    type Item = Result<&'a [u8], SaltError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_count == 0 {
            return None;
        }
        if self.remaining.len() < 2 {
            self.remaining_count = 0;
            return Some(Err(SaltError::ParseError("MultiApp entry missing length prefix")));
        }
        let len = u16::from_le_bytes([self.remaining[0], self.remaining[1]]) as usize;
        let rest = &self.remaining[2..];
        if rest.len() < len {
            self.remaining_count = 0;
            return Some(Err(SaltError::ParseError("MultiApp entry longer than remaining bytes")));
        }
        let (payload, rest) = rest.split_at(len);
        self.remaining = rest;
        self.remaining_count -= 1;
        Some(Ok(payload))
    }
}

/// Decodes a MultiApp message's inner plaintext into a lazy cursor. Rejects
/// more than `max_count` entries, per Design Note / Open Question (b).
pub fn decode_multi_app_inner(buf: &[u8], max_count: u16) -> Result<MultiAppCursor, SaltError> {
    if buf.len() < HEADER_BYTES + 4 + 2 {
        return Err(SaltError::ParseError("MultiApp too short"));
    }
    if buf[0] != TYPE_MULTI_APP {
        return Err(SaltError::ParseError("expected MultiApp type"));
    }
    let last = buf[1] & LAST_FLAG != 0;
    let mut ts_bytes = [0u8; 4];
    ts_bytes.copy_from_slice(&buf[HEADER_BYTES..HEADER_BYTES + 4]);
    let timestamp_ms = u32::from_le_bytes(ts_bytes);
    let count = u16::from_le_bytes([buf[HEADER_BYTES + 4], buf[HEADER_BYTES + 5]]);
    if count > max_count {
        return Err(SaltError::ParseError("MultiApp entry count exceeds configured ceiling"));
    }
    Ok(MultiAppCursor {
        last,
        timestamp_ms,
        remaining: &buf[HEADER_BYTES + 6..],
        remaining_count: count,
    })
}

// ---------------------------------------------------------------------
// A1 / A2
// ---------------------------------------------------------------------

/// A decoded A1 query.
#[derive(Debug, Clone, Copy)]
pub struct A1<'a> {
    /// Caller-defined address-type tag.
    pub address_type: u8,
    /// The queried address.
    pub address: &'a [u8],
}

/// Encodes an A1 query.
pub fn encode_a1(buf: &mut [u8], address_type: u8, address: &[u8]) -> Result<usize, SaltError> {
    if address.len() > u16::MAX as usize {
        return Err(SaltError::ConfigError("A1 address too long"));
    }
    let len = HEADER_BYTES + 1 + 2 + address.len();
    if buf.len() < len {
        return Err(SaltError::ConfigError("buffer too small to encode A1"));
    }
    buf[0] = TYPE_A1;
    buf[1] = 0;
    buf[HEADER_BYTES] = address_type;
    buf[HEADER_BYTES + 1..HEADER_BYTES + 3].copy_from_slice(&(address.len() as u16).to_le_bytes());
    buf[HEADER_BYTES + 3..len].copy_from_slice(address);
    Ok(len)
}

/// Decodes an A1 query.
pub fn decode_a1(buf: &[u8]) -> Result<A1, SaltError> {
    if buf.len() < HEADER_BYTES + 3 {
        return Err(SaltError::ParseError("A1 too short"));
    }
    if buf[0] != TYPE_A1 {
        return Err(SaltError::ParseError("expected A1 type"));
    }
    let address_type = buf[HEADER_BYTES];
    let size = u16::from_le_bytes([buf[HEADER_BYTES + 1], buf[HEADER_BYTES + 2]]) as usize;
    let address_start = HEADER_BYTES + 3;
    if buf.len() != address_start + size {
        return Err(SaltError::ParseError("A1 address size disagrees with frame length"));
    }
    Ok(A1 { address_type, address: &buf[address_start..] })
}

/// One `(protocol, profile)` pair advertised in an A2 response.
pub type A2Pair = ([u8; A2_FIELD_BYTES], [u8; A2_FIELD_BYTES]);

/// Encodes an A2 response listing up to [`MAX_A2_PAIRS`] pairs.
pub fn encode_a2(buf: &mut [u8], last: bool, pairs: &[A2Pair]) -> Result<usize, SaltError> {
    if pairs.len() > MAX_A2_PAIRS {
        return Err(SaltError::ConfigError("too many A2 pairs"));
    }
    let len = HEADER_BYTES + 1 + pairs.len() * (2 * A2_FIELD_BYTES);
    if buf.len() < len {
        return Err(SaltError::ConfigError("buffer too small to encode A2"));
    }
    buf[0] = TYPE_A2;
    buf[1] = if last { LAST_FLAG } else { 0 };
    buf[HEADER_BYTES] = pairs.len() as u8;
    let mut off = HEADER_BYTES + 1;
    for (p1, p2) in pairs {
        buf[off..off + A2_FIELD_BYTES].copy_from_slice(p1);
        off += A2_FIELD_BYTES;
        buf[off..off + A2_FIELD_BYTES].copy_from_slice(p2);
        off += A2_FIELD_BYTES;
    }
    Ok(off)
}

/// A cursor over the `(protocol, profile)` pairs in a decoded A2 response.
#[derive(Debug, Clone, Copy)]
pub struct A2<'a> {
    /// The host set LastFlag: the pre-handshake session must now close.
    pub last: bool,
    count: u8,
    pairs: &'a [u8],
}

impl<'a> A2<'a> {
    /// The number of `(protocol, profile)` pairs in this response.
    pub fn count(&self) -> usize {
        self.count as usize
    }

    /// Returns the pair at `index`, if present.
    pub fn pair(&self, index: usize) -> Option<A2Pair> {
        if index >= self.count as usize {
            return None;
        }
        let off = index * 2 * A2_FIELD_BYTES;
        let mut p1 = [0u8; A2_FIELD_BYTES];
        let mut p2 = [0u8; A2_FIELD_BYTES];
        p1.copy_from_slice(&self.pairs[off..off + A2_FIELD_BYTES]);
        p2.copy_from_slice(&self.pairs[off + A2_FIELD_BYTES..off + 2 * A2_FIELD_BYTES]);
        Some((p1, p2))
    }

    /// Iterates over all `(protocol, profile)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = A2Pair> + '_ {
        (0..self.count()).map(move |i| self.pair(i).expect("index within count"))
    }
}

/// Decodes an A2 response.
pub fn decode_a2(buf: &[u8]) -> Result<A2, SaltError> {
    if buf.len() < HEADER_BYTES + 1 {
        return Err(SaltError::ParseError("A2 too short"));
    }
    if buf[0] != TYPE_A2 {
        return Err(SaltError::ParseError("expected A2 type"));
    }
    let last = buf[1] & LAST_FLAG != 0;
    let count = buf[HEADER_BYTES];
    if count as usize > MAX_A2_PAIRS {
        return Err(SaltError::ParseError("A2 lists more pairs than permitted"));
    }
    let pairs_start = HEADER_BYTES + 1;
    let expected_len = pairs_start + count as usize * 2 * A2_FIELD_BYTES;
    if buf.len() != expected_len {
        return Err(SaltError::ParseError("A2 pair count disagrees with frame length"));
    }
    Ok(A2 { last, count, pairs: &buf[pairs_start..] })
}
