//! The errors that can be emitted while driving a Salt Channel session.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

/// Errors that can occur while driving a handshake, the application-message
/// framer, or the A1/A2 discovery exchange.
///
/// Any variant other than [`SaltError::TransportFatal`] or
/// [`SaltError::SessionClosed`] being surfaced from a [`crate::session::Session`]
/// or [`crate::framer::Framer`] method poisons it on the spot: its signing
/// secret key and session key are overwritten with zeroes and every
/// subsequent call returns [`SaltError::SessionClosed`] without touching the
/// transport again. `TransportFatal` does not poison -- the transport may
/// still be usable even though this particular read or write failed, and
/// `SessionClosed` means the peer (or we) already finished cleanly, not that
/// anything went wrong. Either way, once a method returns one of the
/// poisoning variants the only cure is to start a new session.
///
/// Would-block is deliberately not a variant here: per the protocol's
/// non-blocking contract, "pending" is not an error, just a resumption
/// signal, and is represented instead by [`crate::io_pump::Progress::Pending`].
/// Modeling it as an `Err` would blur the distinction between "call me again"
/// and "this session is dead".
#[derive(Debug)]
pub enum SaltError {
    /// The underlying transport returned a fatal (non-WouldBlock) I/O error.
    TransportFatal(io::Error),
    /// A message violated the wire format: bad size, unknown type in this
    /// state, or a length field that disagrees with the outer frame size.
    ParseError(&'static str),
    /// A message was well-formed but arrived in the wrong state or carried
    /// an invalid flag combination for that state.
    ProtocolError(&'static str),
    /// AEAD decryption, signature verification, key generation, or DH failed.
    CryptoError,
    /// The host rejected a pinned peer key (M1 carried a peer-sig-key that
    /// did not match the host's signing public key).
    NoSuchServer,
    /// The peer has set the LastFlag; no further I/O is permitted on this
    /// session.
    SessionClosed,
    /// A decoded application message's timestamp regressed past the
    /// configured threshold.
    TimeViolation,
    /// An invalid configuration was supplied at session construction time,
    /// e.g. a working buffer smaller than the protocol minimum.
    ConfigError(&'static str),
}

impl Display for SaltError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            SaltError::TransportFatal(ref err) => write!(f, "salt channel: transport error: {}", err),
            SaltError::ParseError(reason) => write!(f, "salt channel: parse error: {}", reason),
            SaltError::ProtocolError(reason) => write!(f, "salt channel: protocol error: {}", reason),
            SaltError::CryptoError => write!(f, "salt channel: cryptographic verification failed"),
            SaltError::NoSuchServer => write!(f, "salt channel: host rejected pinned peer key"),
            SaltError::SessionClosed => write!(f, "salt channel: session closed by peer"),
            SaltError::TimeViolation => write!(f, "salt channel: timestamp regressed past threshold"),
            SaltError::ConfigError(reason) => write!(f, "salt channel: configuration error: {}", reason),
        }
    }
}

impl Error for SaltError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            SaltError::TransportFatal(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SaltError {
    fn from(err: io::Error) -> SaltError {
        SaltError::TransportFatal(err)
    }
}
