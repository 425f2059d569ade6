//! The application-message framer (§4.3, component C5): encrypts/decrypts
//! App and MultiApp payloads over an established session, enforcing
//! LastFlag and the optional monotonic-timestamp check.

use crate::crypto::{AEAD_OVERHEAD, CryptoProvider};
use crate::error::SaltError;
use crate::io_pump::{FrameReader, FrameWriter, Progress};
use crate::nonce::Nonce;
use crate::transport::Transport;
use crate::wire::{self, DecodedApp, MultiAppCursor};

/// A clock used to stamp outgoing messages and validate incoming ones.
/// Returns milliseconds elapsed since the session was established. A
/// clock is optional (§4.3 Open Question (a)): when absent, timestamps are
/// written as 0 and the monotonicity check is skipped entirely, matching
/// "value 0 disables the check".
pub trait Clock {
    /// Milliseconds elapsed since this side's session start.
    fn now_ms(&self) -> u32;
}

/// A [`Clock`] that always reports 0, disabling both timestamping and the
/// monotonicity check.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoClock;

impl Clock for NoClock {
    fn now_ms(&self) -> u32 {
        0
    }
}

/// Drives encrypted application-message I/O after a handshake has produced
/// a session key and the two directional [`Nonce`] counters.
pub struct Framer {
    reader: FrameReader,
    writer: FrameWriter,
    write_nonce: Nonce,
    read_nonce: Nonce,
    last_sent: bool,
    last_received: bool,
    last_seen_timestamp: u32,
    writer_started: bool,
    poisoned: bool,
}

impl Framer {
    /// Builds a framer from the handshake's negotiated nonces.
    pub fn new(max_body_len: usize, write_nonce: Nonce, read_nonce: Nonce) -> Framer {
        Framer {
            reader: FrameReader::new(max_body_len),
            writer: FrameWriter::new(),
            write_nonce,
            read_nonce,
            last_sent: false,
            last_received: false,
            last_seen_timestamp: 0,
            writer_started: false,
            poisoned: false,
        }
    }

    /// True once this side has sent a message with LastFlag set; no further
    /// sends are permitted.
    pub fn write_closed(&self) -> bool {
        self.last_sent
    }

    /// True once the peer has sent a message with LastFlag set; no further
    /// receives are permitted.
    pub fn read_closed(&self) -> bool {
        self.last_received
    }

    /// True once a fatal protocol/crypto error has poisoned this framer.
    /// Every public method below refuses to run once this is set -- there is
    /// no way to recover a framer's nonce/AEAD state after a failed decrypt
    /// or a malformed frame, so the only cure is a new handshake.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Records the outcome of a fallible operation, poisoning the framer
    /// unless the error is one of the two kinds that do not call the
    /// framer's own crypto/parsing state into question: `TransportFatal`
    /// (the transport failed, not the protocol engine) and `SessionClosed`
    /// (the peer closed gracefully, or we already know we're done).
    fn note_result<T>(&mut self, result: Result<T, SaltError>) -> Result<T, SaltError> {
        if let Err(ref e) = result {
            if !matches!(e, SaltError::TransportFatal(_) | SaltError::SessionClosed) {
                self.poisoned = true;
            }
        }
        result
    }

    /// Encrypts and sends a single App message. `buf` is scratch space the
    /// plaintext is built and sealed in, at least `payload.len() +
    /// AEAD_OVERHEAD + wire::HEADER_BYTES + 4` bytes.
    pub fn write_app<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        session_key: &[u8; 32],
        clock: &impl Clock,
        payload: &[u8],
        last: bool,
    ) -> Result<Progress<()>, SaltError> {
        if self.poisoned {
            return Err(SaltError::SessionClosed);
        }
        if self.last_sent {
            return Err(SaltError::SessionClosed);
        }
        let result = (|| {
            if !self.writer_started {
                buf[0] = wire::TYPE_ENCRYPTED;
                buf[1] = 0;
                let plaintext_len =
                    wire::encode_app_inner(&mut buf[wire::HEADER_BYTES..], last, clock.now_ms(), payload)?;
                let nonce_bytes = self.write_nonce.to_bytes();
                let ct_len = crypto.aead_encrypt(
                    &mut buf[wire::HEADER_BYTES..],
                    plaintext_len,
                    session_key,
                    &nonce_bytes,
                )?;
                self.writer.start(wire::HEADER_BYTES + ct_len);
                self.writer_started = true;
            }
            match self.writer.poll(stream, buf)? {
                Progress::Pending => Ok(Progress::Pending),
                Progress::Ready(()) => {
                    self.writer_started = false;
                    self.write_nonce.advance();
                    if last {
                        self.last_sent = true;
                    }
                    Ok(Progress::Ready(()))
                }
            }
        })();
        self.note_result(result)
    }

    /// Encrypts and sends a MultiApp batch. See [`Framer::write_app`].
    pub fn write_multi_app<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        session_key: &[u8; 32],
        clock: &impl Clock,
        payloads: &[&[u8]],
        last: bool,
    ) -> Result<Progress<()>, SaltError> {
        if self.poisoned {
            return Err(SaltError::SessionClosed);
        }
        if self.last_sent {
            return Err(SaltError::SessionClosed);
        }
        let result = (|| {
            if !self.writer_started {
                buf[0] = wire::TYPE_ENCRYPTED;
                buf[1] = 0;
                let plaintext_len = wire::encode_multi_app_inner(
                    &mut buf[wire::HEADER_BYTES..],
                    last,
                    clock.now_ms(),
                    payloads,
                )?;
                let nonce_bytes = self.write_nonce.to_bytes();
                let ct_len = crypto.aead_encrypt(
                    &mut buf[wire::HEADER_BYTES..],
                    plaintext_len,
                    session_key,
                    &nonce_bytes,
                )?;
                self.writer.start(wire::HEADER_BYTES + ct_len);
                self.writer_started = true;
            }
            match self.writer.poll(stream, buf)? {
                Progress::Pending => Ok(Progress::Pending),
                Progress::Ready(()) => {
                    self.writer_started = false;
                    self.write_nonce.advance();
                    if last {
                        self.last_sent = true;
                    }
                    Ok(Progress::Ready(()))
                }
            }
        })();
        self.note_result(result)
    }

    /// Receives and decrypts one frame, classifying it by its inner type.
    /// `max_regression_ms` bounds how far a timestamp may move backwards
    /// relative to the last one seen before [`SaltError::TimeViolation`] is
    /// raised; pass 0 together with a [`NoClock`] to disable the check
    /// entirely, per the Open Question resolution above.
    pub fn read<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        session_key: &[u8; 32],
        max_regression_ms: u32,
    ) -> Result<Progress<Received>, SaltError> {
        if self.poisoned {
            return Err(SaltError::SessionClosed);
        }
        if self.last_received {
            return Err(SaltError::SessionClosed);
        }
        let result = (|| {
            let n = match self.reader.poll(stream, buf)? {
                Progress::Pending => return Ok(Progress::Pending),
                Progress::Ready(n) => n,
            };
            if buf[0] != wire::TYPE_ENCRYPTED {
                return Err(SaltError::ProtocolError("expected an encrypted application container"));
            }
            let nonce_bytes = self.read_nonce.to_bytes();
            let ciphertext_len = n - wire::HEADER_BYTES;
            if ciphertext_len < AEAD_OVERHEAD {
                return Err(SaltError::ParseError("encrypted container shorter than AEAD overhead"));
            }
            let plaintext_len = crypto.aead_decrypt(
                &mut buf[wire::HEADER_BYTES..n],
                ciphertext_len,
                session_key,
                &nonce_bytes,
            )?;
            self.read_nonce.advance();
            let body = &buf[wire::HEADER_BYTES..wire::HEADER_BYTES + plaintext_len];

            let timestamp_ms = match body.first() {
                Some(&wire::TYPE_APP) => decode_app_inner_checked(body)?.timestamp_ms,
                Some(&wire::TYPE_MULTI_APP) => {
                    wire::decode_multi_app_inner(body, wire::DEFAULT_MAX_MULTI_APP_COUNT)?.timestamp_ms
                }
                _ => return Err(SaltError::ProtocolError("unrecognized inner message type")),
            };
            if max_regression_ms > 0
                && timestamp_ms > 0
                && self.last_seen_timestamp > 0
                && timestamp_ms + max_regression_ms < self.last_seen_timestamp
            {
                return Err(SaltError::TimeViolation);
            }
            self.last_seen_timestamp = timestamp_ms;

            match body[0] {
                wire::TYPE_APP => {
                    let app = decode_app_inner_checked(body)?;
                    if app.last {
                        self.last_received = true;
                    }
                    Ok(Progress::Ready(Received::App {
                        last: app.last,
                        at: wire::HEADER_BYTES + wire::HEADER_BYTES + 4,
                    }))
                }
                wire::TYPE_MULTI_APP => {
                    let cursor = wire::decode_multi_app_inner(body, wire::DEFAULT_MAX_MULTI_APP_COUNT)?;
                    if cursor.last {
                        self.last_received = true;
                    }
                    Ok(Progress::Ready(Received::MultiApp {
                        last: cursor.last,
                        at: wire::HEADER_BYTES * 2 + 6,
                    }))
                }
                _ => unreachable!("checked above"),
            }
        })();
        self.note_result(result)
    }
}

fn decode_app_inner_checked(body: &[u8]) -> Result<DecodedApp, SaltError> {
    wire::decode_app_inner(body)
}

/// What [`Framer::read`] found, described as an offset into the caller's
/// buffer rather than a borrow, so the method can return while still
/// holding `buf` mutably borrowed during decryption.
#[derive(Debug, Clone, Copy)]
pub enum Received {
    /// A single App message. Its payload begins at byte `at` of the buffer
    /// passed to `read`, running to the frame's decrypted length.
    App {
        /// LastFlag was set: the peer will send nothing further.
        last: bool,
        /// Byte offset of the payload within the caller's buffer.
        at: usize,
    },
    /// A MultiApp batch. Re-decode with [`wire::decode_multi_app_inner`]
    /// (on `buf[wire::HEADER_BYTES..]`) to iterate its payloads with a
    /// [`MultiAppCursor`].
    MultiApp {
        /// LastFlag was set: the peer will send nothing further.
        last: bool,
        /// Byte offset of the entry count/payload table within the
        /// caller's buffer.
        at: usize,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Sodium;
    use std::io::Cursor;

    #[test]
    fn single_app_message_round_trips_with_last_flag() {
        let crypto = Sodium;
        let key = [1u8; 32];
        let mut sender = Framer::new(4096, Nonce::starting_at(1), Nonce::starting_at(2));
        let mut receiver = Framer::new(4096, Nonce::starting_at(2), Nonce::starting_at(1));

        let mut wire_buf = Vec::new();
        let mut send_buf = [0u8; 256];
        loop {
            let mut sink = Cursor::new(std::mem::take(&mut wire_buf));
            sink.set_position(sink.get_ref().len() as u64);
            match sender
                .write_app(&mut sink, &mut send_buf, &crypto, &key, &NoClock, b"ping", true)
                .unwrap()
            {
                Progress::Ready(()) => {
                    wire_buf = sink.into_inner();
                    break;
                }
                Progress::Pending => {
                    wire_buf = sink.into_inner();
                }
            }
        }
        assert!(sender.write_closed());

        let mut cursor = Cursor::new(wire_buf);
        let mut recv_buf = [0u8; 256];
        let received = match receiver.read(&mut cursor, &mut recv_buf, &crypto, &key, 0).unwrap() {
            Progress::Ready(r) => r,
            Progress::Pending => panic!("a Cursor never blocks"),
        };
        match received {
            Received::App { last, at } => {
                assert!(last);
                assert_eq!(&recv_buf[at..at + 4], b"ping");
            }
            Received::MultiApp { .. } => panic!("expected App"),
        }
        assert!(receiver.read_closed());
    }

    #[test]
    fn reading_after_last_flag_is_session_closed() {
        let mut receiver = Framer::new(4096, Nonce::starting_at(2), Nonce::starting_at(1));
        receiver.last_received = true;
        let crypto = Sodium;
        let key = [0u8; 32];
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; 64];
        assert!(matches!(
            receiver.read(&mut cursor, &mut buf, &crypto, &key, 0),
            Err(SaltError::SessionClosed)
        ));
    }
}
