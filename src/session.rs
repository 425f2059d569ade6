//! The session (§3): the long-lived state a caller holds for one Salt
//! Channel connection, tying the handshake engine to the post-handshake
//! framer and owning the buffer both operate on.

use crate::crypto::{CryptoProvider, SIGN_PUBLICKEYBYTES, SIGN_SECRETKEYBYTES};
use crate::error::SaltError;
use crate::framer::{Clock, Framer, Received};
use crate::handshake::{ClientHandshake, HandshakeOutput, HostHandshake};
use crate::io_pump::Progress;
use crate::transport::Transport;

/// Which end of the handshake a [`Session`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The side that waits for M1 and answers with M2/M3.
    Host,
    /// The side that sends M1 and answers with M4.
    Client,
}

enum Phase {
    Host(HostHandshake),
    Client(ClientHandshake),
    Established(Framer),
}

/// A Salt Channel session: one handshake engine that, once complete,
/// hands off to a [`Framer`] for the life of the connection.
///
/// The session never allocates. It owns no transport -- every operation
/// takes the transport and a caller-supplied scratch buffer explicitly, per
/// §5's non-blocking, caller-driven I/O model.
pub struct Session {
    phase: Phase,
    sign_pk: [u8; SIGN_PUBLICKEYBYTES],
    sign_sk: [u8; SIGN_SECRETKEYBYTES],
    peer_sign_pub: Option<[u8; SIGN_PUBLICKEYBYTES]>,
    handshake_hash: Option<[u8; 64]>,
    session_key: Option<[u8; 32]>,
    max_body_len: usize,
    poisoned: bool,
}

impl Session {
    /// Starts a session in the host role.
    pub fn new_host<C: CryptoProvider>(
        crypto: &C,
        max_body_len: usize,
        sign_pk: [u8; SIGN_PUBLICKEYBYTES],
        sign_sk: [u8; SIGN_SECRETKEYBYTES],
    ) -> Result<Session, SaltError> {
        let handshake = HostHandshake::new(crypto, max_body_len)?;
        Ok(Session {
            phase: Phase::Host(handshake),
            sign_pk,
            sign_sk,
            peer_sign_pub: None,
            handshake_hash: None,
            session_key: None,
            max_body_len,
            poisoned: false,
        })
    }

    /// Starts a session in the client role. `expected_host_key`, when
    /// supplied, pins the host's long-term signing key (§4.2's optional
    /// peer-key pinning).
    pub fn new_client<C: CryptoProvider>(
        crypto: &C,
        max_body_len: usize,
        sign_pk: [u8; SIGN_PUBLICKEYBYTES],
        sign_sk: [u8; SIGN_SECRETKEYBYTES],
        expected_host_key: Option<[u8; SIGN_PUBLICKEYBYTES]>,
    ) -> Result<Session, SaltError> {
        let handshake = ClientHandshake::new(crypto, max_body_len, expected_host_key)?;
        Ok(Session {
            phase: Phase::Client(handshake),
            sign_pk,
            sign_sk,
            peer_sign_pub: None,
            handshake_hash: None,
            session_key: None,
            max_body_len,
            poisoned: false,
        })
    }

    /// Drives the handshake forward. Returns `Progress::Ready(())` once the
    /// session has reached the established phase and [`Session::write_app`]
    /// / [`Session::read`] may be used.
    pub fn advance<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
    ) -> Result<Progress<()>, SaltError> {
        if self.poisoned {
            return Err(SaltError::SessionClosed);
        }
        let result = (|| {
            let output = match &mut self.phase {
                Phase::Host(h) => match h.poll(stream, buf, crypto, &self.sign_pk, &self.sign_sk)? {
                    Progress::Pending => return Ok(Progress::Pending),
                    Progress::Ready(out) => out,
                },
                Phase::Client(c) => match c.poll(stream, buf, crypto, &self.sign_pk, &self.sign_sk)? {
                    Progress::Pending => return Ok(Progress::Pending),
                    Progress::Ready(out) => out,
                },
                Phase::Established(_) => return Ok(Progress::Ready(())),
            };
            self.finish_handshake(output);
            Ok(Progress::Ready(()))
        })();
        self.note_result(result)
    }

    fn finish_handshake(&mut self, output: HandshakeOutput) {
        self.peer_sign_pub = Some(output.peer_sign_pub);
        self.handshake_hash = Some(output.handshake_hash);
        self.session_key = Some(output.session_key);
        self.phase = Phase::Established(Framer::new(self.max_body_len, output.write_nonce, output.read_nonce));
    }

    /// True once a fatal protocol/crypto error has poisoned this session. No
    /// public method below will make further progress once this is set; the
    /// only cure is to start a new session.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Records the outcome of a fallible operation, poisoning the session
    /// (and zeroizing its key material) unless the error is a
    /// `TransportFatal` (the transport failed, not the protocol engine) or a
    /// `SessionClosed` (the peer closed gracefully, or we already know
    /// we're done).
    fn note_result<T>(&mut self, result: Result<T, SaltError>) -> Result<T, SaltError> {
        if let Err(ref e) = result {
            if !matches!(e, SaltError::TransportFatal(_) | SaltError::SessionClosed) {
                self.poison();
            }
        }
        result
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.sign_sk = [0u8; SIGN_SECRETKEYBYTES];
        if let Some(ref mut key) = self.session_key {
            *key = [0u8; 32];
        }
    }

    /// The peer's authenticated long-term signing key, available once the
    /// handshake has completed.
    pub fn peer_sign_pub(&self) -> Option<[u8; SIGN_PUBLICKEYBYTES]> {
        self.peer_sign_pub
    }

    /// `SHA-512(M1 || M2)`, available once the handshake has completed.
    pub fn handshake_hash(&self) -> Option<[u8; 64]> {
        self.handshake_hash
    }

    /// Sends a single App message. Fails with [`SaltError::ProtocolError`]
    /// if the handshake has not completed.
    pub fn write_app<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        clock: &impl Clock,
        payload: &[u8],
        last: bool,
    ) -> Result<Progress<()>, SaltError> {
        if self.poisoned {
            return Err(SaltError::SessionClosed);
        }
        let result = (|| {
            let key = self.session_key.ok_or(SaltError::ProtocolError("handshake not complete"))?;
            match &mut self.phase {
                Phase::Established(framer) => framer.write_app(stream, buf, crypto, &key, clock, payload, last),
                _ => Err(SaltError::ProtocolError("handshake not complete")),
            }
        })();
        self.note_result(result)
    }

    /// Sends a MultiApp batch. See [`Session::write_app`].
    pub fn write_multi_app<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        clock: &impl Clock,
        payloads: &[&[u8]],
        last: bool,
    ) -> Result<Progress<()>, SaltError> {
        if self.poisoned {
            return Err(SaltError::SessionClosed);
        }
        let result = (|| {
            let key = self.session_key.ok_or(SaltError::ProtocolError("handshake not complete"))?;
            match &mut self.phase {
                Phase::Established(framer) => {
                    framer.write_multi_app(stream, buf, crypto, &key, clock, payloads, last)
                }
                _ => Err(SaltError::ProtocolError("handshake not complete")),
            }
        })();
        self.note_result(result)
    }

    /// Receives and decrypts the next frame. `max_regression_ms` is forwarded
    /// to [`Framer::read`]; pass 0 to disable the monotonic-timestamp check.
    pub fn read<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        max_regression_ms: u32,
    ) -> Result<Progress<Received>, SaltError> {
        if self.poisoned {
            return Err(SaltError::SessionClosed);
        }
        let result = (|| {
            let key = self.session_key.ok_or(SaltError::ProtocolError("handshake not complete"))?;
            match &mut self.phase {
                Phase::Established(framer) => framer.read(stream, buf, crypto, &key, max_regression_ms),
                _ => Err(SaltError::ProtocolError("handshake not complete")),
            }
        })();
        self.note_result(result)
    }

    /// True once either side has signaled LastFlag and no further App
    /// traffic may be exchanged.
    pub fn is_closed(&self) -> bool {
        if self.poisoned {
            return true;
        }
        match &self.phase {
            Phase::Established(framer) => framer.write_closed() || framer.read_closed(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Sodium;
    use std::io::Cursor;

    struct Pipe {
        inbox: Cursor<Vec<u8>>,
        outbox: Vec<u8>,
    }

    impl Pipe {
        fn new() -> Pipe {
            Pipe { inbox: Cursor::new(Vec::new()), outbox: Vec::new() }
        }
    }

    impl std::io::Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = std::io::Read::read(&mut self.inbox, buf)?;
            if n == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::WouldBlock, "empty"));
            }
            Ok(n)
        }
    }

    impl std::io::Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.outbox.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn shuttle(a_out: &mut Vec<u8>, b_in: &mut Cursor<Vec<u8>>) {
        if a_out.is_empty() {
            return;
        }
        let mut combined = b_in.get_ref()[b_in.position() as usize..].to_vec();
        combined.extend_from_slice(a_out);
        a_out.clear();
        *b_in = Cursor::new(combined);
    }

    #[test]
    fn full_session_handshake_then_one_ping_pong() {
        let crypto = Sodium;
        let mut host_pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut host_sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut host_pk, &mut host_sk).unwrap();
        let mut client_pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut client_sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut client_pk, &mut client_sk).unwrap();

        let mut host = Session::new_host(&crypto, 4096, host_pk, host_sk).unwrap();
        let mut client = Session::new_client(&crypto, 4096, client_pk, client_sk, Some(host_pk)).unwrap();

        let mut host_pipe = Pipe::new();
        let mut client_pipe = Pipe::new();
        let mut host_buf = [0u8; 4096];
        let mut client_buf = [0u8; 4096];

        let mut host_ready = false;
        let mut client_ready = false;
        for _ in 0..200 {
            if !host_ready {
                host_ready = host.advance(&mut host_pipe, &mut host_buf, &crypto).unwrap().is_ready();
            }
            if !client_ready {
                client_ready = client.advance(&mut client_pipe, &mut client_buf, &crypto).unwrap().is_ready();
            }
            shuttle(&mut client_pipe.outbox, &mut host_pipe.inbox);
            shuttle(&mut host_pipe.outbox, &mut client_pipe.inbox);
            if host_ready && client_ready {
                break;
            }
        }
        assert!(host_ready && client_ready);
        assert_eq!(host.peer_sign_pub(), Some(client_pk));
        assert_eq!(client.peer_sign_pub(), Some(host_pk));
        assert_eq!(host.handshake_hash(), client.handshake_hash());

        let clock = crate::framer::NoClock;
        let mut sent = false;
        let mut received = false;
        for _ in 0..50 {
            if !sent {
                sent = client
                    .write_app(&mut client_pipe, &mut client_buf, &crypto, &clock, b"ping", true)
                    .unwrap()
                    .is_ready();
            }
            if !received {
                if let Progress::Ready(Received::App { last, at }) =
                    host.read(&mut host_pipe, &mut host_buf, &crypto, 0).unwrap()
                {
                    assert!(last);
                    assert_eq!(&host_buf[at..at + 4], b"ping");
                    received = true;
                }
            }
            shuttle(&mut client_pipe.outbox, &mut host_pipe.inbox);
            shuttle(&mut host_pipe.outbox, &mut client_pipe.inbox);
            if sent && received {
                break;
            }
        }
        assert!(sent && received);
        assert!(client.is_closed());
        assert!(host.is_closed());
    }
}
