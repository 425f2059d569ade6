//! The handshake engine (§4.2, component C4): drives M1-M4 to completion
//! for either the host or client role, deriving the session key, the
//! handshake hash, and the two directional nonce counters.
//!
//! Each side's handshake is a resumable state machine, built the same way
//! [`crate::io_pump::FrameReader`]/[`FrameWriter`] are: a `poll` method that
//! may be called repeatedly, returning [`Progress::Pending`] whenever the
//! underlying transport is not yet ready.

use crate::crypto::{
    CryptoProvider, DH_PUBLICKEYBYTES, DH_SECRETKEYBYTES, HASHBYTES, SIGNATUREBYTES,
    SIGN_PUBLICKEYBYTES, SIGN_SECRETKEYBYTES,
};
use crate::error::SaltError;
use crate::io_pump::{FrameReader, FrameWriter, Progress};
use crate::nonce::Nonce;
use crate::transport::Transport;
use crate::wire::{self, SIG1_LABEL, SIG2_LABEL};

const MAX_M1_LEN: usize = wire::HEADER_BYTES
    + wire::PROTOCOL_ID.len()
    + DH_PUBLICKEYBYTES
    + SIGN_PUBLICKEYBYTES;
const M2_LEN: usize = wire::HEADER_BYTES + DH_PUBLICKEYBYTES;

/// The negotiated state a completed handshake hands to the session layer.
#[derive(Clone, Copy)]
pub struct HandshakeOutput {
    /// The raw X25519 shared secret, used directly as the AEAD key.
    pub session_key: [u8; 32],
    /// This side's directional write-nonce counter, positioned to encrypt
    /// the first post-handshake application message.
    pub write_nonce: Nonce,
    /// This side's directional read-nonce counter, positioned to decrypt
    /// the first post-handshake application message.
    pub read_nonce: Nonce,
    /// The peer's long-term signing public key, authenticated by the
    /// handshake's signature exchange.
    pub peer_sign_pub: [u8; SIGN_PUBLICKEYBYTES],
    /// SHA-512(M1 frame bytes || M2 frame bytes), retained in case the
    /// caller wants it (e.g. to bind it into an application-layer ticket).
    pub handshake_hash: [u8; HASHBYTES],
}

fn compute_handshake_hash<C: CryptoProvider>(crypto: &C, m1: &[u8], m2: &[u8]) -> [u8; HASHBYTES] {
    let mut joined = [0u8; MAX_M1_LEN + M2_LEN];
    joined[..m1.len()].copy_from_slice(m1);
    joined[m1.len()..m1.len() + m2.len()].copy_from_slice(m2);
    let mut out = [0u8; HASHBYTES];
    crypto.hash_sha512(&mut out, &joined[..m1.len() + m2.len()]);
    out
}

fn labeled_message(label: &[u8; 8], hash: &[u8; HASHBYTES]) -> [u8; 8 + HASHBYTES] {
    let mut out = [0u8; 8 + HASHBYTES];
    out[..8].copy_from_slice(label);
    out[8..].copy_from_slice(hash);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostStage {
    ReadM1,
    WriteRejectM2,
    WriteM2,
    WriteM3,
    ReadM4,
}

/// The host side of the handshake.
pub struct HostHandshake {
    stage: HostStage,
    writer_started: bool,
    reader: FrameReader,
    writer: FrameWriter,
    dh_pub: [u8; DH_PUBLICKEYBYTES],
    dh_sec: [u8; DH_SECRETKEYBYTES],
    client_dh_pub: [u8; DH_PUBLICKEYBYTES],
    m1_bytes: [u8; MAX_M1_LEN],
    m1_len: usize,
    m2_bytes: [u8; M2_LEN],
    session_key: [u8; 32],
    handshake_hash: [u8; HASHBYTES],
}

impl HostHandshake {
    /// Starts a new host handshake. `max_body_len` bounds the frames this
    /// side will accept, matching the caller's working buffer size.
    pub fn new<C: CryptoProvider>(crypto: &C, max_body_len: usize) -> Result<HostHandshake, SaltError> {
        let mut dh_pub = [0u8; DH_PUBLICKEYBYTES];
        let mut dh_sec = [0u8; DH_SECRETKEYBYTES];
        crypto.dh_keypair(&mut dh_pub, &mut dh_sec)?;
        Ok(HostHandshake {
            stage: HostStage::ReadM1,
            writer_started: false,
            reader: FrameReader::new(max_body_len),
            writer: FrameWriter::new(),
            dh_pub,
            dh_sec,
            client_dh_pub: [0u8; DH_PUBLICKEYBYTES],
            m1_bytes: [0u8; MAX_M1_LEN],
            m1_len: 0,
            m2_bytes: [0u8; M2_LEN],
            session_key: [0u8; 32],
            handshake_hash: [0u8; HASHBYTES],
        })
    }

    /// Drives the handshake. `sign_pk`/`sign_sk` are this host's long-term
    /// signing keypair, compared against the client's pinned expectation (if
    /// any) before any handshake traffic beyond M2 is produced.
    pub fn poll<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        sign_pk: &[u8; SIGN_PUBLICKEYBYTES],
        sign_sk: &[u8; SIGN_SECRETKEYBYTES],
    ) -> Result<Progress<HandshakeOutput>, SaltError> {
        loop {
            match self.stage {
                HostStage::ReadM1 => {
                    let n = match self.reader.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => n,
                    };
                    if n > MAX_M1_LEN {
                        return Err(SaltError::ParseError("M1 larger than expected"));
                    }
                    let m1 = wire::decode_m1(&buf[..n])?;
                    self.client_dh_pub = m1.client_dh_pub;
                    let pin_ok = match m1.peer_sig_key {
                        Some(expected) => expected == sign_pk,
                        None => true,
                    };
                    self.m1_bytes[..n].copy_from_slice(&buf[..n]);
                    self.m1_len = n;
                    self.stage = if pin_ok { HostStage::WriteM2 } else { HostStage::WriteRejectM2 };
                }
                HostStage::WriteRejectM2 => {
                    if !self.writer_started {
                        let len = wire::encode_m2(buf, true, true, &self.dh_pub)?;
                        self.writer.start(len);
                        self.writer_started = true;
                    }
                    match self.writer.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(()) => return Err(SaltError::NoSuchServer),
                    }
                }
                HostStage::WriteM2 => {
                    if !self.writer_started {
                        let len = wire::encode_m2(buf, false, true, &self.dh_pub)?;
                        self.m2_bytes.copy_from_slice(&buf[..len]);
                        self.writer.start(len);
                        self.writer_started = true;
                    }
                    match self.writer.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(()) => {
                            let mut shared = [0u8; DH_PUBLICKEYBYTES];
                            crypto.dh(&mut shared, &self.client_dh_pub, &self.dh_sec)?;
                            self.session_key = shared;
                            self.handshake_hash = compute_handshake_hash(
                                crypto,
                                &self.m1_bytes[..self.m1_len],
                                &self.m2_bytes,
                            );
                            self.writer_started = false;
                            self.stage = HostStage::WriteM3;
                        }
                    }
                }
                HostStage::WriteM3 => {
                    if !self.writer_started {
                        let msg = labeled_message(SIG1_LABEL, &self.handshake_hash);
                        let mut signature1 = [0u8; SIGNATUREBYTES];
                        crypto.sign(&mut signature1, &msg, sign_sk)?;
                        let write_nonce = Nonce::starting_at(1);
                        let nonce_bytes = write_nonce.to_bytes();
                        let len = wire::encode_m3(
                            buf,
                            crypto,
                            &self.session_key,
                            &nonce_bytes,
                            sign_pk,
                            &signature1,
                        )?;
                        self.writer.start(len);
                        self.writer_started = true;
                    }
                    match self.writer.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(()) => {
                            self.writer_started = false;
                            self.stage = HostStage::ReadM4;
                        }
                    }
                }
                HostStage::ReadM4 => {
                    let n = match self.reader.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => n,
                    };
                    let read_nonce = Nonce::starting_at(2);
                    let nonce_bytes = read_nonce.to_bytes();
                    let (client_sign_pub, signature2) =
                        wire::decode_m4(&mut buf[..n], crypto, &self.session_key, &nonce_bytes)?;
                    let msg = labeled_message(SIG2_LABEL, &self.handshake_hash);
                    if !crypto.sign_verify_detached(&signature2, &msg, &client_sign_pub) {
                        return Err(SaltError::CryptoError);
                    }
                    let mut write_nonce = Nonce::starting_at(1);
                    write_nonce.advance();
                    let mut read_nonce = Nonce::starting_at(2);
                    read_nonce.advance();
                    return Ok(Progress::Ready(HandshakeOutput {
                        session_key: self.session_key,
                        write_nonce,
                        read_nonce,
                        peer_sign_pub: client_sign_pub,
                        handshake_hash: self.handshake_hash,
                    }));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientStage {
    WriteM1,
    ReadM2,
    ReadM3,
    WriteM4,
}

/// The client side of the handshake.
pub struct ClientHandshake {
    stage: ClientStage,
    writer_started: bool,
    reader: FrameReader,
    writer: FrameWriter,
    dh_pub: [u8; DH_PUBLICKEYBYTES],
    dh_sec: [u8; DH_SECRETKEYBYTES],
    expected_host_key: Option<[u8; SIGN_PUBLICKEYBYTES]>,
    pending_host_key: Option<[u8; SIGN_PUBLICKEYBYTES]>,
    m1_bytes: [u8; MAX_M1_LEN],
    m1_len: usize,
    m2_bytes: [u8; M2_LEN],
    session_key: [u8; 32],
    handshake_hash: [u8; HASHBYTES],
}

impl ClientHandshake {
    /// Starts a new client handshake. `expected_host_key`, when set, asks
    /// the host to pin that key (M1) and is cross-checked against M3's
    /// signing key once received.
    pub fn new<C: CryptoProvider>(
        crypto: &C,
        max_body_len: usize,
        expected_host_key: Option<[u8; SIGN_PUBLICKEYBYTES]>,
    ) -> Result<ClientHandshake, SaltError> {
        let mut dh_pub = [0u8; DH_PUBLICKEYBYTES];
        let mut dh_sec = [0u8; DH_SECRETKEYBYTES];
        crypto.dh_keypair(&mut dh_pub, &mut dh_sec)?;
        Ok(ClientHandshake {
            stage: ClientStage::WriteM1,
            writer_started: false,
            reader: FrameReader::new(max_body_len),
            writer: FrameWriter::new(),
            dh_pub,
            dh_sec,
            expected_host_key,
            pending_host_key: None,
            m1_bytes: [0u8; MAX_M1_LEN],
            m1_len: 0,
            m2_bytes: [0u8; M2_LEN],
            session_key: [0u8; 32],
            handshake_hash: [0u8; HASHBYTES],
        })
    }

    /// Drives the handshake. `sign_pk`/`sign_sk` are this client's long-term
    /// signing keypair.
    pub fn poll<C: CryptoProvider>(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        crypto: &C,
        sign_pk: &[u8; SIGN_PUBLICKEYBYTES],
        sign_sk: &[u8; SIGN_SECRETKEYBYTES],
    ) -> Result<Progress<HandshakeOutput>, SaltError> {
        loop {
            match self.stage {
                ClientStage::WriteM1 => {
                    if !self.writer_started {
                        let len = wire::encode_m1(
                            buf,
                            self.expected_host_key.is_some(),
                            false,
                            &self.dh_pub,
                            self.expected_host_key.as_ref(),
                        )?;
                        self.m1_bytes[..len].copy_from_slice(&buf[..len]);
                        self.m1_len = len;
                        self.writer.start(len);
                        self.writer_started = true;
                    }
                    match self.writer.poll(stream, &self.m1_bytes[..self.m1_len])? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(()) => {
                            self.writer_started = false;
                            self.stage = ClientStage::ReadM2;
                        }
                    }
                }
                ClientStage::ReadM2 => {
                    let n = match self.reader.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => n,
                    };
                    if n != M2_LEN {
                        return Err(SaltError::ParseError("M2 has the wrong length"));
                    }
                    self.m2_bytes.copy_from_slice(&buf[..n]);
                    let m2 = wire::decode_m2(&buf[..n])?;
                    if m2.no_such_server {
                        return Err(SaltError::NoSuchServer);
                    }
                    let mut shared = [0u8; DH_PUBLICKEYBYTES];
                    crypto.dh(&mut shared, &m2.host_dh_pub, &self.dh_sec)?;
                    self.session_key = shared;
                    self.handshake_hash =
                        compute_handshake_hash(crypto, &self.m1_bytes[..self.m1_len], &self.m2_bytes);
                    self.stage = ClientStage::ReadM3;
                }
                ClientStage::ReadM3 => {
                    let n = match self.reader.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => n,
                    };
                    let read_nonce = Nonce::starting_at(1);
                    let nonce_bytes = read_nonce.to_bytes();
                    let (host_sign_pub, signature1) =
                        wire::decode_m3(&mut buf[..n], crypto, &self.session_key, &nonce_bytes)?;
                    if let Some(expected) = self.expected_host_key {
                        if expected != host_sign_pub {
                            return Err(SaltError::NoSuchServer);
                        }
                    }
                    let msg = labeled_message(SIG1_LABEL, &self.handshake_hash);
                    if !crypto.sign_verify_detached(&signature1, &msg, &host_sign_pub) {
                        return Err(SaltError::CryptoError);
                    }
                    self.pending_host_key = Some(host_sign_pub);
                    self.stage = ClientStage::WriteM4;
                }
                ClientStage::WriteM4 => {
                    if !self.writer_started {
                        let msg = labeled_message(SIG2_LABEL, &self.handshake_hash);
                        let mut signature2 = [0u8; SIGNATUREBYTES];
                        crypto.sign(&mut signature2, &msg, sign_sk)?;
                        let write_nonce = Nonce::starting_at(2);
                        let nonce_bytes = write_nonce.to_bytes();
                        let len = wire::encode_m4(
                            buf,
                            crypto,
                            &self.session_key,
                            &nonce_bytes,
                            sign_pk,
                            &signature2,
                        )?;
                        self.writer.start(len);
                        self.writer_started = true;
                    }
                    match self.writer.poll(stream, buf)? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(()) => {
                            let mut write_nonce = Nonce::starting_at(2);
                            write_nonce.advance();
                            let mut read_nonce = Nonce::starting_at(1);
                            read_nonce.advance();
                            return Ok(Progress::Ready(HandshakeOutput {
                                session_key: self.session_key,
                                write_nonce,
                                read_nonce,
                                peer_sign_pub: self.pending_host_key.expect("set in ReadM3"),
                                handshake_hash: self.handshake_hash,
                            }));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Sodium;
    use std::io::Cursor;

    /// An in-memory duplex pipe: writes from one end land in the other
    /// end's read buffer. Used to run a host and a client handshake against
    /// each other without real sockets.
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
    fn host_and_client_agree_on_session_key_and_peer_identities() {
        let crypto = Sodium;
        let mut host_pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut host_sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut host_pk, &mut host_sk).unwrap();
        let mut client_pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut client_sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut client_pk, &mut client_sk).unwrap();

        let mut host = HostHandshake::new(&crypto, 4096).unwrap();
        let mut client = ClientHandshake::new(&crypto, 4096, Some(host_pk)).unwrap();

        let mut host_pipe = Pipe::new();
        let mut client_pipe = Pipe::new();
        let mut host_buf = [0u8; 4096];
        let mut client_buf = [0u8; 4096];

        let mut host_out = None;
        let mut client_out = None;
        for _ in 0..100 {
            if host_out.is_none() {
                match host.poll(&mut host_pipe, &mut host_buf, &crypto, &host_pk, &host_sk).unwrap() {
                    Progress::Ready(out) => host_out = Some(out),
                    Progress::Pending => {}
                }
            }
            if client_out.is_none() {
                match client
                    .poll(&mut client_pipe, &mut client_buf, &crypto, &client_pk, &client_sk)
                    .unwrap()
                {
                    Progress::Ready(out) => client_out = Some(out),
                    Progress::Pending => {}
                }
            }
            shuttle(&mut client_pipe.outbox, &mut host_pipe.inbox);
            shuttle(&mut host_pipe.outbox, &mut client_pipe.inbox);
            if host_out.is_some() && client_out.is_some() {
                break;
            }
        }

        let host_out = host_out.expect("host handshake did not complete");
        let client_out = client_out.expect("client handshake did not complete");
        assert_eq!(host_out.session_key, client_out.session_key);
        assert_eq!(host_out.handshake_hash, client_out.handshake_hash);
        assert_eq!(host_out.peer_sign_pub, client_pk);
        assert_eq!(client_out.peer_sign_pub, host_pk);
    }

    #[test]
    fn host_rejects_unrecognized_pinned_key_without_m3_or_m4() {
        let crypto = Sodium;
        let mut host_pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut host_sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut host_pk, &mut host_sk).unwrap();
        let mut wrong_pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut wrong_sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut wrong_pk, &mut wrong_sk).unwrap();
        let mut client_pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut client_sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut client_pk, &mut client_sk).unwrap();

        let mut host = HostHandshake::new(&crypto, 4096).unwrap();
        let mut client = ClientHandshake::new(&crypto, 4096, Some(wrong_pk)).unwrap();

        let mut host_pipe = Pipe::new();
        let mut client_pipe = Pipe::new();
        let mut host_buf = [0u8; 4096];
        let mut client_buf = [0u8; 4096];

        let mut host_result = None;
        let mut client_result = None;
        for _ in 0..20 {
            if host_result.is_none() {
                host_result =
                    Some(host.poll(&mut host_pipe, &mut host_buf, &crypto, &host_pk, &host_sk));
                if matches!(host_result, Some(Ok(Progress::Pending))) {
                    host_result = None;
                }
            }
            if client_result.is_none() {
                client_result = Some(client.poll(
                    &mut client_pipe,
                    &mut client_buf,
                    &crypto,
                    &client_pk,
                    &client_sk,
                ));
                if matches!(client_result, Some(Ok(Progress::Pending))) {
                    client_result = None;
                }
            }
            shuttle(&mut client_pipe.outbox, &mut host_pipe.inbox);
            shuttle(&mut host_pipe.outbox, &mut client_pipe.inbox);
            if host_result.is_some() {
                break;
            }
        }

        assert!(matches!(host_result, Some(Err(SaltError::NoSuchServer))));
    }
}
