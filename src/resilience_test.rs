//! Exercises the "call again to resume" contract under a transport that
//! splits every read and write into small, interrupted chunks, standing in
//! for a slow or congested socket.

use std::io::Cursor;

use partial_io::{PartialOp, PartialRead, PartialWrite};

use crate::crypto::Sodium;
use crate::crypto::{CryptoProvider, SIGN_PUBLICKEYBYTES, SIGN_SECRETKEYBYTES};
use crate::framer::{NoClock, Received};
use crate::io_pump::Progress;
use crate::session::Session;

/// A duplex pair where each end's writes are chopped into partial, would-
/// block-prone chunks before the other end can read them.
struct ChoppyPipe {
    read_half: PartialRead<Cursor<Vec<u8>>>,
    write_half: PartialWrite<Vec<u8>>,
}

impl ChoppyPipe {
    fn new(ops: Vec<PartialOp>) -> ChoppyPipe {
        ChoppyPipe {
            read_half: PartialRead::new(Cursor::new(Vec::new()), ops.clone()),
            write_half: PartialWrite::new(Vec::new(), ops),
        }
    }
}

impl std::io::Read for ChoppyPipe {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_half.read(buf)
    }
}

impl std::io::Write for ChoppyPipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_half.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.write_half.flush()
    }
}

fn choppy_ops() -> Vec<PartialOp> {
    vec![
        PartialOp::Limited(1),
        PartialOp::Err(std::io::ErrorKind::WouldBlock),
        PartialOp::Limited(3),
        PartialOp::Err(std::io::ErrorKind::WouldBlock),
        PartialOp::Unlimited,
    ]
    .into_iter()
    .cycle()
    .take(64)
    .collect()
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
fn handshake_and_one_message_survive_a_choppy_transport() {
    let crypto = Sodium;
    let mut host_pk = [0u8; SIGN_PUBLICKEYBYTES];
    let mut host_sk = [0u8; SIGN_SECRETKEYBYTES];
    crypto.sign_keypair(&mut host_pk, &mut host_sk).unwrap();
    let mut client_pk = [0u8; SIGN_PUBLICKEYBYTES];
    let mut client_sk = [0u8; SIGN_SECRETKEYBYTES];
    crypto.sign_keypair(&mut client_pk, &mut client_sk).unwrap();

    let mut host = Session::new_host(&crypto, 4096, host_pk, host_sk).unwrap();
    let mut client = Session::new_client(&crypto, 4096, client_pk, client_sk, Some(host_pk)).unwrap();

    let mut host_pipe = ChoppyPipe::new(choppy_ops());
    let mut client_pipe = ChoppyPipe::new(choppy_ops());
    let mut host_buf = [0u8; 4096];
    let mut client_buf = [0u8; 4096];

    let mut host_ready = false;
    let mut client_ready = false;
    for _ in 0..5000 {
        if !host_ready {
            if let Ok(p) = host.advance(&mut host_pipe, &mut host_buf, &crypto) {
                host_ready = p.is_ready();
            }
        }
        if !client_ready {
            if let Ok(p) = client.advance(&mut client_pipe, &mut client_buf, &crypto) {
                client_ready = p.is_ready();
            }
        }
        shuttle(client_pipe.write_half.get_mut(), host_pipe.read_half.get_mut());
        shuttle(host_pipe.write_half.get_mut(), client_pipe.read_half.get_mut());
        if host_ready && client_ready {
            break;
        }
    }
    assert!(host_ready, "host handshake never completed over a choppy transport");
    assert!(client_ready, "client handshake never completed over a choppy transport");

    let clock = NoClock;
    let mut sent = false;
    let mut received = false;
    for _ in 0..5000 {
        if !sent {
            if let Ok(p) = client.write_app(&mut client_pipe, &mut client_buf, &crypto, &clock, b"ping", true) {
                sent = p.is_ready();
            }
        }
        if !received {
            if let Ok(Progress::Ready(Received::App { last, at })) =
                host.read(&mut host_pipe, &mut host_buf, &crypto, 0)
            {
                assert!(last);
                assert_eq!(&host_buf[at..at + 4], b"ping");
                received = true;
            }
        }
        shuttle(client_pipe.write_half.get_mut(), host_pipe.read_half.get_mut());
        shuttle(host_pipe.write_half.get_mut(), client_pipe.read_half.get_mut());
        if sent && received {
            break;
        }
    }
    assert!(sent && received, "ping never made it across a choppy transport");
}
