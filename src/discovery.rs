//! Pre-handshake discovery (§4.5, component C6): the unauthenticated,
//! unencrypted A1/A2 exchange a client can use to ask a host what it
//! speaks before spending a handshake on it. Neither side touches any
//! handshake key material here; the pre-session closes after the client's
//! first A2 receipt.

use crate::io_pump::{FrameReader, FrameWriter, Progress};
use crate::error::SaltError;
use crate::transport::Transport;
use crate::wire::{self, A2Pair};

/// Sends an A1 query and waits for the host's A2 response.
pub struct A1Requester {
    writer: FrameWriter,
    reader: FrameReader,
    writer_started: bool,
    address_type: u8,
    sent: bool,
}

impl A1Requester {
    /// Prepares to query `address` (interpreted per `address_type`, a
    /// caller-defined tag -- §4.5 leaves its meaning to the application).
    pub fn new(max_body_len: usize, address_type: u8) -> A1Requester {
        A1Requester {
            writer: FrameWriter::new(),
            reader: FrameReader::new(max_body_len),
            writer_started: false,
            address_type,
            sent: false,
        }
    }

    /// Drives the request. `buf` holds the A1 query while sending, then is
    /// overwritten with the A2 response body once one arrives.
    pub fn poll(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        address: &[u8],
    ) -> Result<Progress<usize>, SaltError> {
        if !self.sent {
            if !self.writer_started {
                let len = wire::encode_a1(buf, self.address_type, address)?;
                self.writer.start(len);
                self.writer_started = true;
            }
            match self.writer.poll(stream, buf)? {
                Progress::Pending => return Ok(Progress::Pending),
                Progress::Ready(()) => self.sent = true,
            }
        }
        self.reader.poll(stream, buf)
    }
}

/// Reads an A1 query and replies with a caller-supplied A2 listing.
pub struct A2Responder {
    reader: FrameReader,
    writer: FrameWriter,
    writer_started: bool,
    query: Option<QueryResult>,
}

/// The decoded fields of a received A1 query, copied out of the scratch
/// buffer so the caller may reuse it to build the A2 response.
#[derive(Debug, Clone, Copy)]
pub struct QueryResult {
    /// The address-type tag the client sent.
    pub address_type: u8,
    /// Offset and length of the queried address within the scratch buffer
    /// used for the `poll` call that produced this result.
    pub address_len: usize,
}

impl A2Responder {
    /// Creates a responder awaiting an A1 query.
    pub fn new(max_body_len: usize) -> A2Responder {
        A2Responder {
            reader: FrameReader::new(max_body_len),
            writer: FrameWriter::new(),
            writer_started: false,
            query: None,
        }
    }

    /// Drives the read of the incoming A1. The query's address lands in
    /// `buf[..result.address_len]`.
    pub fn poll_query(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
    ) -> Result<Progress<QueryResult>, SaltError> {
        let n = match self.reader.poll(stream, buf)? {
            Progress::Pending => return Ok(Progress::Pending),
            Progress::Ready(n) => n,
        };
        let a1 = wire::decode_a1(&buf[..n])?;
        let address_len = a1.address.len();
        buf.copy_within(n - address_len..n, 0);
        let result = QueryResult { address_type: a1.address_type, address_len };
        self.query = Some(result);
        Ok(Progress::Ready(result))
    }

    /// Drives the write of the A2 response. Call after [`A2Responder::poll_query`]
    /// has returned `Progress::Ready`.
    pub fn poll_respond(
        &mut self,
        stream: &mut dyn Transport,
        buf: &mut [u8],
        pairs: &[A2Pair],
    ) -> Result<Progress<()>, SaltError> {
        if !self.writer_started {
            let len = wire::encode_a2(buf, true, pairs)?;
            self.writer.start(len);
            self.writer_started = true;
        }
        self.writer.poll(stream, buf)
    }
}

/// Convenience re-export so callers working purely with discovery do not
/// also need to import the wire module for the pair type.
pub use crate::wire::A2;
