//! The I/O pump (§4.4, component C3): drives a caller's non-blocking
//! transport to completion of one framed message, handling the 4-byte
//! length prefix, without performing any crypto or parsing until the whole
//! message has been assembled.

use std::io::{self, ErrorKind, Read, Write};

use crate::error::SaltError;
use crate::transport::Transport;
use crate::wire::SIZE_PREFIX_BYTES;

/// The result of one non-blocking pump step: either the operation completed
/// (with its value), or the transport would have blocked and the caller
/// must invoke the operation again once the transport is ready.
///
/// This is the "tri-state" from §5 minus the error case, which is carried by
/// the surrounding `Result`.
#[derive(Debug)]
pub enum Progress<T> {
    /// The operation completed.
    Ready(T),
    /// The transport was not ready; call the same operation again later.
    Pending,
}

impl<T> Progress<T> {
    /// True if this is [`Progress::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, Progress::Ready(_))
    }
}

/// Drives `stream.read(&mut target[filled..])` until either some bytes have
/// landed or the transport reports WouldBlock. Returns the number of bytes
/// newly read (always > 0 on `Progress::Ready`).
fn read_some<R: Read + ?Sized>(stream: &mut R, target: &mut [u8]) -> Result<Progress<usize>, SaltError> {
    loop {
        match stream.read(target) {
            Ok(0) => {
                return Err(SaltError::TransportFatal(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "transport closed mid-frame",
                )))
            }
            Ok(n) => return Ok(Progress::Ready(n)),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(Progress::Pending),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(SaltError::TransportFatal(e)),
        }
    }
}

/// Drives `stream.write(&target[sent..])` the same way, for one write call.
fn write_some<W: Write + ?Sized>(stream: &mut W, target: &[u8]) -> Result<Progress<usize>, SaltError> {
    loop {
        match stream.write(target) {
            Ok(0) => {
                return Err(SaltError::TransportFatal(io::Error::new(
                    ErrorKind::WriteZero,
                    "transport refused to accept any bytes",
                )))
            }
            Ok(n) => return Ok(Progress::Ready(n)),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(Progress::Pending),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(SaltError::TransportFatal(e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Length,
    Body,
    Done,
}

/// Resumable reader of one length-prefixed Salt Channel frame.
///
/// Reads the 4-byte little-endian size prefix, then reads exactly that many
/// body bytes into the caller-supplied buffer. Call [`FrameReader::poll`]
/// repeatedly (after the transport signals readiness) until it returns
/// `Progress::Ready`.
pub struct FrameReader {
    state: ReadState,
    len_buf: [u8; SIZE_PREFIX_BYTES],
    done: usize,
    body_len: usize,
    max_body_len: usize,
}

impl FrameReader {
    /// Creates a reader that rejects any declared body length over
    /// `max_body_len` (the caller's working buffer size) as a
    /// [`SaltError::ParseError`].
    pub fn new(max_body_len: usize) -> FrameReader {
        FrameReader {
            state: ReadState::Length,
            len_buf: [0; SIZE_PREFIX_BYTES],
            done: 0,
            body_len: 0,
            max_body_len,
        }
    }

    /// Resets the reader to read a fresh frame, reusing its allocation.
    pub fn reset(&mut self) {
        self.state = ReadState::Length;
        self.done = 0;
        self.body_len = 0;
    }

    /// Drives the read. On `Progress::Ready(n)`, `buf[..n]` holds the
    /// frame's body (type + flags + payload, size prefix excluded).
    pub fn poll(&mut self, stream: &mut dyn Transport, buf: &mut [u8]) -> Result<Progress<usize>, SaltError> {
        loop {
            match self.state {
                ReadState::Length => {
                    if self.done >= SIZE_PREFIX_BYTES {
                        let body_len = u32::from_le_bytes(self.len_buf) as usize;
                        if body_len > self.max_body_len {
                            return Err(SaltError::ParseError(
                                "declared frame size exceeds working buffer",
                            ));
                        }
                        self.body_len = body_len;
                        self.done = 0;
                        self.state = ReadState::Body;
                        continue;
                    }
                    match read_some(stream, &mut self.len_buf[self.done..SIZE_PREFIX_BYTES])? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => self.done += n,
                    }
                }
                ReadState::Body => {
                    if self.done >= self.body_len {
                        self.state = ReadState::Done;
                        continue;
                    }
                    match read_some(stream, &mut buf[self.done..self.body_len])? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => self.done += n,
                    }
                }
                ReadState::Done => {
                    let len = self.body_len;
                    self.reset();
                    return Ok(Progress::Ready(len));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Length,
    Body,
    Flush,
}

/// Resumable writer of one length-prefixed Salt Channel frame.
pub struct FrameWriter {
    state: WriteState,
    len_buf: [u8; SIZE_PREFIX_BYTES],
    done: usize,
    body_len: usize,
}

impl FrameWriter {
    /// Creates an idle writer. Call [`FrameWriter::start`] before polling.
    pub fn new() -> FrameWriter {
        FrameWriter {
            state: WriteState::Length,
            len_buf: [0; SIZE_PREFIX_BYTES],
            done: 0,
            body_len: 0,
        }
    }

    /// Begins writing a frame whose body is `body_len` bytes long, taken
    /// from the buffer passed to subsequent [`FrameWriter::poll`] calls.
    pub fn start(&mut self, body_len: usize) {
        self.len_buf = (body_len as u32).to_le_bytes();
        self.done = 0;
        self.body_len = body_len;
        self.state = WriteState::Length;
    }

    /// Drives the write of the frame started by [`FrameWriter::start`].
    /// `buf[..body_len]` must hold the same bytes across every call until
    /// this returns `Progress::Ready`.
    pub fn poll(&mut self, stream: &mut dyn Transport, buf: &[u8]) -> Result<Progress<()>, SaltError> {
        loop {
            match self.state {
                WriteState::Length => {
                    if self.done >= SIZE_PREFIX_BYTES {
                        self.done = 0;
                        self.state = WriteState::Body;
                        continue;
                    }
                    match write_some(stream, &self.len_buf[self.done..])? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => self.done += n,
                    }
                }
                WriteState::Body => {
                    if self.done >= self.body_len {
                        self.state = WriteState::Flush;
                        continue;
                    }
                    match write_some(stream, &buf[self.done..self.body_len])? {
                        Progress::Pending => return Ok(Progress::Pending),
                        Progress::Ready(n) => self.done += n,
                    }
                }
                WriteState::Flush => match stream.flush() {
                    Ok(()) => {
                        self.done = 0;
                        self.state = WriteState::Length;
                        return Ok(Progress::Ready(()));
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(Progress::Pending),
                    Err(e) => return Err(SaltError::TransportFatal(e)),
                },
            }
        }
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        FrameWriter::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame_over_a_plain_cursor() {
        let body = b"hello salt channel";
        let mut wire = Vec::new();
        wire.extend_from_slice(&(body.len() as u32).to_le_bytes());
        wire.extend_from_slice(body);

        let mut cursor = Cursor::new(wire);
        let mut reader = FrameReader::new(1024);
        let mut buf = [0u8; 1024];
        let n = match reader.poll(&mut cursor, &mut buf).unwrap() {
            Progress::Ready(n) => n,
            Progress::Pending => panic!("a Cursor never blocks"),
        };
        assert_eq!(&buf[..n], body);
    }

    #[test]
    fn rejects_a_frame_larger_than_the_working_buffer() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&1000u32.to_le_bytes());
        let mut cursor = Cursor::new(wire);
        let mut reader = FrameReader::new(16);
        let mut buf = [0u8; 16];
        assert!(matches!(reader.poll(&mut cursor, &mut buf), Err(SaltError::ParseError(_))));
    }

    #[test]
    fn writer_round_trips_through_reader() {
        let body = b"round trip";
        let mut sink = Cursor::new(Vec::new());
        let mut writer = FrameWriter::new();
        writer.start(body.len());
        loop {
            match writer.poll(&mut sink, body).unwrap() {
                Progress::Ready(()) => break,
                Progress::Pending => continue,
            }
        }

        sink.set_position(0);
        let mut cursor = sink;
        let mut reader = FrameReader::new(1024);
        let mut buf = [0u8; 1024];
        let n = match reader.poll(&mut cursor, &mut buf).unwrap() {
            Progress::Ready(n) => n,
            Progress::Pending => panic!("a Vec-backed Cursor never blocks"),
        };
        assert_eq!(&buf[..n], body);
    }
}
