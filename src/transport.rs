//! The non-blocking transport contract (§6).
//!
//! Salt Channel drives I/O through a caller-supplied transport rather than
//! opening sockets itself. Rather than inventing a bespoke callback ABI for
//! "read(ctx, buf, n) -> bytes-or-pending-or-fatal", this crate reuses plain
//! `std::io::{Read, Write}` with the ordinary `ErrorKind::WouldBlock`
//! convention for "pending" -- exactly the technique the handshake loops in
//! this codebase already use. Any non-blocking `TcpStream`, serial port, or
//! in-memory duplex that implements `Read + Write` works as a
//! [`Transport`] with no adapter.
//!
//! A blocking transport also works (it simply never returns `WouldBlock`),
//! which the engine tolerates though does not prefer (§5).

use std::io::{Read, Write};

/// A full-duplex, non-blocking byte transport.
///
/// There is no separate trait method beyond `Read` and `Write` -- satisfying
/// both is the entire contract.
pub trait Transport: Read + Write {}

impl<T: Read + Write + ?Sized> Transport for T {}
