//! Implementation of the [Salt Channel v2](https://github.com/assaabloy-ppi/salt-channel)
//! secure-channel protocol: a mutually authenticated, forward-secret
//! transport-agnostic handshake plus an encrypted, framed application-message
//! channel, for use over any ordered, reliable byte stream.
//!
//! This crate drives no I/O on its own. Every operation takes the caller's
//! transport (anything implementing [`std::io::Read`] + [`std::io::Write`])
//! and a scratch buffer explicitly, and returns [`io_pump::Progress::Pending`]
//! instead of blocking when the transport is not ready -- call the same
//! operation again once it is. This library uses `sodiumoxide` internally;
//! application code should call
//! [`sodiumoxide::init()`](https://docs.rs/sodiumoxide/latest/sodiumoxide/fn.init.html)
//! before performing any handshakes.
//!
//! Start with [`session::Session`]: construct one with [`session::Session::new_host`]
//! or [`session::Session::new_client`], drive [`session::Session::advance`] to
//! completion, then exchange messages with [`session::Session::write_app`],
//! [`session::Session::write_multi_app`], and [`session::Session::read`].
//! [`discovery`] offers the unauthenticated A1/A2 exchange for probing a host
//! before committing to a handshake.

#![deny(missing_docs)]

extern crate sodiumoxide;

pub mod crypto;
pub mod discovery;
pub mod error;
pub mod framer;
pub mod handshake;
pub mod io_pump;
pub mod nonce;
pub mod session;
pub mod transport;
pub mod wire;

pub use crypto::{CryptoProvider, Sodium};
pub use error::SaltError;
pub use io_pump::Progress;
pub use session::{Role, Session};

#[cfg(test)]
extern crate partial_io;
#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
extern crate rand;
#[cfg(test)]
mod resilience_test;
