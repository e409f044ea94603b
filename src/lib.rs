//! An asynchronous RPC framework: a multiplexed client, a
//! request-dispatching server, and a load-balancing multi-endpoint facade
//! ([`xclient::XClient`]) over pluggable service discovery.
//!
//! The wire format is two layers: a fixed-size [`option::SessionOption`]
//! preamble sent once per connection, announcing the body codec and the
//! timeouts in effect, followed by any number of length-prefixed
//! `(header, body)` frames (see [`codec`]).

pub mod addr;
pub mod client;
pub mod codec;
pub mod discovery;
pub mod error;
pub mod httpclient;
pub mod option;
pub mod server;
pub mod service;
pub mod transport;
pub mod xclient;

pub use client::Client;
pub use codec::Header;
pub use discovery::{Discovery, RegistryDiscovery, SelectMode, StaticDiscovery};
pub use error::{Error, Result};
pub use option::{CodecType, SessionOption};
pub use server::Server;
pub use service::{ServiceBinding, ServiceBuilder, ServiceRegistry};
pub use xclient::XClient;
