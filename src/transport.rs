//! Type-erased halves of whatever stream a connection is carried over
//! (TCP, Unix domain socket, or a TCP socket that has just finished an
//! HTTP CONNECT upgrade). Letting the client and server work against
//! these instead of a concrete stream type means they don't need to know
//! or care which transport dialed them.

use tokio::io::{AsyncRead, AsyncWrite};

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;
