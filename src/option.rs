//! The session option preamble: the one fixed-layout message sent once
//! per connection, before either side knows anything else about the
//! peer. It has to be self-describing on its own terms since it is what
//! announces which body codec the rest of the connection will use.

use std::convert::TryFrom;
use std::io;
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Marks a connection as speaking this protocol family. Chosen at random,
/// just needs to be unlikely to collide with a peer speaking something else.
pub const MAGIC: u32 = 0x6d65_7368;

/// Encoded size of a [`SessionOption`]: magic(4) + codec tag(1) +
/// connection timeout millis(8) + handle timeout millis(8).
pub const ENCODED_LEN: usize = 4 + 1 + 8 + 8;

/// Names the body codec used for every `(header, body)` frame on a
/// connection after the option preamble. New variants can be added without
/// breaking already-connected peers, since the tag is read before anything
/// that depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecType {
    /// Length-prefixed `bincode` encoding of [`crate::codec::Header`] and
    /// of whatever argument/reply type a method was registered with.
    Binary = 0,
}

impl TryFrom<u8> for CodecType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(CodecType::Binary),
            other => Err(Error::UnknownCodec(other)),
        }
    }
}

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            from()
            display("I/O error reading session option: {}", err)
        }
        BadMagic(got: u32) {
            display("bad magic number {:#x}, expected {:#x}", got, MAGIC)
        }
        UnknownCodec(tag: u8) {
            display("unknown codec type tag {}", tag)
        }
    }
}

/// Sent once, by the client, immediately after the connection opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOption {
    pub magic: u32,
    pub codec_type: CodecType,
    /// Bounds both dialing and client construction (up to the point the
    /// receive task is spawned). Not consulted again after that.
    pub connection_timeout: Duration,
    /// Read only by the server: bounds how long a single handler may run
    /// before the dispatcher sends a timeout response on its behalf.
    /// Zero means "no per-call timeout".
    pub handle_timeout: Duration,
}

impl Default for SessionOption {
    fn default() -> Self {
        SessionOption {
            magic: MAGIC,
            codec_type: CodecType::Binary,
            connection_timeout: Duration::from_secs(10),
            handle_timeout: Duration::ZERO,
        }
    }
}

impl SessionOption {
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut buf = Vec::with_capacity(ENCODED_LEN);
        buf.write_u32::<BigEndian>(self.magic).unwrap();
        buf.write_u8(self.codec_type as u8).unwrap();
        buf.write_u64::<BigEndian>(self.connection_timeout.as_millis() as u64)
            .unwrap();
        buf.write_u64::<BigEndian>(self.handle_timeout.as_millis() as u64)
            .unwrap();
        let mut out = [0u8; ENCODED_LEN];
        out.copy_from_slice(&buf);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut cur = io::Cursor::new(buf);
        let magic = cur.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let codec_type = CodecType::try_from(cur.read_u8()?)?;
        let connection_timeout = Duration::from_millis(cur.read_u64::<BigEndian>()?);
        let handle_timeout = Duration::from_millis(cur.read_u64::<BigEndian>()?);
        Ok(SessionOption {
            magic,
            codec_type,
            connection_timeout,
            handle_timeout,
        })
    }
}
