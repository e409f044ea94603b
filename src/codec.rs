//! The per-frame wire format: a `Header` followed by a body, each
//! length-prefixed so a reader never has to guess where one ends and the
//! next begins. The option preamble (see [`crate::option`]) is a separate,
//! fixed-layout message sent once before any of this.

use std::io;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

/// No frame body is allowed to claim more than this many bytes. Guards
/// against a corrupt or hostile length prefix driving an unbounded
/// allocation before a single byte of the body has even been read.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            from()
            display("I/O error: {}", err)
        }
        Encode(err: bincode::Error) {
            from()
            display("encode error: {}", err)
        }
        Decode(err: bincode::Error) {
            display("decode error: {}", err)
        }
        FrameTooLarge(len: u32) {
            display("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN)
        }
    }
}

/// Every call and every reply carries one of these. `error` is empty on
/// the wire unless this header accompanies a failed call; a nonempty
/// `error` means the body is the agreed void marker, not a real reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub service_method: String,
    pub seq: u64,
    pub error: String,
}

impl Header {
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Header {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Reads `(header, body)` frames off of any async byte stream.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn read_chunk(&mut self) -> Result<Vec<u8>, Error> {
        let mut len_buf = [0u8; 4];
        self.inner.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge(len));
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Reads a known number of raw bytes straight off the stream, ahead of
    /// any framing. Used once per connection, for the session option.
    pub async fn read_exact_raw(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.inner.read_exact(buf).await?;
        Ok(())
    }

    pub async fn read_header(&mut self) -> Result<Header, Error> {
        let buf = self.read_chunk().await?;
        bincode::deserialize(&buf).map_err(Error::Decode)
    }

    pub async fn read_body<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let buf = self.read_chunk().await?;
        bincode::deserialize(&buf).map_err(Error::Decode)
    }

    pub async fn read_body_raw(&mut self) -> Result<Vec<u8>, Error> {
        self.read_chunk().await
    }

    pub async fn discard_body(&mut self) -> Result<(), Error> {
        self.read_chunk().await.map(|_| ())
    }
}

/// Writes `(header, body)` frames to any async byte stream, buffering
/// between frames and flushing at the end of each one.
pub struct FrameWriter<W> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        FrameWriter {
            inner: BufWriter::new(inner),
        }
    }

    async fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.inner.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
        self.inner.write_all(bytes).await?;
        Ok(())
    }

    /// Writes a frame whose body is already encoded.
    pub async fn write_frame_raw(&mut self, header: &Header, body: &[u8]) -> Result<(), Error> {
        let header_bytes = bincode::serialize(header)?;
        let result: Result<(), Error> = async {
            self.write_chunk(&header_bytes).await?;
            self.write_chunk(body).await?;
            self.inner.flush().await?;
            Ok(())
        }
        .await;
        if result.is_err() {
            let _ = self.inner.shutdown().await;
        }
        result
    }

    /// Serializes `body` with the connection's codec and writes the frame.
    pub async fn write_frame<T: Serialize>(&mut self, header: &Header, body: &T) -> Result<(), Error> {
        let encoded = bincode::serialize(body)?;
        self.write_frame_raw(header, &encoded).await
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn frame_round_trips() {
        let mut buf = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buf);
            let header = Header::request("Arith.Sum", 1);
            writer.write_frame(&header, &(2i64, 3i64)).await.unwrap();
        }
        let mut reader = FrameReader::new(buf.as_slice());
        let header = reader.read_header().await.unwrap();
        assert_eq!(header.service_method, "Arith.Sum");
        assert_eq!(header.seq, 1);
        assert!(!header.is_error());
        let body: (i64, i64) = reader.read_body().await.unwrap();
        assert_eq!(body, (2, 3));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let mut reader = FrameReader::new(buf.as_slice());
        match reader.read_header().await {
            Err(Error::FrameTooLarge(len)) => assert_eq!(len, MAX_FRAME_LEN + 1),
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
    }
}
