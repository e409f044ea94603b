//! Dialing: turning an endpoint string and a [`Config`] into a connected
//! [`Client`], across TCP, Unix domain sockets, and HTTP-CONNECT-upgraded
//! TCP.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

use crate::addr::{self, Scheme};
use crate::client::{Client, Config, Error};
use crate::option::SessionOption;

async fn with_connect_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, Error>
where
    F: std::future::Future<Output = Result<T, Error>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::ConnectTimeout),
    }
}

pub async fn dial_tcp(addr: &str, option: SessionOption) -> Result<Client, Error> {
    with_connect_timeout(option.connection_timeout, async {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Client::new(Box::new(read_half), Box::new(write_half), option).await
    })
    .await
}

pub async fn dial_unix(path: &str, option: SessionOption) -> Result<Client, Error> {
    with_connect_timeout(option.connection_timeout, async {
        let stream = UnixStream::connect(path).await?;
        let (read_half, write_half) = stream.into_split();
        Client::new(Box::new(read_half), Box::new(write_half), option).await
    })
    .await
}

/// Dials `addr` over TCP, sends an HTTP `CONNECT rpc_path` request, and
/// hands the same socket to the normal client construction once the
/// server answers `200`. Lets an RPC service live behind a plain HTTP
/// reverse proxy that only understands `CONNECT`.
pub async fn dial_http(addr: &str, rpc_path: &str, option: SessionOption) -> Result<Client, Error> {
    with_connect_timeout(option.connection_timeout, async {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!("CONNECT {rpc_path} HTTP/1.0\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;

        let mut response = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(Error::Protocol("connection closed during HTTP upgrade".into()));
            }
            response.push(byte[0]);
            if response.ends_with(b"\r\n\r\n") {
                break;
            }
            if response.len() > 8192 {
                return Err(Error::Protocol("HTTP upgrade response too large".into()));
            }
        }
        let text = String::from_utf8_lossy(&response);
        if !text.contains("200 Connected to RPC server") {
            return Err(Error::Protocol(format!("HTTP upgrade failed: {}", text.lines().next().unwrap_or(""))));
        }

        let (read_half, write_half) = stream.into_split();
        Client::new(Box::new(read_half), Box::new(write_half), option).await
    })
    .await
}

/// Parses `endpoint` and dials it with whatever transport its scheme names.
pub async fn xdial(endpoint: &str, config: &Config) -> Result<Client, Error> {
    let (scheme, addr) = addr::parse(endpoint).map_err(Error::Addr)?;
    match scheme {
        Scheme::Tcp => dial_tcp(addr, config.option).await,
        Scheme::Unix => dial_unix(addr, config.option).await,
        Scheme::Http => dial_http(addr, &config.rpc_path, config.option).await,
    }
}
