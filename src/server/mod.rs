//! The request-dispatching server: accepts connections, reads the session
//! option once per connection, then loops reading `(header, body)`
//! frames, fanning each one out to its own task so slow handlers don't
//! block the rest of the connection. Every connection gets one writer,
//! guarded by a mutex, since replies can finish in any order.

pub mod config;
pub mod heartbeat;

pub use config::Config;
pub use heartbeat::heartbeat;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::codec::{self, FrameReader, FrameWriter, Header};
use crate::option::{self, SessionOption};
use crate::service::{self, ServiceBinding, ServiceRegistry};
use crate::transport::{BoxedReader, BoxedWriter};

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            from()
            display("I/O error: {}", err)
        }
        Codec(err: codec::Error) {
            from()
            display("codec error: {}", err)
        }
        Option(err: option::Error) {
            from()
            display("session option error: {}", err)
        }
        Service(err: service::Error) {
            from()
            display("service error: {}", err)
        }
        Protocol(message: String) {
            display("protocol error: {}", message)
        }
    }
}

/// Owns a [`ServiceRegistry`] and knows how to drive accepted connections
/// against it.
pub struct Server {
    registry: ServiceRegistry,
    config: Arc<Config>,
}

impl Default for Server {
    fn default() -> Self {
        Server::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Server {
            registry: ServiceRegistry::new(),
            config: Config::default().into(),
        }
    }

    pub fn with_config(config: Arc<Config>) -> Self {
        Server {
            registry: ServiceRegistry::new(),
            config,
        }
    }

    pub fn register(&self, binding: ServiceBinding) -> Result<(), Error> {
        self.registry.register(binding).map_err(Error::Service)
    }

    /// Accepts connections from `listener` forever, spawning one task per
    /// connection. Returns only if `accept` itself errors.
    pub async fn serve_tcp(self: Arc<Self>, listener: TcpListener) -> Result<(), Error> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("accepted connection from {}", peer);
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(err) = this.handle_tcp(stream).await {
                    warn!("connection from {} ended: {}", peer, err);
                }
            });
        }
    }

    pub async fn serve_unix(self: Arc<Self>, listener: UnixListener) -> Result<(), Error> {
        loop {
            let (stream, _addr) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(err) = this.handle_unix(stream).await {
                    warn!("unix connection ended: {}", err);
                }
            });
        }
    }

    async fn handle_tcp(self: Arc<Self>, mut stream: TcpStream) -> Result<(), Error> {
        self.maybe_upgrade_http(&mut stream).await?;
        let (read_half, write_half) = stream.into_split();
        self.serve_connection(Box::new(read_half), Box::new(write_half)).await
    }

    async fn handle_unix(self: Arc<Self>, stream: UnixStream) -> Result<(), Error> {
        let (read_half, write_half) = stream.into_split();
        self.serve_connection(Box::new(read_half), Box::new(write_half)).await
    }

    /// If the connection opens with an HTTP `CONNECT <rpc_path>` request,
    /// answers it and leaves the socket ready for the raw protocol to take
    /// over. Otherwise leaves the stream untouched.
    async fn maybe_upgrade_http(&self, stream: &mut TcpStream) -> Result<(), Error> {
        let mut peek_buf = [0u8; 7];
        let n = stream.peek(&mut peek_buf).await?;
        if n < 7 || &peek_buf[..7] != b"CONNECT" {
            return Ok(());
        }

        let mut request = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(Error::Protocol("connection closed during HTTP CONNECT".into()));
            }
            request.push(byte[0]);
            if request.ends_with(b"\r\n\r\n") {
                break;
            }
            if request.len() > 8192 {
                return Err(Error::Protocol("HTTP CONNECT request too large".into()));
            }
        }

        let mut headers = [httparse::EMPTY_HEADER; 16];
        let mut parsed = httparse::Request::new(&mut headers);
        parsed
            .parse(&request)
            .map_err(|_| Error::Protocol("malformed HTTP CONNECT request".into()))?;

        let path = parsed.path.unwrap_or("");
        if parsed.method != Some("CONNECT") || path != self.config.rpc_path {
            stream
                .write_all(b"HTTP/1.0 404 Not Found\r\n\r\n")
                .await?;
            return Err(Error::Protocol(format!("unexpected HTTP request to {:?}", path)));
        }

        stream
            .write_all(b"HTTP/1.0 200 Connected to RPC server\r\n\r\n")
            .await?;
        Ok(())
    }

    async fn serve_connection(self: Arc<Self>, reader: BoxedReader, writer: BoxedWriter) -> Result<(), Error> {
        let mut frame_reader = FrameReader::new(reader);

        let mut option_buf = [0u8; option::ENCODED_LEN];
        frame_reader.read_exact_raw(&mut option_buf).await?;
        let option = SessionOption::decode(&option_buf)?;

        let writer = Arc::new(Mutex::new(FrameWriter::new(writer)));
        let mut handlers: JoinSet<()> = JoinSet::new();

        loop {
            let header = match frame_reader.read_header().await {
                Ok(header) => header,
                Err(codec::Error::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => {
                    debug!("connection loop ending: {}", err);
                    break;
                }
            };

            match self.registry.lookup(&header.service_method) {
                Ok((binding, method_name)) => {
                    let args = match frame_reader.read_body_raw().await {
                        Ok(args) => args,
                        Err(err) => {
                            debug!("failed reading call body: {}", err);
                            break;
                        }
                    };
                    let writer = writer.clone();
                    let handle_timeout = option.handle_timeout;
                    handlers.spawn(dispatch(binding, method_name, header, args, writer, handle_timeout));
                }
                Err(_) => {
                    if let Err(err) = frame_reader.discard_body().await {
                        debug!("failed discarding body of unresolved call: {}", err);
                        break;
                    }
                    let mut reply_header = header.clone();
                    reply_header.error = format!("rpc: can't find service/method {}", header.service_method);
                    let writer = writer.clone();
                    handlers.spawn(async move {
                        let mut writer = writer.lock().await;
                        if let Err(err) = writer.write_frame(&reply_header, &()).await {
                            debug!("failed writing not-found reply: {}", err);
                        }
                    });
                }
            }
        }

        while handlers.join_next().await.is_some() {}
        let mut writer = writer.lock().await;
        writer.close().await?;
        Ok(())
    }
}

/// Runs one call to completion and writes its reply. If `handle_timeout`
/// elapses first, writes a timeout reply instead and lets the call keep
/// running in the background; the `responded` flag, flipped with a single
/// compare-and-swap, guarantees exactly one of the two ever gets to write.
async fn dispatch(
    binding: Arc<ServiceBinding>,
    method_name: String,
    header: Header,
    args: Vec<u8>,
    writer: Arc<Mutex<FrameWriter<BoxedWriter>>>,
    handle_timeout: std::time::Duration,
) {
    let responded = Arc::new(AtomicBool::new(false));

    let handler_writer = writer.clone();
    let handler_header = header.clone();
    let handler_responded = responded.clone();
    let handler = tokio::spawn(async move {
        let outcome = match binding.method(&method_name) {
            Some(method) => method.invoke(args).await,
            None => Err(format!("rpc: method {} vanished mid-call", method_name)),
        };

        if handler_responded
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mut reply_header = handler_header;
        let body = match outcome {
            Ok(body) => body,
            Err(message) => {
                reply_header.error = message;
                Vec::new()
            }
        };
        let mut writer = handler_writer.lock().await;
        if let Err(err) = writer.write_frame_raw(&reply_header, &body).await {
            warn!("failed writing reply for {}: {}", reply_header.service_method, err);
        }
    });

    if handle_timeout.is_zero() {
        let _ = handler.await;
        return;
    }

    tokio::select! {
        result = handler => {
            if let Err(err) = result {
                warn!("handler for {} panicked: {}", header.service_method, err);
            }
        }
        _ = tokio::time::sleep(handle_timeout) => {
            if responded.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                let mut reply_header = header.clone();
                reply_header.error = format!(
                    "rpc: method {} timed out after {:?}",
                    header.service_method, handle_timeout
                );
                let mut writer = writer.lock().await;
                if let Err(err) = writer.write_frame(&reply_header, &()).await {
                    warn!("failed writing timeout reply for {}: {}", header.service_method, err);
                }
            }
            // Otherwise the handler had already won the race and is writing
            // its own reply; it keeps running to completion in the
            // background either way.
        }
    }
}
