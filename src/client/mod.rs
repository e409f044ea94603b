//! The multiplexed client: one connection, many concurrent in-flight
//! calls, correlated by sequence number so responses may come back in any
//! order.
//!
//! Two locks guard a [`Client`]: `send` around the write half (so a whole
//! request — allocate a sequence number, register the pending call, write
//! the frame — goes out atomically), and `state` around the pending-call
//! table. Wherever both are needed, `send` is always acquired first; this
//! ordering is what keeps [`terminate`] from deadlocking against an
//! in-flight `go`.

mod config;
mod dial;

pub use config::Config;
pub use dial::xdial;

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use crate::codec::{self, FrameReader, FrameWriter, Header};
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
        Addr(err: crate::addr::Error) {
            from()
            display("address error: {}", err)
        }
        Encode(err: bincode::Error) {
            display("argument encode error: {}", err)
        }
        Decode(err: bincode::Error) {
            display("reply decode error: {}", err)
        }
        /// The remote side reported an error in the response header.
        Remote(message: String) {
            display("remote error: {}", message)
        }
        ShutDown {
            display("client is shut down")
        }
        ConnectTimeout {
            display("timed out connecting")
        }
        CallTimeout {
            display("call timed out waiting for a reply")
        }
        Protocol(message: String) {
            display("protocol error: {}", message)
        }
    }
}

/// One outstanding call: its sequence number and the channel its reply (or
/// failure) will arrive on.
pub struct Call {
    pub seq: u64,
    rx: oneshot::Receiver<RawOutcome>,
}

type RawOutcome = Result<Vec<u8>, String>;

struct ClientState {
    next_seq: u64,
    pending: HashMap<u64, oneshot::Sender<RawOutcome>>,
    /// Set by `close()`: no new calls may be registered.
    closing: bool,
    /// Set once the receive task observes a transport error and drains the
    /// pending table. Distinct from `closing` so `is_available` can tell
    /// "we gave up" apart from "the peer went away".
    shutdown: bool,
}

impl ClientState {
    fn new() -> Self {
        ClientState {
            next_seq: 0,
            pending: HashMap::new(),
            closing: false,
            shutdown: false,
        }
    }
}

/// A connection to one RPC server, multiplexing any number of concurrent
/// calls over it.
pub struct Client {
    send: Arc<Mutex<FrameWriter<BoxedWriter>>>,
    state: Arc<Mutex<ClientState>>,
}

impl Client {
    pub(crate) async fn new(reader: BoxedReader, mut writer: BoxedWriter, option: crate::option::SessionOption) -> Result<Client, Error> {
        use tokio::io::AsyncWriteExt;
        writer.write_all(&option.encode()).await?;
        writer.flush().await?;

        let send = Arc::new(Mutex::new(FrameWriter::new(writer)));
        let state = Arc::new(Mutex::new(ClientState::new()));
        let frame_reader = FrameReader::new(reader);

        tokio::spawn(receive_loop(frame_reader, send.clone(), state.clone()));

        Ok(Client { send, state })
    }

    /// Submits a call and returns immediately with a handle to its eventual
    /// reply, without waiting for it. `send` is held for the whole
    /// submission so sequence allocation, pending-table registration, and
    /// the wire write happen as one atomic step from another caller's
    /// point of view.
    pub async fn go<Req: Serialize>(&self, service_method: &str, args: &Req) -> Result<Call, Error> {
        let body = bincode::serialize(args).map_err(Error::Encode)?;
        self.go_raw(service_method, body).await
    }

    async fn go_raw(&self, service_method: &str, body: Vec<u8>) -> Result<Call, Error> {
        let (tx, rx) = oneshot::channel();
        let mut send = self.send.lock().await;

        let seq = {
            let mut state = self.state.lock().await;
            if state.closing || state.shutdown {
                return Err(Error::ShutDown);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.insert(seq, tx);
            seq
        };

        let header = Header::request(service_method, seq);
        if let Err(err) = send.write_frame_raw(&header, &body).await {
            let mut state = self.state.lock().await;
            if let Some(tx) = state.pending.remove(&seq) {
                let _ = tx.send(Err(err.to_string()));
            }
            return Err(Error::Codec(err));
        }

        Ok(Call { seq, rx })
    }

    /// Sends a call and waits for its reply, raw bytes in and out. The
    /// typed [`Client::call`] is a thin wrapper around this.
    pub async fn call_raw(
        &self,
        service_method: &str,
        args: Vec<u8>,
        deadline: Option<Duration>,
    ) -> Result<Vec<u8>, Error> {
        let call = self.go_raw(service_method, args).await?;
        let outcome = match deadline {
            Some(d) => match tokio::time::timeout(d, call.rx).await {
                Ok(recv) => recv.map_err(|_| Error::ShutDown)?,
                Err(_) => {
                    self.forget(call.seq).await;
                    return Err(Error::CallTimeout);
                }
            },
            None => call.rx.await.map_err(|_| Error::ShutDown)?,
        };
        outcome.map_err(Error::Remote)
    }

    /// Sends a call and waits for its typed reply. `deadline` is this
    /// call's own time budget, independent of the connection's handle
    /// timeout (which is announced once, at dial time, for the server to
    /// enforce on its own handlers).
    pub async fn call<Req: Serialize, Res: DeserializeOwned>(
        &self,
        service_method: &str,
        args: &Req,
        deadline: Option<Duration>,
    ) -> Result<Res, Error> {
        let body = bincode::serialize(args).map_err(Error::Encode)?;
        let reply = self.call_raw(service_method, body, deadline).await?;
        bincode::deserialize(&reply).map_err(Error::Decode)
    }

    async fn forget(&self, seq: u64) {
        self.state.lock().await.pending.remove(&seq);
    }

    pub async fn is_available(&self) -> bool {
        let state = self.state.lock().await;
        !state.closing && !state.shutdown
    }

    /// Marks the client closing and shuts down the write half. The receive
    /// task will observe the resulting transport error on its own and
    /// drain any calls still pending.
    pub async fn close(&self) -> Result<(), Error> {
        {
            let mut state = self.state.lock().await;
            if state.closing {
                return Err(Error::ShutDown);
            }
            state.closing = true;
        }
        let mut send = self.send.lock().await;
        send.close().await?;
        Ok(())
    }
}

async fn receive_loop(mut reader: FrameReader<BoxedReader>, send: Arc<Mutex<FrameWriter<BoxedWriter>>>, state: Arc<Mutex<ClientState>>) {
    loop {
        let header = match reader.read_header().await {
            Ok(header) => header,
            Err(err) => {
                debug!("client receive loop ending: {}", err);
                terminate(&send, &state, err.to_string()).await;
                return;
            }
        };

        let tx = {
            let mut state = state.lock().await;
            state.pending.remove(&header.seq)
        };

        let tx = match tx {
            Some(tx) => tx,
            None => {
                // No one is waiting for this seq (e.g. its caller already
                // timed out): still have to consume the body to keep the
                // framing in sync with the peer.
                if let Err(err) = reader.discard_body().await {
                    terminate(&send, &state, err.to_string()).await;
                    return;
                }
                continue;
            }
        };

        if header.is_error() {
            let _ = reader.discard_body().await;
            let _ = tx.send(Err(header.error));
            continue;
        }

        match reader.read_body_raw().await {
            Ok(body) => {
                let _ = tx.send(Ok(body));
            }
            Err(err) => {
                let _ = tx.send(Err(format!("reading reply body: {}", err)));
            }
        }
    }
}

/// Drains every pending call with `err`, in the send-then-state lock order
/// every other multi-lock operation on [`Client`] uses.
async fn terminate(send: &Arc<Mutex<FrameWriter<BoxedWriter>>>, state: &Arc<Mutex<ClientState>>, err: String) {
    let _send = send.lock().await;
    let mut state = state.lock().await;
    state.shutdown = true;
    for (_, tx) in state.pending.drain() {
        let _ = tx.send(Err(err.clone()));
    }
}
