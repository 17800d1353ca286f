use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use zrpc_common::protocol::CONNECTED;
use zrpc_common::transport::{read_frame, write_frame, write_message};
use zrpc_common::{Codec, Header, Options, Result, RpcError, Seq};

/// Raw reply body bytes, or the error that finished the call.
type CallResult = Result<Vec<u8>>;

/// One in-flight call returned by [`Client::go`]. Await [`Call::wait`] for
/// the reply; dropping it abandons the call and the receive loop silently
/// discards the late response.
pub struct Call {
    pub seq: Seq,
    codec: Codec,
    done: oneshot::Receiver<CallResult>,
}

impl Call {
    /// Waits for completion and decodes the reply.
    pub async fn wait<R: DeserializeOwned>(self) -> Result<R> {
        let body = self.done.await.map_err(|_| RpcError::Shutdown)??;
        decode_reply(&self.codec, &body)
    }
}

fn decode_reply<R: DeserializeOwned>(codec: &Codec, body: &[u8]) -> Result<R> {
    codec.decode(body).map_err(|e| RpcError::ReadBody(e.to_string()))
}

#[derive(Debug)]
struct State {
    seq: Seq,
    pending: HashMap<Seq, oneshot::Sender<CallResult>>,
    closing: bool,
    shutdown: bool,
}

#[derive(Debug)]
struct Inner {
    codec: Codec,
    // Send lock: one complete (header, body) write per critical section.
    // Lock order is writer first, state second; the state lock is never held
    // across an await.
    writer: Mutex<OwnedWriteHalf>,
    state: StdMutex<State>,
    // The receive loop task, taken and aborted by close().
    recv_task: StdMutex<Option<JoinHandle<()>>>,
}

/// A zRPC client owning one connection.
///
/// Many calls may be in flight at once and the client may be shared across
/// tasks; responses are matched to callers by sequence number in a
/// background receive loop. Once [`Client::close`] is called or the
/// connection breaks, every outstanding and future call fails with
/// [`RpcError::Shutdown`] (or the terminating error).
#[derive(Debug)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Creates a client over an established stream: sends the handshake
    /// frame, then starts the receive loop.
    pub async fn new(mut stream: TcpStream, opt: Options) -> Result<Client> {
        let codec = Codec::from_type(&opt.codec_type)
            .ok_or_else(|| RpcError::InvalidCodec(opt.codec_type.clone()))?;

        let opt_bytes = serde_json::to_vec(&opt)?;
        write_frame(&mut stream, &opt_bytes).await?;
        stream.flush().await?;

        let (reader, writer) = stream.into_split();
        let inner = Arc::new(Inner {
            codec,
            writer: Mutex::new(writer),
            state: StdMutex::new(State {
                seq: 1, // 0 marks an invalid call
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            recv_task: StdMutex::new(None),
        });

        let recv_task = tokio::spawn(receive_loop(inner.clone(), reader));
        *inner.recv_task.lock().unwrap() = Some(recv_task);
        Ok(Client { inner })
    }

    /// Creates a client through an HTTP CONNECT tunnel: sends the CONNECT
    /// preamble, switches to the RPC protocol only on the expected status.
    pub async fn new_http(mut stream: TcpStream, opt: Options, rpc_path: &str) -> Result<Client> {
        stream
            .write_all(format!("CONNECT {rpc_path} HTTP/1.0\n\n").as_bytes())
            .await?;

        let status = read_line(&mut stream).await?;
        if status != format!("HTTP/1.0 {CONNECTED}") {
            return Err(RpcError::Connection(format!("unexpected HTTP response: {status}")));
        }
        // Consume the blank line terminating the response head.
        read_line(&mut stream).await?;

        Client::new(stream, opt).await
    }

    /// Starts an asynchronous call. The write happens under the send lock
    /// before this returns; completion is delivered through the returned
    /// [`Call`].
    pub async fn go<A: Serialize + ?Sized>(&self, service_method: &str, args: &A) -> Result<Call> {
        let body = self.inner.codec.encode(args)?;

        let mut writer = self.inner.writer.lock().await;
        let (seq, done) = self.register_call()?;

        let header = Header::request(service_method, seq);
        let head = match self.inner.codec.encode(&header) {
            Ok(head) => head,
            Err(e) => {
                self.remove_call(seq);
                return Err(e);
            }
        };
        if let Err(e) = write_message(&mut *writer, &head, &body).await {
            // The response for this seq can never be delivered; it may still
            // arrive on the wire and will be discarded by the receive loop.
            self.remove_call(seq);
            return Err(e);
        }

        Ok(Call { seq, codec: self.inner.codec.clone(), done })
    }

    /// Calls the named method and waits for the reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.go(service_method, args).await?.wait().await
    }

    /// Calls with a deadline. On expiry the call is removed from the pending
    /// set and fails locally; a late response is silently discarded.
    pub async fn call_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let call = self.go(service_method, args).await?;
        if timeout.is_zero() {
            return call.wait().await;
        }

        match tokio::time::timeout(timeout, call.done).await {
            Err(_) => {
                self.remove_call(call.seq);
                Err(RpcError::CallFailed("deadline exceeded".into()))
            }
            Ok(done) => {
                let body = done.map_err(|_| RpcError::Shutdown)??;
                decode_reply(&call.codec, &body)
            }
        }
    }

    /// Whether the client can still issue calls.
    pub fn is_available(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        !state.closing && !state.shutdown
    }

    /// Closes the connection. Idempotent: a second close reports
    /// [`RpcError::Shutdown`]. Outstanding calls are drained here with
    /// [`RpcError::Shutdown`].
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }

        // The receive loop may be parked on a read that only the peer could
        // unblock, so stop it directly. An aborted task never reaches its
        // own cleanup, so the pending calls are drained here.
        if let Some(recv_task) = self.inner.recv_task.lock().unwrap().take() {
            recv_task.abort();
        }
        terminate_calls(&self.inner, RpcError::Shutdown).await;

        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    fn register_call(&self) -> Result<(Seq, oneshot::Receiver<CallResult>)> {
        let mut state = self.inner.state.lock().unwrap();
        if state.closing || state.shutdown {
            return Err(RpcError::Shutdown);
        }
        let seq = state.seq;
        state.seq += 1;
        let (tx, rx) = oneshot::channel();
        state.pending.insert(seq, tx);
        Ok((seq, rx))
    }

    fn remove_call(&self, seq: Seq) -> Option<oneshot::Sender<CallResult>> {
        self.inner.state.lock().unwrap().pending.remove(&seq)
    }
}

/// Reads responses and completes pending calls until the connection breaks,
/// then drains whatever is left. A clean close aborts this task instead;
/// the close path does its own draining.
async fn receive_loop(inner: Arc<Inner>, mut reader: OwnedReadHalf) {
    let err = loop {
        let head = match read_frame(&mut reader).await {
            Ok(bytes) => bytes,
            Err(e) => break e,
        };
        let header: Header = match inner.codec.decode(&head) {
            Ok(header) => header,
            Err(e) => break e,
        };
        let body = match read_frame(&mut reader).await {
            Ok(bytes) => bytes,
            Err(e) => break e,
        };

        match inner.state.lock().unwrap().pending.remove(&header.seq) {
            // Cancelled or never fully sent; the body has already been
            // consumed, so just move on.
            None => debug!("rpc client: discarding response for seq {}", header.seq),
            Some(tx) => {
                let result = if header.error.is_empty() {
                    Ok(body)
                } else {
                    Err(RpcError::Remote(header.error))
                };
                let _ = tx.send(result);
            }
        }
    };

    // If close() raced the breakdown, the drained calls report Shutdown,
    // whatever read error the teardown surfaced as.
    let err = if inner.state.lock().unwrap().closing { RpcError::Shutdown } else { err };
    if !matches!(err, RpcError::Shutdown) {
        warn!("rpc client: receive loop terminated: {err}");
    }
    terminate_calls(&inner, err).await;
}

/// Marks the client shut down and finishes every pending call with the
/// terminating error. Takes the send lock first, then the state lock, the
/// same order as `go`.
async fn terminate_calls(inner: &Inner, err: RpcError) {
    let _writer = inner.writer.lock().await;
    let mut state = inner.state.lock().unwrap();
    state.shutdown = true;
    for (_, tx) in state.pending.drain() {
        let e = match &err {
            RpcError::Shutdown => RpcError::Shutdown,
            other => RpcError::Connection(other.to_string()),
        };
        let _ = tx.send(Err(e));
    }
}

async fn read_line(stream: &mut TcpStream) -> Result<String> {
    use tokio::io::AsyncReadExt;

    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
        if line.len() > 1024 {
            return Err(RpcError::Connection("http response line too long".into()));
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
