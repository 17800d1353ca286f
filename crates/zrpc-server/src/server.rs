use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use zrpc_common::transport::{read_frame, write_message};
use zrpc_common::{Codec, Header, Options, Result, RpcError, MAGIC};

use crate::service::{MethodFn, Service};

/// zRPC server: a concurrent map of registered services plus the serve loop
/// that multiplexes many in-flight requests per connection.
pub struct Server {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Server { services: RwLock::new(HashMap::new()) }
    }

    /// Publishes a service. Registration is insert-or-fail: a duplicate name
    /// returns an error and leaves the original in place.
    pub fn register(&self, name: impl Into<String>, service: Service) -> Result<()> {
        let name = name.into();
        let mut services = self.services.write().unwrap();
        if services.contains_key(&name) {
            return Err(RpcError::DuplicateService(name));
        }
        services.insert(name, Arc::new(service));
        Ok(())
    }

    /// Accepts connections until the listener fails, serving each connection
    /// in its own task.
    pub async fn accept(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("rpc server: accept error: {e}");
                    return;
                }
            };
            debug!("rpc server: connection from {peer}");
            let server = self.clone();
            tokio::spawn(async move {
                server.serve_conn(stream).await;
            });
        }
    }

    /// Serves one connection: reads the handshake, then dispatches requests
    /// until the client hangs up. Blocks until all handlers have finished.
    pub async fn serve_conn(self: Arc<Self>, mut stream: TcpStream) {
        let opt_bytes = match read_frame(&mut stream).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("rpc server: options error: {e}");
                return;
            }
        };
        let opt: Options = match serde_json::from_slice(&opt_bytes) {
            Ok(opt) => opt,
            Err(e) => {
                warn!("rpc server: options error: {e}");
                return;
            }
        };
        if opt.magic != MAGIC {
            warn!("rpc server: invalid magic number {:#x}", opt.magic);
            return;
        }
        let codec = match Codec::from_type(&opt.codec_type) {
            Some(codec) => codec,
            None => {
                warn!("rpc server: invalid codec type {}", opt.codec_type);
                return;
            }
        };

        self.serve_codec(stream, codec, opt.handle_timeout).await;
    }

    /// The read loop. A header-level failure terminates the connection; a
    /// dispatch failure is answered in-band and the loop continues.
    async fn serve_codec(&self, stream: TcpStream, codec: Codec, handle_timeout: Duration) {
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let mut handlers = JoinSet::new();

        loop {
            let head = match read_frame(&mut reader).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    if !is_eof(&e) {
                        warn!("rpc server: read header error: {e}");
                    }
                    break;
                }
            };
            let header: Header = match codec.decode(&head) {
                Ok(header) => header,
                Err(e) => {
                    warn!("rpc server: read header error: {e}");
                    break;
                }
            };
            let body = match read_frame(&mut reader).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("rpc server: read body error: {e}");
                    break;
                }
            };

            let method = match self.find_method(&header.service_method) {
                Ok(method) => method,
                Err(error) => {
                    let mut header = header;
                    header.error = error;
                    if let Err(e) = send_response(&writer, &codec, &header, &[], None).await {
                        warn!("rpc server: write response error: {e}");
                    }
                    continue;
                }
            };

            handlers.spawn(handle_request(
                codec.clone(),
                writer.clone(),
                header,
                body,
                method,
                handle_timeout,
            ));
        }

        // Wait for in-flight handlers before dropping the connection.
        // Handlers detached by a handle timeout are not tracked here.
        while handlers.join_next().await.is_some() {}
    }

    /// Splits `"<service>.<method>"` at the last dot and resolves the
    /// handler. Errors are in-band strings echoed back on the request's seq.
    fn find_method(&self, service_method: &str) -> std::result::Result<MethodFn, String> {
        let (service_name, method_name) = service_method.rsplit_once('.').ok_or_else(|| {
            format!("rpc server: service/method request ill-formed: {service_method}")
        })?;

        let service = self
            .services
            .read()
            .unwrap()
            .get(service_name)
            .cloned()
            .ok_or_else(|| format!("rpc server: can't find service {service_name}"))?;

        service
            .get(method_name)
            .ok_or_else(|| format!("rpc server: can't find method {method_name}"))
    }
}

/// Runs one request. With a handle timeout the handler races a timer: the
/// loser's response write is suppressed by the `responded` flag, so exactly
/// one response leaves for this seq.
async fn handle_request(
    codec: Codec,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    header: Header,
    body: Vec<u8>,
    method: MethodFn,
    handle_timeout: Duration,
) {
    let responded = Arc::new(AtomicBool::new(false));

    let mut handler = tokio::spawn({
        let codec = codec.clone();
        let writer = writer.clone();
        let responded = responded.clone();
        let header = header.clone();
        async move {
            let result = method(codec.clone(), body).await;
            let outcome = match result {
                Ok(reply) => send_response(&writer, &codec, &header, &reply, Some(&responded)).await,
                Err(e) => {
                    let mut header = header;
                    header.error = e.to_string();
                    send_response(&writer, &codec, &header, &[], Some(&responded)).await
                }
            };
            if let Err(e) = outcome {
                warn!("rpc server: write response error: {e}");
            }
        }
    });

    if handle_timeout.is_zero() {
        let _ = (&mut handler).await;
        return;
    }

    tokio::select! {
        _ = &mut handler => {}
        _ = tokio::time::sleep(handle_timeout) => {
            // The handler task keeps running detached; its late response is
            // dropped by the responded flag.
            let mut header = header;
            header.error =
                format!("rpc server: request handle timeout: expect within {handle_timeout:?}");
            if let Err(e) = send_response(&writer, &codec, &header, &[], Some(&responded)).await {
                warn!("rpc server: write response error: {e}");
            }
        }
    }
}

/// Writes one response (header frame + body frame) under the send lock.
/// When a `responded` flag is supplied, the first writer wins and later
/// attempts for the same request are silently dropped.
async fn send_response(
    writer: &Mutex<OwnedWriteHalf>,
    codec: &Codec,
    header: &Header,
    reply: &[u8],
    responded: Option<&AtomicBool>,
) -> Result<()> {
    let head = codec.encode(header)?;
    let body = if reply.is_empty() { codec.encode(&())? } else { reply.to_vec() };

    let mut writer = writer.lock().await;
    if let Some(flag) = responded {
        if flag.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
    }
    write_message(&mut *writer, &head, &body).await
}

fn is_eof(err: &RpcError) -> bool {
    matches!(err, RpcError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
}
