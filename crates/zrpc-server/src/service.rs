use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use zrpc_common::{Codec, Result};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A registered method: decodes the argument from body bytes, invokes the
/// handler, and encodes the reply back to body bytes with the connection's
/// codec.
#[derive(Clone)]
pub(crate) struct MethodFn(Arc<dyn Fn(Codec, Vec<u8>) -> BoxFuture<Result<Vec<u8>>> + Send + Sync>);

impl std::fmt::Debug for MethodFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MethodFn")
    }
}

impl std::ops::Deref for MethodFn {
    type Target = dyn Fn(Codec, Vec<u8>) -> BoxFuture<Result<Vec<u8>>> + Send + Sync;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// A named group of methods, addressable as `"<service>.<method>"` once
/// registered on a [`Server`].
///
/// Handlers are plain async closures taking one deserializable argument and
/// returning one serializable reply. A handler error is reported to the
/// caller in-band; the connection continues.
///
/// # Example
///
/// ```
/// use zrpc_server::Service;
///
/// let service = Service::new()
///     .method("Echo", |msg: String| async move { Ok(msg) });
/// assert!(service.has_method("Echo"));
/// ```
///
/// [`Server`]: crate::Server
#[derive(Default)]
pub struct Service {
    methods: HashMap<String, MethodFn>,
}

impl Service {
    pub fn new() -> Self {
        Service { methods: HashMap::new() }
    }

    /// Adds a method. A duplicate name replaces the previous handler.
    pub fn method<A, R, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let wrapped: MethodFn = MethodFn(Arc::new(move |codec: Codec, body: Vec<u8>| {
            let handler = handler.clone();
            Box::pin(async move {
                // A request body that fails to decode is reported to the
                // caller verbatim; the connection continues.
                let args: A = codec.decode(&body)?;
                let reply = handler(args).await?;
                codec.encode(&reply)
            })
        }));
        self.methods.insert(name.into(), wrapped);
        self
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }
}
