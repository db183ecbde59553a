//! Outbound invocations: the communicator and its proxies.
//!
//! A [`Communicator`] keeps one outgoing connection per remote endpoint.
//! Each connection has a reader task that matches replies to waiting
//! callers:
//!
//! 1. [`Proxy::invoke`] allocates a call id and parks a oneshot sender
//!    under it in the connection's pending map
//! 2. the request is encoded and sent
//! 3. the reader task decodes each reply, removes the sender for its call
//!    id and completes it
//! 4. the caller wakes up with the result, or gives up at the timeout
//!
//! When the connection closes, the reader drops every pending sender and
//! the waiting callers see [`RpcError::ConnectionLost`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use drobots_protocol::{
    Call, CallId, Codec, Envelope, JsonCodec, ObjectRef, Payload, RemoteError,
    ReplyValue,
};
use drobots_transport::{ClientConnection, Connection};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::RpcError;

/// How long a proxy waits for a reply unless told otherwise.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(5);

type ReplySender = oneshot::Sender<Result<ReplyValue, RemoteError>>;
type PendingMap = Arc<Mutex<HashMap<CallId, ReplySender>>>;

/// One dialled connection plus its reply reader.
struct OutgoingConnection {
    conn: Arc<ClientConnection>,
    next_call: AtomicU64,
    pending: PendingMap,
    reader: JoinHandle<()>,
    codec: JsonCodec,
}

impl OutgoingConnection {
    async fn open(endpoint: &str) -> Result<Self, RpcError> {
        let conn = Arc::new(drobots_transport::connect(endpoint).await?);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_replies(
            Arc::clone(&conn),
            Arc::clone(&pending),
            JsonCodec,
        ));

        Ok(Self {
            conn,
            next_call: AtomicU64::new(1),
            pending,
            reader,
            codec: JsonCodec,
        })
    }

    /// `true` once the reader has seen the connection close.
    fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }

    async fn call(
        &self,
        target: &ObjectRef,
        call: Call,
        timeout: Duration,
    ) -> Result<ReplyValue, RpcError> {
        let operation = call.name();
        let call_id = CallId(self.next_call.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(call_id, tx);

        let envelope = Envelope::request(call_id, target.identity().clone(), call);
        let sent = match self.codec.encode(&envelope) {
            Ok(bytes) => self.conn.send(&bytes).await.map_err(RpcError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&call_id);
            return Err(e);
        }

        tracing::debug!(%call_id, %target, operation, "request sent");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(remote))) => Err(RpcError::Remote(remote)),
            Ok(Err(_)) => Err(RpcError::ConnectionLost),
            Err(_) => {
                self.pending.lock().await.remove(&call_id);
                tracing::debug!(%call_id, %target, operation, "request timed out");
                Err(RpcError::Timeout { operation, timeout })
            }
        }
    }

    async fn close(&self) {
        let _ = self.conn.close().await;
        self.reader.abort();
        self.pending.lock().await.clear();
    }
}

/// Reads replies until the connection closes, completing pending calls.
async fn read_replies(conn: Arc<ClientConnection>, pending: PendingMap, codec: JsonCodec) {
    let conn_id = conn.id();
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "outgoing connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "outgoing connection failed");
                break;
            }
        };

        let envelope: Envelope = match codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode reply");
                continue;
            }
        };

        match envelope.payload {
            Payload::Reply { result } => {
                let waiter = pending.lock().await.remove(&envelope.call_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => {
                        tracing::debug!(%conn_id, call_id = %envelope.call_id, "reply for unknown call");
                    }
                }
            }
            Payload::Request { .. } => {
                tracing::debug!(%conn_id, "ignoring request on outgoing connection");
            }
        }
    }

    // Dropping the senders wakes every waiter with ConnectionLost.
    pending.lock().await.clear();
}

/// Creates proxies and owns the outgoing connections behind them.
pub struct Communicator {
    connections: Mutex<HashMap<String, Arc<OutgoingConnection>>>,
    timeout: Duration,
}

impl Communicator {
    /// Creates a communicator whose proxies use [`DEFAULT_INVOCATION_TIMEOUT`].
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_INVOCATION_TIMEOUT)
    }

    /// Creates a communicator whose proxies wait at most `timeout` per call.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Returns a proxy for `target`, dialling its endpoint if needed.
    ///
    /// A connection that has closed is replaced by a fresh one; nothing
    /// is retried beyond that single dial.
    pub async fn proxy(&self, target: &ObjectRef) -> Result<Proxy, RpcError> {
        let mut connections = self.connections.lock().await;
        let endpoint = target.endpoint();

        let conn = match connections.get(endpoint) {
            Some(conn) if !conn.is_closed() => Arc::clone(conn),
            _ => {
                let conn = Arc::new(OutgoingConnection::open(endpoint).await?);
                connections.insert(endpoint.to_string(), Arc::clone(&conn));
                conn
            }
        };

        Ok(Proxy {
            target: target.clone(),
            conn,
            timeout: self.timeout,
        })
    }

    /// Closes every outgoing connection. Idempotent.
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.connections.lock().await.drain().collect();
        for (endpoint, conn) in connections {
            conn.close().await;
            tracing::debug!(endpoint, "outgoing connection released");
        }
    }
}

impl Default for Communicator {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for calling one remote object.
///
/// Cheap to clone; clones share the underlying connection.
#[derive(Clone)]
pub struct Proxy {
    target: ObjectRef,
    conn: Arc<OutgoingConnection>,
    timeout: Duration,
}

impl Proxy {
    /// The object this proxy calls.
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    /// Returns a copy of this proxy with a different reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invokes `call` on the target and waits for the reply.
    ///
    /// # Errors
    /// - [`RpcError::Remote`] if the target answered with an error
    /// - [`RpcError::Timeout`] if no reply arrived in time
    /// - [`RpcError::ConnectionLost`] / [`RpcError::Transport`] on
    ///   connection failure
    pub async fn invoke(&self, call: Call) -> Result<ReplyValue, RpcError> {
        self.conn.call(&self.target, call, self.timeout).await
    }

    /// Asks the target whether it implements `type_id`.
    pub async fn is_a(&self, type_id: &str) -> Result<bool, RpcError> {
        match self
            .invoke(Call::IsA {
                type_id: type_id.to_string(),
            })
            .await?
        {
            ReplyValue::Bool(answer) => Ok(answer),
            _ => Err(RpcError::UnexpectedReply { operation: "IsA" }),
        }
    }

    /// Returns the proxy only if the target implements `type_id`.
    ///
    /// # Errors
    /// [`RpcError::NotA`] if the target answered `false`, or any error
    /// from the `IsA` call itself.
    pub async fn checked_cast(self, type_id: &str) -> Result<Self, RpcError> {
        if self.is_a(type_id).await? {
            Ok(self)
        } else {
            Err(RpcError::NotA {
                target: self.target,
                type_id: type_id.to_string(),
            })
        }
    }
}
