//! The object adapter: the client's callback endpoint.
//!
//! An adapter is bound to a local address as soon as it is created, but it
//! does not accept a single connection until [`ObjectAdapter::activate`]
//! is called. Until then the coordinator's connection attempts wait in the
//! listener backlog and nothing is dispatched, which lets the caller finish
//! registering servants first.
//!
//! Once active, the adapter runs one accept task, one task per inbound
//! connection, and one task per request. The WebSocket handshake runs on
//! the connection's task, so a peer that never upgrades cannot stall the
//! accept loop. Requests on the same connection
//! are therefore dispatched concurrently and may complete out of order;
//! replies carry the request's call id so the caller can match them up.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use drobots_protocol::{
    Call, Codec, Envelope, Identity, JsonCodec, ObjectRef, Payload,
    RemoteError, ReplyValue,
};
use drobots_transport::{
    Connection, Incoming, Transport, WebSocketConnection, WebSocketTransport,
};
use rand::Rng;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use crate::{RpcError, Servant};

/// Where the adapter is in its lifecycle.
///
/// ```text
///   Holding ──(activate)──→ Active ──(deactivate)──→ Deactivated
///      │                                                  ↑
///      └──────────────────(deactivate)────────────────────┘
/// ```
enum Lifecycle {
    /// Bound, not accepting yet.
    Holding(WebSocketTransport),
    /// Accept loop running.
    Active(JoinHandle<()>),
    Deactivated,
}

/// State shared between the adapter handle and its background tasks.
struct AdapterShared {
    servants: RwLock<HashMap<Identity, Arc<dyn Servant>>>,
    /// Flips to `true` once on deactivation; every task watches it.
    shutdown: watch::Sender<bool>,
    codec: JsonCodec,
}

impl AdapterShared {
    /// Routes one call to the servant registered under `target`.
    ///
    /// The registry lock is released before the servant runs, so a
    /// servant may itself add or remove servants.
    async fn dispatch(
        &self,
        target: &Identity,
        call: Call,
    ) -> Result<ReplyValue, RemoteError> {
        let servant = self.servants.read().await.get(target).cloned();
        let Some(servant) = servant else {
            return Err(RemoteError::ObjectNotExist {
                identity: target.clone(),
            });
        };

        if let Call::IsA { type_id } = &call {
            return Ok(ReplyValue::Bool(servant.interface() == type_id));
        }
        servant.dispatch(call).await
    }
}

/// Hosts servants and dispatches inbound invocations to them.
pub struct ObjectAdapter {
    local_addr: SocketAddr,
    shared: Arc<AdapterShared>,
    lifecycle: Mutex<Lifecycle>,
}

impl ObjectAdapter {
    /// Binds an adapter to `addr` (e.g. `127.0.0.1:0`).
    ///
    /// The adapter starts out holding: bound but not accepting.
    pub async fn bind(addr: &str) -> Result<Self, RpcError> {
        let transport = WebSocketTransport::bind(addr).await?;
        let local_addr = transport
            .local_addr()
            .map_err(drobots_transport::TransportError::AcceptFailed)?;
        let (shutdown, _) = watch::channel(false);

        tracing::info!(%local_addr, "object adapter bound");

        Ok(Self {
            local_addr,
            shared: Arc::new(AdapterShared {
                servants: RwLock::new(HashMap::new()),
                shutdown,
                codec: JsonCodec,
            }),
            lifecycle: Mutex::new(Lifecycle::Holding(transport)),
        })
    }

    /// The address the adapter is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The reference under which `identity` is reachable on this adapter.
    pub fn object_ref(&self, identity: Identity) -> ObjectRef {
        ObjectRef::for_socket_addr(identity, self.local_addr)
    }

    /// Registers `servant` under `identity` and returns its reference.
    ///
    /// # Errors
    /// - [`RpcError::AlreadyRegistered`] if the identity is taken
    /// - [`RpcError::Deactivated`] after [`deactivate`](Self::deactivate)
    pub async fn add(
        &self,
        identity: Identity,
        servant: Arc<dyn Servant>,
    ) -> Result<ObjectRef, RpcError> {
        let mut servants = self.shared.servants.write().await;
        // Checked under the registry lock: deactivate sets the flag before
        // it clears the registry.
        if *self.shared.shutdown.borrow() {
            return Err(RpcError::Deactivated);
        }
        if servants.contains_key(&identity) {
            return Err(RpcError::AlreadyRegistered(identity));
        }
        tracing::debug!(%identity, interface = servant.interface(), "servant added");
        servants.insert(identity.clone(), servant);
        Ok(self.object_ref(identity))
    }

    /// Registers `servant` under a freshly generated identity.
    pub async fn add_with_uuid(
        &self,
        servant: Arc<dyn Servant>,
    ) -> Result<ObjectRef, RpcError> {
        self.add(generate_identity(), servant).await
    }

    /// Unregisters the servant under `identity`, returning it if present.
    ///
    /// Calls already dispatched to it run to completion; later calls get
    /// `ObjectNotExist`.
    pub async fn remove(&self, identity: &Identity) -> Option<Arc<dyn Servant>> {
        let removed = self.shared.servants.write().await.remove(identity);
        if removed.is_some() {
            tracing::debug!(%identity, "servant removed");
        }
        removed
    }

    /// Looks up the servant registered under `identity`.
    pub async fn find(&self, identity: &Identity) -> Option<Arc<dyn Servant>> {
        self.shared.servants.read().await.get(identity).cloned()
    }

    /// Number of registered servants.
    pub async fn servant_count(&self) -> usize {
        self.shared.servants.read().await.len()
    }

    /// Starts accepting connections and dispatching requests.
    ///
    /// Calling it again while active is a no-op.
    ///
    /// # Errors
    /// [`RpcError::Deactivated`] if the adapter was already deactivated.
    pub async fn activate(&self) -> Result<(), RpcError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match std::mem::replace(&mut *lifecycle, Lifecycle::Deactivated) {
            Lifecycle::Holding(transport) => {
                let shared = Arc::clone(&self.shared);
                let task = tokio::spawn(accept_loop(transport, shared));
                *lifecycle = Lifecycle::Active(task);
                tracing::info!(local_addr = %self.local_addr, "object adapter active");
                Ok(())
            }
            active @ Lifecycle::Active(_) => {
                *lifecycle = active;
                Ok(())
            }
            Lifecycle::Deactivated => Err(RpcError::Deactivated),
        }
    }

    /// Returns `true` while the accept loop is running.
    pub async fn is_active(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Active(_))
    }

    /// Stops accepting, closes inbound connections and drops every servant.
    ///
    /// Idempotent. Requests already being dispatched finish, but their
    /// replies may no longer be deliverable.
    pub async fn deactivate(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Deactivated) {
            return;
        }

        self.shared.shutdown.send_replace(true);
        if let Lifecycle::Active(task) =
            std::mem::replace(&mut *lifecycle, Lifecycle::Deactivated)
        {
            task.abort();
        }
        let dropped = {
            let mut servants = self.shared.servants.write().await;
            let count = servants.len();
            servants.clear();
            count
        };

        tracing::info!(local_addr = %self.local_addr, servants = dropped, "object adapter deactivated");
    }
}

impl Drop for ObjectAdapter {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
        if let Lifecycle::Active(task) = self.lifecycle.get_mut() {
            task.abort();
        }
    }
}

/// Accepts connections until shutdown, spawning a task for each.
async fn accept_loop(mut transport: WebSocketTransport, shared: Arc<AdapterShared>) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        let accepted = tokio::select! {
            _ = shutdown_signalled(&mut shutdown) => break,
            accepted = transport.accept() => accepted,
        };

        match accepted {
            Ok(incoming) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let peer = incoming.peer_addr();
                    let conn = match incoming.handshake().await {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::debug!(%peer, error = %e, "inbound handshake failed");
                            return;
                        }
                    };
                    let conn_id = conn.id();
                    if let Err(e) = serve_connection(conn, shared).await {
                        tracing::debug!(%conn_id, error = %e, "inbound connection ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }

    let _ = transport.shutdown().await;
    tracing::debug!("accept loop stopped");
}

/// Reads requests from one inbound connection and dispatches each on its
/// own task.
async fn serve_connection(
    conn: WebSocketConnection,
    shared: Arc<AdapterShared>,
) -> Result<(), RpcError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        let data = tokio::select! {
            _ = shutdown_signalled(&mut shutdown) => break,
            received = conn.recv() => match received? {
                Some(data) => data,
                None => {
                    tracing::debug!(%conn_id, "inbound connection closed");
                    return Ok(());
                }
            },
        };

        let envelope: Envelope = match shared.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
                continue;
            }
        };

        let call_id = envelope.call_id;
        match envelope.payload {
            Payload::Request { target, call } => {
                tracing::debug!(%conn_id, %call_id, %target, operation = call.name(), "dispatching");
                let shared = Arc::clone(&shared);
                let conn = Arc::clone(&conn);
                tokio::spawn(async move {
                    let result = shared.dispatch(&target, call).await;
                    let reply = Envelope::reply(call_id, result);
                    let sent = match shared.codec.encode(&reply) {
                        Ok(bytes) => conn.send(&bytes).await.map_err(RpcError::from),
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = sent {
                        tracing::debug!(%conn_id, %call_id, error = %e, "reply not delivered");
                    }
                });
            }
            Payload::Reply { .. } => {
                tracing::debug!(%conn_id, %call_id, "ignoring reply on inbound connection");
            }
        }
    }

    let _ = conn.close().await;
    Ok(())
}

/// Resolves once the adapter's shutdown flag is set (or its sender is gone).
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Generates a random 32-character hex identity (128 bits of entropy).
pub fn generate_identity() -> Identity {
    Identity::from_bytes(rand::rng().random())
}

#[cfg(test)]
mod tests {
    use drobots_protocol::{PLAYER_TYPE_ID, UnitRequestId};

    use super::*;
    use crate::BoxFuture;

    /// Replies `Unit` to `Turn` and nothing else.
    struct Stub;

    impl Servant for Stub {
        fn interface(&self) -> &'static str {
            PLAYER_TYPE_ID
        }

        fn dispatch(&self, call: Call) -> BoxFuture<'_, Result<ReplyValue, RemoteError>> {
            Box::pin(async move {
                match call {
                    Call::Turn => Ok(ReplyValue::Unit),
                    other => Err(self.unsupported(&other)),
                }
            })
        }
    }

    async fn adapter() -> ObjectAdapter {
        ObjectAdapter::bind("127.0.0.1:0").await.expect("should bind")
    }

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn test_generate_identity_is_32_hex_chars() {
        let identity = generate_identity();
        assert_eq!(identity.as_str().len(), 32);
        assert!(identity.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(identity, generate_identity());
    }

    #[tokio::test]
    async fn test_add_returns_ref_on_adapter_endpoint() {
        let adapter = adapter().await;
        let obj = adapter.add(id("p1"), Arc::new(Stub)).await.unwrap();
        assert_eq!(obj.identity(), &id("p1"));
        assert_eq!(obj.endpoint(), format!("ws://{}", adapter.local_addr()));
    }

    #[tokio::test]
    async fn test_add_duplicate_identity_returns_already_registered() {
        let adapter = adapter().await;
        adapter.add(id("p1"), Arc::new(Stub)).await.unwrap();
        let result = adapter.add(id("p1"), Arc::new(Stub)).await;
        assert!(matches!(result, Err(RpcError::AlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn test_add_with_uuid_generates_distinct_identities() {
        let adapter = adapter().await;
        let a = adapter.add_with_uuid(Arc::new(Stub)).await.unwrap();
        let b = adapter.add_with_uuid(Arc::new(Stub)).await.unwrap();
        assert_ne!(a.identity(), b.identity());
        assert_eq!(adapter.servant_count().await, 2);
    }

    #[tokio::test]
    async fn test_remove_then_find_returns_none() {
        let adapter = adapter().await;
        adapter.add(id("p1"), Arc::new(Stub)).await.unwrap();
        assert!(adapter.remove(&id("p1")).await.is_some());
        assert!(adapter.find(&id("p1")).await.is_none());
        assert!(adapter.remove(&id("p1")).await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_identity_returns_object_not_exist() {
        let adapter = adapter().await;
        let result = adapter.shared.dispatch(&id("ghost"), Call::Turn).await;
        assert!(matches!(result, Err(RemoteError::ObjectNotExist { .. })));
    }

    #[tokio::test]
    async fn test_dispatch_is_a_answered_from_interface() {
        let adapter = adapter().await;
        adapter.add(id("p1"), Arc::new(Stub)).await.unwrap();

        let yes = adapter
            .shared
            .dispatch(&id("p1"), Call::IsA { type_id: PLAYER_TYPE_ID.into() })
            .await;
        let no = adapter
            .shared
            .dispatch(&id("p1"), Call::IsA { type_id: "::drobots::Game".into() })
            .await;
        assert_eq!(yes, Ok(ReplyValue::Bool(true)));
        assert_eq!(no, Ok(ReplyValue::Bool(false)));
    }

    #[tokio::test]
    async fn test_dispatch_unsupported_operation_names_it() {
        let adapter = adapter().await;
        adapter.add(id("p1"), Arc::new(Stub)).await.unwrap();
        let result = adapter
            .shared
            .dispatch(
                &id("p1"),
                Call::CreateUnit {
                    request_id: UnitRequestId::from("r1"),
                },
            )
            .await;
        match result {
            Err(RemoteError::OperationNotExist { operation, type_id }) => {
                assert_eq!(operation, "CreateUnit");
                assert_eq!(type_id, PLAYER_TYPE_ID);
            }
            other => panic!("expected OperationNotExist, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_activate_twice_is_noop() {
        let adapter = adapter().await;
        assert!(!adapter.is_active().await);
        adapter.activate().await.unwrap();
        adapter.activate().await.unwrap();
        assert!(adapter.is_active().await);
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent_and_clears_servants() {
        let adapter = adapter().await;
        adapter.add(id("p1"), Arc::new(Stub)).await.unwrap();
        adapter.activate().await.unwrap();

        adapter.deactivate().await;
        adapter.deactivate().await;

        assert!(!adapter.is_active().await);
        assert_eq!(adapter.servant_count().await, 0);
        assert!(matches!(adapter.activate().await, Err(RpcError::Deactivated)));
        assert!(matches!(
            adapter.add(id("p2"), Arc::new(Stub)).await,
            Err(RpcError::Deactivated)
        ));
    }

    #[tokio::test]
    async fn test_deactivate_without_activate_succeeds() {
        let adapter = adapter().await;
        adapter.deactivate().await;
        assert!(!adapter.is_active().await);
    }
}
