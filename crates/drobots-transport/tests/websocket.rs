//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on a loopback port and dial it with
//! [`connect`], so both sides of the connection are this crate's own
//! `WebSocketConnection`.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use drobots_transport::{
        Connection, Incoming, Transport, TransportError, WebSocketTransport, connect,
    };
    use tokio::net::TcpStream;

    /// Binds on a random port and returns the transport plus its `ws://` URL.
    async fn bind_random() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");
        (transport, format!("ws://{addr}"))
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, url) = bind_random().await;

        let server_handle = tokio::spawn(async move {
            transport
                .accept()
                .await
                .expect("should accept")
                .handshake()
                .await
                .expect("should upgrade")
        });

        let client = connect(&url).await.expect("client should connect");
        let server = server_handle.await.expect("task should complete");

        client.send(b"login").await.expect("client send");
        let received = server.recv().await.expect("server recv");
        assert_eq!(received.as_deref(), Some(&b"login"[..]));

        server.send(b"ok").await.expect("server send");
        let received = client.recv().await.expect("client recv");
        assert_eq!(received.as_deref(), Some(&b"ok"[..]));
    }

    #[tokio::test]
    async fn test_websocket_send_not_blocked_by_pending_recv() {
        // A reader parked in recv() must not hold the write half.
        let (mut transport, url) = bind_random().await;
        let server_handle = tokio::spawn(async move {
            transport
                .accept()
                .await
                .expect("should accept")
                .handshake()
                .await
                .expect("should upgrade")
        });
        let client = Arc::new(connect(&url).await.expect("connect"));
        let server = server_handle.await.expect("accept task");

        let reader = Arc::clone(&client);
        let pending = tokio::spawn(async move { reader.recv().await });

        // Give the reader time to take the read lock.
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), client.send(b"ping"))
            .await
            .expect("send must not wait for recv")
            .expect("send should succeed");

        assert_eq!(
            server.recv().await.expect("server recv").as_deref(),
            Some(&b"ping"[..])
        );

        server.send(b"pong").await.expect("server send");
        let echoed = pending.await.expect("reader task").expect("recv");
        assert_eq!(echoed.as_deref(), Some(&b"pong"[..]));
    }

    #[tokio::test]
    async fn test_websocket_close_returns_none_on_peer() {
        let (mut transport, url) = bind_random().await;
        let server_handle = tokio::spawn(async move {
            transport
                .accept()
                .await
                .expect("should accept")
                .handshake()
                .await
                .expect("should upgrade")
        });
        let client = connect(&url).await.expect("connect");
        let server = server_handle.await.expect("accept task");

        client.close().await.expect("close");

        let result = tokio::time::timeout(Duration::from_secs(2), server.recv())
            .await
            .expect("recv should finish");
        assert!(matches!(result, Ok(None)), "got {result:?}");
    }

    #[tokio::test]
    async fn test_connect_refused_returns_connect_failed() {
        // Bind then drop, so the port is (almost certainly) closed.
        let (transport, url) = bind_random().await;
        drop(transport);

        let result = connect(&url).await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let (mut transport, url) = bind_random().await;
        let accept = tokio::spawn(async move {
            let a = transport.accept().await.expect("accept a");
            let b = transport.accept().await.expect("accept b");
            let a = a.handshake().await.expect("upgrade a");
            let b = b.handshake().await.expect("upgrade b");
            (a.id(), b.id())
        });
        let _c1 = connect(&url).await.expect("c1");
        let _c2 = connect(&url).await.expect("c2");
        let (a, b) = accept.await.expect("accept task");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_handshake_silent_peer_times_out() {
        let (transport, url) = bind_random().await;
        let mut transport =
            transport.with_handshake_timeout(Duration::from_millis(100));
        let addr = url.trim_start_matches("ws://").to_string();

        // Opens TCP but never sends the upgrade request.
        let _silent = TcpStream::connect(&addr).await.expect("tcp connect");
        let incoming = transport.accept().await.expect("should accept");
        assert_eq!(incoming.peer_addr().ip().to_string(), "127.0.0.1");

        let result = tokio::time::timeout(Duration::from_secs(2), incoming.handshake())
            .await
            .expect("handshake must give up on its own");
        assert!(
            matches!(result, Err(TransportError::HandshakeFailed { .. })),
            "got {:?}",
            result.map(|c| c.id())
        );
    }

    #[tokio::test]
    async fn test_accept_not_blocked_by_pending_handshake() {
        let (mut transport, url) = bind_random().await;
        let addr = url.trim_start_matches("ws://").to_string();

        let _silent = TcpStream::connect(&addr).await.expect("tcp connect");
        let accept = tokio::spawn(async move {
            let silent = transport.accept().await.expect("accept silent");
            let real = transport.accept().await.expect("accept real");
            let conn = real.handshake().await.expect("upgrade real");
            (silent, conn)
        });

        let client = tokio::time::timeout(Duration::from_secs(2), connect(&url))
            .await
            .expect("dial must not wait behind the silent peer")
            .expect("connect");
        let (_silent, server) = accept.await.expect("accept task");

        client.send(b"hello").await.expect("send");
        assert_eq!(
            server.recv().await.expect("recv").as_deref(),
            Some(&b"hello"[..])
        );
    }
}
