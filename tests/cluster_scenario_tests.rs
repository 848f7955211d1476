//! Cluster scenario tests
//!
//! Two workers run in one test process, bound to the same port with
//! `SO_REUSEPORT` and sharing one in-memory counter, the way worker processes
//! share Redis in a real cluster.

#![cfg(unix)]

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;
use wsfleet::{
    AppState, InMemoryCounter, ServerConfig, ServerConfigBuilder, SharedCounter, ShutdownKind,
    WorkerServer,
    http::{
        runtime::{ServerResult, bind_listener, router},
        websocket::CONNECTION_ID_HEADER,
    },
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Worker {
    state: AppState,
    stop: oneshot::Sender<ShutdownKind>,
    task: JoinHandle<ServerResult<ShutdownKind>>,
}

impl Worker {
    async fn start(port: u16, shared: Arc<dyn SharedCounter>) -> (Self, SocketAddr) {
        let state = AppState::new(cluster_config(port), Some(shared));
        let listener = bind_listener("127.0.0.1", port, true).await.unwrap();
        let server = WorkerServer::from_listener(listener, state.clone());
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(
            server.run_until(async move { stopped.await.unwrap_or(ShutdownKind::Interrupt) }),
        );
        (Self { state, stop, task }, addr)
    }

    async fn stop(self) {
        self.stop.send(ShutdownKind::Interrupt).unwrap();
        let kind = timeout(Duration::from_secs(10), self.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(kind, ShutdownKind::Interrupt);
    }
}

fn cluster_config(port: u16) -> ServerConfig {
    ServerConfigBuilder::new()
        .host("127.0.0.1")
        .port(port)
        .cluster_enabled(true)
        .cache_enabled(true)
        .build()
        .unwrap()
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn connect(addr: SocketAddr) -> (Client, String) {
    let (client, response) = connect_async(format!("ws://{addr}/").as_str())
        .await
        .unwrap();
    let id = response
        .headers()
        .get(CONNECTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    (client, id)
}

async fn stats(state: &AppState) -> (StatusCode, Value) {
    let request = Request::builder().uri("/stats").body(Body::empty()).unwrap();
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_workers_share_port_and_count() {
    let shared = Arc::new(InMemoryCounter::new());
    shared.reset().await.unwrap();

    let (first, addr) = Worker::start(0, shared.clone() as Arc<dyn SharedCounter>).await;
    let (second, _) = Worker::start(addr.port(), shared.clone() as Arc<dyn SharedCounter>).await;

    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(connect(addr).await);
    }

    let counter = shared.clone();
    eventually(|| {
        let counter = counter.clone();
        async move { counter.read().await.unwrap() == Some(4) }
    })
    .await;

    // each worker only knows its own connections, the counter knows all
    let local = first.state.tracker.counters().local() + second.state.tracker.counters().local();
    assert_eq!(local, 4);
    for worker in [&first, &second] {
        let (status, body) = stats(&worker.state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"activeConnections": 4}));
    }

    for (client, _) in clients.iter_mut() {
        client.close(None).await.unwrap();
    }
    eventually(|| {
        let counter = counter.clone();
        async move { counter.read().await.unwrap() == Some(0) }
    })
    .await;

    first.stop().await;
    second.stop().await;
}

#[tokio::test]
async fn test_dispatch_reaches_connection_on_owning_worker() {
    let shared = Arc::new(InMemoryCounter::new());
    shared.reset().await.unwrap();

    let (first, addr) = Worker::start(0, shared.clone() as Arc<dyn SharedCounter>).await;
    let (second, _) = Worker::start(addr.port(), shared.clone() as Arc<dyn SharedCounter>).await;

    let (mut client, id) = connect(addr).await;
    let (first_state, second_state) = (first.state.clone(), second.state.clone());
    let probe = id.clone();
    eventually(|| {
        let (a, b, id) = (first_state.clone(), second_state.clone(), probe.clone());
        async move { a.registry().has(&id).await || b.registry().has(&id).await }
    })
    .await;
    let owner = if first.state.registry().has(&id).await {
        first.state.clone()
    } else {
        second.state.clone()
    };

    let request = Request::builder()
        .method("POST")
        .uri("/message")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"wsId": id, "msg": "to you"}).to_string()))
        .unwrap();
    let response = router(owner).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let delivered = loop {
        match timeout(Duration::from_secs(5), client.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => break text.to_string(),
            Some(Ok(_)) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    };
    assert_eq!(delivered, "to you");

    client.send(Message::Close(None)).await.unwrap();
    first.stop().await;
    second.stop().await;
}
