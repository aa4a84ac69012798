//! Test helpers
//!
//! [`MockGatewayTransport`] hands every connection it opens to the test as a
//! [`ScriptedServer`], which plays the gateway's side of the conversation.
//! Heartbeats are answered in the background so scenarios only see the
//! messages they care about.

use crate::fixtures;
use async_trait::async_trait;
use futures::channel::mpsc as channel;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use shardline_core::ShardId;
use shardline_gateway::{
    DispatchEvent, EventSink, GatewayConnection, GatewayFrame, GatewayMessage, GatewayTransport,
    IdentifyGate, OpCode, SessionKind, SessionStore, ShardEvent, ShardManager, ShardState,
    SupervisorConfig, TransportError,
};
use shardline_rest::{HttpTransport, RateLimitHeaders, RestError, RestRequest, RestResponse};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Upper bound for any single wait in a scenario
const WAIT_LIMIT: Duration = Duration::from_secs(3600);

/// Await `future`, failing the test instead of hanging forever
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT_LIMIT, future)
        .await
        .expect("timed out waiting")
}

/// Poll `condition` until it holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

// ============================================================================
// Gateway
// ============================================================================

type ServerFrame = Result<GatewayFrame, TransportError>;

/// The gateway's end of one connection
pub struct ScriptedServer {
    url: String,
    to_client: channel::UnboundedSender<ServerFrame>,
    received: mpsc::UnboundedReceiver<GatewayFrame>,
    auto_ack: Arc<AtomicBool>,
    heartbeats: Arc<AtomicU32>,
}

impl ScriptedServer {
    fn spawn(
        url: &str,
        to_client: channel::UnboundedSender<ServerFrame>,
        from_client: channel::UnboundedReceiver<GatewayFrame>,
    ) -> Self {
        let (forward, received) = mpsc::unbounded_channel();
        let auto_ack = Arc::new(AtomicBool::new(true));
        let heartbeats = Arc::new(AtomicU32::new(0));

        tokio::spawn(pump(
            from_client,
            to_client.clone(),
            forward,
            auto_ack.clone(),
            heartbeats.clone(),
        ));

        Self {
            url: url.to_string(),
            to_client,
            received,
            auto_ack,
            heartbeats,
        }
    }

    /// URL the client connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop answering heartbeats
    pub fn stop_acking(&self) {
        self.auto_ack.store(false, Ordering::SeqCst);
    }

    /// Heartbeats the client has sent on this connection
    pub fn heartbeats(&self) -> u32 {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn send(&self, message: &GatewayMessage) {
        let json = message.to_json().expect("message serializes");
        self.send_raw(json);
    }

    /// Send a text frame as is
    pub fn send_raw(&self, text: impl Into<String>) {
        let _ = self.to_client.unbounded_send(Ok(GatewayFrame::Text(text.into())));
    }

    pub fn hello(&self) {
        self.send(&GatewayMessage::hello(fixtures::HEARTBEAT_INTERVAL_MS));
    }

    pub fn dispatch(&self, event_type: &str, sequence: u64, data: Value) {
        self.send(&GatewayMessage::dispatch(event_type, sequence, data));
    }

    /// READY for a new session, with the fixture resume URL
    pub fn ready(&self, shard: ShardId, session_id: &str, sequence: u64) {
        self.dispatch("READY", sequence, fixtures::ready_payload(shard, session_id));
    }

    pub fn resumed(&self, sequence: u64) {
        self.dispatch("RESUMED", sequence, Value::Null);
    }

    /// Close the connection with a close code
    pub fn close(&self, code: u16) {
        let _ = self.to_client.unbounded_send(Ok(GatewayFrame::Close(Some(code))));
    }

    /// End the connection without a close frame
    pub fn drop_connection(&self) {
        self.to_client.close_channel();
    }

    /// Next non-heartbeat frame from the client
    pub async fn next_frame(&mut self) -> GatewayFrame {
        within(self.received.recv())
            .await
            .expect("client went away without sending anything")
    }

    /// Next non-heartbeat message from the client
    pub async fn next_message(&mut self) -> GatewayMessage {
        match self.next_frame().await {
            GatewayFrame::Text(text) => {
                GatewayMessage::from_json(&text).expect("client sent invalid JSON")
            }
            GatewayFrame::Close(code) => panic!("expected a message, client closed with {code:?}"),
        }
    }

    /// Next message, which must carry `op`
    pub async fn expect(&mut self, op: OpCode) -> GatewayMessage {
        let message = self.next_message().await;
        assert_eq!(message.op, op, "unexpected message: {message}");
        message
    }

    /// Wait for the client to close, returning its close code
    pub async fn expect_close(&mut self) -> Option<u16> {
        match self.next_frame().await {
            GatewayFrame::Close(code) => code,
            GatewayFrame::Text(text) => panic!("expected a close, got {text}"),
        }
    }
}

/// Moves client frames to the test, answering heartbeats on the way
async fn pump(
    mut from_client: channel::UnboundedReceiver<GatewayFrame>,
    to_client: channel::UnboundedSender<ServerFrame>,
    forward: mpsc::UnboundedSender<GatewayFrame>,
    auto_ack: Arc<AtomicBool>,
    heartbeats: Arc<AtomicU32>,
) {
    while let Some(frame) = from_client.next().await {
        if let GatewayFrame::Text(text) = &frame {
            let is_heartbeat = GatewayMessage::from_json(text)
                .is_ok_and(|message| message.op == OpCode::Heartbeat);
            if is_heartbeat {
                heartbeats.fetch_add(1, Ordering::SeqCst);
                if auto_ack.load(Ordering::SeqCst) {
                    let ack = GatewayMessage::heartbeat_ack()
                        .to_json()
                        .expect("ack serializes");
                    let _ = to_client.unbounded_send(Ok(GatewayFrame::Text(ack)));
                }
                continue;
            }
        }
        if forward.send(frame).is_err() {
            break;
        }
    }
}

/// Connections opened by [`MockGatewayTransport`], in order
pub struct ServerQueue(mpsc::UnboundedReceiver<ScriptedServer>);

impl ServerQueue {
    /// Wait for the next connection
    pub async fn next(&mut self) -> ScriptedServer {
        within(self.0.recv()).await.expect("transport dropped")
    }

    /// A connection opened since the last call, if any
    pub fn try_next(&mut self) -> Option<ScriptedServer> {
        self.0.try_recv().ok()
    }
}

/// In-memory gateway transport
pub struct MockGatewayTransport {
    servers: mpsc::UnboundedSender<ScriptedServer>,
    urls: Mutex<Vec<String>>,
    panics: AtomicU32,
    failures: AtomicU32,
    hangs: AtomicU32,
}

impl MockGatewayTransport {
    pub fn new() -> (Arc<Self>, ServerQueue) {
        let (servers, queue) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            servers,
            urls: Mutex::new(Vec::new()),
            panics: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            hangs: AtomicU32::new(0),
        });
        (transport, ServerQueue(queue))
    }

    /// Panic inside the next `count` connect attempts
    pub fn panic_on_connect(&self, count: u32) {
        self.panics.store(count, Ordering::SeqCst);
    }

    /// Refuse the next `count` connect attempts
    pub fn fail_connects(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Never complete the next `count` connect attempts
    pub fn hang_connects(&self, count: u32) {
        self.hangs.store(count, Ordering::SeqCst);
    }

    /// Every URL connected to so far (including failed attempts)
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.urls.lock().len()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl GatewayTransport for MockGatewayTransport {
    async fn connect(&self, url: &str) -> Result<GatewayConnection, TransportError> {
        self.urls.lock().push(url.to_string());

        if take_one(&self.panics) {
            panic!("transport panicked connecting to {url}");
        }
        if take_one(&self.failures) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        if take_one(&self.hangs) {
            return std::future::pending().await;
        }

        let (client_tx, client_rx) = channel::unbounded::<GatewayFrame>();
        let (server_tx, server_rx) = channel::unbounded::<ServerFrame>();
        let server = ScriptedServer::spawn(url, server_tx, client_rx);
        let _ = self.servers.send(server);

        let sink = client_tx.sink_map_err(|_| TransportError::Closed);
        Ok(GatewayConnection::new(Box::pin(sink), Box::pin(server_rx)))
    }
}

/// Event sink that remembers everything
#[derive(Default)]
pub struct RecordingSink {
    dispatches: Mutex<Vec<DispatchEvent>>,
    events: Mutex<Vec<(ShardId, ShardEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dispatches(&self, shard: ShardId) -> Vec<DispatchEvent> {
        self.dispatches
            .lock()
            .iter()
            .filter(|d| d.shard == shard)
            .cloned()
            .collect()
    }

    /// Sequences delivered for a shard, in delivery order
    pub fn sequences(&self, shard: ShardId) -> Vec<u64> {
        self.dispatches(shard).iter().map(|d| d.sequence).collect()
    }

    pub fn events(&self, shard: ShardId) -> Vec<ShardEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(s, _)| *s == shard)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// States the shard moved through, in order
    pub fn transitions(&self, shard: ShardId) -> Vec<ShardState> {
        self.events(shard)
            .into_iter()
            .filter_map(|event| match event {
                ShardEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    pub fn sessions_started(&self, shard: ShardId) -> Vec<SessionKind> {
        self.events(shard)
            .into_iter()
            .filter_map(|event| match event {
                ShardEvent::SessionStarted { kind } => Some(kind),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_dispatch(&self, shard: ShardId, sequence: u64, event_type: &str, payload: Value) {
        self.dispatches.lock().push(DispatchEvent {
            shard,
            sequence,
            event_type: event_type.to_string(),
            payload,
        });
    }

    fn on_shard_event(&self, shard: ShardId, event: ShardEvent) {
        self.events.lock().push((shard, event));
    }
}

/// A shard manager wired to mock connections
pub struct Harness {
    pub manager: ShardManager,
    pub transport: Arc<MockGatewayTransport>,
    pub servers: ServerQueue,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(supervisor: SupervisorConfig) -> Self {
        let (transport, servers) = MockGatewayTransport::new();
        let sink = RecordingSink::new();
        let manager = ShardManager::with_parts(
            fixtures::shard_config(),
            supervisor,
            transport.clone(),
            sink.clone(),
            IdentifyGate::new(fixtures::gate_config()),
            SessionStore::new(),
        );
        Self {
            manager,
            transport,
            servers,
            sink,
        }
    }

    /// Harness with default supervision, already running `total` shards
    pub fn start(total: u32) -> Self {
        let harness = Self::new(fixtures::supervisor_config());
        harness.manager.start(total).expect("manager starts");
        harness
    }

    pub async fn wait_for_state(&self, shard: ShardId, state: ShardState) {
        let mut watch = self.manager.watch_state(shard).expect("shard exists");
        within(watch.wait_for(|current| *current == state))
            .await
            .expect("state channel closed");
    }

    /// Accept the next connection and drive it through Identify to Ready
    pub async fn identify_ready(
        &mut self,
        session_id: &str,
        sequence: u64,
    ) -> (ShardId, ScriptedServer) {
        let mut server = self.servers.next().await;
        server.hello();
        let identify = server.expect(OpCode::Identify).await;
        let shard = identify.as_identify().expect("identify payload").shard;
        server.ready(shard, session_id, sequence);
        self.wait_for_state(shard, ShardState::Ready).await;
        (shard, server)
    }
}

// ============================================================================
// REST
// ============================================================================

/// HTTP transport replaying queued responses
#[derive(Default)]
pub struct MockHttpTransport {
    replies: Mutex<VecDeque<Result<RestResponse, RestError>>>,
    requests: Mutex<Vec<RestRequest>>,
}

impl MockHttpTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response; an empty queue answers 204
    pub fn reply(&self, response: RestResponse) {
        self.replies.lock().push_back(Ok(response));
    }

    pub fn fail(&self, error: RestError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Requests sent so far
    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: &RestRequest) -> Result<RestResponse, RestError> {
        self.requests.lock().push(request.clone());
        let reply = self.replies.lock().pop_front();
        reply.unwrap_or_else(|| Ok(RestResponse::new(204, RateLimitHeaders::default(), "")))
    }
}
