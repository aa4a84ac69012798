//! Shard run loop
//!
//! `Disconnected -> AwaitingIdentifySlot -> Connecting -> AwaitingHello ->
//! Authenticating -> Ready`, with `Reconnecting` looping back to the gate (or
//! straight to `Connecting` when resuming) and `Closed` on shutdown or a fatal
//! close code.

use super::{Backoff, Beat, Heartbeater, ShardConfig, ShardState, StateTracker};
use crate::error::GatewayError;
use crate::events::{EventSink, SessionKind, ShardEvent};
use crate::identify::{IdentifyGate, IdentifyTicket};
use crate::protocol::{CloseCode, GatewayMessage, IdentifyPayload, OpCode, ResumePayload};
use crate::session::{Session, SessionStore};
use crate::transport::{FrameSink, FrameStream, GatewayFrame, GatewayTransport, TransportError};
use futures_util::{SinkExt, StreamExt};
use shardline_core::ShardId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

/// Violations tolerated on one connection before forcing a reconnect
const MAX_PROTOCOL_VIOLATIONS: u32 = 3;

/// What a shard shares with its siblings
#[derive(Clone)]
pub struct ShardContext {
    pub config: Arc<ShardConfig>,
    pub transport: Arc<dyn GatewayTransport>,
    pub gate: IdentifyGate,
    pub sessions: SessionStore,
    pub sink: Arc<dyn EventSink>,
    /// Flips to `true` on shutdown
    pub shutdown: watch::Receiver<bool>,
}

/// One persistent gateway connection
pub struct Shard {
    id: ShardId,
    ctx: ShardContext,
    state: StateTracker,
    backoff: Backoff,
}

/// How a connection ended
enum Outcome {
    Reconnect,
    Shutdown,
}

enum Flow {
    Continue,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Identify,
    Resume,
}

/// Per-connection state, dropped with the connection
struct Link {
    sink: FrameSink,
    stream: FrameStream,
    handshake: Handshake,
    ticket: Option<IdentifyTicket>,
    ready: bool,
    violations: u32,
}

enum LinkEvent {
    Text(String),
    Timer,
    End(LinkEnd),
}

enum LinkEnd {
    Closed(Option<u16>),
    Dropped(String),
    Shutdown,
}

impl Shard {
    pub fn new(id: ShardId, ctx: ShardContext, state: StateTracker) -> Self {
        let backoff = Backoff::new(ctx.config.reconnect_base, ctx.config.reconnect_max);
        Self {
            id,
            ctx,
            state,
            backoff,
        }
    }

    #[must_use]
    pub fn id(&self) -> ShardId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ShardState {
        self.state.get()
    }

    /// Run until shutdown (`Ok`) or a fatal close (`Err`)
    #[instrument(name = "shard", skip(self), fields(shard = %self.id))]
    pub async fn run(mut self) -> Result<(), GatewayError> {
        info!("Shard starting");
        loop {
            if *self.ctx.shutdown.borrow() {
                break;
            }

            match self.connect_once().await {
                Ok(Outcome::Shutdown) => break,
                Ok(Outcome::Reconnect) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Shard stopped on unrecoverable error");
                    self.ctx.sessions.clear(self.id);
                    self.state.set(ShardState::Closed);
                    self.ctx.sink.on_shard_event(
                        self.id,
                        ShardEvent::Fatal {
                            reason: e.to_string(),
                        },
                    );
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Connection failed"),
            }

            self.state.set(ShardState::Reconnecting);
            let delay = self.backoff.next_delay();
            debug!(?delay, attempt = self.backoff.attempt(), "Waiting before reconnect");
            tokio::select! {
                () = sleep(delay) => {}
                () = wait_for_shutdown(&mut self.ctx.shutdown) => break,
            }
        }

        info!("Shard closed");
        self.state.set(ShardState::Closed);
        Ok(())
    }

    async fn connect_once(&mut self) -> Result<Outcome, GatewayError> {
        let session = self.ctx.sessions.get(self.id);
        let handshake = if session.is_resumable() {
            Handshake::Resume
        } else {
            Handshake::Identify
        };

        // Resumes do not count against the identify limit
        let ticket = match handshake {
            Handshake::Resume => None,
            Handshake::Identify => {
                self.state.set(ShardState::AwaitingIdentifySlot);
                tokio::select! {
                    ticket = self.ctx.gate.acquire(self.id) => Some(ticket),
                    () = wait_for_shutdown(&mut self.ctx.shutdown) => return Ok(Outcome::Shutdown),
                }
            }
        };

        self.state.set(ShardState::Connecting);
        let resume_url = match handshake {
            Handshake::Resume => session.resume_url.as_deref(),
            Handshake::Identify => None,
        };
        let url = self.ctx.config.connect_url(resume_url);
        debug!(%url, ?handshake, "Connecting");

        let limit = self.ctx.config.connect_timeout;
        let connection = tokio::select! {
            result = timeout(limit, self.ctx.transport.connect(&url)) => result
                .map_err(|_| TransportError::Connect(format!("no connection after {limit:?}")))??,
            () = wait_for_shutdown(&mut self.ctx.shutdown) => return Ok(Outcome::Shutdown),
        };

        let mut link = Link {
            sink: connection.sink,
            stream: connection.stream,
            handshake,
            ticket,
            ready: false,
            violations: 0,
        };

        match self.drive(&mut link, &session).await {
            Err(e @ GatewayError::Protocol(_)) => {
                close(&mut link.sink, CloseCode::RESUMABLE).await;
                Err(e)
            }
            other => other,
        }
    }

    /// Hello, handshake, then the receive loop until the connection ends
    async fn drive(&mut self, link: &mut Link, session: &Session) -> Result<Outcome, GatewayError> {
        self.state.set(ShardState::AwaitingHello);
        let hello_deadline = Instant::now() + self.ctx.config.hello_timeout;
        let mut heartbeat = loop {
            match next_event(&mut self.ctx.shutdown, &mut link.stream, hello_deadline).await {
                LinkEvent::Text(text) => {
                    let hello = GatewayMessage::from_json(&text)
                        .ok()
                        .and_then(|message| message.as_hello());
                    if let Some(hello) = hello {
                        debug!(interval_ms = hello.heartbeat_interval, "Received Hello");
                        break Heartbeater::new(
                            Duration::from_millis(hello.heartbeat_interval),
                            rand::random::<f64>(),
                            Instant::now(),
                        );
                    }
                    self.violation(link, "message before Hello")?;
                }
                LinkEvent::Timer => {
                    warn!(timeout = ?self.ctx.config.hello_timeout, "No Hello received");
                    close(&mut link.sink, CloseCode::RESUMABLE).await;
                    return Ok(Outcome::Reconnect);
                }
                LinkEvent::End(end) => return self.end_link(link, end).await,
            }
        };

        self.state.set(ShardState::Authenticating);
        let opening = self.handshake_message(link.handshake, session)?;
        send(&mut link.sink, &opening).await?;
        let ready_deadline = Instant::now() + self.ctx.config.ready_timeout;

        loop {
            let wake = if link.ready {
                heartbeat.next_beat()
            } else {
                heartbeat.next_beat().min(ready_deadline)
            };
            match next_event(&mut self.ctx.shutdown, &mut link.stream, wake).await {
                LinkEvent::Text(text) => {
                    if let Flow::Reconnect = self.handle_text(&text, link, &mut heartbeat).await? {
                        close(&mut link.sink, CloseCode::RESUMABLE).await;
                        return Ok(Outcome::Reconnect);
                    }
                }
                LinkEvent::Timer if !link.ready && Instant::now() >= ready_deadline => {
                    warn!(
                        timeout = ?self.ctx.config.ready_timeout,
                        handshake = ?link.handshake,
                        "Session not ready in time"
                    );
                    close(&mut link.sink, CloseCode::RESUMABLE).await;
                    return Ok(Outcome::Reconnect);
                }
                LinkEvent::Timer => match heartbeat.beat(Instant::now()) {
                    Beat::Send => {
                        let seq = self.ctx.sessions.sequence(self.id);
                        trace!(?seq, "Sending heartbeat");
                        send(&mut link.sink, &GatewayMessage::heartbeat(seq)).await?;
                    }
                    Beat::Zombie => {
                        warn!(interval = ?heartbeat.interval(), "Heartbeat not acknowledged, reconnecting");
                        close(&mut link.sink, CloseCode::RESUMABLE).await;
                        return Ok(Outcome::Reconnect);
                    }
                },
                LinkEvent::End(end) => return self.end_link(link, end).await,
            }
        }
    }

    fn handshake_message(
        &self,
        handshake: Handshake,
        session: &Session,
    ) -> Result<GatewayMessage, GatewayError> {
        let config = &self.ctx.config;
        let message = match handshake {
            Handshake::Resume => {
                let payload = ResumePayload {
                    token: config.token.clone(),
                    session_id: session.session_id.clone().unwrap_or_default(),
                    seq: session.sequence.unwrap_or(0),
                };
                info!(seq = payload.seq, "Resuming session");
                GatewayMessage::resume(&payload)?
            }
            Handshake::Identify => {
                let payload = IdentifyPayload {
                    token: config.token.clone(),
                    properties: config.properties.clone(),
                    shard: self.id,
                    intents: config.intents,
                    large_threshold: config.large_threshold,
                };
                info!(intents = config.intents, "Identifying");
                GatewayMessage::identify(&payload)?
            }
        };
        Ok(message)
    }

    async fn handle_text(
        &mut self,
        text: &str,
        link: &mut Link,
        heartbeat: &mut Heartbeater,
    ) -> Result<Flow, GatewayError> {
        let message = match GatewayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                self.violation(link, &format!("undecodable frame: {e}"))?;
                return Ok(Flow::Continue);
            }
        };
        trace!(op = %message.op, "Received message");

        let flow = match message.op {
            OpCode::Dispatch => self.on_dispatch(message, link)?,
            OpCode::Heartbeat => {
                debug!("Server requested a heartbeat");
                let seq = self.ctx.sessions.sequence(self.id);
                send(&mut link.sink, &GatewayMessage::heartbeat(seq)).await?;
                heartbeat.record_sent(Instant::now());
                Flow::Continue
            }
            OpCode::HeartbeatAck => {
                heartbeat.ack(Instant::now());
                trace!(latency = ?heartbeat.latency(), "Heartbeat acknowledged");
                Flow::Continue
            }
            OpCode::Reconnect => {
                info!("Server requested a reconnect");
                Flow::Reconnect
            }
            OpCode::InvalidSession => {
                if message.as_invalid_session().unwrap_or(false) {
                    warn!("Session invalidated, resumable");
                } else {
                    warn!("Session invalidated, not resumable");
                    self.drop_session();
                }
                Flow::Reconnect
            }
            op => {
                self.violation(link, &format!("unexpected {op}"))?;
                Flow::Continue
            }
        };
        Ok(flow)
    }

    fn on_dispatch(
        &mut self,
        message: GatewayMessage,
        link: &mut Link,
    ) -> Result<Flow, GatewayError> {
        let event_type = message.t.clone().unwrap_or_default();

        if !link.ready {
            match link.handshake {
                Handshake::Identify => {
                    let Some(ready) = message.as_ready() else {
                        self.violation(link, &format!("{event_type} before READY"))?;
                        return Ok(Flow::Continue);
                    };
                    self.ctx
                        .sessions
                        .set_session(self.id, ready.session_id, ready.resume_gateway_url);
                    self.mark_ready(link, SessionKind::Fresh);
                }
                Handshake::Resume if event_type == "RESUMED" => {
                    self.mark_ready(link, SessionKind::Resumed);
                }
                // Events missed while disconnected are replayed before RESUMED
                Handshake::Resume => {}
            }
        }

        let Some(sequence) = message.s else {
            if !link.ready {
                self.violation(link, "dispatch without sequence")?;
            }
            return Ok(Flow::Continue);
        };

        if !self.ctx.sessions.update_sequence(self.id, sequence) {
            warn!(
                seq = sequence,
                current = ?self.ctx.sessions.sequence(self.id),
                event = %event_type,
                "Duplicate or out-of-order dispatch dropped"
            );
            return Ok(Flow::Continue);
        }

        trace!(seq = sequence, event = %event_type, "Dispatch");
        self.ctx
            .sink
            .on_dispatch(self.id, sequence, &event_type, message.d);
        Ok(Flow::Continue)
    }

    fn mark_ready(&mut self, link: &mut Link, kind: SessionKind) {
        link.ready = true;
        if let Some(ticket) = link.ticket.take() {
            ticket.release();
        }
        self.backoff.reset();
        self.state.set(ShardState::Ready);
        info!(?kind, "Session ready");
        self.ctx
            .sink
            .on_shard_event(self.id, ShardEvent::SessionStarted { kind });
    }

    /// Clear the session and tell the application what was lost
    fn drop_session(&self) {
        if !self.ctx.sessions.is_resumable(self.id) {
            self.ctx.sessions.clear(self.id);
            return;
        }
        let last_sequence = self.ctx.sessions.sequence(self.id);
        self.ctx.sessions.clear(self.id);
        self.ctx
            .sink
            .on_shard_event(self.id, ShardEvent::Discontinuity { last_sequence });
    }

    /// Count a dropped message; past the budget the connection is abandoned
    fn violation(&self, link: &mut Link, reason: &str) -> Result<(), GatewayError> {
        link.violations += 1;
        warn!(reason, violations = link.violations, "Protocol violation, message dropped");
        if link.violations > MAX_PROTOCOL_VIOLATIONS {
            return Err(GatewayError::Protocol(format!(
                "{} violations on one connection, last: {reason}",
                link.violations
            )));
        }
        Ok(())
    }

    fn on_close(&self, code: Option<u16>) -> Result<Outcome, GatewayError> {
        match code.and_then(|code| CloseCode::try_from(code).ok()) {
            Some(close) => {
                if let Some(err) = GatewayError::from_close(close) {
                    return Err(err);
                }
                if close.invalidates_session() {
                    warn!(code = %close, "Session invalidated by close");
                    self.drop_session();
                } else {
                    warn!(code = %close, "Connection closed by server");
                }
            }
            None => warn!(?code, "Connection closed"),
        }
        Ok(Outcome::Reconnect)
    }

    async fn end_link(&self, link: &mut Link, end: LinkEnd) -> Result<Outcome, GatewayError> {
        match end {
            LinkEnd::Closed(code) => self.on_close(code),
            LinkEnd::Dropped(reason) => {
                warn!(%reason, "Connection lost");
                Ok(Outcome::Reconnect)
            }
            LinkEnd::Shutdown => {
                info!("Shutdown requested");
                close(&mut link.sink, CloseCode::NORMAL).await;
                Ok(Outcome::Shutdown)
            }
        }
    }
}

async fn next_event(
    shutdown: &mut watch::Receiver<bool>,
    stream: &mut FrameStream,
    deadline: Instant,
) -> LinkEvent {
    tokio::select! {
        biased;
        () = wait_for_shutdown(shutdown) => LinkEvent::End(LinkEnd::Shutdown),
        frame = stream.next() => match frame {
            Some(Ok(GatewayFrame::Text(text))) => LinkEvent::Text(text),
            Some(Ok(GatewayFrame::Close(code))) => LinkEvent::End(LinkEnd::Closed(code)),
            Some(Err(e)) => LinkEvent::End(LinkEnd::Dropped(e.to_string())),
            None => LinkEvent::End(LinkEnd::Dropped("stream ended".to_string())),
        },
        () = sleep_until(deadline) => LinkEvent::Timer,
    }
}

/// Resolves once shutdown is signalled or the signal sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn send(sink: &mut FrameSink, message: &GatewayMessage) -> Result<(), GatewayError> {
    sink.send(GatewayFrame::Text(message.to_json()?)).await?;
    Ok(())
}

async fn close(sink: &mut FrameSink, code: u16) {
    if let Err(e) = sink.send(GatewayFrame::Close(Some(code))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}
