use std::future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::Instrument;
use voicekeep_models::gateway::*;
use voicekeep_models::presence::{PresenceStatus, PresenceUpdate};
use voicekeep_models::user::Ready;
use voicekeep_models::voice::VoiceState;
use voicekeep_util::redact::redact_token;

use crate::config::{ConfigError, GatewayConfig};
use crate::events::{ConnectionState, EventHub, GatewayEvent};
use crate::heartbeat::HeartbeatScheduler;
use crate::reconnect::{ReconnectPolicy, RetryDecision};
use crate::session::SessionIdentity;
use crate::transport::{ConnectionHandle, Connector, Inbound, TransportError};
use crate::voice::{VoiceObservation, VoiceStateTracker, VoiceTarget};

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Wait after the transport opens before re-sending the voice-join command.
const VOICE_JOIN_GRACE: Duration = Duration::from_millis(1000);
/// How long the rejoin guard stays held after the rejoin command went out.
const REJOIN_SETTLE: Duration = Duration::from_millis(1000);
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("gateway sent a zero heartbeat interval")]
    ZeroHeartbeatInterval,
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    EnableAutoReconnect,
}

/// Handle to one gateway session. Cloning shares the session; the session
/// task ends once every handle is dropped.
#[derive(Clone)]
pub struct GatewayClient {
    commands: mpsc::UnboundedSender<Command>,
    events: EventHub,
    state: watch::Receiver<ConnectionState>,
    target: VoiceTarget,
    redacted_token: String,
}

impl GatewayClient {
    /// Validate `config` and spawn the session task. Nothing connects until
    /// [`connect`](Self::connect) is called.
    pub fn spawn(config: GatewayConfig, connector: Arc<dyn Connector>) -> Result<Self, ConfigError> {
        Self::spawn_with_url(config, connector, GATEWAY_URL)
    }

    pub fn spawn_with_url(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let events = EventHub::new(EVENT_CHANNEL_CAPACITY);
        let target = config.voice_target();
        let redacted_token = redact_token(&config.token);

        let connection = GatewayConnection {
            url: url.into(),
            connector,
            session: SessionIdentity::new(config.token.clone()),
            voice: VoiceStateTracker::new(target.clone()),
            presence: config.presence_status(),
            heartbeat: HeartbeatScheduler::new(),
            policy: ReconnectPolicy::new(
                config.auto_reconnect.enabled,
                config.reconnect_delay(),
                config.auto_reconnect.max_retries,
            ),
            events: events.clone(),
            state: state_tx,
            transport: None,
            connecting: None,
            timers: Timers::default(),
        };

        let span = tracing::info_span!("gateway", token = %redacted_token);
        tokio::spawn(connection.run(command_rx).instrument(span));

        Ok(Self {
            commands: command_tx,
            events,
            state: state_rx,
            target,
            redacted_token,
        })
    }

    /// Open the transport. A no-op while connecting, connected, or waiting
    /// on a re-identify after an invalidated session. On a live transport
    /// whose retry budget is spent, re-sends the voice join once instead.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Disable automatic retries and tear the connection down.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Re-arm automatic retries after a manual disconnect.
    pub fn enable_auto_reconnect(&self) {
        let _ = self.commands.send(Command::EnableAutoReconnect);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn target(&self) -> &VoiceTarget {
        &self.target
    }

    pub fn redacted_token(&self) -> &str {
        &self.redacted_token
    }
}

#[derive(Default)]
struct Timers {
    reconnect: Option<Instant>,
    /// Re-send of op 4 one grace period after the transport opens. Only
    /// fires while still `Identifying`: READY cancels it and joins itself.
    voice_join: Option<Instant>,
    rejoin: Option<Instant>,
    rejoin_settle: Option<Instant>,
}

/// The session task. Every inbound frame, timer and command is handled here
/// one at a time, so none of the state below needs locking.
struct GatewayConnection {
    url: String,
    connector: Arc<dyn Connector>,
    session: SessionIdentity,
    voice: VoiceStateTracker,
    presence: Option<PresenceStatus>,
    heartbeat: HeartbeatScheduler,
    policy: ReconnectPolicy,
    events: EventHub,
    state: watch::Sender<ConnectionState>,
    transport: Option<ConnectionHandle>,
    connecting: Option<BoxFuture<'static, Result<ConnectionHandle, TransportError>>>,
    timers: Timers,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending::<()>().await,
    }
}

async fn poll_connecting(
    connecting: &mut Option<BoxFuture<'static, Result<ConnectionHandle, TransportError>>>,
) -> Result<ConnectionHandle, TransportError> {
    match connecting.as_mut() {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}

async fn next_inbound(
    transport: &mut Option<ConnectionHandle>,
) -> Option<Result<Inbound, TransportError>> {
    match transport.as_mut() {
        Some(transport) => transport.next().await,
        None => future::pending().await,
    }
}

impl GatewayConnection {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect) => self.connect(),
                    Some(Command::Disconnect) => self.disconnect().await,
                    Some(Command::EnableAutoReconnect) => {
                        self.policy.enable();
                        self.events.debug("Auto-reconnect re-enabled");
                    }
                    None => {
                        self.cleanup().await;
                        tracing::debug!("all client handles dropped; session task exiting");
                        break;
                    }
                },
                result = poll_connecting(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result);
                }
                inbound = next_inbound(&mut self.transport) => self.on_inbound(inbound).await,
                _ = self.heartbeat.tick() => self.on_heartbeat_tick().await,
                _ = sleep_until_opt(self.timers.reconnect) => {
                    self.timers.reconnect = None;
                    self.session.revalidate();
                    self.connect();
                }
                _ = sleep_until_opt(self.timers.voice_join) => {
                    self.timers.voice_join = None;
                    self.on_voice_join_grace().await;
                }
                _ = sleep_until_opt(self.timers.rejoin) => {
                    self.timers.rejoin = None;
                    self.on_rejoin_timer().await;
                }
                _ = sleep_until_opt(self.timers.rejoin_settle) => {
                    self.timers.rejoin_settle = None;
                    self.policy.finish_rejoin();
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::trace!(from = previous.as_str(), to = state.as_str(), "state change");
        }
    }

    fn connect(&mut self) {
        if !self.session.is_valid() {
            self.events
                .debug("Session invalidated; waiting for the scheduled re-identify");
            return;
        }
        if self.transport.is_some() && self.policy.is_exhausted() {
            self.retry_voice_after_exhaustion();
            return;
        }
        if self.connecting.is_some() || self.transport.is_some() {
            tracing::debug!("connect ignored: connection already in progress");
            return;
        }
        self.timers.reconnect = None;
        self.set_state(ConnectionState::Connecting);
        self.connecting = Some(self.connector.connect(&self.url));
    }

    /// External retry on a transport that stayed up after the rejoin budget
    /// ran out. One join per call; a confirmed placement refills the budget.
    fn retry_voice_after_exhaustion(&mut self) {
        if !self.voice.target().is_configured() {
            return;
        }
        self.events
            .debug("Retry budget exhausted; rejoining voice channel on request");
        self.set_state(ConnectionState::Ready);
        self.timers.rejoin = Some(Instant::now());
    }

    fn on_connect_result(&mut self, result: Result<ConnectionHandle, TransportError>) {
        match result {
            Ok(handle) => {
                self.transport = Some(handle);
                self.set_state(ConnectionState::Open);
                self.events.emit(GatewayEvent::Connected);
                self.events.debug("Connected to gateway");
                self.timers.voice_join = Some(Instant::now() + VOICE_JOIN_GRACE);
            }
            Err(e) => {
                self.events.error(format!("Connection error: {e}"));
                self.set_state(ConnectionState::Closed);
                self.schedule_reconnect();
            }
        }
    }

    async fn on_inbound(&mut self, inbound: Option<Result<Inbound, TransportError>>) {
        match inbound {
            Some(Ok(Inbound::Text(text))) => self.on_frame(&text).await,
            Some(Ok(Inbound::Closed { code, reason })) => self.on_close(code, &reason).await,
            Some(Err(e)) => {
                self.events.error(format!("WebSocket error: {e}"));
                self.on_close(None, &e.to_string()).await;
            }
            None => self.on_close(None, "stream ended").await,
        }
    }

    async fn on_frame(&mut self, text: &str) {
        let message = match GatewayMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                self.events.error(format!("Error processing message: {e}"));
                return;
            }
        };
        if message.is_excluded() {
            return;
        }
        self.session.observe_sequence(message.s);

        let op = message.op;
        if let Err(e) = self.dispatch(message).await {
            tracing::warn!(op, "frame handling failed: {e}");
            self.events.error(format!("Error processing message: {e}"));
        }
    }

    async fn dispatch(&mut self, message: GatewayMessage) -> Result<(), GatewayError> {
        match message.op {
            OP_HELLO => {
                let hello: Hello = message.payload()?;
                if hello.heartbeat_interval == 0 {
                    return Err(GatewayError::ZeroHeartbeatInterval);
                }
                self.events.debug("Received Hello (op 10)");
                self.heartbeat
                    .start(Duration::from_millis(hello.heartbeat_interval));
                self.identify().await?;
            }
            OP_HEARTBEAT_ACK => {
                self.heartbeat.acknowledge();
                self.events.debug("Heartbeat acknowledged");
            }
            OP_HEARTBEAT => {
                // Server-requested heartbeat, answered immediately.
                self.send_heartbeat().await?;
            }
            OP_INVALID_SESSION => self.on_invalid_session().await,
            OP_DISPATCH => match message.event_type() {
                Some(EVENT_READY) => self.on_ready(message.payload()?).await?,
                Some(EVENT_VOICE_STATE_UPDATE) => self.on_voice_state(message.payload()?).await?,
                _ => {}
            },
            op => tracing::trace!(op, "unhandled opcode"),
        }
        Ok(())
    }

    /// Send a frame if the transport is open. Returns whether it was sent.
    async fn send_frame(&mut self, frame: &GatewayMessage) -> Result<bool, GatewayError> {
        let Some(transport) = self.transport.as_mut().filter(|t| t.is_open()) else {
            return Ok(false);
        };
        let text = frame.encode()?;
        transport.send_text(text).await?;
        tracing::trace!(op = frame.op, "frame sent");
        Ok(true)
    }

    async fn identify(&mut self) -> Result<(), GatewayError> {
        self.set_state(ConnectionState::Identifying);
        let frame = GatewayMessage::command(OP_IDENTIFY, &Identify::new(self.session.token()))?;
        if self.send_frame(&frame).await? {
            self.events.debug("Sending identify payload");
        }
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), GatewayError> {
        let frame = GatewayMessage::heartbeat(self.session.last_sequence());
        if self.send_frame(&frame).await? {
            self.heartbeat.mark_sent();
            self.events.debug("Sending heartbeat");
        }
        Ok(())
    }

    async fn on_heartbeat_tick(&mut self) {
        if self.heartbeat.ack_overdue() {
            self.events
                .error("Heartbeat not acknowledged within one interval; closing zombied connection");
            self.on_close(None, "heartbeat acknowledgement timed out").await;
            return;
        }
        if let Err(e) = self.send_heartbeat().await {
            self.events.error(format!("Failed to send heartbeat: {e}"));
        }
    }

    async fn on_ready(&mut self, ready: Ready) -> Result<(), GatewayError> {
        let user = ready.user;
        self.session.set_user(user.id.clone());
        self.set_state(ConnectionState::Ready);
        self.timers.voice_join = None;
        tracing::info!(user_id = %user.id, "session ready");
        self.events.emit(GatewayEvent::Ready {
            username: user.username.clone(),
            discriminator: user.discriminator.clone(),
        });
        self.events
            .debug(format!("Logged in as {}#{}", user.username, user.discriminator));
        self.join_voice_channel().await?;
        self.send_presence().await?;
        Ok(())
    }

    async fn on_voice_state(&mut self, state: VoiceState) -> Result<(), GatewayError> {
        if !self.session.is_own_user(&state.user_id) {
            return Ok(());
        }
        match self.voice.observe(&state) {
            VoiceObservation::Confirmed => {
                self.policy.reset();
                if *self.state.borrow() == ConnectionState::Exhausted {
                    self.set_state(ConnectionState::Ready);
                }
                self.events.emit(GatewayEvent::VoiceReady);
                self.events.debug("Successfully joined voice channel");
            }
            VoiceObservation::Drift => self.on_voice_drift(&state),
            VoiceObservation::AlreadyConfirmed | VoiceObservation::Untracked => {}
        }
        Ok(())
    }

    fn on_voice_drift(&mut self, state: &VoiceState) {
        match self.policy.begin_rejoin() {
            RetryDecision::Scheduled { attempt, delay } => {
                self.events.debug(format!(
                    "Voice placement drifted (channel {:?}); rejoining in {}ms ({}/{})",
                    state.channel_id,
                    delay.as_millis(),
                    attempt,
                    self.policy.max_retries()
                ));
                self.timers.rejoin = Some(Instant::now() + delay);
            }
            RetryDecision::InFlight => {
                self.events.debug("Rejoin already in flight; ignoring this event");
            }
            RetryDecision::Disabled => {
                tracing::debug!("voice drift observed with auto-reconnect disabled");
            }
            RetryDecision::Exhausted { attempts } => {
                self.on_exhausted(attempts);
                self.set_state(ConnectionState::Exhausted);
            }
            RetryDecision::Halted => self.set_state(ConnectionState::Exhausted),
        }
    }

    async fn on_rejoin_timer(&mut self) {
        if let Err(e) = self.join_voice_channel().await {
            self.events.error(format!("Failed to rejoin voice channel: {e}"));
        }
        self.timers.rejoin_settle = Some(Instant::now() + REJOIN_SETTLE);
    }

    async fn on_voice_join_grace(&mut self) {
        // Op 4 is only accepted once Identify is out. READY cancels this
        // timer and joins on its own.
        let state = *self.state.borrow();
        if state != ConnectionState::Identifying {
            tracing::debug!(state = state.as_str(), "skipping voice join: not identified yet");
            return;
        }
        if let Err(e) = self.join_voice_channel().await {
            self.events.error(format!("Failed to join voice channel: {e}"));
        }
    }

    async fn join_voice_channel(&mut self) -> Result<(), GatewayError> {
        let Some(command) = self.voice.target().join_command() else {
            return Ok(());
        };
        let frame = GatewayMessage::command(OP_VOICE_STATE_UPDATE, &command)?;
        if self.send_frame(&frame).await? {
            self.events.debug("Sent voice channel join request");
        }
        Ok(())
    }

    async fn send_presence(&mut self) -> Result<(), GatewayError> {
        let Some(status) = self.presence else {
            return Ok(());
        };
        let update = PresenceUpdate::afk(status, chrono::Utc::now().timestamp());
        let frame = GatewayMessage::command(OP_PRESENCE_UPDATE, &update)?;
        if self.send_frame(&frame).await? {
            self.events.debug(format!("Status updated to {status}"));
        }
        Ok(())
    }

    async fn on_invalid_session(&mut self) {
        self.events.debug("Invalid session. Reconnecting...");
        self.session.invalidate();
        self.cleanup().await;
        // Re-identify regardless of the retry policy. Only disconnect()
        // cancels it, through cleanup.
        let delay = self.policy.delay();
        self.events
            .debug(format!("Re-identifying in {}ms", delay.as_millis()));
        self.timers.reconnect = Some(Instant::now() + delay);
    }

    async fn on_close(&mut self, code: Option<u16>, reason: &str) {
        self.events.emit(GatewayEvent::Disconnected);
        self.events
            .debug(format!("Disconnected. Code: {code:?}, Reason: {reason}"));
        self.cleanup().await;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.policy.next_reconnect() {
            RetryDecision::Scheduled { attempt, delay } => {
                self.events.debug(format!(
                    "Reconnecting in {}ms ({}/{})",
                    delay.as_millis(),
                    attempt,
                    self.policy.max_retries()
                ));
                self.timers.reconnect = Some(Instant::now() + delay);
            }
            RetryDecision::Disabled => {
                tracing::debug!("auto-reconnect disabled; staying idle");
                self.set_state(ConnectionState::Idle);
            }
            RetryDecision::Exhausted { attempts } => {
                self.on_exhausted(attempts);
                self.set_state(ConnectionState::Exhausted);
            }
            RetryDecision::Halted => self.set_state(ConnectionState::Exhausted),
            RetryDecision::InFlight => {}
        }
    }

    fn on_exhausted(&mut self, attempts: u32) {
        tracing::error!(attempts, "retry budget exhausted; automatic recovery stopped");
        self.events.emit(GatewayEvent::ReconnectExhausted);
        self.events.debug("Max reconnect attempts reached. Stopping.");
    }

    /// Cancel every timer, drop the transport and reset per-connection
    /// state. Idempotent.
    async fn cleanup(&mut self) {
        self.heartbeat.stop();
        self.timers = Timers::default();
        self.policy.finish_rejoin();
        self.connecting = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.session.reset();
        self.voice.reset();
        self.set_state(ConnectionState::Closed);
    }

    async fn disconnect(&mut self) {
        self.policy.disable();
        self.cleanup().await;
        self.session.revalidate();
        self.set_state(ConnectionState::Idle);
        self.events.debug("Client manually disconnected");
    }
}
