use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use voicekeep_gateway::{Connector, GatewayClient, GatewayConfig, GatewayEvent};

/// A running session and its position in the token registry.
#[derive(Clone)]
pub struct SessionEntry {
    pub index: usize,
    pub client: GatewayClient,
}

/// Sessions started so far, shared with the status surface.
pub type Sessions = Arc<RwLock<Vec<SessionEntry>>>;

pub struct SupervisorOptions {
    pub gateway_url: String,
    pub stagger: Duration,
    pub sweep_interval: Duration,
}

/// Starts one gateway session per registry entry and keeps an eye on them.
pub struct Supervisor {
    configs: Vec<GatewayConfig>,
    connector: Arc<dyn Connector>,
    options: SupervisorOptions,
    sessions: Sessions,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        configs: Vec<GatewayConfig>,
        connector: Arc<dyn Connector>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            configs,
            connector,
            options,
            sessions: Arc::new(RwLock::new(Vec::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn sessions(&self) -> Sessions {
        self.sessions.clone()
    }

    /// Spawn the staggered startup and the periodic sweep.
    pub fn start(&self) {
        let configs = self.configs.clone();
        let connector = self.connector.clone();
        let url = self.options.gateway_url.clone();
        let stagger = self.options.stagger;
        let sessions = self.sessions.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            for (index, config) in configs.into_iter().enumerate() {
                let at = started + stagger * index as u32;
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep_until(at) => {}
                }
                match GatewayClient::spawn_with_url(config, connector.clone(), url.clone()) {
                    Ok(client) => {
                        tracing::info!(session = index, token = %client.redacted_token(), "starting session");
                        spawn_event_forwarder(index, client.subscribe(), shutdown.clone());
                        client.connect();
                        sessions.write().await.push(SessionEntry { index, client });
                    }
                    Err(e) => tracing::error!(session = index, "failed to start session: {e}"),
                }
            }
            tracing::info!("all sessions started");
        });

        let period = self.options.sweep_interval;
        let sessions = self.sessions.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => sweep(&sessions).await,
                }
            }
        });
    }

    /// Stop the background tasks and disconnect every session.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        for entry in self.sessions.read().await.iter() {
            entry.client.disconnect();
        }
        tracing::info!("supervisor stopped");
    }
}

async fn sweep(sessions: &Sessions) {
    let sessions = sessions.read().await;
    let mut nudged = 0;
    for entry in sessions.iter().filter(|e| !e.client.is_connected()) {
        tracing::info!(session = entry.index, state = entry.client.state().as_str(), "sweep: reconnecting");
        entry.client.connect();
        nudged += 1;
    }
    tracing::debug!(total = sessions.len(), nudged, "sweep finished");
}

fn spawn_event_forwarder(
    index: usize,
    mut events: broadcast::Receiver<GatewayEvent>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => log_event(index, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(session = index, skipped, "event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(index: usize, event: &GatewayEvent) {
    match event {
        GatewayEvent::Connected => tracing::info!("[Client {index}] Connected to Discord"),
        GatewayEvent::Disconnected => tracing::warn!("[Client {index}] Disconnected"),
        GatewayEvent::Ready {
            username,
            discriminator,
        } => tracing::info!("[Client {index}] Ready as {username}#{discriminator}"),
        GatewayEvent::VoiceReady => tracing::info!("[Client {index}] Joined voice channel"),
        GatewayEvent::Error { message } => tracing::warn!("[Client {index}] Error: {message}"),
        GatewayEvent::Debug { message } => tracing::debug!("[Client {index}] {message}"),
        GatewayEvent::ReconnectExhausted => {
            tracing::error!("[Client {index}] Reconnect attempts exhausted")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicekeep_gateway::transport::memory::MemoryConnector;
    use voicekeep_gateway::transport::Outbound;

    fn config(n: u8) -> GatewayConfig {
        GatewayConfig::new(format!("{}{}", char::from(b'a' + n), "t".repeat(40)))
            .with_target("g1", "c1")
    }

    fn supervisor(configs: Vec<GatewayConfig>, connector: MemoryConnector) -> Supervisor {
        Supervisor::new(
            configs,
            Arc::new(connector),
            SupervisorOptions {
                gateway_url: "mem://gateway".into(),
                stagger: Duration::from_secs(2),
                sweep_interval: Duration::from_secs(3600),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_start_staggered() {
        let (connector, mut remotes) = MemoryConnector::new();
        let supervisor = supervisor(vec![config(0), config(1), config(2)], connector.clone());
        let begin = Instant::now();
        supervisor.start();

        for expected in [0u64, 2, 4] {
            let _remote = remotes.recv().await.expect("session connects");
            assert_eq!(begin.elapsed().as_secs(), expected);
        }
        assert_eq!(supervisor.sessions().read().await.len(), 3);
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reconnects_idle_sessions() {
        let (connector, mut remotes) = MemoryConnector::new();
        let mut cfg = config(0);
        cfg.auto_reconnect.enabled = false;
        let supervisor = supervisor(vec![cfg], connector.clone());
        supervisor.start();

        let remote = remotes.recv().await.expect("initial connect");
        remote.close(1006, "gone");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);

        let _again = remotes.recv().await.expect("sweep reconnect");
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_rejoins_session_with_spent_budget() {
        let (connector, mut remotes) = MemoryConnector::new();
        let mut cfg = config(0);
        cfg.auto_reconnect.max_retries = 1;
        let supervisor = Supervisor::new(
            vec![cfg],
            Arc::new(connector.clone()),
            SupervisorOptions {
                gateway_url: "mem://gateway".into(),
                stagger: Duration::ZERO,
                sweep_interval: Duration::from_secs(60),
            },
        );
        supervisor.start();

        let mut remote = remotes.recv().await.expect("initial connect");
        remote.send_text(r#"{"op":10,"d":{"heartbeat_interval":600000}}"#);
        assert_eq!(remote.recv_json().await.expect("identify")["op"], 2);
        remote.send_text(
            r#"{"op":0,"t":"READY","s":1,"d":{"user":{"id":"7","username":"keeper"}}}"#,
        );
        assert_eq!(remote.recv_json().await.expect("join")["op"], 4);
        remote.send_text(
            r#"{"op":0,"t":"VOICE_STATE_UPDATE","s":2,"d":{"user_id":"7","guild_id":"g1","channel_id":null}}"#,
        );

        let join = remote.recv_json().await.expect("sweep rejoin");
        assert_eq!(join["op"], 4);
        assert_eq!(join["d"]["channel_id"], "c1");
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disconnects_and_stops_startup() {
        let (connector, mut remotes) = MemoryConnector::new();
        let supervisor = supervisor(vec![config(0), config(1)], connector.clone());
        supervisor.start();

        let mut first = remotes.recv().await.expect("first session");
        let client = supervisor.sessions().read().await[0].client.clone();
        client
            .watch_state()
            .wait_for(|state| state.is_connected())
            .await
            .expect("session alive");
        supervisor.shutdown().await;
        assert_eq!(first.recv().await, Some(Outbound::Close));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(supervisor.sessions().read().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_entry_is_skipped() {
        let (connector, _remotes) = MemoryConnector::new();
        let supervisor = Supervisor::new(
            vec![GatewayConfig::new("")],
            Arc::new(connector),
            SupervisorOptions {
                gateway_url: "mem://gateway".into(),
                stagger: Duration::ZERO,
                sweep_interval: Duration::from_secs(3600),
            },
        );
        supervisor.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(supervisor.sessions().read().await.is_empty());
    }
}
