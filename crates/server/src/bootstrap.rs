use std::{sync::Arc, time::Duration};

use marvin_core::config::AppConfig;
use marvin_skills::register_defaults;
use marvin_slack::{
    spawn_poster, ConnectionManager, Dispatcher, GatewayError, KeepaliveSettings, SlackGateway,
    SlackWebClient, SocketConnector, TungsteniteConnector,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub connection: Arc<ConnectionManager>,
    pub poster: JoinHandle<()>,
}

impl Application {
    /// Closes the live socket and drops the manager, which releases every
    /// reply sender, then lets the poster flush what was already queued.
    /// Returns `false` when `drain` elapsed and the poster was aborted.
    pub async fn shutdown(self, drain: Duration) -> bool {
        let Application { connection, mut poster, .. } = self;
        connection.shutdown().await;
        drop(connection);

        match tokio::time::timeout(drain, &mut poster).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    event_name = "system.shutdown.poster_drain_timeout",
                    drain_ms = drain.as_millis() as u64,
                    "outbound poster did not drain in time; dropping queued replies"
                );
                poster.abort();
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("slack client could not be created: {0}")]
    Gateway(#[from] GatewayError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let gateway: Arc<dyn SlackGateway> = Arc::new(SlackWebClient::new(&config.slack)?);
    Ok(assemble(config, gateway, Arc::new(TungsteniteConnector)))
}

/// Wires gateway, capabilities, outbound poster and connection manager.
/// Must run inside a tokio runtime since it spawns the poster task.
pub fn assemble(
    config: AppConfig,
    gateway: Arc<dyn SlackGateway>,
    connector: Arc<dyn SocketConnector>,
) -> Application {
    let (outbound, poster) = spawn_poster(gateway.clone());
    let mut dispatcher = Dispatcher::new(outbound);
    register_defaults(&mut dispatcher);
    info!(
        event_name = "system.bootstrap.capabilities_registered",
        capability_count = dispatcher.capability_count(),
        "capabilities registered"
    );

    let connection = Arc::new(ConnectionManager::new(
        gateway,
        connector,
        Arc::new(dispatcher),
        KeepaliveSettings::from(&config.keepalive),
    ));

    Application { config, connection, poster }
}


#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use marvin_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use marvin_slack::ConnectionState;

    use crate::bootstrap::{
        assemble, bootstrap_with_config,
        test_support::{StubConnector, StubGateway},
    };

    const DIRECT_MESSAGE: &str = r#"{"type":"message","user":"U1","channel":"D1","text":"hi","client_msg_id":"x","team":"T1","event_ts":"1","ts":"1"}"#;

    #[tokio::test]
    async fn bootstrap_starts_disconnected_until_first_establish() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                slack_token: Some("xoxb-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should load with a bot token");

        let app = bootstrap_with_config(config).expect("bootstrap should succeed");

        assert_eq!(app.connection.state(), ConnectionState::Disconnected);
        assert!(!app.connection.has_live_socket());
        assert!(app.connection.connection().is_none());
        app.poster.abort();
    }

    #[tokio::test]
    async fn shutdown_flushes_replies_accepted_before_close() {
        let gateway = Arc::new(StubGateway::accepting());
        let connector = Arc::new(StubConnector::with_frames(&[DIRECT_MESSAGE]));
        let app = assemble(AppConfig::default(), gateway.clone(), connector);
        app.connection.establish().await.expect("establish");

        for _ in 0..200 {
            if gateway.lookup_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(gateway.lookup_count(), 2, "frame should reach addressing");

        let drained = app.shutdown(Duration::from_secs(5)).await;

        assert!(drained, "poster should finish once the manager is gone");
        let posted = gateway.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].channel, "D1");
        assert_eq!(posted[0].text, "Hi Alice!");
    }

    #[tokio::test]
    async fn shutdown_gives_up_when_a_sender_outlives_the_manager() {
        let gateway = Arc::new(StubGateway::accepting());
        let app = assemble(AppConfig::default(), gateway, Arc::new(StubConnector::idle()));
        let lingering = app.connection.clone();

        let drained = app.shutdown(Duration::from_millis(50)).await;

        assert!(!drained);
        assert_eq!(lingering.state(), ConnectionState::Disconnected);
    }
}
