use crate::config::Config;
use crate::settings::{ClientSettings, SettingsError};
use crate::validation::MAX_BROKER_RETRY;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_retry::Retry;
use uuid::Uuid;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);
const KEEP_ALIVE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("BROKERRETRY {retries} exceeds the limit of {max}")]
    TooManyRetries { retries: u32, max: u32 },
    #[error("no CONNACK within {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("broker {addr} unreachable after {attempts} attempt(s): {last}")]
    Unreachable {
        addr: String,
        attempts: u32,
        last: Box<ProbeError>,
    },
}

/// Checks that the configured broker accepts an MQTT connection.
///
/// Connects under a derived client id so a live device using `DEVICEID` is not kicked off
/// the broker.
#[derive(Debug, Clone)]
pub struct BrokerProbe {
    host: String,
    port: u16,
    client_id: String,
    retries: u32,
    timeout: Duration,
    retry_interval: Duration,
}

/// Delays between attempts: start at `interval`, double each time, cap at 60 s.
pub fn backoff_delays(interval: Duration, retries: u32) -> impl Iterator<Item = Duration> {
    (0..retries).map(move |n| {
        interval
            .checked_mul(2u32.saturating_pow(n))
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    })
}

impl BrokerProbe {
    pub fn new(settings: &ClientSettings, config: &Config) -> Result<Self, ProbeError> {
        let suffix = Uuid::new_v4().simple().to_string();
        let device = settings.device.id.trim();
        let client_id = if device.is_empty() {
            format!("mmrc-probe-{}", &suffix[..8])
        } else {
            format!("{}-probe-{}", device, &suffix[..8])
        };

        let retries = settings.broker.retry()?;
        if retries > MAX_BROKER_RETRY {
            return Err(ProbeError::TooManyRetries {
                retries,
                max: MAX_BROKER_RETRY,
            });
        }

        Ok(Self {
            host: settings.broker.ip.trim().to_string(),
            port: settings.broker.port()?,
            client_id,
            retries,
            timeout: Duration::from_millis(config.probe_timeout_ms),
            retry_interval: Duration::from_millis(config.retry_interval_ms),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(&self.client_id, &self.host, self.port);
        mqtt_options.set_keep_alive(KEEP_ALIVE);
        mqtt_options.set_clean_session(true);
        mqtt_options
    }

    /// Try to connect, retrying `BROKERRETRY` times. Returns the number of attempts used.
    pub async fn run(&self) -> Result<u32, ProbeError> {
        info!("Probing MQTT broker at {}...", self.address());

        let mut attempts = 0u32;
        let strategy = backoff_delays(self.retry_interval, self.retries);

        let result = Retry::start(strategy, || {
            attempts += 1;
            let attempt = attempts;
            let options = self.mqtt_options();
            let limit = self.timeout;
            async move {
                debug!("Connection attempt {}", attempt);
                connect_once(options, limit).await.inspect_err(|e| {
                    warn!("Attempt {} failed: {}", attempt, e);
                })
            }
        })
        .await;

        match result {
            Ok(()) => {
                info!("Broker {} accepted the connection.", self.address());
                Ok(attempts)
            }
            Err(last) => Err(ProbeError::Unreachable {
                addr: self.address(),
                attempts,
                last: Box::new(last),
            }),
        }
    }
}

async fn connect_once(options: MqttOptions, limit: Duration) -> Result<(), ProbeError> {
    let (client, mut eventloop) = AsyncClient::new(options, 10);

    let outcome = timeout(limit, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(event) => debug!("Unhandled event: {:?}", event),
                Err(e) => return Err(ProbeError::Connection(e.to_string())),
            }
        }
    })
    .await
    .map_err(|_| ProbeError::Timeout(limit))?;
    outcome?;

    if let Err(e) = client.disconnect().await {
        warn!("Failed to queue DISCONNECT: {}", e);
    }
    // Flush the DISCONNECT; the broker closing the socket is expected here.
    let _ = timeout(Duration::from_millis(200), eventloop.poll()).await;
    Ok(())
}
