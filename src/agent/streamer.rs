//! Streams usage samples to the hub relay
//!
//! Connects to `/socket` with the `machine-id` header and sends one
//! `collect_log` frame per interval. Any connection failure is logged and
//! retried after `reconnect_delay`.

use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::time::{MissedTickBehavior, interval};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::USAGE;
use super::usage::UsageSampler;
use crate::api::websocket::MACHINE_ID_HEADER;
use crate::relay::ClientFrame;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct UsageStreamer {
    url: String,
    machine_id: String,
    interval: Duration,
    reconnect_delay: Duration,
    sampler: UsageSampler,
}

impl UsageStreamer {
    pub fn new(url: impl Into<String>, machine_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            machine_id: machine_id.into(),
            interval,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            sampler: UsageSampler::new(),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Stream forever, reconnecting after failures
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn run(mut self) {
        loop {
            match self.stream_once().await {
                Ok(()) => info!("relay closed the connection"),
                Err(e) => warn!("relay connection failed: {e:#}"),
            }

            debug!("reconnecting in {:?}", self.reconnect_delay);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One connection lifetime; returns when the server closes it
    pub async fn stream_once(&mut self) -> anyhow::Result<()> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .context("invalid relay URL")?;
        request.headers_mut().insert(
            MACHINE_ID_HEADER,
            HeaderValue::from_str(&self.machine_id).context("invalid machine id")?,
        );

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("failed to connect to relay")?;
        info!("connected to relay as {}", self.machine_id);

        let (mut sink, mut stream) = socket.split();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sampler.sample();
                    let payload = serde_json::to_value(&report)?;
                    let frame = ClientFrame::collect_log(&self.machine_id, report.timestamp, USAGE, &payload);

                    sink.send(Message::Text(frame))
                        .await
                        .context("failed to send usage sample")?;
                }

                msg = stream.next() => match msg {
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("relay connection error"),
                }
            }
        }
    }
}
