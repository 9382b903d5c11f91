//! Forwards new log lines to the hub's REST API
//!
//! Each complete line is parsed according to its [`LogKind`] and POSTed to
//! `/api/event/add`; the raw line goes to `/api/log/add`. The read offset is
//! saved to a JSON state file after every poll, so a restarted agent resumes
//! where it stopped instead of re-sending the whole file. A line whose event
//! was stored but whose raw log was not is retried without the event.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, instrument, trace, warn};

use super::AUTH;
use super::audit_log::AuditParser;
use super::auth_log::parse_auth_line;

/// Which log a forwarder tails and how its lines become events
#[derive(Debug, Clone)]
pub enum LogKind {
    /// syslog `auth.log`, forwarded as `AUTH` events
    Auth,
    /// auditd `audit.log`, forwarded under each record's own type
    Audit(AuditParser),
}

impl LogKind {
    pub fn audit() -> anyhow::Result<Self> {
        let parser = AuditParser::new().context("failed to compile audit patterns")?;
        Ok(LogKind::Audit(parser))
    }

    /// `Ok(None)` for lines that are valid but not forwarded
    fn parse(&self, line: &str, year: i32) -> anyhow::Result<Option<LogEntry>> {
        match self {
            LogKind::Auth => {
                let event = parse_auth_line(line, year, &Local)?;
                Ok(Some(LogEntry {
                    timestamp: event.timestamp,
                    kind: AUTH.to_string(),
                    data: event.props(),
                    raw_content: event.raw_content,
                }))
            }
            LogKind::Audit(parser) => Ok(parser.parse(line)?.map(|event| LogEntry {
                timestamp: event.timestamp,
                data: event.props(),
                kind: event.record_type,
                raw_content: event.raw_content,
            })),
        }
    }
}

/// A parsed line ready to be sent
#[derive(Debug, Clone, PartialEq)]
struct LogEntry {
    timestamp: i64,
    kind: String,
    data: Value,
    raw_content: String,
}

/// Progress through the tailed file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailState {
    /// Lines consumed so far
    pub line: u64,
    /// Byte offset of the first unread byte
    pub position: u64,
    /// The line at `position` already has its event stored; only its raw
    /// log is still owed
    #[serde(default)]
    pub event_sent: bool,
}

impl TailState {
    /// Load saved state; a missing or unreadable file starts from the beginning
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => {
                    info!("resuming from saved session {}", path.display());
                    state
                }
                Err(e) => {
                    warn!("ignoring corrupt session file {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                debug!("no saved session at {}", path.display());
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("failed to write session file {}", path.display()))
    }
}

pub struct LogForwarder {
    client: reqwest::Client,
    base_url: String,
    machine_id: String,
    kind: LogKind,
    log_path: PathBuf,
    state_path: PathBuf,
    state: TailState,
}

impl LogForwarder {
    pub async fn new(
        base_url: impl Into<String>,
        machine_id: impl Into<String>,
        kind: LogKind,
        log_path: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        let state_path = state_path.into();
        let state = TailState::load(&state_path).await;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            machine_id: machine_id.into(),
            kind,
            log_path: log_path.into(),
            state_path,
            state,
        })
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    /// Poll forever
    #[instrument(skip_all, fields(log = %self.log_path.display()))]
    pub async fn run(mut self, poll_interval: Duration) {
        loop {
            match self.poll_once().await {
                Ok(0) => trace!("no new lines"),
                Ok(sent) => debug!("forwarded {sent} lines"),
                Err(e) => warn!("forwarding stopped early: {e:#}"),
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Forward every complete line written since the last poll
    ///
    /// Stops at the first line the hub does not accept; that line is retried
    /// on the next poll. Returns how many lines were consumed.
    pub async fn poll_once(&mut self) -> anyhow::Result<usize> {
        let (chunk, start) = self.read_new_bytes().await?;
        let year = Local::now().year();

        let mut offset = start;
        let mut consumed = 0;
        let mut result = Ok(());

        for raw in chunk.split_inclusive(|b| *b == b'\n') {
            // A trailing partial line is left for the next poll.
            if !raw.ends_with(b"\n") {
                break;
            }

            let line = String::from_utf8_lossy(raw);
            let line = line.trim();

            if !line.is_empty() {
                match self.kind.parse(line, year) {
                    Ok(Some(entry)) => {
                        if let Err(e) = self.forward(&entry).await {
                            result = Err(e);
                            break;
                        }
                    }
                    Ok(None) => trace!("line {} not forwarded", self.state.line + 1),
                    Err(e) => warn!("skipping line {}: {e}", self.state.line + 1),
                }
            }

            offset += raw.len() as u64;
            consumed += 1;
            self.state.line += 1;
            self.state.position = offset;
        }

        if consumed > 0 || self.state.event_sent {
            self.state.save(&self.state_path).await?;
        }

        result.map(|()| consumed)
    }

    /// Bytes from the saved position to EOF, and the position they start at
    async fn read_new_bytes(&mut self) -> anyhow::Result<(Vec<u8>, u64)> {
        let mut file = tokio::fs::File::open(&self.log_path)
            .await
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;

        let len = file.metadata().await?.len();
        if len < self.state.position {
            info!("{} shrank, assuming rotation", self.log_path.display());
            self.state = TailState::default();
        }

        file.seek(std::io::SeekFrom::Start(self.state.position))
            .await?;
        let mut chunk = Vec::new();
        file.read_to_end(&mut chunk).await?;

        Ok((chunk, self.state.position))
    }

    async fn forward(&mut self, entry: &LogEntry) -> anyhow::Result<()> {
        let log_filepath = self.log_path.display().to_string();

        if self.state.event_sent {
            debug!("event for line {} already stored", self.state.line + 1);
        } else {
            self.client
                .post(format!("{}/api/event/add", self.base_url))
                .json(&json!({
                    "machine_id": self.machine_id,
                    "timestamp": entry.timestamp,
                    "type": entry.kind,
                    "log_filepath": log_filepath,
                    "data": entry.data,
                }))
                .send()
                .await
                .context("failed to send event")?
                .error_for_status()
                .context("hub rejected event")?;
            self.state.event_sent = true;
        }

        self.client
            .post(format!("{}/api/log/add", self.base_url))
            .json(&json!({
                "machine_id": self.machine_id,
                "timestamp": entry.timestamp,
                "type": entry.kind,
                "log_filepath": log_filepath,
                "content": entry.raw_content,
            }))
            .send()
            .await
            .context("failed to send log")?
            .error_for_status()
            .context("hub rejected log")?;
        self.state.event_sent = false;

        Ok(())
    }
}
