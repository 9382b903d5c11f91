use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use attestation_server::{
    agent::{LogForwarder, LogKind, UsageStreamer, socket_url},
    util::{DEFAULT_MACHINE_ID_PATH, read_machine_id},
};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Hub base URL
    #[arg(short, long, env = "ATTESTATION_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// File holding this machine's id
    #[arg(long, env = "MACHINE_ID_PATH", default_value = DEFAULT_MACHINE_ID_PATH)]
    machine_id_path: PathBuf,

    /// Use this id instead of reading `machine_id_path`
    #[arg(long)]
    machine_id: Option<String>,

    /// Seconds between usage samples
    #[arg(short, long, default_value_t = 1)]
    interval: u64,

    /// Authentication log to forward
    #[arg(long, env = "AUTH_LOG", default_value = "/var/log/auth.log")]
    auth_log: PathBuf,

    /// Audit log to forward
    #[arg(long, env = "AUDIT_LOG", default_value = "/var/log/audit/audit.log")]
    audit_log: PathBuf,

    /// Seconds between log polls
    #[arg(long, alias = "auth-interval", default_value_t = 60)]
    log_interval: u64,

    /// Where the auth log read position is saved
    #[arg(long, env = "AGENT_STATE_PATH", default_value = ".attestation-agent.session")]
    state_path: PathBuf,

    /// Where the audit log read position is saved
    #[arg(
        long,
        env = "AGENT_AUDIT_STATE_PATH",
        default_value = ".attestation-agent.audit.session"
    )]
    audit_state_path: PathBuf,

    /// Do not forward the auth log
    #[arg(long)]
    no_auth_log: bool,

    /// Do not forward the audit log
    #[arg(long)]
    no_audit_log: bool,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("attestation_server", LevelFilter::DEBUG),
        ("attestation_agent", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let machine_id = match args.machine_id.clone() {
        Some(id) => id,
        None => read_machine_id(&args.machine_id_path)?,
    };
    info!("reporting as machine {machine_id}");

    let streamer = UsageStreamer::new(
        socket_url(&args.server),
        machine_id.clone(),
        Duration::from_secs(args.interval.max(1)),
    );
    let mut tasks = vec![tokio::spawn(streamer.run())];

    let poll_interval = Duration::from_secs(args.log_interval.max(1));

    if args.no_auth_log {
        info!("auth log forwarding disabled");
    } else {
        let forwarder = LogForwarder::new(
            args.server.clone(),
            machine_id.clone(),
            LogKind::Auth,
            args.auth_log.clone(),
            args.state_path.clone(),
        )
        .await
        .context("failed to start auth log forwarder")?;
        tasks.push(tokio::spawn(forwarder.run(poll_interval)));
    }

    if args.no_audit_log {
        info!("audit log forwarding disabled");
    } else {
        let forwarder = LogForwarder::new(
            args.server.clone(),
            machine_id,
            LogKind::audit()?,
            args.audit_log.clone(),
            args.audit_state_path.clone(),
        )
        .await
        .context("failed to start audit log forwarder")?;
        tasks.push(tokio::spawn(forwarder.run(poll_interval)));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    warn!("interrupted, stopping agent");

    for task in tasks {
        task.abort();
    }

    Ok(())
}
