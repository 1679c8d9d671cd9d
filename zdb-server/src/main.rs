//! Cluster node binary (§6.2, §9): loads a cluster configuration file,
//! opens its configured tables against the in-memory store, and runs the
//! replication protocol against every other configured peer until signaled
//! to shut down.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

use zdb_errors::Result;
use zdb_kv::config::{EngineConfig, HostCfg};
use zdb_kv::engine::{Engine, Replicator};
use zdb_kv::ids::HostId;
use zdb_kv::table::Table;
use zdb_ring::RingParams;
use zdb_store::memory::MemoryEngine;
use zdb_store::table::StoreEngine;
use zdb_transport::Cxn;
use zdb_util::shutdown::{self, ShutdownRx};

use config::FileConfig;

// Pulled in solely to install itself as the process-wide global
// allocator; nothing here calls into it directly.
use zdb_alloc as _;

/// Cluster node options (§6.2): everything not already in the
/// configuration file.
#[derive(Parser, Debug)]
#[command(name = "zdb-server", about = "Replicated, shard-partitioned key-value cluster node")]
struct Options {
    /// Path to the cluster configuration file.
    #[arg(long, env = "ZDB_CONFIG")]
    config: PathBuf,

    /// Address the Prometheus metrics exporter listens on.
    #[arg(long, env = "ZDB_METRICS_ADDR", default_value = "127.0.0.1:9090")]
    metrics_addr: SocketAddr,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn init_metrics(addr: SocketAddr) {
    if let Err(err) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::warn!(error = %err, "failed to install Prometheus metrics exporter; continuing without metrics");
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();
    let options = Options::parse();

    match run(options).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(options: Options) -> Result<()> {
    let cfg = FileConfig::load(&options.config)?;
    let local = cfg.local()?;
    let peers = cfg.peers()?;
    let engine_cfg = cfg.timing.engine_config();
    let ring_params = cfg.ring.ring_params();

    init_metrics(options.metrics_addr);

    let engine = Arc::new(Engine::new(local.clone(), peers.clone(), engine_cfg));

    let store = MemoryEngine;
    for entry in &cfg.tables {
        let (store_table, opened) = store.open(entry.schema()).await?;
        let table = Arc::new(Table::new(entry.table_cfg(), store_table, opened, engine.next_sn()));
        engine.register_table(table);
    }

    engine.start();
    tracing::info!(host = %local.id, tables = cfg.tables.len(), peers = peers.len(), "node started");

    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    let accept_task = tokio::spawn(accept_loop(local.port, Arc::clone(&engine), peers.clone(), ring_params, shutdown_rx.child()));

    let connect_tasks: Vec<_> = peers
        .into_iter()
        .map(|peer| tokio::spawn(connect_loop(peer, Arc::clone(&engine), ring_params, engine_cfg.reconnect_freq, shutdown_rx.child())))
        .collect();

    let timers_task = tokio::spawn(timers_loop(Arc::clone(&engine), engine_cfg, shutdown_rx.child()));

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown requested");
    shutdown_tx.shutdown();
    engine.stop();

    let _ = accept_task.await;
    for task in connect_tasks {
        let _ = task.await;
    }
    let _ = timers_task.await;

    Ok(())
}

/// Accept inbound connections, identifying each by matching the remote
/// address's IP against the configured peer list — the source address's
/// ephemeral port can't be, but every configured peer's listening IP is
/// known up front, which is enough to resolve identity without a
/// handshake frame of its own.
async fn accept_loop(port: u16, engine: Arc<Engine>, peers: Vec<HostCfg>, ring_params: RingParams, mut shutdown_rx: ShutdownRx) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, port, "failed to bind listener; accept loop exiting");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = shutdown_rx.signaled() => return,
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                let Some(peer) = peers.iter().find(|p| p.ip == addr.ip()) else {
                    tracing::warn!(%addr, "inbound connection from an unconfigured address; dropping");
                    continue;
                };
                tracing::info!(peer = %peer.id, %addr, "accepted inbound connection");
                tokio::spawn(serve_inbound(stream, peer.id, peer.port, Arc::clone(&engine), ring_params));
            }
        }
    }
}

async fn serve_inbound(stream: TcpStream, peer: HostId, peer_port: u16, engine: Arc<Engine>, ring_params: RingParams) {
    let peer_ip = match stream.peer_addr() {
        Ok(addr) => addr.ip(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read peer address for inbound connection");
            return;
        }
    };
    let cxn = match Cxn::new(peer, (peer_ip, peer_port), ring_params) {
        Ok(cxn) => Arc::new(cxn),
        Err(err) => {
            tracing::warn!(%peer, error = %err, "failed to open outbound ring for inbound peer");
            return;
        }
    };
    engine.register_connection(peer, Arc::clone(&cxn) as Arc<dyn Replicator>);
    cxn.run(stream, Arc::clone(&engine)).await;
    engine.remove_connection(peer);
}

/// Dial a configured peer, retrying with `reconnect_freq` backoff until
/// shutdown (§4.4.2 "reconnects on a timer").
async fn connect_loop(peer: HostCfg, engine: Arc<Engine>, ring_params: RingParams, reconnect_freq: Duration, mut shutdown_rx: ShutdownRx) {
    while !shutdown_rx.is_shutdown() {
        match TcpStream::connect((peer.ip, peer.port)).await {
            Ok(stream) => {
                let cxn = match Cxn::new(peer.id, (peer.ip, peer.port), ring_params) {
                    Ok(cxn) => Arc::new(cxn),
                    Err(err) => {
                        tracing::warn!(peer = %peer.id, error = %err, "failed to open outbound ring");
                        wait_or_shutdown(reconnect_freq, &mut shutdown_rx).await;
                        continue;
                    }
                };
                engine.register_connection(peer.id, Arc::clone(&cxn) as Arc<dyn Replicator>);
                tracing::info!(peer = %peer.id, "connected to peer");
                tokio::select! {
                    _ = cxn.run(stream, Arc::clone(&engine)) => {}
                    _ = shutdown_rx.signaled() => cxn.close(),
                }
                engine.remove_connection(peer.id);
            }
            Err(err) => tracing::debug!(peer = %peer.id, error = %err, "connect failed; retrying"),
        }
        wait_or_shutdown(reconnect_freq, &mut shutdown_rx).await;
    }
}

async fn wait_or_shutdown(duration: Duration, shutdown_rx: &mut ShutdownRx) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown_rx.signaled() => {}
    }
}

/// Drives the three periodic housekeeping ticks an engine needs from
/// outside itself: heartbeat broadcast, stale-peer sweep, and election
/// timeout (§4.4.2).
async fn timers_loop(engine: Arc<Engine>, cfg: EngineConfig, mut shutdown_rx: ShutdownRx) {
    let mut heartbeat_tick = tokio::time::interval(cfg.heartbeat_freq);
    let mut election_tick = tokio::time::interval(cfg.election_timeout);
    loop {
        tokio::select! {
            _ = shutdown_rx.signaled() => return,
            _ = heartbeat_tick.tick() => {
                engine.broadcast_heartbeat();
                engine.sweep_stale_peers(cfg.heartbeat_timeout);
            }
            _ = election_tick.tick() => engine.tick_election_timeout(),
        }
    }
}
