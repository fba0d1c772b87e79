//! Paper Runner - exercise the run lifecycle against a simulated exchange
//!
//! 1. Loads configuration from environment
//! 2. Seeds a demo agent when none is registered
//! 3. Starts a bot run on the paper exchange
//! 4. Streams live snapshots until the run closes (Ctrl-C stops it early)

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use perp_runner::{
    AgentDirectory, AgentRecord, AuditLog, Config, MetricsRegistry, PaperExchange, PlaintextVault,
    RunManager, RunStore, SnapshotHub, SnapshotService, StartRequest,
};

const DEMO_WALLET: &str = "0x00000000000000000000000000000000000d3m0";
const DEMO_AGENT: &str = "0x00000000000000000000000000000000000a6e7";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env();
    info!(storage_dir = %config.storage_dir.display(), "starting paper runner");

    let agents = Arc::new(AgentDirectory::new(config.agents_path()));
    if agents.load_agents().await?.is_empty() {
        agents
            .write_agents(&[AgentRecord {
                agent_address: DEMO_AGENT.to_string(),
                wallet_address: DEMO_WALLET.to_string(),
                label: Some("paper demo agent".to_string()),
                key_cipher: "paper-key".to_string(),
                stored_at: Some(chrono::Utc::now()),
            }])
            .await?;
        info!("seeded demo agent");
    }

    let hub = Arc::new(SnapshotHub::new());
    let manager = RunManager::new(
        Arc::new(RunStore::new(config.runs_path())),
        Arc::new(AuditLog::new(config.audit_log_path())),
        agents,
        Arc::new(PlaintextVault),
        Arc::new(PaperExchange::new()),
        Arc::new(SnapshotService::new(Arc::clone(&hub))),
        Arc::new(MetricsRegistry::new()),
    )
    .with_poll_interval(config.poll_interval);

    let request = request_from_env();
    let record = manager.start_run(request, DEMO_WALLET, None).await?;
    info!(
        run_id = %record.run_id,
        market = %record.market,
        end_at = %record.end_at(),
        "run started"
    );

    let mut stream = hub.listen(Some(&record.run_id));
    loop {
        tokio::select! {
            snapshot = stream.recv() => {
                let Some(snapshot) = snapshot else { break };
                info!(
                    run_id = %snapshot.run_id,
                    status = %snapshot.status,
                    mark_price = %snapshot.mark_price,
                    total_pnl = %snapshot.total_pnl(),
                    "snapshot"
                );
                if snapshot.status.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; stopping run");
                match manager.stop_run(&record.run_id).await {
                    Ok(outcome) => info!(
                        run_id = %outcome.run_id,
                        closed_at = %outcome.closed_at,
                        "run stopped"
                    ),
                    Err(err) => warn!(%err, "stop failed"),
                }
                break;
            }
        }
    }

    let overview = manager.get_overview(5).await?;
    info!(
        total_runs = overview.total_runs,
        active_runs = overview.active_runs,
        "paper runner done"
    );
    Ok(())
}

fn request_from_env() -> StartRequest {
    let market = std::env::var("MARKET").unwrap_or_else(|_| "BTC-PERP".to_string());
    let usd_notional = std::env::var("USD_NOTIONAL")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| Decimal::new(100, 0));
    let leverage = std::env::var("LEVERAGE")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3);
    let duration_minutes = std::env::var("DURATION_MINUTES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1.0);

    StartRequest::new(&market, usd_notional, leverage).with_duration(duration_minutes)
}
