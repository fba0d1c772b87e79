//! Run lifecycle management - start, monitor, and stop bot runs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::{select_agent, AgentDirectory};
use crate::error::{Result, RunnerError};
use crate::gateway::{CredentialVault, ExchangeCredentials, ExchangeGateway, GatewayFactory};
use crate::metrics::MetricsRegistry;
use crate::snapshots::SnapshotService;
use crate::store::{AuditLog, RunStore, RunUpdate};
use crate::tasks::MonitorRegistry;
use crate::types::{
    AgentRecord, AuditEvent, Overview, RunRecord, RunStatus, SnapshotUpdate, StartRequest,
    StopOutcome,
};

/// Default pause between monitor ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Coordinates the lifecycle of bot runs: placing the opening orders,
/// persisting records, broadcasting snapshots, and unwinding positions on
/// expiry or explicit stop. One long-lived monitor task is held per active
/// run; everything else is request-scoped.
pub struct RunManager {
    store: Arc<RunStore>,
    audit: Arc<AuditLog>,
    agents: Arc<AgentDirectory>,
    vault: Arc<dyn CredentialVault>,
    gateways: Arc<dyn GatewayFactory>,
    snapshots: Arc<SnapshotService>,
    metrics: Arc<MetricsRegistry>,
    monitors: Arc<MonitorRegistry>,
    poll_interval: Duration,
}

/// Everything a monitor task needs, cloned out of the manager at spawn time
struct MonitorContext {
    store: Arc<RunStore>,
    audit: Arc<AuditLog>,
    snapshots: Arc<SnapshotService>,
    metrics: Arc<MetricsRegistry>,
    run_id: String,
    market: String,
    agent_address: String,
    end_at: DateTime<Utc>,
    poll_interval: Duration,
}

impl RunManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<RunStore>,
        audit: Arc<AuditLog>,
        agents: Arc<AgentDirectory>,
        vault: Arc<dyn CredentialVault>,
        gateways: Arc<dyn GatewayFactory>,
        snapshots: Arc<SnapshotService>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            store,
            audit,
            agents,
            vault,
            gateways,
            snapshots,
            metrics,
            monitors: Arc::new(MonitorRegistry::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn snapshots(&self) -> &Arc<SnapshotService> {
        &self.snapshots
    }

    /// Whether a live monitor task exists for the run.
    pub fn monitor_active(&self, run_id: &str) -> bool {
        self.monitors.is_active(run_id)
    }

    /// Start a bot run: select the signing agent, place the opening orders,
    /// persist the record, register the initial snapshot, and schedule the
    /// monitor. A gateway rejection aborts before anything is persisted.
    pub async fn start_run(
        &self,
        request: StartRequest,
        wallet_address: &str,
        preferred_agent: Option<&str>,
    ) -> Result<RunRecord> {
        if wallet_address.trim().is_empty() {
            return Err(RunnerError::WalletNotConnected);
        }
        let request = request.validate()?;

        let agents = self.agents.load_agents().await?;
        let agent = select_agent(wallet_address, preferred_agent, &agents)
            .cloned()
            .ok_or(RunnerError::NoAgentRegistered)?;
        self.assert_agent_available(&agent.agent_address).await?;
        let credentials = self.credentials_for(&agent)?;

        self.metrics.increment("bot.start.attempt");
        info!(
            market = %request.market,
            leverage = request.leverage,
            wallet_address = %wallet_address,
            agent_address = %agent.agent_address,
            "bot start attempt"
        );

        let gateway = self.gateways.open(credentials);
        let placed = async {
            // Order placement must happen at the already-configured leverage.
            gateway
                .set_leverage(&request.market, request.leverage)
                .await?;
            gateway
                .place_market_order(&request.market, request.usd_notional)
                .await
        }
        .await;
        gateway.close().await;
        if let Err(err) = placed {
            self.metrics.increment("bot.start.gateway_error");
            error!(action = %err.action, payload = %err.payload, "exchange rejected bot start");
            return Err(err.into());
        }

        let started_at = Utc::now();
        let record = RunRecord {
            run_id: Uuid::new_v4().simple().to_string(),
            market: request.market.clone(),
            usd_notional: request.usd_notional,
            leverage: request.leverage,
            wallet_address: wallet_address.to_string(),
            agent_address: agent.agent_address.clone(),
            status: RunStatus::Running,
            started_at,
            duration_minutes: request.duration_minutes,
            closed_at: None,
            completed_at: None,
            auto_closed: None,
        };
        self.store.append_run(&record).await?;
        self.audit
            .append(&AuditEvent {
                run_id: Some(record.run_id.clone()),
                market: Some(record.market.clone()),
                wallet_address: Some(wallet_address.to_string()),
                agent_address: Some(agent.agent_address.clone()),
                ..AuditEvent::new("bot_started")
            })
            .await?;
        self.snapshots.register_run(&record);
        self.spawn_monitor(&record, &agent)?;

        self.metrics.increment("bot.start.success");
        info!(
            run_id = %record.run_id,
            market = %record.market,
            end_at = %record.end_at(),
            "bot start success"
        );
        Ok(record)
    }

    /// Stop a run: cancel its monitor, unwind the exchange position, and
    /// mark the record closed. A gateway rejection leaves the record in its
    /// prior status so the caller may retry.
    pub async fn stop_run(&self, run_id: &str) -> Result<StopOutcome> {
        let record = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| RunnerError::NotFound {
                run_id: run_id.to_string(),
            })?;
        if !matches!(record.status, RunStatus::Running | RunStatus::Completed) {
            return Err(RunnerError::InvalidState {
                run_id: run_id.to_string(),
                status: record.status,
            });
        }

        let agents = self.agents.load_agents().await?;
        let agent = agents
            .iter()
            .find(|agent| {
                agent
                    .agent_address
                    .eq_ignore_ascii_case(&record.agent_address)
            })
            .cloned()
            .ok_or_else(|| RunnerError::AgentUnavailable {
                agent_address: record.agent_address.clone(),
            })?;
        let credentials = self.credentials_for(&agent)?;

        // Cancel the monitor before touching the exchange so its auto-close
        // cannot race this stop.
        if self.monitors.cancel(run_id) {
            debug!(run_id, "monitor cancelled for explicit stop");
        }

        let gateway = self.gateways.open(credentials);
        let unwound = async {
            gateway.cancel_open_orders(&record.market).await?;
            gateway.close_position(&record.market).await
        }
        .await;
        gateway.close().await;
        if let Err(err) = unwound {
            self.metrics.increment("bot.stop.gateway_error");
            error!(
                run_id,
                action = %err.action,
                payload = %err.payload,
                "exchange rejected bot stop"
            );
            return Err(err.into());
        }

        let closed_at = Utc::now();
        self.store
            .update_run(
                run_id,
                RunUpdate {
                    status: Some(RunStatus::Closed),
                    closed_at: Some(closed_at),
                    ..RunUpdate::default()
                },
            )
            .await?;
        if let Err(err) = self.snapshots.mark_status(run_id, RunStatus::Closed) {
            // Snapshot and run registration are not transactionally coupled.
            warn!(run_id, %err, "no snapshot to close for stopped run");
        }
        self.audit
            .append(&AuditEvent {
                run_id: Some(record.run_id.clone()),
                market: Some(record.market.clone()),
                agent_address: Some(agent.agent_address.clone()),
                ..AuditEvent::new("bot_stopped")
            })
            .await?;

        self.metrics.increment("bot.stop.success");
        info!(run_id, market = %record.market, "bot stop success");
        Ok(StopOutcome {
            run_id: record.run_id,
            market: record.market,
            status: RunStatus::Closed,
            closed_at,
        })
    }

    /// Read-only aggregation for dashboards.
    pub async fn get_overview(&self, limit: usize) -> Result<Overview> {
        let mut runs = self.store.load_runs().await?;
        let total_runs = runs.len();
        let active_runs = runs
            .iter()
            .filter(|record| !record.status.is_terminal())
            .count();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(1));
        let agent_count = self.agents.load_agents().await?.len();
        Ok(Overview {
            recent_runs: runs,
            metrics: self.metrics.snapshot(),
            agent_count,
            active_runs,
            total_runs,
        })
    }

    /// Nonce guard: an agent key signs strictly serially on the exchange, so
    /// one agent may back at most one non-terminal run. The live store is
    /// scanned (rather than any cached flag) so the guard survives process
    /// restarts that lose in-memory task handles.
    async fn assert_agent_available(&self, agent_address: &str) -> Result<()> {
        for record in self.store.load_runs().await? {
            if record.agent_address.eq_ignore_ascii_case(agent_address)
                && !record.status.is_terminal()
            {
                warn!(
                    agent_address,
                    run_id = %record.run_id,
                    "agent nonce guard triggered"
                );
                self.metrics.increment("bot.start.nonce_guard");
                return Err(RunnerError::AgentBusy {
                    agent_address: agent_address.to_string(),
                });
            }
        }
        Ok(())
    }

    fn credentials_for(&self, agent: &AgentRecord) -> Result<ExchangeCredentials> {
        let private_key = self.vault.decrypt(agent)?;
        Ok(ExchangeCredentials {
            address: agent.agent_address.clone(),
            private_key,
            account_address: Some(agent.wallet_address.clone()),
        })
    }

    fn spawn_monitor(&self, record: &RunRecord, agent: &AgentRecord) -> Result<()> {
        let credentials = self.credentials_for(agent)?;
        let gateways = Arc::clone(&self.gateways);
        let context = MonitorContext {
            store: Arc::clone(&self.store),
            audit: Arc::clone(&self.audit),
            snapshots: Arc::clone(&self.snapshots),
            metrics: Arc::clone(&self.metrics),
            run_id: record.run_id.clone(),
            market: record.market.clone(),
            agent_address: record.agent_address.clone(),
            end_at: record.end_at(),
            poll_interval: self.poll_interval,
        };
        self.monitors.spawn(&record.run_id, async move {
            let gateway = gateways.open(credentials);
            let result = monitor_loop(&context, gateway.as_ref()).await;
            gateway.close().await;
            result
        });
        Ok(())
    }
}

/// Poll the exchange until the run is externally closed or expires.
///
/// Poll failures are non-fatal; auto-close failures are retried on the next
/// tick. The fixed sleep between ticks is the loop's only intended
/// suspension point for cancellation, which exits without further state
/// changes.
async fn monitor_loop(context: &MonitorContext, gateway: &dyn ExchangeGateway) -> Result<()> {
    loop {
        match context.store.get_run(&context.run_id).await? {
            None => {
                warn!(run_id = %context.run_id, "run record disappeared; monitor exiting");
                return Ok(());
            }
            Some(record) if record.status.is_terminal() => {
                debug!(
                    run_id = %context.run_id,
                    status = %record.status,
                    "run already terminal; monitor exiting"
                );
                return Ok(());
            }
            Some(_) => {}
        }

        match gateway.get_position(&context.market).await {
            Ok(position) => {
                let update = SnapshotUpdate {
                    status: Some(RunStatus::Running),
                    ..SnapshotUpdate::from_position(&position)
                };
                if let Err(err) = context.snapshots.update_snapshot(&context.run_id, update) {
                    warn!(run_id = %context.run_id, %err, "snapshot update skipped");
                }
            }
            Err(err) => {
                // Keep the last-known financials and try again next tick.
                warn!(
                    run_id = %context.run_id,
                    action = %err.action,
                    "position poll failed"
                );
                context.metrics.increment("bot.monitor.poll_error");
                if let Err(err) = context
                    .snapshots
                    .mark_status(&context.run_id, RunStatus::Running)
                {
                    warn!(run_id = %context.run_id, %err, "snapshot update skipped");
                }
            }
        }

        if Utc::now() >= context.end_at {
            match auto_close(context, gateway).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    context.metrics.increment("bot.auto_close.error");
                    warn!(
                        run_id = %context.run_id,
                        %err,
                        "auto close failed; retrying next tick"
                    );
                }
            }
        }

        tokio::time::sleep(context.poll_interval).await;
    }
}

/// Best-effort unwind at expiry; any error leaves the run open for the next
/// attempt.
async fn auto_close(context: &MonitorContext, gateway: &dyn ExchangeGateway) -> Result<()> {
    gateway.cancel_open_orders(&context.market).await?;
    gateway.close_position(&context.market).await?;

    let closed_at = Utc::now();
    context
        .store
        .update_run(
            &context.run_id,
            RunUpdate {
                status: Some(RunStatus::Closed),
                closed_at: Some(closed_at),
                auto_closed: Some(true),
                ..RunUpdate::default()
            },
        )
        .await?;
    if let Err(err) = context
        .snapshots
        .mark_status(&context.run_id, RunStatus::Closed)
    {
        warn!(run_id = %context.run_id, %err, "no snapshot to close for expired run");
    }
    context
        .audit
        .append(&AuditEvent {
            run_id: Some(context.run_id.clone()),
            market: Some(context.market.clone()),
            agent_address: Some(context.agent_address.clone()),
            ..AuditEvent::new("bot_auto_closed")
        })
        .await?;

    context.metrics.increment("bot.auto_close.success");
    info!(run_id = %context.run_id, market = %context.market, "run auto closed at expiry");
    Ok(())
}
