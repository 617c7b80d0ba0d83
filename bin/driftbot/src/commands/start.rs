use std::sync::Arc;

use async_trait::async_trait;
use driftbot_agent::TaskAgent;
use driftbot_core::{Config, Paths, Result};
use driftbot_providers::create_default_provider;
use driftbot_scheduler::{ClusterService, TaskPool, TaskRunner};
use driftbot_tools::ToolRegistry;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Bridges the agent into the cluster loop's runner seam.
struct AgentRunner {
    agent: TaskAgent,
}

#[async_trait]
impl TaskRunner for AgentRunner {
    async fn run(&self, task: &str) -> Result<String> {
        self.agent.run_task(task).await
    }
}

/// Run the cluster loop until interrupted (exit 0) or a fatal error
/// escapes a cluster (exit 1 via the propagated Err).
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;
    let pool = TaskPool::load(&paths)?;

    info!(
        model = %config.agents.defaults.model,
        cluster_count = config.pacing.cluster_count,
        task_interval_secs = config.pacing.task_interval_secs,
        grouping_interval_secs = config.pacing.grouping_interval_secs,
        pool_size = pool.len(),
        browser_enabled = config.browser.enabled,
        "driftbot starting"
    );

    let provider = create_default_provider(&config)?;
    let registry = ToolRegistry::for_config(&config);
    let agent = TaskAgent::new(
        config.clone(),
        Arc::from(provider),
        registry,
        paths.workspace(),
    );

    let runner = Arc::new(AgentRunner { agent });
    let service = ClusterService::new(pool, config.pacing.clone(), runner);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    if let Err(e) = service.run_loop(shutdown_rx).await {
        error!(error = %e, "Fatal error escaped the cluster loop");
        return Err(e.into());
    }

    info!("driftbot stopped");
    Ok(())
}
