use std::sync::Arc;

use driftbot_agent::TaskAgent;
use driftbot_core::{Config, Paths};
use driftbot_providers::create_default_provider;
use driftbot_tools::ToolRegistry;

/// Execute one task immediately, without any cluster pacing.
pub async fn run(task: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;

    let provider = create_default_provider(&config)?;
    let registry = ToolRegistry::for_config(&config);
    let agent = TaskAgent::new(
        config,
        Arc::from(provider),
        registry,
        paths.workspace(),
    );

    let result = agent.run_task(task).await?;
    println!("{}", result);

    Ok(())
}
