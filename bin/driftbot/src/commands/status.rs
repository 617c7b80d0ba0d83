use driftbot_core::{Config, Paths};
use driftbot_providers::infer_provider_from_model;
use driftbot_scheduler::TaskPool;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("driftbot status");
    println!("===============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found)" }
    );

    let workspace_path = paths.workspace();
    println!(
        "Workspace: {} {}",
        workspace_path.display(),
        if workspace_path.exists() { "✓" } else { "✗ (not found)" }
    );

    if !config_exists {
        println!();
        println!("Run `driftbot onboard` to initialize.");
        return Ok(());
    }

    let config = Config::load_or_default(&paths)?;

    println!("Model:     {}", config.agents.defaults.model);
    if let Some(provider) = config
        .agents
        .defaults
        .provider
        .as_deref()
        .or_else(|| infer_provider_from_model(&config.agents.defaults.model))
    {
        println!("Provider:  {}", provider);
    }
    println!();

    println!("Pacing:");
    println!("  Tasks per cluster:  {}", config.pacing.cluster_count);
    println!("  Task interval:      {}s", config.pacing.task_interval_secs);
    println!("  Grouping interval:  {}s", config.pacing.grouping_interval_secs);
    println!();

    println!("Browser:   {}", if config.browser.enabled { "enabled" } else { "disabled" });
    println!();

    println!("Providers:");
    for name in ["ollama", "openai", "openrouter", "deepseek", "groq"] {
        let status = match config.providers.get(name) {
            Some(p) if !p.api_key.is_empty() => "✓ configured",
            Some(_) if name == "ollama" => "✓ no key needed",
            Some(_) => "✗ no key",
            None => "✗ not in config",
        };
        println!("  {:<12} {}", name, status);
    }
    println!();

    let pool = TaskPool::load(&paths)?;
    let source = if paths.tasks_file().exists() {
        "tasks.txt"
    } else {
        "built-in"
    };
    println!("Tasks:     {} ({})", pool.len(), source);

    Ok(())
}
