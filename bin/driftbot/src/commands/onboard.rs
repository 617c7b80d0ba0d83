use driftbot_core::{Config, Paths};

const TASKS_TXT: &str = r#"# One task per line. Lines starting with # are ignored.
# Leave this file empty (or delete it) to use the built-in task list.
"#;

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();

    let config_path = paths.config_file();
    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Use `driftbot onboard --force` to overwrite.");
        return Ok(());
    }

    paths.ensure_dirs()?;

    let config = Config::default();
    config.save(&paths)?;
    println!("Wrote config:    {}", config_path.display());

    let tasks_file = paths.tasks_file();
    if !tasks_file.exists() {
        std::fs::write(&tasks_file, TASKS_TXT)?;
        println!("Wrote tasks:     {}", tasks_file.display());
    }
    println!("Workspace:       {}", paths.workspace().display());

    println!();
    println!("Next steps:");
    println!("  - Edit {} to add API keys or change the model", config_path.display());
    println!("  - Or set {} to override the model", driftbot_core::MODEL_ENV_VAR);
    println!("  - Run `driftbot start` to begin the cluster loop");

    Ok(())
}
