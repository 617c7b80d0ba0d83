use driftbot_core::Paths;
use driftbot_scheduler::TaskPool;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let pool = TaskPool::load(&paths)?;

    let source = if paths.tasks_file().exists() {
        format!("{}", paths.tasks_file().display())
    } else {
        "built-in".to_string()
    };
    println!("Task pool ({} tasks, {})", pool.len(), source);
    println!();

    for (i, task) in pool.tasks().iter().enumerate() {
        println!("{:>3}. {}", i + 1, task);
    }

    Ok(())
}
