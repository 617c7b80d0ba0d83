use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use driftbot_core::{Error, PacingConfig, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::pacing::{self, IdlePlan, IDLE_CHUNK_SECS};
use crate::pool::TaskPool;

/// Pause after a failed task before moving on to the next one.
const TASK_FAILURE_COOLDOWN: Duration = Duration::from_secs(5);

/// Longest result preview written to the log.
const RESULT_PREVIEW_CHARS: usize = 200;

/// Executes a single task to completion. The cluster loop drives this
/// one call at a time and never runs two tasks concurrently.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &str) -> Result<String>;
}

/// What ended a cluster or the surrounding loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOutcome {
    Completed,
    Interrupted,
}

/// The outer driver: samples clusters from the pool, paces the tasks
/// inside each cluster, and idles between clusters.
pub struct ClusterService {
    pool: TaskPool,
    pacing: PacingConfig,
    runner: Arc<dyn TaskRunner>,
}

impl ClusterService {
    pub fn new(pool: TaskPool, pacing: PacingConfig, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            pool,
            pacing,
            runner,
        }
    }

    /// Run clusters until a shutdown signal arrives (Ok) or an error
    /// escapes a cluster (Err, fatal for the process).
    ///
    /// Per-task failures are absorbed inside `run_cluster`; anything that
    /// reaches this function's `?` is beyond the per-task tier.
    pub async fn run_loop(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            cluster_count = self.pacing.cluster_count,
            task_interval_secs = self.pacing.task_interval_secs,
            grouping_interval_secs = self.pacing.grouping_interval_secs,
            pool_size = self.pool.len(),
            "Cluster loop starting"
        );

        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            info!(iteration, "Starting iteration");

            if self.run_cluster(&mut shutdown).await? == ClusterOutcome::Interrupted {
                info!("Interrupt received, stopping");
                return Ok(());
            }

            if self.idle_between_clusters(&mut shutdown).await == ClusterOutcome::Interrupted {
                info!("Interrupt received during idle, stopping");
                return Ok(());
            }
        }
    }

    /// Execute one sampled cluster. Individual task failures are logged
    /// and absorbed with a fixed cooldown; only an interrupt or an error
    /// outside task execution ends the cluster early.
    pub async fn run_cluster(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<ClusterOutcome> {
        if self.pool.is_empty() {
            return Err(Error::Task("Task pool is empty".to_string()));
        }

        let tasks = {
            let mut rng = rand::thread_rng();
            self.pool.sample(self.pacing.cluster_count, &mut rng)
        };
        let cluster_size = tasks.len();
        info!(cluster_size, "Starting task cluster");

        for (i, task) in tasks.iter().enumerate() {
            info!(task_num = i + 1, cluster_size, task = %task, "Task");

            let pre_delay = {
                let mut rng = rand::thread_rng();
                pacing::pre_task_delay(&self.pacing, &mut rng)
            };
            info!(delay_secs = pre_delay.as_secs_f64(), "Pre-task delay");
            if sleep_or_shutdown(pre_delay, shutdown).await {
                return Ok(ClusterOutcome::Interrupted);
            }

            let started = std::time::Instant::now();
            match self.runner.run(task).await {
                Ok(result) => {
                    info!(
                        result = %preview(&result),
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "Task completed"
                    );
                }
                Err(e) => {
                    warn!(error = %e, task = %task, "Task failed");
                    info!(
                        cooldown_secs = TASK_FAILURE_COOLDOWN.as_secs(),
                        "Waiting before continuing"
                    );
                    if sleep_or_shutdown(TASK_FAILURE_COOLDOWN, shutdown).await {
                        return Ok(ClusterOutcome::Interrupted);
                    }
                    continue;
                }
            }

            if i + 1 < cluster_size {
                let inter_delay = {
                    let mut rng = rand::thread_rng();
                    pacing::inter_task_delay(&self.pacing, &mut rng)
                };
                info!(delay_secs = inter_delay.as_secs_f64(), "Waiting before next task");
                if sleep_or_shutdown(inter_delay, shutdown).await {
                    return Ok(ClusterOutcome::Interrupted);
                }
            }
        }

        info!("Task cluster completed");
        Ok(ClusterOutcome::Completed)
    }

    /// Sleep out the randomized grouping interval in 30s chunks, logging
    /// time remaining every fourth chunk.
    async fn idle_between_clusters(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> ClusterOutcome {
        let wait = {
            let mut rng = rand::thread_rng();
            pacing::idle_wait(&self.pacing, &mut rng)
        };
        let plan = IdlePlan::for_wait(wait);
        info!(
            wait_secs = wait.as_secs_f64().round(),
            "Cluster complete, idling until next cluster"
        );

        for chunk in 0..plan.full_chunks {
            if sleep_or_shutdown(Duration::from_secs(IDLE_CHUNK_SECS), shutdown).await {
                return ClusterOutcome::Interrupted;
            }
            let remaining = plan.remaining_after(chunk + 1, wait);
            if pacing::status_due(chunk, remaining) {
                info!(remaining_secs = remaining.as_secs_f64().round(), "Idle status");
            }
        }

        if plan.remainder > Duration::ZERO {
            if sleep_or_shutdown(plan.remainder, shutdown).await {
                return ClusterOutcome::Interrupted;
            }
        }

        ClusterOutcome::Completed
    }
}

/// Sleep, but wake early on shutdown. Returns true when interrupted.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.recv() => true,
    }
}

fn preview(s: &str) -> String {
    let flat = s.replace('\n', " ");
    match flat.char_indices().nth(RESULT_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Runner that records every task it executes and fails on request.
    struct RecordingRunner {
        executed: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingRunner {
        fn new(fail_on: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                executed: Mutex::new(Vec::new()),
                fail_on: fail_on.map(str::to_string),
            })
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskRunner for RecordingRunner {
        async fn run(&self, task: &str) -> Result<String> {
            self.executed.lock().unwrap().push(task.to_string());
            if self.fail_on.as_deref() == Some(task) {
                return Err(Error::Task(format!("injected failure for {}", task)));
            }
            Ok(format!("done: {}", task))
        }
    }

    fn small_pool() -> TaskPool {
        TaskPool::new(vec![
            "alpha".to_string(),
            "beta".to_string(),
            "gamma".to_string(),
        ])
    }

    fn service(pool: TaskPool, runner: Arc<dyn TaskRunner>) -> ClusterService {
        ClusterService::new(pool, PacingConfig::default(), runner)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cluster_runs_every_sampled_task() {
        let runner = RecordingRunner::new(None);
        let svc = service(small_pool(), runner.clone());
        let (_tx, mut rx) = broadcast::channel(1);

        let outcome = svc.run_cluster(&mut rx).await.unwrap();
        assert_eq!(outcome, ClusterOutcome::Completed);
        // cluster_count (5) is capped at the pool size
        assert_eq!(runner.executed().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_failure_does_not_abort_cluster() {
        let runner = RecordingRunner::new(Some("beta"));
        let svc = service(small_pool(), runner.clone());
        let (_tx, mut rx) = broadcast::channel(1);

        let outcome = svc.run_cluster(&mut rx).await.unwrap();
        assert_eq!(outcome, ClusterOutcome::Completed);
        let executed = runner.executed();
        assert_eq!(executed.len(), 3);
        assert!(executed.contains(&"beta".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pool_is_fatal() {
        let runner = RecordingRunner::new(None);
        let svc = service(TaskPool::new(vec![]), runner);
        let (_tx, rx) = broadcast::channel(1);

        let result = svc.run_loop(rx).await;
        assert!(matches!(result, Err(Error::Task(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_cluster_stops_execution() {
        struct SignalingRunner {
            tx: broadcast::Sender<()>,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl TaskRunner for SignalingRunner {
            async fn run(&self, _task: &str) -> Result<String> {
                // Request shutdown from inside the first task; the loop
                // should observe it at the next sleep and stop.
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let _ = self.tx.send(());
                }
                Ok("ok".to_string())
            }
        }

        let (tx, rx) = broadcast::channel(1);
        let runner = Arc::new(SignalingRunner {
            tx,
            calls: AtomicUsize::new(0),
        });
        let svc = service(small_pool(), runner.clone());

        let result = svc.run_loop(rx).await;
        assert!(result.is_ok());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_loop_exits_cleanly() {
        let runner = RecordingRunner::new(None);
        let svc = service(small_pool(), runner.clone());
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let result = svc.run_loop(rx).await;
        assert!(result.is_ok());
        // Shutdown lands at the first pre-task sleep, before any task runs.
        assert!(runner.executed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_multiple_iterations() {
        struct CountingRunner {
            tx: broadcast::Sender<()>,
            calls: AtomicUsize,
            stop_after: usize,
        }

        #[async_trait]
        impl TaskRunner for CountingRunner {
            async fn run(&self, _task: &str) -> Result<String> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= self.stop_after {
                    let _ = self.tx.send(());
                }
                Ok("ok".to_string())
            }
        }

        let (tx, rx) = broadcast::channel(1);
        // Stop partway through the second cluster: proves the idle wait
        // between clusters completes and the loop comes back around.
        let runner = Arc::new(CountingRunner {
            tx,
            calls: AtomicUsize::new(0),
            stop_after: 4,
        });
        let svc = service(small_pool(), runner.clone());

        let result = svc.run_loop(rx).await;
        assert!(result.is_ok());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_delay_after_final_task() {
        let runner = RecordingRunner::new(None);
        let svc = service(small_pool(), runner.clone());
        let (_tx, mut rx) = broadcast::channel(1);

        // 3 tasks: pre-task delays are at most 3x5s and the two
        // inter-task delays at most 2x15s. A trailing delay after the
        // last task would push past 45s.
        for _ in 0..25 {
            let started = tokio::time::Instant::now();
            let outcome = svc.run_cluster(&mut rx).await.unwrap();
            assert_eq!(outcome, ClusterOutcome::Completed);

            let elapsed = started.elapsed();
            assert!(elapsed >= Duration::from_secs(16), "elapsed {:?}", elapsed);
            assert!(elapsed <= Duration::from_secs(45), "elapsed {:?}", elapsed);
        }
    }

    #[test]
    fn test_preview_truncates_long_results() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.len(), RESULT_PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));

        assert_eq!(preview("short\nresult"), "short result");
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let long = "結".repeat(300);
        let p = preview(&long);
        assert_eq!(p.chars().count(), RESULT_PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }
}
