//! Process supervisor
//!
//! Keeps a fixed number of request server processes alive. Each process
//! occupies a numbered slot; when the process in a slot exits for any reason
//! the slot is refilled. A worker that dies right after launch is relaunched
//! after `restart_delay` so a broken binary cannot spin the CPU.
//!
//! Children are spawned with kill-on-drop: if the supervisor goes away, so do
//! its workers.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::config::SupervisorConfig;

// ============================================================================
// Worker Command
// ============================================================================

/// How to launch one worker process
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Re-run the current executable with `args`
    pub fn current_exe<I, S>(args: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    /// Set an environment variable for every launched worker
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn spawn(&self, slot: usize) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env("WORKER_SLOT", slot.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

// ============================================================================
// Live Worker Tracking
// ============================================================================

/// Observable view of the supervised processes
#[derive(Clone, Default)]
pub struct LiveWorkers {
    inner: Arc<LiveWorkersInner>,
}

#[derive(Default)]
struct LiveWorkersInner {
    /// Slot -> pid of the running process
    pids: RwLock<HashMap<usize, u32>>,

    /// Total launches, including replacements
    launches: AtomicU64,
}

impl LiveWorkers {
    /// Pids of the running workers, ordered by slot
    pub async fn pids(&self) -> Vec<u32> {
        let pids = self.inner.pids.read().await;
        let mut slots: Vec<_> = pids.iter().map(|(slot, pid)| (*slot, *pid)).collect();
        slots.sort_unstable();
        slots.into_iter().map(|(_, pid)| pid).collect()
    }

    /// Number of running workers
    pub async fn count(&self) -> usize {
        self.inner.pids.read().await.len()
    }

    /// Total number of launches so far
    pub fn launches(&self) -> u64 {
        self.inner.launches.load(Ordering::Relaxed)
    }

    async fn started(&self, slot: usize, pid: u32) {
        self.inner.launches.fetch_add(1, Ordering::Relaxed);
        self.inner.pids.write().await.insert(slot, pid);
    }

    async fn exited(&self, slot: usize) {
        self.inner.pids.write().await.remove(&slot);
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Launches and replaces worker processes
pub struct Supervisor {
    command: WorkerCommand,
    config: SupervisorConfig,
    live: LiveWorkers,
}

impl Supervisor {
    pub fn new(command: WorkerCommand, config: SupervisorConfig) -> Self {
        Self {
            command,
            config,
            live: LiveWorkers::default(),
        }
    }

    /// Handle for observing the running workers
    pub fn live_workers(&self) -> LiveWorkers {
        self.live.clone()
    }

    /// Launch `worker_count` workers and keep them running
    ///
    /// Does not return while the slots are being supervised.
    pub async fn run(self) {
        let worker_count = self.config.worker_count.max(1);
        tracing::info!(
            workers = worker_count,
            program = %self.command.program.display(),
            "Supervisor starting"
        );

        let mut slots = JoinSet::new();
        for slot in 0..worker_count {
            slots.spawn(supervise_slot(
                slot,
                self.command.clone(),
                self.config.clone(),
                self.live.clone(),
            ));
        }

        while let Some(result) = slots.join_next().await {
            if let Err(e) = result {
                tracing::error!("Slot supervision task ended: {}", e);
            }
        }
    }
}

/// Keep one slot filled forever
async fn supervise_slot(
    slot: usize,
    command: WorkerCommand,
    config: SupervisorConfig,
    live: LiveWorkers,
) {
    loop {
        let launched_at = Instant::now();

        match command.spawn(slot) {
            Ok(mut child) => {
                let pid = child.id().unwrap_or_default();
                live.started(slot, pid).await;
                tracing::info!(slot, pid, "Worker started");

                let status = child.wait().await;
                live.exited(slot).await;

                match status {
                    Ok(status) => log_exit(slot, pid, status),
                    Err(e) => tracing::error!(slot, pid, error = %e, "Failed to wait for worker"),
                }
            }
            Err(e) => {
                tracing::error!(slot, error = %e, "Failed to launch worker");
            }
        }

        // Crash loop guard: only a worker that ran for a while is replaced
        // immediately.
        let lived = launched_at.elapsed();
        if lived < config.restart_delay {
            tokio::time::sleep(config.restart_delay - lived).await;
        }
        tracing::info!(slot, "Replacing worker");
    }
}

fn log_exit(slot: usize, pid: u32, status: ExitStatus) {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;

    tracing::warn!(
        slot,
        pid,
        code = ?status.code(),
        signal = ?signal,
        "Worker exited"
    );
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(worker_count: usize, restart_delay_ms: u64) -> SupervisorConfig {
        SupervisorConfig {
            worker_count,
            restart_delay: Duration::from_millis(restart_delay_ms),
        }
    }

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_starts_configured_worker_count() {
        let supervisor = Supervisor::new(WorkerCommand::new("sleep", ["30"]), config(3, 50));
        let live = supervisor.live_workers();
        let task = tokio::spawn(supervisor.run());

        wait_for(|| async { live.count().await == 3 }).await;
        assert_eq!(live.launches(), 3);

        task.abort();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_killed_worker_is_replaced() {
        let supervisor = Supervisor::new(WorkerCommand::new("sleep", ["30"]), config(2, 50));
        let live = supervisor.live_workers();
        let task = tokio::spawn(supervisor.run());

        wait_for(|| async { live.count().await == 2 }).await;
        let victim = live.pids().await[0];

        let killed = std::process::Command::new("kill")
            .arg("-9")
            .arg(victim.to_string())
            .status()
            .unwrap();
        assert!(killed.success());

        wait_for(|| async {
            let pids = live.pids().await;
            pids.len() == 2 && !pids.contains(&victim)
        })
        .await;
        assert_eq!(live.launches(), 3);

        task.abort();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_exiting_workers_keep_being_relaunched() {
        let supervisor = Supervisor::new(WorkerCommand::new("true", Vec::<String>::new()), config(1, 10));
        let live = supervisor.live_workers();
        let task = tokio::spawn(supervisor.run());

        wait_for(|| async { live.launches() >= 3 }).await;

        task.abort();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_launch_failure_is_retried() {
        let supervisor = Supervisor::new(
            WorkerCommand::new("/nonexistent/worker-binary", Vec::<String>::new()),
            config(1, 10),
        );
        let live = supervisor.live_workers();
        let task = tokio::spawn(supervisor.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());
        assert_eq!(live.count().await, 0);

        task.abort();
        let _ = task.await;
    }
}
