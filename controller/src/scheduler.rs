use std::{future::Future, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// A unit of periodic work owned by the [`Scheduler`].
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    fn run_once(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Runs once after the last iteration when the scheduler shuts down.
    fn on_stop(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Sleep that keeps the next start one `period` after the previous start.
/// Zero when the body overran its period.
pub fn compensated_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn spawn<T: PeriodicTask>(&mut self, task: T) {
        let name = task.name();
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(run_periodic(task, shutdown));
        self.tasks.push((name, handle));
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Lets in-flight iterations finish, then waits for every task's
    /// `on_stop`.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks {
            if let Err(err) = handle.await {
                warn!("periodic task {name} ended abnormally: {err}");
            }
        }
        info!("scheduler stopped");
    }
}

async fn run_periodic<T: PeriodicTask>(mut task: T, mut shutdown: watch::Receiver<bool>) {
    let name = task.name();
    let period = task.period();
    info!("periodic task {name} started (period {}ms)", period.as_millis());

    loop {
        if *shutdown.borrow() {
            break;
        }

        let started = Instant::now();
        if let Err(err) = task.run_once().await {
            warn!("periodic task {name} iteration failed: {err:#}");
        }
        let elapsed = started.elapsed();

        let delay = compensated_delay(period, elapsed);
        if delay.is_zero() {
            debug!(
                "periodic task {name} overran its period ({}ms > {}ms)",
                elapsed.as_millis(),
                period.as_millis()
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    task.on_stop().await;
    info!("periodic task {name} stopped");
}
