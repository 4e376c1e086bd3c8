use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{Engine, RefreshOutcome};
use crate::error::EngineError;
use crate::storage::{Feed, FeedUpdate};

/// Observable lifecycle state of a feed's recurring job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Timer armed, waiting for the next firing
    Scheduled,
    /// An ingestion cycle is in flight
    Running,
    /// Timer armed but firings are suspended scheduler-wide
    Paused,
    /// No job exists for this feed id
    Removed,
}

/// One armed recurring job: a cancel signal plus the spawned task.
///
/// Sending on `cancel_tx` closes the pending timer firing; a run already in
/// flight completes first, because the job loop only observes the signal
/// between runs.
struct JobHandle {
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl JobHandle {
    fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Timer-driven refresh service: one recurring job per active feed plus a
/// periodic sweep that catches overdue feeds.
///
/// The scheduler owns its job table, keyed by feed id. It never performs
/// ingestion itself — every trigger goes through [`Engine::refresh`], which
/// enforces the throttle policy, the per-feed single-flight lock, and the
/// global fetch bound. One feed's failure is confined to a log line; it
/// cannot disturb other feeds' schedules or the sweep loop.
pub struct Scheduler {
    engine: Engine,
    jobs: Mutex<HashMap<i64, JobHandle>>,
    sweep: Mutex<Option<JobHandle>>,
    paused: Arc<AtomicBool>,
    sweep_interval: Duration,
    sweep_concurrency: usize,
}

impl Scheduler {
    pub fn new(engine: Engine, sweep_interval: Duration, sweep_concurrency: usize) -> Self {
        Self {
            engine,
            jobs: Mutex::new(HashMap::new()),
            sweep: Mutex::new(None),
            paused: Arc::new(AtomicBool::new(false)),
            sweep_interval,
            sweep_concurrency: sweep_concurrency.max(1),
        }
    }

    /// Arm the sweep job and one recurring job per active feed.
    ///
    /// The sweep's first tick fires immediately, so feeds that came due
    /// while the process was down are refreshed at startup instead of
    /// waiting out a full interval.
    pub async fn start(&self) -> Result<(), EngineError> {
        {
            let mut sweep = lock_or_recover(&self.sweep);
            if sweep.is_some() {
                tracing::warn!("Scheduler already started");
                return Ok(());
            }
            *sweep = Some(self.spawn_sweep());
        }

        let feeds = self.engine.active_feeds().await?;
        let count = feeds.len();
        for feed in &feeds {
            self.schedule(feed);
        }
        tracing::info!(feeds = count, "Scheduler started");
        Ok(())
    }

    /// Cancel every job and wait for the tasks to wind down. In-flight
    /// ingestion runs complete; pending timer firings do not.
    pub async fn stop(&self) {
        let handles: Vec<JobHandle> = {
            let mut jobs = lock_or_recover(&self.jobs);
            let mut sweep = lock_or_recover(&self.sweep);
            sweep.take().into_iter().chain(jobs.drain().map(|(_, h)| h)).collect()
        };

        for handle in &handles {
            handle.cancel();
        }
        for handle in handles {
            let _ = handle.join.await;
        }
        tracing::info!("Scheduler stopped");
    }

    /// Arm (or re-arm) a feed's recurring timer at its configured
    /// frequency, replacing any prior job for the same feed id. An
    /// inactive feed is unscheduled instead.
    pub fn schedule(&self, feed: &Feed) {
        if !feed.active {
            self.unschedule(feed.id);
            return;
        }

        let period = Duration::from_secs(feed.frequency_hours.max(1) as u64 * 3600);
        let job = self.spawn_feed_job(feed.id, period);

        let mut jobs = lock_or_recover(&self.jobs);
        if let Some(previous) = jobs.insert(feed.id, job) {
            previous.cancel();
            tracing::debug!(feed_id = feed.id, "Replaced existing feed job");
        } else {
            tracing::debug!(
                feed_id = feed.id,
                frequency_hours = feed.frequency_hours,
                "Feed job armed"
            );
        }
    }

    /// Remove a feed's timer. Any pending firing is cancelled; an in-flight
    /// run completes on its own.
    pub fn unschedule(&self, feed_id: i64) {
        let removed = lock_or_recover(&self.jobs).remove(&feed_id);
        if let Some(job) = removed {
            job.cancel();
            tracing::debug!(feed_id, "Feed job removed");
        }
    }

    /// Suspend all timer firings without losing their configuration.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        tracing::info!("Scheduler paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        tracing::info!("Scheduler resumed");
    }

    pub fn job_state(&self, feed_id: i64) -> JobState {
        if !lock_or_recover(&self.jobs).contains_key(&feed_id) {
            return JobState::Removed;
        }
        if self.engine.is_running(feed_id) {
            return JobState::Running;
        }
        if self.paused.load(Ordering::Relaxed) {
            return JobState::Paused;
        }
        JobState::Scheduled
    }

    // ========================================================================
    // Composite lifecycle operations
    // ========================================================================

    /// Add a feed to the catalog, run its initial ingestion cycle
    /// immediately (outside the normal timer), then arm the recurring
    /// timer. A failed initial cycle is logged, not fatal — the feed stays
    /// cataloged and the schedule retries it.
    pub async fn add_feed(
        &self,
        url: &str,
        frequency_hours: Option<u32>,
        name: Option<&str>,
    ) -> Result<Feed, EngineError> {
        let feed = self.engine.add_feed(url, frequency_hours, name).await?;
        run_refresh(&self.engine, feed.id, "initial").await;
        self.schedule(&feed);
        Ok(feed)
    }

    /// Deactivate a feed (no reader references it anymore) and drop its job.
    pub async fn deactivate(&self, feed_id: i64) -> Result<(), EngineError> {
        self.engine.deactivate(feed_id).await?;
        self.unschedule(feed_id);
        Ok(())
    }

    /// Reactivate a feed and re-arm its timer.
    pub async fn reactivate(&self, feed_id: i64) -> Result<(), EngineError> {
        self.engine.reactivate(feed_id).await?;
        let feed = self.engine.get_feed(feed_id).await?;
        self.schedule(&feed);
        Ok(())
    }

    /// Apply a feed update and re-arm the timer so a frequency or active
    /// flag change takes effect.
    pub async fn update_feed(
        &self,
        feed_id: i64,
        update: FeedUpdate,
    ) -> Result<Feed, EngineError> {
        let feed = self.engine.update_feed(feed_id, update).await?;
        self.schedule(&feed);
        Ok(feed)
    }

    // ========================================================================
    // Job tasks
    // ========================================================================

    fn spawn_feed_job(&self, feed_id: i64, period: Duration) -> JobHandle {
        let engine = self.engine.clone();
        let paused = Arc::clone(&self.paused);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            // First firing one full period out; creation already ran the
            // initial cycle
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => {
                        tracing::debug!(feed_id, "Feed job cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if paused.load(Ordering::Relaxed) {
                            tracing::debug!(feed_id, "Scheduler paused, firing skipped");
                            continue;
                        }
                        run_refresh(&engine, feed_id, "timer").await;
                    }
                }
            }
        });

        JobHandle { cancel_tx, join }
    }

    fn spawn_sweep(&self) -> JobHandle {
        let engine = self.engine.clone();
        let paused = Arc::clone(&self.paused);
        let interval = self.sweep_interval;
        let concurrency = self.sweep_concurrency;
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            // Default interval fires immediately: catch feeds that came due
            // while the process was down
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => {
                        tracing::debug!("Sweep job cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if paused.load(Ordering::Relaxed) {
                            tracing::debug!("Scheduler paused, sweep skipped");
                            continue;
                        }
                        // Awaited inline: two sweeps can never overlap
                        run_sweep(&engine, concurrency).await;
                    }
                }
            }
        });

        JobHandle { cancel_tx, join }
    }
}

/// One sweep pass: refresh every due active feed with bounded concurrency.
/// Per-feed results are logged individually; no feed's error can abort the
/// pass or affect another feed.
async fn run_sweep(engine: &Engine, concurrency: usize) {
    let due = match engine.due_feeds().await {
        Ok(due) => due,
        Err(e) => {
            tracing::warn!(error = %e, "Sweep could not list due feeds");
            return;
        }
    };

    if due.is_empty() {
        tracing::debug!("Sweep found no due feeds");
        return;
    }

    tracing::info!(due = due.len(), "Sweep triggering refreshes");
    stream::iter(due)
        .for_each_concurrent(concurrency, |feed| {
            let engine = engine.clone();
            async move {
                run_refresh(&engine, feed.id, "sweep").await;
            }
        })
        .await;
}

async fn run_refresh(engine: &Engine, feed_id: i64, trigger: &str) {
    match engine.refresh(feed_id, false).await {
        Ok(RefreshOutcome::Fetched { new_articles }) => {
            tracing::info!(feed_id, new_articles, trigger, "Refresh cycle complete");
        }
        Ok(RefreshOutcome::Throttled) => {
            tracing::debug!(feed_id, trigger, "Refresh not yet due");
        }
        Ok(RefreshOutcome::AlreadyRunning) => {
            tracing::debug!(feed_id, trigger, "Refresh already in flight, firing skipped");
        }
        Err(EngineError::FeedNotFound(_)) => {
            tracing::debug!(feed_id, trigger, "Feed no longer exists, skipping");
        }
        Err(e) => {
            tracing::warn!(feed_id, trigger, error = %e, "Refresh cycle failed");
        }
    }
}

/// A poisoned job-table mutex only means a panic inside a lock scope that
/// never awaits; the map itself is still consistent, so keep going.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
