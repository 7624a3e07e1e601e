use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SubflowError};
use crate::job::{Job, JobStatus};
use crate::worker::{JobRunner, WorkerEvent};

/// Explicit scheduler state, owned by the instance instead of an ambient
/// "processing" flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Active,
}

/// Events the scheduler exposes to its host
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    JobStarted(PathBuf),
    JobProgress {
        path: PathBuf,
        percent: u8,
        message: String,
    },
    JobFinished(PathBuf),
    JobFailed(PathBuf, String),
    BatchFinished,
}

#[derive(Debug)]
enum RunOutcome {
    Success,
    Failed(String),
    Canceled,
}

struct SchedulerInner {
    jobs: Vec<Job>,
    state: SchedulerState,
    batch_token: Option<CancellationToken>,
    current: Option<(PathBuf, CancellationToken)>,
}

/// Sequential batch scheduler: drives a list of jobs to completion with at
/// most one job executing at a time. Downstream work is resource-heavy, so
/// the orchestration layer never parallelizes it.
///
/// All state lives behind one lock; the drive loop never holds it across a
/// worker await. Cancellation is cooperative through child tokens handed to
/// the worker at start time.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<RwLock<SchedulerInner>>,
    runner: Arc<dyn JobRunner>,
    events: UnboundedSender<SchedulerEvent>,
}

impl BatchScheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> (Self, UnboundedReceiver<SchedulerEvent>) {
        let (events, receiver) = unbounded_channel();
        let scheduler = Self {
            inner: Arc::new(RwLock::new(SchedulerInner {
                jobs: Vec::new(),
                state: SchedulerState::Idle,
                batch_token: None,
                current: None,
            })),
            runner,
            events,
        };
        (scheduler, receiver)
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.read().await.state
    }

    /// Snapshot of the job list for host display
    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.read().await.jobs.clone()
    }

    /// Add a job to the batch. Rejected while a batch is active, or when
    /// the same source file is already listed.
    pub async fn add_job(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.state == SchedulerState::Active {
            return Err(SubflowError::BusyBatch("add_job".to_string()));
        }
        if inner.jobs.iter().any(|existing| existing.path == job.path) {
            return Err(SubflowError::DuplicateJob(job.path.display().to_string()));
        }
        info!("Added {:?} job: {}", job.kind, job.path.display());
        inner.jobs.push(job);
        Ok(())
    }

    /// Remove one job by source path. Rejected while a batch is active.
    pub async fn remove_job(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.state == SchedulerState::Active {
            return Err(SubflowError::BusyBatch("remove_job".to_string()));
        }
        let before = inner.jobs.len();
        inner.jobs.retain(|job| job.path != path);
        if inner.jobs.len() == before {
            warn!("No job to remove for {}", path.display());
        }
        Ok(())
    }

    /// Drop every job. Rejected while a batch is active.
    pub async fn clear_all(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.state == SchedulerState::Active {
            return Err(SubflowError::BusyBatch("clear_all".to_string()));
        }
        inner.jobs.clear();
        Ok(())
    }

    /// Start driving the batch. Fails with `EmptyBatch` when no jobs are
    /// listed and `BusyBatch` when already active; re-entrancy is rejected,
    /// not queued. When every job is already terminal the batch finishes
    /// immediately with zero work done.
    pub async fn start_batch(&self) -> Result<()> {
        let token = {
            let mut inner = self.inner.write().await;
            if inner.state == SchedulerState::Active {
                return Err(SubflowError::BusyBatch("start_batch".to_string()));
            }
            if inner.jobs.is_empty() {
                return Err(SubflowError::EmptyBatch);
            }
            if inner.jobs.iter().all(|job| job.status.is_terminal()) {
                info!("Every job is already terminal, finishing batch immediately");
                let _ = self.events.send(SchedulerEvent::BatchFinished);
                return Ok(());
            }
            let token = CancellationToken::new();
            inner.state = SchedulerState::Active;
            inner.batch_token = Some(token.clone());
            token
        };

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.drive(token).await });
        Ok(())
    }

    /// Cancel the active batch. Always safe to call: running jobs are asked
    /// to stop and forced back to Pending, jobs never started stay Pending,
    /// and the scheduler returns to Idle. Idempotent.
    pub async fn cancel_batch(&self) {
        let mut inner = self.inner.write().await;
        if let Some(token) = inner.batch_token.take() {
            token.cancel();
        }
        inner.current = None;
        inner.state = SchedulerState::Idle;
        for job in &mut inner.jobs {
            if job.status.is_running() {
                job.status = JobStatus::Pending;
            }
        }
        info!("Batch canceled");
    }

    /// Cancel one job, forcing it back to Pending if it is running. The
    /// worker is asked to stop; bookkeeping is released immediately either
    /// way. Idempotent. During an active batch the job is picked up again
    /// in its original position on the next scan.
    pub async fn cancel_job(&self, path: &Path) {
        let mut inner = self.inner.write().await;
        if let Some((current_path, token)) = &inner.current {
            if current_path == path {
                token.cancel();
            }
        }
        if let Some(job) = inner.jobs.iter_mut().find(|job| job.path == path) {
            if job.status.is_running() {
                job.status = JobStatus::Pending;
                info!("Canceled job: {}", path.display());
            }
        }
    }

    /// Reset a job to Pending so a later batch reprocesses it. Rejected
    /// while a batch is active; starting a Completed job without a reset is
    /// a warn-level no-op in the scan.
    pub async fn reset_job(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.state == SchedulerState::Active {
            return Err(SubflowError::BusyBatch("reset_job".to_string()));
        }
        if let Some(job) = inner.jobs.iter_mut().find(|job| job.path == path) {
            job.status = JobStatus::Pending;
        }
        Ok(())
    }

    /// Control loop: repeatedly scan from the head of the list for the
    /// first non-terminal job and run it. Scanning from the start means a
    /// job canceled back to Pending is picked up again in its original
    /// position, and a job completed by an earlier run is skipped with a
    /// warning rather than restarted.
    async fn drive(&self, batch_token: CancellationToken) {
        loop {
            if batch_token.is_cancelled() {
                debug!("Batch token canceled, stopping drive loop");
                return;
            }

            let job = {
                let mut inner = self.inner.write().await;
                if inner.state != SchedulerState::Active {
                    return;
                }
                match inner.jobs.iter_mut().find(|job| !job.status.is_terminal()) {
                    Some(job) => {
                        job.status = job.kind.initial_running_status();
                        job.clone()
                    }
                    None => {
                        inner.state = SchedulerState::Idle;
                        inner.batch_token = None;
                        inner.current = None;
                        drop(inner);
                        info!("All jobs terminal, batch finished");
                        let _ = self.events.send(SchedulerEvent::BatchFinished);
                        return;
                    }
                }
            };

            let job_token = batch_token.child_token();
            {
                let mut inner = self.inner.write().await;
                inner.current = Some((job.path.clone(), job_token.clone()));
            }
            let _ = self.events.send(SchedulerEvent::JobStarted(job.path.clone()));

            let outcome = self.run_job(&job, &job_token).await;

            let mut inner = self.inner.write().await;
            if batch_token.is_cancelled() {
                // A restarted batch may own the bookkeeping by now
                return;
            }
            inner.current = None;
            if let Some(stored) = inner.jobs.iter_mut().find(|stored| stored.path == job.path) {
                match outcome {
                    RunOutcome::Success => {
                        stored.status = JobStatus::Completed;
                        let _ = self.events.send(SchedulerEvent::JobFinished(job.path.clone()));
                    }
                    RunOutcome::Failed(message) => {
                        // A failed job never stops the batch; the next scan advances
                        stored.status = JobStatus::Failed;
                        warn!("Job failed: {}: {}", job.path.display(), message);
                        let _ = self
                            .events
                            .send(SchedulerEvent::JobFailed(job.path.clone(), message));
                    }
                    RunOutcome::Canceled => {
                        stored.status = JobStatus::Pending;
                    }
                }
            }
        }
    }

    /// Run one job on a spawned worker, draining its event stream without
    /// ever blocking the control loop on a synchronous wait
    async fn run_job(&self, job: &Job, token: &CancellationToken) -> RunOutcome {
        let (worker_events, mut worker_receiver) = unbounded_channel();
        let runner = self.runner.clone();
        let worker_job = job.clone();
        let worker_token = token.clone();
        let mut handle = tokio::spawn(async move {
            runner.run(&worker_job, &worker_events, &worker_token).await
        });

        loop {
            tokio::select! {
                result = &mut handle => {
                    return match result {
                        Ok(Ok(())) => RunOutcome::Success,
                        Ok(Err(error)) => RunOutcome::Failed(error.to_string()),
                        Err(join_error) => RunOutcome::Failed(format!("worker panicked: {join_error}")),
                    };
                }
                Some(event) = worker_receiver.recv() => {
                    self.handle_worker_event(&job.path, event).await;
                }
                _ = token.cancelled() => {
                    // Best-effort stop: release bookkeeping immediately, the
                    // collaborator cleans up any partial output
                    handle.abort();
                    return RunOutcome::Canceled;
                }
            }
        }
    }

    async fn handle_worker_event(&self, path: &Path, event: WorkerEvent) {
        match event {
            WorkerEvent::Stage(status) => {
                let mut inner = self.inner.write().await;
                if let Some(job) = inner.jobs.iter_mut().find(|job| job.path == path) {
                    if !job.status.is_terminal() {
                        job.status = status;
                    }
                }
            }
            WorkerEvent::Progress { percent, message } => {
                let _ = self.events.send(SchedulerEvent::JobProgress {
                    path: path.to_path_buf(),
                    percent,
                    message,
                });
            }
            WorkerEvent::PartialUpdate(_) | WorkerEvent::FullUpdate(_) => {
                // Document mirroring is a host concern; the batch scheduler
                // only tracks job lifecycle
                debug!("Ignoring document update from {}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobKind, JobParams};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::timeout;

    struct ScriptedRunner {
        fail_suffixes: Vec<&'static str>,
        delay: Duration,
    }

    impl ScriptedRunner {
        fn instant() -> Self {
            Self {
                fail_suffixes: Vec::new(),
                delay: Duration::from_millis(0),
            }
        }

        fn hanging() -> Self {
            Self {
                fail_suffixes: Vec::new(),
                delay: Duration::from_secs(60),
            }
        }

        fn failing(suffixes: Vec<&'static str>) -> Self {
            Self {
                fail_suffixes: suffixes,
                delay: Duration::from_millis(0),
            }
        }
    }

    #[async_trait]
    impl JobRunner for ScriptedRunner {
        async fn run(
            &self,
            job: &Job,
            _events: &UnboundedSender<WorkerEvent>,
            cancel: &CancellationToken,
        ) -> Result<()> {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {
                    return Err(SubflowError::Worker("canceled".to_string()));
                }
            }
            let failed = self
                .fail_suffixes
                .iter()
                .any(|suffix| job.path.to_string_lossy().ends_with(suffix));
            if failed {
                Err(SubflowError::Worker("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Hangs until canceled on the first `hang_attempts` runs for the
    /// listed paths, succeeds on every later attempt
    struct RetryingRunner {
        hang_suffixes: Vec<&'static str>,
        hang_attempts: u32,
        attempts: std::sync::Mutex<std::collections::HashMap<PathBuf, u32>>,
    }

    impl RetryingRunner {
        fn new(hang_suffixes: Vec<&'static str>, hang_attempts: u32) -> Self {
            Self {
                hang_suffixes,
                hang_attempts,
                attempts: std::sync::Mutex::new(std::collections::HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl JobRunner for RetryingRunner {
        async fn run(
            &self,
            job: &Job,
            _events: &UnboundedSender<WorkerEvent>,
            cancel: &CancellationToken,
        ) -> Result<()> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let count = attempts.entry(job.path.clone()).or_insert(0);
                *count += 1;
                *count
            };
            let hangs = self
                .hang_suffixes
                .iter()
                .any(|suffix| job.path.to_string_lossy().ends_with(suffix));
            if hangs && attempt <= self.hang_attempts {
                cancel.cancelled().await;
                return Err(SubflowError::Worker("canceled".to_string()));
            }
            Ok(())
        }
    }

    fn job(name: &str) -> Job {
        Job::new(name, JobKind::SubtitlePipeline, JobParams::default())
    }

    async fn next_event(receiver: &mut UnboundedReceiver<SchedulerEvent>) -> SchedulerEvent {
        timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("timed out waiting for scheduler event")
            .expect("event channel closed")
    }

    async fn drain_until_finished(
        receiver: &mut UnboundedReceiver<SchedulerEvent>,
    ) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        loop {
            let event = next_event(receiver).await;
            let finished = matches!(event, SchedulerEvent::BatchFinished);
            events.push(event);
            if finished {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected_without_state_change() {
        let (scheduler, _events) = BatchScheduler::new(Arc::new(ScriptedRunner::instant()));
        assert!(matches!(
            scheduler.start_batch().await,
            Err(SubflowError::EmptyBatch)
        ));
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_batch_runs_every_job_and_finishes_once() {
        let (scheduler, mut events) = BatchScheduler::new(Arc::new(ScriptedRunner::instant()));
        scheduler.add_job(job("a.mp4")).await.unwrap();
        scheduler.add_job(job("b.mp4")).await.unwrap();
        scheduler.add_job(job("c.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();
        let seen = drain_until_finished(&mut events).await;

        let finished = seen
            .iter()
            .filter(|event| matches!(event, SchedulerEvent::JobFinished(_)))
            .count();
        let batch_finished = seen
            .iter()
            .filter(|event| matches!(event, SchedulerEvent::BatchFinished))
            .count();
        assert_eq!(finished, 3);
        assert_eq!(batch_finished, 1);

        assert_eq!(scheduler.state().await, SchedulerState::Idle);
        assert!(scheduler
            .jobs()
            .await
            .iter()
            .all(|job| job.status == JobStatus::Completed));
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_the_batch() {
        let (scheduler, mut events) =
            BatchScheduler::new(Arc::new(ScriptedRunner::failing(vec!["b.mp4"])));
        scheduler.add_job(job("a.mp4")).await.unwrap();
        scheduler.add_job(job("b.mp4")).await.unwrap();
        scheduler.add_job(job("c.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();
        let seen = drain_until_finished(&mut events).await;

        // Job 3 still ran, and the batch only finished after its terminal
        // transition
        let failed: Vec<_> = seen
            .iter()
            .filter_map(|event| match event {
                SchedulerEvent::JobFailed(path, _) => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![PathBuf::from("b.mp4")]);

        let last_terminal = seen
            .iter()
            .rev()
            .find_map(|event| match event {
                SchedulerEvent::JobFinished(path) => Some(path.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_terminal, PathBuf::from("c.mp4"));

        let jobs = scheduler.jobs().await;
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert_eq!(jobs[1].status, JobStatus::Failed);
        assert_eq!(jobs[2].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_reentrant_start_is_rejected() {
        let (scheduler, _events) = BatchScheduler::new(Arc::new(ScriptedRunner::hanging()));
        scheduler.add_job(job("a.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();
        assert!(matches!(
            scheduler.start_batch().await,
            Err(SubflowError::BusyBatch(_))
        ));
        scheduler.cancel_batch().await;
    }

    #[tokio::test]
    async fn test_cancel_batch_leaves_jobs_terminal_or_pending() {
        let (scheduler, mut events) = BatchScheduler::new(Arc::new(ScriptedRunner::hanging()));
        scheduler.add_job(job("a.mp4")).await.unwrap();
        scheduler.add_job(job("b.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();
        // Wait until the first job is actually running
        assert!(matches!(
            next_event(&mut events).await,
            SchedulerEvent::JobStarted(_)
        ));

        scheduler.cancel_batch().await;
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
        assert!(scheduler
            .jobs()
            .await
            .iter()
            .all(|job| job.status.is_terminal() || job.status == JobStatus::Pending));

        // Safe to call again with no batch active
        scheduler.cancel_batch().await;
    }

    #[tokio::test]
    async fn test_remove_and_clear_rejected_while_active() {
        let (scheduler, _events) = BatchScheduler::new(Arc::new(ScriptedRunner::hanging()));
        scheduler.add_job(job("a.mp4")).await.unwrap();
        scheduler.start_batch().await.unwrap();

        assert!(matches!(
            scheduler.remove_job(Path::new("a.mp4")).await,
            Err(SubflowError::BusyBatch(_))
        ));
        assert!(matches!(
            scheduler.clear_all().await,
            Err(SubflowError::BusyBatch(_))
        ));

        scheduler.cancel_batch().await;
        scheduler.remove_job(Path::new("a.mp4")).await.unwrap();
        scheduler.clear_all().await.unwrap();
        assert!(scheduler.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_job_is_rejected() {
        let (scheduler, _events) = BatchScheduler::new(Arc::new(ScriptedRunner::instant()));
        scheduler.add_job(job("a.mp4")).await.unwrap();
        assert!(matches!(
            scheduler.add_job(job("a.mp4")).await,
            Err(SubflowError::DuplicateJob(_))
        ));
        assert_eq!(scheduler.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_all_terminal_batch_finishes_immediately() {
        let (scheduler, mut events) = BatchScheduler::new(Arc::new(ScriptedRunner::instant()));
        let mut done = job("a.mp4");
        done.status = JobStatus::Completed;
        let mut failed = job("b.mp4");
        failed.status = JobStatus::Failed;
        scheduler.add_job(done).await.unwrap();
        scheduler.add_job(failed).await.unwrap();

        scheduler.start_batch().await.unwrap();
        // Zero work done: no job starts, the batch just finishes
        assert!(matches!(
            next_event(&mut events).await,
            SchedulerEvent::BatchFinished
        ));
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_already_completed_jobs_are_skipped() {
        let (scheduler, mut events) = BatchScheduler::new(Arc::new(ScriptedRunner::instant()));
        let mut done = job("a.mp4");
        done.status = JobStatus::Completed;
        scheduler.add_job(done).await.unwrap();
        scheduler.add_job(job("b.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();
        let seen = drain_until_finished(&mut events).await;

        let started: Vec<_> = seen
            .iter()
            .filter_map(|event| match event {
                SchedulerEvent::JobStarted(path) => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![PathBuf::from("b.mp4")]);
    }

    #[tokio::test]
    async fn test_reset_job_requeues_for_reprocessing() {
        let (scheduler, mut events) = BatchScheduler::new(Arc::new(ScriptedRunner::instant()));
        scheduler.add_job(job("a.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();
        drain_until_finished(&mut events).await;
        assert_eq!(scheduler.jobs().await[0].status, JobStatus::Completed);

        scheduler.reset_job(Path::new("a.mp4")).await.unwrap();
        assert_eq!(scheduler.jobs().await[0].status, JobStatus::Pending);

        scheduler.start_batch().await.unwrap();
        let seen = drain_until_finished(&mut events).await;
        assert!(seen
            .iter()
            .any(|event| matches!(event, SchedulerEvent::JobFinished(_))));
    }

    #[tokio::test]
    async fn test_canceled_job_is_picked_up_again_in_original_position() {
        let (scheduler, mut events) =
            BatchScheduler::new(Arc::new(RetryingRunner::new(vec!["b.mp4"], 1)));
        scheduler.add_job(job("a.mp4")).await.unwrap();
        scheduler.add_job(job("b.mp4")).await.unwrap();
        scheduler.add_job(job("c.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();

        // Wait until b.mp4 is the running job, then cancel just that job
        loop {
            if let SchedulerEvent::JobStarted(path) = next_event(&mut events).await {
                if path == PathBuf::from("b.mp4") {
                    break;
                }
            }
        }
        scheduler.cancel_job(Path::new("b.mp4")).await;

        let seen = drain_until_finished(&mut events).await;
        let started: Vec<_> = seen
            .iter()
            .filter_map(|event| match event {
                SchedulerEvent::JobStarted(path) => Some(path.clone()),
                _ => None,
            })
            .collect();
        // The canceled job restarts ahead of c.mp4, in its original slot
        assert_eq!(
            started,
            vec![PathBuf::from("b.mp4"), PathBuf::from("c.mp4")]
        );
        assert!(scheduler
            .jobs()
            .await
            .iter()
            .all(|job| job.status == JobStatus::Completed));
    }

    #[tokio::test]
    async fn test_restarted_batch_keeps_its_running_job_cancelable() {
        let (scheduler, mut events) =
            BatchScheduler::new(Arc::new(RetryingRunner::new(vec!["a.mp4"], 2)));
        scheduler.add_job(job("a.mp4")).await.unwrap();

        scheduler.start_batch().await.unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            SchedulerEvent::JobStarted(_)
        ));

        // Cancel and immediately restart: the old drive task's teardown
        // must not wipe the new batch's bookkeeping
        scheduler.cancel_batch().await;
        scheduler.start_batch().await.unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            SchedulerEvent::JobStarted(_)
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The running job is still tracked, so canceling it reaches the
        // worker; the job is then picked up again and succeeds
        scheduler.cancel_job(Path::new("a.mp4")).await;
        let seen = drain_until_finished(&mut events).await;
        assert!(seen
            .iter()
            .any(|event| matches!(event, SchedulerEvent::JobFinished(_))));
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
        assert_eq!(scheduler.jobs().await[0].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_stage_events_update_job_status() {
        struct StagingRunner;

        #[async_trait]
        impl JobRunner for StagingRunner {
            async fn run(
                &self,
                _job: &Job,
                events: &UnboundedSender<WorkerEvent>,
                _cancel: &CancellationToken,
            ) -> Result<()> {
                let _ = events.send(WorkerEvent::Stage(JobStatus::Optimizing));
                let _ = events.send(WorkerEvent::Progress {
                    percent: 50,
                    message: "halfway".to_string(),
                });
                // Give the drive loop a chance to drain the events before
                // the worker reports success
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }
        }

        let (scheduler, mut events) = BatchScheduler::new(Arc::new(StagingRunner));
        scheduler.add_job(job("a.mp4")).await.unwrap();
        scheduler.start_batch().await.unwrap();

        let seen = drain_until_finished(&mut events).await;
        assert!(seen.iter().any(|event| matches!(
            event,
            SchedulerEvent::JobProgress { percent: 50, .. }
        )));
        assert_eq!(scheduler.jobs().await[0].status, JobStatus::Completed);
    }
}
