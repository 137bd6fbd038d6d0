#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg_attr(feature = "fail-on-warnings", deny(clippy::all))]

//! In-process job scheduling: typed job configs resolve to runners via
//! registered initializers, and a tokio task drives each runner through its
//! completion/reschedule protocol with retry-on-error backoff. Runner
//! errors never escape the executor; they are logged and retried per the
//! initializer's `RetrySettings`.

pub mod error;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use error::JobError;

es_entity::entity_id! { JobId }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobType(&'static str);

impl JobType {
    pub const fn new(job_type: &'static str) -> Self {
        Self(job_type)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    config: serde_json::Value,
}

impl Job {
    pub fn config<C: DeserializeOwned>(&self) -> Result<C, serde_json::Error> {
        serde_json::from_value(self.config.clone())
    }
}

pub trait JobConfig: serde::Serialize {
    type Initializer: JobInitializer;
}

pub trait JobInitializer: Send + Sync + 'static {
    fn job_type() -> JobType
    where
        Self: Sized;

    fn init(&self, job: &Job) -> Result<Box<dyn JobRunner>, Box<dyn std::error::Error>>;

    fn retry_on_error_settings() -> RetrySettings
    where
        Self: Sized,
    {
        RetrySettings::default()
    }
}

#[async_trait::async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(
        &self,
        current_job: CurrentJob,
    ) -> Result<JobCompletion, Box<dyn std::error::Error>>;
}

#[derive(Debug)]
pub enum JobCompletion {
    Complete,
    RescheduleNow,
    RescheduleIn(Duration),
    RescheduleAt(DateTime<Utc>),
}

pub struct CurrentJob {
    id: JobId,
    job_type: JobType,
    attempt: u32,
}

impl CurrentJob {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    /// 1-based attempt counter; resets after every successful run.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub n_attempts: Option<u32>,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetrySettings {
    pub fn repeat_indefinitely() -> Self {
        Self {
            n_attempts: None,
            ..Self::default()
        }
    }

    fn is_exhausted(&self, attempt: u32) -> bool {
        matches!(self.n_attempts, Some(n) if attempt >= n)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            n_attempts: Some(5),
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

struct Dispatcher {
    retry: RetrySettings,
    init: Box<dyn Fn(&Job) -> Result<Box<dyn JobRunner>, String> + Send + Sync>,
}

#[derive(Default)]
struct JobsInner {
    dispatchers: RwLock<HashMap<JobType, Arc<Dispatcher>>>,
    running: Mutex<HashMap<JobId, JoinHandle<()>>>,
    unique: Mutex<HashMap<JobType, JobId>>,
}

/// Registry and executor for background jobs.
#[derive(Clone, Default)]
pub struct Jobs {
    inner: Arc<JobsInner>,
}

impl Jobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_initializer<I: JobInitializer>(&self, initializer: I) {
        let initializer = Arc::new(initializer);
        let dispatcher = Dispatcher {
            retry: I::retry_on_error_settings(),
            init: Box::new(move |job| initializer.init(job).map_err(|e| e.to_string())),
        };
        self.inner
            .dispatchers
            .write()
            .expect("dispatchers lock poisoned")
            .insert(I::job_type(), Arc::new(dispatcher));
    }

    /// Register an initializer and spawn a single long-lived instance of its
    /// job type. Repeat calls return the already-running instance.
    pub async fn add_initializer_and_spawn_unique<C: JobConfig>(
        &self,
        initializer: C::Initializer,
        config: C,
    ) -> Result<JobId, JobError> {
        self.add_initializer(initializer);
        let job_type = <C::Initializer as JobInitializer>::job_type();
        if let Some(existing) = self
            .inner
            .unique
            .lock()
            .expect("unique lock poisoned")
            .get(&job_type)
        {
            return Ok(*existing);
        }
        let id = self.spawn_job(job_type, serde_json::to_value(config)?, None)?;
        self.inner
            .unique
            .lock()
            .expect("unique lock poisoned")
            .insert(job_type, id);
        Ok(id)
    }

    pub async fn create_and_spawn<C: JobConfig>(&self, config: C) -> Result<JobId, JobError> {
        let job_type = <C::Initializer as JobInitializer>::job_type();
        self.spawn_job(job_type, serde_json::to_value(config)?, None)
    }

    pub async fn create_and_spawn_at<C: JobConfig>(
        &self,
        config: C,
        start_at: DateTime<Utc>,
    ) -> Result<JobId, JobError> {
        let job_type = <C::Initializer as JobInitializer>::job_type();
        self.spawn_job(job_type, serde_json::to_value(config)?, Some(start_at))
    }

    pub fn running_count(&self) -> usize {
        self.inner
            .running
            .lock()
            .expect("running lock poisoned")
            .len()
    }

    /// Abort every running job. Jobs are safe to interrupt between awaits:
    /// every scheduled operation in this workspace is idempotent.
    pub fn shutdown(&self) {
        let mut running = self.inner.running.lock().expect("running lock poisoned");
        for (_, handle) in running.drain() {
            handle.abort();
        }
    }

    fn spawn_job(
        &self,
        job_type: JobType,
        config: serde_json::Value,
        start_at: Option<DateTime<Utc>>,
    ) -> Result<JobId, JobError> {
        let dispatcher = self
            .inner
            .dispatchers
            .read()
            .expect("dispatchers lock poisoned")
            .get(&job_type)
            .cloned()
            .ok_or(JobError::InitializerMissing(job_type))?;

        let job = Job {
            id: JobId::new(),
            job_type,
            config,
        };
        let id = job.id;
        let runner = (dispatcher.init)(&job).map_err(JobError::Init)?;
        let retry = dispatcher.retry.clone();

        let inner = self.inner.clone();
        // Hold the lock across spawn so the task cannot deregister itself
        // before it has been registered.
        let mut running = self.inner.running.lock().expect("running lock poisoned");
        let handle = tokio::spawn(async move {
            if let Some(at) = start_at {
                sleep_until(at).await;
            }
            drive(&job, runner, retry).await;
            inner
                .running
                .lock()
                .expect("running lock poisoned")
                .remove(&id);
        });
        running.insert(id, handle);
        Ok(id)
    }
}

async fn drive(job: &Job, runner: Box<dyn JobRunner>, retry: RetrySettings) {
    let mut attempt: u32 = 1;
    loop {
        let current_job = CurrentJob {
            id: job.id,
            job_type: job.job_type,
            attempt,
        };
        let outcome = match runner.run(current_job).await {
            Ok(completion) => Ok(completion),
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(JobCompletion::Complete) => {
                tracing::debug!(job_type = %job.job_type, job_id = %job.id, "job completed");
                break;
            }
            Ok(JobCompletion::RescheduleNow) => {
                attempt = 1;
            }
            Ok(JobCompletion::RescheduleIn(delay)) => {
                attempt = 1;
                tokio::time::sleep(delay).await;
            }
            Ok(JobCompletion::RescheduleAt(at)) => {
                attempt = 1;
                sleep_until(at).await;
            }
            Err(error) => {
                if retry.is_exhausted(attempt) {
                    tracing::error!(
                        job_type = %job.job_type,
                        job_id = %job.id,
                        %error,
                        "job failed permanently"
                    );
                    break;
                }
                let backoff = retry.backoff(attempt);
                tracing::warn!(
                    job_type = %job.job_type,
                    job_id = %job.id,
                    %error,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "job errored, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    if let Ok(delay) = (at - Utc::now()).to_std() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct CountingConfig {
        runs_before_complete: u32,
    }

    impl JobConfig for CountingConfig {
        type Initializer = CountingInit;
    }

    struct CountingInit {
        counter: Arc<AtomicU32>,
    }

    const COUNTING_JOB: JobType = JobType::new("test.counting");

    impl JobInitializer for CountingInit {
        fn job_type() -> JobType {
            COUNTING_JOB
        }

        fn init(&self, job: &Job) -> Result<Box<dyn JobRunner>, Box<dyn std::error::Error>> {
            Ok(Box::new(CountingRunner {
                counter: self.counter.clone(),
                config: job.config()?,
            }))
        }
    }

    struct CountingRunner {
        counter: Arc<AtomicU32>,
        config: CountingConfig,
    }

    #[async_trait::async_trait]
    impl JobRunner for CountingRunner {
        async fn run(
            &self,
            _current_job: CurrentJob,
        ) -> Result<JobCompletion, Box<dyn std::error::Error>> {
            let runs = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            if runs >= self.config.runs_before_complete {
                Ok(JobCompletion::Complete)
            } else {
                Ok(JobCompletion::RescheduleIn(Duration::from_millis(5)))
            }
        }
    }

    #[derive(serde::Serialize)]
    struct FlakyConfig;

    impl JobConfig for FlakyConfig {
        type Initializer = FlakyInit;
    }

    struct FlakyInit {
        attempts_seen: Arc<AtomicU32>,
    }

    impl JobInitializer for FlakyInit {
        fn job_type() -> JobType {
            JobType::new("test.flaky")
        }

        fn init(&self, _job: &Job) -> Result<Box<dyn JobRunner>, Box<dyn std::error::Error>> {
            Ok(Box::new(FlakyRunner {
                attempts_seen: self.attempts_seen.clone(),
            }))
        }

        fn retry_on_error_settings() -> RetrySettings {
            RetrySettings {
                n_attempts: Some(5),
                min_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            }
        }
    }

    struct FlakyRunner {
        attempts_seen: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl JobRunner for FlakyRunner {
        async fn run(
            &self,
            current_job: CurrentJob,
        ) -> Result<JobCompletion, Box<dyn std::error::Error>> {
            self.attempts_seen.store(current_job.attempt(), Ordering::SeqCst);
            if current_job.attempt() < 3 {
                Err("transient".into())
            } else {
                Ok(JobCompletion::Complete)
            }
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn runs_until_runner_reports_complete() {
        let jobs = Jobs::new();
        let counter = Arc::new(AtomicU32::new(0));
        jobs.add_initializer(CountingInit {
            counter: counter.clone(),
        });
        jobs.create_and_spawn(CountingConfig {
            runs_before_complete: 3,
        })
        .await
        .unwrap();

        wait_for(|| counter.load(Ordering::SeqCst) == 3).await;
        wait_for(|| jobs.running_count() == 0).await;
        // No further runs after Complete.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_errors_until_success() {
        let jobs = Jobs::new();
        let attempts_seen = Arc::new(AtomicU32::new(0));
        jobs.add_initializer(FlakyInit {
            attempts_seen: attempts_seen.clone(),
        });
        jobs.create_and_spawn(FlakyConfig).await.unwrap();

        wait_for(|| attempts_seen.load(Ordering::SeqCst) == 3).await;
        wait_for(|| jobs.running_count() == 0).await;
    }

    #[tokio::test]
    async fn unique_spawn_returns_the_existing_instance() {
        let jobs = Jobs::new();
        let counter = Arc::new(AtomicU32::new(0));
        let first = jobs
            .add_initializer_and_spawn_unique(
                CountingInit {
                    counter: counter.clone(),
                },
                CountingConfig {
                    runs_before_complete: u32::MAX,
                },
            )
            .await
            .unwrap();
        let second = jobs
            .add_initializer_and_spawn_unique(
                CountingInit {
                    counter: counter.clone(),
                },
                CountingConfig {
                    runs_before_complete: u32::MAX,
                },
            )
            .await
            .unwrap();
        assert_eq!(first, second);
        jobs.shutdown();
    }

    #[tokio::test]
    async fn spawning_without_initializer_fails() {
        let jobs = Jobs::new();
        let result = jobs
            .create_and_spawn(CountingConfig {
                runs_before_complete: 1,
            })
            .await;
        assert!(matches!(result, Err(JobError::InitializerMissing(_))));
    }

    #[tokio::test]
    async fn create_and_spawn_at_delays_the_first_run() {
        let jobs = Jobs::new();
        let counter = Arc::new(AtomicU32::new(0));
        jobs.add_initializer(CountingInit {
            counter: counter.clone(),
        });
        jobs.create_and_spawn_at(
            CountingConfig {
                runs_before_complete: 1,
            },
            Utc::now() + chrono::Duration::milliseconds(50),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        wait_for(|| counter.load(Ordering::SeqCst) == 1).await;
    }
}
