//! Drives tasks through their phases: population on the thread that owns the scene, generation on
//! a worker pool

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use misc::*;
use unit::world::ChunkLocation;

pub use worker_pool::{BlockingWorkerPool, ThreadedWorkerPool, WorkerPool, WorkerReport};

use crate::context::{ContentIndex, GenerationContext, SceneQuery};
use crate::profile::AgentProfile;
use crate::task::{ChunkTask, GenerationEnv, GenerationError, StopHandle, TaskKey};

mod worker_pool;

/// Invoked on the worker thread for every completed task
pub type CompletionHook<C> = Arc<dyn Fn(&mut ChunkTask<C>) + Send + Sync>;

pub struct GenerationScheduler<C: GenerationContext, P: WorkerPool<C>> {
    env: Arc<GenerationEnv<C>>,
    pool: P,
    /// Waiting for population
    queue: VecDeque<ChunkTask<C>>,
    /// Every queued or submitted task that has not been reported yet
    in_flight: HashMap<TaskKey, StopHandle>,
    tasks_per_pump: usize,
    on_complete: Option<CompletionHook<C>>,
}

#[derive(Debug, Error)]
pub enum BlockForAllError {
    #[error("No tasks have been submitted")]
    NothingInFlight,

    #[error("Timed out")]
    TimedOut,
}

impl<C: GenerationContext> GenerationScheduler<C, ThreadedWorkerPool<C>> {
    pub fn from_config(context: C, config: &config::Config) -> Result<Self, GenerationError> {
        let env = GenerationEnv::from_config(context, config)?;
        let pool = ThreadedWorkerPool::new(config.generation.worker_threads);
        Ok(Self::new(
            Arc::new(env),
            pool,
            config.generation.tasks_per_pump,
        ))
    }
}

impl<C: GenerationContext, P: WorkerPool<C>> GenerationScheduler<C, P> {
    pub fn new(env: Arc<GenerationEnv<C>>, pool: P, tasks_per_pump: usize) -> Self {
        Self {
            env,
            pool,
            queue: VecDeque::new(),
            in_flight: HashMap::new(),
            tasks_per_pump: tasks_per_pump.max(1),
            on_complete: None,
        }
    }

    pub fn with_completion_hook(mut self, hook: CompletionHook<C>) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub fn env(&self) -> &Arc<GenerationEnv<C>> {
        &self.env
    }

    /// Returns false if an equal task is already queued or in progress
    pub fn request(
        &mut self,
        chunk: ChunkLocation,
        profile: &Arc<AgentProfile>,
    ) -> Result<bool, GenerationError> {
        let key = TaskKey {
            chunk,
            profile: profile.clone(),
        };

        if self.in_flight.contains_key(&key) {
            trace!("ignoring duplicate request"; chunk, "profile" => &profile.name);
            return Ok(false);
        }

        let mut task = ChunkTask::new(self.env.clone(), chunk, profile.clone())?;
        if let Some(hook) = self.on_complete.as_ref() {
            let hook = hook.clone();
            task.set_callback(Box::new(move |task: &mut ChunkTask<C>| hook(task)));
        }

        self.in_flight.insert(key, task.stop_handle());
        self.queue.push_back(task);
        Ok(true)
    }

    /// Queued tasks are dropped immediately, submitted ones are stopped and still report.
    /// Returns false if there was no such task
    pub fn cancel(&mut self, chunk: ChunkLocation, profile: &Arc<AgentProfile>) -> bool {
        if let Some(idx) = self.queue.iter().position(|t| t.matches(chunk, profile)) {
            let task = self.queue.remove(idx);
            debug_assert!(task.is_some());
            self.in_flight.retain(|key, _| !key.matches(chunk, profile));
            debug!("cancelled queued task"; chunk, "profile" => &profile.name);
            return true;
        }

        match self
            .in_flight
            .iter()
            .find(|(key, _)| key.matches(chunk, profile))
        {
            Some((_, stop)) => {
                stop.stop();
                debug!("stopping submitted task"; chunk, "profile" => &profile.name);
                true
            }
            None => false,
        }
    }

    /// Populates up to `tasks_per_pump` queued tasks and submits them to the pool. Must be called
    /// on the thread that owns the scene. Returns the number submitted
    pub fn pump<Q, I>(&mut self, scene: &Q, content: &I) -> usize
    where
        Q: SceneQuery<C::Surface> + ?Sized,
        I: ContentIndex<C::Modifier> + ?Sized,
    {
        let mut submitted = 0;
        for _ in 0..self.tasks_per_pump {
            let mut task = match self.queue.pop_front() {
                Some(task) => task,
                None => break,
            };

            let result = task
                .populate_host(scene)
                .and_then(|_| task.populate_content(content));

            if let Err(e) = result {
                error!("failed to populate task"; task.chunk(), "profile" => &task.profile().name,
                    "error" => %e);
                self.in_flight.remove(&task.key());
                continue;
            }

            self.pool.submit(task);
            submitted += 1;
        }

        if submitted > 0 {
            debug!("submitted {count} tasks", count = submitted; "remaining" => self.queue.len());
        }

        submitted
    }

    pub fn block_on_next_report(&mut self, timeout: Duration) -> Option<WorkerReport<C>> {
        let report = self.pool.block_on_next_report(timeout)?;
        self.in_flight.remove(report.key());
        Some(report)
    }

    /// Waits for every submitted task to report. Queued tasks are left alone
    pub fn block_for_all(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<WorkerReport<C>>, BlockForAllError> {
        match self.submitted_count() {
            0 => Err(BlockForAllError::NothingInFlight),
            count => {
                let start_time = Instant::now();
                let mut reports = Vec::with_capacity(count);
                for i in 0..count {
                    let elapsed = start_time.elapsed();
                    let timeout = match timeout.checked_sub(elapsed) {
                        None => return Err(BlockForAllError::TimedOut),
                        Some(t) => t,
                    };

                    trace!("waiting for task {index}/{total}", index = i + 1, total = count;
                        "timeout" => ?timeout);
                    match self.block_on_next_report(timeout) {
                        None => return Err(BlockForAllError::TimedOut),
                        Some(report) => reports.push(report),
                    }
                }

                Ok(reports)
            }
        }
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Submitted to the pool but not reported yet
    pub fn submitted_count(&self) -> usize {
        self.in_flight.len() - self.queue.len()
    }
}
