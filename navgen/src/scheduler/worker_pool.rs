use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use threadpool::ThreadPool;

use misc::*;

use crate::context::GenerationContext;
use crate::task::{ChunkTask, Checkpoint, TaskKey, TaskOutcome};

/// Result of running phase 3 of a single task
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum WorkerReport<C: GenerationContext> {
    /// Graph is none if the completion callback took it
    Completed {
        key: TaskKey,
        #[derivative(Debug = "ignore")]
        graph: Option<C::Graph>,
    },
    Aborted {
        key: TaskKey,
        at: Checkpoint,
    },
    Failed {
        key: TaskKey,
        reason: String,
    },
}

impl<C: GenerationContext> WorkerReport<C> {
    pub fn key(&self) -> &TaskKey {
        match self {
            WorkerReport::Completed { key, .. }
            | WorkerReport::Aborted { key, .. }
            | WorkerReport::Failed { key, .. } => key,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, WorkerReport::Completed { .. })
    }
}

pub trait WorkerPool<C: GenerationContext> {
    /// Task must have been populated already
    fn submit(&mut self, task: ChunkTask<C>);

    fn block_on_next_report(&mut self, timeout: Duration) -> Option<WorkerReport<C>>;
}

/// Runs phase 3 and turns whatever happens into a report, panics included
fn run_task<C: GenerationContext>(mut task: ChunkTask<C>) -> WorkerReport<C> {
    let key = task.key();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        ChunkTask::thread_worker(Some(&mut task))
    }));

    match result {
        Ok(Ok(Some(TaskOutcome::Completed))) => WorkerReport::Completed {
            key,
            graph: task.take_graph(),
        },
        Ok(Ok(Some(TaskOutcome::Aborted(at)))) => WorkerReport::Aborted { key, at },
        Ok(Ok(None)) => WorkerReport::Failed {
            key,
            reason: format!("task was not ready for generation ({:?})", task.state()),
        },
        Ok(Err(err)) => WorkerReport::Failed {
            key,
            reason: err.to_string(),
        },
        // already logged by the task
        Err(_) => WorkerReport::Failed {
            key,
            reason: "generation panicked".to_owned(),
        },
    }
}

pub struct ThreadedWorkerPool<C: GenerationContext> {
    pool: ThreadPool,
    report_rx: Receiver<WorkerReport<C>>,
    report_tx: Sender<WorkerReport<C>>,
}

impl<C: GenerationContext> ThreadedWorkerPool<C> {
    pub fn new(threads: usize) -> Self {
        let (report_tx, report_rx) = unbounded();
        Self {
            pool: ThreadPool::with_name("navgen-worker".to_owned(), threads.max(1)),
            report_rx,
            report_tx,
        }
    }
}

impl<C: GenerationContext> WorkerPool<C> for ThreadedWorkerPool<C> {
    fn submit(&mut self, task: ChunkTask<C>) {
        let report_tx = self.report_tx.clone();
        self.pool.execute(move || {
            let report = run_task(task);
            if let Err(e) = report_tx.send(report) {
                error!("failed to send generation report"; "error" => %e);
            }
        });
    }

    fn block_on_next_report(&mut self, timeout: Duration) -> Option<WorkerReport<C>> {
        self.report_rx.recv_timeout(timeout).ok()
    }
}

/// Defers all work until a report is asked for, then runs it on the calling thread
#[derive(Derivative)]
#[derivative(Default(bound = ""))]
pub struct BlockingWorkerPool<C: GenerationContext> {
    task_queue: VecDeque<ChunkTask<C>>,
}

impl<C: GenerationContext> WorkerPool<C> for BlockingWorkerPool<C> {
    fn submit(&mut self, task: ChunkTask<C>) {
        // do the work later when we're asked for it
        self.task_queue.push_back(task);
    }

    fn block_on_next_report(&mut self, _: Duration) -> Option<WorkerReport<C>> {
        let task = self.task_queue.pop_front()?;
        Some(run_task(task))
    }
}
