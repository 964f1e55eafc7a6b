use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use misc::parking_lot::Mutex;
use misc::*;
use unit::world::ChunkLocation;

use crate::profile::AgentProfile;
use crate::task::{Checkpoint, PipelineStage, TaskKey};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskEvent {
    HostPopulated { surfaces: usize },
    ContentPopulated { modifiers: usize, content: usize },
    GenerationStarted,
    StageFinished(PipelineStage),
    /// Graph is kept, just before the last stop check
    GraphReady,
    Aborted(Checkpoint),
    Failed,
    Finished,
    /// Destroyed before reaching an outcome, e.g. cancelled or failed population
    Dropped,
}

slog_value_debug!(TaskEvent);

/// Optional hook into task progress, for diagnostics only. Must not influence generation
pub trait GenerationObserver: Send + Sync {
    fn on_event(&self, chunk: ChunkLocation, profile: &Arc<AgentProfile>, event: TaskEvent);
}

#[derive(Clone, Debug)]
pub struct ProfileReport {
    pub chunk: ChunkLocation,
    pub profile: String,
    /// Each event with the time since the first event of the task
    pub entries: Vec<(TaskEvent, Duration)>,
}

/// Records timings of every task and dumps them to the log when the task ends
#[derive(Default)]
pub struct ProfilingObserver {
    running: Mutex<HashMap<TaskKey, (Instant, Vec<(TaskEvent, Duration)>)>>,
    reports: Mutex<Vec<ProfileReport>>,
}

impl ProfilingObserver {
    /// Removes all reports of finished tasks
    pub fn take_reports(&self) -> Vec<ProfileReport> {
        std::mem::take(&mut *self.reports.lock())
    }

    /// Tasks that have started but not ended yet
    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }
}

impl GenerationObserver for ProfilingObserver {
    fn on_event(&self, chunk: ChunkLocation, profile: &Arc<AgentProfile>, event: TaskEvent) {
        let now = Instant::now();
        let key = TaskKey {
            chunk,
            profile: profile.clone(),
        };

        let finished = {
            let mut running = self.running.lock();
            let (start, entries) = running.entry(key.clone()).or_insert_with(|| (now, vec![]));
            entries.push((event, now - *start));

            if matches!(
                event,
                TaskEvent::Finished
                    | TaskEvent::Aborted(_)
                    | TaskEvent::Failed
                    | TaskEvent::Dropped
            ) {
                running.remove(&key).map(|(_, entries)| entries)
            } else {
                None
            }
        };

        if let Some(entries) = finished {
            let total = entries.last().map(|(_, t)| *t).unwrap_or_default();
            debug!("task profile"; chunk, "profile" => &profile.name, "total" => ?total,
                "last" => event, "events" => entries.len());
            for (event, elapsed) in &entries {
                trace!("task profile entry"; chunk, "event" => *event, "elapsed" => ?elapsed);
            }

            self.reports.lock().push(ProfileReport {
                chunk,
                profile: profile.name.clone(),
                entries,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_on_end() {
        let observer = ProfilingObserver::default();
        let profile = Arc::new(AgentProfile::new("test"));
        let chunk = ChunkLocation(1, 2);

        observer.on_event(chunk, &profile, TaskEvent::HostPopulated { surfaces: 2 });
        observer.on_event(chunk, &profile, TaskEvent::GenerationStarted);
        assert!(observer.take_reports().is_empty());

        observer.on_event(chunk, &profile, TaskEvent::Aborted(Checkpoint::AfterCollect));
        let reports = observer.take_reports();
        assert_eq!(reports.len(), 1);

        let report = &reports[0];
        assert_eq!(report.chunk, chunk);
        assert_eq!(report.profile, "test");
        let events = report.entries.iter().map(|(e, _)| *e).collect_vec();
        assert_eq!(
            events,
            vec![
                TaskEvent::HostPopulated { surfaces: 2 },
                TaskEvent::GenerationStarted,
                TaskEvent::Aborted(Checkpoint::AfterCollect)
            ]
        );

        // elapsed times only go up
        assert!(report
            .entries
            .iter()
            .tuple_windows()
            .all(|((_, a), (_, b))| a <= b));
    }

    #[test]
    fn tasks_are_separate() {
        let observer = ProfilingObserver::default();
        let a = Arc::new(AgentProfile::new("same"));
        let b = Arc::new(AgentProfile::new("same"));

        observer.on_event(ChunkLocation(0, 0), &a, TaskEvent::GenerationStarted);
        observer.on_event(ChunkLocation(0, 0), &b, TaskEvent::GenerationStarted);
        observer.on_event(ChunkLocation(0, 0), &a, TaskEvent::Finished);

        let reports = observer.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].entries.len(), 2);

        observer.on_event(ChunkLocation(0, 0), &b, TaskEvent::Failed);
        assert_eq!(observer.take_reports()[0].entries.len(), 2);
    }
}
