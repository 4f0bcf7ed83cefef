use tracing::{debug, info};

/// Trait for handling progress events during a conversion run
pub trait ProgressHandler: Send + Sync {
    /// Called before the first fragment of a task
    fn on_start_task(&self, task: &str);

    /// Called after the last fragment of a task; `rows` is the number of
    /// source rows consumed, if the task read a file
    fn on_finish_task(&self, task: &str, rows: Option<u64>);

    /// Set total number of tasks to run
    fn set_total_tasks(&self, count: usize) {
        let _ = count;
    }
}

/// A no-op progress handler
pub struct NoOpProgressHandler;

impl ProgressHandler for NoOpProgressHandler {
    fn on_start_task(&self, _task: &str) {}
    fn on_finish_task(&self, _task: &str, _rows: Option<u64>) {}
}

/// Logs each task name at info level.
#[derive(Debug, Default)]
pub struct LoggingProgressHandler;

impl ProgressHandler for LoggingProgressHandler {
    fn on_start_task(&self, task: &str) {
        info!("{task}");
    }

    fn on_finish_task(&self, task: &str, rows: Option<u64>) {
        if let Some(rows) = rows {
            debug!(task, rows, "task finished");
        }
    }

    fn set_total_tasks(&self, count: usize) {
        debug!("{count} tasks to run");
    }
}
