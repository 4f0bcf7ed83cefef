use std::collections::{BTreeMap, BTreeSet};

/// Context shared by all tasks of one conversion run. Tasks run strictly in
/// order, so later tasks observe everything earlier ones recorded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkingState {
    row_counts_by_file_name: BTreeMap<String, u64>,
    started_tasks: BTreeSet<String>,
    default_agency_id: Option<String>,
}

impl WorkingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn start_task(&mut self, task: &str) {
        self.started_tasks.insert(task.to_string());
    }

    /// Whether `task` has run (or is running), i.e. whether its tables exist
    /// at this point of the output.
    pub fn has_run(&self, task: &str) -> bool {
        self.started_tasks.contains(task)
    }

    pub(crate) fn reset_row_count(&mut self, file: &str) {
        self.row_counts_by_file_name.insert(file.to_string(), 0);
    }

    pub(crate) fn increment_row_count(&mut self, file: &str) {
        *self
            .row_counts_by_file_name
            .entry(file.to_string())
            .or_insert(0) += 1;
    }

    /// Rows consumed so far for `file`; `None` if no source was read for it.
    pub fn row_count(&self, file: &str) -> Option<u64> {
        self.row_counts_by_file_name.get(file).copied()
    }

    pub fn row_counts(&self) -> &BTreeMap<String, u64> {
        &self.row_counts_by_file_name
    }

    pub fn set_default_agency_id(&mut self, agency_id: impl Into<String>) {
        self.default_agency_id = Some(agency_id.into());
    }

    /// Id of the first agency row, used for routes omitting `agency_id`.
    pub fn default_agency_id(&self) -> Option<&str> {
        self.default_agency_id.as_deref()
    }
}
