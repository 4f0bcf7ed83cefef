//! Turns the caller's file list into an ordered list of tasks.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::deps::{optional_tasks, DeclareDependencies, ALWAYS_PRESENT_TASKS};
use crate::error::{ConfigError, ConvertError};
use crate::files::{FileSource, GtfsFile};
use crate::formatter::FormatterRegistry;
use crate::options::Options;

/// One unit of work: a GTFS file or a synthetic task.
#[derive(Debug)]
pub struct Task {
    pub name: String,
    /// Absent for synthetic tasks and for always-present files that were not
    /// supplied.
    pub source: Option<FileSource>,
    /// Tasks that run before this one, restricted to tasks of this run.
    pub dependencies: Vec<String>,
}

/// Checks file names against the registry. Unsupported files are an error,
/// or dropped as if never supplied when `ignore_unsupported` is set.
pub fn select_supported_files(
    files: Vec<GtfsFile>,
    registry: &FormatterRegistry,
    ignore_unsupported: bool,
) -> Result<Vec<GtfsFile>, ConfigError> {
    let mut seen = BTreeSet::new();
    let mut selected = Vec::with_capacity(files.len());
    for file in files {
        if !registry.supports_file(&file.name) {
            if ignore_unsupported {
                debug!("ignoring unsupported file {}", file.name);
                continue;
            }
            return Err(ConfigError::UnsupportedFile(file.name));
        }
        if !seen.insert(file.name.clone()) {
            return Err(ConfigError::DuplicateFile(file.name));
        }
        selected.push(file);
    }
    Ok(selected)
}

/// Builds the task graph for `files` and orders it topologically.
///
/// Tasks are declared in this order: always-present tasks, requested files in
/// the order given, then optional synthetic tasks. Among tasks whose
/// dependencies are satisfied, the first declared runs first, so the order is
/// stable for a fixed input.
pub fn resolve_tasks(
    files: Vec<GtfsFile>,
    declare_dependencies: DeclareDependencies,
    opts: &Options,
    registry: &FormatterRegistry,
) -> Result<Vec<Task>, ConvertError> {
    let requested: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
    let table = declare_dependencies(opts, &requested);
    let declared_deps = |name: &str| table.get(name).cloned().unwrap_or_default();

    let mut graph = TaskGraph::default();
    for &name in ALWAYS_PRESENT_TASKS {
        graph.declare(name, None, declared_deps(name));
    }

    for file in files {
        let dependencies = declared_deps(&file.name);
        if opts.require_dependencies {
            let missing = dependencies.iter().find(|dep| {
                !requested.contains(dep) && !ALWAYS_PRESENT_TASKS.contains(&dep.as_str())
            });
            if let Some(dependency) = missing {
                return Err(ConvertError::MissingDependency {
                    dependent: file.name,
                    dependency: dependency.clone(),
                });
            }
        }
        graph.declare(&file.name, Some(file.source), dependencies);
    }

    for name in optional_tasks(opts) {
        let dependencies = declared_deps(name);
        let missing = dependencies.iter().find(|dep| !graph.contains(dep));
        match missing {
            Some(dependency) if opts.require_dependencies => {
                return Err(ConvertError::MissingDependency {
                    dependent: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
            Some(dependency) => {
                warn!("skipping {name} because {dependency} is not available");
            }
            None => graph.declare(name, None, dependencies),
        }
    }

    for task in &graph.tasks {
        if registry.get(&task.name).is_none() {
            return Err(ConvertError::UnknownTask(task.name.clone()));
        }
    }

    graph.into_ordered()
}

#[derive(Default)]
struct TaskGraph {
    tasks: Vec<Task>,
    index: FxHashMap<String, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl TaskGraph {
    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Adds a task, or fills in the source of an always-present one.
    fn declare(&mut self, name: &str, source: Option<FileSource>, dependencies: Vec<String>) {
        if let Some(&i) = self.index.get(name) {
            let task = &mut self.tasks[i];
            task.source = source.or(task.source.take());
            task.dependencies = dependencies;
            return;
        }
        self.index.insert(name.to_string(), self.tasks.len());
        self.tasks.push(Task {
            name: name.to_string(),
            source,
            dependencies,
        });
    }

    fn into_ordered(mut self) -> Result<Vec<Task>, ConvertError> {
        // dependencies that are not tasks of this run are treated as absent
        for i in 0..self.tasks.len() {
            let dependencies = std::mem::take(&mut self.tasks[i].dependencies);
            self.tasks[i].dependencies = dependencies
                .into_iter()
                .filter(|dep| self.index.contains_key(dep))
                .collect();
        }

        let mut marks = vec![Mark::Unvisited; self.tasks.len()];
        let mut order = Vec::with_capacity(self.tasks.len());
        let mut path = Vec::new();
        for i in 0..self.tasks.len() {
            self.visit(i, &mut marks, &mut path, &mut order)?;
        }

        let mut slots: Vec<Option<Task>> = self.tasks.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i: usize| slots[i].take())
            .collect())
    }

    fn visit(
        &self,
        i: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ConvertError> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = path.iter().position(|&p| p == i).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&p| self.tasks[p].name.clone())
                    .collect();
                cycle.push(self.tasks[i].name.clone());
                return Err(ConvertError::DependencyCycle(cycle));
            }
            Mark::Unvisited => {}
        }
        marks[i] = Mark::Visiting;
        path.push(i);
        for dep in &self.tasks[i].dependencies {
            if let Some(&d) = self.index.get(dep) {
                self.visit(d, marks, path, order)?;
            }
        }
        path.pop();
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::{default_dependencies, DependencyTable};
    use crate::formatters::default_registry;
    use crate::options::{OptionOverrides, StatsMode};

    fn files(names: &[&str]) -> Vec<GtfsFile> {
        names
            .iter()
            .map(|name| GtfsFile::from_bytes(*name, Vec::new()))
            .collect()
    }

    fn order(names: &[&str], overrides: OptionOverrides) -> Result<Vec<String>, ConvertError> {
        let opts = Options::resolve(&overrides, names)?;
        let tasks = resolve_tasks(
            files(names),
            default_dependencies,
            &opts,
            &default_registry(),
        )?;
        Ok(tasks.into_iter().map(|t| t.name).collect())
    }

    fn position(order: &[String], name: &str) -> usize {
        order
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
    }

    #[test]
    fn orders_dependencies_first() {
        let names = [
            "stop_times",
            "trips",
            "routes",
            "agency",
            "stops",
            "calendar",
            "shapes",
        ];
        let order = order(&names, OptionOverrides::default()).unwrap();
        assert!(position(&order, "valid_timezones") < position(&order, "agency"));
        assert!(position(&order, "agency") < position(&order, "routes"));
        assert!(position(&order, "routes") < position(&order, "trips"));
        assert!(position(&order, "shapes") < position(&order, "trips"));
        assert!(position(&order, "service_days") < position(&order, "trips"));
        assert!(position(&order, "trips") < position(&order, "stop_times"));
        assert!(position(&order, "stops") < position(&order, "stop_times"));
        for name in names {
            assert_eq!(order.iter().filter(|n| *n == name).count(), 1);
        }
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let order = order(&["agency", "levels"], OptionOverrides::default()).unwrap();
        assert_eq!(
            order,
            vec![
                "valid_lang_codes",
                "valid_timezones",
                "calendar",
                "calendar_dates",
                "service_days",
                "agency",
                "levels",
            ]
        );
    }

    #[test]
    fn always_present_files_take_the_supplied_source() {
        let opts = Options::resolve(&OptionOverrides::default(), &["calendar"]).unwrap();
        let tasks = resolve_tasks(
            files(&["calendar"]),
            default_dependencies,
            &opts,
            &default_registry(),
        )
        .unwrap();
        let calendar = tasks.iter().find(|t| t.name == "calendar").unwrap();
        assert!(calendar.source.is_some());
        let calendar_dates = tasks.iter().find(|t| t.name == "calendar_dates").unwrap();
        assert!(calendar_dates.source.is_none());
    }

    #[test]
    fn missing_dependency_gate() {
        let strict = OptionOverrides {
            require_dependencies: Some(true),
            ..Default::default()
        };
        let err = order(&["stop_times", "stops"], strict).unwrap_err();
        assert_eq!(err.code(), "MISSING_GTFS_DEPENDENCY");
        assert_eq!(err.to_string(), "stop_times depends on trips");

        // without the flag, absent dependencies are dropped
        let order = order(&["stop_times", "stops"], OptionOverrides::default()).unwrap();
        assert!(order.contains(&"stop_times".to_string()));
    }

    #[test]
    fn optional_tasks_need_their_dependencies() {
        let stats = OptionOverrides {
            stats_by_route_id_and_date: Some(StatsMode::View),
            ..Default::default()
        };
        let order_without = order(&["agency"], stats.clone()).unwrap();
        assert!(!order_without.contains(&"stats_by_route_date".to_string()));

        let order_with = order(&["stop_times"], stats.clone()).unwrap();
        assert_eq!(order_with.last().map(String::as_str), Some("stats_by_route_date"));

        let strict = OptionOverrides {
            require_dependencies: Some(true),
            ..stats
        };
        assert!(matches!(
            order(&["agency"], strict),
            Err(ConvertError::MissingDependency { .. })
        ));
    }

    #[test]
    fn unsupported_files() {
        let registry = default_registry();
        let err = select_supported_files(files(&["agency", "fares"]), &registry, false).unwrap_err();
        assert_eq!(err.to_string(), "invalid/unsupported file: fares");

        let kept = select_supported_files(files(&["agency", "fares"]), &registry, true).unwrap();
        assert_eq!(kept.len(), 1);

        let err = select_supported_files(files(&["agency", "agency"]), &registry, false).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateFile(_)));
    }

    #[test]
    fn detects_cycles() {
        fn cyclic(_: &Options, _: &[String]) -> DependencyTable {
            let mut table = DependencyTable::new();
            table.insert("agency".into(), vec!["routes".into()]);
            table.insert("routes".into(), vec!["agency".into()]);
            table
        }
        let opts = Options::resolve(&OptionOverrides::default(), &["agency", "routes"]).unwrap();
        let err = resolve_tasks(
            files(&["agency", "routes"]),
            cyclic,
            &opts,
            &default_registry(),
        )
        .unwrap_err();
        match err {
            ConvertError::DependencyCycle(cycle) => {
                assert_eq!(cycle, vec!["agency", "routes", "agency"]);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
