//! Validation scheduling, hot reload and the dispatch loop.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use watchpost_core::loader::{load_validations, VALIDATIONS_DIR};
use watchpost_core::schedule::{Cadence, CadenceIssue};
use watchpost_core::{Catalog, LoadError, Registry, Settings, ValidationRef};

use crate::jobs::{JobTable, JobTag, Recurrence};

/// Failures of loading or reloading.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Loading validations failed.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The validations tree could not be scanned.
    #[error("failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Work carried by a scheduled job.
#[derive(Debug, Clone)]
pub enum Task {
    /// Run this validation.
    Validation(ValidationRef),
    /// Check definition files and reload on change.
    Watcher,
}

/// Timing and threading of the dispatch loop.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Dispatch loop tick.
    pub tick: Duration,
    /// How often watched definition files are checked for changes.
    pub reload_interval: Duration,
    /// Run each fired validation on the blocking pool without waiting for it.
    pub threaded: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            reload_interval: Duration::from_secs(15),
            threaded: false,
        }
    }
}

/// Owns the registry, the job table and the watched-file set.
///
/// Everything here is mutated from the dispatch loop only.
#[derive(Debug)]
pub struct Scheduler {
    directory: PathBuf,
    options: SchedulerOptions,
    registry: Registry,
    catalog: Catalog,
    jobs: JobTable<Task>,
    watched: BTreeMap<PathBuf, SystemTime>,
}

/// Current local wall-clock time.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Scheduler {
    /// Scheduler over `settings.directory`, with no jobs yet.
    pub fn new(settings: &Settings, catalog: Catalog, options: SchedulerOptions) -> Self {
        Self {
            directory: settings.directory.clone(),
            options,
            registry: Registry::new(settings.run_filter()),
            catalog,
            jobs: JobTable::new(),
            watched: BTreeMap::new(),
        }
    }

    /// Validations currently loaded.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Jobs currently scheduled.
    pub fn jobs(&self) -> &JobTable<Task> {
        &self.jobs
    }

    /// Definition files seen by the last scan.
    pub fn watched_files(&self) -> impl Iterator<Item = &Path> {
        self.watched.keys().map(PathBuf::as_path)
    }

    /// Runs the loader against the registry.
    pub fn load(&mut self) -> Result<usize, LoadError> {
        load_validations(&self.directory, &mut self.registry, &self.catalog)
    }

    /// Schedules one job per registered validation with a usable cadence.
    pub fn configure_validations(&mut self, now: NaiveDateTime) -> usize {
        let mut scheduled = 0;
        for (name, entry) in self.registry.entries() {
            if Cadence::has_ignored_at(&entry.schedule) {
                warn!(validation = %name, "schedule has both 'every' and 'at'; ignoring 'at'");
            }
            let cadence = match Cadence::parse(&entry.schedule) {
                Ok(cadence) => cadence,
                Err(issue) => {
                    warn!(validation = %name, %issue, "validation not scheduled");
                    continue;
                }
            };
            let scheduled_job = Recurrence::from_cadence(cadence).and_then(|recurrence| {
                self.jobs
                    .add(
                        JobTag::Validation,
                        recurrence,
                        Task::Validation(entry.reference.clone()),
                        now,
                    )
                    .map(|_| recurrence)
            });
            let Some(recurrence) = scheduled_job else {
                let issue = CadenceIssue::OutOfRange;
                warn!(validation = %name, ?cadence, %issue, "validation not scheduled");
                continue;
            };
            debug!(validation = %name, ?recurrence, "validation scheduled");
            scheduled += 1;
        }
        info!(scheduled, "validations configured");
        scheduled
    }

    fn scan(&self) -> Result<BTreeMap<PathBuf, SystemTime>, SchedulerError> {
        let dir = self.directory.join(VALIDATIONS_DIR);
        let mut found = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(found);
        }
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|source| SchedulerError::Scan {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
                Ok(modified) => {
                    found.insert(path.to_path_buf(), modified);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot read modification time"),
            }
        }
        Ok(found)
    }

    /// Records the current definition files without triggering a reload.
    pub fn seed_watched_files(&mut self) -> Result<(), SchedulerError> {
        for (path, modified) in self.scan()? {
            if !self.watched.contains_key(&path) {
                info!(path = %path.display(), "watching file");
                self.watched.insert(path, modified);
            }
        }
        Ok(())
    }

    /// Reloads everything when a definition file was added, changed or removed.
    pub fn check_if_should_reload(&mut self, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        let current = self.scan()?;
        let mut changed = false;

        for (path, modified) in &current {
            match self.watched.get(path) {
                None => {
                    info!(path = %path.display(), "watching file");
                    changed = true;
                }
                Some(seen) if seen != modified => {
                    info!(path = %path.display(), "file changed");
                    changed = true;
                }
                Some(_) => {}
            }
        }
        for path in self.watched.keys() {
            if !current.contains_key(path) {
                info!(path = %path.display(), "file removed");
                changed = true;
            }
        }
        self.watched = current;

        if changed {
            self.reload_scheduler(now)?;
        }
        Ok(changed)
    }

    /// Drops validation jobs and the registry, then loads and configures again.
    pub fn reload_scheduler(&mut self, now: NaiveDateTime) -> Result<(), SchedulerError> {
        let cleared = self.jobs.clear_tag(JobTag::Validation);
        debug!(cleared, "validation jobs cleared");
        self.registry.clear();
        self.load()?;
        self.configure_validations(now);
        Ok(())
    }

    /// Fires every job due at `now`. Failures are logged and never propagate.
    pub fn run_pending(&mut self, now: NaiveDateTime) {
        for (_tag, task) in self.jobs.pop_due(now) {
            match task {
                Task::Watcher => {
                    if let Err(e) = self.check_if_should_reload(now) {
                        error!(error = %e, "reload failed");
                    }
                }
                Task::Validation(reference) if self.options.threaded => {
                    drop(tokio::task::spawn_blocking(move || run_validation(&reference)));
                }
                Task::Validation(reference) => run_validation(&reference),
            }
        }
    }

    /// Adds the job that checks definition files every `reload_interval`.
    pub fn schedule_watcher(&mut self, now: NaiveDateTime) -> anyhow::Result<()> {
        let reload_every = chrono::Duration::from_std(self.options.reload_interval)?;
        self.jobs
            .add(JobTag::Watcher, Recurrence::Interval(reload_every), Task::Watcher, now)
            .context("reload interval out of range")?;
        Ok(())
    }

    /// Seeds the watched files, schedules the watcher and the validations, then
    /// drives the job table every tick until Ctrl-C.
    ///
    /// Without `threaded`, fired validations run on the loop itself, so a
    /// validation that hangs also holds off shutdown until it returns.
    pub async fn start(mut self) -> anyhow::Result<()> {
        let now = local_now();
        self.seed_watched_files()?;
        self.schedule_watcher(now)?;
        self.configure_validations(now);

        info!(
            directory = %self.directory.display(),
            jobs = self.jobs.len(),
            threaded = self.options.threaded,
            "scheduler starting"
        );

        let mut tick = tokio::time::interval(self.options.tick);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = tick.tick() => self.run_pending(local_now()),
                res = &mut shutdown => {
                    res?;
                    info!("shutdown requested");
                    return Ok(());
                }
            }
        }
    }
}

fn run_validation(reference: &ValidationRef) {
    match catch_unwind(AssertUnwindSafe(|| reference.run())) {
        Ok(Some(response)) => debug!(validation = reference.name(), status = %response.status(), "validation finished"),
        Ok(None) => debug!(validation = reference.name(), "validation filtered"),
        Err(_) => error!(validation = reference.name(), "validation job panicked"),
    }
}
