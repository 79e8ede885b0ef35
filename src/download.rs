use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
};

use tracing::{error, info, span, Level};

use crate::{archive, connection, model, util};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs download jobs off the caller's thread.
pub trait Scheduler {
    fn schedule(&self, task: Task);
}

/// One named OS thread per job.
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Task) {
        let slot = Arc::new(Mutex::new(Some(task)));
        let thread_slot = slot.clone();

        let spawned = thread::Builder::new()
            .name("download-job".to_string())
            .spawn(move || {
                if let Some(task) = take_task(&thread_slot) {
                    task();
                }
            });

        // the job must still reach a terminal callback
        if let Err(err) = spawned {
            error!(error_message = %err, error_group = "spawn");
            if let Some(task) = take_task(&slot) {
                task();
            }
        }
    }
}

fn take_task(slot: &Mutex<Option<Task>>) -> Option<Task> {
    slot.lock().ok().and_then(|mut task| task.take())
}

/// Progress, completion and error continuations for one job. Exactly one of
/// `on_complete` and `on_error` fires, after every `on_progress` call.
pub struct JobCallbacks {
    pub on_progress: Box<dyn FnMut(String) + Send>,
    pub on_complete: Box<dyn FnOnce() + Send>,
    pub on_error: Box<dyn FnOnce(model::error::ObjectError) + Send>,
}

pub struct Orchestrator {
    scheduler: Box<dyn Scheduler>,
    archive: archive::ArchiveBuilder,
}

impl Orchestrator {
    pub fn new(scheduler: Box<dyn Scheduler>, archive: archive::ArchiveBuilder) -> Self {
        Self { scheduler, archive }
    }

    /// Schedules `job` and returns without waiting for it.
    ///
    /// A missing connection or a job already in flight on `state` is reported
    /// through `on_error` before returning, and nothing is scheduled.
    pub fn run_job(
        &self,
        state: &connection::ConnectionState,
        job: model::object::DownloadJob,
        callbacks: JobCallbacks,
    ) {
        let span = span!(Level::INFO, "run_job", context = "run_job");
        let _e = span.enter();
        info!(keys = job.keys.len(), mode = ?job.mode, destination = %job.destination.display(), "called");

        let session = match state.session() {
            Err(err) => {
                error!(error_message = %err, error_group = "not_connected");
                (callbacks.on_error)(err);
                return;
            }
            Ok(session) => session,
        };

        let guard = match state.try_begin_job() {
            None => {
                let err = model::error::ObjectError::JobInProgress;
                error!(error_message = %err, error_group = "job_in_progress");
                (callbacks.on_error)(err);
                return;
            }
            Some(guard) => guard,
        };

        let archive = self.archive.clone();
        self.scheduler.schedule(Box::new(move || {
            let JobCallbacks {
                mut on_progress,
                on_complete,
                on_error,
            } = callbacks;

            let span = span!(Level::INFO, "download_job", context = "download_job");
            let _e = span.enter();

            let res = match job.mode {
                model::object::DownloadMode::Individual => {
                    download_individually(&session, &job.keys, &job.destination, &mut *on_progress)
                }
                model::object::DownloadMode::Archive => archive.stage_and_pack(
                    &session,
                    &job.keys,
                    &job.destination,
                    &mut *on_progress,
                ),
            };

            // released first so a terminal callback may start the next job
            guard.release();

            match res {
                Err(err) => {
                    error!(error_message = %err, error_group = "download_job");
                    on_error(err);
                }
                Ok(()) => {
                    info!(keys = job.keys.len(), "completed");
                    on_complete();
                }
            }
        }));
    }
}

/// Fetches keys one by one into `destination`, stopping at the first failure.
/// Files written before the failure are kept.
fn download_individually(
    session: &connection::Session,
    keys: &[String],
    destination: &Path,
    on_progress: &mut dyn FnMut(String),
) -> Result<(), model::error::ObjectError> {
    for (i, key) in keys.iter().enumerate() {
        let name = util::object::archive_entry_name(key);
        on_progress(util::object::progress_message(i, keys.len(), &name));

        let local_path: PathBuf = destination.join(&name);
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                model::error::ObjectError::TransferFailed {
                    key: key.to_string(),
                    message: format!("failed to create {}: {}", parent.display(), err),
                }
            })?;
        }

        session
            .client
            .download_object(&session.bucket, key, &local_path)?;
        info!(key = %key, path = %local_path.display(), "downloaded");
    }

    Ok(())
}
