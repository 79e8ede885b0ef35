use std::{
    collections::HashSet,
    fmt::Display,
    fs::File,
    path::{Path, PathBuf},
};

use tracing::{error, info, span, warn, Level};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{connection, model, util};

pub const PACKING_MESSAGE: &str = "Creating zip archive...";

/// Downloads a set of keys into a scratch directory and bundles them into one
/// deflate-compressed zip.
///
/// Entries are named by their flat name (see `util::object::archive_entry_name`),
/// so `a/x.txt` and `b/x.txt` land on the same staged file and the archive keeps
/// a single `x.txt` holding whichever key was downloaded last.
#[derive(Clone, Debug)]
pub struct ArchiveBuilder {
    pub staging_root: PathBuf,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir(),
        }
    }
}

impl ArchiveBuilder {
    pub fn stage_and_pack(
        &self,
        session: &connection::Session,
        keys: &[String],
        archive_path: &Path,
        on_progress: &mut dyn FnMut(String),
    ) -> Result<(), model::error::ObjectError> {
        let span = span!(Level::INFO, "stage_and_pack", context = "stage_and_pack");
        let _e = span.enter();
        info!(bucket = %session.bucket, count = keys.len(), archive = %archive_path.display(), "called");

        let staging = tempfile::Builder::new()
            .prefix("bucketpull-staging-")
            .tempdir_in(&self.staging_root)
            .map_err(|err| pack_error(archive_path, format!("failed to create staging directory: {}", err)))?;

        let res = stage(session, keys, staging.path(), on_progress).and_then(|entries| {
            on_progress(PACKING_MESSAGE.to_string());
            pack(&entries, archive_path)
        });

        let staging_path = staging.path().to_path_buf();
        if let Err(err) = staging.close() {
            warn!(error_message = %err, staging = %staging_path.display(), "failed to remove staging directory");
        }

        match &res {
            Err(err) => error!(error_message = %err, error_group = "stage_and_pack"),
            Ok(_) => info!(archive = %archive_path.display(), "packed"),
        }

        res
    }
}

fn stage(
    session: &connection::Session,
    keys: &[String],
    staging: &Path,
    on_progress: &mut dyn FnMut(String),
) -> Result<Vec<model::object::StagingEntry>, model::error::ObjectError> {
    let mut entries: Vec<model::object::StagingEntry> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, key) in keys.iter().enumerate() {
        let name = util::object::archive_entry_name(key);
        on_progress(util::object::progress_message(i, keys.len(), &name));

        let temporary_path = staging.join(&name);
        session
            .client
            .download_object(&session.bucket, key, &temporary_path)?;

        // a colliding name reuses the staged file the later download overwrote
        if seen.insert(name.clone()) {
            entries.push(model::object::StagingEntry {
                temporary_path,
                archive_entry_name: name,
            });
        } else {
            warn!(key = %key, entry = %name, "archive entry name collision, keeping latest");
        }
    }

    Ok(entries)
}

fn pack(
    entries: &[model::object::StagingEntry],
    archive_path: &Path,
) -> Result<(), model::error::ObjectError> {
    let parent = match archive_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|err| pack_error(archive_path, err))?;

    // removed on drop unless persisted, so a failure never leaves a partial archive
    let part = tempfile::Builder::new()
        .prefix(".bucketpull-")
        .suffix(".zip.part")
        .tempfile_in(parent)
        .map_err(|err| pack_error(archive_path, err))?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(part.as_file());

    for entry in entries {
        let size = std::fs::metadata(&entry.temporary_path)
            .map_err(|err| {
                pack_error(
                    archive_path,
                    format!("failed to stat {}: {}", entry.temporary_path.display(), err),
                )
            })?
            .len();

        // entries past the 32-bit limit need zip64 headers
        zip.start_file(
            entry.archive_entry_name.clone(),
            options.large_file(size >= u32::MAX as u64),
        )
        .map_err(|err| pack_error(archive_path, err))?;

        let mut staged = File::open(&entry.temporary_path).map_err(|err| {
            pack_error(
                archive_path,
                format!("failed to open {}: {}", entry.temporary_path.display(), err),
            )
        })?;
        std::io::copy(&mut staged, &mut zip).map_err(|err| pack_error(archive_path, err))?;
    }

    zip.finish().map_err(|err| pack_error(archive_path, err))?;

    part.persist(archive_path)
        .map_err(|err| pack_error(archive_path, err.error))?;

    Ok(())
}

fn pack_error(archive_path: &Path, err: impl Display) -> model::error::ObjectError {
    model::error::ObjectError::Pack {
        path: archive_path.display().to_string(),
        message: err.to_string(),
    }
}
