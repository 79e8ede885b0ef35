use std::{fmt, path::PathBuf, time::SystemTime};

/// Static, long-lived access key pair.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"** redacted **")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    pub key: String,
    pub size: u64,
    pub modified_time: SystemTime,
}

/// One page of a listing plus the cursor for the next one.
#[derive(Clone, Debug, Default)]
pub struct ObjectPage {
    pub records: Vec<ObjectRecord>,
    pub next_continuation_token: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadMode {
    Individual,
    Archive,
}

/// Immutable description of one download action. `destination` is a folder for
/// `Individual` and the archive file path for `Archive`.
#[derive(Clone, Debug)]
pub struct DownloadJob {
    pub keys: Vec<String>,
    pub destination: PathBuf,
    pub mode: DownloadMode,
}

#[derive(Clone, Debug)]
pub struct StagingEntry {
    pub temporary_path: PathBuf,
    pub archive_entry_name: String,
}
