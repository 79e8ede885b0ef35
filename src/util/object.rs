use std::time::SystemTime;

use time::{macros::format_description, OffsetDateTime};

use crate::model::error::ObjectError;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Flat local name for a key: its final path segment, or the whole key with
/// every `/` replaced by `_` when that segment is empty, `.` or `..`.
///
/// The result is never a path component that points back at a directory.
pub fn archive_entry_name(key: &str) -> String {
    match key.rsplit('/').next() {
        Some(name) if !is_dir_component(name) => name.to_string(),
        _ => {
            let flat = key.replace('/', "_");
            if is_dir_component(&flat) {
                flat.replace('.', "_")
            } else {
                flat
            }
        }
    }
}

fn is_dir_component(name: &str) -> bool {
    matches!(name, "" | "." | "..")
}

pub fn progress_message(index: usize, total: usize, name: &str) -> String {
    format!("Downloading {}/{}: {}", index + 1, total, name)
}

/// Splits `s3://bucket/prefix` (or a bare bucket name) into bucket and prefix.
pub fn parse_bucket_uri(bucket_uri: &str) -> Result<(String, Option<String>), ObjectError> {
    let rest = match bucket_uri.split_once("://") {
        Some(("s3", rest)) => rest,
        Some(_) => {
            return Err(ObjectError::InvalidArgument("bucket"));
        }
        None => bucket_uri,
    };

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, normalize_prefix(Some(prefix))),
        None => (rest, None),
    };

    if bucket.trim().is_empty() {
        return Err(ObjectError::InvalidArgument("bucket"));
    }

    Ok((bucket.trim().to_string(), prefix))
}

/// Blank prefixes mean "whole bucket".
pub fn normalize_prefix(prefix: Option<&str>) -> Option<String> {
    prefix
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

pub fn format_file_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", value, SIZE_UNITS[unit])
}

/// `YYYY-MM-DD HH:MM` in UTC.
pub fn format_modified_time(modified_time: SystemTime) -> String {
    OffsetDateTime::from(modified_time)
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default()
}
