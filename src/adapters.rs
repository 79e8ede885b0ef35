use std::{path::Path, sync::Arc};

use crate::model;

#[cfg(test)]
pub mod mock;
pub mod s3;

/// Remote bucket operations the core is built on.
pub trait Object: Send + Sync {
    /// Lists at most `max_keys` objects under `prefix`, starting after the
    /// position described by `continuation_token`.
    fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<model::object::ObjectPage, model::error::ObjectError>;

    /// Writes the exact bytes of `key` to `destination`, replacing any existing file.
    fn download_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<(), model::error::ObjectError>;
}

/// Binds static credentials and a region into a client.
pub trait Connector {
    fn bind(
        &self,
        credentials: &model::object::Credentials,
        region: &str,
    ) -> Result<Arc<dyn Object>, model::error::ObjectError>;
}
