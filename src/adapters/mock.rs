use std::{
    collections::HashSet,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};

use crate::{adapters, model};

/// In-memory bucket. Objects are served in insertion order, which is
/// deliberately not key order.
pub struct MockClient {
    pub objects: Vec<(String, Vec<u8>)>,
    pub page_size: usize,
    pub failing_keys: HashSet<String>,
    pub list_error_code: Option<&'static str>,
    pub list_calls: Mutex<Vec<(String, Option<String>, i32)>>,
    pub downloads: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new(objects: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            objects: objects
                .into_iter()
                .map(|(key, body)| (key.to_string(), body))
                .collect(),
            page_size: 1000,
            failing_keys: HashSet::new(),
            list_error_code: None,
            list_calls: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sizes(objects: Vec<(&str, usize)>) -> Self {
        Self::new(
            objects
                .into_iter()
                .map(|(key, size)| (key, body_for(key, size)))
                .collect(),
        )
    }

    pub fn body(&self, key: &str) -> Option<&Vec<u8>> {
        self.objects
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, body)| body)
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.lock().unwrap().len()
    }

    pub fn downloaded_keys(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

/// Deterministic, key-specific content of the given length.
pub fn body_for(key: &str, size: usize) -> Vec<u8> {
    key.bytes().cycle().take(size).collect()
}

impl adapters::Object for MockClient {
    fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<model::object::ObjectPage, model::error::ObjectError> {
        self.list_calls
            .lock()
            .unwrap()
            .push((prefix.to_string(), continuation_token.clone(), max_keys));

        if let Some(code) = self.list_error_code {
            return Err(adapters::s3::classify(
                Some(code),
                format!("mock failure: {}", code),
                bucket,
            ));
        }

        let start = match continuation_token {
            Some(tok) => tok.parse::<usize>().map_err(|_| {
                model::error::ObjectError::Backend(format!("bad continuation token: {}", tok))
            })?,
            None => 0,
        };

        let matching: Vec<&(String, Vec<u8>)> = self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect();

        let limit = self.page_size.min(max_keys.max(1) as usize);
        let end = (start + limit).min(matching.len());

        let records = matching[start.min(end)..end]
            .iter()
            .map(|(key, body)| model::object::ObjectRecord {
                key: key.clone(),
                size: body.len() as u64,
                modified_time: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            })
            .collect();

        Ok(model::object::ObjectPage {
            records,
            next_continuation_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    fn download_object(
        &self,
        _bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<(), model::error::ObjectError> {
        self.downloads.lock().unwrap().push(key.to_string());

        if self.failing_keys.contains(key) {
            return Err(model::error::ObjectError::TransferFailed {
                key: key.to_string(),
                message: "NoSuchKey: The specified key does not exist.".to_string(),
            });
        }

        let body = self
            .body(key)
            .ok_or_else(|| model::error::ObjectError::TransferFailed {
                key: key.to_string(),
                message: "NoSuchKey: The specified key does not exist.".to_string(),
            })?;

        std::fs::write(destination, body).map_err(|err| {
            model::error::ObjectError::TransferFailed {
                key: key.to_string(),
                message: err.to_string(),
            }
        })
    }
}

pub struct MockConnector {
    pub client: Arc<MockClient>,
    pub binds: AtomicUsize,
}

impl MockConnector {
    pub fn new(client: MockClient) -> Self {
        Self {
            client: Arc::new(client),
            binds: AtomicUsize::new(0),
        }
    }
}

impl adapters::Connector for MockConnector {
    fn bind(
        &self,
        _credentials: &model::object::Credentials,
        _region: &str,
    ) -> Result<Arc<dyn adapters::Object>, model::error::ObjectError> {
        self.binds.fetch_add(1, Ordering::SeqCst);

        let client: Arc<dyn adapters::Object> = self.client.clone();
        Ok(client)
    }
}
