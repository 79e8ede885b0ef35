use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{error, info, span, Level};

use crate::{adapters, model, util};

/// Handle to one bucket. Empty until `connect` succeeds.
pub struct ConnectionState {
    bucket: String,
    prefix_filter: Option<String>,
    client: Option<Arc<dyn adapters::Object>>,
    job_active: Arc<AtomicBool>,
}

/// Snapshot of a live connection, cheap to clone into a background job.
#[derive(Clone)]
pub struct Session {
    pub client: Arc<dyn adapters::Object>,
    pub bucket: String,
    pub prefix: String,
}

/// Marks a job as in flight on a connection until released or dropped.
pub struct JobGuard {
    job_active: Arc<AtomicBool>,
}

impl JobGuard {
    /// Clears the in-flight flag now; dropping the guard does the same.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.job_active.store(false, Ordering::SeqCst);
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            bucket: String::new(),
            prefix_filter: None,
            client: None,
            job_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn connect(
        &mut self,
        connector: &dyn adapters::Connector,
        access_key: &str,
        secret_key: &str,
        region: &str,
        bucket: &str,
        prefix_filter: Option<&str>,
    ) -> Result<(), model::error::ObjectError> {
        let span = span!(Level::INFO, "connect", context = "connect");
        let _e = span.enter();
        info!(bucket = bucket, region = region, prefix = ?prefix_filter, "called");

        if self.job_active.load(Ordering::SeqCst) {
            error!(error_message = "job in flight", error_group = "job_in_progress");
            return Err(model::error::ObjectError::JobInProgress);
        }

        self.disconnect();

        let required = [
            ("access key", access_key),
            ("secret key", secret_key),
            ("region", region),
            ("bucket", bucket),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                error!(error_message = field, error_group = "invalid_argument");
                return Err(model::error::ObjectError::InvalidArgument(field));
            }
        }

        let credentials = model::object::Credentials {
            access_key: access_key.trim().to_string(),
            secret_key: secret_key.to_string(),
        };
        let prefix_filter = util::object::normalize_prefix(prefix_filter);

        let client = connector.bind(&credentials, region.trim()).inspect_err(|err| {
            error!(error_message = %err, error_group = "bind");
        })?;

        // probe: one key is enough to surface credential, bucket or permission errors
        let probe = client.list_objects_page(
            bucket.trim(),
            prefix_filter.as_deref().unwrap_or(""),
            None,
            1,
        );
        if let Err(err) = probe {
            error!(error_message = %err, error_group = "probe");
            return Err(err);
        }

        self.bucket = bucket.trim().to_string();
        self.prefix_filter = prefix_filter;
        self.client = Some(client);

        info!(bucket = %self.bucket, "connected");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.bucket.clear();
        self.prefix_filter = None;
        self.client = None;
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some() && !self.bucket.is_empty()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix_filter(&self) -> Option<&str> {
        self.prefix_filter.as_deref()
    }

    pub fn session(&self) -> Result<Session, model::error::ObjectError> {
        match &self.client {
            Some(client) if !self.bucket.is_empty() => Ok(Session {
                client: client.clone(),
                bucket: self.bucket.clone(),
                prefix: self.prefix_filter.clone().unwrap_or_default(),
            }),
            _ => Err(model::error::ObjectError::NotConnected),
        }
    }

    /// Claims the connection for one job; `None` if another job holds it.
    pub fn try_begin_job(&self) -> Option<JobGuard> {
        self.job_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| JobGuard {
                job_active: self.job_active.clone(),
            })
    }

    #[cfg(test)]
    pub fn is_job_active(&self) -> bool {
        self.job_active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockClient, MockConnector};

    fn connector() -> MockConnector {
        MockConnector::new(MockClient::with_sizes(vec![
            ("a.txt", 10),
            ("b/c.txt", 20),
        ]))
    }

    #[test]
    fn test_connect() {
        let connector = connector();
        let mut state = ConnectionState::new();

        assert!(!state.is_connected());

        state
            .connect(&connector, "AKIA", "secret", "us-east-1", "bucket", Some("  "))
            .unwrap();

        assert!(state.is_connected());
        assert_eq!(state.bucket(), "bucket");
        assert_eq!(state.prefix_filter(), None);

        let calls = connector.client.list_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("".to_string(), None, 1)]);
    }

    #[test]
    fn test_connect_probe_uses_prefix() {
        let connector = connector();
        let mut state = ConnectionState::new();

        state
            .connect(&connector, "AKIA", "secret", "us-east-1", "bucket", Some("b/"))
            .unwrap();

        assert_eq!(state.prefix_filter(), Some("b/"));
        let calls = connector.client.list_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("b/".to_string(), None, 1)]);
    }

    #[test]
    fn test_connect_invalid_argument() {
        let cases = vec![
            (("", "secret", "us-east-1", "bucket"), "access key"),
            (("AKIA", "", "us-east-1", "bucket"), "secret key"),
            (("AKIA", "secret", " ", "bucket"), "region"),
            (("AKIA", "secret", "us-east-1", ""), "bucket"),
        ];

        for ((access, secret, region, bucket), expected) in cases {
            let connector = connector();
            let mut state = ConnectionState::new();

            let result = state.connect(&connector, access, secret, region, bucket, None);

            assert!(
                matches!(result, Err(model::error::ObjectError::InvalidArgument(field)) if field == expected),
                "failed for case: {}",
                expected
            );
            assert!(!state.is_connected(), "failed for case: {}", expected);
            assert_eq!(
                connector.binds.load(Ordering::SeqCst),
                0,
                "failed for case: {}",
                expected
            );
        }
    }

    #[test]
    fn test_connect_failure_resets_state() {
        let cases = vec![
            ("InvalidAccessKeyId", "invalid_credentials"),
            ("NoSuchBucket", "bucket_not_found"),
            ("AccessDenied", "access_denied"),
            ("InternalError", "backend"),
        ];

        for (code, expected) in cases {
            let mut state = ConnectionState::new();
            state
                .connect(&connector(), "AKIA", "secret", "us-east-1", "bucket", Some("b/"))
                .unwrap();

            let mut failing = MockClient::with_sizes(vec![]);
            failing.list_error_code = Some(code);
            let failing = MockConnector::new(failing);

            let result = state.connect(&failing, "AKIA", "secret", "us-east-1", "other", None);

            let kind = match result {
                Err(model::error::ObjectError::InvalidCredentials) => "invalid_credentials",
                Err(model::error::ObjectError::BucketNotFound(bucket)) => {
                    assert_eq!(bucket, "other");
                    "bucket_not_found"
                }
                Err(model::error::ObjectError::AccessDenied(_)) => "access_denied",
                Err(model::error::ObjectError::Backend(_)) => "backend",
                _ => "other",
            };

            assert_eq!(kind, expected, "failed for case: {}", code);
            assert!(!state.is_connected(), "failed for case: {}", code);
            assert_eq!(state.bucket(), "", "failed for case: {}", code);
            assert_eq!(state.prefix_filter(), None, "failed for case: {}", code);
        }
    }

    #[test]
    fn test_disconnect() {
        let mut state = ConnectionState::new();
        state
            .connect(&connector(), "AKIA", "secret", "us-east-1", "bucket", Some("b/"))
            .unwrap();

        state.disconnect();

        assert!(!state.is_connected());
        assert_eq!(state.bucket(), "");
        assert_eq!(state.prefix_filter(), None);
        assert!(matches!(
            state.session(),
            Err(model::error::ObjectError::NotConnected)
        ));

        // unconditional, also when already disconnected
        state.disconnect();
        assert!(!state.is_connected());
    }

    #[test]
    fn test_connect_rejected_while_job_active() {
        let mut state = ConnectionState::new();
        state
            .connect(&connector(), "AKIA", "secret", "us-east-1", "bucket", None)
            .unwrap();

        let guard = state.try_begin_job().unwrap();
        assert!(state.try_begin_job().is_none());

        let result = state.connect(&connector(), "AKIA", "secret", "us-east-1", "other", None);
        assert!(matches!(result, Err(model::error::ObjectError::JobInProgress)));
        assert_eq!(state.bucket(), "bucket");

        guard.release();
        assert!(!state.is_job_active());
        assert!(state.try_begin_job().is_some());
    }

    #[test]
    fn test_job_guard_drop_clears_flag() {
        let state = ConnectionState::new();

        {
            let _guard = state.try_begin_job().unwrap();
            assert!(state.is_job_active());
        }

        assert!(!state.is_job_active());
    }
}
