use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("missing or invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("invalid credentials: the access key or secret key was rejected")]
    InvalidCredentials,

    #[error("bucket '{0}' does not exist")]
    BucketNotFound(String),

    #[error("access denied to '{0}': check your credentials and permissions")]
    AccessDenied(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("not connected to a bucket")]
    NotConnected,

    #[error("failed to download {key}: {message}")]
    TransferFailed { key: String, message: String },

    #[error("failed to create archive {path}: {message}")]
    Pack { path: String, message: String },

    #[error("a download job is already running on this connection")]
    JobInProgress,
}

impl ObjectError {
    /// Remediation hint for the user, when one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ObjectError::InvalidArgument(_) => {
                Some("access key, secret key, region and bucket are all required")
            }
            ObjectError::InvalidCredentials => {
                Some("double-check the access key id and secret access key")
            }
            ObjectError::BucketNotFound(_) => {
                Some("bucket names are case-sensitive; make sure the bucket is in the given region")
            }
            ObjectError::AccessDenied(_) => {
                Some("the credentials need s3:ListBucket and s3:GetObject on the bucket")
            }
            ObjectError::Backend(_) => {
                Some("check the network connection, the region and the endpoint url")
            }
            ObjectError::NotConnected => Some("connect to a bucket first"),
            ObjectError::JobInProgress => Some("wait for the running download to finish"),
            ObjectError::TransferFailed { .. } | ObjectError::Pack { .. } => None,
        }
    }
}
