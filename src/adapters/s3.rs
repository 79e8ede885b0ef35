use std::{
    path::Path,
    pin::Pin,
    sync::Arc,
    time::{Duration, SystemTime},
};

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tokio::{
    io::{AsyncRead, AsyncWriteExt},
    runtime::Handle,
};

use crate::{adapters, model, util};

const CREDENTIALS_PROVIDER: &str = "bucketpull-static";

/// Builds S3 clients from static credentials.
pub struct S3Connector {
    pub handle: Handle,
    pub endpoint_url: Option<String>,
}

pub struct S3Client {
    client: aws_sdk_s3::Client,
    handle: Handle,
}

impl adapters::Connector for S3Connector {
    fn bind(
        &self,
        credentials: &model::object::Credentials,
        region: &str,
    ) -> Result<Arc<dyn adapters::Object>, model::error::ObjectError> {
        let provider = aws_sdk_s3::config::Credentials::new(
            &credentials.access_key,
            &credentials.secret_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .credentials_provider(provider);

        if let Some(url) = &self.endpoint_url {
            loader = loader.endpoint_url(url);
        }

        let sdk_config = util::poll::poll_until_ready(&self.handle, loader.load());

        // custom endpoints are S3-compatible stores that rarely support virtual hosts
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.endpoint_url.is_some())
            .build();

        Ok(Arc::new(S3Client {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            handle: self.handle.clone(),
        }))
    }
}

impl adapters::Object for S3Client {
    fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<model::object::ObjectPage, model::error::ObjectError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys);

        if !prefix.is_empty() {
            req = req.prefix(prefix);
        }

        if let Some(tok) = continuation_token {
            req = req.continuation_token(tok);
        }

        let lo = util::poll::poll_until_ready(&self.handle, req.send())
            .map_err(|err| classify(err.code(), describe(&err), bucket))?;

        let records = lo
            .contents()
            .iter()
            .filter_map(|o| {
                let key = o.key()?.to_string();
                let modified_time = o
                    .last_modified()
                    .map(|dt| {
                        SystemTime::UNIX_EPOCH
                            + Duration::new(dt.secs().max(0) as u64, dt.subsec_nanos())
                    })
                    .unwrap_or(SystemTime::UNIX_EPOCH);

                Some(model::object::ObjectRecord {
                    key,
                    size: o.size().unwrap_or(0).max(0) as u64,
                    modified_time,
                })
            })
            .collect();

        Ok(model::object::ObjectPage {
            records,
            next_continuation_token: lo.next_continuation_token().map(|tok| tok.to_string()),
        })
    }

    fn download_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<(), model::error::ObjectError> {
        let req = self.client.get_object().bucket(bucket).key(key);

        let o = util::poll::poll_until_ready(&self.handle, req.send()).map_err(|err| {
            model::error::ObjectError::TransferFailed {
                key: key.to_string(),
                message: describe(&err),
            }
        })?;

        util::poll::poll_until_ready(
            &self.handle,
            save_body(o.body.into_async_read(), destination),
        )
        .map(|_| ())
        .map_err(|message| model::error::ObjectError::TransferFailed {
            key: key.to_string(),
            message,
        })
    }
}

/// Streams `body` into `destination`. A body that fails partway leaves no file behind.
pub async fn save_body<R>(body: R, destination: &Path) -> Result<u64, String>
where
    R: AsyncRead,
{
    let body = std::pin::pin!(body);

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|err| format!("failed to create {}: {}", destination.display(), err))?;

    let res = copy_body(body, &mut file, destination).await;
    if res.is_err() {
        drop(file);
        let _ = tokio::fs::remove_file(destination).await;
    }

    res
}

async fn copy_body<R>(
    mut body: Pin<&mut R>,
    file: &mut tokio::fs::File,
    destination: &Path,
) -> Result<u64, String>
where
    R: AsyncRead,
{
    let written = tokio::io::copy(&mut body, file)
        .await
        .map_err(|err| format!("failed to stream body into {}: {}", destination.display(), err))?;

    file.flush()
        .await
        .map_err(|err| format!("failed to flush {}: {}", destination.display(), err))?;

    Ok(written)
}

fn describe<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        _ => DisplayErrorContext(err).to_string(),
    }
}

/// Maps an S3 error code onto the connection-level error kinds.
pub fn classify(code: Option<&str>, message: String, bucket: &str) -> model::error::ObjectError {
    match code {
        Some("InvalidAccessKeyId")
        | Some("SignatureDoesNotMatch")
        | Some("InvalidToken")
        | Some("ExpiredToken")
        | Some("InvalidClientTokenId") => model::error::ObjectError::InvalidCredentials,
        Some("NoSuchBucket") => model::error::ObjectError::BucketNotFound(bucket.to_string()),
        Some("AccessDenied") | Some("AllAccessDisabled") => {
            model::error::ObjectError::AccessDenied(bucket.to_string())
        }
        _ => model::error::ObjectError::Backend(message),
    }
}
