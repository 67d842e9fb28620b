//! S3-compatible storage backend
//!
//! Provides async S3 storage with:
//! - Ranged reads
//! - Multipart uploads for large objects
//! - Server-side copy
//! - Exponential backoff retry logic
//! - Path-style addressing for MinIO
//!
//! The endpoint is `scheme://bucket.host[:port]`: the first host label is
//! the bucket and the rest is the service address. Listing markers are
//! passed as `StartAfter`, so a marker key itself is not returned.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Credentials, Region},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use chrono::{DateTime, Utc};
use sync_core::{is_dir_key, Error, Object, Result, StorageEndpoint};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use crate::backend::{ObjectReader, ObjectStorage};
use crate::registry::StorageBuilder;

/// Threshold for switching to multipart upload (5 MB)
const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Part size for multipart uploads (5 MB minimum required by S3)
const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 100;

const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for [`S3Storage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Service endpoint URL without the bucket
    pub endpoint_url: String,
    /// Region
    pub region: String,
    /// Static credentials; `None` falls back to the default chain
    pub credentials: Option<(String, String)>,
    /// Force path-style addressing (required for MinIO)
    pub force_path_style: bool,
}

impl S3Config {
    /// Derive settings from a factory endpoint
    pub fn from_endpoint(endpoint: &StorageEndpoint, force_path_style: bool) -> Result<Self> {
        let (scheme, address) = endpoint
            .endpoint
            .split_once("://")
            .unwrap_or(("https", endpoint.endpoint.as_str()));
        let (bucket, service) = address.split_once('.').ok_or_else(|| Error::InvalidConfig {
            message: format!("no bucket in endpoint {}", endpoint.endpoint),
        })?;

        let credentials = if endpoint.access_key.is_empty() {
            None
        } else {
            Some((endpoint.access_key.clone(), endpoint.secret_key.clone()))
        };

        Ok(Self {
            bucket: bucket.to_string(),
            endpoint_url: format!("{}://{}", scheme, service),
            region: region_of(service).unwrap_or(DEFAULT_REGION).to_string(),
            credentials,
            force_path_style,
        })
    }
}

/// `s3.us-west-2.amazonaws.com` and `s3-us-west-2.amazonaws.com` carry a region
fn region_of(service: &str) -> Option<&str> {
    let host = service.split(':').next()?;
    let rest = host.strip_suffix(".amazonaws.com")?;
    let region = rest
        .strip_prefix("s3.")
        .or_else(|| rest.strip_prefix("s3-"))?;
    if region.is_empty() || region.contains('.') {
        None
    } else {
        Some(region)
    }
}

/// S3-compatible storage backend
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    endpoint_url: String,
}

impl S3Storage {
    /// Create a client for the given settings
    pub async fn with_config(config: S3Config) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region));
        if let Some((access_key, secret_key)) = config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "sync-endpoint",
            ));
        }
        let aws_config = loader.load().await;

        let s3_config = S3ConfigBuilder::from(&aws_config)
            .endpoint_url(&config.endpoint_url)
            .force_path_style(config.force_path_style)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket,
            endpoint_url: config.endpoint_url,
        }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    let delay = Duration::from_millis(BASE_RETRY_DELAY_MS * (1 << attempt));
                    warn!(
                        %operation,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Storage {
            message: format!("{} failed after {} retries", operation, MAX_RETRIES),
        }))
    }

    /// Perform multipart upload for large objects
    async fn multipart_upload(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let create_result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to initiate multipart upload: {}", e),
            })?;

        let upload_id = create_result.upload_id().ok_or_else(|| Error::Storage {
            message: "No upload_id returned".to_string(),
        })?;

        debug!(key, upload_id, size = data.len(), "Started multipart upload");

        let mut completed_parts = Vec::new();
        for (index, chunk) in data.chunks(MULTIPART_PART_SIZE).enumerate() {
            let part_number = index as i32 + 1;
            let part = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| {
                    self.abort_multipart_upload(key, upload_id);
                    Error::Storage {
                        message: format!("Failed to upload part {}: {}", part_number, e),
                    }
                })?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(part.e_tag().map(String::from))
                    .build(),
            );
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to complete multipart upload: {}", e),
            })?;

        debug!(key, "Completed multipart upload");
        Ok(())
    }

    /// Abort a multipart upload (best effort, for cleanup)
    fn abort_multipart_upload(&self, key: &str, upload_id: &str) {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        let upload_id = upload_id.to_string();

        tokio::spawn(async move {
            let _ = client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await;
        });
    }
}

impl fmt::Display for S3Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/", self.bucket)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn get(&self, key: &str, offset: u64, limit: i64) -> Result<ObjectReader> {
        let range = match (offset, limit) {
            (0, l) if l <= 0 => None,
            (o, l) if l <= 0 => Some(format!("bytes={}-", o)),
            (o, l) => Some(format!("bytes={}-{}", o, o + l as u64 - 1)),
        };

        let output = self
            .with_retry("get", || async {
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .set_range(range.clone())
                    .send()
                    .await
                    .map_err(|e| {
                        if e.as_service_error().map_or(false, |se| se.is_no_such_key()) {
                            Error::not_found(key)
                        } else {
                            Error::Storage {
                                message: format!("S3 get_object failed: {}", e),
                            }
                        }
                    })
            })
            .await?;

        Ok(Box::new(Box::pin(output.body.into_async_read())))
    }

    #[instrument(skip(self, data), fields(backend = "s3", bucket = %self.bucket))]
    async fn put(&self, key: &str, mut data: ObjectReader) -> Result<()> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        debug!(key, size = buf.len(), "Writing to S3");

        if buf.len() > MULTIPART_THRESHOLD {
            return self.multipart_upload(key, buf).await;
        }

        self.with_retry("put", || {
            let body = ByteStream::from(buf.clone());
            async move {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| Error::Storage {
                        message: format!("S3 put_object failed: {}", e),
                    })?;
                Ok(())
            }
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        self.exists(src).await?;

        self.with_retry("copy", || async {
            self.client
                .copy_object()
                .bucket(&self.bucket)
                .key(dst)
                .copy_source(format!("{}/{}", self.bucket, urlencoding::encode(src)))
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("S3 copy_object failed: {}", e),
                })?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn exists(&self, key: &str) -> Result<()> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().map_or(false, |se| se.is_not_found()) => {
                Err(Error::not_found(key))
            }
            Err(e) => Err(Error::Storage {
                message: format!("S3 head_object failed: {}", e),
            }),
        }
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.exists(key).await?;

        self.with_retry("delete", || async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("S3 delete_object failed: {}", e),
                })?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn list(&self, prefix: &str, marker: &str, limit: usize) -> Result<Vec<Object>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut start_after = (!marker.is_empty()).then(|| marker.to_string());

        // Directory placeholders are dropped after the fact, so keep asking
        // until the page holds an object or the bucket runs out.
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .max_keys((limit - objects.len()).min(1000) as i32);
            if let Some(after) = &start_after {
                request = request.start_after(after);
            }

            let response = request.send().await.map_err(|e| Error::Storage {
                message: format!("S3 list_objects failed: {}", e),
            })?;

            let raw = response.contents().iter().filter_map(|object| {
                let mtime = object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                    .unwrap_or_default();
                let size = object.size().unwrap_or(0).max(0) as u64;
                Some(Object::new(object.key()?, size, mtime))
            });
            let last_raw = fill_page(&mut objects, raw, limit);

            match last_raw {
                Some(key) if response.is_truncated().unwrap_or(false) && objects.len() < limit => {
                    start_after = Some(key);
                }
                _ => break,
            }
        }

        debug!(count = objects.len(), "Listed S3 objects");
        Ok(objects)
    }

    async fn chtimes(&self, _key: &str, _mtime: DateTime<Utc>) -> Result<()> {
        Err(Error::Unsupported {
            backend: self.to_string(),
            operation: "chtimes".to_string(),
        })
    }
}

/// Builds [`S3Storage`] from a factory endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Builder {
    force_path_style: bool,
}

impl S3Builder {
    /// Builder for MinIO and other path-style services
    pub fn path_style() -> Self {
        Self {
            force_path_style: true,
        }
    }
}

#[async_trait]
impl StorageBuilder for S3Builder {
    async fn build(&self, endpoint: &StorageEndpoint) -> Result<std::sync::Arc<dyn ObjectStorage>> {
        let config = S3Config::from_endpoint(endpoint, self.force_path_style)?;
        debug!(bucket = %config.bucket, endpoint_url = %config.endpoint_url, "Connecting to S3");
        Ok(std::sync::Arc::new(S3Storage::with_config(config).await))
    }
}

/// Append the non-directory entries of one raw listing page to `objects`
///
/// Returns the last raw key consumed, directories included, which is where
/// the next request has to resume.
fn fill_page(
    objects: &mut Vec<Object>,
    raw: impl IntoIterator<Item = Object>,
    limit: usize,
) -> Option<String> {
    let mut last = None;
    for object in raw {
        if objects.len() >= limit {
            break;
        }
        last = Some(object.key.clone());
        if !is_dir_key(&object.key) {
            objects.push(object);
        }
    }
    last
}
