use std::env;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

use crate::{ObjectStore, PutResult, StoreError, StoreResult};

/// S3-compatible bucket settings
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible services (path-style addressing is used)
    pub endpoint_url: Option<String>,
    /// Base of public object URLs. Defaults to the bucket's own address.
    pub public_base_url: Option<String>,
    /// When set, download URLs are presigned GETs valid this long instead of
    /// public object URLs
    pub presign_expiry: Option<Duration>,
}

impl S3Config {
    pub fn new<B, R, K, S>(bucket: B, region: R, access_key_id: K, secret_access_key: S) -> Self
    where
        B: Into<String>,
        R: Into<String>,
        K: Into<String>,
        S: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            endpoint_url: None,
            public_base_url: None,
            presign_expiry: None,
        }
    }

    /// Load from `DOCSTORE_S3_*` environment variables
    pub fn from_env() -> StoreResult<Self> {
        fn get_env(key: &str) -> StoreResult<String> {
            env::var(key).map_err(|_| StoreError::invalid(format!("{} environment variable required", key)))
        }

        let presign_expiry = match env::var("DOCSTORE_S3_PRESIGN_EXPIRY_SECS") {
            Ok(secs) => Some(
                secs.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| {
                        StoreError::invalid(format!("DOCSTORE_S3_PRESIGN_EXPIRY_SECS is not a number: {}", secs))
                    })?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            bucket: get_env("DOCSTORE_S3_BUCKET")?,
            region: get_env("DOCSTORE_S3_REGION")?,
            access_key_id: get_env("DOCSTORE_S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("DOCSTORE_S3_SECRET_ACCESS_KEY")?,
            endpoint_url: env::var("DOCSTORE_S3_ENDPOINT_URL").ok(),
            public_base_url: env::var("DOCSTORE_S3_PUBLIC_BASE_URL").ok(),
            presign_expiry,
        })
    }

    pub fn with_endpoint_url<S: Into<String>>(mut self, url: S) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_public_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Hand out presigned URLs that expire after `expiry` instead of public ones
    pub fn with_presigned_urls(mut self, expiry: Duration) -> Self {
        self.presign_expiry = Some(expiry);
        self
    }

    /// Base URL that public object links start with
    pub fn public_base(&self) -> String {
        match (&self.public_base_url, &self.endpoint_url) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(endpoint)) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            (None, None) => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DownloadLinks {
    Public(String),
    Presigned(Duration),
}

/// Object store backed by an S3-compatible bucket
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    links: DownloadLinks,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config) -> Self {
        let client = Self::create_client(&config).await;
        Self::with_client(client, config)
    }

    /// Connect using `DOCSTORE_S3_*` environment variables
    pub async fn from_env() -> StoreResult<Self> {
        Ok(Self::new(S3Config::from_env()?).await)
    }

    /// Use an already configured client
    pub fn with_client(client: Client, config: S3Config) -> Self {
        let links = match config.presign_expiry {
            Some(expiry) => DownloadLinks::Presigned(expiry),
            None => DownloadLinks::Public(config.public_base()),
        };
        Self {
            client,
            bucket: config.bucket,
            links,
        }
    }

    async fn create_client(config: &S3Config) -> Client {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "doc-store",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.endpoint_url.is_some())
                .build(),
        )
    }

    fn map_aws_error(err: impl std::error::Error + Send + Sync + 'static) -> StoreError {
        StoreError::backend(err)
    }

    async fn ensure_exists(&self, path: &str) -> StoreResult<()> {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|s| s.is_not_found()) {
                    StoreError::not_found(path)
                } else {
                    Self::map_aws_error(e)
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        path: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> StoreResult<PutResult> {
        let size_bytes = bytes.len() as u64;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(AwsByteStream::from(bytes));
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let output = request.send().await.map_err(Self::map_aws_error)?;

        Ok(PutResult {
            etag: output.e_tag().map(|s| s.to_string()),
            size_bytes,
        })
    }

    async fn download_url(&self, path: &str) -> StoreResult<String> {
        self.ensure_exists(path).await?;

        match &self.links {
            DownloadLinks::Public(base) => Ok(format!("{}/{}", base, path)),
            DownloadLinks::Presigned(expiry) => {
                let presigning = PresigningConfig::expires_in(*expiry).map_err(Self::map_aws_error)?;
                let request = self
                    .client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(path)
                    .presigned(presigning)
                    .await
                    .map_err(Self::map_aws_error)?;
                Ok(request.uri().to_string())
            }
        }
    }

    async fn get(&self, path: &str, max_bytes: u64) -> StoreResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                    StoreError::not_found(path)
                } else {
                    Self::map_aws_error(e)
                }
            })?;

        if let Some(length) = output.content_length() {
            let length = length.max(0) as u64;
            if length > max_bytes {
                return Err(StoreError::too_large(path, length, max_bytes));
            }
        }

        let data = output
            .body
            .collect()
            .await
            .map_err(Self::map_aws_error)?
            .into_bytes();

        if data.len() as u64 > max_bytes {
            return Err(StoreError::too_large(path, data.len() as u64, max_bytes));
        }
        Ok(data)
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        // DeleteObject succeeds for missing keys.
        self.ensure_exists(path).await?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }
}
