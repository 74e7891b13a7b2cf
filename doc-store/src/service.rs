use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use tracing::{debug, error, info, instrument, warn};

use crate::imaging::{self, JPEG_CONTENT_TYPE};
use crate::{
    DeleteTarget, Document, DocumentDatabase, DocumentKey, DocumentStoreConfig,
    DocumentStoreError, DocumentStoreResult, ObjectStore,
};

/// Uploads images with a metadata record, and reads or removes both by key.
///
/// The blob and the record are two independent writes linked only by the
/// shared [`DocumentKey`]. A failure between them leaves one without the
/// other; [`StoreReceipt`] and [`RemovalOutcome`] report which half made it.
#[derive(Clone)]
pub struct DocumentStore {
    objects: Arc<dyn ObjectStore>,
    database: Arc<dyn DocumentDatabase>,
    config: DocumentStoreConfig,
}

impl DocumentStore {
    /// Create a document store over the given backends
    pub fn new<O, D>(objects: O, database: D, config: DocumentStoreConfig) -> Self
    where
        O: ObjectStore + 'static,
        D: DocumentDatabase + 'static,
    {
        Self {
            objects: Arc::new(objects),
            database: Arc::new(database),
            config,
        }
    }

    /// Create from backends that are already shared elsewhere
    pub fn from_shared(
        objects: Arc<dyn ObjectStore>,
        database: Arc<dyn DocumentDatabase>,
        config: DocumentStoreConfig,
    ) -> Self {
        Self {
            objects,
            database,
            config,
        }
    }

    /// Upload an image and record it, keyed by the current time
    pub async fn store(&self, image: &DynamicImage) -> DocumentStoreResult<StoreReceipt> {
        self.store_at(image, Utc::now()).await
    }

    /// Upload an image and record it, keyed by `created_at`.
    ///
    /// Succeeds once the blob is uploaded and its URL resolved. The record
    /// write comes last; if it fails the receipt carries the error.
    #[instrument(skip(self, image), fields(key = %DocumentKey::from_datetime(&created_at)))]
    pub async fn store_at(
        &self,
        image: &DynamicImage,
        created_at: DateTime<Utc>,
    ) -> DocumentStoreResult<StoreReceipt> {
        let key = DocumentKey::from_datetime(&created_at);

        let data = imaging::encode_jpeg(image, self.config.jpeg_quality)
            .map_err(|source| DocumentStoreError::EncodingFailed { source })?;

        let blob_path = self.config.paths.blob_path(key);
        debug!("Uploading {} bytes to {}", data.len(), blob_path);

        let put = self
            .objects
            .put(&blob_path, Some(JPEG_CONTENT_TYPE), Bytes::from(data))
            .await
            .map_err(|source| {
                warn!("Image upload to {} failed: {}", blob_path, source);
                DocumentStoreError::UploadFailed { source }
            })?;

        let url = self
            .objects
            .download_url(&blob_path)
            .await
            .map_err(|source| {
                warn!("Download URL for {} unavailable: {}", blob_path, source);
                DocumentStoreError::UrlFetchFailed { source }
            })?;

        info!("Uploaded document image {} ({} bytes)", blob_path, put.size_bytes);

        let document = Document::new(&created_at, url);
        let record_error = match self.save_to_database(&document, key).await {
            Ok(()) => None,
            Err(e) => {
                error!("Document {} uploaded but its record was not saved: {}", key, e);
                Some(e)
            }
        };

        Ok(StoreReceipt {
            document,
            record_error,
        })
    }

    /// Fetch and decode the image stored at `<name>.<extension>`
    #[instrument(skip(self))]
    pub async fn download_stored_document_image(&self, name: &str) -> DocumentStoreResult<DynamicImage> {
        let blob_path = self.config.paths.named_blob_path(name);

        let bytes = self
            .objects
            .get(&blob_path, self.config.max_download_bytes)
            .await
            .map_err(|source| {
                warn!("Download of {} failed: {}", blob_path, source);
                DocumentStoreError::DownloadFailed { source }
            })?;

        imaging::decode(&bytes).map_err(|source| {
            warn!("Downloaded {} is not a readable image: {}", blob_path, source);
            DocumentStoreError::DecodeFailed { source }
        })
    }

    /// Fetch and decode the image uploaded under `key`
    pub async fn download_document_image(
        &self,
        key: impl Into<DocumentKey>,
    ) -> DocumentStoreResult<DynamicImage> {
        let name = self.config.paths.image_name(key.into());
        self.download_stored_document_image(&name).await
    }

    /// Delete the image for `key`, then its record.
    ///
    /// The record is only touched once the blob is gone. Nothing is rolled
    /// back if the second step fails.
    #[instrument(skip_all)]
    pub async fn remove_document_image(&self, key: impl Into<DocumentKey>) -> RemovalOutcome {
        let key = key.into();
        let blob_path = self.config.paths.blob_path(key);

        if let Err(source) = self.objects.delete(&blob_path).await {
            warn!("Document image {} deleted with error: {}", blob_path, source);
            return RemovalOutcome {
                blob_deleted: false,
                record_deleted: false,
                error: Some(DocumentStoreError::DeleteFailed {
                    target: DeleteTarget::Blob,
                    source,
                }),
            };
        }
        info!("Document image {} deleted successfully", blob_path);

        match self.remove_document_from_database(key).await {
            Ok(()) => RemovalOutcome {
                blob_deleted: true,
                record_deleted: true,
                error: None,
            },
            Err(e) => RemovalOutcome {
                blob_deleted: true,
                record_deleted: false,
                error: Some(e),
            },
        }
    }

    /// Write (or overwrite) the record for `key`
    pub async fn save_to_database(
        &self,
        document: &Document,
        key: impl Into<DocumentKey>,
    ) -> DocumentStoreResult<()> {
        let record_path = self.config.paths.record_path(key.into());
        let record = serde_json::to_value(document).map_err(|e| DocumentStoreError::SaveFailed {
            source: e.into(),
        })?;

        self.database
            .set(&record_path, record)
            .await
            .map_err(|source| DocumentStoreError::SaveFailed { source })?;

        info!("Saved document record {}", record_path);
        Ok(())
    }

    /// Delete the record for `key`
    pub async fn remove_document_from_database(
        &self,
        key: impl Into<DocumentKey>,
    ) -> DocumentStoreResult<()> {
        let record_path = self.config.paths.record_path(key.into());

        match self.database.delete(&record_path).await {
            Ok(()) => {
                info!("Document record {} deleted successfully", record_path);
                Ok(())
            }
            Err(source) => {
                warn!("Document record {} deleted with error: {}", record_path, source);
                Err(DocumentStoreError::DeleteFailed {
                    target: DeleteTarget::Record,
                    source,
                })
            }
        }
    }

    /// Read the record for `key`, if there is one
    pub async fn get_document(&self, key: impl Into<DocumentKey>) -> DocumentStoreResult<Option<Document>> {
        let record_path = self.config.paths.record_path(key.into());

        let snapshot = self
            .database
            .get(&record_path)
            .await
            .map_err(|source| {
                warn!("Reading {} failed: {}", record_path, source);
                DocumentStoreError::ReadFailed { source }
            })?;

        if !snapshot.exists() {
            return Ok(None);
        }
        Ok(Document::from_snapshot(&snapshot))
    }

    /// Every record under the records folder, in key order
    #[instrument(skip(self))]
    pub async fn get_all_documents_from_database(&self) -> DocumentStoreResult<Vec<Document>> {
        let root = self.config.paths.records_root();

        let snapshot = self.database.get(root).await.map_err(|source| {
            warn!("Listing {} failed: {}", root, source);
            DocumentStoreError::ListFailed { source }
        })?;

        let documents: Vec<Document> = snapshot
            .children()
            .iter()
            .filter_map(Document::from_snapshot)
            .collect();

        debug!("Listed {} documents", documents.len());
        Ok(documents)
    }

    /// Get configuration
    pub fn config(&self) -> &DocumentStoreConfig {
        &self.config
    }
}

/// Result of a successful upload
#[derive(Debug)]
pub struct StoreReceipt {
    pub document: Document,
    /// Set when the image was uploaded but its record could not be written
    pub record_error: Option<DocumentStoreError>,
}

impl StoreReceipt {
    pub fn key(&self) -> DocumentKey {
        self.document.key()
    }

    /// Public URL of the uploaded image
    pub fn image_link(&self) -> &str {
        &self.document.image_link
    }

    pub fn record_saved(&self) -> bool {
        self.record_error.is_none()
    }

    /// Treat a missing record as a failure of the whole upload
    pub fn into_result(self) -> DocumentStoreResult<Document> {
        match self.record_error {
            None => Ok(self.document),
            Some(e) => Err(e),
        }
    }
}

/// What [`DocumentStore::remove_document_image`] managed to delete
#[derive(Debug)]
pub struct RemovalOutcome {
    pub blob_deleted: bool,
    pub record_deleted: bool,
    pub error: Option<DocumentStoreError>,
}

impl RemovalOutcome {
    pub fn is_complete(&self) -> bool {
        self.blob_deleted && self.record_deleted
    }

    pub fn into_result(self) -> DocumentStoreResult<()> {
        match self.error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
