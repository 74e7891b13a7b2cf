use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use doc_store::{
    DeleteTarget, DocumentDatabase, DocumentKey, DocumentStore, DocumentStoreConfig,
    DocumentStoreError, MemoryDocumentDatabase, MemoryObjectStore, ObjectStore, PutResult,
    Snapshot, StoreError, StoreResult,
};

const BASE_URL: &str = "https://files.example";

/// Which object store call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailOn {
    Nothing,
    Put,
    DownloadUrl,
    Delete,
}

/// Object store wrapper that fails one kind of call and counts puts
struct FaultyObjectStore {
    inner: MemoryObjectStore,
    fail_on: FailOn,
    puts: Arc<AtomicUsize>,
}

impl FaultyObjectStore {
    fn new(inner: MemoryObjectStore, fail_on: FailOn) -> Self {
        Self {
            inner,
            fail_on,
            puts: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn injected(&self) -> StoreError {
        StoreError::Http {
            status: 503,
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for FaultyObjectStore {
    async fn put(&self, path: &str, content_type: Option<&str>, bytes: Bytes) -> StoreResult<PutResult> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == FailOn::Put {
            return Err(self.injected());
        }
        self.inner.put(path, content_type, bytes).await
    }

    async fn download_url(&self, path: &str) -> StoreResult<String> {
        if self.fail_on == FailOn::DownloadUrl {
            return Err(self.injected());
        }
        self.inner.download_url(path).await
    }

    async fn get(&self, path: &str, max_bytes: u64) -> StoreResult<Bytes> {
        self.inner.get(path, max_bytes).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        if self.fail_on == FailOn::Delete {
            return Err(self.injected());
        }
        self.inner.delete(path).await
    }
}

/// Database wrapper that can deny reads, writes, or both
struct DeniedDatabase {
    inner: MemoryDocumentDatabase,
    deny_reads: bool,
    deny_writes: bool,
}

impl DeniedDatabase {
    fn denied() -> StoreError {
        StoreError::Http {
            status: 401,
            message: "Permission denied".to_string(),
        }
    }
}

#[async_trait]
impl DocumentDatabase for DeniedDatabase {
    async fn set(&self, path: &str, record: Value) -> StoreResult<()> {
        if self.deny_writes {
            return Err(Self::denied());
        }
        self.inner.set(path, record).await
    }

    async fn get(&self, path: &str) -> StoreResult<Snapshot> {
        if self.deny_reads {
            return Err(Self::denied());
        }
        self.inner.get(path).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        if self.deny_writes {
            return Err(Self::denied());
        }
        self.inner.delete(path).await
    }
}

fn test_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(24, 16, |x, _| {
        if x < 12 {
            Rgb([220, 30, 30])
        } else {
            Rgb([30, 30, 220])
        }
    }))
}

fn at_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).unwrap()
}

fn memory_store() -> (DocumentStore, MemoryObjectStore, MemoryDocumentDatabase) {
    let objects = MemoryObjectStore::with_base_url(BASE_URL);
    let database = MemoryDocumentDatabase::new();
    let store = DocumentStore::new(objects.clone(), database.clone(), DocumentStoreConfig::default());
    (store, objects, database)
}

#[tokio::test]
async fn store_then_list_returns_the_single_document() {
    let (store, objects, _) = memory_store();

    let receipt = assert_ok!(store.store_at(&test_image(), at_millis(123456789)).await);
    assert!(receipt.record_saved());
    assert_eq!(receipt.image_link(), "https://files.example/documentImages/123456789.jpg");
    assert_eq!(receipt.key(), DocumentKey::new(123456789));
    assert_eq!(objects.content_type("documentImages/123456789.jpg").as_deref(), Some("image/jpeg"));

    let documents = assert_ok!(store.get_all_documents_from_database().await);
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].creation_timestamp, 123456789);
    assert_eq!(documents[0].image_link, "https://files.example/documentImages/123456789.jpg");
    assert!(!documents[0].creation_date.is_empty());
}

#[tokio::test]
async fn record_is_written_at_the_timestamp_key() {
    let (store, _, database) = memory_store();

    let receipt = store.store_at(&test_image(), at_millis(1556723045123)).await.unwrap();

    let record = database.get("documents/1556723045123").await.unwrap();
    assert_eq!(record.value()["creationTimestamp"], 1556723045123i64);
    assert_eq!(record.value()["imageLink"], receipt.image_link());
    assert!(record.value()["creationDate"].is_string());

    let fetched = store.get_document(1556723045123i64).await.unwrap();
    assert_eq!(fetched, Some(receipt.document.clone()));
    assert_eq!(store.get_document(1i64).await.unwrap(), None);
}

#[tokio::test]
async fn upload_failure_stops_before_anything_is_recorded() {
    let objects = FaultyObjectStore::new(MemoryObjectStore::new(), FailOn::Put);
    let database = MemoryDocumentDatabase::new();
    let store = DocumentStore::new(objects, database.clone(), DocumentStoreConfig::default());

    let err = assert_err!(store.store_at(&test_image(), at_millis(10)).await);
    assert!(matches!(err, DocumentStoreError::UploadFailed { .. }));
    assert_eq!(err.to_string(), "Image upload failed");
    assert_eq!(database.export(), Value::Null);
}

#[tokio::test]
async fn url_failure_leaves_an_orphaned_blob() {
    let inner = MemoryObjectStore::new();
    let objects = FaultyObjectStore::new(inner.clone(), FailOn::DownloadUrl);
    let database = MemoryDocumentDatabase::new();
    let store = DocumentStore::new(objects, database.clone(), DocumentStoreConfig::default());

    let err = assert_err!(store.store_at(&test_image(), at_millis(11)).await);
    assert!(matches!(err, DocumentStoreError::UrlFetchFailed { .. }));
    assert_eq!(err.to_string(), "Image url is missing");

    assert!(inner.contains("documentImages/11.jpg"));
    assert_eq!(database.export(), Value::Null);
}

#[tokio::test]
async fn unencodable_image_fails_without_touching_storage() {
    let objects = FaultyObjectStore::new(MemoryObjectStore::new(), FailOn::Nothing);
    let puts = objects.puts.clone();
    let store = DocumentStore::new(objects, MemoryDocumentDatabase::new(), DocumentStoreConfig::default());

    let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    let err = assert_err!(store.store(&empty).await);
    assert!(matches!(err, DocumentStoreError::EncodingFailed { .. }));
    assert_eq!(puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn record_failure_is_reported_on_the_receipt() {
    let objects = MemoryObjectStore::new();
    let database = DeniedDatabase {
        inner: MemoryDocumentDatabase::new(),
        deny_reads: false,
        deny_writes: true,
    };
    let store = DocumentStore::new(objects.clone(), database, DocumentStoreConfig::default());

    let receipt = assert_ok!(store.store_at(&test_image(), at_millis(12)).await);
    assert!(!receipt.record_saved());
    assert!(objects.contains("documentImages/12.jpg"));

    let err = assert_err!(receipt.into_result());
    assert!(matches!(err, DocumentStoreError::SaveFailed { .. }));
}

#[tokio::test]
async fn download_round_trip_preserves_pixels() {
    let (store, _, _) = memory_store();
    let original = test_image();

    let receipt = store.store_at(&original, at_millis(500)).await.unwrap();

    let by_name = store.download_stored_document_image("documentImages/500").await.unwrap();
    let by_key = store.download_document_image(receipt.key()).await.unwrap();
    assert_eq!(by_name.to_rgb8(), by_key.to_rgb8());

    let decoded = by_name.to_rgb8();
    assert_eq!(decoded.dimensions(), (24, 16));
    for (x, y, expected) in [(2, 8, original.to_rgb8()[(2, 8)]), (21, 3, original.to_rgb8()[(21, 3)])] {
        let actual = decoded[(x, y)];
        for channel in 0..3 {
            assert!(
                (actual[channel] as i16 - expected[channel] as i16).abs() <= 10,
                "pixel ({x}, {y}) drifted: {actual:?} vs {expected:?}"
            );
        }
    }
}

#[tokio::test]
async fn download_of_missing_blob_passes_backend_description() {
    let (store, _, _) = memory_store();

    let err = assert_err!(store.download_stored_document_image("documentImages/404").await);
    assert!(matches!(err, DocumentStoreError::DownloadFailed { .. }));
    assert_eq!(err.to_string(), "Object not found: documentImages/404.jpg");
}

#[tokio::test]
async fn download_enforces_the_size_bound() {
    let objects = MemoryObjectStore::new();
    let config = DocumentStoreConfig::default().with_max_download_bytes(64);
    let store = DocumentStore::new(objects.clone(), MemoryDocumentDatabase::new(), config);

    objects
        .put("documentImages/9.jpg", None, Bytes::from(vec![0u8; 65]))
        .await
        .unwrap();

    let err = assert_err!(store.download_document_image(9i64).await);
    match err {
        DocumentStoreError::DownloadFailed { source: StoreError::TooLarge { size, max, .. } } => {
            assert_eq!((size, max), (65, 64));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_blob_reports_conversion_error() {
    let (store, objects, _) = memory_store();
    objects
        .put("documentImages/3.jpg", Some("image/jpeg"), Bytes::from_static(b"not really a jpeg"))
        .await
        .unwrap();

    let err = assert_err!(store.download_document_image(3i64).await);
    assert!(matches!(err, DocumentStoreError::DecodeFailed { .. }));
    assert_eq!(err.to_string(), "Error converting image data after download");
}

#[tokio::test]
async fn remove_deletes_blob_then_record() {
    let (store, objects, _) = memory_store();
    let receipt = store.store_at(&test_image(), at_millis(42)).await.unwrap();

    let outcome = store.remove_document_image(receipt.key()).await;
    assert!(outcome.is_complete());
    assert_ok!(outcome.into_result());

    assert!(objects.is_empty());
    assert!(store.get_all_documents_from_database().await.unwrap().is_empty());

    let err = assert_err!(store.download_document_image(42i64).await);
    assert!(matches!(err, DocumentStoreError::DownloadFailed { .. }));
}

#[tokio::test]
async fn failed_blob_delete_keeps_the_record() {
    let inner = MemoryObjectStore::new();
    let database = MemoryDocumentDatabase::new();
    let writer = DocumentStore::new(inner.clone(), database.clone(), DocumentStoreConfig::default());
    writer.store_at(&test_image(), at_millis(77)).await.unwrap();

    let store = DocumentStore::new(
        FaultyObjectStore::new(inner.clone(), FailOn::Delete),
        database,
        DocumentStoreConfig::default(),
    );
    let outcome = store.remove_document_image(77i64).await;
    assert!(!outcome.blob_deleted);
    assert!(!outcome.record_deleted);
    assert!(matches!(
        outcome.error,
        Some(DocumentStoreError::DeleteFailed { target: DeleteTarget::Blob, .. })
    ));

    assert!(inner.contains("documentImages/77.jpg"));
    assert_eq!(store.get_all_documents_from_database().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_record_delete_leaves_an_orphaned_record() {
    let objects = MemoryObjectStore::new();
    let inner_db = MemoryDocumentDatabase::new();
    let writer = DocumentStore::new(objects.clone(), inner_db.clone(), DocumentStoreConfig::default());
    writer.store_at(&test_image(), at_millis(78)).await.unwrap();

    let store = DocumentStore::new(
        objects.clone(),
        DeniedDatabase {
            inner: inner_db.clone(),
            deny_reads: false,
            deny_writes: true,
        },
        DocumentStoreConfig::default(),
    );
    let outcome = store.remove_document_image(78i64).await;
    assert!(outcome.blob_deleted);
    assert!(!outcome.record_deleted);
    assert!(matches!(
        outcome.error,
        Some(DocumentStoreError::DeleteFailed { target: DeleteTarget::Record, .. })
    ));

    assert!(!objects.contains("documentImages/78.jpg"));
    assert_eq!(writer.get_all_documents_from_database().await.unwrap().len(), 1);
}

#[tokio::test]
async fn removing_only_the_record() {
    let (store, objects, _) = memory_store();
    store.store_at(&test_image(), at_millis(5)).await.unwrap();

    assert_ok!(store.remove_document_from_database(5i64).await);
    assert!(store.get_all_documents_from_database().await.unwrap().is_empty());
    assert!(objects.contains("documentImages/5.jpg"));
}

#[tokio::test]
async fn denied_listing_maps_to_list_failed() {
    let store = DocumentStore::new(
        MemoryObjectStore::new(),
        DeniedDatabase {
            inner: MemoryDocumentDatabase::new(),
            deny_reads: true,
            deny_writes: false,
        },
        DocumentStoreConfig::default(),
    );

    let err = assert_err!(store.get_all_documents_from_database().await);
    assert!(matches!(err, DocumentStoreError::ListFailed { .. }));
}

#[tokio::test]
async fn denied_record_read_maps_to_read_failed() {
    let store = DocumentStore::new(
        MemoryObjectStore::new(),
        DeniedDatabase {
            inner: MemoryDocumentDatabase::new(),
            deny_reads: true,
            deny_writes: false,
        },
        DocumentStoreConfig::default(),
    );

    let err = assert_err!(store.get_document(5i64).await);
    assert!(matches!(err, DocumentStoreError::ReadFailed { .. }));
}

#[tokio::test]
async fn every_object_record_is_listed() {
    let (store, _, database) = memory_store();
    database
        .set(
            "documents/1",
            json!({ "creationDate": "today", "creationTimestamp": 1, "imageLink": "https://x/1.jpg" }),
        )
        .await
        .unwrap();
    database
        .set("documents/2", json!({ "creationTimestamp": "2", "imageLink": "https://x/2.jpg" }))
        .await
        .unwrap();
    database
        .set("documents/3", json!({ "creationTimestamp": 3, "imageLink": null, "creationDate": "later" }))
        .await
        .unwrap();

    let documents = assert_ok!(store.get_all_documents_from_database().await);
    assert_eq!(documents.len(), 3);

    let timestamps: Vec<i64> = documents.iter().map(|d| d.creation_timestamp).collect();
    assert_eq!(timestamps, vec![1, 2, 3]);
    assert_eq!(documents[1].image_link, "https://x/2.jpg");
    assert!(documents[2].image_link.is_empty());
    assert_eq!(documents[2].creation_date, "later");
}

#[tokio::test]
async fn empty_database_lists_nothing() {
    let (store, _, _) = memory_store();
    assert!(store.get_all_documents_from_database().await.unwrap().is_empty());
}

#[tokio::test]
async fn save_overwrites_existing_record() {
    let (store, _, _) = memory_store();
    let first = store.store_at(&test_image(), at_millis(900)).await.unwrap().document;

    let mut replacement = first.clone();
    replacement.image_link = "https://elsewhere.example/900.jpg".to_string();
    store.save_to_database(&replacement, 900i64).await.unwrap();

    let documents = store.get_all_documents_from_database().await.unwrap();
    assert_eq!(documents, vec![replacement]);
}

#[tokio::test]
async fn concurrent_stores_produce_independent_records() {
    let (store, objects, _) = memory_store();
    let image = Arc::new(test_image());

    let tasks: Vec<_> = (0..16i64)
        .map(|i| {
            let store = store.clone();
            let image = image.clone();
            tokio::spawn(async move { store.store_at(&image, at_millis(1_000 + i)).await })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        let receipt = result.expect("task panicked").expect("store failed");
        assert!(receipt.record_saved());
    }

    let documents = store.get_all_documents_from_database().await.unwrap();
    assert_eq!(documents.len(), 16);
    assert_eq!(objects.len(), 16);

    let keys: HashSet<i64> = documents.iter().map(|d| d.creation_timestamp).collect();
    assert_eq!(keys.len(), 16);
    for document in &documents {
        assert_eq!(
            document.image_link,
            format!("{}/documentImages/{}.jpg", BASE_URL, document.creation_timestamp)
        );
    }

    let ordered: Vec<i64> = documents.iter().map(|d| d.creation_timestamp).collect();
    let mut sorted = ordered.clone();
    sorted.sort();
    assert_eq!(ordered, sorted);
}
