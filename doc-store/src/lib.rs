//! # doc-store: image documents over object storage and a realtime database
//!
//! `doc-store` uploads an image to an object-storage bucket, records a
//! metadata [`Document`] for it in a realtime document database, and reads or
//! removes both by the shared millisecond [`DocumentKey`].
//!
//! ## Quick Start
//!
//! ```rust
//! use doc_store::prelude::*;
//! use doc_store::{MemoryDocumentDatabase, MemoryObjectStore};
//! use image::{DynamicImage, RgbImage};
//!
//! # #[tokio::main]
//! # async fn main() -> DocumentStoreResult<()> {
//! let store = DocumentStore::new(
//!     MemoryObjectStore::with_base_url("https://files.example"),
//!     MemoryDocumentDatabase::new(),
//!     DocumentStoreConfig::default(),
//! );
//!
//! let image = DynamicImage::ImageRgb8(RgbImage::new(32, 32));
//! let receipt = store.store(&image).await?;
//!
//! let documents = store.get_all_documents_from_database().await?;
//! assert_eq!(documents[0].image_link, receipt.image_link());
//!
//! let outcome = store.remove_document_image(receipt.key()).await;
//! assert!(outcome.is_complete());
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! documentImages/<key>.jpg   ← blob in the ObjectStore
//! documents/<key>            ← record in the DocumentDatabase
//! ```
//!
//! The two writes are independent. Nothing ties their lifecycles together
//! beyond the key, so callers that need consistency reconcile orphans
//! themselves.

mod config;
mod document;
mod error;
pub mod imaging;
mod memory;
mod rtdb;
mod s3_store;
mod service;
pub mod store;

pub use config::{DocumentStoreConfig, StorePaths};
pub use document::{creation_date_in, Document, DocumentKey};
pub use error::{DeleteTarget, DocumentStoreError, DocumentStoreResult, StoreError, StoreResult};
pub use memory::{MemoryDocumentDatabase, MemoryObjectStore};
pub use rtdb::{RealtimeDatabase, RealtimeDatabaseConfig};
pub use s3_store::{S3Config, S3ObjectStore};
pub use service::{DocumentStore, RemovalOutcome, StoreReceipt};
pub use store::{DocumentDatabase, ObjectStore, PutResult, Snapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Document, DocumentDatabase, DocumentKey, DocumentStore, DocumentStoreConfig,
        DocumentStoreError, DocumentStoreResult, ObjectStore,
    };
}
