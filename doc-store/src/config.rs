use crate::DocumentKey;

/// Configuration for document store operations
#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    /// Where blobs and records live
    pub paths: StorePaths,

    /// Upper bound for a single image download
    pub max_download_bytes: u64,

    /// JPEG quality used when encoding uploads (1-100)
    pub jpeg_quality: u8,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            paths: StorePaths::default(),
            max_download_bytes: 15 * 1024 * 1024, // 15MiB
            jpeg_quality: 100,
        }
    }
}

impl DocumentStoreConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the blob/record path layout
    pub fn with_paths(mut self, paths: StorePaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set max download size
    pub fn with_max_download_bytes(mut self, bytes: u64) -> Self {
        self.max_download_bytes = bytes;
        self
    }

    /// Set JPEG quality, clamped to 1-100
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

/// Path layout shared by the object store and the document database.
///
/// The blob for key `K` lives at `<storage_folder>K.<image_extension>` and
/// its record at `<database_folder>K`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub storage_folder: String,
    pub database_folder: String,
    pub image_extension: String,
}

impl Default for StorePaths {
    fn default() -> Self {
        Self {
            storage_folder: "documentImages/".to_string(),
            database_folder: "documents/".to_string(),
            image_extension: "jpg".to_string(),
        }
    }
}

impl StorePaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage_folder<S: Into<String>>(mut self, folder: S) -> Self {
        self.storage_folder = folder.into();
        self
    }

    pub fn with_database_folder<S: Into<String>>(mut self, folder: S) -> Self {
        self.database_folder = folder.into();
        self
    }

    pub fn with_image_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.image_extension = extension.into();
        self
    }

    /// Download name for a key: the blob path without its extension
    pub fn image_name(&self, key: DocumentKey) -> String {
        format!("{}{}", self.storage_folder, key)
    }

    /// Blob path for a download name
    pub fn named_blob_path(&self, name: &str) -> String {
        format!("{}.{}", name, self.image_extension)
    }

    /// Blob path for a key
    pub fn blob_path(&self, key: DocumentKey) -> String {
        self.named_blob_path(&self.image_name(key))
    }

    /// Record path for a key
    pub fn record_path(&self, key: DocumentKey) -> String {
        format!("{}{}", self.database_folder, key)
    }

    /// Path of the folder holding every record
    pub fn records_root(&self) -> &str {
        &self.database_folder
    }
}
