//! File Model
//!
//! Metadata of a stored file. The bytes live in a [`Storage`](crate::Storage)
//! backend under `saved_name`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dm_core::traits::{Entity, Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};

/// A stored file record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// File ID
    pub id: Option<Id>,
    /// Name the file was uploaded with
    pub original_name: String,
    /// Storage key
    pub saved_name: String,
    /// MIME content type
    pub mime_type: String,
    /// File size in bytes
    pub size: i64,
    /// SHA256 digest
    pub digest: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl File {
    pub fn new(
        original_name: impl Into<String>,
        saved_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: i64,
        digest: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            original_name: original_name.into(),
            saved_name: saved_name.into(),
            mime_type: mime_type.into(),
            size,
            digest: digest.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if this is an image
    pub fn is_image(&self) -> bool {
        is_image_type(&self.mime_type)
    }

    /// Check if this is a PDF
    pub fn is_pdf(&self) -> bool {
        self.mime_type == mime::APPLICATION_PDF.essence_str()
    }

    /// Get file extension
    pub fn extension(&self) -> Option<&str> {
        if !self.original_name.contains('.') {
            return None;
        }
        self.original_name
            .rsplit('.')
            .next()
            .filter(|ext| ext.len() <= 10 && !ext.is_empty())
    }

    /// Human-readable file size
    pub fn human_size(&self) -> String {
        let size = self.size as f64;
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

        if size == 0.0 {
            return "0 B".to_string();
        }

        let base = 1024.0_f64;
        let i = (size.ln() / base.ln()).floor() as usize;
        let i = i.min(UNITS.len() - 1);

        let value = size / base.powi(i as i32);
        format!("{:.1} {}", value, UNITS[i])
    }
}

impl Identifiable for File {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for File {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}

impl Entity for File {
    const TABLE_NAME: &'static str = "files";
    const TYPE_NAME: &'static str = "File";
}

pub(crate) fn is_image_type(mime_type: &str) -> bool {
    mime_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::IMAGE)
        .unwrap_or(false)
}

/// A file as received from the client, not yet stored
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-side file name
    pub original_name: String,
    /// Client-declared content type, guessed from the name when absent
    pub mime_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            mime_type: None,
            data: data.into(),
        }
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declared content type, or the one guessed from the file name
    pub fn resolved_mime_type(&self) -> String {
        self.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.original_name)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

/// Bounding box for image optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageDimensions {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self { width, height }
    }

    pub fn is_unbounded(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

/// Per-upload options requested by the record that owns the file
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Run images through the optimizer
    pub optimize_images: bool,
    /// Resize images to fit in this box
    pub resize: Option<ImageDimensions>,
}

impl UploadOptions {
    pub fn optimized(resize: ImageDimensions) -> Self {
        Self {
            optimize_images: true,
            resize: (!resize.is_unbounded()).then_some(resize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_creation() {
        let file = File::new(
            "document.pdf",
            "abc123.pdf",
            "application/pdf",
            1024 * 1024,
            "sha256hash",
        );

        assert_eq!(file.original_name, "document.pdf");
        assert!(file.is_pdf());
        assert!(!file.is_image());
        assert!(file.is_new_record());
    }

    #[test]
    fn test_image_detection() {
        let png = File::new("a.png", "k", "image/png", 10, "h");
        assert!(png.is_image());

        let svg = File::new("a.svg", "k", "image/svg+xml", 10, "h");
        assert!(svg.is_image());

        let text = File::new("a.txt", "k", "text/plain", 10, "h");
        assert!(!text.is_image());
    }

    #[test]
    fn test_human_size() {
        let cases = [
            (0, "0 B"),
            (512, "512.0 B"),
            (1536, "1.5 KB"),
            (1024 * 1024, "1.0 MB"),
        ];

        for (size, expected) in cases {
            let file = File::new("test", "test", "text/plain", size, "hash");
            assert_eq!(file.human_size(), expected, "Size: {}", size);
        }
    }

    #[test]
    fn test_extension() {
        let pdf = File::new("report.pdf", "disk", "application/pdf", 100, "hash");
        assert_eq!(pdf.extension(), Some("pdf"));

        let no_ext = File::new("noextension", "disk", "text/plain", 100, "hash");
        assert_eq!(no_ext.extension(), None);
    }

    #[test]
    fn test_uploaded_file_mime_guess() {
        let guessed = UploadedFile::new("scan.pdf", "data");
        assert_eq!(guessed.resolved_mime_type(), "application/pdf");

        let declared = UploadedFile::new("scan.bin", "data").mime_type("image/png");
        assert_eq!(declared.resolved_mime_type(), "image/png");
    }

    #[test]
    fn test_upload_options() {
        let unbounded = UploadOptions::optimized(ImageDimensions::default());
        assert!(unbounded.optimize_images);
        assert!(unbounded.resize.is_none());

        let boxed = UploadOptions::optimized(ImageDimensions::new(Some(800), None));
        assert_eq!(boxed.resize.unwrap().width, Some(800));
    }
}
