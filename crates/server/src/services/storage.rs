use std::path::PathBuf;

use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Disk-backed blob store for uploaded PDFs. Papers reference blobs by an
/// opaque id; nothing outside this module knows the on-disk layout.
#[derive(Clone)]
pub struct PdfStore {
    base_path: PathBuf,
}

impl PdfStore {
    pub fn new(base_path: &str) -> Self {
        Self {
            base_path: PathBuf::from(base_path),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create storage directory: {e}")))?;
        Ok(())
    }

    fn blob_path(&self, pdf_id: &str) -> PathBuf {
        self.base_path.join(format!("{pdf_id}.pdf"))
    }

    /// Stores the bytes under a fresh id and returns it.
    pub async fn store(&self, data: &[u8]) -> Result<String> {
        let pdf_id = Uuid::new_v4().to_string();
        fs::write(self.blob_path(&pdf_id), data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store PDF: {e}")))?;
        Ok(pdf_id)
    }

    pub async fn read(&self, pdf_id: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(pdf_id);
        if !path.exists() {
            return Err(AppError::NotFound("PDF not found".to_string()));
        }
        fs::read(&path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read PDF: {e}")))
    }

    /// Removing a blob that is already gone is not an error.
    pub async fn delete(&self, pdf_id: &str) -> Result<()> {
        let path = self.blob_path(pdf_id);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to delete PDF: {e}")))?;
        }
        Ok(())
    }
}
