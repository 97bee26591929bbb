use crate::error::ApiError;
use futures_util::{Stream, StreamExt};
use log::info;
use md5::Context;
use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Directory holding uploaded inputs and stage outputs.
#[derive(Clone, Debug)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileStorage {
            base_dir: base_dir.into(),
        }
    }

    /// Creates the storage directory if it does not exist yet.
    pub fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        info!("File storage ready at {}", self.base_dir.display());
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Streams an uploaded body to disk and returns where it was stored.
    ///
    /// The bytes go to a temporary file inside the storage directory while
    /// their md5 is computed; the file is then renamed to
    /// `upload_<md5>.<extension>`, so identical uploads share one file.
    pub async fn save_upload<S, B, E>(&self, mut body: S, extension: &str) -> Result<PathBuf, ApiError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut file = tempfile::Builder::new()
            .prefix("upload_")
            .suffix(".part")
            .tempfile_in(&self.base_dir)?;
        let mut hasher = Context::new();
        let mut size = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ApiError::Upload(e.to_string()))?;
            let bytes = chunk.as_ref();
            hasher.consume(bytes);
            file.write_all(bytes)?;
            size += bytes.len();
        }
        file.flush()?;

        if size == 0 {
            return Err(ApiError::Upload("uploaded file is empty".to_string()));
        }

        let digest = format!("{:x}", hasher.finalize());
        let target = self.path_for(&format!("upload_{}.{}", digest, extension));
        file.persist(&target).map_err(|e| ApiError::Upload(e.to_string()))?;
        info!("Stored upload of {} bytes at {}", size, target.display());
        Ok(target)
    }
}
