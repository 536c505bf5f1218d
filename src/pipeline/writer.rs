//! Default [`Writer`]: one text file per chapter
//!
//! Files are written to a temp file in the target directory and renamed into
//! place, so readers never see a partial chapter. With compression on the
//! file is gzipped and gets a `.txt.gz` extension.

use flate2::{Compression, GzBuilder};
use futures::future::BoxFuture;
use log::debug;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use xxhash_rust::xxh3::xxh3_64;

use super::collaborators::{ChapterOutcome, Writer};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::utils::string_utils::safe_truncate_chars;

/// Longest title fragment kept in a file name
const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct FileWriter {
    output_dir: PathBuf,
    compress: bool,
}

impl FileWriter {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            compress,
        }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.output_dir.clone(), config.compress_output)
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File name for a chapter: sanitized title plus a short hash of its URL
    ///
    /// The hash keeps chapters with identical titles apart.
    #[must_use]
    pub fn file_name(&self, outcome: &ChapterOutcome) -> String {
        let title = sanitize_filename::sanitize(safe_truncate_chars(
            outcome.title.trim(),
            MAX_TITLE_CHARS,
        ));
        let title = if title.is_empty() { "chapter".to_string() } else { title };
        let hash = xxh3_64(outcome.url.as_bytes());
        let extension = if self.compress { "txt.gz" } else { "txt" };
        format!("{title}-{:08x}.{extension}", hash as u32)
    }

    async fn write_outcome(&self, outcome: &ChapterOutcome) -> PipelineResult<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            PipelineError::Io(format!(
                "Failed to create output directory {}: {e}",
                self.output_dir.display()
            ))
        })?;

        let file_name = self.file_name(outcome);
        let path = self.output_dir.join(&file_name);
        let body = format!("{}\n\n{}\n", outcome.title, outcome.transformed_text).into_bytes();
        let dir = self.output_dir.clone();
        let target = path.clone();
        let compress = self.compress;

        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &file_name, &body, compress))
            .await
            .map_err(|e| PipelineError::fatal(format!("File write task panicked: {e}")))??;

        debug!("Wrote {} to {}", outcome.url, path.display());
        Ok(path)
    }
}

impl Writer for FileWriter {
    fn write<'a>(
        &'a self,
        outcome: &'a ChapterOutcome,
    ) -> BoxFuture<'a, PipelineResult<Option<PathBuf>>> {
        Box::pin(async move { self.write_outcome(outcome).await.map(Some) })
    }
}

/// Writer failures are surfaced as-is, never classified as transient
fn write_failure(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::Io(format!("Failed to write {}: {err}", path.display()))
}

fn write_atomic(
    dir: &Path,
    target: &Path,
    file_name: &str,
    body: &[u8],
    compress: bool,
) -> PipelineResult<()> {
    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| write_failure(dir, e))?;

    if compress {
        let inner_name = file_name.trim_end_matches(".gz");
        let mut gz = GzBuilder::new()
            .filename(inner_name)
            .write(temp_file, Compression::new(3));
        gz.write_all(body).map_err(|e| write_failure(target, e))?;
        temp_file = gz.finish().map_err(|e| write_failure(target, e))?;
    } else {
        temp_file
            .write_all(body)
            .map_err(|e| write_failure(target, e))?;
    }

    temp_file
        .persist(target)
        .map_err(|e| write_failure(target, e.error))?;
    Ok(())
}
