use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;
use wayfarer::{CaptureRecord, CaptureSink, EngineError, ScreenshotResult};

/// Capture sink writing each persisted state under
/// `{root}/{app}/{task}/step_NNN.png`, with the metadata record in a JSON
/// file alongside. Encoding and disk writes run on the blocking pool.
pub struct FsCaptureSink {
    root: PathBuf,
}

impl FsCaptureSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CaptureSink for FsCaptureSink {
    async fn persist(
        &self,
        record: &CaptureRecord,
        image: &ScreenshotResult,
    ) -> Result<Option<String>, EngineError> {
        let dir = self
            .root
            .join(&record.app_identifier)
            .join(&record.task_id);
        let png_path = dir.join(format!("step_{:03}.png", record.step_index));
        let meta_path = dir.join(format!("step_{:03}.json", record.step_index));

        let metadata = serde_json::to_vec_pretty(record)
            .map_err(|e| EngineError::CaptureSinkError(format!("encode metadata: {e}")))?;
        let width = image.width;
        let height = image.height;
        let pixels = image.image_data.clone();
        let stored = png_path.to_string_lossy().into_owned();

        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            std::fs::create_dir_all(&dir)
                .map_err(|e| EngineError::CaptureSinkError(format!("create {}: {e}", dir.display())))?;
            let buffer = image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
                EngineError::CaptureSinkError(
                    "image payload does not match its dimensions".to_string(),
                )
            })?;
            buffer.save(&png_path).map_err(|e| {
                EngineError::CaptureSinkError(format!("write {}: {e}", png_path.display()))
            })?;
            std::fs::write(&meta_path, metadata).map_err(|e| {
                EngineError::CaptureSinkError(format!("write {}: {e}", meta_path.display()))
            })?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::CaptureSinkError(format!("capture write task: {e}")))??;

        info!(path = %stored, "capture written");
        Ok(Some(stored))
    }
}
