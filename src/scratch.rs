//! Transient on-disk copies of uploaded videos.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AnalysisError, AnalysisResult};

/// Container formats accepted at the upload boundary. Only the extension is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    Mp4,
    Avi,
    Mov,
}

impl VideoFormat {
    pub fn from_file_name(file_name: &str) -> AnalysisResult<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "avi" => Ok(VideoFormat::Avi),
            "mov" => Ok(VideoFormat::Mov),
            _ => Err(AnalysisError::validation(format!(
                "Unsupported file type '{}'. Supported formats: MP4, AVI, MOV",
                file_name
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Avi => "avi",
            VideoFormat::Mov => "mov",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Avi => "video/x-msvideo",
            VideoFormat::Mov => "video/quicktime",
        }
    }
}

/// A video written to the scratch directory for the lifetime of one request.
#[derive(Debug)]
pub struct ScratchVideo {
    path: PathBuf,
    format: VideoFormat,
    size: u64,
}

impl ScratchVideo {
    pub async fn write(dir: &Path, bytes: &[u8], format: VideoFormat) -> std::io::Result<Self> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.{}", Uuid::new_v4().simple(), format.extension()));
        fs::write(&path, bytes).await?;
        debug!("[scratch] wrote {} bytes to {:?}", bytes.len(), path);
        Ok(Self {
            path,
            format,
            size: bytes.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Best-effort delete. Failures are logged and otherwise ignored.
    pub async fn remove(self) -> bool {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("[scratch] removed {:?}", self.path);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("[scratch] failed to remove {:?}: {}", self.path, e);
                false
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub deleted: usize,
    pub bytes_freed: u64,
}

/// Removes files in `dir` older than `max_age`, left behind by crashed requests.
pub async fn sweep_stale(dir: &Path, max_age: Duration) -> anyhow::Result<SweepStats> {
    let mut stats = SweepStats::default();
    if !dir.exists() {
        return Ok(stats);
    }

    let now = SystemTime::now();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!("[scratch] Failed to get metadata for {:?}: {}", path, e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let age = match metadata.modified().map(|m| now.duration_since(m)) {
            Ok(Ok(age)) => age,
            // Unreadable or future mtime
            _ => continue,
        };

        if age > max_age {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    stats.deleted += 1;
                    stats.bytes_freed += metadata.len();
                    info!(
                        "[scratch] 🧹 Deleted stale file {:?} (age: {:.1} min)",
                        path,
                        age.as_secs_f64() / 60.0
                    );
                }
                Err(e) => error!("[scratch] ❌ Failed to delete {:?}: {}", path, e),
            }
        }
    }

    Ok(stats)
}

/// Periodically sweeps `dir` in the background.
pub fn start_sweep_task(
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "[scratch] 🧹 Starting periodic sweep (interval: {:.1} min, max age: {:.1} min)",
            interval.as_secs_f64() / 60.0,
            max_age.as_secs_f64() / 60.0
        );

        loop {
            ticker.tick().await;
            match sweep_stale(&dir, max_age).await {
                Ok(stats) if stats.deleted > 0 => info!(
                    "[scratch] ✅ Sweep complete: {} files deleted, {:.2} MB freed",
                    stats.deleted,
                    stats.bytes_freed as f64 / 1024.0 / 1024.0
                ),
                Ok(_) => {}
                Err(e) => error!("[scratch] Periodic sweep error: {}", e),
            }
        }
    })
}
