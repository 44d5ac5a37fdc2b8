use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use uuid::Uuid;

use crate::services::pipeline::{AudioSource, Transcriber};

/// Downloaded audio artifact tied to its scratch directory. Dropping the
/// handle removes the directory, so the artifact cannot outlive the
/// pipeline invocation regardless of which stage failed.
pub struct AudioFile {
    path: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl AudioFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            scratch_dir: None,
        }
    }

    pub(crate) fn with_scratch_dir(path: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            path,
            scratch_dir: Some(scratch_dir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AudioFile {
    fn drop(&mut self) {
        if let Some(dir) = &self.scratch_dir {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to remove audio scratch dir");
            }
        }
    }
}

/// Fetches a video's best-effort audio track as mp3 via the yt-dlp CLI.
pub struct YtDlpAudioSource;

#[async_trait]
impl AudioSource for YtDlpAudioSource {
    async fn fetch_audio(&self, url: &str) -> anyhow::Result<AudioFile> {
        let scratch_dir = std::env::temp_dir().join(format!("quizzly_audio_{}", Uuid::new_v4()));
        fs::create_dir_all(&scratch_dir).await?;

        let result = download_audio(url, &scratch_dir).await;
        match result {
            Ok(path) => Ok(AudioFile::with_scratch_dir(path, scratch_dir)),
            Err(e) => {
                let _ = fs::remove_dir_all(&scratch_dir).await;
                Err(e)
            }
        }
    }
}

async fn download_audio(url: &str, scratch_dir: &Path) -> anyhow::Result<PathBuf> {
    let template = scratch_dir.join("%(id)s.%(ext)s");
    let output = Command::new("yt-dlp")
        .arg("--format")
        .arg("bestaudio/best")
        .arg("--extract-audio")
        .arg("--audio-format")
        .arg("mp3")
        .arg("--no-playlist")
        .arg("--quiet")
        .arg("--output")
        .arg(&template)
        .arg(url)
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("failed to run yt-dlp: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "yt-dlp failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let mut entries = fs::read_dir(scratch_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("mp3") {
            return Ok(path);
        }
    }
    Err(anyhow::anyhow!("yt-dlp produced no mp3 output"))
}

/// Transcribes an audio file via the whisper CLI.
pub struct WhisperTranscriber;

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioFile, model: &str) -> anyhow::Result<String> {
        let out_dir = audio
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);

        let output = Command::new("whisper")
            .arg(audio.path())
            .arg("--model")
            .arg(model)
            .arg("--output_format")
            .arg("txt")
            .arg("--output_dir")
            .arg(&out_dir)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to run whisper: {}", e))?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "whisper failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let stem = audio
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("audio path has no file stem"))?;
        let transcript_path = out_dir.join(format!("{}.txt", stem));
        let transcript = fs::read_to_string(&transcript_path).await?;
        Ok(transcript.trim().to_string())
    }
}
