use async_trait::async_trait;
use chorus_core::{ChorusError, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// OCR transcription boundary (§4.7): the pipeline's concurrency and
/// routing logic is independently testable against a stub engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image_bytes: &[u8], lang: &str) -> Result<String>;
}

/// Shells out to the system `tesseract` binary rather than linking a
/// binding crate: `tesseract` reads the image from stdin (`-`) and writes
/// plain text to stdout (`-`), so no temp files are needed.
pub struct TesseractEngine {
    binary_path: String,
}

impl TesseractEngine {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image_bytes: &[u8], lang: &str) -> Result<String> {
        let mut child = Command::new(&self.binary_path)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(lang)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ChorusError::Internal(format!("failed to spawn tesseract: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image_bytes)
                .await
                .map_err(|e| ChorusError::Internal(format!("failed to write image to tesseract stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ChorusError::Internal(format!("tesseract process failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChorusError::Internal(format!("tesseract exited with {}: {stderr}", output.status)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
pub struct StubEngine {
    pub fixed_text: String,
}

#[cfg(test)]
#[async_trait]
impl OcrEngine for StubEngine {
    async fn recognize(&self, _image_bytes: &[u8], _lang: &str) -> Result<String> {
        Ok(self.fixed_text.clone())
    }
}
