//! External frame extraction tools
//!
//! Rendering Lottie animations and decoding VP9 video are delegated to
//! external programs: `ffmpeg` for WEBM stickers and a configurable Lottie
//! renderer for TGS stickers. Both read the payload on stdin and write an
//! encoded image to stdout.

use super::MediaError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Placeholder in the Lottie renderer command line replaced by the frame index.
pub const FRAME_PLACEHOLDER: &str = "{frame}";

/// Default Lottie renderer: python-lottie's converter reading stdin, writing PNG to stdout.
pub const DEFAULT_LOTTIE_RENDER_COMMAND: &str =
    "lottie_convert.py --input-format lottie --output-format png --frame {frame} - -";

/// Still-frame extraction from animated media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Render `frame` of a Lottie animation given as plain JSON.
    async fn lottie_frame(&self, animation_json: &[u8], frame: u32) -> Result<Vec<u8>, MediaError>;

    /// Extract the first decodable video frame of a media container.
    async fn first_video_frame(&self, container: &[u8]) -> Result<Vec<u8>, MediaError>;
}

/// [`FrameExtractor`] backed by external programs
#[derive(Debug, Clone)]
pub struct ExternalTools {
    ffmpeg_path: String,
    lottie_command: Vec<String>,
}

impl ExternalTools {
    /// Create the extractor.
    ///
    /// `lottie_command` is split on whitespace; every `{frame}` token is
    /// replaced with the requested frame index.
    #[must_use]
    pub fn new(ffmpeg_path: &str, lottie_command: &str) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_string(),
            lottie_command: lottie_command.split_whitespace().map(String::from).collect(),
        }
    }

    fn lottie_invocation(&self, frame: u32) -> Result<(String, Vec<String>), MediaError> {
        let (program, args) = self
            .lottie_command
            .split_first()
            .ok_or_else(|| MediaError::Tool("Lottie renderer command is empty".to_string()))?;
        let frame = frame.to_string();
        let args = args
            .iter()
            .map(|arg| arg.replace(FRAME_PLACEHOLDER, &frame))
            .collect();
        Ok((program.clone(), args))
    }
}

#[async_trait]
impl FrameExtractor for ExternalTools {
    async fn lottie_frame(&self, animation_json: &[u8], frame: u32) -> Result<Vec<u8>, MediaError> {
        let (program, args) = self.lottie_invocation(frame)?;
        pipe_through(&program, &args, animation_json).await
    }

    async fn first_video_frame(&self, container: &[u8]) -> Result<Vec<u8>, MediaError> {
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "png",
            "pipe:1",
        ]
        .map(String::from);
        pipe_through(&self.ffmpeg_path, &args, container).await
    }
}

/// Run `program`, feed `input` on stdin and collect stdout.
async fn pipe_through(program: &str, args: &[String], input: &[u8]) -> Result<Vec<u8>, MediaError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::Tool(format!("failed to run {program}: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| MediaError::Tool(format!("{program}: stdin unavailable")))?;
    let payload = input.to_vec();
    // The tool may stop reading early (ffmpeg after the first frame); a broken pipe is fine.
    let writer = tokio::spawn(async move {
        let _ = stdin.write_all(&payload).await;
        let _ = stdin.shutdown().await;
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| MediaError::Tool(format!("{program}: {e}")))?;
    let _ = writer.await;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Tool(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    debug!(program, bytes = output.stdout.len(), "Frame extracted");
    Ok(output.stdout)
}
