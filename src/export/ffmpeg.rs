//! FFmpeg-backed export sink.
//!
//! Feeds raw frames to an ffmpeg process over stdin (`-f rawvideo -i -`) and
//! lets it do the encoding. The binary is resolved through ffmpeg-sidecar's
//! cache first, then the system PATH, and validated with `-version` before
//! use.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::error::{ReplayError, ReplayResult};
use crate::frame::Frame;

use super::{ExportCodec, ExportSink, StreamParams};

/// Export sink that pipes raw frames into an ffmpeg encoder process.
pub struct FfmpegSink {
    output_path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frame_bytes: usize,
}

impl FfmpegSink {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            child: None,
            stdin: None,
            frame_bytes: 0,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl ExportSink for FfmpegSink {
    fn open(&mut self, params: &StreamParams) -> ReplayResult<()> {
        let ffmpeg_path = find_ffmpeg()
            .ok_or_else(|| ReplayError::ExportFailure("ffmpeg binary not found".to_string()))?;
        let pix_fmt = pix_fmt_for(params.channels).ok_or_else(|| {
            ReplayError::ExportFailure(format!(
                "unsupported channel count {} for raw input",
                params.channels
            ))
        })?;

        let mut args = vec![
            "-y".to_string(),
            // Raw frames from stdin
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            pix_fmt.to_string(),
            "-s".to_string(),
            format!("{}x{}", params.width, params.height),
            "-r".to_string(),
            format!("{}", params.frame_rate),
            "-i".to_string(),
            "-".to_string(),
        ];
        args.extend(codec_args(params.codec, params.frame_rate));
        args.push(self.output_path.to_string_lossy().to_string());

        log::info!("[EXPORT] ffmpeg {}", args.join(" "));

        let mut child = create_hidden_command(&ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ReplayError::ExportFailure(format!("failed to start ffmpeg: {}", e)))?;

        self.stdin = child.stdin.take();
        self.frame_bytes =
            (params.width as usize) * (params.height as usize) * (params.channels as usize);
        self.child = Some(child);
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> ReplayResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReplayError::ExportFailure("ffmpeg sink not open".to_string()))?;
        if frame.byte_len() != self.frame_bytes {
            return Err(ReplayError::ExportFailure(format!(
                "frame size {} does not match stream ({} bytes expected)",
                frame.byte_len(),
                self.frame_bytes
            )));
        }
        stdin
            .write_all(frame.data())
            .map_err(|e| ReplayError::ExportFailure(format!("ffmpeg write failed: {}", e)))
    }

    fn finish(&mut self) -> ReplayResult<()> {
        // Closing stdin signals EOF to ffmpeg.
        drop(self.stdin.take());

        let mut child = match self.child.take() {
            Some(child) => child,
            None => {
                return Err(ReplayError::ExportFailure(
                    "ffmpeg sink not open".to_string(),
                ))
            }
        };
        let status = child
            .wait()
            .map_err(|e| ReplayError::ExportFailure(format!("ffmpeg wait failed: {}", e)))?;
        if !status.success() {
            return Err(ReplayError::ExportFailure(format!(
                "ffmpeg exited with {}",
                status
            )));
        }
        log::debug!("[EXPORT] ffmpeg finalized {}", self.output_path.display());
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Reap the process if finish was never reached (export aborted).
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
    }
}

/// Raw-input pixel format for a given channel count.
fn pix_fmt_for(channels: u32) -> Option<&'static str> {
    match channels {
        1 => Some("gray"),
        3 => Some("rgb24"),
        4 => Some("rgba"),
        _ => None,
    }
}

/// Encoder arguments per codec. Keyframe interval of one second keeps
/// exported clips precisely seekable.
fn codec_args(codec: ExportCodec, frame_rate: f64) -> Vec<String> {
    let gop = (frame_rate.round().max(1.0)) as u32;
    match codec {
        ExportCodec::H264 => vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            "23".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-g".to_string(),
            gop.to_string(),
            // Move moov atom to start for fast playback start
            "-movflags".to_string(),
            "+faststart".to_string(),
        ],
        ExportCodec::Vp9 => vec![
            "-c:v".to_string(),
            "libvpx-vp9".to_string(),
            "-crf".to_string(),
            "32".to_string(),
            "-b:v".to_string(),
            "0".to_string(),
            "-deadline".to_string(),
            "realtime".to_string(),
            "-cpu-used".to_string(),
            "4".to_string(),
            "-g".to_string(),
            gop.to_string(),
        ],
    }
}

/// Create a Command configured to hide the console window on Windows, so
/// ffmpeg never pops up a console during export.
fn create_hidden_command(program: &Path) -> Command {
    let mut cmd = Command::new(program);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}

/// Find a working ffmpeg binary: ffmpeg-sidecar's resolved path first,
/// system PATH as fallback, each validated by running `-version`.
pub fn find_ffmpeg() -> Option<PathBuf> {
    let sidecar_path = ffmpeg_sidecar::paths::ffmpeg_path();
    if test_ffmpeg_binary(&sidecar_path) {
        log::debug!("[EXPORT] using sidecar ffmpeg: {}", sidecar_path.display());
        return Some(sidecar_path);
    }

    let binary_name = if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    };
    if let Some(path) = find_in_system_path(binary_name) {
        if test_ffmpeg_binary(&path) {
            log::debug!("[EXPORT] using system ffmpeg: {}", path.display());
            return Some(path);
        }
    }

    log::warn!("[EXPORT] no working ffmpeg found");
    None
}

/// Test an ffmpeg binary by running `-version`.
fn test_ffmpeg_binary(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Find an executable in the system PATH.
fn find_in_system_path(name: &str) -> Option<PathBuf> {
    let finder = if cfg!(windows) { "where" } else { "which" };
    let output = Command::new(finder).arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
}
