//! Encoder process handle.
//!
//! Wraps one external ffmpeg encode/mux invocation: spawn, feed input,
//! observe progress, await completion, release. Two usage modes share this
//! handle: streamed pre-encoding (frames fed live over stdin while
//! rendering) and the final stitch (re-encoding frame files or muxing the
//! pre-encoded intermediate with assets into the final container).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use rf_core::{Codec, Error, ImageFormat, PixelFormat, Result};

/// Maximum number of diagnostic lines retained from the process's stderr.
const STDERR_TAIL_LINES: usize = 40;

/// Where the encoder reads its video input from.
#[derive(Debug, Clone)]
pub enum EncoderInput {
    /// Encoded frame images arrive over stdin, one after another.
    Pipe {
        /// Format of the piped images.
        image_format: ImageFormat,
    },
    /// Frames were written to disk as `frame-N.<ext>` files.
    Sequence {
        /// Directory holding the frame files.
        dir: PathBuf,
        /// Format (and extension) of the frame files.
        image_format: ImageFormat,
        /// Index of the first frame file.
        start: u32,
    },
    /// A pre-encoded intermediate whose video stream is copied, not
    /// re-encoded.
    Intermediate {
        /// Path of the intermediate file.
        path: PathBuf,
    },
}

/// Parameters for one encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: Codec,
    pub pixel_format: PixelFormat,
    pub crf: Option<u32>,
    pub input: EncoderInput,
    /// Resolved audio asset files to mux into the output.
    pub audio: Vec<PathBuf>,
    pub output: PathBuf,
    pub overwrite: bool,
}

/// Build the ffmpeg argument list for the given parameters.
///
/// Pure function so argument construction is testable without spawning
/// anything.
pub fn build_args(params: &EncoderParams) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    args.push(if params.overwrite { "-y" } else { "-n" }.into());
    args.extend(["-loglevel", "error"].map(String::from));
    args.extend(["-progress", "pipe:2", "-nostats"].map(String::from));

    match &params.input {
        EncoderInput::Pipe { image_format } => {
            args.extend(["-f", "image2pipe"].map(String::from));
            args.extend(["-vcodec", image_format.ffmpeg_decoder()].map(String::from));
            args.push("-framerate".into());
            args.push(params.fps.to_string());
            args.extend(["-i", "pipe:0"].map(String::from));
        }
        EncoderInput::Sequence {
            dir,
            image_format,
            start,
        } => {
            args.extend(["-f", "image2"].map(String::from));
            args.push("-framerate".into());
            args.push(params.fps.to_string());
            args.push("-start_number".into());
            args.push(start.to_string());
            args.push("-i".into());
            args.push(
                dir.join(format!("frame-%d.{}", image_format.extension()))
                    .to_string_lossy()
                    .into_owned(),
            );
        }
        EncoderInput::Intermediate { path } => {
            args.push("-i".into());
            args.push(path.to_string_lossy().into_owned());
        }
    }

    for asset in &params.audio {
        args.push("-i".into());
        args.push(asset.to_string_lossy().into_owned());
    }

    if matches!(params.input, EncoderInput::Intermediate { .. }) {
        args.extend(["-c:v", "copy"].map(String::from));
    } else {
        args.extend(["-c:v", params.codec.ffmpeg_encoder()].map(String::from));
        if let Some(crf) = params.crf {
            args.push("-crf".into());
            args.push(crf.to_string());
        }
        args.extend(["-pix_fmt", params.pixel_format.ffmpeg_name()].map(String::from));
        args.push("-s".into());
        args.push(format!("{}x{}", params.width, params.height));
    }

    if params.audio.is_empty() {
        args.push("-an".into());
    } else {
        args.extend(["-c:a", "aac"].map(String::from));
        args.extend(["-map", "0:v:0"].map(String::from));
        for i in 1..=params.audio.len() {
            args.push("-map".into());
            args.push(format!("{i}:a:0"));
        }
    }

    if params.codec.supports_faststart() {
        args.extend(["-movflags", "+faststart"].map(String::from));
    }

    args.push(params.output.to_string_lossy().into_owned());
    args
}

/// Lifecycle state of an [`EncoderHandle`].
///
/// A handle only exists once the process is spawned, so the state starts at
/// `Running`. `Exited` is terminal; reaching it releases the process and
/// pipe resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// Process is running and accepting input.
    Running,
    /// Input pipe has been closed; no more frames will arrive.
    InputClosed,
    /// Process has been reaped.
    Exited,
}

/// Handle to one running encoder process.
pub struct EncoderHandle {
    tool: String,
    child: tokio::process::Child,
    stdin: Option<ChildStdin>,
    state: EncoderState,
    progress_rx: watch::Receiver<u64>,
    stderr_task: Option<JoinHandle<String>>,
    stderr_tail: Option<String>,
    intermediate: Option<PathBuf>,
}

impl EncoderHandle {
    /// Spawn an encoder process for the given parameters.
    pub fn spawn(program: &Path, params: &EncoderParams) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(build_args(params));
        let pipe_stdin = matches!(params.input, EncoderInput::Pipe { .. });
        let tool = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());
        spawn_command(cmd, tool, pipe_stdin)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Register a temporary file this handle is responsible for removing.
    pub fn mark_temporary(&mut self, path: PathBuf) {
        self.intermediate = Some(path);
    }

    /// Receiver for the encoder's self-reported frames-processed count,
    /// parsed from its `-progress` output.
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress_rx.clone()
    }

    /// Write one frame's bytes to the process's input stream.
    ///
    /// # Errors
    ///
    /// Calling this after [`close_input`](Self::close_input) or after the
    /// process exited is a contract violation and fails immediately with
    /// [`Error::Internal`]. A broken pipe (encoder died mid-stream) surfaces
    /// as [`Error::Io`]; call [`wait`](Self::wait) afterwards to obtain the
    /// exit code and diagnostics.
    pub async fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != EncoderState::Running {
            return Err(Error::Internal(format!(
                "feed called on {} encoder in state {:?}",
                self.tool, self.state
            )));
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            Error::Internal(format!("{} encoder has no input pipe", self.tool))
        })?;
        stdin.write_all(bytes).await?;
        Ok(())
    }

    /// Close the input stream, signalling no more frames will arrive.
    ///
    /// Idempotent; the `Running → InputClosed` transition happens at most
    /// once.
    pub async fn close_input(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
            drop(stdin);
        }
        if self.state == EncoderState::Running {
            self.state = EncoderState::InputClosed;
        }
        Ok(())
    }

    /// Wait for the process to exit.
    ///
    /// Closes the input pipe if it is somehow still open, reaps the process,
    /// and joins the stderr reader. A non-zero exit maps to
    /// [`Error::Encoder`] carrying the exit code and the captured diagnostic
    /// tail. Process and pipe resources are released before returning,
    /// success or failure.
    pub async fn wait(&mut self) -> Result<()> {
        if self.stdin.is_some() {
            self.close_input().await?;
        }
        let status = self.child.wait().await?;
        self.state = EncoderState::Exited;

        let tail = match self.stderr_task.take() {
            Some(task) => {
                let tail = task.await.unwrap_or_default();
                self.stderr_tail = Some(tail.clone());
                tail
            }
            None => self.stderr_tail.clone().unwrap_or_default(),
        };

        if status.success() {
            Ok(())
        } else {
            Err(Error::Encoder {
                code: status.code(),
                stderr: tail,
            })
        }
    }

    /// Abort path: kill the process if it is still running, reap it, and
    /// remove any temporary file. Best effort; failures are logged, never
    /// propagated.
    pub async fn shutdown(&mut self) {
        if self.state != EncoderState::Exited {
            self.stdin.take();
            if let Err(e) = self.child.start_kill() {
                tracing::warn!("failed to kill {}: {e}", self.tool);
            }
            if let Err(e) = self.child.wait().await {
                tracing::warn!("failed to reap {}: {e}", self.tool);
            }
            self.state = EncoderState::Exited;
            if let Some(task) = self.stderr_task.take() {
                task.abort();
            }
        }
        self.cleanup();
    }

    /// Remove any temporary intermediate file this handle created.
    ///
    /// Idempotent, and safe to call regardless of how far the handle got.
    pub fn cleanup(&mut self) {
        if let Some(path) = self.intermediate.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("removed intermediate {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("failed to remove intermediate {}: {e}", path.display());
                }
            }
        }
    }
}

fn spawn_command(mut cmd: Command, tool: String, pipe_stdin: bool) -> Result<EncoderHandle> {
    cmd.stdin(if pipe_stdin {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::spawn(tool.clone(), e.to_string()))?;

    let stdin = child.stdin.take();
    let stderr = child.stderr.take();
    let (progress_tx, progress_rx) = watch::channel(0u64);
    let stderr_task =
        stderr.map(|s| tokio::spawn(read_encoder_output(s, progress_tx)));

    Ok(EncoderHandle {
        tool,
        child,
        stdin,
        state: EncoderState::Running,
        progress_rx,
        stderr_task,
        stderr_tail: None,
        intermediate: None,
    })
}

/// Drain the process's stderr: publish `frame=` counts from `-progress`
/// blocks and keep a bounded tail of everything else as diagnostics.
async fn read_encoder_output(stderr: ChildStderr, progress: watch::Sender<u64>) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::new();

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(value) = line.strip_prefix("frame=") {
            if let Ok(n) = value.trim().parse::<u64>() {
                let _ = progress.send(n);
            }
        } else if !is_progress_line(&line) && !line.trim().is_empty() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Keys emitted by ffmpeg's `-progress` output that are not diagnostics.
fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame=",
        "fps=",
        "stream_0_0_q=",
        "bitrate=",
        "total_size=",
        "out_time_us=",
        "out_time_ms=",
        "out_time=",
        "dup_frames=",
        "drop_frames=",
        "speed=",
        "progress=",
    ];
    KEYS.iter().any(|k| line.starts_with(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe_params(out: &Path) -> EncoderParams {
        EncoderParams {
            width: 1280,
            height: 720,
            fps: 30,
            codec: Codec::H264,
            pixel_format: PixelFormat::Yuv420p,
            crf: Some(23),
            input: EncoderInput::Pipe {
                image_format: ImageFormat::Png,
            },
            audio: vec![],
            output: out.to_path_buf(),
            overwrite: true,
        }
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn args_for_pipe_input() {
        let args = build_args(&pipe_params(Path::new("/tmp/out.mp4")));
        assert_eq!(args[0], "-y");
        assert!(args.contains(&"image2pipe".to_string()));
        assert!(args.contains(&"pipe:0".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"23".to_string()));
        assert!(args.contains(&"1280x720".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn args_for_sequence_input() {
        let mut params = pipe_params(Path::new("/tmp/out.mp4"));
        params.input = EncoderInput::Sequence {
            dir: PathBuf::from("/tmp/frames"),
            image_format: ImageFormat::Png,
            start: 3,
        };
        let args = build_args(&params);
        assert!(args.contains(&"image2".to_string()));
        assert!(args.contains(&"/tmp/frames/frame-%d.png".to_string()));
        let pos = args.iter().position(|a| a == "-start_number").unwrap();
        assert_eq!(args[pos + 1], "3");
    }

    #[test]
    fn args_for_intermediate_copy_video_and_map_audio() {
        let mut params = pipe_params(Path::new("/tmp/final.mp4"));
        params.input = EncoderInput::Intermediate {
            path: PathBuf::from("/tmp/frames/pre-encode.mp4"),
        };
        params.audio = vec![PathBuf::from("/tmp/a.mp3"), PathBuf::from("/tmp/b.mp3")];
        let args = build_args(&params);
        let copy_pos = args.iter().position(|a| a == "copy").unwrap();
        assert_eq!(args[copy_pos - 1], "-c:v");
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"1:a:0".to_string()));
        assert!(args.contains(&"2:a:0".to_string()));
        assert!(!args.contains(&"-an".to_string()));
        // No re-encode settings when copying.
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[test]
    fn args_respect_overwrite_flag() {
        let mut params = pipe_params(Path::new("/tmp/out.mp4"));
        params.overwrite = false;
        assert_eq!(build_args(&params)[0], "-n");
    }

    #[test]
    fn no_faststart_for_webm() {
        let mut params = pipe_params(Path::new("/tmp/out.webm"));
        params.codec = Codec::Vp9;
        assert!(!build_args(&params).contains(&"+faststart".to_string()));
    }

    #[test]
    fn progress_lines_filtered_from_diagnostics() {
        assert!(is_progress_line("frame=42"));
        assert!(is_progress_line("progress=continue"));
        assert!(is_progress_line("out_time_us=1000"));
        assert!(!is_progress_line("[libx264 @ 0x55] broken header"));
    }

    #[tokio::test]
    async fn feed_close_wait_happy_path() {
        let mut handle = spawn_command(sh("cat >/dev/null"), "sh".into(), true).unwrap();
        assert_eq!(handle.state(), EncoderState::Running);
        handle.feed(b"frame-bytes").await.unwrap();
        handle.close_input().await.unwrap();
        assert_eq!(handle.state(), EncoderState::InputClosed);
        handle.wait().await.unwrap();
        assert_eq!(handle.state(), EncoderState::Exited);
    }

    #[tokio::test]
    async fn feed_after_close_fails_fast() {
        let mut handle = spawn_command(sh("cat >/dev/null"), "sh".into(), true).unwrap();
        handle.close_input().await.unwrap();
        let err = handle.feed(b"late").await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_maps_to_encoder_error() {
        let mut handle = spawn_command(sh("exit 3"), "sh".into(), false).unwrap();
        let err = handle.wait().await.unwrap_err();
        match err {
            Error::Encoder { code, .. } => assert_eq!(code, Some(3)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn stderr_tail_is_captured() {
        let mut handle =
            spawn_command(sh("echo boom >&2; exit 1"), "sh".into(), false).unwrap();
        let err = handle.wait().await.unwrap_err();
        match err {
            Error::Encoder { code, stderr } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn progress_frames_are_parsed() {
        let script = "printf 'frame=5\\nprogress=continue\\nframe=9\\nprogress=end\\n' >&2";
        let mut handle = spawn_command(sh(script), "sh".into(), false).unwrap();
        handle.wait().await.unwrap();
        assert_eq!(*handle.progress().borrow(), 9);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("pre-encode.mp4");
        std::fs::write(&temp, b"x").unwrap();

        let mut handle = spawn_command(sh("true"), "sh".into(), false).unwrap();
        handle.mark_temporary(temp.clone());
        handle.wait().await.unwrap();
        handle.cleanup();
        assert!(!temp.exists());
        handle.cleanup();
    }

    #[tokio::test]
    async fn shutdown_kills_running_process() {
        let mut handle = spawn_command(sh("sleep 10"), "sh".into(), true).unwrap();
        handle.shutdown().await;
        assert_eq!(handle.state(), EncoderState::Exited);
    }
}
