//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::future::pending;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::ProgressEstimator;

/// Default encoder program, resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// How often the runner checks the heartbeat while the encoder is quiet.
const HEARTBEAT_POLL: Duration = Duration::from_millis(250);

/// Encoder output lines kept for failure reports.
const TAIL_LINES: usize = 20;

/// How long to wait for buffered output after the encoder exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Repeat a single still input indefinitely.
    pub fn loop_input(self) -> Self {
        self.input_arg("-loop").input_arg("1")
    }

    /// Frame rate at which the looped input is read.
    pub fn input_framerate(self, fps: u32) -> Self {
        self.input_arg("-framerate").input_arg(fps.to_string())
    }

    /// Clip the output to a duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Stop after an exact number of video frames.
    pub fn frames(self, count: u32) -> Self {
        self.output_arg("-frames:v").output_arg(count.to_string())
    }

    /// Output frame rate.
    pub fn output_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set output pixel format.
    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    /// Move the moov atom to the front so playback can start early.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        // Overwrite flag
        if self.overwrite {
            args.push("-y".to_string());
        }

        // Only errors; progress comes from -progress records
        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        // Input args
        args.extend(self.input_args.clone());

        // Input file
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        // Output args
        args.extend(self.output_args.clone());

        // Output file
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress estimation, a deadline and
/// cancellation.
pub struct FfmpegRunner {
    /// Encoder executable
    program: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Use a different encoder executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command, feeding its stdout and stderr through
    /// `estimator` and reporting every increase to `on_progress`.
    ///
    /// The process is killed when the deadline passes or the cancel signal
    /// fires.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        mut estimator: ProgressEstimator,
        mut on_progress: F,
    ) -> MediaResult<()>
    where
        F: FnMut(u8) + Send,
    {
        let program = check_encoder(&self.program)?;

        let args = cmd.build_args();
        debug!("Running encoder: {} {}", program.display(), args.join(" "));

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let deadline = self
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let mut cancel_rx = self.cancel_rx.clone();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_POLL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut tail = OutputTail::default();
        let mut lines_open = true;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,

                _ = cancelled(&mut cancel_rx) => {
                    info!("Encoder cancelled, killing process");
                    let _ = child.kill().await;
                    return Err(MediaError::Cancelled);
                }

                _ = deadline_elapsed(deadline) => {
                    let secs = self.timeout_secs.unwrap_or_default();
                    warn!("Encoder timed out after {} seconds, killing process", secs);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(secs));
                }

                line = line_rx.recv(), if lines_open => match line {
                    Some(line) => {
                        if let Some(pct) = estimator.observe_line(&line, std::time::Instant::now()) {
                            on_progress(pct);
                        }
                        tail.push(line);
                    }
                    None => lines_open = false,
                },

                _ = heartbeat.tick() => {
                    if let Some(pct) = estimator.heartbeat(std::time::Instant::now()) {
                        on_progress(pct);
                    }
                }
            }
        };

        // Output still buffered in the pipes after exit
        let drain = async {
            while let Some(line) = line_rx.recv().await {
                if let Some(pct) = estimator.observe_line(&line, std::time::Instant::now()) {
                    on_progress(pct);
                }
                tail.push(line);
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            debug!("Encoder output still open after exit, not waiting for it");
        }

        if status.success() {
            return Ok(());
        }

        let message = match status.code() {
            Some(code) => format!("Encoder exited with status {}", code),
            None => "Encoder terminated by signal".to_string(),
        };
        Err(MediaError::ffmpeg_failed(message, tail.joined(), status.code()))
    }
}

/// Forward lines from a child pipe into the runner's line channel.
///
/// Stats lines end with `\r` rather than `\n`, so both count as breaks.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut segments = BufReader::new(reader).split(b'\n');

    while let Ok(Some(segment)) = segments.next_segment().await {
        let text = String::from_utf8_lossy(&segment);
        for part in text.split('\r') {
            if part.trim().is_empty() {
                continue;
            }
            if tx.send(part.to_string()).await.is_err() {
                return;
            }
        }
    }
}

/// Resolves once the cancel flag is set; never resolves without a signal.
async fn cancelled(cancel_rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel_rx else {
        return pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone, no cancellation can arrive anymore
            return pending().await;
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Last diagnostic lines written by the encoder.
#[derive(Debug, Default)]
struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: String) {
        if is_progress_record(&line) {
            return;
        }
        if self.lines.len() == TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.trim().to_string());
    }

    fn joined(&self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        Some(self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
    }
}

/// `key=value` records written by `-progress` and `frame=` stats lines.
fn is_progress_record(line: &str) -> bool {
    line.trim()
        .split_once('=')
        .map(|(key, _)| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(false)
}

/// Resolve the encoder executable.
pub fn check_encoder(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::EncoderNotFound(program.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn estimator(duration: f64) -> ProgressEstimator {
        ProgressEstimator::new(duration, 5, std::time::Instant::now())
    }

    async fn run(runner: &FfmpegRunner, cmd: &FfmpegCommand) -> MediaResult<()> {
        runner.run_with_progress(cmd, estimator(6.0), |_| {}).await
    }

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.jpg", "output.mp4")
            .loop_input()
            .input_framerate(30)
            .duration(6.0)
            .video_codec("libx264");

        let args = cmd.build_args();
        assert_eq!(&args[..4], &["-y", "-v", "error", "-progress"]);
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let loop_pos = args.iter().position(|a| a == "-loop").unwrap();
        let t_pos = args.iter().position(|a| a == "-t").unwrap();
        assert!(loop_pos < input_pos);
        assert!(t_pos > input_pos);
        assert_eq!(args[t_pos + 1], "6.000");
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_progress_records_not_kept_in_tail() {
        let mut tail = OutputTail::default();
        tail.push("out_time_us=100".to_string());
        tail.push("frame=   30 fps=0.0 q=-1.0".to_string());
        tail.push("Error opening input file in.jpg.".to_string());
        assert_eq!(tail.joined().as_deref(), Some("Error opening input file in.jpg."));

        for i in 0..30 {
            tail.push(format!("line {}", i));
        }
        assert_eq!(tail.lines.len(), TAIL_LINES);
        assert_eq!(tail.lines.back().map(String::as_str), Some("line 29"));
    }

    #[tokio::test]
    async fn test_missing_encoder() {
        let runner = FfmpegRunner::new().with_program("/nonexistent/animstill-encoder");
        let cmd = FfmpegCommand::new("in.jpg", "out.mp4");
        let err = run(&runner, &cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::EncoderNotFound(_)));
    }

    #[tokio::test]
    async fn test_reports_progress_from_stderr() {
        let dir = TempDir::new().unwrap();
        let program = script(
            &dir,
            "encoder.sh",
            "echo 'out_time=00:00:01.500000' >&2\necho 'out_time_us=3000000' >&2\necho 'progress=end' >&2\nexit 0",
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let runner = FfmpegRunner::new().with_program(&program).with_timeout(10);
        runner
            .run_with_progress(&FfmpegCommand::new("in.jpg", "out.mp4"), estimator(6.0), move |p| {
                sink.lock().unwrap().push(p)
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![25, 50]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_output_tail() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "encoder.sh", "echo 'in.jpg: Invalid data found' >&2\nexit 1");

        let runner = FfmpegRunner::new().with_program(&program);
        let err = run(&runner, &FfmpegCommand::new("in.jpg", "out.mp4"))
            .await
            .unwrap_err();

        match &err {
            MediaError::FfmpegFailed { exit_code, stderr, .. } => {
                assert_eq!(*exit_code, Some(1));
                assert_eq!(stderr.as_deref(), Some("in.jpg: Invalid data found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.detail().contains("status 1"));
        assert!(err.detail().contains("Invalid data found"));
    }

    #[tokio::test]
    async fn test_timeout_kills_encoder() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "encoder.sh", "exec sleep 30");

        let started = std::time::Instant::now();
        let runner = FfmpegRunner::new().with_program(&program).with_timeout(1);
        let err = run(&runner, &FfmpegCommand::new("in.jpg", "out.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Timeout(1)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancel_kills_encoder() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "encoder.sh", "exec sleep 30");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let runner = FfmpegRunner::new().with_program(&program).with_cancel(cancel_rx);
        let cmd = FfmpegCommand::new("in.jpg", "out.mp4");
        let task = tokio::spawn(async move { run(&runner, &cmd).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel_tx.send(true).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
        assert!(err.is_interrupted());
    }

    #[tokio::test]
    async fn test_heartbeat_while_encoder_is_silent() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "encoder.sh", "sleep 2\nexit 0");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        FfmpegRunner::new()
            .with_program(&program)
            .with_timeout(10)
            .run_with_progress(&FfmpegCommand::new("in.jpg", "out.mp4"), estimator(6.0), move |p| {
                sink.lock().unwrap().push(p)
            })
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(seen[0], 7);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
