use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use rust_embed::RustEmbed;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    runtime::Runtime,
    sync::mpsc::UnboundedSender,
};

use crate::model::DownloadEvent;
use crate::progress::{PROGRESS_TEMPLATE, is_convert_line, parse_progress_line};

/// Optional bundled yt-dlp binary; falls back to PATH when absent.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// Rejections raised synchronously, before any worker is spawned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Please enter a video URL.")]
    EmptyUrl,
}

/// Worker-side failures. `ExternalTool` carries the tool's stderr text
/// verbatim, which is what the user sees.
#[derive(Debug, Error)]
enum DownloadError {
    #[error("could not prepare yt-dlp: {0}")]
    Prepare(#[source] std::io::Error),
    #[error("could not run yt-dlp: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    ExternalTool(String),
}

enum Outcome {
    Finished,
    Cancelled,
}

/// Handle to the one in-flight download, owned by the UI.
#[derive(Debug)]
pub struct TaskHandle {
    cancel: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Advisory cancellation: the worker checks the flag between progress
    /// lines and kills the child process when it is set. A transfer the
    /// tool has already finished may still be transcoded.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Starts exactly one background download task and returns immediately.
///
/// The worker communicates with the UI only through `events`; it sends
/// any number of non-terminal events followed by exactly one terminal
/// `Completed`, `Cancelled`, or `Failed`.
pub fn submit(
    rt: &Runtime,
    url: &str,
    dest_dir: &Path,
    events: UnboundedSender<DownloadEvent>,
) -> Result<TaskHandle, SubmitError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SubmitError::EmptyUrl);
    }
    let cancel = Arc::new(AtomicBool::new(false));
    rt.spawn(run_download(
        url.to_owned(),
        dest_dir.to_owned(),
        Arc::clone(&cancel),
        events,
    ));
    Ok(TaskHandle { cancel })
}

/// Worker entry point: runs the download and always sends one terminal event.
async fn run_download(
    url: String,
    dest_dir: PathBuf,
    cancel: Arc<AtomicBool>,
    events: UnboundedSender<DownloadEvent>,
) {
    log::info!("starting download of {} into {}", url, dest_dir.display());
    let terminal = match download_inner(&url, &dest_dir, &cancel, &events).await {
        Ok(Outcome::Finished) => {
            log::info!("download of {} finished", url);
            DownloadEvent::Completed
        }
        Ok(Outcome::Cancelled) => {
            log::info!("download of {} cancelled", url);
            DownloadEvent::Cancelled
        }
        Err(err) => {
            log::warn!("download of {} failed: {}", url, err);
            DownloadEvent::Failed(err.to_string())
        }
    };
    // The UI may already be gone on shutdown
    let _ = events.send(terminal);
}

async fn download_inner(
    url: &str,
    dest_dir: &Path,
    cancel: &AtomicBool,
    events: &UnboundedSender<DownloadEvent>,
) -> Result<Outcome, DownloadError> {
    let bin = ytdlp_binary().map_err(DownloadError::Prepare)?;
    let mut child = Command::new(bin)
        .args(ytdlp_args(url, dest_dir))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // stderr is drained concurrently so a chatty tool cannot stall the
    // stdout reader on a full pipe; its text backs the Failed message
    let stderr_task = spawn_stderr_reader(&mut child);

    if let Some(out) = child.stdout.take() {
        let mut lines = BufReader::new(out).lines();
        while let Some(line) = lines.next_line().await? {
            if cancel.load(Ordering::Relaxed) {
                let _ = child.kill().await;
                let _ = child.wait().await;
                stderr_task.abort();
                return Ok(Outcome::Cancelled);
            }
            log::debug!("yt-dlp: {}", line);
            if let Some(raw) = parse_progress_line(&line) {
                let _ = events.send(DownloadEvent::Progress {
                    percent: raw.percent(),
                    speed: raw.speed,
                    eta_secs: raw.eta_secs,
                    filename: raw.filename,
                });
            } else if is_convert_line(&line) {
                let _ = events.send(DownloadEvent::Converting);
            }
        }
    }

    let status = child.wait().await?;
    let stderr_text = stderr_task.await.unwrap_or_default();
    if cancel.load(Ordering::Relaxed) {
        return Ok(Outcome::Cancelled);
    }
    if status.success() {
        Ok(Outcome::Finished)
    } else {
        let message = if stderr_text.trim().is_empty() {
            format!("yt-dlp exited with {}", status)
        } else {
            stderr_text.trim().to_owned()
        };
        Err(DownloadError::ExternalTool(message))
    }
}

fn spawn_stderr_reader(child: &mut Child) -> tokio::task::JoinHandle<String> {
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        let mut text = String::new();
        if let Some(err) = stderr {
            let mut lines = BufReader::new(err).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::warn!("yt-dlp: {}", line);
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&line);
            }
        }
        text
    })
}

/// Arguments mirroring the classic audio-extraction invocation:
/// best audio, transcode to MP3 at 192k, title-based output name.
fn ytdlp_args(url: &str, dest_dir: &Path) -> Vec<String> {
    vec![
        "--extract-audio".to_owned(),
        "--audio-format".to_owned(),
        "mp3".to_owned(),
        "--audio-quality".to_owned(),
        "192K".to_owned(),
        "--newline".to_owned(),
        "--no-warnings".to_owned(),
        "--progress-template".to_owned(),
        PROGRESS_TEMPLATE.to_owned(),
        "-o".to_owned(),
        dest_dir.join("%(title)s.%(ext)s").display().to_string(),
        url.to_owned(),
    ]
}

/// Resolves the yt-dlp binary: a bundled copy is unpacked to the temp
/// directory once, otherwise the name is left for PATH lookup.
fn ytdlp_binary() -> std::io::Result<PathBuf> {
    let bin = if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    };
    if let Some(data) = Asset::get(bin) {
        let tmp = std::env::temp_dir().join(bin);
        if !tmp.exists() {
            let mut f = File::create(&tmp)?;
            f.write_all(&data.data)?;
            #[cfg(unix)]
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
        return Ok(tmp);
    }
    Ok(PathBuf::from(bin))
}
