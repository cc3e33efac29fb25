use std::path::PathBuf;

/// Represents the current state of a download task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// No task in flight; submissions are accepted
    Idle,
    /// Task submitted, worker spawned, no progress seen yet
    Starting,
    /// yt-dlp is fetching the media
    Downloading,
    /// Fetch finished, audio extraction running
    Converting,
    /// Terminal: MP3 written to the destination folder
    Completed,
    /// Terminal: cancelled by the user
    Cancelled,
    /// Terminal: the external tool failed
    Failed,
}

/// Normalized event marshaled from the worker onto the UI thread.
///
/// The worker never touches UI state; everything it learns from the
/// child process travels through these.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// A progress line parsed from the download phase
    Progress {
        percent: Option<f32>,
        speed: Option<f64>,
        eta_secs: Option<u64>,
        filename: Option<String>,
    },
    /// Download finished, audio extraction started
    Converting,
    /// Terminal: success
    Completed,
    /// Terminal: cancelled by the user
    Cancelled,
    /// Terminal: failure, carrying the tool's error text verbatim
    Failed(String),
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed | DownloadEvent::Cancelled | DownloadEvent::Failed(_)
        )
    }
}

/// UI-side projection of the one in-flight download.
///
/// Mutated exclusively on the UI thread by applying marshaled events;
/// the worker holds no reference to it.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Source URL as submitted
    pub url: String,
    /// Destination directory for the finished file
    pub dest_dir: PathBuf,
    /// Current position in the state machine
    pub status: DownloadStatus,
    /// Progress percentage, always within [0, 100]
    pub percent: f32,
    /// Last reported download speed in bytes/sec
    pub speed: Option<f64>,
    /// Last reported ETA in seconds
    pub eta_secs: Option<u64>,
    /// Filename reported by the tool, once known
    pub filename: Option<String>,
    /// Error text of a Failed terminal event
    pub error: Option<String>,
}

impl DownloadTask {
    /// A fresh task, created when the user submits a URL.
    pub fn new(url: String, dest_dir: PathBuf) -> Self {
        Self {
            url,
            dest_dir,
            status: DownloadStatus::Starting,
            percent: 0.0,
            speed: None,
            eta_secs: None,
            filename: None,
            error: None,
        }
    }

    /// Placeholder task backing the idle UI.
    pub fn idle() -> Self {
        let mut task = Self::new(String::new(), PathBuf::new());
        task.status = DownloadStatus::Idle;
        task
    }

    /// True while new submissions must be rejected (worker still running).
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Starting | DownloadStatus::Downloading | DownloadStatus::Converting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Completed | DownloadStatus::Cancelled | DownloadStatus::Failed
        )
    }

    /// Applies one marshaled event to the projection.
    ///
    /// Invariants are enforced here, whatever the worker sends: percent
    /// stays in [0, 100] and never decreases during the download phase,
    /// and events arriving after a terminal state are dropped.
    pub fn apply(&mut self, event: DownloadEvent) {
        if self.is_terminal() || self.status == DownloadStatus::Idle {
            return;
        }
        match event {
            DownloadEvent::Progress {
                percent,
                speed,
                eta_secs,
                filename,
            } => {
                // Download-phase output after the convert phase began is stale
                if self.status == DownloadStatus::Converting {
                    return;
                }
                self.status = DownloadStatus::Downloading;
                if let Some(p) = percent {
                    let p = p.clamp(0.0, 100.0);
                    if p > self.percent {
                        self.percent = p;
                    }
                }
                self.speed = speed;
                self.eta_secs = eta_secs;
                if filename.is_some() {
                    self.filename = filename;
                }
            }
            DownloadEvent::Converting => {
                self.status = DownloadStatus::Converting;
                self.percent = 100.0;
                self.speed = None;
                self.eta_secs = None;
            }
            DownloadEvent::Completed => {
                self.status = DownloadStatus::Completed;
                self.percent = 100.0;
                self.speed = None;
                self.eta_secs = None;
            }
            DownloadEvent::Cancelled => {
                self.status = DownloadStatus::Cancelled;
                self.speed = None;
                self.eta_secs = None;
            }
            DownloadEvent::Failed(message) => {
                self.status = DownloadStatus::Failed;
                self.speed = None;
                self.eta_secs = None;
                self.error = Some(message);
            }
        }
    }

    /// Acknowledges a terminal state and returns the UI to Idle,
    /// percent reset for the next task.
    pub fn reset(&mut self) {
        self.status = DownloadStatus::Idle;
        self.percent = 0.0;
        self.speed = None;
        self.eta_secs = None;
        self.filename = None;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(percent: f32) -> DownloadEvent {
        DownloadEvent::Progress {
            percent: Some(percent),
            speed: Some(1024.0),
            eta_secs: Some(30),
            filename: Some("song.webm".into()),
        }
    }

    fn fresh() -> DownloadTask {
        DownloadTask::new("https://video.example/abc".into(), PathBuf::from("/tmp/out"))
    }

    #[test]
    fn new_task_starts_at_zero() {
        let task = fresh();
        assert_eq!(task.status, DownloadStatus::Starting);
        assert_eq!(task.percent, 0.0);
        assert!(task.is_active());
    }

    #[test]
    fn progress_moves_to_downloading() {
        let mut task = fresh();
        task.apply(progress(12.5));
        assert_eq!(task.status, DownloadStatus::Downloading);
        assert_eq!(task.percent, 12.5);
        assert_eq!(task.filename.as_deref(), Some("song.webm"));
    }

    #[test]
    fn percent_is_monotonic_during_download() {
        let mut task = fresh();
        task.apply(progress(40.0));
        task.apply(progress(25.0));
        assert_eq!(task.percent, 40.0);
        task.apply(progress(60.0));
        assert_eq!(task.percent, 60.0);
    }

    #[test]
    fn percent_is_clamped() {
        let mut task = fresh();
        task.apply(progress(250.0));
        assert_eq!(task.percent, 100.0);
        let mut task = fresh();
        task.apply(progress(-5.0));
        assert_eq!(task.percent, 0.0);
    }

    #[test]
    fn unknown_percent_keeps_previous_value() {
        let mut task = fresh();
        task.apply(progress(30.0));
        task.apply(DownloadEvent::Progress {
            percent: None,
            speed: Some(2048.0),
            eta_secs: None,
            filename: None,
        });
        assert_eq!(task.percent, 30.0);
        assert_eq!(task.speed, Some(2048.0));
        assert_eq!(task.filename.as_deref(), Some("song.webm"));
    }

    #[test]
    fn converting_forces_full_bar() {
        let mut task = fresh();
        task.apply(progress(80.0));
        task.apply(DownloadEvent::Converting);
        assert_eq!(task.status, DownloadStatus::Converting);
        assert_eq!(task.percent, 100.0);
        // Late download-phase output must not regress the bar
        task.apply(progress(85.0));
        assert_eq!(task.status, DownloadStatus::Converting);
        assert_eq!(task.percent, 100.0);
    }

    #[test]
    fn completed_is_terminal_and_reenables_submission() {
        let mut task = fresh();
        task.apply(progress(50.0));
        task.apply(DownloadEvent::Converting);
        task.apply(DownloadEvent::Completed);
        assert_eq!(task.status, DownloadStatus::Completed);
        assert!(!task.is_active());
        // Events after a terminal state are dropped
        task.apply(progress(99.0));
        assert_eq!(task.status, DownloadStatus::Completed);
    }

    #[test]
    fn failure_carries_message_verbatim() {
        let mut task = fresh();
        task.apply(progress(10.0));
        task.apply(DownloadEvent::Failed("network unreachable".into()));
        assert_eq!(task.status, DownloadStatus::Failed);
        assert!(!task.is_active());
        assert_eq!(task.error.as_deref(), Some("network unreachable"));
    }

    #[test]
    fn cancel_is_terminal_without_error() {
        let mut task = fresh();
        task.apply(progress(10.0));
        task.apply(DownloadEvent::Cancelled);
        assert_eq!(task.status, DownloadStatus::Cancelled);
        assert!(task.error.is_none());
    }

    #[test]
    fn reset_returns_to_idle_with_zero_percent() {
        let mut task = fresh();
        task.apply(progress(70.0));
        task.apply(DownloadEvent::Failed("boom".into()));
        task.reset();
        assert_eq!(task.status, DownloadStatus::Idle);
        assert_eq!(task.percent, 0.0);
        assert!(task.error.is_none());
        assert!(!task.is_active());
    }
}
