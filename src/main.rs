//! YouTube-to-MP3 downloader GUI.
//!
//! The egui update loop is the single thread that owns all visible state;
//! the background worker reports through a channel drained here each frame.

// Thumbnail fetching module
mod thumbnail;
// External downloader spawning logic (yt-dlp)
mod downloader;
// Progress parsing utilities
mod progress;
// Data models for the download task, its status, and worker events
mod model;

use downloader::{SubmitError, TaskHandle, submit};
use model::{DownloadStatus, DownloadTask};

use eframe::{App, Frame, egui};
use egui::{ColorImage, TextureOptions, Visuals};
use once_cell::sync::OnceCell;
use rfd::FileDialog;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::{
    runtime::Runtime,
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: initializes logging and the runtime, launches the GUI
fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let rt = Arc::new(Runtime::new().unwrap());
    RUNTIME.set(rt).unwrap();

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "YouTube to MP3",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(Mp3App::default())
        }),
    )
}

/// Application state, owned exclusively by the UI thread.
struct Mp3App {
    /// Input field for the video URL
    url_input: String,
    /// Destination folder for the finished MP3
    download_folder: String,
    /// Projection of the one in-flight (or last finished) download
    task: DownloadTask,
    /// Receiver half of the worker's event channel, while a task runs
    events: Option<UnboundedReceiver<model::DownloadEvent>>,
    /// Cancellation handle for the running task
    handle: Option<TaskHandle>,
    /// Synchronous input-validation warning, shown as a popup
    input_error: Option<String>,
    /// Thumbnail of the current video, once fetched
    thumbnail: Option<egui::TextureHandle>,
    /// Incoming thumbnail fetch result from the blocking task
    thumbnail_result: Arc<Mutex<Option<ColorImage>>>,
}

impl Default for Mp3App {
    fn default() -> Self {
        // The original tool defaults to the process working directory
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| ".".to_string());
        Self {
            url_input: String::new(),
            download_folder: cwd,
            task: DownloadTask::idle(),
            events: None,
            handle: None,
            input_error: None,
            thumbnail: None,
            thumbnail_result: Arc::new(Mutex::new(None)),
        }
    }
}

impl App for Mp3App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // 1. Drain marshaled worker events; this is the only place the
        //    task projection is mutated
        let mut finished = false;
        if let Some(rx) = self.events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                let terminal = event.is_terminal();
                self.task.apply(event);
                if terminal {
                    finished = true;
                    break;
                }
            }
        }
        if finished {
            self.events = None;
            self.handle = None;
        }

        // 2. Pick up a completed thumbnail fetch
        if let Some(img) = self.thumbnail_result.lock().unwrap().take() {
            self.thumbnail = Some(ctx.load_texture("thumbnail", img, TextureOptions::default()));
        }

        // 3. Main panel
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube to MP3");
            ui.add_space(8.0);

            ui.label("Paste video link:");
            ui.text_edit_singleline(&mut self.url_input);
            ui.add_space(4.0);

            ui.horizontal(|ui| {
                ui.label("Download folder:");
                ui.text_edit_singleline(&mut self.download_folder);
                if ui.button("Browse…").clicked() {
                    if let Some(folder) = FileDialog::new()
                        .set_directory(&self.download_folder)
                        .pick_folder()
                    {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });
            ui.add_space(8.0);

            // One task at a time: the button stays disabled until the
            // current one reaches a terminal state
            ui.horizontal(|ui| {
                let active = self.task.is_active();
                if ui
                    .add_enabled(!active, egui::Button::new("Download MP3"))
                    .clicked()
                {
                    self.start_download(ctx);
                }
                if active {
                    if ui.button("Cancel").clicked() {
                        if let Some(handle) = &self.handle {
                            handle.cancel();
                        }
                    }
                }
            });
            ui.add_space(8.0);

            if let Some(tex) = &self.thumbnail {
                ui.image(tex);
                ui.add_space(4.0);
            }

            ui.add(egui::ProgressBar::new(self.task.percent / 100.0).show_percentage());
            ui.label(status_line(&self.task));
            if self.task.status == DownloadStatus::Downloading {
                ui.label(rate_line(&self.task));
            }
        });

        // 4. Popups: input warning and failure dialog
        let mut dismiss_warning = false;
        if let Some(message) = &self.input_error {
            egui::Window::new("Input Error")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(message);
                    if ui.button("OK").clicked() {
                        dismiss_warning = true;
                    }
                });
        }
        if dismiss_warning {
            self.input_error = None;
        }

        let mut acknowledge_error = false;
        if self.task.status == DownloadStatus::Failed {
            if let Some(error) = &self.task.error {
                egui::Window::new("Download Error")
                    .collapsible(false)
                    .resizable(false)
                    .show(ctx, |ui| {
                        // Tool output shown verbatim
                        ui.label(error);
                        if ui.button("OK").clicked() {
                            acknowledge_error = true;
                        }
                    });
            }
        }
        if acknowledge_error {
            self.task.reset();
        }

        // Request periodic repaint so progress keeps moving between inputs
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}

impl Mp3App {
    /// Validates the input and, on success, replaces the projection with a
    /// fresh task wired to a new worker.
    fn start_download(&mut self, ctx: &egui::Context) {
        let folder = PathBuf::from(self.download_folder.trim());
        let (tx, rx) = unbounded_channel();
        let rt = RUNTIME.get().unwrap();
        match submit(rt, &self.url_input, &folder, tx) {
            Ok(handle) => {
                let url = self.url_input.trim().to_owned();
                self.task = DownloadTask::new(url.clone(), folder);
                self.events = Some(rx);
                self.handle = Some(handle);
                self.input_error = None;
                self.thumbnail = None;
                self.spawn_thumbnail_fetch(ctx, url);
                self.url_input.clear();
            }
            Err(err @ SubmitError::EmptyUrl) => {
                self.input_error = Some(err.to_string());
            }
        }
    }

    /// Fetches the video thumbnail on a blocking task and leaves the
    /// decoded image for the next frame to pick up.
    fn spawn_thumbnail_fetch(&self, ctx: &egui::Context, url: String) {
        let result = Arc::clone(&self.thumbnail_result);
        let ctx = ctx.clone();
        RUNTIME.get().unwrap().spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_for_url(&url) {
                *result.lock().unwrap() = Some(img);
                ctx.request_repaint();
            }
        });
    }
}

/// Human-readable status text under the progress bar.
fn status_line(task: &DownloadTask) -> String {
    match task.status {
        DownloadStatus::Idle => String::new(),
        DownloadStatus::Starting => "Starting download...".to_string(),
        DownloadStatus::Downloading => format!(
            "Downloading: {} - {:.1}%",
            task.filename.as_deref().map(basename).unwrap_or("…"),
            task.percent
        ),
        DownloadStatus::Converting => "Download complete. Converting to MP3...".to_string(),
        DownloadStatus::Completed => format!("MP3 saved to {}", task.dest_dir.display()),
        DownloadStatus::Cancelled => "Download cancelled.".to_string(),
        DownloadStatus::Failed => "Error during download.".to_string(),
    }
}

/// Speed and ETA line shown while downloading.
fn rate_line(task: &DownloadTask) -> String {
    let speed = task
        .speed
        .map(format_speed)
        .unwrap_or_else(|| "—".to_string());
    let eta = task
        .eta_secs
        .map(format_eta)
        .unwrap_or_else(|| "—".to_string());
    format!("{} · ETA {}", speed, eta)
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

fn format_speed(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes_per_sec >= MIB {
        format!("{:.1} MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.1} KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

fn format_eta(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DownloadEvent;

    #[test]
    fn speed_formatting_picks_sensible_units() {
        assert_eq!(format_speed(512.0), "512 B/s");
        assert_eq!(format_speed(2048.0), "2.0 KiB/s");
        assert_eq!(format_speed(3.5 * 1024.0 * 1024.0), "3.5 MiB/s");
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(42), "0:42");
        assert_eq!(format_eta(90), "1:30");
        assert_eq!(format_eta(3725), "1:02:05");
    }

    #[test]
    fn basename_strips_directories() {
        assert_eq!(basename("/tmp/out/My Song.webm"), "My Song.webm");
        assert_eq!(basename("plain.mp3"), "plain.mp3");
    }

    #[test]
    fn status_line_shows_filename_and_percent() {
        let mut task = DownloadTask::new("u".into(), PathBuf::from("/tmp/out"));
        task.apply(DownloadEvent::Progress {
            percent: Some(42.5),
            speed: None,
            eta_secs: None,
            filename: Some("/tmp/out/My Song.webm".into()),
        });
        assert_eq!(status_line(&task), "Downloading: My Song.webm - 42.5%");
    }

    #[test]
    fn status_line_for_terminal_states() {
        let mut task = DownloadTask::new("u".into(), PathBuf::from("/tmp/out"));
        task.apply(DownloadEvent::Converting);
        assert_eq!(status_line(&task), "Download complete. Converting to MP3...");
        task.apply(DownloadEvent::Completed);
        assert_eq!(status_line(&task), "MP3 saved to /tmp/out");
    }
}
