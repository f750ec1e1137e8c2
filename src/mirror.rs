//! The mirror loop: poll a source file's mtime and overwrite the
//! destination whenever a newer timestamp shows up.
//!
//! One background thread per job. The worker owns `last_seen` and the sync
//! counter; everything the UI learns arrives as [`LogEvent`]s over an mpsc
//! channel. Stopping is cooperative: a shared flag plus a stop channel that
//! doubles as the interruptible poll sleep.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Local};
use thiserror::Error;

/// Fixed delay between modification checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    System,
    Sync,
    Error,
    Path,
    Config,
    Init,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::System => "SYSTEM",
            Tag::Sync => "SYNC",
            Tag::Error => "ERROR",
            Tag::Path => "PATH",
            Tag::Config => "CONFIG",
            Tag::Init => "INIT",
        }
    }
}

/// A single line of the run log. Created by the worker or the UI shell,
/// displayed by the log panel, never persisted.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub tag: Tag,
    pub message: String,
}

impl LogEvent {
    pub fn new(tag: Tag, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            tag,
            message: message.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.tag.as_str(),
            self.message
        )
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("source and destination paths must not be empty")]
    EmptyPath,
}

/// Pre-start sanity check on the two file names. The UI decides what to do
/// with the verdict; `start` itself does not enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameGuard {
    /// File names match (case-insensitive), start right away.
    Match,
    /// Same extension but different base name, ask the user first.
    NamesDiffer,
    /// Different extensions, refuse to start.
    ExtensionsDiffer,
}

pub fn name_guard(source: &Path, destination: &Path) -> NameGuard {
    let src = file_name_lower(source);
    let dst = file_name_lower(destination);
    if src == dst {
        NameGuard::Match
    } else if ext_of(&src) == ext_of(&dst) {
        NameGuard::NamesDiffer
    } else {
        NameGuard::ExtensionsDiffer
    }
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn ext_of(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

/// Handle to a running mirror job. Dropping it without calling
/// [`MirrorHandle::stop`] detaches the worker, which then exits on its next
/// tick once the stop channel disconnects.
pub struct MirrorHandle {
    running: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    events: Sender<LogEvent>,
    worker: thread::JoinHandle<()>,
}

impl MirrorHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the worker, wait for it to exit, then emit the final stopped
    /// event. No further events are sent after this returns.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(());
        let _ = self.worker.join();
        let _ = self
            .events
            .send(LogEvent::new(Tag::System, "Sync stopped."));
    }
}

/// Spawn the mirror worker for `source` -> `destination`. Returns
/// immediately; progress and errors arrive on `events`.
pub fn start(
    source: &Path,
    destination: &Path,
    events: Sender<LogEvent>,
) -> Result<MirrorHandle, StartError> {
    if source.as_os_str().is_empty() || destination.as_os_str().is_empty() {
        return Err(StartError::EmptyPath);
    }

    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let running = Arc::new(AtomicBool::new(true));
    let (stop_tx, stop_rx) = mpsc::channel();

    let worker = thread::spawn({
        let running = Arc::clone(&running);
        let events = events.clone();
        move || worker_loop(&source, &destination, &running, &stop_rx, &events)
    });

    Ok(MirrorHandle {
        running,
        stop_tx,
        events,
        worker,
    })
}

struct SyncReport {
    bytes: u64,
    elapsed_ms: f64,
}

fn worker_loop(
    source: &Path,
    destination: &Path,
    running: &AtomicBool,
    stop_rx: &Receiver<()>,
    events: &Sender<LogEvent>,
) {
    // A source that cannot be statted yet counts as never-modified, so the
    // first timestamp we do see triggers a sync.
    let mut last_seen = modified_time(source).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut sync_count: u64 = 0;

    let _ = events.send(LogEvent::new(
        Tag::System,
        format!("Monitoring {}", source.display()),
    ));

    while running.load(Ordering::SeqCst) {
        match tick(source, destination, &mut last_seen) {
            Ok(Some(report)) => {
                sync_count += 1;
                let _ = events.send(LogEvent::new(
                    Tag::Sync,
                    format!(
                        "Done #{} | Size: {} | Cost: {:.2} ms",
                        sync_count,
                        format_size(report.bytes),
                        report.elapsed_ms
                    ),
                ));
            }
            Ok(None) => {}
            Err(err) => {
                // Transient I/O failures are logged and retried next tick.
                if running.load(Ordering::SeqCst) {
                    let _ = events.send(LogEvent::new(Tag::Error, err.to_string()));
                }
            }
        }

        // The sole suspension point; a stop signal (or a dropped handle)
        // wakes it early.
        match stop_rx.recv_timeout(POLL_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn tick(
    source: &Path,
    destination: &Path,
    last_seen: &mut SystemTime,
) -> io::Result<Option<SyncReport>> {
    let current = modified_time(source)?;
    if current <= *last_seen {
        return Ok(None);
    }

    let started = Instant::now();
    atomic_copy(source, destination)?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    // Only advance after a successful copy, so a failed one is retried.
    *last_seen = current;
    let bytes = fs::metadata(destination)?.len();
    Ok(Some(SyncReport { bytes, elapsed_ms }))
}

fn modified_time(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Copy via a sibling temp file and rename, so a concurrent reader of the
/// destination sees either the old content or the new, never a partial
/// write.
fn atomic_copy(source: &Path, destination: &Path) -> io::Result<u64> {
    let tmp = PathBuf::from(format!("{}.mirror.tmp", destination.display()));
    let bytes = match fs::copy(source, &tmp) {
        Ok(bytes) => bytes,
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
    };
    if let Err(err) = fs::rename(&tmp, destination) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(bytes)
}

/// Human-readable size: KB below 1 MiB, MB at or above, two decimals.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
    } else {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::sync::mpsc::TryRecvError;
    use std::time::UNIX_EPOCH;

    /// Pin the mtime `ahead_secs` into the future. Tests park the source's
    /// mtime far ahead before starting, so plain writes (which stamp "now")
    /// never trigger a tick on their own and the explicit bump is the only
    /// observable change.
    fn set_mtime(path: &Path, ahead_secs: i64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        filetime::set_file_mtime(path, FileTime::from_unix_time(now + ahead_secs, 0)).unwrap();
    }

    /// Wait up to `ticks` poll intervals for an event with the given tag.
    fn wait_for(rx: &Receiver<LogEvent>, tag: Tag, ticks: u32) -> Option<LogEvent> {
        let deadline = Instant::now() + POLL_INTERVAL * ticks + Duration::from_millis(500);
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) if event.tag == tag => return Some(event),
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
        None
    }

    #[test]
    fn guard_accepts_identical_names() {
        assert_eq!(
            name_guard(Path::new("/a/save.dat"), Path::new("/b/save.dat")),
            NameGuard::Match
        );
    }

    #[test]
    fn guard_is_case_insensitive() {
        assert_eq!(
            name_guard(Path::new("/a/Save.DAT"), Path::new("/b/save.dat")),
            NameGuard::Match
        );
    }

    #[test]
    fn guard_flags_differing_base_names() {
        assert_eq!(
            name_guard(Path::new("/a/save.dat"), Path::new("/b/backup.dat")),
            NameGuard::NamesDiffer
        );
    }

    #[test]
    fn guard_refuses_differing_extensions() {
        assert_eq!(
            name_guard(Path::new("/a/save.dat"), Path::new("/b/save.txt")),
            NameGuard::ExtensionsDiffer
        );
    }

    #[test]
    fn guard_treats_missing_extension_as_empty() {
        assert_eq!(
            name_guard(Path::new("/a/save"), Path::new("/b/backup")),
            NameGuard::NamesDiffer
        );
        assert_eq!(
            name_guard(Path::new("/a/save"), Path::new("/b/save.dat")),
            NameGuard::ExtensionsDiffer
        );
    }

    #[test]
    fn start_refuses_empty_paths() {
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(
            start(Path::new(""), Path::new("/tmp/x"), tx.clone()),
            Err(StartError::EmptyPath)
        ));
        assert!(matches!(
            start(Path::new("/tmp/x"), Path::new(""), tx),
            Err(StartError::EmptyPath)
        ));
    }

    #[test]
    fn formats_sizes_with_two_decimals() {
        assert_eq!(format_size(1_048_576), "1.00 MB");
        assert_eq!(format_size(512), "0.50 KB");
        assert_eq!(format_size(1_048_575), "1024.00 KB");
        assert_eq!(format_size(3_145_728), "3.00 MB");
    }

    #[test]
    fn atomic_copy_replaces_destination_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("save.dat");
        let dst = dir.path().join("out").join("save.dat");
        fs::create_dir(dir.path().join("out")).unwrap();
        fs::write(&src, b"hello").unwrap();
        fs::write(&dst, b"stale old content").unwrap();

        let bytes = atomic_copy(&src, &dst).unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
        // No temp file left behind.
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 1);
    }

    #[test]
    fn detects_change_and_syncs_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("save.dat");
        let dst = dir.path().join("mirror.dat");
        fs::write(&src, b"A").unwrap();
        set_mtime(&src, 100);

        let (tx, rx) = mpsc::channel();
        let handle = start(&src, &dst, tx).unwrap();
        assert!(handle.is_running());
        assert!(wait_for(&rx, Tag::System, 1).is_some());

        fs::write(&src, b"AB").unwrap();
        set_mtime(&src, 200);

        let event = wait_for(&rx, Tag::Sync, 3).expect("no SYNC event");
        assert!(event.message.contains("#1"), "{}", event.message);
        assert_eq!(fs::read(&dst).unwrap(), b"AB");

        // No further timestamp change, so further ticks stay quiet.
        assert!(wait_for(&rx, Tag::Sync, 2).is_none());

        handle.stop();
    }

    #[test]
    fn stop_silences_further_events() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("save.dat");
        let dst = dir.path().join("mirror.dat");
        fs::write(&src, b"A").unwrap();

        let (tx, rx) = mpsc::channel();
        let handle = start(&src, &dst, tx).unwrap();
        handle.stop();

        // The final event is the stopped notice.
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let last = last.expect("no events at all");
        assert_eq!(last.tag, Tag::System);
        assert!(last.message.contains("stopped"), "{}", last.message);

        // A modification after stop produces nothing.
        fs::write(&src, b"AB").unwrap();
        set_mtime(&src, 10);
        thread::sleep(POLL_INTERVAL + Duration::from_millis(500));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(!dst.exists());
    }

    #[test]
    fn copy_failure_is_logged_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("save.dat");
        let out = dir.path().join("out");
        let dst = out.join("save.dat");
        fs::write(&src, b"A").unwrap();
        set_mtime(&src, 100);

        let (tx, rx) = mpsc::channel();
        let handle = start(&src, &dst, tx).unwrap();
        assert!(wait_for(&rx, Tag::System, 1).is_some());

        // Destination directory does not exist yet, so this tick fails.
        fs::write(&src, b"AB").unwrap();
        set_mtime(&src, 200);
        assert!(wait_for(&rx, Tag::Error, 3).is_some());
        assert!(handle.is_running());

        // Once it appears the pending change syncs without another mtime
        // bump, because last_seen only advances on success.
        fs::create_dir(&out).unwrap();
        assert!(wait_for(&rx, Tag::Sync, 3).is_some());
        assert_eq!(fs::read(&dst).unwrap(), b"AB");

        handle.stop();
    }

    #[test]
    fn renders_tag_and_message() {
        let event = LogEvent::new(Tag::Sync, "Done #1");
        let line = event.render();
        assert!(line.contains("[SYNC] Done #1"), "{line}");
    }
}
