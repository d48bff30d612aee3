//! Filesystem watcher that posts a one-shot `Compile` scheduler task
//! whenever a watched shader/include path changes. The watcher thread
//! never touches `wgpu`/the GPU directly; it only enqueues work for the
//! scene thread to pick up on its next `Scheduler::next`.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Owns the underlying OS watcher and a channel the scene polls each frame.
/// Watching a path whose length exceeds the platform's `PATH_MAX`-ish limit
/// is silently ignored rather than treated as fatal.
pub struct HotReloadWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<PathBuf>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
}

impl HotReloadWatcher {
    pub fn new() -> notify::Result<Self> {
        let (tx, rx): (Sender<PathBuf>, Receiver<PathBuf>) = std::sync::mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
            },
            notify::Config::default(),
        )?;

        Ok(Self { _watcher: watcher, rx, watched: Arc::new(Mutex::new(Vec::new())) })
    }

    /// Registers a path for watching. Paths longer than 4096 bytes are
    /// dropped silently: some platforms reject them outright, and a shader
    /// living at such a path is not a case worth surfacing as an error.
    pub fn watch(&mut self, path: &Path) {
        const MAX_PATH_LEN: usize = 4096;
        if path.as_os_str().len() > MAX_PATH_LEN {
            log::debug!("ignoring watch request for an implausibly long path");
            return;
        }
        if let Err(e) = self._watcher.watch(path, RecursiveMode::NonRecursive) {
            log::warn!("failed to watch {path:?}: {e}");
            return;
        }
        self.watched.lock().unwrap().push(path.to_path_buf());
    }

    /// Drains every change notification received since the last poll,
    /// deduplicating repeated events for the same path within one drain
    /// (editors often emit several writes per save).
    pub fn drain_changed(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        while let Ok(path) = self.rx.try_recv() {
            if !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap().clone()
    }
}

/// Wires a [`HotReloadWatcher`] into a [`crate::scheduler::Scheduler`] as a
/// low-frequency polling task that enqueues a one-shot recompile whenever a
/// change is observed. The scheduler task itself does nothing with
/// `wgpu`; it only flips `recompile_requested` for the scene's main loop
/// to observe.
pub struct HotReloadTask {
    watcher: HotReloadWatcher,
    pub recompile_requested: Arc<std::sync::atomic::AtomicBool>,
}

impl HotReloadTask {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> notify::Result<Self> {
        let mut watcher = HotReloadWatcher::new()?;
        for p in paths {
            watcher.watch(&p);
        }
        Ok(Self { watcher, recompile_requested: Arc::new(std::sync::atomic::AtomicBool::new(false)) })
    }

    pub fn poll(&self) {
        if !self.watcher.drain_changed().is_empty() {
            self.recompile_requested.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    pub fn take_requested(&self) -> bool {
        self.recompile_requested.swap(false, std::sync::atomic::Ordering::SeqCst)
    }

    pub fn watch(&mut self, path: &Path) {
        self.watcher.watch(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn modifying_a_watched_file_raises_the_flag() {
        let dir = std::env::temp_dir().join(format!("lf-hotreload-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("watched.wgsl");
        std::fs::write(&file, "// initial").unwrap();

        let task = HotReloadTask::new(vec![file.clone()]).expect("watcher should construct");
        std::thread::sleep(Duration::from_millis(100));
        std::fs::write(&file, "// changed").unwrap();
        std::thread::sleep(Duration::from_millis(300));

        task.poll();
        assert!(task.take_requested());
        assert!(!task.take_requested(), "flag should reset after being taken");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn implausibly_long_path_is_ignored_not_fatal() {
        let mut watcher = HotReloadWatcher::new().unwrap();
        let long_name = "x".repeat(5000);
        let path = std::env::temp_dir().join(long_name);
        watcher.watch(&path);
        assert!(watcher.watched_paths().is_empty());
    }
}
