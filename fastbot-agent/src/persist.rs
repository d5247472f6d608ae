//! Background reuse-model persistence: a plain OS thread (no async
//! runtime) that wakes on an interval, snapshots the model under a lock,
//! and writes it out. Grounded on the threading style in
//! `adamtc007-ob-poc`'s worker loops (`Arc`/`Mutex` + a stop flag rather
//! than a channel, since there's nothing to hand back to the caller but
//! "keep going" / "stop").

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::reuse_model::ReuseModel;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);
const POLL_TICK: Duration = Duration::from_millis(200);

/// Owns the join handle and stop flag for a running persistence thread.
/// Dropping it does not stop the thread; call `stop` explicitly.
pub struct PersistHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PersistHandle {
    /// Signals the thread to stop after its current sleep and waits for
    /// it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawns a thread that calls `model.lock().save(path)` every `interval`,
/// copying the save path out from under the lock before serializing so
/// the lock isn't held across file I/O.
pub fn spawn(model: Arc<Mutex<ReuseModel>>, path: PathBuf, interval: Duration) -> PersistHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let join = thread::spawn(move || {
        'outer: while !thread_stop.load(Ordering::Relaxed) {
            let mut waited = Duration::ZERO;
            while waited < interval {
                thread::sleep(POLL_TICK);
                waited += POLL_TICK;
                if thread_stop.load(Ordering::Relaxed) {
                    break 'outer;
                }
            }
            let snapshot = {
                let guard = model.lock().unwrap_or_else(|e| e.into_inner());
                guard.clone()
            };
            if let Err(e) = snapshot.save(&path) {
                tracing::warn!(error = %e, path = %path.display(), "failed to persist reuse model");
            }
        }
    });
    PersistHandle { stop, join: Some(join) }
}

pub fn spawn_default(model: Arc<Mutex<ReuseModel>>, path: PathBuf) -> PersistHandle {
    spawn(model, path, DEFAULT_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn stop_joins_promptly_without_ever_waking() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("fastbot-persist-test-{id}.bin"));
        let model = Arc::new(Mutex::new(ReuseModel::new()));
        let handle = spawn(model, path.clone(), Duration::from_secs(3600));
        handle.stop();
        let _ = std::fs::remove_file(&path);
    }
}
