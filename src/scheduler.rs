use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct RefreshTimer {
    id: u64,
    due: Instant,
    handle: JoinHandle<()>,
}

// Stand-in deadline for delays too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

type TimerMap = Arc<Mutex<HashMap<String, RefreshTimer>>>;

fn lock(timers: &TimerMap) -> MutexGuard<'_, HashMap<String, RefreshTimer>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-shot refresh timers, at most one per platform.
///
/// Arming a timer for a platform aborts the previous one. A timer that fires
/// removes itself before running its task, so the task may arm a successor.
#[derive(Debug, Default)]
pub struct RefreshTimers {
    timers: TimerMap,
    next_id: Mutex<u64>,
}

impl RefreshTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, platform: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };

        let now = Instant::now();
        let due = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);

        let mut timers = lock(&self.timers);

        let handle = {
            let timers = Arc::clone(&self.timers);
            let platform = platform.to_string();
            tokio::spawn(async move {
                tokio::time::sleep_until(due).await;
                {
                    let mut timers = lock(&timers);
                    if timers.get(&platform).is_some_and(|timer| timer.id == id) {
                        timers.remove(&platform);
                    }
                }
                debug!("Refresh timer fired for {}", platform);
                task.await;
            })
        };

        let timer = RefreshTimer { id, due, handle };
        if let Some(previous) = timers.insert(platform.to_string(), timer) {
            previous.handle.abort();
            debug!("Superseded refresh timer for {}", platform);
        }
    }

    /// Returns true when a timer was armed for the platform.
    pub fn cancel(&self, platform: &str) -> bool {
        match lock(&self.timers).remove(platform) {
            Some(timer) => {
                timer.handle.abort();
                debug!("Cancelled refresh timer for {}", platform);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, platform: &str) -> bool {
        lock(&self.timers).contains_key(platform)
    }

    pub fn due_in(&self, platform: &str) -> Option<Duration> {
        lock(&self.timers)
            .get(platform)
            .map(|timer| timer.due.saturating_duration_since(Instant::now()))
    }
}

impl Drop for RefreshTimers {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}
