//! Retry timing: contention backoff, jittered single retries, and the sleep seam.

use rand::Rng;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crate::utils::config::RetryConsts;

/// Blocking sleep used by every retry loop. Tests swap in [`RecordingSleeper`].
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real `thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps without blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut v) = self.slept.lock() {
            v.push(duration);
        }
    }
}

/// Delay after the failed 0-based `attempt`: base * 2^attempt (0.5s, 1s, 2s, ...).
pub fn backoff_delay(attempt: u32) -> Duration {
    RetryConsts::WRITE_BACKOFF_BASE * 2_u32.saturating_pow(attempt)
}

/// Random delay for single retries of stat, listing and document open.
pub fn jitter_delay() -> Duration {
    let ms = rand::thread_rng().gen_range(RetryConsts::JITTER_MIN_MS..=RetryConsts::JITTER_MAX_MS);
    Duration::from_millis(ms)
}

#[cfg(windows)]
const WINDOWS_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const WINDOWS_LOCK_VIOLATION: i32 = 33;

/// True when the error means another process holds the file (locked or access denied).
pub fn is_contention(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    match err.raw_os_error() {
        #[cfg(windows)]
        Some(WINDOWS_SHARING_VIOLATION | WINDOWS_LOCK_VIOLATION) => true,
        #[cfg(unix)]
        Some(code) => code == libc::EACCES || code == libc::ETXTBSY,
        _ => false,
    }
}
