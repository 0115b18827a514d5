//! Cached, low-overhead memory watcher used for cooperative backoff between decoded chunks.

use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

struct MemState {
    sys: System,
    last_check: Instant,
    last_frac: f64, // available / total (0.0..1.0)
}

static STATE: OnceLock<Mutex<MemState>> = OnceLock::new();
const REFRESH_EVERY: Duration = Duration::from_millis(500);
const BACKOFF: Duration = Duration::from_millis(25);

fn fraction(sys: &System) -> f64 {
    let total = sys.total_memory() as f64;
    let avail = sys.available_memory() as f64;
    if total > 0.0 { (avail / total).clamp(0.0, 1.0) } else { 1.0 }
}

/// Recent estimate of the available memory fraction (0.0..1.0), refreshed at most
/// every `REFRESH_EVERY`.
pub fn available_memory_fraction() -> f64 {
    let state = STATE.get_or_init(|| {
        let mut sys = System::new();
        sys.refresh_memory();
        let last_frac = fraction(&sys);
        Mutex::new(MemState { sys, last_check: Instant::now(), last_frac })
    });
    let mut st = state.lock();
    let now = Instant::now();
    if now.duration_since(st.last_check) >= REFRESH_EVERY {
        st.sys.refresh_memory();
        st.last_frac = fraction(&st.sys);
        st.last_check = now;
    }
    st.last_frac
}

/// Sleeps briefly when available memory is under `threshold`. A threshold of 0 disables it.
pub fn maybe_throttle_low_memory(threshold: f64) {
    if threshold > 0.0 && available_memory_fraction() < threshold {
        std::thread::sleep(BACKOFF);
    }
}
