// src/engine/pool.rs
//
// Global thread pool for histogram building and chart rendering.
//
// One pool is shared by every Dispatcher in the process instead of creating a
// pool per request. Thread count comes from IMAGELAB_THREADS, falling back to
// std::thread::available_parallelism() (which respects cgroup CPU quotas).
//
// The pool is initialized lazily on first use; changing IMAGELAB_THREADS
// afterwards has no effect.

use rayon::ThreadPool;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const ENV_THREADS: &str = "IMAGELAB_THREADS";

/// Upper bound for IMAGELAB_THREADS; larger values are clamped.
pub const MAX_THREADS: usize = 256;

const MIN_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// Thread count the global pool is (or will be) built with.
pub fn configured_threads() -> usize {
    let detected = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_THREADS);
    threads_from(std::env::var(ENV_THREADS).ok().as_deref(), detected)
}

fn threads_from(raw: Option<&str>, detected: usize) -> usize {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => detected.max(MIN_THREADS),
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n >= MIN_THREADS => n.min(MAX_THREADS),
            _ => {
                warn!(key = ENV_THREADS, value = raw, "ignoring invalid thread count");
                detected.max(MIN_THREADS)
            }
        },
    }
}

/// The global pool, or None if it could not be built.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = configured_threads();
            match rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("imagelab-{i}"))
                .build()
            {
                Ok(pool) => {
                    debug!(threads = num_threads, "worker pool started");
                    Some(pool)
                }
                Err(e) => {
                    warn!(error = %e, "worker pool unavailable, using rayon's global pool");
                    None
                }
            }
        })
        .as_ref()
}

/// Run `op` inside the global pool so its parallel iterators use our threads.
pub fn install<R, F>(op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match get_pool() {
        Some(pool) => pool.install(op),
        None => op(),
    }
}
