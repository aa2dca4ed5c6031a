//! # Runtime
//!
//! Standardized [Tokio](https://tokio.rs) runtime profiles for Weave hosts.
//!
//! Composition itself is single-threaded and cooperative: effect rules and startup
//! hooks are independent tasks, reducers never suspend. The `cooperative` profile
//! reflects that model directly; the multi-threaded profiles remain available for
//! hosts that run heavier effect rules.
//!
//! ## Profiles
//! * **Cooperative**: Current-thread scheduler, every task interleaves on one thread.
//! * **High Performance**: Multi-threaded, larger stacks and longer keep-alive.
//! * **Memory Efficient**: Multi-threaded with a reduced worker pool.
//!
//! ## Example
//!
//! ```rust,ignore
//! #[weave_runtime::main(cooperative)]
//! async fn main() -> anyhow::Result<()> {
//!     Ok(())
//! }
//! ```

pub use anyhow::Result;
pub use weave_derive::main;

use anyhow::anyhow;
use std::{sync::OnceLock, thread::available_parallelism, time::Duration};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// The default number of worker threads if detection fails.
const DEFAULT_WORKER_THREADS: usize = 4;
/// The default stack size for threads (3 `MiB`).
const DEFAULT_STACK_SIZE: usize = 3 * 1024 * 1024;
/// Minimum allowed stack size (1 `MiB`).
const MIN_STACK_SIZE: usize = 1024 * 1024;
/// Maximum allowed stack size (16 `MiB`).
const MAX_STACK_SIZE: usize = 16 * 1024 * 1024;
/// How long an idle thread stays alive.
const THREAD_KEEP_ALIVE: Duration = Duration::from_secs(60);

static WORKER_THREADS: OnceLock<usize> = OnceLock::new();

/// Detects the optimal number of worker threads based on environment variables or hardware.
fn get_worker_threads() -> usize {
    *WORKER_THREADS.get_or_init(|| {
        std::env::var("TOKIO_WORKER_THREADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0 && n <= 1024)
            .unwrap_or_else(|| {
                available_parallelism()
                    .map(std::num::NonZero::get)
                    .unwrap_or(DEFAULT_WORKER_THREADS)
            })
    })
}

fn validate_stack_size(stack_size: usize) -> usize {
    stack_size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE)
}

/// Scheduler flavor backing the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// All tasks run on the thread that drives the runtime.
    CurrentThread,
    /// Work-stealing pool of worker threads.
    MultiThread,
}

/// Configuration for the Tokio runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub flavor: Flavor,
    pub worker_threads: usize,
    pub stack_size: usize,
    pub thread_name: String,
    pub thread_keep_alive: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flavor: Flavor::MultiThread,
            worker_threads: get_worker_threads(),
            stack_size: DEFAULT_STACK_SIZE,
            thread_name: "weave-worker".to_owned(),
            thread_keep_alive: THREAD_KEEP_ALIVE,
        }
    }
}

impl RuntimeConfig {
    /// Preset for the single-threaded cooperative model.
    ///
    /// Worker-related settings are ignored by the current-thread scheduler except
    /// for blocking-pool threads, which still use the stack size and name.
    #[must_use = "Use this configuration for single-threaded composition hosts"]
    pub fn cooperative() -> Self {
        Self {
            flavor: Flavor::CurrentThread,
            worker_threads: 1,
            stack_size: DEFAULT_STACK_SIZE,
            thread_name: "weave-coop".to_owned(),
            thread_keep_alive: THREAD_KEEP_ALIVE,
        }
    }

    /// Preset for high-throughput hosts.
    #[must_use = "Use this configuration for high-performance hosts"]
    pub fn high_performance() -> Self {
        Self {
            flavor: Flavor::MultiThread,
            worker_threads: get_worker_threads(),
            stack_size: 4 * 1024 * 1024,
            thread_name: "weave-hp".to_owned(),
            thread_keep_alive: Duration::from_secs(300),
        }
    }

    /// Preset for hosts where memory footprint matters.
    #[must_use = "Use this configuration for memory-constrained hosts"]
    pub fn memory_efficient() -> Self {
        Self {
            flavor: Flavor::MultiThread,
            worker_threads: (get_worker_threads() / 2).max(1),
            stack_size: 2 * 1024 * 1024,
            thread_name: "weave-mem".to_owned(),
            thread_keep_alive: Duration::from_secs(30),
        }
    }

    #[must_use = "Customize the number of worker threads for the runtime"]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.clamp(1, 1024);
        self
    }

    #[must_use = "Customize the stack size for worker threads"]
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = validate_stack_size(size);
        self
    }

    #[must_use = "Customize the thread name"]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.thread_name = if name.trim().is_empty() { "weave-worker".to_owned() } else { name };
        self
    }

    #[must_use = "Customize the scheduler flavor"]
    pub const fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    fn normalized(&self) -> Self {
        let thread_name = if self.thread_name.trim().is_empty() {
            "weave-worker".to_owned()
        } else {
            self.thread_name.clone()
        };

        Self {
            flavor: self.flavor,
            worker_threads: self.worker_threads.clamp(1, 1024),
            stack_size: validate_stack_size(self.stack_size),
            thread_name,
            thread_keep_alive: self.thread_keep_alive,
        }
    }
}

/// Creates a new Tokio runtime from a [`RuntimeConfig`].
///
/// All drivers (I/O, time) are enabled. Out-of-range values are clamped before use.
///
/// # Errors
///
/// Returns an [`anyhow::Error`] if the Tokio runtime cannot be created, typically due to
/// OS-level limitations on thread creation.
///
/// # Examples
///
/// ```rust
/// use weave_runtime::{build_runtime_with_config, RuntimeConfig};
///
/// let runtime = build_runtime_with_config(&RuntimeConfig::cooperative())?;
/// let answer = runtime.block_on(async { 42 });
/// assert_eq!(answer, 42);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn build_runtime_with_config(config: &RuntimeConfig) -> Result<Runtime> {
    let config = config.normalized();
    debug!(config = ?config, "Building tokio runtime");

    let mut builder = match config.flavor {
        Flavor::CurrentThread => Builder::new_current_thread(),
        Flavor::MultiThread => {
            let mut builder = Builder::new_multi_thread();
            builder.worker_threads(config.worker_threads);
            builder
        },
    };

    builder
        .thread_name(&config.thread_name)
        .thread_stack_size(config.stack_size)
        .thread_keep_alive(config.thread_keep_alive)
        .enable_all();

    builder.build().map_err(|e| anyhow!("Failed to initialize runtime: {e}"))
}

/// Builds the cooperative (current-thread) runtime used by composition hosts.
///
/// # Errors
///
/// Returns an [`anyhow::Error`] if the Tokio runtime cannot be created.
pub fn build_cooperative_runtime() -> Result<Runtime> {
    let config = RuntimeConfig::cooperative();
    info!(stack = config.stack_size, "Initializing cooperative runtime");
    build_runtime_with_config(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_threads_validation() {
        let config = RuntimeConfig::default().with_worker_threads(0);
        assert_eq!(config.worker_threads, 1);

        let config = RuntimeConfig::default().with_worker_threads(2000);
        assert_eq!(config.worker_threads, 1024);
    }

    #[test]
    fn test_stack_size_validation() {
        let config = RuntimeConfig::default().with_stack_size(100);
        assert_eq!(config.stack_size, MIN_STACK_SIZE);

        let config = RuntimeConfig::default().with_stack_size(100 * 1024 * 1024);
        assert_eq!(config.stack_size, MAX_STACK_SIZE);
    }

    #[test]
    fn test_blank_thread_name_falls_back() {
        let config = RuntimeConfig::cooperative().with_thread_name("   ");
        assert_eq!(config.thread_name, "weave-worker");
    }

    #[test]
    fn test_cooperative_runtime_runs_spawned_tasks() {
        let runtime = build_cooperative_runtime().expect("runtime should build");
        let value = runtime.block_on(async {
            let handle = tokio::spawn(async { 7 });
            handle.await.expect("task should complete")
        });
        assert_eq!(value, 7);
    }

    #[test]
    fn test_multi_thread_flavor_builds() {
        let config = RuntimeConfig::memory_efficient().with_worker_threads(2);
        let runtime = build_runtime_with_config(&config).expect("runtime should build");
        assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
    }
}
