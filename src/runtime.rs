use cv_core::{Error, Result};
use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

/// Environment variable consulted when no explicit thread count is given.
pub const THREADS_ENV: &str = "CV_ALIGN_THREADS";

static THREAD_POOL_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the global Rayon thread pool used by normal, feature and
/// correspondence computation.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `CV_ALIGN_THREADS` environment variable
/// 3. Rayon default
///
/// Only the first call configures the pool; later calls return its outcome.
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    let res = THREAD_POOL_INIT.get_or_init(|| {
        let configured = match num_threads {
            Some(n) => Some(n),
            None => threads_from_env()?,
        };

        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = configured {
            if n == 0 {
                return Err("thread count must be >= 1".to_string());
            }
            builder = builder.num_threads(n);
        }
        builder.build_global().map_err(|e| e.to_string())
    });
    res.clone().map_err(Error::InvalidParameter)
}

pub fn current_threads() -> usize {
    rayon::current_num_threads()
}

fn threads_from_env() -> std::result::Result<Option<usize>, String> {
    let raw = match env::var(THREADS_ENV) {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => return Err(format!("failed to read {THREADS_ENV}: {e}")),
    };

    let parsed: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{THREADS_ENV} must be a positive integer, got '{raw}'"))?;
    if parsed == 0 {
        return Err(format!("{THREADS_ENV} must be >= 1"));
    }
    Ok(Some(parsed))
}
