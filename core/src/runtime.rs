use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

/// Environment variable consulted when no explicit thread count is given.
pub const THREADS_ENV_VAR: &str = "PANORAMA_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize the global Rayon pool that runs feature extraction, matching and warps.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `PANORAMA_CPU_THREADS` environment variable
/// 3. Rayon default
///
/// Only the first call has an effect; later calls return its result.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    let res = THREAD_POOL_INIT.get_or_init(|| {
        let configured_threads = match num_threads {
            Some(n) => Some(n),
            None => parse_thread_count(env::var(THREADS_ENV_VAR).ok().as_deref())?,
        };

        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = configured_threads {
            if n == 0 {
                return Err(format!("{THREADS_ENV_VAR} must be >= 1"));
            }
            builder = builder.num_threads(n);
        }

        builder.build_global().map_err(|e| e.to_string())
    });
    res.clone()
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn parse_thread_count(raw: Option<&str>) -> Result<Option<usize>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let parsed: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{THREADS_ENV_VAR} must be a positive integer, got '{raw}'"))?;
    if parsed == 0 {
        return Err(format!("{THREADS_ENV_VAR} must be >= 1"));
    }
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thread_count() {
        assert_eq!(parse_thread_count(None), Ok(None));
        assert_eq!(parse_thread_count(Some("4")), Ok(Some(4)));
        assert_eq!(parse_thread_count(Some(" 2 ")), Ok(Some(2)));
        assert!(parse_thread_count(Some("0")).is_err());
        assert!(parse_thread_count(Some("many")).is_err());
    }

    #[test]
    fn test_current_threads_is_positive() {
        assert!(current_cpu_threads() >= 1);
    }
}
