//! CPU affinity for generation workers
//!
//! Workers can be pinned one-per-core from a user-supplied CPU list. Worker
//! `i` is bound to `cores[i % cores.len()]`, so a list shorter than the
//! worker count wraps around. An empty list assigns no core.
//!
//! # Example
//!
//! ```no_run
//! use f1plot::worker::affinity::{core_for_worker, parse_cpu_list, set_cpu_affinity};
//!
//! let cores = parse_cpu_list("0-3,8").unwrap();
//! if let Some(core) = core_for_worker(&cores, 2) {
//!     set_cpu_affinity(core).unwrap();
//! }
//! ```

use crate::Result;
use anyhow::Context;

/// Bind the current thread to a single CPU core
#[cfg(target_os = "linux")]
pub fn set_cpu_affinity(core: usize) -> Result<()> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
    use std::mem;

    if core >= 1024 {
        anyhow::bail!("CPU core ID {} is too large (max 1023)", core);
    }

    unsafe {
        let mut cpu_set: cpu_set_t = mem::zeroed();
        CPU_ZERO(&mut cpu_set);
        CPU_SET(core, &mut cpu_set);

        let result = sched_setaffinity(
            0, // 0 = current thread
            mem::size_of::<cpu_set_t>(),
            &cpu_set,
        );

        if result != 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!("Failed to set CPU affinity to core {}", core));
        }
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_cpu_affinity(_core: usize) -> Result<()> {
    anyhow::bail!("CPU affinity is only supported on Linux")
}

/// Core assigned to worker `worker`, or `None` for an empty list
#[inline]
pub fn core_for_worker(cores: &[usize], worker: usize) -> Option<usize> {
    if cores.is_empty() {
        return None;
    }
    Some(cores[worker % cores.len()])
}

/// Parse a CPU list specification such as `"0,2,4"`, `"0-3"` or `"0-3,8-11"`
///
/// Returns sorted, de-duplicated core IDs.
pub fn parse_cpu_list(spec: &str) -> Result<Vec<usize>> {
    let mut cores = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();

        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start
                .trim()
                .parse()
                .with_context(|| format!("Invalid CPU core number: {}", start))?;
            let end: usize = end
                .trim()
                .parse()
                .with_context(|| format!("Invalid CPU core number: {}", end))?;

            if start > end {
                anyhow::bail!("Invalid CPU range: start ({}) > end ({})", start, end);
            }

            cores.extend(start..=end);
        } else {
            let core: usize = part
                .parse()
                .with_context(|| format!("Invalid CPU core number: {}", part))?;
            cores.push(core);
        }
    }

    if cores.is_empty() {
        anyhow::bail!("CPU core list cannot be empty");
    }

    cores.sort_unstable();
    cores.dedup();

    Ok(cores)
}

/// Number of logical CPUs, used as the default worker count
pub fn num_cpus() -> usize {
    num_cpus::get()
}

/// Warn when more workers than CPUs are configured
pub fn warn_if_oversubscribed(thread_count: usize) -> bool {
    let cpu_count = num_cpus();
    if thread_count > cpu_count {
        log::warn!(
            "Thread count ({}) exceeds CPU count ({}); workers will contend at every barrier",
            thread_count,
            cpu_count
        );
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list_single() {
        assert_eq!(parse_cpu_list("0").unwrap(), vec![0]);
    }

    #[test]
    fn test_parse_cpu_list_mixed() {
        assert_eq!(parse_cpu_list("0-2, 8, 10-11").unwrap(), vec![0, 1, 2, 8, 10, 11]);
    }

    #[test]
    fn test_parse_cpu_list_duplicates_and_order() {
        assert_eq!(parse_cpu_list("3,1,3,0-1").unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_parse_cpu_list_invalid() {
        assert!(parse_cpu_list("").is_err());
        assert!(parse_cpu_list("a").is_err());
        assert!(parse_cpu_list("4-2").is_err());
        assert!(parse_cpu_list("1-2-3").is_err());
    }

    #[test]
    fn test_core_for_worker_wraps() {
        let cores = vec![4, 5];
        assert_eq!(core_for_worker(&cores, 0), Some(4));
        assert_eq!(core_for_worker(&cores, 1), Some(5));
        assert_eq!(core_for_worker(&cores, 2), Some(4));
    }

    #[test]
    fn test_core_for_worker_empty_list() {
        assert_eq!(core_for_worker(&[], 0), None);
        assert_eq!(core_for_worker(&[], 3), None);
    }

    #[test]
    fn test_num_cpus() {
        assert!(num_cpus() > 0);
    }

    #[test]
    fn test_warn_if_oversubscribed() {
        assert!(!warn_if_oversubscribed(1));
        assert!(warn_if_oversubscribed(num_cpus() + 1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_set_cpu_affinity_invalid() {
        assert!(set_cpu_affinity(4096).is_err());
    }
}
