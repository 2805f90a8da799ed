//! Resource monitoring for the job process.
//!
//! Peak resident memory is sampled from `/proc/<pid>/status` on Linux. Other
//! platforms report no memory figure.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Interval between two memory samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Resource usage of a finished process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitoring {
    /// Peak resident set size in MiB, if it could be sampled
    pub max_rss_memory: Option<f64>,
    /// Wall time in seconds
    pub wall_time: f64,
}

impl Monitoring {
    /// Build from a peak in KiB and the elapsed time
    #[must_use]
    pub fn new(peak_kib: Option<u64>, elapsed: Duration) -> Self {
        Self {
            max_rss_memory: peak_kib.map(|kib| kib as f64 / 1024.0),
            wall_time: elapsed.as_secs_f64(),
        }
    }
}

/// Parse the `VmRSS` line of a `/proc/<pid>/status` file, in KiB
#[must_use]
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

#[cfg(target_os = "linux")]
fn read_vm_rss(pid: u32) -> Option<u64> {
    std::fs::read_to_string(format!("/proc/{}/status", pid))
        .ok()
        .as_deref()
        .and_then(parse_vm_rss)
}

#[cfg(not(target_os = "linux"))]
fn read_vm_rss(_pid: u32) -> Option<u64> {
    None
}

/// Background thread that tracks the peak resident memory of one process
#[derive(Debug)]
pub struct MemorySampler {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Option<u64>>,
}

impl MemorySampler {
    /// Start sampling `pid` every `interval`
    #[must_use]
    pub fn start(pid: u32, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let mut peak: Option<u64> = None;
            loop {
                if let Some(kib) = read_vm_rss(pid) {
                    peak = Some(peak.map_or(kib, |p| p.max(kib)));
                }
                if flag.load(Ordering::Acquire) {
                    break;
                }
                thread::park_timeout(interval);
            }
            peak
        });
        Self { stop, handle }
    }

    /// Stop sampling and return the peak in KiB
    #[must_use]
    pub fn finish(self) -> Option<u64> {
        self.stop.store(true, Ordering::Release);
        self.handle.thread().unpark();
        self.handle.join().ok().flatten()
    }
}
