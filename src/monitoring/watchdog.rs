use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::nvsmi;
use crate::platform::{self, clock};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STALL_SECS: u64 = 3;
pub(crate) const KILL_EXIT_CODE: u32 = 9;

/// Guards the CLI measurement path: no CLI invocation may silently hang
/// the sampler. Any reader of the CLI timestamps its activity; when the
/// timestamp goes stale past the grace window, every process carrying the
/// CLI image name is terminated, which unblocks the stuck reader.
pub fn run(running: Arc<AtomicBool>) {
    log::debug!("nvidia-smi watchdog started");

    while running.load(Ordering::SeqCst) {
        let stamp = nvsmi::alive_timestamp();
        if stamp != 0 && clock::monotonic_secs().saturating_sub(stamp) > STALL_SECS {
            let killed =
                platform::terminate_processes_by_name(nvsmi::NVSMI_IMAGE_NAME, KILL_EXIT_CODE);
            if killed > 0 {
                log::warn!("nvidia-smi stalled for more than {STALL_SECS}s, killed {killed} process(es)");
            }
            nvsmi::clear_alive();
        }
        thread::sleep(POLL_INTERVAL);
    }

    log::debug!("nvidia-smi watchdog stopped");
}
