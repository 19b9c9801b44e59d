use crate::platform;
use crate::state::SystemSnapshot;

/// CPU percentage for one sampling slice, or `None` when the helper has
/// no usable baseline yet (first observation, wallclock went backwards,
/// busy time shrank). The caller re-primes the baseline either way.
pub(crate) fn cpu_slice_pct(
    prev_wall: u64,
    prev_busy: u64,
    wall: u64,
    busy: u64,
    cpu_count: u64,
) -> Option<f64> {
    if cpu_count == 0 || prev_wall == 0 || prev_wall >= wall || prev_busy > busy {
        return None;
    }
    let wall_delta = (wall - prev_wall) as f64;
    let busy_delta = (busy - prev_busy) as f64;
    Some(100.0 * busy_delta / cpu_count as f64 / wall_delta)
}

/// CPU pass: zero every aggregate, then fold each live helper's slice
/// into its root. One unreadable process never aborts the pass; dead
/// processes lose their helper.
pub fn collect_cpu(snapshot: &mut SystemSnapshot) {
    for sample in snapshot.sample_map.values_mut() {
        sample.cpu_pct = 0.0;
    }
    let cpu_count = snapshot.system.cpu_count;
    if cpu_count == 0 {
        return;
    }

    let mut dead = Vec::new();
    let SystemSnapshot { helper_map, sample_map, .. } = snapshot;
    for (&pid, helper) in helper_map.iter_mut() {
        if !helper.handle.is_alive() {
            dead.push(pid);
            continue;
        }
        let wall = platform::wallclock_ticks();
        let busy = match helper.handle.cpu_times() {
            Ok(busy) => busy,
            Err(_) => continue,
        };
        if let Some(pct) =
            cpu_slice_pct(helper.last_cpu_wallclock, helper.last_cpu_busy, wall, busy, cpu_count)
        {
            if let Some(sample) = sample_map.get_mut(&helper.root_pid) {
                sample.cpu_pct += pct;
            }
        }
        helper.last_cpu_wallclock = wall;
        helper.last_cpu_busy = busy;
    }

    for pid in dead {
        log::debug!("tracked process ({pid}) exited, dropping helper");
        snapshot.drop_helper(pid);
    }
}

/// RAM pass: zero every aggregate, then add each live helper's working
/// set to its root.
pub fn collect_ram(snapshot: &mut SystemSnapshot) {
    for sample in snapshot.sample_map.values_mut() {
        sample.ram_bytes = 0;
    }

    let mut dead = Vec::new();
    let SystemSnapshot { helper_map, sample_map, .. } = snapshot;
    for (&pid, helper) in helper_map.iter() {
        if !helper.handle.is_alive() {
            dead.push(pid);
            continue;
        }
        let bytes = match helper.handle.working_set_bytes() {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        if let Some(sample) = sample_map.get_mut(&helper.root_pid) {
            sample.ram_bytes += bytes;
        }
    }

    for pid in dead {
        log::debug!("tracked process ({pid}) exited, dropping helper");
        snapshot.drop_helper(pid);
    }
}
