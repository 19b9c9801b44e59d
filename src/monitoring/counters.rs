use lazy_static::lazy_static;
use regex::Regex;

use crate::platform::CounterItem;
use crate::state::SystemSnapshot;

// Counter path strings are a bit-exact contract with the OS.
pub const PROCESSOR_TIME_PATH: &str = "\\Processor(_Total)\\% Processor Time";
pub const GPU_ENGINE_PATH: &str = "\\GPU Engine(*)\\Utilization Percentage";
pub const GPU_MEMORY_PATH: &str = "\\GPU Process Memory(*)\\Dedicated Usage";
pub const NET_SENT_PATH: &str = "\\Network Interface(*)\\Bytes Sent/sec";
pub const NET_RECV_PATH: &str = "\\Network Interface(*)\\Bytes Received/sec";

lazy_static! {
    // instance names look like
    //   pid_25832_luid_0x00000000_0x0000DABC_phys_0_eng_3_engtype_VideoDecode
    static ref INSTANCE_PID: Regex = Regex::new(r"^pid_(\d+)_").unwrap();
}

/// Pid encoded in a GPU counter instance name, parsed between the `pid_`
/// prefix and the next `_`. Malformed names yield nothing.
pub(crate) fn instance_pid(name: &str) -> Option<u32> {
    INSTANCE_PID.captures(name)?.get(1)?.as_str().parse().ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EngineKind {
    ThreeD,
    Vr,
    Encode,
    Decode,
}

/// Engine classification by substring, first match wins. The order is a
/// compatibility contract: `_3D`, `_VR`, `Encode`/`Codec`, `Decode`.
pub(crate) fn classify_engine(name: &str) -> Option<EngineKind> {
    if name.contains("_3D") {
        Some(EngineKind::ThreeD)
    } else if name.contains("_VR") {
        Some(EngineKind::Vr)
    } else if name.contains("Encode") || name.contains("Codec") {
        Some(EngineKind::Encode)
    } else if name.contains("Decode") {
        Some(EngineKind::Decode)
    } else {
        None
    }
}

/// System CPU percentage from the `_Total` processor instance.
pub fn apply_processor_items(snapshot: &mut SystemSnapshot, items: &[CounterItem]) -> bool {
    if items.is_empty() {
        return false;
    }
    snapshot.system.cpu_pct = items.iter().map(|item| item.value.as_f64()).sum();
    true
}

/// Routes GPU engine utilization items to their roots and the host total.
/// Items whose pid is untracked still land in the host total.
pub fn apply_gpu_engine_items(snapshot: &mut SystemSnapshot, items: &[CounterItem]) -> bool {
    if items.is_empty() {
        return false;
    }

    for sample in snapshot.sample_map.values_mut() {
        sample.gpu_3d_pct = 0.0;
        sample.gpu_vr_pct = 0.0;
        sample.gpu_enc_pct = 0.0;
        sample.gpu_dec_pct = 0.0;
    }
    snapshot.system.gpu_3d_pct = 0.0;
    snapshot.system.gpu_vr_pct = 0.0;
    snapshot.system.gpu_enc_pct = 0.0;
    snapshot.system.gpu_dec_pct = 0.0;

    let SystemSnapshot { system, helper_map, sample_map, .. } = snapshot;
    for item in items {
        let kind = match classify_engine(&item.name) {
            Some(kind) => kind,
            None => continue,
        };
        let value = item.value.as_f64();

        if let Some(pid) = instance_pid(&item.name) {
            if let Some(helper) = helper_map.get(&pid) {
                if let Some(sample) = sample_map.get_mut(&helper.root_pid) {
                    match kind {
                        EngineKind::ThreeD => sample.gpu_3d_pct += value,
                        EngineKind::Vr => sample.gpu_vr_pct += value,
                        EngineKind::Encode => sample.gpu_enc_pct += value,
                        EngineKind::Decode => sample.gpu_dec_pct += value,
                    }
                }
            }
        }

        match kind {
            EngineKind::ThreeD => system.gpu_3d_pct += value,
            EngineKind::Vr => system.gpu_vr_pct += value,
            EngineKind::Encode => system.gpu_enc_pct += value,
            EngineKind::Decode => system.gpu_dec_pct += value,
        }
    }

    true
}

/// Routes GPU dedicated-memory items, then clamps every per-root figure
/// and the host total to the known dedicated memory total.
pub fn apply_gpu_memory_items(snapshot: &mut SystemSnapshot, items: &[CounterItem]) -> bool {
    if items.is_empty() {
        return false;
    }

    for sample in snapshot.sample_map.values_mut() {
        sample.gpu_mem_bytes = 0;
    }
    snapshot.system.gpu_mem_used = 0;

    let SystemSnapshot { system, helper_map, sample_map, .. } = snapshot;
    for item in items {
        let bytes = item.value.as_u64();
        if let Some(pid) = instance_pid(&item.name) {
            if let Some(helper) = helper_map.get(&pid) {
                if let Some(sample) = sample_map.get_mut(&helper.root_pid) {
                    sample.gpu_mem_bytes += bytes;
                }
            }
        }
        system.gpu_mem_used += bytes;
    }

    let total = system.gpu_mem_total;
    if total > 0 {
        for sample in sample_map.values_mut() {
            sample.gpu_mem_bytes = sample.gpu_mem_bytes.min(total);
        }
        system.gpu_mem_used = system.gpu_mem_used.min(total);
    }

    true
}

/// Network byte rates, summed across every interface instance.
pub fn apply_network_items(
    snapshot: &mut SystemSnapshot,
    sent_items: &[CounterItem],
    recv_items: &[CounterItem],
) {
    if !sent_items.is_empty() {
        snapshot.system.net_sent_bps = sent_items.iter().map(|item| item.value.as_f64()).sum();
    }
    if !recv_items.is_empty() {
        snapshot.system.net_recv_bps = recv_items.iter().map(|item| item.value.as_f64()).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CounterValue, ProcessHandle};
    use crate::state::ProcessHelper;

    fn item(name: &str, value: f64) -> CounterItem {
        CounterItem::new(name, CounterValue::Double(value))
    }

    fn large_item(name: &str, value: i64) -> CounterItem {
        CounterItem::new(name, CounterValue::Large(value))
    }

    fn snapshot_with_root(pid: u32) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(pid, true, |_| Some(ProcessHandle::current())));
        snapshot
    }

    #[test]
    fn parses_pid_from_well_formed_instances() {
        assert_eq!(
            instance_pid("pid_25832_luid_0x00000000_0x0000DABC_phys_0_eng_0_engtype_3D"),
            Some(25832)
        );
        assert_eq!(instance_pid("pid_1_luid_0x0_0x0_phys_0"), Some(1));
    }

    #[test]
    fn rejects_malformed_instances() {
        assert_eq!(instance_pid("pid__luid_0x0"), None);
        assert_eq!(instance_pid("pid_abc_luid"), None);
        assert_eq!(instance_pid("25832_luid_0x0"), None);
        assert_eq!(instance_pid("pid_25832"), None);
        assert_eq!(instance_pid(""), None);
    }

    #[test]
    fn classifies_nvidia_engine_names() {
        assert_eq!(classify_engine("pid_1_eng_0_engtype_3D"), Some(EngineKind::ThreeD));
        assert_eq!(classify_engine("pid_1_eng_11_engtype_VR"), Some(EngineKind::Vr));
        assert_eq!(classify_engine("pid_1_eng_7_engtype_VideoEncode"), Some(EngineKind::Encode));
        assert_eq!(classify_engine("pid_1_eng_3_engtype_VideoDecode"), Some(EngineKind::Decode));
        assert_eq!(classify_engine("pid_1_eng_12_engtype_Copy"), None);
        assert_eq!(classify_engine("pid_1_eng_9_engtype_Cuda"), None);
    }

    #[test]
    fn classifies_amd_engine_names() {
        assert_eq!(
            classify_engine("pid_18360_phys_0_eng_1_engtype_High Priority 3D"),
            Some(EngineKind::ThreeD)
        );
        assert_eq!(
            classify_engine("pid_18360_phys_0_eng_14_engtype_Video Codec 0"),
            Some(EngineKind::Encode)
        );
        assert_eq!(
            classify_engine("pid_18360_phys_0_eng_12_engtype_Video Decode 1"),
            Some(EngineKind::Decode)
        );
        assert_eq!(classify_engine("pid_18360_phys_0_eng_3_engtype_True Audio 0"), None);
    }

    #[test]
    fn first_matching_rule_wins() {
        // contains both markers: `_3D` outranks `Decode`
        assert_eq!(classify_engine("eng_0_engtype_3D Decode"), Some(EngineKind::ThreeD));
        // `Encode` outranks `Decode`
        assert_eq!(classify_engine("engtype_EncodeDecode"), Some(EngineKind::Encode));
    }

    #[test]
    fn engine_items_route_to_root_and_system() {
        let mut snapshot = snapshot_with_root(100);
        let items = [
            item("pid_100_luid_0x0_0x0_phys_0_eng_0_engtype_3D", 30.0),
            item("pid_100_luid_0x0_0x0_phys_0_eng_3_engtype_VideoDecode", 10.0),
            item("pid_100_luid_0x0_0x0_phys_0_eng_12_engtype_Copy", 99.0),
        ];
        assert!(apply_gpu_engine_items(&mut snapshot, &items));

        let sample = snapshot.sample_map[&100];
        assert_eq!(sample.gpu_3d_pct, 30.0);
        assert_eq!(sample.gpu_dec_pct, 10.0);
        assert_eq!(sample.gpu_vr_pct, 0.0);
        assert_eq!(snapshot.system.gpu_3d_pct, 30.0);
        assert_eq!(snapshot.system.gpu_dec_pct, 10.0);
    }

    #[test]
    fn engine_items_for_descendants_fold_into_the_root() {
        let mut snapshot = snapshot_with_root(100);
        snapshot
            .helper_map
            .insert(101, ProcessHelper::new(100, ProcessHandle::current()));
        let items = [
            item("pid_100_luid_0x0_0x0_phys_0_eng_0_engtype_3D", 20.0),
            item("pid_101_luid_0x0_0x0_phys_0_eng_0_engtype_3D", 15.0),
        ];
        assert!(apply_gpu_engine_items(&mut snapshot, &items));
        assert_eq!(snapshot.sample_map[&100].gpu_3d_pct, 35.0);
    }

    #[test]
    fn unknown_pids_count_toward_the_system_only() {
        let mut snapshot = snapshot_with_root(100);
        let items = [item("pid_999_luid_0x0_0x0_phys_0_eng_0_engtype_3D", 40.0)];
        assert!(apply_gpu_engine_items(&mut snapshot, &items));
        assert_eq!(snapshot.sample_map[&100].gpu_3d_pct, 0.0);
        assert_eq!(snapshot.system.gpu_3d_pct, 40.0);
    }

    #[test]
    fn engine_percentages_are_not_clamped() {
        let mut snapshot = snapshot_with_root(100);
        let items = [
            item("pid_100_luid_0x0_0x0_phys_0_eng_0_engtype_3D", 90.0),
            item("pid_100_luid_0x0_0x1_phys_1_eng_0_engtype_3D", 85.0),
        ];
        assert!(apply_gpu_engine_items(&mut snapshot, &items));
        assert_eq!(snapshot.sample_map[&100].gpu_3d_pct, 175.0);
        assert_eq!(snapshot.system.gpu_3d_pct, 175.0);
    }

    #[test]
    fn memory_items_route_and_accumulate() {
        let mut snapshot = snapshot_with_root(100);
        snapshot.system.gpu_mem_total = 1 << 30;
        let items = [
            large_item("pid_100_luid_0x0_0x0_phys_0", 1024),
            large_item("pid_999_luid_0x0_0x0_phys_0", 2048),
        ];
        assert!(apply_gpu_memory_items(&mut snapshot, &items));
        assert_eq!(snapshot.sample_map[&100].gpu_mem_bytes, 1024);
        assert_eq!(snapshot.system.gpu_mem_used, 3072);
    }

    #[test]
    fn oversized_memory_items_clamp_to_the_total() {
        let mut snapshot = snapshot_with_root(100);
        snapshot.system.gpu_mem_total = 1000;
        let items = [large_item("pid_100_luid_0x0_0x0_phys_0", 4000)];
        assert!(apply_gpu_memory_items(&mut snapshot, &items));
        assert_eq!(snapshot.sample_map[&100].gpu_mem_bytes, 1000);
        assert_eq!(snapshot.system.gpu_mem_used, 1000);
    }

    #[test]
    fn negative_memory_values_read_as_zero() {
        let mut snapshot = snapshot_with_root(100);
        snapshot.system.gpu_mem_total = 1000;
        let items = [large_item("pid_100_luid_0x0_0x0_phys_0", -5)];
        assert!(apply_gpu_memory_items(&mut snapshot, &items));
        assert_eq!(snapshot.sample_map[&100].gpu_mem_bytes, 0);
        assert_eq!(snapshot.system.gpu_mem_used, 0);
    }

    #[test]
    fn processor_total_is_the_item_sum() {
        let mut snapshot = SystemSnapshot::default();
        assert!(apply_processor_items(&mut snapshot, &[item("_Total", 37.5)]));
        assert_eq!(snapshot.system.cpu_pct, 37.5);
        // an empty read leaves the previous figure alone
        assert!(!apply_processor_items(&mut snapshot, &[]));
        assert_eq!(snapshot.system.cpu_pct, 37.5);
    }

    #[test]
    fn network_rates_sum_across_interfaces() {
        let mut snapshot = SystemSnapshot::default();
        apply_network_items(
            &mut snapshot,
            &[item("Ethernet", 1000.0), item("Wi-Fi", 250.0)],
            &[item("Ethernet", 400.0)],
        );
        assert_eq!(snapshot.system.net_sent_bps, 1250.0);
        assert_eq!(snapshot.system.net_recv_bps, 400.0);
    }
}
