use resource_monitor::ResourceMonitor;

#[test]
fn uninitialised_monitor_fails_every_operation() {
    let monitor = ResourceMonitor::new();
    assert!(!monitor.append_process(std::process::id(), false));
    assert!(!monitor.remove_process(std::process::id()));
    assert!(monitor.get_process_resource(std::process::id()).is_none());
    assert!(monitor.get_system_resource().is_none());
    assert!(monitor.get_graphics_cards().is_none());
}

#[test]
fn shutdown_without_init_is_harmless() {
    let mut monitor = ResourceMonitor::new();
    monitor.shutdown();
    monitor.shutdown();
}

#[cfg(not(windows))]
#[test]
fn init_fails_off_windows() {
    let mut monitor = ResourceMonitor::new();
    assert!(!monitor.init());
    assert!(monitor.get_system_resource().is_none());
}

#[cfg(windows)]
mod windows {
    use super::*;

    #[test]
    fn registration_contract() {
        let mut monitor = ResourceMonitor::new();
        assert!(monitor.init());

        let me = std::process::id();
        assert!(monitor.append_process(me, false));
        // idempotent re-registration
        assert!(monitor.append_process(me, true));

        assert!(!monitor.append_process(0, false));
        assert!(!monitor.remove_process(0));
        // a pid that cannot exist
        assert!(!monitor.append_process(999_999_999, false));
        assert!(!monitor.remove_process(999_999_999));
        assert!(monitor.get_process_resource(999_999_999).is_none());

        assert!(monitor.remove_process(me));
        assert!(monitor.get_process_resource(me).is_none());

        monitor.shutdown();
        assert!(!monitor.append_process(me, false));
    }

    #[test]
    fn system_snapshot_is_populated_at_init() {
        let mut monitor = ResourceMonitor::new();
        assert!(monitor.init());

        let system = monitor.get_system_resource().unwrap();
        assert!(system.cpu_count >= 1);
        assert!(system.ram_total > 0);
        assert!(system.ram_used <= system.ram_total);
        assert!(system.gpu_mem_used <= system.gpu_mem_total || system.gpu_mem_total == 0);

        let cards = monitor.get_graphics_cards().unwrap();
        assert_eq!(system.gpu_count as usize, cards.len());
    }

    // two full sampler ticks
    #[test]
    #[ignore = "takes over ten seconds of wall time"]
    fn samples_the_current_process() {
        let mut monitor = ResourceMonitor::new();
        assert!(monitor.init());

        let me = std::process::id();
        assert!(monitor.append_process(me, false));
        std::thread::sleep(std::time::Duration::from_secs(
            2 * resource_monitor::TICK_INTERVAL_SECS as u64 + 1,
        ));

        let usage = monitor.get_process_resource(me).unwrap();
        let system = monitor.get_system_resource().unwrap();
        assert!(usage.cpu_pct.is_finite());
        assert!(usage.cpu_pct >= 0.0);
        assert!(usage.cpu_pct <= 100.0 * system.cpu_count as f64);
        assert!(usage.ram_bytes > 0);
        assert!(usage.gpu_mem_bytes <= system.gpu_mem_total || system.gpu_mem_total == 0);

        monitor.shutdown();
    }
}
