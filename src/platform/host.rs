use sysinfo::{CpuExt, CpuRefreshKind, DiskExt, RefreshKind, System, SystemExt};

/// Flat host totals: CPU count, RAM, disk, and the per-core fallback for
/// the system CPU percentage.
pub struct HostProbe {
    sys: System,
}

impl HostProbe {
    pub fn new() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory()
                .with_disks_list(),
        );
        sys.refresh_cpu();
        Self { sys }
    }

    pub fn cpu_count(&self) -> u64 {
        self.sys.cpus().len() as u64
    }

    /// `(total, used)` physical memory in bytes.
    pub fn memory_usage(&mut self) -> (u64, u64) {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        (total, total.saturating_sub(self.sys.available_memory()))
    }

    /// `(total, used)` bytes summed over every mounted disk.
    pub fn disk_usage(&mut self) -> (u64, u64) {
        self.sys.refresh_disks_list();
        self.sys.refresh_disks();
        let mut total = 0u64;
        let mut used = 0u64;
        for disk in self.sys.disks() {
            total += disk.total_space();
            used += disk.total_space().saturating_sub(disk.available_space());
        }
        (total, used)
    }

    /// Arithmetic mean of the per-core usage percentages. The `_Total`
    /// processor counter instance is already averaged across cores; this
    /// fallback matches that, not the sum.
    pub fn cpu_mean_percent(&mut self) -> f64 {
        self.sys.refresh_cpu();
        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}
