use serde::Serialize;

/// Per-root figures for the last completed sample.
///
/// Engine percentages are sums over engine instances and may exceed 100;
/// they are reported as measured. `gpu_mem_bytes` is clamped to the
/// system's dedicated video memory total.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct ProcessResource {
    pub cpu_pct: f64,
    pub ram_bytes: u64,
    pub gpu_3d_pct: f64,
    pub gpu_vr_pct: f64,
    pub gpu_enc_pct: f64,
    pub gpu_dec_pct: f64,
    pub gpu_mem_bytes: u64,
}

impl std::ops::AddAssign<&ProcessResource> for ProcessResource {
    fn add_assign(&mut self, other: &ProcessResource) {
        self.cpu_pct += other.cpu_pct;
        self.ram_bytes += other.ram_bytes;
        self.gpu_3d_pct += other.gpu_3d_pct;
        self.gpu_vr_pct += other.gpu_vr_pct;
        self.gpu_enc_pct += other.gpu_enc_pct;
        self.gpu_dec_pct += other.gpu_dec_pct;
        self.gpu_mem_bytes += other.gpu_mem_bytes;
    }
}

/// Host-wide figures for the last completed sample.
#[derive(Serialize, Clone, Copy, Debug, Default)]
pub struct SystemResource {
    pub cpu_count: u64,
    pub cpu_pct: f64,
    pub ram_used: u64,
    pub ram_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
    pub net_sent_bps: f64,
    pub net_recv_bps: f64,
    pub gpu_count: u64,
    pub gpu_3d_pct: f64,
    pub gpu_vr_pct: f64,
    pub gpu_enc_pct: f64,
    pub gpu_dec_pct: f64,
    pub gpu_mem_used: u64,
    pub gpu_mem_total: u64,
    pub gpu_temperature_c: i64,
}

/// One enumerated graphics adapter. Software adapters are excluded.
#[derive(Serialize, Clone, Debug)]
pub struct GraphicsCard {
    pub name: String,
    pub dedicated_memory_bytes: u64,
}
