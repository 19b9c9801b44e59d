pub mod counters;
pub mod nvsmi;
pub mod process_tree;
pub mod sampler;
pub mod usage;
pub mod watchdog;
