//! System usage sampling with `sysinfo`

use serde::Serialize;
use sysinfo::{Components, Networks, ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryPair {
    pub available: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub primary: MemoryPair,
    pub swap: MemoryPair,
}

/// Cumulative bytes read/written by all live processes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiskUsage {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Cumulative counters over all interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NetworkUsage {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// Payload of a `USAGE` sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub timestamp: i64,
    /// Seconds since boot
    pub uptime: u64,
    /// Average CPU usage in percent
    pub cpu: f32,
    pub memory: MemoryUsage,
    pub disk: DiskUsage,
    pub network: NetworkUsage,
    /// Average component temperature, when sensors are available
    pub temperature: Option<f32>,
}

/// Keeps `sysinfo` state between samples so CPU usage has a baseline
pub struct UsageSampler {
    system: System,
}

impl UsageSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();

        Self { system }
    }

    pub fn sample(&mut self) -> UsageReport {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let disk = self
            .system
            .processes()
            .values()
            .map(|process| process.disk_usage())
            .fold(DiskUsage::default(), |acc, usage| DiskUsage {
                read_bytes: acc.read_bytes.saturating_add(usage.total_read_bytes),
                write_bytes: acc.write_bytes.saturating_add(usage.total_written_bytes),
            });

        // Interface counters are totals since boot, a fresh list is enough.
        let networks = Networks::new_with_refreshed_list();
        let network = networks
            .list()
            .values()
            .fold(NetworkUsage::default(), |acc, data| NetworkUsage {
                bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
                bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
                packets_sent: acc
                    .packets_sent
                    .saturating_add(data.total_packets_transmitted()),
                packets_recv: acc
                    .packets_recv
                    .saturating_add(data.total_packets_received()),
            });

        let components = Components::new_with_refreshed_list();
        let temperatures: Vec<f32> = components
            .iter()
            .filter_map(|component| component.temperature())
            .filter(|t| t.is_finite())
            .collect();

        UsageReport {
            timestamp: crate::util::unix_timestamp(),
            uptime: System::uptime(),
            cpu: self.system.global_cpu_usage(),
            memory: MemoryUsage {
                primary: MemoryPair {
                    available: self.system.available_memory(),
                    total: self.system.total_memory(),
                },
                swap: MemoryPair {
                    available: self.system.free_swap(),
                    total: self.system.total_swap(),
                },
            },
            disk,
            network,
            temperature: average(&temperatures),
        }
    }
}

impl Default for UsageSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn average(values: &[f32]) -> Option<f32> {
    (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
}
