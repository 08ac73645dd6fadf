//! System resource sampling.
//!
//! [`ResourceSampler::sample`] queries the operating system synchronously.
//! CPU usage needs two readings separated by a measurement interval, so a
//! call blocks for roughly that interval. Run it on a blocking thread, never
//! on a request path.

use crate::core::{Result, VigilError};
use crate::metrics::MetricRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};

/// CPU figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuStats {
    pub percent: f64,
    pub count: usize,
}

/// Host memory figures, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_rss: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_vms: Option<u64>,
}

/// Memory held by the current process, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessStats {
    pub rss: u64,
    pub vms: u64,
}

/// Usage of the filesystem holding the configured path, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

/// Cumulative network counters summed over all interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// One resource reading.
///
/// Figures that could not be read are omitted and described in `error`.
/// Network counters are best-effort and never set `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SystemSample {
    /// A sample carrying only an error
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            cpu: None,
            memory: None,
            disk: None,
            network: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// Publish the headline figures as `system.*` gauges
    pub fn publish(&self, registry: &MetricRegistry) {
        if let Some(cpu) = &self.cpu {
            registry.set_gauge("system.cpu.percent", cpu.percent, &[]);
        }
        if let Some(memory) = &self.memory {
            registry.set_gauge("system.memory.percent", memory.percent, &[]);
            if let Some(rss) = memory.process_rss {
                registry.set_gauge("system.memory.process.rss", rss as f64, &[]);
            }
        }
        if let Some(disk) = &self.disk {
            registry.set_gauge("system.disk.percent", disk.percent, &[]);
        }
    }
}

/// Source of operating-system resource figures.
///
/// Every method may block.
pub trait SystemProvider: Send + Sync {
    /// CPU usage over the provider's measurement interval
    fn cpu(&self) -> Result<CpuStats>;
    /// Host memory
    fn memory(&self) -> Result<MemoryStats>;
    /// Memory of the current process
    fn process(&self) -> Result<ProcessStats>;
    /// Disk usage
    fn disk(&self) -> Result<DiskStats>;
    /// Network counters
    fn network(&self) -> Result<NetworkStats>;
}

/// Combines provider readings into a [`SystemSample`], never failing
pub struct ResourceSampler {
    provider: Box<dyn SystemProvider>,
}

impl std::fmt::Debug for ResourceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSampler").finish_non_exhaustive()
    }
}

impl ResourceSampler {
    /// Sample through the given provider
    pub fn new(provider: Box<dyn SystemProvider>) -> Self {
        Self { provider }
    }

    /// Sample the host through `sysinfo`
    pub fn with_sysinfo(disk_path: impl Into<PathBuf>, cpu_interval: Duration) -> Self {
        Self::new(Box::new(SysinfoProvider::new(disk_path, cpu_interval)))
    }

    /// Read every figure. Blocks for the CPU measurement interval.
    pub fn sample(&self) -> SystemSample {
        let mut errors = Vec::new();

        let cpu = keep(self.provider.cpu(), "cpu", &mut errors);
        let memory = keep(self.provider.memory(), "memory", &mut errors).map(|mut memory| {
            if let Some(process) = keep(self.provider.process(), "process", &mut errors) {
                memory.process_rss = Some(process.rss);
                memory.process_vms = Some(process.vms);
            }
            memory
        });
        let disk = keep(self.provider.disk(), "disk", &mut errors);
        let network = match self.provider.network() {
            Ok(network) => Some(network),
            Err(e) => {
                tracing::debug!("Network counters unavailable: {}", e);
                None
            },
        };

        let error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };

        SystemSample {
            cpu,
            memory,
            disk,
            network,
            error,
            timestamp: Utc::now(),
        }
    }
}

fn keep<T>(reading: Result<T>, section: &str, errors: &mut Vec<String>) -> Option<T> {
    match reading {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(section, "System metrics collection failed: {}", e);
            errors.push(format!("{}: {}", section, e));
            None
        },
    }
}

/// [`SystemProvider`] backed by the `sysinfo` crate
pub struct SysinfoProvider {
    system: Mutex<System>,
    disk_path: PathBuf,
    cpu_interval: Duration,
}

impl SysinfoProvider {
    /// Create a provider reporting disk usage for `disk_path`
    pub fn new(disk_path: impl Into<PathBuf>, cpu_interval: Duration) -> Self {
        Self {
            system: Mutex::new(System::new()),
            disk_path: disk_path.into(),
            cpu_interval: cpu_interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

impl SystemProvider for SysinfoProvider {
    fn cpu(&self) -> Result<CpuStats> {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        std::thread::sleep(self.cpu_interval);
        system.refresh_cpu_usage();

        let count = system.cpus().len();
        if count == 0 {
            return Err(VigilError::sampling("no CPUs reported"));
        }
        Ok(CpuStats {
            percent: f64::from(system.global_cpu_usage()),
            count,
        })
    }

    fn memory(&self) -> Result<MemoryStats> {
        let mut system = self.system.lock();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(VigilError::sampling("total memory reported as zero"));
        }
        let available = system.available_memory().min(total);
        Ok(MemoryStats {
            total,
            available,
            percent: (total - available) as f64 / total as f64 * 100.0,
            process_rss: None,
            process_vms: None,
        })
    }

    fn process(&self) -> Result<ProcessStats> {
        let pid = sysinfo::get_current_pid().map_err(VigilError::sampling)?;
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process = system
            .process(pid)
            .ok_or_else(|| VigilError::sampling(format!("process {} not found", pid)))?;
        Ok(ProcessStats {
            rss: process.memory(),
            vms: process.virtual_memory(),
        })
    }

    fn disk(&self) -> Result<DiskStats> {
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|d| self.disk_path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                VigilError::sampling(format!("no disk mounted at {}", self.disk_path.display()))
            })?;

        Ok(disk_stats(disk.total_space(), disk.available_space()))
    }

    fn network(&self) -> Result<NetworkStats> {
        let networks = Networks::new_with_refreshed_list();
        if networks.list().is_empty() {
            return Err(VigilError::sampling("no network interfaces"));
        }

        let mut stats = NetworkStats {
            bytes_sent: 0,
            bytes_recv: 0,
            packets_sent: 0,
            packets_recv: 0,
        };
        for data in networks.list().values() {
            stats.bytes_sent += data.total_transmitted();
            stats.bytes_recv += data.total_received();
            stats.packets_sent += data.total_packets_transmitted();
            stats.packets_recv += data.total_packets_received();
        }
        Ok(stats)
    }
}

fn disk_stats(total: u64, free: u64) -> DiskStats {
    let free = free.min(total);
    let used = total - free;
    let percent = if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    };
    DiskStats {
        total,
        used,
        free,
        percent,
    }
}
