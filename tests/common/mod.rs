//! Common test utilities and fixtures.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use vigil_lib::core::{Result, VigilError};
use vigil_lib::monitoring::{
    CpuStats, DiskStats, MemoryStats, NetworkStats, ProcessStats, ResourceSampler, SystemProvider,
};

/// Host readings the tests can change between evaluations.
#[derive(Debug, Clone)]
pub struct HostReadings {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub fail_disk: bool,
}

impl Default for HostReadings {
    fn default() -> Self {
        Self {
            cpu_percent: 10.0,
            memory_percent: 30.0,
            disk_percent: 50.0,
            fail_disk: false,
        }
    }
}

/// [`SystemProvider`] returning whatever [`HostReadings`] currently hold.
pub struct FakeHost {
    readings: Arc<Mutex<HostReadings>>,
}

impl SystemProvider for FakeHost {
    fn cpu(&self) -> Result<CpuStats> {
        Ok(CpuStats {
            percent: self.readings.lock().cpu_percent,
            count: 8,
        })
    }

    fn memory(&self) -> Result<MemoryStats> {
        let percent = self.readings.lock().memory_percent;
        Ok(MemoryStats {
            total: 16_000,
            available: (16_000.0 * (100.0 - percent) / 100.0) as u64,
            percent,
            process_rss: None,
            process_vms: None,
        })
    }

    fn process(&self) -> Result<ProcessStats> {
        Ok(ProcessStats {
            rss: 4096,
            vms: 8192,
        })
    }

    fn disk(&self) -> Result<DiskStats> {
        let readings = self.readings.lock();
        if readings.fail_disk {
            return Err(VigilError::sampling("disk query failed"));
        }
        Ok(DiskStats {
            total: 1000,
            used: (readings.disk_percent * 10.0) as u64,
            free: 1000 - (readings.disk_percent * 10.0) as u64,
            percent: readings.disk_percent,
        })
    }

    fn network(&self) -> Result<NetworkStats> {
        Ok(NetworkStats {
            bytes_sent: 1,
            bytes_recv: 2,
            packets_sent: 3,
            packets_recv: 4,
        })
    }
}

/// A sampler over a fake host plus the handle to change its readings.
pub fn fake_sampler() -> (Arc<Mutex<HostReadings>>, ResourceSampler) {
    let readings = Arc::new(Mutex::new(HostReadings::default()));
    let sampler = ResourceSampler::new(Box::new(FakeHost {
        readings: Arc::clone(&readings),
    }));
    (readings, sampler)
}
