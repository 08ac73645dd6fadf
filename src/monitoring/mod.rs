//! Host resource sampling and collaborator health checks.

pub mod health;
pub mod system;

pub use health::{run_probes, HealthProbe, HealthReport, ServiceStatus, TcpProbe};
pub use system::{
    CpuStats, DiskStats, MemoryStats, NetworkStats, ProcessStats, ResourceSampler,
    SysinfoProvider, SystemProvider, SystemSample,
};
