//! Host resource sampling
//!
//! The ramp controller samples host CPU, memory and load after every batch
//! through the [`HostSampler`] capability. A `/proc` based implementation is
//! provided for Linux hosts.

mod procfs;

pub use procfs::ProcHostSampler;

use crate::models::HostSnapshot;
use anyhow::Result;
use async_trait::async_trait;

/// Capability that reports current host resource usage
#[async_trait]
pub trait HostSampler: Send + Sync {
    /// Take a reference reading so the first sample covers only the run
    async fn prime(&self) -> Result<()> {
        Ok(())
    }

    async fn sample(&self) -> Result<HostSnapshot>;
}

/// Sampler that always reports an idle host
///
/// Used where host pressure must not influence the verdict.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHostSampler;

#[async_trait]
impl HostSampler for NullHostSampler {
    async fn sample(&self) -> Result<HostSnapshot> {
        Ok(HostSnapshot::default())
    }
}
