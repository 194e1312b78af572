//! Construction-time knobs.

use std::time::Duration;

/// Tuning for [`ImagePipeline`](crate::pipeline::ImagePipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fetch permits per logical CPU. The permit pool bounds concurrently
    /// running fetches; excess fetches queue rather than fail.
    pub permits_per_cpu: usize,

    /// Explicit permit pool size, overriding the per-CPU derivation.
    pub fetch_permits: Option<usize>,

    /// Request timeout applied by the default HTTP loader.
    pub http_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            permits_per_cpu: 2,
            fetch_permits: None,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn fetch_permits(&self) -> usize {
        self.fetch_permits
            .unwrap_or_else(|| (num_cpus::get() * self.permits_per_cpu).max(1))
    }
}
