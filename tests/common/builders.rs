//! Test data builders for creating test objects

use signal_fusion::components::{SignalChannel, SignalPattern, SignalSensor, SignalSource};
use signal_fusion::config::{ErrorPolicy, PipelineConfig, SyncMode, SyncRole};
use std::net::{IpAddr, Ipv4Addr};

/// Builder for pipeline configs with short test timings
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = PipelineConfig::default();
        config.close_timeout_ms = 2000;
        config.sensor_connect_timeout_ms = 5000;
        config.sensor.retry_initial_ms = 10;
        config.sensor.retry_max_ms = 50;
        config.watchdog.sync_interval_ms = 0;
        Self { config }
    }

    pub fn buffer_seconds(mut self, seconds: f64) -> Self {
        self.config.buffer_seconds = seconds;
        self
    }

    pub fn watch_interval_ms(mut self, ms: u64) -> Self {
        self.config.watchdog.watch_interval_ms = ms;
        self
    }

    pub fn close_timeout_ms(mut self, ms: u64) -> Self {
        self.config.close_timeout_ms = ms;
        self
    }

    pub fn stop_on_fatal(mut self) -> Self {
        self.config.error_policy = ErrorPolicy::StopPipeline;
        self
    }

    /// Network sync over loopback on the given ports
    pub fn sync(mut self, mode: SyncMode, role: SyncRole, start_port: u16, clock_port: u16) -> Self {
        let sync = &mut self.config.sync;
        sync.mode = mode;
        sync.role = role;
        sync.master_host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        sync.broadcast_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
        sync.start_port = start_port;
        sync.clock_port = clock_port;
        self
    }

    pub fn sync_interval_ms(mut self, interval_ms: u64, requests: u32) -> Self {
        self.config.sync.interval_ms = interval_ms;
        self.config.sync.requests_per_interval = requests;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated source whose every dimension is the constant `value`
pub fn constant_source(name: &str, rate: f64, dim: usize, value: f64) -> (SignalSensor, SignalChannel) {
    (0..dim)
        .fold(SignalSource::new(name, rate), |source, _| {
            source.with_pattern(SignalPattern::Constant(value))
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .buffer_seconds(4.0)
            .watch_interval_ms(200)
            .build();

        assert_eq!(config.buffer_seconds, 4.0);
        assert_eq!(config.watchdog.watch_interval_ms, 200);
        assert!(config.validate().is_ok());
    }
}
