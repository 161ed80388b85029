use std::path::Path;

use confique::Config;

use crate::error::{Error, Result};
use crate::metrics::MetricKind;

// ─── Configuration tree ──────────────────────────────────────────

/// Static metric toggles, loaded once at startup.
///
/// Every kind the collector emits has a required entry. A file that
/// leaves one out fails to load instead of silently dropping the metric.
#[derive(Debug, Clone, Config)]
pub struct MetricsConfig {
    #[config(nested)]
    pub request_timing: RequestTimingConfig,

    #[config(nested)]
    pub cache: CacheConfig,

    #[config(nested)]
    pub external_service: ExternalServiceConfig,
}

#[derive(Debug, Clone, Config)]
pub struct RequestTimingConfig {
    #[config(nested)]
    pub queue_time: Toggle,
    #[config(nested)]
    pub idle: Toggle,
    #[config(nested)]
    pub request: Toggle,
    #[config(nested)]
    pub response_size: Toggle,
    #[config(nested)]
    pub middleware: Toggle,
    #[config(nested)]
    pub error: Toggle,
    #[config(nested)]
    pub apdex: ApdexConfig,
    #[config(nested)]
    pub route_tracking: Toggle,
}

/// A bare on/off switch for one metric kind.
#[derive(Debug, Clone, Config)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Config)]
pub struct ApdexConfig {
    pub enabled: bool,
    /// Upper bound (seconds) of the satisfied band.
    pub satisfied_threshold: f64,
}

#[derive(Debug, Clone, Config)]
pub struct CacheConfig {
    /// `cache.command` — every command under one name.
    #[config(nested)]
    pub command: Toggle,
    /// `cache.command.<name>` — one series per command name.
    #[config(nested)]
    pub command_specific: Toggle,
}

#[derive(Debug, Clone, Config)]
pub struct ExternalServiceConfig {
    #[config(nested)]
    pub request: Toggle,
}

// ─── Loading / lookup ────────────────────────────────────────────

impl MetricsConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::from_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Everything on, route tracking included.
    pub fn all_enabled(satisfied_threshold: f64) -> Self {
        let on = || Toggle { enabled: true };
        Self {
            request_timing: RequestTimingConfig {
                queue_time: on(),
                idle: on(),
                request: on(),
                response_size: on(),
                middleware: on(),
                error: on(),
                apdex: ApdexConfig {
                    enabled: true,
                    satisfied_threshold,
                },
                route_tracking: on(),
            },
            cache: CacheConfig {
                command: on(),
                command_specific: on(),
            },
            external_service: ExternalServiceConfig { request: on() },
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.request_timing.apdex.satisfied_threshold;
        if !t.is_finite() || t <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "request_timing.apdex.satisfied_threshold must be a positive number of seconds, got {t}"
            )));
        }
        Ok(())
    }

    /// Whether `kind` is switched on.
    pub fn enabled(&self, kind: MetricKind) -> bool {
        let rt = &self.request_timing;
        match kind {
            MetricKind::QueueTime => rt.queue_time.enabled,
            MetricKind::Idle => rt.idle.enabled,
            MetricKind::Request => rt.request.enabled,
            MetricKind::ResponseSize => rt.response_size.enabled,
            MetricKind::Middleware => rt.middleware.enabled,
            MetricKind::Error => rt.error.enabled,
            MetricKind::Apdex => rt.apdex.enabled,
        }
    }

    pub fn route_tracking(&self) -> bool {
        self.request_timing.route_tracking.enabled
    }

    pub fn satisfied_threshold(&self) -> f64 {
        self.request_timing.apdex.satisfied_threshold
    }
}
