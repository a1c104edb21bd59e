/// Configuration for the interception engine.
///
/// Plain data, validated once at initialization.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate substituted when a session reports a non-positive rate
    /// (default: 44100 Hz).
    pub fallback_sample_rate: i32,

    /// Channel count substituted when a session reports a non-positive
    /// count (default: 1).
    pub fallback_channel_count: i32,

    /// PCM rate in milliHz of the disposable probe recorder used for
    /// dispatch-table resolution (default: 16 kHz).
    pub probe_sample_rate_millihz: u32,

    /// Channel count of the probe recorder (default: 1).
    pub probe_channel_count: u16,

    /// Install the blocking-read / data-callback stream hook family.
    pub enable_stream_hooks: bool,

    /// Install the callback/buffer-queue recorder hook family.
    pub enable_queue_hooks: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.fallback_sample_rate <= 0 {
            return Err("fallback sample rate must be positive".into());
        }
        if self.fallback_channel_count <= 0 {
            return Err("fallback channel count must be positive".into());
        }
        if self.probe_sample_rate_millihz == 0 {
            return Err("probe sample rate must be positive".into());
        }
        if self.probe_channel_count == 0 {
            return Err("probe channel count must be positive".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_sample_rate: 44_100,
            fallback_channel_count: 1,
            probe_sample_rate_millihz: 16_000_000,
            probe_channel_count: 1,
            enable_stream_hooks: true,
            enable_queue_hooks: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_fallback_rate_is_rejected() {
        let config = EngineConfig {
            fallback_sample_rate: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
