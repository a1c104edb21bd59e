//! Replacement-PCM policy around the external provider.

use std::sync::{Arc, OnceLock};

use crate::models::error::HookError;
use crate::processing::pcm;
use crate::traits::pcm_provider::{FillStatus, PcmProvider};

/// Outcome of a substitution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesis {
    /// The caller's buffer now holds `n` bytes of replacement audio
    /// (synthetic PCM, or silence when the provider was unavailable).
    Replaced(usize),
    /// The provider declined; the caller's buffer was left untouched.
    Passthrough,
}

/// Policy wrapper around the external PCM provider.
///
/// Provider unbound → silence. Provider disabled → passthrough, buffer
/// untouched. Provider failure → cleared and degraded to silence. Real
/// captured audio reaching the application is the worst case, never an
/// error escaping into the intercepted call.
pub struct SynthesisBridge {
    provider: OnceLock<Arc<dyn PcmProvider>>,
}

impl SynthesisBridge {
    pub fn new() -> Self {
        Self {
            provider: OnceLock::new(),
        }
    }

    /// Bind the external provider. One binding per process.
    pub fn bind_provider(&self, provider: Arc<dyn PcmProvider>) -> Result<(), HookError> {
        self.provider
            .set(provider)
            .map_err(|_| HookError::ProviderAlreadyBound)
    }

    pub fn is_bound(&self) -> bool {
        self.provider.get().is_some()
    }

    /// Fill `buffer` with replacement 16-bit PCM.
    pub fn synthesize(&self, buffer: &mut [u8], sample_rate: i32, channel_count: i32) -> Synthesis {
        if buffer.is_empty() {
            return Synthesis::Replaced(0);
        }
        let Some(provider) = self.provider.get() else {
            buffer.fill(0);
            return Synthesis::Replaced(buffer.len());
        };
        match provider.fill(buffer, sample_rate, channel_count) {
            Ok(FillStatus::Filled(_)) => Synthesis::Replaced(buffer.len()),
            Ok(FillStatus::Disabled) => Synthesis::Passthrough,
            Err(e) => {
                log::warn!("PCM provider failed, substituting silence: {e}");
                buffer.fill(0);
                Synthesis::Replaced(buffer.len())
            }
        }
    }

    /// Fill a floating-point buffer by synthesizing the equivalent sample
    /// count as 16-bit PCM and normalizing into `buffer`. Untouched on
    /// passthrough.
    pub fn synthesize_f32(
        &self,
        buffer: &mut [f32],
        sample_rate: i32,
        channel_count: i32,
    ) -> Synthesis {
        if buffer.is_empty() {
            return Synthesis::Replaced(0);
        }
        let mut staging = vec![0u8; buffer.len() * 2];
        match self.synthesize(&mut staging, sample_rate, channel_count) {
            Synthesis::Passthrough => Synthesis::Passthrough,
            Synthesis::Replaced(_) => {
                pcm::i16_bytes_to_f32(&staging, buffer);
                Synthesis::Replaced(std::mem::size_of_val(buffer))
            }
        }
    }
}

impl Default for SynthesisBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::ProviderError;
    use approx::assert_abs_diff_eq;

    /// Deterministic byte pattern, offset by a seed.
    struct PatternProvider(u8);

    impl PcmProvider for PatternProvider {
        fn fill(
            &self,
            buffer: &mut [u8],
            _sample_rate: i32,
            _channel_count: i32,
        ) -> Result<FillStatus, ProviderError> {
            for (i, b) in buffer.iter_mut().enumerate() {
                *b = self.0.wrapping_add(i as u8);
            }
            Ok(FillStatus::Filled(buffer.len()))
        }
    }

    struct DisabledProvider;

    impl PcmProvider for DisabledProvider {
        fn fill(&self, _: &mut [u8], _: i32, _: i32) -> Result<FillStatus, ProviderError> {
            Ok(FillStatus::Disabled)
        }
    }

    struct FailingProvider;

    impl PcmProvider for FailingProvider {
        fn fill(&self, buffer: &mut [u8], _: i32, _: i32) -> Result<FillStatus, ProviderError> {
            // Scribble before failing; the bridge must erase this.
            buffer.fill(0x7F);
            Err(ProviderError::CallFailed("backend gone".into()))
        }
    }

    /// Provider whose payload happens to be all zero (distinct from the
    /// silence fallback path).
    struct ZeroProvider;

    impl PcmProvider for ZeroProvider {
        fn fill(&self, buffer: &mut [u8], _: i32, _: i32) -> Result<FillStatus, ProviderError> {
            buffer.fill(0);
            Ok(FillStatus::Filled(buffer.len()))
        }
    }

    fn bridge_with(provider: impl PcmProvider + 'static) -> SynthesisBridge {
        let bridge = SynthesisBridge::new();
        bridge.bind_provider(Arc::new(provider)).unwrap();
        bridge
    }

    #[test]
    fn unbound_bridge_fills_silence() {
        let bridge = SynthesisBridge::new();
        let mut buf = vec![0xAA; 64];
        assert_eq!(bridge.synthesize(&mut buf, 44_100, 1), Synthesis::Replaced(64));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn provider_payload_replaces_buffer() {
        let bridge = bridge_with(PatternProvider(7));
        let mut buf = vec![0u8; 512];
        assert_eq!(bridge.synthesize(&mut buf, 44_100, 1), Synthesis::Replaced(512));
        assert_eq!(buf[0], 7);
        assert_eq!(buf[255], 7u8.wrapping_add(255));
    }

    #[test]
    fn disabled_provider_leaves_buffer_untouched() {
        let bridge = bridge_with(DisabledProvider);
        let mut buf = vec![0x5A; 1024];
        assert_eq!(bridge.synthesize(&mut buf, 44_100, 1), Synthesis::Passthrough);
        assert!(buf.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn failing_provider_degrades_to_silence() {
        let bridge = bridge_with(FailingProvider);
        let mut buf = vec![0x33; 128];
        assert_eq!(bridge.synthesize(&mut buf, 44_100, 1), Synthesis::Replaced(128));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_buffer_is_a_no_op() {
        let bridge = bridge_with(PatternProvider(0));
        let mut buf = [0u8; 0];
        assert_eq!(bridge.synthesize(&mut buf, 44_100, 1), Synthesis::Replaced(0));
    }

    #[test]
    fn rebinding_provider_is_rejected() {
        let bridge = bridge_with(DisabledProvider);
        assert_eq!(
            bridge.bind_provider(Arc::new(DisabledProvider)),
            Err(HookError::ProviderAlreadyBound)
        );
    }

    #[test]
    fn f32_zero_payload_normalizes_to_zero() {
        let bridge = bridge_with(ZeroProvider);
        let mut out = vec![1.0f32; 256];
        assert_eq!(
            bridge.synthesize_f32(&mut out, 48_000, 2),
            Synthesis::Replaced(1024)
        );
        for &s in &out {
            assert_abs_diff_eq!(s, 0.0);
        }
    }

    #[test]
    fn f32_passthrough_leaves_floats_untouched() {
        let bridge = bridge_with(DisabledProvider);
        let mut out = vec![0.25f32; 64];
        assert_eq!(bridge.synthesize_f32(&mut out, 48_000, 2), Synthesis::Passthrough);
        assert!(out.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn f32_samples_stay_normalized() {
        let bridge = bridge_with(PatternProvider(0x9C));
        let mut out = vec![0.0f32; 333];
        bridge.synthesize_f32(&mut out, 44_100, 1);
        assert!(out.iter().all(|&s| (-1.0..1.0).contains(&s)));
    }
}
