//! Top-level engine instance.
//!
//! One `HookEngine` exists per process. It owns the only `SessionRegistry`
//! and `SynthesisBridge`, and exposes the hot-path composites the hook
//! wrappers call on capture delivery. The host application drives all
//! execution; delivery runs on whatever thread its audio subsystem uses, so
//! nothing here blocks on unrelated work while a registry lock is held.

use std::sync::Arc;

use crate::models::config::EngineConfig;
use crate::models::error::HookError;
use crate::models::session::{CallbackBinding, QueueId, SampleFormat, SessionInfo};
use crate::registry::SessionRegistry;
use crate::synthesis::SynthesisBridge;
use crate::traits::pcm_provider::PcmProvider;

pub struct HookEngine {
    config: EngineConfig,
    registry: SessionRegistry,
    bridge: SynthesisBridge,
}

impl HookEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let registry =
            SessionRegistry::new(config.fallback_sample_rate, config.fallback_channel_count);
        Self {
            config,
            registry,
            bridge: SynthesisBridge::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn bridge(&self) -> &SynthesisBridge {
        &self.bridge
    }

    /// Bind the external replacement-PCM provider. One binding per process.
    pub fn bind_provider(&self, provider: Arc<dyn PcmProvider>) -> Result<(), HookError> {
        self.bridge.bind_provider(provider)
    }

    /// Overwrite `frames` frames of a session's delivered capture data.
    ///
    /// Touches exactly `frames × channels × sample width` bytes. For
    /// floating-point sessions the replacement is synthesized as 16-bit PCM
    /// and normalized into the caller's buffer.
    ///
    /// # Safety
    ///
    /// `data` must point to at least `frames × bytes_per_frame` writable
    /// bytes for the duration of the call, suitably aligned for the
    /// session's sample format.
    pub unsafe fn overwrite_frames(&self, info: &SessionInfo, data: *mut u8, frames: i32) {
        if data.is_null() || frames <= 0 {
            return;
        }
        let samples = frames as usize * info.channel_count as usize;
        match info.format {
            SampleFormat::Int16 => {
                let buf = std::slice::from_raw_parts_mut(data, samples * 2);
                self.bridge
                    .synthesize(buf, info.sample_rate, info.channel_count);
            }
            SampleFormat::Float32 => {
                let buf = std::slice::from_raw_parts_mut(data as *mut f32, samples);
                self.bridge
                    .synthesize_f32(buf, info.sample_rate, info.channel_count);
            }
        }
    }

    /// Handle a buffer-queue readiness notification.
    ///
    /// Overwrites the remembered last-submitted region first, then hands
    /// back the application binding for the caller to invoke, so the
    /// original callback observes synthetic data when it consumes and
    /// re-submits the buffer. Returns `None` for untracked queues, which
    /// are treated as not-an-input-session.
    ///
    /// # Safety
    ///
    /// The region last recorded via `record_enqueued_buffer` must still be
    /// valid writable memory. The driver guarantees this between submission
    /// and the readiness notification of the queue being notified.
    pub unsafe fn on_queue_ready(&self, queue: QueueId) -> Option<CallbackBinding> {
        let info = self.registry.queue_info(queue)?;
        if info.last_buffer != 0 && info.last_buffer_len > 0 {
            let buf =
                std::slice::from_raw_parts_mut(info.last_buffer as *mut u8, info.last_buffer_len);
            self.bridge
                .synthesize(buf, info.sample_rate, info.channel_count);
        }
        Some(info.binding)
    }

    /// Retire a destroyed object's binding and any queue wired to it.
    pub fn on_object_destroyed(&self, object: usize) {
        if let Some(binding) = self.registry.remove_recorder_object(object) {
            if let Some(queue) = binding.queue {
                self.registry.remove_queue(queue);
            }
        }
    }
}

impl Default for HookEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::ProviderError;
    use crate::models::session::RecorderObjectBinding;
    use crate::traits::pcm_provider::FillStatus;
    use approx::assert_abs_diff_eq;

    struct PatternProvider;

    impl PcmProvider for PatternProvider {
        fn fill(&self, buffer: &mut [u8], _: i32, _: i32) -> Result<FillStatus, ProviderError> {
            for (i, b) in buffer.iter_mut().enumerate() {
                *b = (i % 251) as u8;
            }
            Ok(FillStatus::Filled(buffer.len()))
        }
    }

    struct ZeroProvider;

    impl PcmProvider for ZeroProvider {
        fn fill(&self, buffer: &mut [u8], _: i32, _: i32) -> Result<FillStatus, ProviderError> {
            buffer.fill(0);
            Ok(FillStatus::Filled(buffer.len()))
        }
    }

    struct DisabledProvider;

    impl PcmProvider for DisabledProvider {
        fn fill(&self, _: &mut [u8], _: i32, _: i32) -> Result<FillStatus, ProviderError> {
            Ok(FillStatus::Disabled)
        }
    }

    fn engine_with(provider: impl PcmProvider + 'static) -> HookEngine {
        let engine = HookEngine::new();
        engine.bind_provider(Arc::new(provider)).unwrap();
        engine
    }

    #[test]
    fn int16_substitution_touches_exactly_the_frame_bytes() {
        let engine = engine_with(PatternProvider);
        let info = SessionInfo {
            is_input: true,
            sample_rate: 44_100,
            channel_count: 1,
            format: SampleFormat::Int16,
        };

        // 256 mono Int16 frames = 512 bytes, plus a guard tail.
        let mut buf = vec![0xEEu8; 512 + 16];
        unsafe { engine.overwrite_frames(&info, buf.as_mut_ptr(), 256) };

        for (i, &b) in buf[..512].iter().enumerate() {
            assert_eq!(b, (i % 251) as u8);
        }
        assert!(buf[512..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn float32_stereo_zero_payload_yields_zero_samples() {
        let engine = engine_with(ZeroProvider);
        let info = SessionInfo {
            is_input: true,
            sample_rate: 48_000,
            channel_count: 2,
            format: SampleFormat::Float32,
        };

        let mut samples = vec![0.7f32; 128 * 2];
        unsafe { engine.overwrite_frames(&info, samples.as_mut_ptr() as *mut u8, 128) };

        for &s in &samples {
            assert_abs_diff_eq!(s, 0.0);
        }
    }

    #[test]
    fn disabled_provider_is_full_passthrough() {
        let engine = engine_with(DisabledProvider);
        let info = SessionInfo {
            is_input: true,
            sample_rate: 44_100,
            channel_count: 2,
            format: SampleFormat::Int16,
        };

        let mut buf = vec![0x42u8; 1024];
        unsafe { engine.overwrite_frames(&info, buf.as_mut_ptr(), 256) };
        assert!(buf.iter().all(|&b| b == 0x42));
    }

    #[test]
    fn non_positive_frame_count_is_ignored() {
        let engine = engine_with(PatternProvider);
        let info = SessionInfo {
            is_input: true,
            sample_rate: 44_100,
            channel_count: 1,
            format: SampleFormat::Int16,
        };

        let mut buf = vec![0x11u8; 64];
        unsafe {
            engine.overwrite_frames(&info, buf.as_mut_ptr(), 0);
            engine.overwrite_frames(&info, buf.as_mut_ptr(), -3);
        }
        assert!(buf.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn queue_notification_overwrites_remembered_buffer() {
        let engine = engine_with(PatternProvider);
        let registry = engine.registry();
        let queue = 0x90;

        registry.mark_recorder_queue(queue, 16_000, 1);
        let binding = CallbackBinding {
            callback: 0x1234,
            context: 0x5678,
        };
        assert!(registry.bind_queue_callback(queue, binding));

        let mut submitted = vec![0u8; 320];
        registry.record_enqueued_buffer(queue, submitted.as_mut_ptr() as usize, submitted.len());

        let returned = unsafe { engine.on_queue_ready(queue) }.unwrap();
        assert_eq!(returned, binding);
        for (i, &b) in submitted.iter().enumerate() {
            assert_eq!(b, (i % 251) as u8);
        }
    }

    #[test]
    fn queue_notification_without_submitted_buffer_still_yields_binding() {
        let engine = engine_with(PatternProvider);
        let registry = engine.registry();
        registry.mark_recorder_queue(0x91, 16_000, 1);
        let binding = CallbackBinding {
            callback: 0x1234,
            context: 0,
        };
        registry.bind_queue_callback(0x91, binding);

        assert_eq!(unsafe { engine.on_queue_ready(0x91) }, Some(binding));
    }

    #[test]
    fn unknown_queue_notification_is_ignored() {
        let engine = engine_with(PatternProvider);
        assert!(unsafe { engine.on_queue_ready(0x99) }.is_none());
    }

    #[test]
    fn destroyed_object_retires_attached_queue() {
        let engine = engine_with(PatternProvider);
        let registry = engine.registry();

        registry.insert_recorder_object(
            0xA0,
            RecorderObjectBinding {
                sample_rate_millihz: 16_000_000,
                channel_count: 1,
                queue: None,
            },
        );
        registry.mark_recorder_queue(0xB0, 16_000, 1);
        registry.attach_queue_to_object(0xA0, 0xB0);

        engine.on_object_destroyed(0xA0);
        assert!(!registry.is_recorder_queue(0xB0));
        assert!(registry.recorder_object(0xA0).is_none());
    }
}
