//! Managed-runtime bridge to the replacement-PCM generator.

use jni::objects::{GlobalRef, JByteArray, JClass, JValue};
use jni::{JNIEnv, JavaVM};

use micswap_core::{FillStatus, PcmProvider, ProviderError};

const FILL_METHOD: &str = "fillNativeBuffer";
const FILL_SIGNATURE: &str = "([BIII)I";

/// `PcmProvider` that calls the managed side's static
/// `fillNativeBuffer(byte[], int, int, int)`.
///
/// Capture delivery runs on audio-driver threads with no pre-existing
/// runtime presence, so every call attaches the thread on first use.
/// `attach_current_thread_permanently` reuses an existing attachment and
/// its thread-local guard detaches at thread exit only threads it attached
/// itself; a thread the runtime already owned is never detached from under
/// it.
pub struct JavaPcmProvider {
    vm: JavaVM,
    hook_class: GlobalRef,
}

impl JavaPcmProvider {
    /// `hook_class` must be a global reference to the class carrying the
    /// fill method; it is pinned for the provider's lifetime so lookups
    /// stay valid on threads with no application classloader.
    pub fn new(vm: JavaVM, hook_class: GlobalRef) -> Self {
        Self { vm, hook_class }
    }

    fn call_fill(
        &self,
        env: &mut JNIEnv,
        buffer: &mut [u8],
        sample_rate: i32,
        channel_count: i32,
    ) -> Result<FillStatus, ProviderError> {
        let size = buffer.len() as i32;
        let array: JByteArray = match env.new_byte_array(size) {
            Ok(array) => array,
            Err(e) => {
                let _ = env.exception_clear();
                return Err(ProviderError::CallFailed(format!(
                    "byte array allocation failed: {e}"
                )));
            }
        };

        let class = <&JClass>::from(self.hook_class.as_obj());
        let result = env.call_static_method(
            class,
            FILL_METHOD,
            FILL_SIGNATURE,
            &[
                JValue::Object(&array),
                JValue::Int(size),
                JValue::Int(sample_rate),
                JValue::Int(channel_count),
            ],
        );

        if env.exception_check().unwrap_or(false) {
            let _ = env.exception_describe();
            let _ = env.exception_clear();
            return Err(ProviderError::CallFailed(
                "provider raised an exception".into(),
            ));
        }

        let filled = result
            .and_then(|v| v.i())
            .map_err(|e| ProviderError::CallFailed(e.to_string()))?;
        if filled < 0 {
            // Negative sentinel: substitution disabled, leave the caller's
            // data untouched.
            return Ok(FillStatus::Disabled);
        }

        // SAFETY: i8 and u8 have identical layout; the region copy writes
        // exactly buffer.len() bytes.
        let signed =
            unsafe { std::slice::from_raw_parts_mut(buffer.as_mut_ptr() as *mut i8, buffer.len()) };
        if let Err(e) = env.get_byte_array_region(&array, 0, signed) {
            let _ = env.exception_clear();
            return Err(ProviderError::CallFailed(format!(
                "payload copy-back failed: {e}"
            )));
        }
        Ok(FillStatus::Filled(buffer.len()))
    }
}

impl PcmProvider for JavaPcmProvider {
    fn fill(
        &self,
        buffer: &mut [u8],
        sample_rate: i32,
        channel_count: i32,
    ) -> Result<FillStatus, ProviderError> {
        let mut env = self
            .vm
            .attach_current_thread_permanently()
            .map_err(|e| ProviderError::AttachFailed(e.to_string()))?;
        self.call_fill(&mut env, buffer, sample_rate, channel_count)
    }
}
