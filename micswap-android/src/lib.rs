//! # micswap-android
//!
//! Android interception backend for micswap.
//!
//! Provides:
//! - `aaudio_hooks` — blocking-read and data-callback interception on the
//!   exported entry points of libaaudio.so
//! - `opensles_hooks` — buffer-queue interception on libOpenSLES.so, with
//!   dispatch-table resolution via a disposable probe recorder
//! - `FridaInstaller` — inline-patch backend behind the `HookInstaller` seam
//! - `JavaPcmProvider` and the JNI entry points the managed side loads
//!
//! ## Platform requirements
//! - Android 8.0+ (API 26) for AAudio; OpenSL ES is present on all
//!   supported releases
//! - The managed side must expose a static
//!   `int fillNativeBuffer(byte[], int, int, int)` on the class passed to
//!   `nativeInit`

#[cfg(target_os = "android")]
pub mod aaudio_hooks;
#[cfg(target_os = "android")]
pub mod installer;
#[cfg(target_os = "android")]
pub mod jni_exports;
#[cfg(target_os = "android")]
pub mod jni_provider;
#[cfg(target_os = "android")]
pub mod opensles_hooks;

#[cfg(target_os = "android")]
pub use installer::FridaInstaller;
#[cfg(target_os = "android")]
pub use jni_provider::JavaPcmProvider;

#[cfg(target_os = "android")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(target_os = "android")]
use std::sync::{Arc, OnceLock};

#[cfg(target_os = "android")]
use micswap_core::{EngineConfig, HookEngine, HookError, PcmProvider};

#[cfg(target_os = "android")]
static ENGINE: OnceLock<HookEngine> = OnceLock::new();

#[cfg(target_os = "android")]
static HOOKS_INSTALLED: AtomicBool = AtomicBool::new(false);

#[cfg(target_os = "android")]
static INSTALLER: FridaInstaller = FridaInstaller;

/// The process-wide engine instance.
#[cfg(target_os = "android")]
pub(crate) fn engine() -> &'static HookEngine {
    ENGINE.get_or_init(HookEngine::new)
}

/// Bind the replacement-PCM provider and install both hook families.
///
/// Idempotent; a second call is a logged no-op. Installed patches persist
/// until process exit.
#[cfg(target_os = "android")]
pub fn initialize(provider: Arc<dyn PcmProvider>, config: EngineConfig) -> Result<(), HookError> {
    config.validate().map_err(HookError::InvalidConfiguration)?;
    let engine = ENGINE.get_or_init(|| HookEngine::with_config(config));

    if let Err(HookError::ProviderAlreadyBound) = engine.bind_provider(provider) {
        log::debug!("already initialized");
        return Ok(());
    }

    if !HOOKS_INSTALLED.swap(true, Ordering::SeqCst) {
        if engine.config().enable_stream_hooks {
            aaudio_hooks::install(&INSTALLER);
        }
        if engine.config().enable_queue_hooks {
            opensles_hooks::install(&INSTALLER);
        }
        log::info!("hook installation complete");
    }
    Ok(())
}

/// Advisory only: inline patches are not reversed and keep forwarding to
/// the original entry points for the remainder of the process lifetime.
#[cfg(target_os = "android")]
pub fn shutdown() {
    log::info!("shutdown requested; installed hooks persist until process exit");
}
