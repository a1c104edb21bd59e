//! JNI entry points loaded by the managed side.

use std::ffi::c_void;
use std::sync::Arc;

use jni::objects::JClass;
use jni::sys::{jboolean, jint, JavaVM as RawJavaVM, JNI_FALSE, JNI_TRUE, JNI_VERSION_1_6};
use jni::JNIEnv;

use micswap_core::EngineConfig;

use crate::jni_provider::JavaPcmProvider;

fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag("micswap"),
    );
}

/// # Safety
///
/// Called by the runtime with a valid VM pointer during `System.loadLibrary`.
#[no_mangle]
pub unsafe extern "system" fn JNI_OnLoad(_vm: *mut RawJavaVM, _reserved: *mut c_void) -> jint {
    init_logging();
    log::info!("native library loaded");
    JNI_VERSION_1_6
}

/// Bind the managed provider and install all hooks.
///
/// `class` must carry the static `fillNativeBuffer([BIII)I` method; it is
/// pinned with a global reference so provider calls resolve it from any
/// thread.
#[no_mangle]
pub extern "system" fn Java_com_micswap_NativeBridge_nativeInit(
    env: JNIEnv,
    class: JClass,
) -> jboolean {
    init_logging();

    let vm = match env.get_java_vm() {
        Ok(vm) => vm,
        Err(e) => {
            log::error!("failed to obtain JavaVM: {e}");
            return JNI_FALSE;
        }
    };
    let hook_class = match env.new_global_ref(&class) {
        Ok(reference) => reference,
        Err(e) => {
            log::error!("failed to pin hook class: {e}");
            return JNI_FALSE;
        }
    };

    let provider = Arc::new(JavaPcmProvider::new(vm, hook_class));
    match crate::initialize(provider, EngineConfig::default()) {
        Ok(()) => {
            log::info!("engine initialized");
            JNI_TRUE
        }
        Err(e) => {
            log::error!("initialization failed: {e}");
            JNI_FALSE
        }
    }
}

/// Advisory release: installed patches persist until process exit.
#[no_mangle]
pub extern "system" fn Java_com_micswap_NativeBridge_nativeRelease(_env: JNIEnv, _class: JClass) {
    crate::shutdown();
}
