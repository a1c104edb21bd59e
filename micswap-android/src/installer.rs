//! Inline-patch backend.

use std::ffi::c_void;
use std::sync::OnceLock;

use frida_gum::interceptor::Interceptor;
use frida_gum::{Gum, NativePointer};

use micswap_core::{HookError, HookInstaller};

static GUM: OnceLock<Gum> = OnceLock::new();

/// `HookInstaller` backed by the Gum inline interceptor.
///
/// A rejected patch (unsupported prologue, non-writable code page, target
/// already replaced) surfaces as `HookError::PatchRejected`; the caller
/// leaves that entry point unhooked and keeps going.
pub struct FridaInstaller;

impl HookInstaller for FridaInstaller {
    unsafe fn install(
        &self,
        target: *mut c_void,
        replacement: *mut c_void,
    ) -> Result<*mut c_void, HookError> {
        if target.is_null() {
            return Err(HookError::PatchRejected("null target address".into()));
        }
        let gum = GUM.get_or_init(Gum::obtain);
        let mut interceptor = Interceptor::obtain(gum);
        interceptor
            .replace(
                NativePointer(target),
                NativePointer(replacement),
                NativePointer(std::ptr::null_mut()),
            )
            .map(|original| original.0)
            .map_err(|e| HookError::PatchRejected(format!("{e:?}")))
    }
}

/// Patch one named entry point, storing the returned original through
/// `store`. Failures log and leave the entry point unhooked.
pub(crate) fn install_named(
    installer: &dyn HookInstaller,
    name: &str,
    target: *mut c_void,
    replacement: *mut c_void,
    store: impl FnOnce(*mut c_void),
) {
    // SAFETY: callers pair each target with an ABI-compatible replacement.
    match unsafe { installer.install(target, replacement) } {
        Ok(original) => {
            store(original);
            log::info!("hooked {name}");
        }
        Err(e) => log::warn!("leaving {name} unhooked: {e}"),
    }
}
