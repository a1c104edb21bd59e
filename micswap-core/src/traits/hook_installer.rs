use std::ffi::c_void;

use crate::models::error::HookError;

/// Narrow binary-patching capability.
///
/// Installs a trampoline so calls to `target` transparently reach
/// `replacement`, and yields a callable pointer to the pre-patch behavior.
/// A rejected patch (non-writable code page, incompatible existing patch)
/// leaves the entry point unhooked; callers degrade to reduced coverage
/// instead of aborting.
pub trait HookInstaller: Send + Sync {
    /// # Safety
    ///
    /// `target` must be the entry point of a patchable function and
    /// `replacement` must be ABI-compatible with it.
    unsafe fn install(
        &self,
        target: *mut c_void,
        replacement: *mut c_void,
    ) -> Result<*mut c_void, HookError>;
}
