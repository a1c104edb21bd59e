//! Blocking-read and data-callback interception for the AAudio API.
//!
//! Every hooked entry point here is an exported symbol of libaaudio.so,
//! resolved at install time. The stream property accessors are resolved but
//! never patched; the hooks consult them when a stream is missing from the
//! registry.

use std::ffi::c_void;
use std::sync::OnceLock;

use libloading::Library;

use micswap_core::{CallbackBinding, HookInstaller, SampleFormat, SessionInfo};

use crate::engine;
use crate::installer::install_named;

// Raw AAudio ABI (aaudio/AAudio.h).
type AaudioResult = i32;
type AaudioDirection = i32;
type AaudioFormat = i32;

const AAUDIO_OK: AaudioResult = 0;
const AAUDIO_ERROR_UNAVAILABLE: AaudioResult = -889;
const AAUDIO_DIRECTION_INPUT: AaudioDirection = 1;
const AAUDIO_CALLBACK_RESULT_CONTINUE: i32 = 0;

/// Opaque stream and builder handles.
#[repr(C)]
pub struct AaudioStream {
    _opaque: [u8; 0],
}

#[repr(C)]
pub struct AaudioStreamBuilder {
    _opaque: [u8; 0],
}

type DataCallback =
    unsafe extern "C" fn(*mut AaudioStream, *mut c_void, *mut c_void, i32) -> i32;

type FnStreamRead =
    unsafe extern "C" fn(*mut AaudioStream, *mut c_void, i32, i64) -> AaudioResult;
type FnSetDataCallback =
    unsafe extern "C" fn(*mut AaudioStreamBuilder, Option<DataCallback>, *mut c_void);
type FnOpenStream =
    unsafe extern "C" fn(*mut AaudioStreamBuilder, *mut *mut AaudioStream) -> AaudioResult;
type FnStreamClose = unsafe extern "C" fn(*mut AaudioStream) -> AaudioResult;
type FnGetDirection = unsafe extern "C" fn(*mut AaudioStream) -> AaudioDirection;
type FnGetI32 = unsafe extern "C" fn(*mut AaudioStream) -> i32;

/// Resolved libaaudio handle: hook targets plus query accessors.
struct AaudioLibrary {
    _lib: Library,
    read: Option<FnStreamRead>,
    set_data_callback: Option<FnSetDataCallback>,
    open_stream: Option<FnOpenStream>,
    close: Option<FnStreamClose>,
    get_direction: Option<FnGetDirection>,
    get_sample_rate: Option<FnGetI32>,
    get_channel_count: Option<FnGetI32>,
    get_format: Option<FnGetI32>,
}

impl AaudioLibrary {
    fn load() -> Result<Self, libloading::Error> {
        // SAFETY: resolving exported symbols; the library handle lives in a
        // process-wide static and is never unloaded, so the copied function
        // pointers stay valid.
        unsafe {
            let lib = Library::new("libaaudio.so")?;
            let read = lib.get::<FnStreamRead>(b"AAudioStream_read\0").map(|s| *s).ok();
            let set_data_callback = lib
                .get::<FnSetDataCallback>(b"AAudioStreamBuilder_setDataCallback\0")
                .map(|s| *s)
                .ok();
            let open_stream = lib
                .get::<FnOpenStream>(b"AAudioStreamBuilder_openStream\0")
                .map(|s| *s)
                .ok();
            let close = lib
                .get::<FnStreamClose>(b"AAudioStream_close\0")
                .map(|s| *s)
                .ok();
            let get_direction = lib
                .get::<FnGetDirection>(b"AAudioStream_getDirection\0")
                .map(|s| *s)
                .ok();
            let get_sample_rate = lib
                .get::<FnGetI32>(b"AAudioStream_getSampleRate\0")
                .map(|s| *s)
                .ok();
            let get_channel_count = lib
                .get::<FnGetI32>(b"AAudioStream_getChannelCount\0")
                .map(|s| *s)
                .ok();
            let get_format = lib
                .get::<FnGetI32>(b"AAudioStream_getFormat\0")
                .map(|s| *s)
                .ok();

            Ok(Self {
                _lib: lib,
                read,
                set_data_callback,
                open_stream,
                close,
                get_direction,
                get_sample_rate,
                get_channel_count,
                get_format,
            })
        }
    }
}

static AAUDIO: OnceLock<Option<AaudioLibrary>> = OnceLock::new();

static ORIG_READ: OnceLock<FnStreamRead> = OnceLock::new();
static ORIG_SET_DATA_CALLBACK: OnceLock<FnSetDataCallback> = OnceLock::new();
static ORIG_OPEN_STREAM: OnceLock<FnOpenStream> = OnceLock::new();
static ORIG_CLOSE: OnceLock<FnStreamClose> = OnceLock::new();

fn aaudio() -> Option<&'static AaudioLibrary> {
    AAUDIO
        .get_or_init(|| match AaudioLibrary::load() {
            Ok(lib) => Some(lib),
            Err(e) => {
                log::info!("libaaudio.so not available, skipping stream hooks: {e}");
                None
            }
        })
        .as_ref()
}

/// Query a stream's properties directly from the API accessors.
///
/// Unavailable accessors leave the placeholder values in place; the
/// registry clamp supplies safe numbers downstream.
fn query_stream(stream: *mut AaudioStream) -> Option<SessionInfo> {
    let lib = aaudio()?;
    let mut info = SessionInfo::default();
    // SAFETY: `stream` is the live handle the host passed into the hooked
    // call.
    unsafe {
        if let Some(f) = lib.get_direction {
            info.is_input = f(stream) == AAUDIO_DIRECTION_INPUT;
        }
        if let Some(f) = lib.get_sample_rate {
            info.sample_rate = f(stream);
        }
        if let Some(f) = lib.get_channel_count {
            info.channel_count = f(stream);
        }
        if let Some(f) = lib.get_format {
            info.format = SampleFormat::from_raw(f(stream) as AaudioFormat);
        }
    }
    Some(info)
}

/// Hooked `AAudioStream_read`: let the real read complete, then overwrite
/// the caller's buffer for input streams. The original frame count and
/// timing are preserved.
unsafe extern "C" fn hooked_stream_read(
    stream: *mut AaudioStream,
    buffer: *mut c_void,
    num_frames: i32,
    timeout_nanos: i64,
) -> AaudioResult {
    let Some(orig) = ORIG_READ.get() else {
        // Patch landed before the original was recorded; report no data.
        return 0;
    };
    let result = orig(stream, buffer, num_frames, timeout_nanos);
    if result <= 0 {
        return result;
    }

    let info = engine()
        .registry()
        .session_info_or_query(stream as usize, || query_stream(stream));
    if !info.is_input {
        return result;
    }

    engine().overwrite_frames(&info, buffer as *mut u8, result);
    result
}

/// Data callback registered in place of the application's.
///
/// Overwrites the delivered buffer for input streams before forwarding to
/// the original callback, so the application consumes synthetic data. The
/// context the engine registered is null; state is resolved by stream
/// identity.
unsafe extern "C" fn substituted_data_callback(
    stream: *mut AaudioStream,
    _user_data: *mut c_void,
    audio_data: *mut c_void,
    num_frames: i32,
) -> i32 {
    let info = engine()
        .registry()
        .session_info_or_query(stream as usize, || query_stream(stream));
    if info.is_input {
        engine().overwrite_frames(&info, audio_data as *mut u8, num_frames);
    }

    let binding = engine()
        .registry()
        .session_callback(stream as usize)
        .unwrap_or_default();
    if binding.is_bound() {
        // SAFETY: stored from a DataCallback the application registered.
        let callback: DataCallback = std::mem::transmute(binding.callback);
        return callback(stream, binding.context as *mut c_void, audio_data, num_frames);
    }
    AAUDIO_CALLBACK_RESULT_CONTINUE
}

/// Hooked `AAudioStreamBuilder_setDataCallback`: stash the application
/// binding keyed by the builder and register the engine's wrapper instead.
unsafe extern "C" fn hooked_set_data_callback(
    builder: *mut AaudioStreamBuilder,
    callback: Option<DataCallback>,
    user_data: *mut c_void,
) {
    let Some(orig) = ORIG_SET_DATA_CALLBACK.get() else {
        return;
    };
    engine().registry().stash_pending_callback(
        builder as usize,
        CallbackBinding {
            callback: callback.map(|f| f as usize).unwrap_or(0),
            context: user_data as usize,
        },
    );
    orig(builder, Some(substituted_data_callback), std::ptr::null_mut());
}

/// Hooked `AAudioStreamBuilder_openStream`: record the opened session's
/// metadata and promote any pending builder callback binding onto the
/// stream identity.
unsafe extern "C" fn hooked_open_stream(
    builder: *mut AaudioStreamBuilder,
    stream_out: *mut *mut AaudioStream,
) -> AaudioResult {
    let Some(orig) = ORIG_OPEN_STREAM.get() else {
        return AAUDIO_ERROR_UNAVAILABLE;
    };
    let result = orig(builder, stream_out);
    if result != AAUDIO_OK || stream_out.is_null() {
        return result;
    }
    let stream = *stream_out;
    if stream.is_null() {
        return result;
    }

    let info = query_stream(stream).unwrap_or_default();
    let registry = engine().registry();
    registry.insert_session(stream as usize, info);
    registry.promote_pending_callback(builder as usize, stream as usize);

    if info.is_input {
        log::info!(
            "input stream opened: rate={} channels={} format={:?}",
            info.sample_rate,
            info.channel_count,
            info.format
        );
    }
    result
}

/// Hooked `AAudioStream_close`: retire tracking before forwarding.
unsafe extern "C" fn hooked_stream_close(stream: *mut AaudioStream) -> AaudioResult {
    engine().registry().remove_session(stream as usize);
    match ORIG_CLOSE.get() {
        Some(orig) => orig(stream),
        None => AAUDIO_ERROR_UNAVAILABLE,
    }
}

/// Install the stream hook family. A failed patch skips that entry point
/// only; absence of libaaudio.so skips the family.
pub fn install(installer: &dyn HookInstaller) {
    let Some(lib) = aaudio() else {
        return;
    };

    if let Some(target) = lib.read {
        install_named(
            installer,
            "AAudioStream_read",
            target as *mut c_void,
            hooked_stream_read as *mut c_void,
            |orig| {
                let _ = ORIG_READ.set(unsafe { std::mem::transmute::<*mut c_void, FnStreamRead>(orig) });
            },
        );
    }

    if let Some(target) = lib.set_data_callback {
        install_named(
            installer,
            "AAudioStreamBuilder_setDataCallback",
            target as *mut c_void,
            hooked_set_data_callback as *mut c_void,
            |orig| {
                let _ = ORIG_SET_DATA_CALLBACK
                    .set(unsafe { std::mem::transmute::<*mut c_void, FnSetDataCallback>(orig) });
            },
        );
    }

    if let Some(target) = lib.open_stream {
        install_named(
            installer,
            "AAudioStreamBuilder_openStream",
            target as *mut c_void,
            hooked_open_stream as *mut c_void,
            |orig| {
                let _ = ORIG_OPEN_STREAM
                    .set(unsafe { std::mem::transmute::<*mut c_void, FnOpenStream>(orig) });
            },
        );
    }

    if let Some(target) = lib.close {
        install_named(
            installer,
            "AAudioStream_close",
            target as *mut c_void,
            hooked_stream_close as *mut c_void,
            |orig| {
                let _ = ORIG_CLOSE
                    .set(unsafe { std::mem::transmute::<*mut c_void, FnStreamClose>(orig) });
            },
        );
    }
}
