//! Buffer-queue interception for the OpenSL ES API.
//!
//! The entry points of interest here are dispatch-table members of opaque
//! interface objects, not exported symbols. A disposable engine + recorder
//! pair is instantiated once purely to read the tables and patch the
//! relevant slots. The patches are inline, on the function bodies the slots
//! point at, and the implementation shares those bodies across all objects
//! of an interface class — so probing one instance covers every future
//! instance, including objects whose tables were created later.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use libloading::Library;

use micswap_core::{CallbackBinding, HookInstaller, RecorderObjectBinding};

use crate::engine;
use crate::installer::install_named;

// Raw OpenSL ES ABI (SLES/OpenSLES.h, SLES/OpenSLES_Android.h).
type SlResult = u32;
type SlUint32 = u32;
type SlBoolean = u32;
type SlMillihertz = u32;

const SL_RESULT_SUCCESS: SlResult = 0;
const SL_RESULT_INTERNAL_ERROR: SlResult = 0x0000_000D;
const SL_BOOLEAN_FALSE: SlBoolean = 0;
const SL_BOOLEAN_TRUE: SlBoolean = 1;
const SL_DATAFORMAT_PCM: SlUint32 = 0x0000_0002;
const SL_DATALOCATOR_IODEVICE: SlUint32 = 0x0000_0003;
const SL_IODEVICE_AUDIOINPUT: SlUint32 = 0x0000_0001;
const SL_DEFAULTDEVICEID_AUDIOINPUT: SlUint32 = 0xFFFF_FFFF;
const SL_DATALOCATOR_ANDROIDSIMPLEBUFFERQUEUE: SlUint32 = 0x8000_07BD;
const SL_PCMSAMPLEFORMAT_FIXED_16: SlUint32 = 0x0010;
const SL_SPEAKER_FRONT_CENTER: SlUint32 = 0x0000_0004;
const SL_BYTEORDER_LITTLEENDIAN: SlUint32 = 0x0000_0002;

/// Interface-id GUID. Applications normally pass the library's own globals,
/// so ids are compared by address first and by value as a fallback.
#[repr(C)]
#[derive(PartialEq, Eq)]
struct SlInterfaceIdStruct {
    time_low: u32,
    time_mid: u16,
    time_hi_and_version: u16,
    clock_seq: u16,
    node: [u8; 6],
}

type SlInterfaceId = *const SlInterfaceIdStruct;

// Interface handles are a pointer to a pointer to a table of function
// pointers. The overlays below follow the OpenSL ES 1.0.1 ABI shipped on
// Android; slot order is an invariant and must not be rearranged.
type SlObjectItf = *const *const SlObjectVtable;
type SlEngineItf = *const *const SlEngineVtable;
type SlBufferQueueItf = *const *const SlBufferQueueVtable;

type BufferQueueCallback = unsafe extern "C" fn(SlBufferQueueItf, *mut c_void);

#[repr(C)]
struct SlObjectVtable {
    realize: unsafe extern "C" fn(SlObjectItf, SlBoolean) -> SlResult,
    resume: *const c_void,
    get_state: *const c_void,
    get_interface: unsafe extern "C" fn(SlObjectItf, SlInterfaceId, *mut c_void) -> SlResult,
    register_callback: *const c_void,
    abort_async_operation: *const c_void,
    destroy: unsafe extern "C" fn(SlObjectItf),
    set_priority: *const c_void,
    get_priority: *const c_void,
    set_loss_of_control_interfaces: *const c_void,
}

/// Engine interface table, defined through the only slot the engine
/// patches; trailing slots are never read.
#[repr(C)]
struct SlEngineVtable {
    create_led_device: *const c_void,
    create_vibra_device: *const c_void,
    create_audio_player: *const c_void,
    create_audio_recorder: unsafe extern "C" fn(
        SlEngineItf,
        *mut SlObjectItf,
        *mut SlDataSource,
        *mut SlDataSink,
        SlUint32,
        *const SlInterfaceId,
        *const SlBoolean,
    ) -> SlResult,
}

#[repr(C)]
struct SlBufferQueueVtable {
    enqueue: unsafe extern "C" fn(SlBufferQueueItf, *const c_void, SlUint32) -> SlResult,
    clear: *const c_void,
    get_state: *const c_void,
    register_callback:
        unsafe extern "C" fn(SlBufferQueueItf, Option<BufferQueueCallback>, *mut c_void) -> SlResult,
}

#[repr(C)]
struct SlDataLocatorIoDevice {
    locator_type: SlUint32,
    device_type: SlUint32,
    device_id: SlUint32,
    device: *const c_void,
}

#[repr(C)]
struct SlDataSource {
    locator: *mut c_void,
    format: *mut c_void,
}

#[repr(C)]
struct SlDataLocatorBufferQueue {
    locator_type: SlUint32,
    num_buffers: SlUint32,
}

#[repr(C)]
struct SlDataFormatPcm {
    format_type: SlUint32,
    num_channels: SlUint32,
    samples_per_sec: SlMillihertz,
    bits_per_sample: SlUint32,
    container_size: SlUint32,
    channel_mask: SlUint32,
    endianness: SlUint32,
}

#[repr(C)]
struct SlDataSink {
    locator: *mut c_void,
    format: *mut c_void,
}

type FnCreateEngine = unsafe extern "C" fn(
    *mut SlObjectItf,
    SlUint32,
    *const c_void,
    SlUint32,
    *const SlInterfaceId,
    *const SlBoolean,
) -> SlResult;
type FnCreateAudioRecorder = unsafe extern "C" fn(
    SlEngineItf,
    *mut SlObjectItf,
    *mut SlDataSource,
    *mut SlDataSink,
    SlUint32,
    *const SlInterfaceId,
    *const SlBoolean,
) -> SlResult;
type FnGetInterface = unsafe extern "C" fn(SlObjectItf, SlInterfaceId, *mut c_void) -> SlResult;
type FnDestroy = unsafe extern "C" fn(SlObjectItf);
type FnRegisterCallback =
    unsafe extern "C" fn(SlBufferQueueItf, Option<BufferQueueCallback>, *mut c_void) -> SlResult;
type FnEnqueue = unsafe extern "C" fn(SlBufferQueueItf, *const c_void, SlUint32) -> SlResult;

/// Resolved libOpenSLES handle: the engine factory export plus the
/// interface-id data symbols the hooks compare against.
struct SlLibrary {
    _lib: Library,
    create_engine: FnCreateEngine,
    iid_engine: SlInterfaceId,
    iid_simple_buffer_queue: SlInterfaceId,
}

// SAFETY: the interface ids point at immutable globals inside a library
// that lives in a process-wide static and is never unloaded.
unsafe impl Send for SlLibrary {}
unsafe impl Sync for SlLibrary {}

impl SlLibrary {
    fn load() -> Result<Self, String> {
        // SAFETY: resolving exported symbols. The interface-id symbols are
        // data globals of pointer type, so the symbol address is read once
        // more to obtain the id value.
        unsafe {
            let lib = Library::new("libOpenSLES.so").map_err(|e| e.to_string())?;
            let create_engine = *lib
                .get::<FnCreateEngine>(b"slCreateEngine\0")
                .map_err(|e| e.to_string())?;
            let iid_engine = **lib
                .get::<*const SlInterfaceId>(b"SL_IID_ENGINE\0")
                .map_err(|e| e.to_string())?;
            let iid_simple_buffer_queue = **lib
                .get::<*const SlInterfaceId>(b"SL_IID_ANDROIDSIMPLEBUFFERQUEUE\0")
                .map_err(|e| e.to_string())?;

            Ok(Self {
                _lib: lib,
                create_engine,
                iid_engine,
                iid_simple_buffer_queue,
            })
        }
    }
}

static OPENSLES: OnceLock<Option<SlLibrary>> = OnceLock::new();
static INSTALLER: OnceLock<&'static dyn HookInstaller> = OnceLock::new();

static ORIG_CREATE_ENGINE: OnceLock<FnCreateEngine> = OnceLock::new();
static ORIG_CREATE_AUDIO_RECORDER: OnceLock<FnCreateAudioRecorder> = OnceLock::new();
static ORIG_GET_INTERFACE: OnceLock<FnGetInterface> = OnceLock::new();
static ORIG_DESTROY: OnceLock<FnDestroy> = OnceLock::new();
static ORIG_REGISTER_CALLBACK: OnceLock<FnRegisterCallback> = OnceLock::new();
static ORIG_ENQUEUE: OnceLock<FnEnqueue> = OnceLock::new();

// One attempt per dispatch table per process.
static ENGINE_TABLE_HOOKED: AtomicBool = AtomicBool::new(false);
static OBJECT_TABLE_HOOKED: AtomicBool = AtomicBool::new(false);
static QUEUE_TABLE_HOOKED: AtomicBool = AtomicBool::new(false);

fn opensles() -> Option<&'static SlLibrary> {
    OPENSLES
        .get_or_init(|| match SlLibrary::load() {
            Ok(lib) => Some(lib),
            Err(e) => {
                log::info!("libOpenSLES.so not available, skipping queue hooks: {e}");
                None
            }
        })
        .as_ref()
}

fn is_simple_buffer_queue_iid(lib: &SlLibrary, iid: SlInterfaceId) -> bool {
    if iid == lib.iid_simple_buffer_queue {
        return true;
    }
    if iid.is_null() || lib.iid_simple_buffer_queue.is_null() {
        return false;
    }
    // SAFETY: both sides point at interface-id globals that outlive the
    // process.
    unsafe { *iid == *lib.iid_simple_buffer_queue }
}

/// Notification wrapper registered in place of the application callback.
///
/// The driver delivers readiness with no buffer pointer, so the engine
/// overwrites the remembered last-submitted region first; the original
/// callback then observes synthetic data when it consumes and re-submits.
unsafe extern "C" fn queue_ready_wrapper(queue: SlBufferQueueItf, _context: *mut c_void) {
    if let Some(binding) = engine().on_queue_ready(queue as usize) {
        if binding.is_bound() {
            // SAFETY: stored from a callback the application registered.
            let callback: BufferQueueCallback = std::mem::transmute(binding.callback);
            callback(queue, binding.context as *mut c_void);
        }
    }
}

/// Hooked `RegisterCallback`: on a queue known to belong to an input
/// session, stash the application binding and register the wrapper with a
/// null context (state is resolved by queue identity, not context). Other
/// queues pass through untouched.
unsafe extern "C" fn hooked_register_callback(
    queue: SlBufferQueueItf,
    callback: Option<BufferQueueCallback>,
    context: *mut c_void,
) -> SlResult {
    let Some(orig) = ORIG_REGISTER_CALLBACK.get() else {
        return SL_RESULT_INTERNAL_ERROR;
    };
    if engine().registry().is_recorder_queue(queue as usize) {
        log::info!("wrapping notification callback on recorder queue");
        engine().registry().bind_queue_callback(
            queue as usize,
            CallbackBinding {
                callback: callback.map(|f| f as usize).unwrap_or(0),
                context: context as usize,
            },
        );
        return orig(queue, Some(queue_ready_wrapper), ptr::null_mut());
    }
    orig(queue, callback, context)
}

/// Hooked `Enqueue`: remember the submitted region for tracked queues and
/// always forward unchanged — the driver must keep receiving the real
/// memory so its flow control stays intact.
unsafe extern "C" fn hooked_enqueue(
    queue: SlBufferQueueItf,
    buffer: *const c_void,
    size: SlUint32,
) -> SlResult {
    let Some(orig) = ORIG_ENQUEUE.get() else {
        return SL_RESULT_INTERNAL_ERROR;
    };
    engine()
        .registry()
        .record_enqueued_buffer(queue as usize, buffer as usize, size as usize);
    orig(queue, buffer, size)
}

/// Hooked `CreateAudioRecorder`: capture the PCM sink format keyed by the
/// produced object, for the later interface-accessor wiring.
unsafe extern "C" fn hooked_create_audio_recorder(
    engine_itf: SlEngineItf,
    recorder_out: *mut SlObjectItf,
    source: *mut SlDataSource,
    sink: *mut SlDataSink,
    num_interfaces: SlUint32,
    interface_ids: *const SlInterfaceId,
    interface_required: *const SlBoolean,
) -> SlResult {
    let Some(orig) = ORIG_CREATE_AUDIO_RECORDER.get() else {
        return SL_RESULT_INTERNAL_ERROR;
    };
    let result = orig(
        engine_itf,
        recorder_out,
        source,
        sink,
        num_interfaces,
        interface_ids,
        interface_required,
    );
    if result != SL_RESULT_SUCCESS || recorder_out.is_null() {
        return result;
    }
    let recorder = *recorder_out;
    if recorder.is_null() {
        return result;
    }

    let mut binding = RecorderObjectBinding::default();
    if !sink.is_null() {
        let format = (*sink).format as *const SlDataFormatPcm;
        if !format.is_null() && (*format).format_type == SL_DATAFORMAT_PCM {
            binding.sample_rate_millihz = (*format).samples_per_sec;
            binding.channel_count = (*format).num_channels;
            log::info!(
                "recorder created: rate={} mHz channels={}",
                binding.sample_rate_millihz,
                binding.channel_count
            );
        }
    }
    engine()
        .registry()
        .insert_recorder_object(recorder as usize, binding);
    result
}

/// Hooked `GetInterface`: when a tracked recorder object hands out its
/// buffer-queue interface, mark that queue as input-bearing and copy the
/// cached format onto it (milliHz → Hz).
unsafe extern "C" fn hooked_get_interface(
    object: SlObjectItf,
    iid: SlInterfaceId,
    interface_out: *mut c_void,
) -> SlResult {
    let Some(orig) = ORIG_GET_INTERFACE.get() else {
        return SL_RESULT_INTERNAL_ERROR;
    };
    let result = orig(object, iid, interface_out);
    if result != SL_RESULT_SUCCESS || interface_out.is_null() {
        return result;
    }
    let Some(lib) = opensles() else {
        return result;
    };
    if !is_simple_buffer_queue_iid(lib, iid) {
        return result;
    }
    let registry = engine().registry();
    let Some(binding) = registry.recorder_object(object as usize) else {
        return result;
    };
    let queue = *(interface_out as *mut SlBufferQueueItf);
    if queue.is_null() {
        return result;
    }

    let rate_hz = (binding.sample_rate_millihz / 1000) as i32;
    registry.mark_recorder_queue(queue as usize, rate_hz, binding.channel_count as i32);
    registry.attach_queue_to_object(object as usize, queue as usize);
    log::info!(
        "recorder buffer queue tracked: rate={rate_hz} Hz channels={}",
        binding.channel_count
    );
    result
}

/// Hooked `Destroy`: retire the object's tracking (and its queue entry)
/// before forwarding.
unsafe extern "C" fn hooked_destroy(object: SlObjectItf) {
    engine().on_object_destroyed(object as usize);
    if let Some(orig) = ORIG_DESTROY.get() {
        orig(object);
    }
}

/// Hooked `slCreateEngine` (deferred-resolution fallback): once the host
/// has a working engine of its own, retry the probe.
unsafe extern "C" fn hooked_create_engine(
    engine_out: *mut SlObjectItf,
    num_options: SlUint32,
    options: *const c_void,
    num_interfaces: SlUint32,
    interface_ids: *const SlInterfaceId,
    interface_required: *const SlBoolean,
) -> SlResult {
    let Some(orig) = ORIG_CREATE_ENGINE.get() else {
        return SL_RESULT_INTERNAL_ERROR;
    };
    let result = orig(
        engine_out,
        num_options,
        options,
        num_interfaces,
        interface_ids,
        interface_required,
    );
    if result == SL_RESULT_SUCCESS && !QUEUE_TABLE_HOOKED.load(Ordering::SeqCst) {
        if let Some(installer) = INSTALLER.get() {
            log::info!("host created an engine, retrying dispatch-table resolution");
            resolve_tables_via_probe(*installer);
        }
    }
    result
}

fn hook_engine_table(installer: &dyn HookInstaller, engine_itf: SlEngineItf) {
    if engine_itf.is_null() || ENGINE_TABLE_HOOKED.swap(true, Ordering::SeqCst) {
        return;
    }
    // SAFETY: reading the dispatch table the live handle points at.
    let table = unsafe { &**engine_itf };
    install_named(
        installer,
        "Engine::CreateAudioRecorder",
        table.create_audio_recorder as *mut c_void,
        hooked_create_audio_recorder as *mut c_void,
        |orig| {
            let _ = ORIG_CREATE_AUDIO_RECORDER
                .set(unsafe { std::mem::transmute::<*mut c_void, FnCreateAudioRecorder>(orig) });
        },
    );
}

fn hook_object_table(installer: &dyn HookInstaller, object: SlObjectItf) {
    if object.is_null() || OBJECT_TABLE_HOOKED.swap(true, Ordering::SeqCst) {
        return;
    }
    // SAFETY: reading the dispatch table the live handle points at.
    let table = unsafe { &**object };
    install_named(
        installer,
        "Object::GetInterface",
        table.get_interface as *mut c_void,
        hooked_get_interface as *mut c_void,
        |orig| {
            let _ = ORIG_GET_INTERFACE
                .set(unsafe { std::mem::transmute::<*mut c_void, FnGetInterface>(orig) });
        },
    );
    install_named(
        installer,
        "Object::Destroy",
        table.destroy as *mut c_void,
        hooked_destroy as *mut c_void,
        |orig| {
            let _ =
                ORIG_DESTROY.set(unsafe { std::mem::transmute::<*mut c_void, FnDestroy>(orig) });
        },
    );
}

fn hook_queue_table(installer: &dyn HookInstaller, queue: SlBufferQueueItf) {
    if queue.is_null() || QUEUE_TABLE_HOOKED.swap(true, Ordering::SeqCst) {
        return;
    }
    // SAFETY: reading the dispatch table the live handle points at.
    let table = unsafe { &**queue };
    install_named(
        installer,
        "BufferQueue::RegisterCallback",
        table.register_callback as *mut c_void,
        hooked_register_callback as *mut c_void,
        |orig| {
            let _ = ORIG_REGISTER_CALLBACK
                .set(unsafe { std::mem::transmute::<*mut c_void, FnRegisterCallback>(orig) });
        },
    );
    install_named(
        installer,
        "BufferQueue::Enqueue",
        table.enqueue as *mut c_void,
        hooked_enqueue as *mut c_void,
        |orig| {
            let _ =
                ORIG_ENQUEUE.set(unsafe { std::mem::transmute::<*mut c_void, FnEnqueue>(orig) });
        },
    );
}

/// Obtain dispatch-table addresses by instantiating a disposable engine and
/// recorder, patch the slots of interest, and destroy the probe objects.
fn resolve_tables_via_probe(installer: &'static dyn HookInstaller) {
    let Some(lib) = opensles() else {
        return;
    };

    // SAFETY: raw object protocol of the audio library. Every table call
    // passes the owning handle, out-pointers are checked before use, and
    // both probe objects are destroyed before return.
    unsafe {
        let mut engine_obj: SlObjectItf = ptr::null();
        let create = ORIG_CREATE_ENGINE.get().copied().unwrap_or(lib.create_engine);
        let result = create(&mut engine_obj, 0, ptr::null(), 0, ptr::null(), ptr::null());
        if result != SL_RESULT_SUCCESS || engine_obj.is_null() {
            log::info!("probe engine creation failed ({result:#x})");
            return;
        }

        if ((**engine_obj).realize)(engine_obj, SL_BOOLEAN_FALSE) != SL_RESULT_SUCCESS {
            ((**engine_obj).destroy)(engine_obj);
            return;
        }

        let mut engine_itf: SlEngineItf = ptr::null();
        let result = ((**engine_obj).get_interface)(
            engine_obj,
            lib.iid_engine,
            &mut engine_itf as *mut SlEngineItf as *mut c_void,
        );
        if result != SL_RESULT_SUCCESS || engine_itf.is_null() {
            ((**engine_obj).destroy)(engine_obj);
            return;
        }

        hook_engine_table(installer, engine_itf);
        hook_object_table(installer, engine_obj);

        // Minimal recorder purely to reach the queue dispatch table. Its
        // creation goes through the freshly patched slots; the destroy hook
        // retires the probe's own tracking entries again.
        let config = engine().config();
        let mut loc_dev = SlDataLocatorIoDevice {
            locator_type: SL_DATALOCATOR_IODEVICE,
            device_type: SL_IODEVICE_AUDIOINPUT,
            device_id: SL_DEFAULTDEVICEID_AUDIOINPUT,
            device: ptr::null(),
        };
        let mut source = SlDataSource {
            locator: &mut loc_dev as *mut _ as *mut c_void,
            format: ptr::null_mut(),
        };

        let mut loc_bq = SlDataLocatorBufferQueue {
            locator_type: SL_DATALOCATOR_ANDROIDSIMPLEBUFFERQUEUE,
            num_buffers: 1,
        };
        let mut format = SlDataFormatPcm {
            format_type: SL_DATAFORMAT_PCM,
            num_channels: u32::from(config.probe_channel_count),
            samples_per_sec: config.probe_sample_rate_millihz,
            bits_per_sample: SL_PCMSAMPLEFORMAT_FIXED_16,
            container_size: SL_PCMSAMPLEFORMAT_FIXED_16,
            channel_mask: SL_SPEAKER_FRONT_CENTER,
            endianness: SL_BYTEORDER_LITTLEENDIAN,
        };
        let mut sink = SlDataSink {
            locator: &mut loc_bq as *mut _ as *mut c_void,
            format: &mut format as *mut _ as *mut c_void,
        };

        let interface_ids = [lib.iid_simple_buffer_queue];
        let interface_required = [SL_BOOLEAN_TRUE];

        let mut recorder_obj: SlObjectItf = ptr::null();
        let create_recorder = (**engine_itf).create_audio_recorder;
        let result = create_recorder(
            engine_itf,
            &mut recorder_obj,
            &mut source,
            &mut sink,
            1,
            interface_ids.as_ptr(),
            interface_required.as_ptr(),
        );
        if result != SL_RESULT_SUCCESS || recorder_obj.is_null() {
            log::info!("probe recorder creation failed ({result:#x}), deferring queue-table resolution");
            ((**engine_obj).destroy)(engine_obj);
            return;
        }

        if ((**recorder_obj).realize)(recorder_obj, SL_BOOLEAN_FALSE) != SL_RESULT_SUCCESS {
            ((**recorder_obj).destroy)(recorder_obj);
            ((**engine_obj).destroy)(engine_obj);
            return;
        }

        let mut queue: SlBufferQueueItf = ptr::null();
        let result = ((**recorder_obj).get_interface)(
            recorder_obj,
            lib.iid_simple_buffer_queue,
            &mut queue as *mut SlBufferQueueItf as *mut c_void,
        );
        if result == SL_RESULT_SUCCESS && !queue.is_null() {
            hook_queue_table(installer, queue);
        }

        ((**recorder_obj).destroy)(recorder_obj);
        ((**engine_obj).destroy)(engine_obj);
    }

    log::info!(
        "dispatch-table resolution {}",
        if QUEUE_TABLE_HOOKED.load(Ordering::SeqCst) {
            "succeeded"
        } else {
            "failed"
        }
    );
}

/// Install the buffer-queue hook family.
///
/// Tries immediate dispatch-table resolution via the probe recorder; if the
/// probe cannot be built yet, patches the exported engine factory and
/// retries the first time the host creates its own engine.
pub fn install(installer: &'static dyn HookInstaller) {
    let Some(lib) = opensles() else {
        return;
    };
    let _ = INSTALLER.set(installer);

    resolve_tables_via_probe(installer);

    if !QUEUE_TABLE_HOOKED.load(Ordering::SeqCst) {
        install_named(
            installer,
            "slCreateEngine",
            lib.create_engine as *mut c_void,
            hooked_create_engine as *mut c_void,
            |orig| {
                let _ = ORIG_CREATE_ENGINE
                    .set(unsafe { std::mem::transmute::<*mut c_void, FnCreateEngine>(orig) });
            },
        );
    }
}
