//! Session, builder, queue, and object tracking.
//!
//! All maps are owned exclusively by `SessionRegistry` and keyed by opaque
//! handle addresses. Every lock is scoped strictly to the map operation;
//! callers never hold one across synthesis or FFI work. Entries are removed
//! eagerly from the corresponding close/destroy hook so long-lived processes
//! with many short sessions stay bounded.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::models::session::{
    BuilderId, CallbackBinding, ObjectId, QueueId, RecorderObjectBinding, RecorderQueueInfo,
    SessionId, SessionInfo,
};

pub struct SessionRegistry {
    fallback_sample_rate: i32,
    fallback_channel_count: i32,
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
    pending_callbacks: Mutex<HashMap<BuilderId, CallbackBinding>>,
    session_callbacks: Mutex<HashMap<SessionId, CallbackBinding>>,
    queues: Mutex<HashMap<QueueId, RecorderQueueInfo>>,
    recorder_objects: Mutex<HashMap<ObjectId, RecorderObjectBinding>>,
}

impl SessionRegistry {
    pub fn new(fallback_sample_rate: i32, fallback_channel_count: i32) -> Self {
        Self {
            fallback_sample_rate,
            fallback_channel_count,
            sessions: Mutex::new(HashMap::new()),
            pending_callbacks: Mutex::new(HashMap::new()),
            session_callbacks: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            recorder_objects: Mutex::new(HashMap::new()),
        }
    }

    /// Invariant: stored records always carry positive rate and channel
    /// values, so downstream byte sizing can never collapse to zero.
    fn clamp(&self, mut info: SessionInfo) -> SessionInfo {
        if info.sample_rate <= 0 {
            info.sample_rate = self.fallback_sample_rate;
        }
        if info.channel_count <= 0 {
            info.channel_count = self.fallback_channel_count;
        }
        info
    }

    // --- Sessions ---

    /// Record a session that just opened.
    pub fn insert_session(&self, session: SessionId, info: SessionInfo) {
        let info = self.clamp(info);
        self.sessions.lock().insert(session, info);
    }

    /// Retire a session and any callback binding attached to it.
    pub fn remove_session(&self, session: SessionId) {
        self.sessions.lock().remove(&session);
        self.session_callbacks.lock().remove(&session);
    }

    pub fn session_info(&self, session: SessionId) -> Option<SessionInfo> {
        self.sessions.lock().get(&session).copied()
    }

    /// Registry hit, or query the underlying API and lazily cache the result.
    ///
    /// Only input-direction sessions are cached; output sessions are never
    /// of interest and would only grow the table. A failed query yields the
    /// clamped non-input default.
    pub fn session_info_or_query(
        &self,
        session: SessionId,
        query: impl FnOnce() -> Option<SessionInfo>,
    ) -> SessionInfo {
        if let Some(info) = self.session_info(session) {
            return info;
        }
        let info = self.clamp(query().unwrap_or_default());
        if info.is_input {
            self.sessions.lock().insert(session, info);
        }
        info
    }

    // --- Two-phase callback binding (builder → session) ---

    pub fn stash_pending_callback(&self, builder: BuilderId, binding: CallbackBinding) {
        self.pending_callbacks.lock().insert(builder, binding);
    }

    /// Transfer a pending binding to the session identity assigned by the
    /// factory call. No-op if the builder never registered a callback.
    pub fn promote_pending_callback(&self, builder: BuilderId, session: SessionId) {
        let binding = self.pending_callbacks.lock().remove(&builder);
        if let Some(binding) = binding {
            self.session_callbacks.lock().insert(session, binding);
        }
    }

    pub fn session_callback(&self, session: SessionId) -> Option<CallbackBinding> {
        self.session_callbacks.lock().get(&session).copied()
    }

    // --- Recorder buffer queues ---

    /// Mark a queue as input-bearing and attach its resolved format.
    pub fn mark_recorder_queue(&self, queue: QueueId, sample_rate: i32, channel_count: i32) {
        let mut queues = self.queues.lock();
        let info = queues.entry(queue).or_default();
        info.sample_rate = if sample_rate > 0 {
            sample_rate
        } else {
            self.fallback_sample_rate
        };
        info.channel_count = if channel_count > 0 {
            channel_count
        } else {
            self.fallback_channel_count
        };
    }

    pub fn is_recorder_queue(&self, queue: QueueId) -> bool {
        self.queues.lock().contains_key(&queue)
    }

    /// Stash the application's notification binding. Returns false when the
    /// queue is not a tracked recorder queue.
    pub fn bind_queue_callback(&self, queue: QueueId, binding: CallbackBinding) -> bool {
        match self.queues.lock().get_mut(&queue) {
            Some(info) => {
                info.binding = binding;
                true
            }
            None => false,
        }
    }

    /// Remember the most recently submitted buffer region for a tracked
    /// queue; untracked queues are ignored.
    pub fn record_enqueued_buffer(&self, queue: QueueId, buffer: usize, len: usize) {
        if let Some(info) = self.queues.lock().get_mut(&queue) {
            info.last_buffer = buffer;
            info.last_buffer_len = len;
        }
    }

    pub fn queue_info(&self, queue: QueueId) -> Option<RecorderQueueInfo> {
        self.queues.lock().get(&queue).copied()
    }

    pub fn remove_queue(&self, queue: QueueId) {
        self.queues.lock().remove(&queue);
    }

    // --- Recorder objects (factory → interface-accessor wiring) ---

    pub fn insert_recorder_object(&self, object: ObjectId, binding: RecorderObjectBinding) {
        self.recorder_objects.lock().insert(object, binding);
    }

    pub fn recorder_object(&self, object: ObjectId) -> Option<RecorderObjectBinding> {
        self.recorder_objects.lock().get(&object).copied()
    }

    /// Wire the acquired queue identity back to its recorder object so
    /// destruction retires both records.
    pub fn attach_queue_to_object(&self, object: ObjectId, queue: QueueId) {
        if let Some(binding) = self.recorder_objects.lock().get_mut(&object) {
            binding.queue = Some(queue);
        }
    }

    /// Retire an object's tracking. Returns the binding so the caller can
    /// also retire the attached queue entry.
    pub fn remove_recorder_object(&self, object: ObjectId) -> Option<RecorderObjectBinding> {
        self.recorder_objects.lock().remove(&object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SampleFormat;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(44_100, 1)
    }

    fn input_info() -> SessionInfo {
        SessionInfo {
            is_input: true,
            sample_rate: 48_000,
            channel_count: 2,
            format: SampleFormat::Int16,
        }
    }

    #[test]
    fn session_lifecycle() {
        let reg = registry();
        reg.insert_session(0x10, input_info());
        assert_eq!(reg.session_info(0x10).unwrap().sample_rate, 48_000);

        reg.remove_session(0x10);
        assert!(reg.session_info(0x10).is_none());
    }

    #[test]
    fn insert_clamps_invalid_format_values() {
        let reg = registry();
        reg.insert_session(
            0x10,
            SessionInfo {
                is_input: true,
                sample_rate: 0,
                channel_count: -2,
                format: SampleFormat::Int16,
            },
        );

        let info = reg.session_info(0x10).unwrap();
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.channel_count, 1);
    }

    #[test]
    fn query_fallback_caches_input_sessions_only() {
        let reg = registry();

        let output = reg.session_info_or_query(0x20, || {
            Some(SessionInfo {
                is_input: false,
                sample_rate: 48_000,
                channel_count: 2,
                format: SampleFormat::Float32,
            })
        });
        assert!(!output.is_input);
        assert!(reg.session_info(0x20).is_none());

        let input = reg.session_info_or_query(0x21, || Some(input_info()));
        assert!(input.is_input);
        assert!(reg.session_info(0x21).is_some());
    }

    #[test]
    fn cached_session_skips_the_query() {
        let reg = registry();
        reg.insert_session(0x22, input_info());
        let info = reg.session_info_or_query(0x22, || unreachable!());
        assert_eq!(info.sample_rate, 48_000);
    }

    #[test]
    fn failed_query_yields_clamped_defaults() {
        let reg = registry();
        let info = reg.session_info_or_query(0x30, || None);
        assert!(!info.is_input);
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.channel_count, 1);
        assert_eq!(info.format, SampleFormat::Int16);
    }

    #[test]
    fn pending_callback_promotes_to_session() {
        let reg = registry();
        let binding = CallbackBinding {
            callback: 0xCAFE,
            context: 0xBEEF,
        };
        reg.stash_pending_callback(0x40, binding);
        assert!(reg.session_callback(0x50).is_none());

        reg.promote_pending_callback(0x40, 0x50);
        assert_eq!(reg.session_callback(0x50), Some(binding));

        // The builder entry is consumed by the transfer.
        reg.promote_pending_callback(0x40, 0x51);
        assert!(reg.session_callback(0x51).is_none());
    }

    #[test]
    fn remove_session_drops_its_binding() {
        let reg = registry();
        reg.stash_pending_callback(0x40, CallbackBinding { callback: 1, context: 2 });
        reg.promote_pending_callback(0x40, 0x50);
        reg.remove_session(0x50);
        assert!(reg.session_callback(0x50).is_none());
    }

    #[test]
    fn queue_tracking_lifecycle() {
        let reg = registry();
        assert!(!reg.is_recorder_queue(0x60));
        assert!(!reg.bind_queue_callback(0x60, CallbackBinding::default()));

        reg.mark_recorder_queue(0x60, 16_000, 1);
        assert!(reg.is_recorder_queue(0x60));
        assert!(reg.bind_queue_callback(0x60, CallbackBinding { callback: 1, context: 2 }));
        reg.record_enqueued_buffer(0x60, 0x7000, 320);

        let info = reg.queue_info(0x60).unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.channel_count, 1);
        assert_eq!(info.last_buffer, 0x7000);
        assert_eq!(info.last_buffer_len, 320);

        reg.remove_queue(0x60);
        assert!(reg.queue_info(0x60).is_none());
    }

    #[test]
    fn queue_mark_clamps_format() {
        let reg = registry();
        reg.mark_recorder_queue(0x60, 0, 0);
        let info = reg.queue_info(0x60).unwrap();
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.channel_count, 1);
    }

    #[test]
    fn enqueue_on_untracked_queue_is_ignored() {
        let reg = registry();
        reg.record_enqueued_buffer(0x61, 0x7000, 320);
        assert!(reg.queue_info(0x61).is_none());
    }

    #[test]
    fn removed_object_reports_attached_queue() {
        let reg = registry();
        reg.insert_recorder_object(
            0x70,
            RecorderObjectBinding {
                sample_rate_millihz: 44_100_000,
                channel_count: 1,
                queue: None,
            },
        );
        reg.mark_recorder_queue(0x80, 44_100, 1);
        reg.attach_queue_to_object(0x70, 0x80);

        let binding = reg.remove_recorder_object(0x70).unwrap();
        assert_eq!(binding.queue, Some(0x80));
        assert!(reg.recorder_object(0x70).is_none());
    }
}
