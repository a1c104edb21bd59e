//! Tracking records for live sessions, builders, queues, and objects.
//!
//! All identities are raw handle addresses stored as `usize`. The registry
//! keys on them and never dereferences them.

use crate::processing::pcm;

/// Opaque identity of a live capture session (a stream handle address).
pub type SessionId = usize;
/// Opaque identity of a not-yet-open session builder.
pub type BuilderId = usize;
/// Opaque identity of a recorder buffer queue interface.
pub type QueueId = usize;
/// Opaque identity of a factory-produced recorder object.
pub type ObjectId = usize;

/// Sample representation of a session's PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int16,
    Float32,
}

impl SampleFormat {
    /// Width of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Float32 => 4,
        }
    }

    /// Map a raw platform format code (1 = 16-bit integer PCM, 2 = IEEE
    /// float PCM). Unknown codes fall back to the 16-bit width so byte-size
    /// accounting never collapses to zero.
    pub fn from_raw(code: i32) -> Self {
        match code {
            2 => SampleFormat::Float32,
            _ => SampleFormat::Int16,
        }
    }
}

/// Format and direction metadata for one live capture session.
///
/// Created on session open, read on every buffer delivery, removed on
/// close. Records inside the registry always hold positive rate and channel
/// values; the clamp is applied on insert and on query fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub is_input: bool,
    pub sample_rate: i32,
    pub channel_count: i32,
    pub format: SampleFormat,
}

impl SessionInfo {
    /// Bytes in one frame of this session's audio.
    pub fn bytes_per_frame(&self) -> usize {
        pcm::bytes_per_frame(self.format, self.channel_count)
    }
}

impl Default for SessionInfo {
    /// Placeholder for an unqueried session; the registry clamp supplies
    /// real values before the record is ever returned.
    fn default() -> Self {
        Self {
            is_input: false,
            sample_rate: 0,
            channel_count: 0,
            format: SampleFormat::Int16,
        }
    }
}

/// Opaque identities of an application delivery callback and its context
/// pointer.
///
/// Stashed keyed by builder identity when the application registers the
/// callback, then transferred to the session identity once the factory call
/// assigns one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackBinding {
    pub callback: usize,
    pub context: usize,
}

impl CallbackBinding {
    pub fn is_bound(&self) -> bool {
        self.callback != 0
    }
}

/// Tracking record for one recorder buffer queue.
///
/// The queue's readiness notification carries no buffer pointer, so the
/// engine remembers the region the application last handed to the driver
/// and overwrites exactly that region when the notification fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderQueueInfo {
    pub binding: CallbackBinding,
    pub last_buffer: usize,
    pub last_buffer_len: usize,
    pub sample_rate: i32,
    pub channel_count: i32,
}

/// Format captured at recorder-creation time, keyed by the produced object
/// identity until the buffer-queue interface is acquired.
///
/// `queue` back-references the queue identity wired through the interface
/// accessor so object destruction retires both records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderObjectBinding {
    pub sample_rate_millihz: u32,
    pub channel_count: u32,
    pub queue: Option<QueueId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_code_mapping_defaults_to_int16() {
        assert_eq!(SampleFormat::from_raw(1), SampleFormat::Int16);
        assert_eq!(SampleFormat::from_raw(2), SampleFormat::Float32);
        assert_eq!(SampleFormat::from_raw(0), SampleFormat::Int16);
        assert_eq!(SampleFormat::from_raw(99), SampleFormat::Int16);
    }

    #[test]
    fn frame_sizing() {
        let info = SessionInfo {
            is_input: true,
            sample_rate: 48_000,
            channel_count: 2,
            format: SampleFormat::Float32,
        };
        assert_eq!(info.bytes_per_frame(), 8);
    }
}
