//! # micswap-core
//!
//! Platform-agnostic core of the microphone substitution engine.
//!
//! Tracks the lifecycle and format metadata of live capture sessions across
//! two structurally different capture models (blocking reads and
//! callback/buffer-queue delivery) and substitutes synthetic PCM into
//! delivered buffers, with sample-format conversion where a session's native
//! format is floating point. Platform backends resolve and patch the actual
//! audio entry points and plug in a `PcmProvider` for the replacement audio.
//!
//! ## Architecture
//!
//! ```text
//! micswap-core (this crate)
//! ├── traits/       ← PcmProvider, HookInstaller
//! ├── models/       ← HookError, EngineConfig, SessionInfo, bindings
//! ├── processing/   ← PCM normalization (Int16 → Float32, frame sizing)
//! ├── registry.rs   ← SessionRegistry (opaque identity → metadata)
//! ├── synthesis.rs  ← SynthesisBridge (silence / passthrough policy)
//! └── engine.rs     ← HookEngine (top-level instance, hot-path composites)
//! ```

pub mod engine;
pub mod models;
pub mod processing;
pub mod registry;
pub mod synthesis;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use engine::HookEngine;
pub use models::config::EngineConfig;
pub use models::error::{HookError, ProviderError};
pub use models::session::{
    BuilderId, CallbackBinding, ObjectId, QueueId, RecorderObjectBinding, RecorderQueueInfo,
    SampleFormat, SessionId, SessionInfo,
};
pub use registry::SessionRegistry;
pub use synthesis::{Synthesis, SynthesisBridge};
pub use traits::hook_installer::HookInstaller;
pub use traits::pcm_provider::{FillStatus, PcmProvider};
