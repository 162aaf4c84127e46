//! # ViCall UI Core - Call UI State Coordination Layer
//!
//! This crate is the UI/state-mapping layer of the ViCall video-calling SDK:
//! pure mappers and reactive controllers that translate the conferencing
//! engine's live call/participant/stream model into immutable, render-ready
//! UI state. The engine itself (connection negotiation, media transport,
//! device I/O) is an external collaborator; this crate only observes and
//! reshapes its reactive outputs.
//!
//! ## Architecture
//!
//! Two tightly coupled policy engines make up the core:
//!
//! - [`phase`]: a deterministic resolver deriving the single user-facing
//!   call phase (Dialing, Ringing, Connected, Reconnecting, Ended...) from
//!   the raw engine signals.
//! - [`arrangement`]: the stream arrangement controller owning pinning,
//!   fullscreen selection and auto/manual mode.
//!
//! They are composed by [`aggregator`], with [`debounce`] smoothing
//! flicker-prone transitions, and published as one immutable
//! [`CallUiState`] snapshot per emission over a `tokio::sync::watch`
//! channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vicall_ui_core::{
//!     CallUiConfig, CallUiStateAggregator, EngineSignals, MediaInputControl, StreamId,
//! };
//!
//! # struct EngineAdapter;
//! # #[async_trait::async_trait]
//! # impl MediaInputControl for EngineAdapter {
//! #     async fn try_disable(&self, _: &str) -> bool { true }
//! #     async fn release(&self, _: &str) {}
//! #     async fn remove_stream(&self, _: &StreamId) -> bool { true }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (_senders, signals) = EngineSignals::channels();
//!     let control = Arc::new(EngineAdapter);
//!     let (aggregator, mut ui_state) =
//!         CallUiStateAggregator::new(signals, control, CallUiConfig::default())?;
//!
//!     tokio::spawn(aggregator.clone().run());
//!
//!     while ui_state.changed().await.is_ok() {
//!         let snapshot = ui_state.borrow().clone();
//!         println!("phase: {}", snapshot.phase.status_message());
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod arrangement;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod phase;
pub mod registry;
pub mod types;

// Re-export main types
pub use aggregator::{ui_state_stream, AloneState, CallUiConfig, CallUiState, CallUiStateAggregator};
pub use arrangement::{StreamArrangementController, DEFAULT_MAX_PINNED};
pub use debounce::{DebounceDecision, DebounceWindows, Debouncer, Situation, StabilityContext};
pub use engine::{
    EngineSignalSenders, EngineSignals, MediaInput, MediaInputControl, MediaInputKind,
    RosterSnapshot, SCREEN_SHARE_STREAM_ID,
};
pub use error::{UiCoreError, UiCoreResult};
pub use phase::{resolve_phase, CallPhase, CreatorSignal, EndedReason, ErrorReason, PhaseInputs};
pub use registry::{ScopeId, StoreKey, StoreRegistry};
pub use types::{
    ArrangementMode, AudioDescriptor, CallType, ConnectionState, EndReason, LayoutConstraints,
    ParticipantCallState, ParticipantId, ParticipantSnapshot, PreferredMediaType, RecordingInfo,
    RecordingKind, RecordingState, StreamId, StreamLayoutState, StreamTile, VideoDescriptor,
    WatermarkInfo,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
