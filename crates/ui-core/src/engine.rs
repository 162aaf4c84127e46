//! Boundary types for the external conferencing engine
//!
//! The engine itself is an external collaborator; this module only defines
//! the reactive signal channels the core subscribes to and the narrow
//! imperative operations it invokes. Every signal channel is a
//! `tokio::sync::watch` channel: subscribers always observe the latest value
//! in emission order and never replay history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::types::{
    ConnectionState, ParticipantId, ParticipantSnapshot, PreferredMediaType, RecordingInfo,
    StreamId, StreamTile, WatermarkInfo,
};

/// Reserved id of the local screen-share stream.
pub const SCREEN_SHARE_STREAM_ID: &str = "screenshare";

/// Kind of a capture input exposed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaInputKind {
    Camera,
    Microphone,
    /// Whole-screen capture
    ScreenDevice,
    /// Single-application capture
    ScreenApplication,
    Custom(String),
}

impl MediaInputKind {
    /// Whether this input captures screen content
    pub fn is_screen_capture(&self) -> bool {
        matches!(
            self,
            MediaInputKind::ScreenDevice | MediaInputKind::ScreenApplication
        )
    }
}

/// Descriptor of an available capture input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInput {
    pub id: String,
    pub kind: MediaInputKind,
    pub enabled: bool,
}

impl MediaInput {
    pub fn new(id: impl Into<String>, kind: MediaInputKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: false,
        }
    }

    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }
}

/// Imperative engine operations invoked by the core.
///
/// Implemented by the engine adapter; every operation is all-or-nothing and
/// reports success as a boolean rather than an error.
#[async_trait]
pub trait MediaInputControl: Send + Sync {
    /// Disable the given input. Returns false if the input was not found or
    /// could not be disabled; no partial state change in that case.
    async fn try_disable(&self, input_id: &str) -> bool;

    /// Release the capture resource behind the given input.
    async fn release(&self, input_id: &str);

    /// Remove a stream from the local participant's stream set.
    async fn remove_stream(&self, stream_id: &StreamId) -> bool;
}

/// Latest-value view of the roster signal: participants plus the
/// creator-accessor output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterSnapshot {
    pub participants: Vec<ParticipantSnapshot>,
    /// `None` while the creator-accessor has not emitted; `Some(None)` once
    /// it emitted a null creator.
    pub creator: Option<Option<ParticipantId>>,
    /// Authenticated local user, when known
    pub me: Option<ParticipantId>,
}

impl RosterSnapshot {
    /// Other participants currently in the call
    pub fn others_in_call(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| !p.is_me && p.is_in_call())
            .count()
    }
}

/// Read side of every engine signal the core consumes.
#[derive(Debug, Clone)]
pub struct EngineSignals {
    pub connection: watch::Receiver<ConnectionState>,
    pub roster: watch::Receiver<RosterSnapshot>,
    pub streams: watch::Receiver<Vec<StreamTile>>,
    pub recording: watch::Receiver<RecordingInfo>,
    pub preferred_media: watch::Receiver<PreferredMediaType>,
    pub inputs: watch::Receiver<Vec<MediaInput>>,
    pub watermark: watch::Receiver<WatermarkInfo>,
}

/// Write side of the engine signals, held by the engine adapter (or by
/// tests acting as the engine).
#[derive(Debug)]
pub struct EngineSignalSenders {
    pub connection: watch::Sender<ConnectionState>,
    pub roster: watch::Sender<RosterSnapshot>,
    pub streams: watch::Sender<Vec<StreamTile>>,
    pub recording: watch::Sender<RecordingInfo>,
    pub preferred_media: watch::Sender<PreferredMediaType>,
    pub inputs: watch::Sender<Vec<MediaInput>>,
    pub watermark: watch::Sender<WatermarkInfo>,
}

impl EngineSignals {
    /// Create the paired signal channels with quiescent initial values.
    pub fn channels() -> (EngineSignalSenders, EngineSignals) {
        let (connection_tx, connection_rx) = watch::channel(ConnectionState::Disconnected);
        let (roster_tx, roster_rx) = watch::channel(RosterSnapshot::default());
        let (streams_tx, streams_rx) = watch::channel(Vec::new());
        let (recording_tx, recording_rx) = watch::channel(RecordingInfo::default());
        let (preferred_tx, preferred_rx) = watch::channel(PreferredMediaType::AudioVideo);
        let (inputs_tx, inputs_rx) = watch::channel(Vec::new());
        let (watermark_tx, watermark_rx) = watch::channel(WatermarkInfo::default());

        (
            EngineSignalSenders {
                connection: connection_tx,
                roster: roster_tx,
                streams: streams_tx,
                recording: recording_tx,
                preferred_media: preferred_tx,
                inputs: inputs_tx,
                watermark: watermark_tx,
            },
            EngineSignals {
                connection: connection_rx,
                roster: roster_rx,
                streams: streams_rx,
                recording: recording_rx,
                preferred_media: preferred_rx,
                inputs: inputs_rx,
                watermark: watermark_rx,
            },
        )
    }
}
