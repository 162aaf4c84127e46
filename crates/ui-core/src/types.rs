//! Core types for vicall-ui-core
//!
//! This module defines the data model shared across the crate: identifiers,
//! raw engine-side call state, participant snapshots, stream tiles, and the
//! layout state owned by the arrangement controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Stream ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh unique stream id
    pub fn generate() -> Self {
        Self(format!("stream-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Raw connection state reported by the conferencing engine.
///
/// This is the engine-side signal the phase resolver consumes; it is never
/// shown to the UI directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport-level negotiation in progress
    Connecting,
    /// Transport established
    Connected,
    /// Transport dropped, engine is re-negotiating
    Reconnecting,
    /// Local teardown in progress
    Disconnecting,
    /// Not connected, call not yet ended
    Disconnected,
    /// Call has ended with the given reason
    Ended(EndReason),
}

/// Raw end reason reported by the engine on `ConnectionState::Ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Ordinary end of call with no further detail
    Normal,
    /// Remote (or local) party hung up
    HungUp,
    /// Callee declined the call
    Declined,
    /// Callee was busy on another line
    LineBusy,
    /// Call rang out without an answer
    Timeout,
    /// The call was picked up on another device of the same user
    AnsweredOnAnotherDevice,
    /// The local user was removed by an admin; carries the admin's user id
    Kicked { admin_user_id: String },
    /// The local user is already in another call
    CurrentUserInAnotherCall,
    /// Server-side failure
    ServerError { reason: String },
    /// Failure the engine could not classify
    UnknownError { reason: String },
}

/// Per-participant call sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantCallState {
    /// Participant has joined the call
    InCall,
    /// Participant is known to the roster but not in the call
    NotInCall,
    /// Participant is not in the call and their device is ringing
    Ringing,
}

/// Read-only projection of one roster participant.
///
/// Rebuilt from the engine roster on every computation; the core never
/// persists these across signal ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    /// Stable participant identity
    pub user_id: ParticipantId,
    /// Resolved display name, falls back to the user id when unknown
    pub display_name: String,
    /// Whether this participant is the local user
    pub is_me: bool,
    /// Call sub-state as reported by the engine
    pub state: ParticipantCallState,
    /// Number of live streams currently owned by this participant
    pub stream_count: usize,
}

impl ParticipantSnapshot {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: ParticipantId::new(user_id),
            display_name: display_name.into(),
            is_me: false,
            state: ParticipantCallState::NotInCall,
            stream_count: 0,
        }
    }

    pub fn me(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_me: true,
            ..Self::new(user_id, display_name)
        }
    }

    pub fn with_state(mut self, state: ParticipantCallState) -> Self {
        self.state = state;
        self
    }

    pub fn with_stream_count(mut self, count: usize) -> Self {
        self.stream_count = count;
        self
    }

    pub fn is_in_call(&self) -> bool {
        self.state == ParticipantCallState::InCall
    }
}

/// Audio descriptor for a stream tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDescriptor {
    /// Whether the audio track is enabled at the source
    pub enabled: bool,
    /// Whether the local user muted this stream for themselves
    pub muted_for_you: bool,
}

/// Video descriptor for a stream tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    /// Whether the video track is enabled at the source
    pub enabled: bool,
}

/// One media stream's UI-relevant projection.
///
/// Identity is preserved by `id` across updates; `created_at` is the stable
/// sort key used by the arrangement controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTile {
    /// Engine stream identifier
    pub id: StreamId,
    /// Participant that owns this stream
    pub owner_id: ParticipantId,
    /// Whether the stream is owned by the local participant
    pub is_mine: bool,
    /// Whether this is a screen-share stream
    pub is_screen_share: bool,
    /// Audio track descriptor, if the stream carries audio
    pub audio: Option<AudioDescriptor>,
    /// Video track descriptor, if the stream carries video
    pub video: Option<VideoDescriptor>,
    /// When the engine first reported this stream
    pub created_at: DateTime<Utc>,
    /// Display name of the owning participant
    pub display_name: String,
    /// Avatar URL of the owning participant
    pub avatar_url: Option<String>,
}

impl StreamTile {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let owner_id = ParticipantId::new(owner_id);
        Self {
            id: StreamId::new(id),
            display_name: owner_id.0.clone(),
            owner_id,
            is_mine: false,
            is_screen_share: false,
            audio: None,
            video: None,
            created_at: Utc::now(),
            avatar_url: None,
        }
    }

    pub fn mine(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            is_mine: true,
            ..Self::new(id, owner_id)
        }
    }

    pub fn screen_share(mut self) -> Self {
        self.is_screen_share = true;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio = Some(AudioDescriptor {
            enabled,
            muted_for_you: false,
        });
        self
    }

    pub fn with_video(mut self, enabled: bool) -> Self {
        self.video = Some(VideoDescriptor { enabled });
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Whether the tile has an enabled video track
    pub fn has_video(&self) -> bool {
        self.video.map(|v| v.enabled).unwrap_or(false)
    }
}

/// How the arrangement controller decides the pinned/featured sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrangementMode {
    /// Controller re-derives arrangement from stream structure on its own
    Auto,
    /// Only explicit pin/unpin calls mutate the arrangement
    Manual,
}

/// Layout constraints of the hosting surface, used for the
/// featured/thumbnail split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutConstraints {
    /// Phone-sized surface
    Compact,
    /// Tablet-sized surface
    Medium,
    /// Desktop-sized surface
    Expanded,
}

impl LayoutConstraints {
    /// Number of tiles promoted to the featured tier for this layout
    pub fn featured_threshold(&self) -> usize {
        match self {
            LayoutConstraints::Compact => 2,
            LayoutConstraints::Medium | LayoutConstraints::Expanded => 4,
        }
    }
}

/// Aggregate arrangement state owned by [`crate::arrangement::StreamArrangementController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamLayoutState {
    /// All known tiles, sorted by creation time ascending
    pub streams: Vec<StreamTile>,
    /// Pinned tile ids, head first, bounded by the pin capacity
    pub pinned_ids: Vec<StreamId>,
    /// Tile currently elevated to exclusive full-viewport display
    pub fullscreen_id: Option<StreamId>,
    /// Current arrangement mode
    pub mode: ArrangementMode,
}

impl Default for StreamLayoutState {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            pinned_ids: Vec::new(),
            fullscreen_id: None,
            mode: ArrangementMode::Auto,
        }
    }
}

impl StreamLayoutState {
    pub fn stream(&self, id: &StreamId) -> Option<&StreamTile> {
        self.streams.iter().find(|t| &t.id == id)
    }

    pub fn contains(&self, id: &StreamId) -> bool {
        self.stream(id).is_some()
    }

    pub fn is_pinned(&self, id: &StreamId) -> bool {
        self.pinned_ids.contains(id)
    }
}

/// Recording mode configured for the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingKind {
    /// The call is never recorded
    None,
    /// Recording starts automatically when the call connects
    OnConnect,
    /// Recording is started and stopped on demand
    OnDemand,
}

/// Live recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

/// Recording info surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub kind: RecordingKind,
    pub state: RecordingState,
}

impl Default for RecordingInfo {
    fn default() -> Self {
        Self {
            kind: RecordingKind::None,
            state: RecordingState::Stopped,
        }
    }
}

impl RecordingInfo {
    /// Whether a recording indicator should be shown
    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecordingState::Starting | RecordingState::Started)
    }
}

/// Media type the call was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredMediaType {
    /// Audio only, cannot be upgraded
    AudioOnly,
    /// Audio that may be upgraded to video mid-call
    AudioUpgradable,
    /// Full audio and video
    AudioVideo,
}

impl PreferredMediaType {
    pub fn is_audio_only(&self) -> bool {
        matches!(self, PreferredMediaType::AudioOnly)
    }
}

/// Watermark/branding overlay info
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WatermarkInfo {
    pub image_url: Option<String>,
    pub text: Option<String>,
}

/// How the call was created; link-type calls have a dedicated phase branch
/// when the creator is remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    Default,
    Link,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn featured_threshold_by_layout() {
        assert_eq!(LayoutConstraints::Compact.featured_threshold(), 2);
        assert_eq!(LayoutConstraints::Medium.featured_threshold(), 4);
        assert_eq!(LayoutConstraints::Expanded.featured_threshold(), 4);
    }

    #[test]
    fn tile_builder_defaults() {
        let tile = StreamTile::mine("camera", "alice").with_video(true);
        assert!(tile.is_mine);
        assert!(!tile.is_screen_share);
        assert!(tile.has_video());
        assert_eq!(tile.display_name, "alice");
    }

    #[test]
    fn recording_indicator() {
        let mut info = RecordingInfo::default();
        assert!(!info.is_recording());
        info.state = RecordingState::Starting;
        assert!(info.is_recording());
        info.state = RecordingState::Stopping;
        assert!(!info.is_recording());
    }
}
