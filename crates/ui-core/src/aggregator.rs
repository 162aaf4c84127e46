//! Call UI state aggregation
//!
//! [`CallUiStateAggregator`] combines the phase resolver, the arrangement
//! controller and the stability debouncer with the secondary derived signals
//! (group-call flag, audio-only flag, recording, watermark) into one
//! immutable [`CallUiState`] snapshot per emission. Recombination always
//! reads the latest value of every engine channel; snapshots are internally
//! consistent and, once the call has ended, frozen.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, trace};

use crate::arrangement::{StreamArrangementController, DEFAULT_MAX_PINNED};
use crate::debounce::{
    decide, DebounceDecision, DebounceWindows, Debouncer, Situation, StabilityContext,
};
use crate::engine::{EngineSignals, MediaInputControl, RosterSnapshot};
use crate::error::{UiCoreError, UiCoreResult};
use crate::phase::{resolve_phase, CallPhase, CreatorSignal, PhaseInputs};
use crate::types::{
    CallType, LayoutConstraints, ParticipantId, RecordingInfo, StreamId, StreamTile,
    WatermarkInfo,
};

/// Why the local user is shown as alone in the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AloneState {
    /// Nobody else has joined yet
    WaitingForOthers,
    /// There were other participants and they all left
    LeftAlone,
}

/// Immutable render-ready snapshot consumed by presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallUiState {
    /// Current user-facing call phase
    pub phase: CallPhase,
    /// Tiles in the featured tier, arrangement order
    pub featured: Vec<StreamTile>,
    /// Tiles in the thumbnail tier, arrangement order
    pub thumbnails: Vec<StreamTile>,
    /// Pinned tile ids, head first
    pub pinned_ids: Vec<StreamId>,
    /// Tile elevated to fullscreen, if any
    pub fullscreen_id: Option<StreamId>,
    /// Alone banner to show, if any
    pub alone: Option<AloneState>,
    /// More than one other human participant is on the roster
    pub is_group_call: bool,
    /// The call carries no video by configuration
    pub is_audio_only: bool,
    /// Recording mode and live state
    pub recording: RecordingInfo,
    /// Branding overlay
    pub watermark: WatermarkInfo,
    /// Other participants currently in the call
    pub others_in_call: usize,
    /// Terminal flag; once true no further stream/pin mutations are emitted
    pub is_call_ended: bool,
}

impl CallUiState {
    /// Quiescent snapshot published before the first recombination pass.
    pub fn initial() -> Self {
        Self {
            phase: CallPhase::Disconnected,
            featured: Vec::new(),
            thumbnails: Vec::new(),
            pinned_ids: Vec::new(),
            fullscreen_id: None,
            alone: None,
            is_group_call: false,
            is_audio_only: false,
            recording: RecordingInfo::default(),
            watermark: WatermarkInfo::default(),
            others_in_call: 0,
            is_call_ended: false,
        }
    }

    /// Total number of visible tiles.
    pub fn stream_count(&self) -> usize {
        self.featured.len() + self.thumbnails.len()
    }
}

/// Static configuration of one aggregator instance.
#[derive(Debug, Clone)]
pub struct CallUiConfig {
    /// Pin capacity
    pub max_pinned: usize,
    /// Layout of the hosting surface
    pub layout: LayoutConstraints,
    /// Company/system participant excluded from group-call counting
    pub company_user_id: Option<ParticipantId>,
    /// Debounce windows
    pub windows: DebounceWindows,
    /// How the call was created
    pub call_type: CallType,
}

impl Default for CallUiConfig {
    fn default() -> Self {
        Self {
            max_pinned: DEFAULT_MAX_PINNED,
            layout: LayoutConstraints::Compact,
            company_user_id: None,
            windows: DebounceWindows::default(),
            call_type: CallType::Default,
        }
    }
}

impl CallUiConfig {
    pub fn validate(&self) -> UiCoreResult<()> {
        if self.max_pinned == 0 {
            return Err(UiCoreError::invalid_configuration(
                "max_pinned must be at least 1",
            ));
        }
        Ok(())
    }
}

struct AggregatorInner {
    controller: StreamArrangementController,
    debouncer: Debouncer<CallUiState>,
    /// Situation the pending held snapshot was classified as; a repeat of
    /// the same situation refreshes the held value without restarting its
    /// window
    pending_situation: Option<Situation>,
    /// There was at least one other in-call participant earlier in the call
    had_others: bool,
    ended: bool,
}

/// Root policy engine: owns the arrangement controller and the debouncer,
/// recombines engine signals into [`CallUiState`] snapshots.
pub struct CallUiStateAggregator {
    inner: Mutex<AggregatorInner>,
    signals: EngineSignals,
    control: Arc<dyn MediaInputControl>,
    ui_tx: watch::Sender<CallUiState>,
    config: CallUiConfig,
}

impl CallUiStateAggregator {
    /// Create an aggregator and the UI-state channel it publishes to.
    pub fn new(
        signals: EngineSignals,
        control: Arc<dyn MediaInputControl>,
        config: CallUiConfig,
    ) -> UiCoreResult<(Arc<Self>, watch::Receiver<CallUiState>)> {
        config.validate()?;
        let (ui_tx, ui_rx) = watch::channel(CallUiState::initial());
        let aggregator = Arc::new(Self {
            inner: Mutex::new(AggregatorInner {
                controller: StreamArrangementController::new(config.max_pinned),
                debouncer: Debouncer::new(),
                pending_situation: None,
                had_others: false,
                ended: false,
            }),
            signals,
            control,
            ui_tx,
            config,
        });
        Ok((aggregator, ui_rx))
    }

    /// Drive the recombination loop until the call ends or the engine drops
    /// its signal channels. Pending debounced emissions are discarded on
    /// teardown.
    pub async fn run(self: Arc<Self>) -> UiCoreResult<()> {
        info!("call UI aggregator started");
        // Fold the initial signal values into a first snapshot
        self.recompute().await;

        let mut signals = self.signals.clone();
        loop {
            let deadline = { self.inner.lock().await.debouncer.deadline() };
            let window = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => futures::future::pending::<()>().await,
                }
            };

            tokio::select! {
                res = signals.connection.changed() => self.on_signal(res, "connection").await?,
                res = signals.roster.changed() => self.on_signal(res, "roster").await?,
                res = signals.streams.changed() => self.on_signal(res, "streams").await?,
                res = signals.recording.changed() => self.on_signal(res, "recording").await?,
                res = signals.preferred_media.changed() => self.on_signal(res, "preferred_media").await?,
                res = signals.watermark.changed() => self.on_signal(res, "watermark").await?,
                _ = window => self.flush_expired().await,
            }

            if self.inner.lock().await.ended {
                info!("call ended, aggregator stopping");
                return Ok(());
            }
        }
    }

    async fn on_signal(
        &self,
        res: Result<(), watch::error::RecvError>,
        channel: &'static str,
    ) -> UiCoreResult<()> {
        match res {
            Ok(()) => {
                self.recompute().await;
                Ok(())
            }
            Err(_) => {
                let ended = self.inner.lock().await.ended;
                if ended {
                    Ok(())
                } else {
                    Err(UiCoreError::ChannelClosed { channel })
                }
            }
        }
    }

    /// One synchronous recombination pass over the latest signal values.
    pub async fn recompute(&self) {
        let connection = self.signals.connection.borrow().clone();
        let roster = self.signals.roster.borrow().clone();
        let streams = self.signals.streams.borrow().clone();
        let recording = *self.signals.recording.borrow();
        let preferred = *self.signals.preferred_media.borrow();
        let watermark = self.signals.watermark.borrow().clone();

        let mut inner = self.inner.lock().await;
        if inner.ended {
            return;
        }

        inner.controller.apply_streams(streams.clone());

        let has_live_local_stream = streams.iter().any(|t| t.is_mine);
        let creator = match &roster.creator {
            None => CreatorSignal::Unresolved,
            Some(None) => CreatorSignal::None,
            Some(Some(id)) => CreatorSignal::Some(id),
        };
        let phase = resolve_phase(&PhaseInputs {
            connection: &connection,
            participants: &roster.participants,
            creator,
            me: roster.me.as_ref(),
            call_type: self.config.call_type,
            has_live_local_stream,
        });

        let published = self.ui_tx.borrow().clone();

        // Fullscreen is force-cleared on reconnect entry, never debounced
        if phase == CallPhase::Reconnecting && published.phase != CallPhase::Reconnecting {
            debug!("entering reconnecting, force-clearing fullscreen");
            inner.controller.clear_fullscreen();
        }

        let candidate = self.build_snapshot(
            &inner,
            phase,
            &roster,
            recording,
            preferred.is_audio_only(),
            watermark,
        );

        let situation = classify(&candidate, &published);
        let ctx = StabilityContext {
            phase: candidate.phase.clone(),
            stream_count: candidate.stream_count(),
            others_in_call: candidate.others_in_call,
            had_others: inner.had_others,
        };
        let decision = decide(situation, &ctx, &self.config.windows);

        if candidate.others_in_call > 0 {
            inner.had_others = true;
        }

        if candidate.is_call_ended {
            // Terminal: freeze the arrangement at its last published value
            inner.debouncer.cancel();
            inner.pending_situation = None;
            inner.ended = true;
            let final_state = CallUiState {
                phase: candidate.phase,
                is_call_ended: true,
                alone: None,
                ..published
            };
            self.ui_tx.send_replace(final_state);
            return;
        }

        match decision {
            DebounceDecision::Immediate => {
                if inner.debouncer.cancel() {
                    trace!("pending held snapshot cancelled by immediate update");
                }
                inner.pending_situation = None;
                trace!(
                    phase = ?candidate.phase,
                    streams = candidate.stream_count(),
                    "publishing snapshot"
                );
                self.ui_tx.send_replace(candidate);
            }
            DebounceDecision::Delayed(window) => {
                // Only the flicker-prone fields wait out the window. A held
                // stream collapse keeps the published arrangement; a held
                // banner keeps the published `alone`. Everything else
                // (phase, recording, flags, watermark) surfaces right away.
                let immediate = match situation {
                    Situation::SingleStream => CallUiState {
                        featured: published.featured.clone(),
                        thumbnails: published.thumbnails.clone(),
                        pinned_ids: published.pinned_ids.clone(),
                        fullscreen_id: published.fullscreen_id.clone(),
                        ..candidate.clone()
                    },
                    _ => CallUiState {
                        alone: published.alone,
                        ..candidate.clone()
                    },
                };
                if immediate != published {
                    self.ui_tx.send_replace(immediate);
                }

                if inner.pending_situation == Some(situation)
                    && inner.debouncer.update_pending(candidate.clone())
                {
                    trace!(?situation, "held snapshot refreshed, deadline kept");
                } else {
                    inner
                        .debouncer
                        .submit(candidate, DebounceDecision::Delayed(window));
                    inner.pending_situation = Some(situation);
                }
            }
        }
    }

    /// Surface a pending debounced snapshot whose window has elapsed.
    pub async fn flush_expired(&self) {
        let mut inner = self.inner.lock().await;
        if inner.ended {
            inner.debouncer.cancel();
            inner.pending_situation = None;
            return;
        }
        if let Some(state) = inner.debouncer.take_expired() {
            inner.pending_situation = None;
            debug!("debounce window elapsed, publishing held snapshot");
            self.ui_tx.send_replace(state);
        }
    }

    fn build_snapshot(
        &self,
        inner: &AggregatorInner,
        phase: CallPhase,
        roster: &RosterSnapshot,
        recording: RecordingInfo,
        is_audio_only: bool,
        watermark: WatermarkInfo,
    ) -> CallUiState {
        let (featured, thumbnails) = inner.controller.featured_split(self.config.layout);
        let layout = inner.controller.state();
        let others_in_call = roster.others_in_call();
        let other_humans = roster
            .participants
            .iter()
            .filter(|p| {
                !p.is_me
                    && self
                        .config
                        .company_user_id
                        .as_ref()
                        .map(|company| &p.user_id != company)
                        .unwrap_or(true)
            })
            .count();
        let alone = if others_in_call == 0 && !phase.is_ended() {
            if inner.had_others {
                Some(AloneState::LeftAlone)
            } else {
                Some(AloneState::WaitingForOthers)
            }
        } else {
            None
        };

        CallUiState {
            is_call_ended: phase.is_ended(),
            phase,
            featured,
            thumbnails,
            pinned_ids: layout.pinned_ids.clone(),
            fullscreen_id: layout.fullscreen_id.clone(),
            alone,
            is_group_call: other_humans > 1,
            is_audio_only,
            recording,
            watermark,
            others_in_call,
        }
    }

    /// Re-publish the current arrangement after an explicit user action.
    /// User actions are never debounced and cancel any pending emission.
    async fn publish_after_action(&self, inner: &mut AggregatorInner) {
        inner.debouncer.cancel();
        inner.pending_situation = None;
        let published = self.ui_tx.borrow().clone();
        let (featured, thumbnails) = inner.controller.featured_split(self.config.layout);
        let layout = inner.controller.state();
        let state = CallUiState {
            featured,
            thumbnails,
            pinned_ids: layout.pinned_ids.clone(),
            fullscreen_id: layout.fullscreen_id.clone(),
            ..published
        };
        self.ui_tx.send_replace(state);
    }

    /// Pin a stream. Returns false without mutation when the id is unknown,
    /// the pin set is full (and `force` is unset), or the call has ended.
    pub async fn pin(&self, id: &StreamId, prepend: bool, force: bool) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.ended {
            return false;
        }
        let pinned = inner.controller.pin(id, prepend, force);
        if pinned {
            self.publish_after_action(&mut inner).await;
        }
        pinned
    }

    /// Unpin a stream.
    pub async fn unpin(&self, id: &StreamId) {
        let mut inner = self.inner.lock().await;
        if inner.ended {
            return;
        }
        inner.controller.unpin(id);
        self.publish_after_action(&mut inner).await;
    }

    /// Remove every pin.
    pub async fn clear_pinned_streams(&self) {
        let mut inner = self.inner.lock().await;
        if inner.ended {
            return;
        }
        inner.controller.clear_pinned_streams();
        self.publish_after_action(&mut inner).await;
    }

    /// Elevate a stream to fullscreen. Fails silently on unknown ids.
    pub async fn set_fullscreen(&self, id: &StreamId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.ended {
            return false;
        }
        let set = inner.controller.set_fullscreen(id);
        if set {
            self.publish_after_action(&mut inner).await;
        }
        set
    }

    pub async fn clear_fullscreen(&self) {
        let mut inner = self.inner.lock().await;
        if inner.ended {
            return;
        }
        inner.controller.clear_fullscreen();
        self.publish_after_action(&mut inner).await;
    }

    /// Change the pin capacity.
    pub async fn set_max_pinned_streams(&self, max_pinned: usize) {
        let mut inner = self.inner.lock().await;
        if inner.ended {
            return;
        }
        inner.controller.set_max_pinned(max_pinned);
        self.publish_after_action(&mut inner).await;
    }

    pub async fn switch_to_auto_mode(&self) {
        let mut inner = self.inner.lock().await;
        inner.controller.switch_to_auto_mode();
    }

    pub async fn switch_to_manual_mode(&self) {
        let mut inner = self.inner.lock().await;
        inner.controller.switch_to_manual_mode();
    }

    /// Stop the local screen share via the engine's input controls.
    /// All-or-nothing; returns false with no side effects on any failure.
    pub async fn try_stop_screen_share(&self) -> bool {
        let inputs = self.signals.inputs.borrow().clone();
        let mut inner = self.inner.lock().await;
        if inner.ended {
            return false;
        }
        let stopped = inner
            .controller
            .try_stop_screen_share(&inputs, self.control.as_ref())
            .await;
        if stopped {
            self.publish_after_action(&mut inner).await;
        }
        stopped
    }
}

/// Adapt a UI-state receiver into a `Stream` of snapshots for consumers
/// that prefer stream combinators over the watch API.
pub fn ui_state_stream(
    rx: watch::Receiver<CallUiState>,
) -> tokio_stream::wrappers::WatchStream<CallUiState> {
    tokio_stream::wrappers::WatchStream::new(rx)
}

/// Classify which stability situation a candidate transition falls into.
///
/// The banner transitions and the collapse to a single stream are the only
/// delayed situations; everything else (growth, phase-only changes) is an
/// ordinary arrangement update. A coinciding phase change never exempts a
/// banner from its window: [`decide`] gates on the candidate's own phase,
/// and the phase itself is published immediately by the caller.
fn classify(candidate: &CallUiState, published: &CallUiState) -> Situation {
    if candidate.alone.is_some() && published.alone.is_none() {
        return match candidate.alone {
            Some(AloneState::LeftAlone) => Situation::LeftAlone,
            _ => Situation::WaitingForOthers,
        };
    }
    if candidate.stream_count() == 1 && published.stream_count() > 1 {
        return Situation::SingleStream;
    }
    Situation::Arrangement
}
