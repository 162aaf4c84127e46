//! Call phase resolution
//!
//! Derives the single user-facing call phase from the raw engine signals:
//! connection state, roster, per-participant sub-states, creator identity and
//! local stream presence. Resolution is a pure function, recomputed on every
//! signal tick, with a fixed first-match-wins order.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{
    CallType, ConnectionState, EndReason, ParticipantCallState, ParticipantId,
    ParticipantSnapshot,
};

/// The single user-facing call status value shown in UI chrome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallPhase {
    /// Outgoing call being set up, nobody ringing yet
    Dialing,
    /// Inbound call ringing on the local device
    Ringing,
    /// Outgoing call ringing on at least one remote device
    RingingRemotely,
    /// Transport or media negotiation still in progress
    Connecting,
    /// Fully connected with a live local stream
    Connected,
    /// Transport dropped, engine re-negotiating
    Reconnecting,
    /// Local teardown in progress
    Disconnecting,
    /// Not connected; the call has not been explicitly ended
    Disconnected,
    /// The call is over
    Ended(EndedReason),
}

/// Why the call ended, mapped 1:1 from the engine's raw end reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndedReason {
    /// Ordinary end of call
    Ended,
    /// Remote (or local) party hung up
    HungUp,
    /// Callee declined
    Declined,
    /// Callee busy on another line
    LineBusy,
    /// Rang out without an answer
    Timeout,
    /// Picked up on another device of the same user
    AnsweredOnAnotherDevice,
    /// Removed by an admin; carries the admin's resolved display name
    Kicked { admin_display_name: String },
    /// The local user is already in another call
    CurrentUserInAnotherCall,
    /// The call ended with an error
    Error(ErrorReason),
}

/// Error classification for [`EndedReason::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorReason {
    Server,
    Unknown,
}

impl CallPhase {
    /// True iff the phase is exactly `Connected`. Every `Ended` variant,
    /// `Disconnected`, `Connecting` and `Reconnecting` yield false.
    pub fn is_connected(&self) -> bool {
        matches!(self, CallPhase::Connected)
    }

    /// True for every `Ended` variant.
    pub fn is_ended(&self) -> bool {
        matches!(self, CallPhase::Ended(_))
    }

    /// Short status text for UI chrome.
    pub fn status_message(&self) -> &'static str {
        match self {
            CallPhase::Dialing => "Calling...",
            CallPhase::Ringing => "Incoming call",
            CallPhase::RingingRemotely => "Ringing...",
            CallPhase::Connecting => "Connecting...",
            CallPhase::Connected => "Connected",
            CallPhase::Reconnecting => "Reconnecting...",
            CallPhase::Disconnecting => "Hanging up...",
            CallPhase::Disconnected => "Disconnected",
            CallPhase::Ended(EndedReason::Declined) => "Call declined",
            CallPhase::Ended(EndedReason::LineBusy) => "Line busy",
            CallPhase::Ended(EndedReason::Timeout) => "No answer",
            CallPhase::Ended(EndedReason::AnsweredOnAnotherDevice) => {
                "Answered on another device"
            }
            CallPhase::Ended(EndedReason::Kicked { .. }) => "Removed from call",
            CallPhase::Ended(EndedReason::CurrentUserInAnotherCall) => {
                "Already in another call"
            }
            CallPhase::Ended(EndedReason::Error(_)) => "Call failed",
            CallPhase::Ended(_) => "Call ended",
        }
    }
}

/// Creator-identity signal as observed at resolution time.
///
/// The engine publishes the call creator asynchronously, so the resolver must
/// distinguish "signal not yet delivered" from "delivered but null".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorSignal<'a> {
    /// The creator-accessor has not emitted yet
    Unresolved,
    /// The accessor emitted, but the creator is unknown (null)
    None,
    /// The accessor emitted a concrete creator
    Some(&'a ParticipantId),
}

/// Inputs to one phase resolution pass. Borrowed from the latest engine
/// signal values, never stored.
#[derive(Debug, Clone)]
pub struct PhaseInputs<'a> {
    /// Raw engine connection state
    pub connection: &'a ConnectionState,
    /// Current roster snapshot
    pub participants: &'a [ParticipantSnapshot],
    /// Call creator, as far as the engine has resolved it
    pub creator: CreatorSignal<'a>,
    /// Authenticated local user, if known yet
    pub me: Option<&'a ParticipantId>,
    /// Whether the call was created from a join link
    pub call_type: CallType,
    /// Whether the local user currently has at least one live outgoing stream
    pub has_live_local_stream: bool,
}

/// Resolve the current call phase. Total over its input domain: any engine
/// state with no mapping falls back to the most conservative phase.
pub fn resolve_phase(inputs: &PhaseInputs<'_>) -> CallPhase {
    match inputs.connection {
        ConnectionState::Reconnecting => CallPhase::Reconnecting,

        ConnectionState::Connecting => resolve_connecting(inputs),

        ConnectionState::Connected => {
            if inputs.has_live_local_stream {
                CallPhase::Connected
            } else {
                // Transport is up but we are not streaming yet
                CallPhase::Connecting
            }
        }

        ConnectionState::Disconnected => match inputs.creator {
            CreatorSignal::Unresolved | CreatorSignal::None => CallPhase::Disconnected,
            // An unanswered inbound call keeps ringing until explicitly ended
            CreatorSignal::Some(_) => CallPhase::Ringing,
        },

        ConnectionState::Ended(reason) => {
            CallPhase::Ended(resolve_end_reason(reason, inputs.participants))
        }

        ConnectionState::Disconnecting => CallPhase::Disconnecting,
    }
}

/// `Connecting` is the ambiguous raw state: creator identity decides whether
/// we are dialing out, being called, or still bootstrapping.
fn resolve_connecting(inputs: &PhaseInputs<'_>) -> CallPhase {
    match inputs.creator {
        CreatorSignal::Unresolved => {
            if inputs.me.is_none() {
                // Neither creator nor local identity resolved yet
                CallPhase::Connecting
            } else {
                CallPhase::Dialing
            }
        }
        CreatorSignal::None => CallPhase::Dialing,
        CreatorSignal::Some(creator) => {
            let creator_is_me = inputs
                .participants
                .iter()
                .any(|p| p.is_me && &p.user_id == creator)
                || inputs.me.map_or(false, |m| m == creator);

            if creator_is_me {
                let anyone_ringing = inputs
                    .participants
                    .iter()
                    .any(|p| !p.is_me && p.state == ParticipantCallState::Ringing);
                if anyone_ringing {
                    CallPhase::RingingRemotely
                } else {
                    CallPhase::Dialing
                }
            } else if inputs.call_type == CallType::Link {
                // Link calls created by someone else never ring locally
                CallPhase::Disconnected
            } else {
                CallPhase::Ringing
            }
        }
    }
}

/// Map a raw end reason onto its UI-facing counterpart, resolving the
/// kicking admin's display name from the roster when available.
fn resolve_end_reason(reason: &EndReason, participants: &[ParticipantSnapshot]) -> EndedReason {
    match reason {
        EndReason::Normal => EndedReason::Ended,
        EndReason::HungUp => EndedReason::HungUp,
        EndReason::Declined => EndedReason::Declined,
        EndReason::LineBusy => EndedReason::LineBusy,
        EndReason::Timeout => EndedReason::Timeout,
        EndReason::AnsweredOnAnotherDevice => EndedReason::AnsweredOnAnotherDevice,
        EndReason::Kicked { admin_user_id } => {
            let admin_display_name = participants
                .iter()
                .find(|p| p.user_id.as_str() == admin_user_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_else(|| {
                    warn!(admin = %admin_user_id, "kick admin not found in roster, using raw id");
                    admin_user_id.clone()
                });
            EndedReason::Kicked { admin_display_name }
        }
        EndReason::CurrentUserInAnotherCall => EndedReason::CurrentUserInAnotherCall,
        EndReason::ServerError { .. } => EndedReason::Error(ErrorReason::Server),
        EndReason::UnknownError { .. } => EndedReason::Error(ErrorReason::Unknown),
    }
}
