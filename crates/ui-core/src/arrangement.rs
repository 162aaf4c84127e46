//! Stream arrangement and pinning
//!
//! [`StreamArrangementController`] turns the unordered, time-varying stream
//! set reported by the engine into a stable, bounded, UI-consumable layout:
//! an ordered pinned set, an optional fullscreen slot, and an auto/manual
//! arrangement mode. All mutation happens through the narrow API below;
//! failures are reported as boolean returns without any state change.

use tracing::{debug, trace};

use crate::engine::{MediaInput, MediaInputControl, SCREEN_SHARE_STREAM_ID};
use crate::types::{ArrangementMode, LayoutConstraints, StreamId, StreamLayoutState, StreamTile};

/// Default pin capacity when none is configured.
pub const DEFAULT_MAX_PINNED: usize = 2;

/// Owns the stream layout state and enforces its invariants.
#[derive(Debug, Clone)]
pub struct StreamArrangementController {
    state: StreamLayoutState,
    max_pinned: usize,
}

impl Default for StreamArrangementController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PINNED)
    }
}

impl StreamArrangementController {
    pub fn new(max_pinned: usize) -> Self {
        Self {
            state: StreamLayoutState::default(),
            max_pinned: max_pinned.max(1),
        }
    }

    /// Current layout state.
    pub fn state(&self) -> &StreamLayoutState {
        &self.state
    }

    pub fn max_pinned(&self) -> usize {
        self.max_pinned
    }

    pub fn mode(&self) -> ArrangementMode {
        self.state.mode
    }

    /// Replace the known tile set with the engine's latest report.
    ///
    /// Tiles are sorted by creation time; pinned ids referencing removed
    /// tiles are pruned and a matching fullscreen id is cleared. A local
    /// screen-share tile is unconditionally pinned first.
    pub fn apply_streams(&mut self, mut tiles: Vec<StreamTile>) {
        tiles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.state.streams = tiles;

        // Prune pins and fullscreen that no longer reference a live tile
        let live: std::collections::HashSet<StreamId> =
            self.state.streams.iter().map(|t| t.id.clone()).collect();
        self.state.pinned_ids.retain(|id| live.contains(id));
        let fullscreen_gone = self
            .state
            .fullscreen_id
            .as_ref()
            .map(|id| !live.contains(id))
            .unwrap_or(false);
        if fullscreen_gone {
            debug!("fullscreen stream removed, clearing slot");
            self.state.fullscreen_id = None;
        }

        let local_share = self
            .state
            .streams
            .iter()
            .find(|t| t.is_mine && t.is_screen_share)
            .map(|t| t.id.clone());
        if let Some(share_id) = local_share {
            self.force_pin_first(&share_id);
        }

        trace!(
            streams = self.state.streams.len(),
            pinned = self.state.pinned_ids.len(),
            "applied stream set"
        );
    }

    /// Pin a stream. Fails without mutation when the id is unknown, or when
    /// the pin set is full and `force` is not set. With `force`, the oldest
    /// evictable pin makes room; the local screen-share pin is never
    /// evictable, so forcing against it fails too.
    pub fn pin(&mut self, id: &StreamId, prepend: bool, force: bool) -> bool {
        if !self.state.contains(id) {
            debug!(stream = %id, "pin refused: unknown stream");
            return false;
        }
        if self.state.is_pinned(id) {
            return true;
        }
        if self.state.pinned_ids.len() >= self.max_pinned {
            if !force {
                debug!(stream = %id, max = self.max_pinned, "pin refused: capacity reached");
                return false;
            }
            if !self.evict_for(None) {
                debug!(stream = %id, "pin refused: no evictable pinned entry");
                return false;
            }
        }
        if prepend {
            self.state.pinned_ids.insert(0, id.clone());
        } else {
            self.state.pinned_ids.push(id.clone());
        }
        debug!(stream = %id, prepend, "stream pinned");
        true
    }

    /// Unpin a stream. Unconditional; unknown ids are ignored.
    pub fn unpin(&mut self, id: &StreamId) {
        self.state.pinned_ids.retain(|p| p != id);
    }

    /// Remove every pin.
    pub fn clear_pinned_streams(&mut self) {
        self.state.pinned_ids.clear();
    }

    /// Elevate a stream to the fullscreen slot. Fails silently when the id
    /// does not reference a live tile.
    pub fn set_fullscreen(&mut self, id: &StreamId) -> bool {
        if !self.state.contains(id) {
            debug!(stream = %id, "fullscreen refused: unknown stream");
            return false;
        }
        self.state.fullscreen_id = Some(id.clone());
        true
    }

    pub fn clear_fullscreen(&mut self) {
        self.state.fullscreen_id = None;
    }

    pub fn fullscreen_id(&self) -> Option<&StreamId> {
        self.state.fullscreen_id.as_ref()
    }

    /// Switch to auto mode: the controller re-derives the arrangement from
    /// stream structure on each `apply_streams`.
    pub fn switch_to_auto_mode(&mut self) {
        if self.state.mode != ArrangementMode::Auto {
            debug!("switching to auto arrangement mode");
            self.state.mode = ArrangementMode::Auto;
        }
    }

    /// Switch to manual mode: only explicit pin/unpin calls mutate the
    /// arrangement from now on.
    pub fn switch_to_manual_mode(&mut self) {
        if self.state.mode != ArrangementMode::Manual {
            debug!("switching to manual arrangement mode");
            self.state.mode = ArrangementMode::Manual;
        }
    }

    /// Change the pin capacity. Shrinking truncates the tail of the pinned
    /// list so the bound holds again.
    pub fn set_max_pinned(&mut self, max_pinned: usize) {
        self.max_pinned = max_pinned.max(1);
        if self.state.pinned_ids.len() > self.max_pinned {
            self.state.pinned_ids.truncate(self.max_pinned);
        }
    }

    /// Arranged tile order: pinned tiles first (pin order), then the rest by
    /// creation time ascending.
    pub fn arranged(&self) -> Vec<StreamTile> {
        let mut out: Vec<StreamTile> = self
            .state
            .pinned_ids
            .iter()
            .filter_map(|id| self.state.stream(id).cloned())
            .collect();
        out.extend(
            self.state
                .streams
                .iter()
                .filter(|t| !self.state.is_pinned(&t.id))
                .cloned(),
        );
        out
    }

    /// Split the arranged list into the featured and thumbnail tiers for the
    /// given layout. Pure function of constraints and tile count.
    pub fn featured_split(
        &self,
        constraints: LayoutConstraints,
    ) -> (Vec<StreamTile>, Vec<StreamTile>) {
        let mut arranged = self.arranged();
        let threshold = constraints.featured_threshold().min(arranged.len());
        let thumbnails = arranged.split_off(threshold);
        (arranged, thumbnails)
    }

    /// Stop the local screen share.
    ///
    /// Succeeds only when the local participant owns the reserved
    /// screen-share stream and an enabled screen-capture input is present.
    /// On success the input is disabled, the capture resource released and
    /// the stream removed. The controller's own stream and pin state is
    /// mutated only on success; when the engine refuses the stream removal
    /// after the input was already disabled, the input stays released and
    /// false is returned.
    pub async fn try_stop_screen_share(
        &mut self,
        inputs: &[MediaInput],
        control: &dyn MediaInputControl,
    ) -> bool {
        let share_id = StreamId::new(SCREEN_SHARE_STREAM_ID);
        let owns_share = self
            .state
            .streams
            .iter()
            .any(|t| t.is_mine && t.id == share_id);
        if !owns_share {
            debug!("stop screen share refused: no local screen-share stream");
            return false;
        }

        let Some(input) = inputs
            .iter()
            .find(|i| i.enabled && i.kind.is_screen_capture())
        else {
            debug!("stop screen share refused: no active screen-capture input");
            return false;
        };

        if !control.try_disable(&input.id).await {
            debug!(input = %input.id, "stop screen share failed: input disable refused");
            return false;
        }
        control.release(&input.id).await;
        let removed = control.remove_stream(&share_id).await;
        if removed {
            self.state.streams.retain(|t| t.id != share_id);
            self.unpin(&share_id);
            if self.state.fullscreen_id.as_ref() == Some(&share_id) {
                self.state.fullscreen_id = None;
            }
        }
        debug!(removed, "screen share stopped");
        removed
    }

    /// Prepend the local screen-share tile to the pinned set, evicting the
    /// least-recently-pinned non-screen-share entry when at capacity.
    fn force_pin_first(&mut self, share_id: &StreamId) {
        if self.state.pinned_ids.first() == Some(share_id) {
            return;
        }
        self.state.pinned_ids.retain(|p| p != share_id);
        if self.state.pinned_ids.len() >= self.max_pinned && !self.evict_for(Some(share_id)) {
            return;
        }
        self.state.pinned_ids.insert(0, share_id.clone());
        debug!(stream = %share_id, "local screen share pinned first");
    }

    /// Drop one pin to make room. Prefers the least-recently-pinned entry
    /// that is not a screen-share tile; falls back to any non-kept entry
    /// except the local screen share, which is never evicted. Returns false
    /// when no entry may be evicted.
    fn evict_for(&mut self, keep: Option<&StreamId>) -> bool {
        let evict_idx = self
            .state
            .pinned_ids
            .iter()
            .enumerate()
            .find(|(_, id)| {
                Some(*id) != keep
                    && !self
                        .state
                        .stream(id)
                        .map(|t| t.is_screen_share)
                        .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .or_else(|| {
                self.state
                    .pinned_ids
                    .iter()
                    .enumerate()
                    .find(|(_, id)| {
                        Some(*id) != keep
                            && !self
                                .state
                                .stream(id)
                                .map(|t| t.is_mine && t.is_screen_share)
                                .unwrap_or(false)
                    })
                    .map(|(i, _)| i)
            });
        match evict_idx {
            Some(idx) => {
                let evicted = self.state.pinned_ids.remove(idx);
                debug!(stream = %evicted, "pin evicted to make room");
                true
            }
            None => {
                debug!("no evictable pinned entry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MediaInputKind;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn tile(id: &str, age_secs: i64) -> StreamTile {
        StreamTile::new(id, format!("owner-{id}"))
            .with_created_at(Utc::now() - Duration::seconds(age_secs))
    }

    fn ids(tiles: &[StreamTile]) -> Vec<&str> {
        tiles.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn streams_sorted_by_creation_time() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("b", 10), tile("a", 30), tile("c", 1)]);
        assert_eq!(ids(&ctrl.state().streams), vec!["a", "b", "c"]);
    }

    #[test]
    fn pin_beyond_capacity_fails_without_mutation() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 3), tile("b", 2), tile("c", 1)]);
        assert!(ctrl.pin(&"a".into(), false, false));
        assert!(ctrl.pin(&"b".into(), false, false));
        assert!(!ctrl.pin(&"c".into(), false, false));
        assert_eq!(ctrl.state().pinned_ids, vec!["a".into(), "b".into()]);
    }

    #[test]
    fn pin_with_force_evicts_oldest() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 3), tile("b", 2), tile("c", 1)]);
        ctrl.pin(&"a".into(), false, false);
        ctrl.pin(&"b".into(), false, false);
        assert!(ctrl.pin(&"c".into(), false, true));
        assert_eq!(ctrl.state().pinned_ids, vec!["b".into(), "c".into()]);
    }

    #[test]
    fn pin_unknown_stream_fails() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 1)]);
        assert!(!ctrl.pin(&"ghost".into(), false, false));
        assert!(ctrl.state().pinned_ids.is_empty());
    }

    #[test]
    fn pin_is_idempotent() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 1)]);
        assert!(ctrl.pin(&"a".into(), false, false));
        assert!(ctrl.pin(&"a".into(), false, false));
        assert_eq!(ctrl.state().pinned_ids, vec!["a".into()]);
    }

    #[test]
    fn removed_stream_pruned_from_pins_and_fullscreen() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 2), tile("b", 1)]);
        ctrl.pin(&"a".into(), false, false);
        ctrl.set_fullscreen(&"a".into());
        ctrl.apply_streams(vec![tile("b", 1)]);
        assert!(ctrl.state().pinned_ids.is_empty());
        assert_eq!(ctrl.state().fullscreen_id, None);
    }

    #[test]
    fn fullscreen_unknown_stream_fails_silently() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 1)]);
        assert!(!ctrl.set_fullscreen(&"ghost".into()));
        assert_eq!(ctrl.state().fullscreen_id, None);
        assert!(ctrl.set_fullscreen(&"a".into()));
        assert_eq!(ctrl.state().fullscreen_id, Some("a".into()));
    }

    #[test]
    fn local_screen_share_pinned_first_with_eviction() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 3), tile("b", 2)]);
        ctrl.pin(&"a".into(), false, false);
        ctrl.pin(&"b".into(), false, false);

        let share = StreamTile::mine(SCREEN_SHARE_STREAM_ID, "me")
            .screen_share()
            .with_created_at(Utc::now());
        ctrl.apply_streams(vec![tile("a", 3), tile("b", 2), share]);

        assert_eq!(
            ctrl.state().pinned_ids.first(),
            Some(&StreamId::new(SCREEN_SHARE_STREAM_ID))
        );
        assert_eq!(ctrl.state().pinned_ids.len(), 2);
        // The least-recently-pinned non-screen-share entry was evicted
        assert!(!ctrl.state().is_pinned(&"a".into()));
        assert!(ctrl.state().is_pinned(&"b".into()));
    }

    #[test]
    fn force_pin_cannot_evict_local_screen_share() {
        let mut ctrl = StreamArrangementController::new(1);
        let share = StreamTile::mine(SCREEN_SHARE_STREAM_ID, "me").screen_share();
        ctrl.apply_streams(vec![tile("a", 2), share]);
        assert_eq!(ctrl.state().pinned_ids, vec![SCREEN_SHARE_STREAM_ID.into()]);

        assert!(!ctrl.pin(&"a".into(), false, true));
        assert_eq!(
            ctrl.state().pinned_ids.first(),
            Some(&StreamId::new(SCREEN_SHARE_STREAM_ID))
        );
        assert_eq!(ctrl.state().pinned_ids.len(), 1);
    }

    #[test]
    fn mode_switches_are_idempotent() {
        let mut ctrl = StreamArrangementController::new(2);
        assert_eq!(ctrl.mode(), ArrangementMode::Auto);
        ctrl.switch_to_manual_mode();
        ctrl.switch_to_manual_mode();
        assert_eq!(ctrl.mode(), ArrangementMode::Manual);
        ctrl.switch_to_auto_mode();
        assert_eq!(ctrl.mode(), ArrangementMode::Auto);
    }

    #[test]
    fn manual_mode_survives_stream_updates() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.switch_to_manual_mode();
        ctrl.apply_streams(vec![tile("a", 2), tile("b", 1)]);
        assert_eq!(ctrl.mode(), ArrangementMode::Manual);
    }

    #[test]
    fn set_max_pinned_shrink_truncates_tail() {
        let mut ctrl = StreamArrangementController::new(3);
        ctrl.apply_streams(vec![tile("a", 3), tile("b", 2), tile("c", 1)]);
        ctrl.pin(&"a".into(), false, false);
        ctrl.pin(&"b".into(), false, false);
        ctrl.pin(&"c".into(), false, false);
        ctrl.set_max_pinned(1);
        assert_eq!(ctrl.state().pinned_ids, vec!["a".into()]);
    }

    #[test]
    fn featured_split_pinned_first() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 4), tile("b", 3), tile("c", 2), tile("d", 1)]);
        ctrl.pin(&"d".into(), false, false);

        let (featured, thumbnails) = ctrl.featured_split(LayoutConstraints::Compact);
        assert_eq!(ids(&featured), vec!["d", "a"]);
        assert_eq!(ids(&thumbnails), vec!["b", "c"]);

        let (featured, thumbnails) = ctrl.featured_split(LayoutConstraints::Medium);
        assert_eq!(ids(&featured), vec!["d", "a", "b", "c"]);
        assert!(thumbnails.is_empty());
    }

    struct FakeInputControl {
        disable_ok: bool,
        remove_ok: bool,
        released: AtomicBool,
    }

    impl FakeInputControl {
        fn new(disable_ok: bool, remove_ok: bool) -> Self {
            Self {
                disable_ok,
                remove_ok,
                released: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl MediaInputControl for FakeInputControl {
        async fn try_disable(&self, _input_id: &str) -> bool {
            self.disable_ok
        }

        async fn release(&self, _input_id: &str) {
            self.released.store(true, Ordering::SeqCst);
        }

        async fn remove_stream(&self, _stream_id: &StreamId) -> bool {
            self.remove_ok
        }
    }

    fn share_setup() -> (StreamArrangementController, Vec<MediaInput>) {
        let mut ctrl = StreamArrangementController::new(2);
        let share = StreamTile::mine(SCREEN_SHARE_STREAM_ID, "me").screen_share();
        ctrl.apply_streams(vec![tile("a", 2), share]);
        let inputs = vec![
            MediaInput::new("cam0", MediaInputKind::Camera).enabled(),
            MediaInput::new("screen0", MediaInputKind::ScreenDevice).enabled(),
        ];
        (ctrl, inputs)
    }

    #[tokio::test]
    async fn stop_screen_share_succeeds_and_removes_stream() {
        let (mut ctrl, inputs) = share_setup();
        let control = FakeInputControl::new(true, true);
        assert!(ctrl.try_stop_screen_share(&inputs, &control).await);
        assert!(control.released.load(Ordering::SeqCst));
        assert!(!ctrl.state().contains(&SCREEN_SHARE_STREAM_ID.into()));
        assert!(!ctrl.state().is_pinned(&SCREEN_SHARE_STREAM_ID.into()));
    }

    #[tokio::test]
    async fn stop_screen_share_fails_without_share_stream() {
        let mut ctrl = StreamArrangementController::new(2);
        ctrl.apply_streams(vec![tile("a", 1)]);
        let inputs = vec![MediaInput::new("screen0", MediaInputKind::ScreenDevice).enabled()];
        let control = FakeInputControl::new(true, true);
        assert!(!ctrl.try_stop_screen_share(&inputs, &control).await);
    }

    #[tokio::test]
    async fn stop_screen_share_fails_without_active_input() {
        let (mut ctrl, _) = share_setup();
        let inputs = vec![MediaInput::new("screen0", MediaInputKind::ScreenDevice)];
        let control = FakeInputControl::new(true, true);
        assert!(!ctrl.try_stop_screen_share(&inputs, &control).await);
        // No mutation on failure
        assert!(ctrl.state().contains(&SCREEN_SHARE_STREAM_ID.into()));
    }

    #[tokio::test]
    async fn stop_screen_share_fails_when_disable_refused() {
        let (mut ctrl, inputs) = share_setup();
        let control = FakeInputControl::new(false, true);
        assert!(!ctrl.try_stop_screen_share(&inputs, &control).await);
        assert!(!control.released.load(Ordering::SeqCst));
        assert!(ctrl.state().contains(&SCREEN_SHARE_STREAM_ID.into()));
    }

    #[tokio::test]
    async fn stop_screen_share_remove_refusal_keeps_arrangement() {
        let (mut ctrl, inputs) = share_setup();
        let control = FakeInputControl::new(true, false);
        assert!(!ctrl.try_stop_screen_share(&inputs, &control).await);
        // The input was released on the way, but the controller's own
        // stream and pin state is untouched
        assert!(control.released.load(Ordering::SeqCst));
        assert!(ctrl.state().contains(&SCREEN_SHARE_STREAM_ID.into()));
        assert!(ctrl.state().is_pinned(&SCREEN_SHARE_STREAM_ID.into()));
    }
}
