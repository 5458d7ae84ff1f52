//! One shared sampling session fanned out to many consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use glam::DVec2;
use terra_quadtree::{ImportantNodeSet, Mbr, Node, NodeEvaluator, NodeSet};
use tracing::{debug, info, trace, warn};

use crate::{
    ChangeRequest, ChangeSet, DelegateId, QuadDisplayController, QuadTileBuilder,
    QuadTileBuilderDelegate, QuadTileBuilderDelegateRef, SamplingParams, TileBuilderDelegateInfo,
    ViewState,
};

/// Lifecycle of a [`QuadSamplingController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingState {
    Unstarted,
    /// Parameters are set; the builder has not run yet.
    Started,
    /// The builder is up and delegates are receiving batches.
    Loading,
    Stopped,
}

/// Everything created by `start`.
struct Session {
    params: SamplingParams,
    builder: Arc<QuadTileBuilder>,
    display: Mutex<QuadDisplayController>,
}

enum SessionSlot {
    Unstarted,
    Running(Arc<Session>),
    Stopped,
}

struct DelegateEntry {
    delegate: QuadTileBuilderDelegateRef,
    /// Last builder batch this delegate has seen, `None` until it has been
    /// brought up to date.
    synced: Option<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scores tiles for the quadtree through a [`ViewState`].
struct ViewEvaluator<'a> {
    params: &'a SamplingParams,
    view: &'a dyn ViewState,
    frame_size: DVec2,
}

impl<'a> ViewEvaluator<'a> {
    fn new(params: &'a SamplingParams, view: &'a dyn ViewState, frame_size: DVec2) -> Self {
        Self {
            params,
            view,
            frame_size,
        }
    }

    fn clipped(&self, mbr: &Mbr) -> bool {
        self.params
            .clip_bounds
            .is_some_and(|clip| !clip.overlaps(mbr))
    }
}

impl NodeEvaluator for ViewEvaluator<'_> {
    fn importance(&mut self, node: Node, mbr: &Mbr) -> f64 {
        if self.clipped(mbr) {
            return 0.0;
        }
        if node.level == 0 && self.params.min_importance_top == 0.0 {
            return f64::INFINITY;
        }
        self.view
            .screen_importance(self.frame_size, &self.params.coord_sys, mbr, node)
    }

    fn visible(&mut self, node: Node, mbr: &Mbr) -> bool {
        if self.clipped(mbr) {
            return false;
        }
        node.level == 0
            || self
                .view
                .is_on_screen(self.frame_size, &self.params.coord_sys, mbr, node)
    }
}

/// Owns one quadtree loading session and broadcasts its load/unload
/// decisions to every registered [`QuadTileBuilderDelegate`].
///
/// Delegates may be added and removed from any thread. Delegate callbacks
/// always run outside the registration lock, on a snapshot of the list, so
/// a callback may itself add or remove delegates. [`update_view`] must not
/// be called from inside a callback.
///
/// [`update_view`]: QuadSamplingController::update_view
pub struct QuadSamplingController {
    id: DelegateId,
    session: RwLock<SessionSlot>,
    delegates: Mutex<Vec<DelegateEntry>>,
    builder_started: AtomicBool,
}

impl Default for QuadSamplingController {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadSamplingController {
    pub fn new() -> Self {
        Self {
            id: DelegateId::next(),
            session: RwLock::new(SessionSlot::Unstarted),
            delegates: Mutex::new(Vec::new()),
            builder_started: AtomicBool::new(false),
        }
    }

    /// Set up the builder and display controller for `params`.
    ///
    /// # Panics
    ///
    /// If the controller was already started or stopped.
    pub fn start(&self, params: SamplingParams) {
        let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
        assert!(
            matches!(*slot, SessionSlot::Unstarted),
            "sampling controller started twice"
        );
        info!(
            min_zoom = params.min_zoom,
            max_zoom = params.max_zoom,
            reported_max_zoom = params.reported_max_zoom,
            tessellation = ?params.geometry.tessellation,
            max_tiles = params.max_tiles,
            single_level = params.single_level,
            "starting sampling session"
        );
        *slot = SessionSlot::Running(Arc::new(Session {
            builder: Arc::new(QuadTileBuilder::new(params.geometry)),
            display: Mutex::new(QuadDisplayController::new(&params)),
            params,
        }));
    }

    /// Tear the session down. Every delegate gets its shutdown hook, the
    /// builder drops its tiles and the delegate list is cleared. The
    /// returned changes remove whatever was still in the scene.
    pub fn stop(&self) -> ChangeSet {
        let previous = {
            let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, SessionSlot::Stopped)
        };
        let entries = std::mem::take(&mut *lock(&self.delegates));
        let was_loading = self.builder_started.swap(false, Ordering::AcqRel);

        let mut changes = ChangeSet::new();
        if let SessionSlot::Running(session) = previous {
            for entry in &entries {
                if entry.synced.is_some() {
                    entry.delegate.builder_shutdown(&session.builder, &mut changes);
                }
            }
            session.builder.shutdown(&mut changes);
            info!(
                delegates = entries.len(),
                was_loading,
                changes = changes.len(),
                "stopped sampling session"
            );
        }
        changes
    }

    pub fn state(&self) -> SamplingState {
        match &*self.session.read().unwrap_or_else(PoisonError::into_inner) {
            SessionSlot::Unstarted => SamplingState::Unstarted,
            SessionSlot::Stopped => SamplingState::Stopped,
            SessionSlot::Running(_) if self.builder_started.load(Ordering::Acquire) => {
                SamplingState::Loading
            }
            SessionSlot::Running(_) => SamplingState::Started,
        }
    }

    fn session(&self) -> Option<Arc<Session>> {
        match &*self.session.read().unwrap_or_else(PoisonError::into_inner) {
            SessionSlot::Running(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    pub fn params(&self) -> Option<SamplingParams> {
        self.session().map(|session| session.params.clone())
    }

    pub fn builder(&self) -> Option<Arc<QuadTileBuilder>> {
        self.session().map(|session| Arc::clone(&session.builder))
    }

    /// Run `f` against the session's display controller.
    pub fn with_display<R>(&self, f: impl FnOnce(&QuadDisplayController) -> R) -> Option<R> {
        self.session().map(|session| {
            let display = lock(&session.display);
            f(&display)
        })
    }

    pub fn delegate_count(&self) -> usize {
        lock(&self.delegates).len()
    }

    /// Register a delegate.
    ///
    /// Returns whether the session was already loading, in which case the
    /// caller should follow up with [`notify_delegate_startup`] so the
    /// delegate catches up. Adding to a stopped controller is ignored.
    ///
    /// [`notify_delegate_startup`]: QuadSamplingController::notify_delegate_startup
    pub fn add_builder_delegate(&self, delegate: QuadTileBuilderDelegateRef) -> bool {
        let mut delegates = lock(&self.delegates);
        if matches!(
            *self.session.read().unwrap_or_else(PoisonError::into_inner),
            SessionSlot::Stopped
        ) {
            warn!(delegate = delegate.id().get(), "delegate added after stop; ignoring");
            return false;
        }
        if delegates.iter().any(|e| e.delegate.id() == delegate.id()) {
            warn!(delegate = delegate.id().get(), "delegate registered twice");
            return self.builder_started.load(Ordering::Acquire);
        }
        debug!(delegate = delegate.id().get(), "adding builder delegate");
        delegates.push(DelegateEntry {
            delegate,
            synced: None,
        });
        self.builder_started.load(Ordering::Acquire)
    }

    /// Bring a delegate that joined a loading session up to date with one
    /// synthetic batch holding every loaded tile.
    ///
    /// Does nothing for unknown delegates, delegates already up to date, or
    /// sessions whose builder has not started (they catch up on the first
    /// view update instead).
    pub fn notify_delegate_startup(&self, id: DelegateId, changes: &mut ChangeSet) {
        let Some(session) = self.session() else {
            return;
        };
        if !self.builder_started.load(Ordering::Acquire) {
            return;
        }

        let (delegate, info) = {
            let mut delegates = lock(&self.delegates);
            let Some(entry) = delegates.iter_mut().find(|e| e.delegate.id() == id) else {
                return;
            };
            if entry.synced.is_some() {
                return;
            }
            let info = session.builder.loading_state();
            entry.synced = Some(info.sequence);
            (Arc::clone(&entry.delegate), info)
        };

        debug!(
            delegate = id.get(),
            tiles = info.load_tiles.len(),
            "replaying loaded tiles"
        );
        delegate.set_builder(&session.builder, &session.params);
        delegate.builder_load(&session.builder, &info, changes);
    }

    /// Unregister a delegate, running its shutdown hook. The returned
    /// changes come from that hook.
    pub fn remove_builder_delegate(&self, id: DelegateId) -> ChangeSet {
        let removed = {
            let mut delegates = lock(&self.delegates);
            let Some(index) = delegates.iter().position(|e| e.delegate.id() == id) else {
                return ChangeSet::new();
            };
            delegates.remove(index)
        };
        debug!(delegate = id.get(), "removed builder delegate");

        let mut changes = ChangeSet::new();
        if removed.synced.is_some()
            && let Some(session) = self.session()
        {
            removed
                .delegate
                .builder_shutdown(&session.builder, &mut changes);
        }
        changes
    }

    /// Delegates that have caught up, in registration order.
    fn synced_delegates(&self) -> Vec<QuadTileBuilderDelegateRef> {
        lock(&self.delegates)
            .iter()
            .filter(|e| e.synced.is_some())
            .map(|e| Arc::clone(&e.delegate))
            .collect()
    }

    /// True while any delegate still has work in flight.
    pub fn builder_is_loading(&self) -> bool {
        self.synced_delegates()
            .iter()
            .any(|delegate| delegate.builder_is_loading())
    }

    /// Importance of one tile under `view`. Zero before start.
    pub fn importance_for_tile(
        &self,
        node: Node,
        mbr: &Mbr,
        view: &dyn ViewState,
        frame_size: DVec2,
    ) -> f64 {
        self.session().map_or(0.0, |session| {
            ViewEvaluator::new(&session.params, view, frame_size).importance(node, mbr)
        })
    }

    /// Visibility of one tile under `view`. False before start.
    pub fn visibility_for_tile(
        &self,
        node: Node,
        mbr: &Mbr,
        view: &dyn ViewState,
        frame_size: DVec2,
    ) -> bool {
        self.session().is_some_and(|session| {
            ViewEvaluator::new(&session.params, view, frame_size).visible(node, mbr)
        })
    }

    /// Hand the builder to every registered delegate, once per session.
    fn start_builder(&self, session: &Session) {
        let newly_started = {
            let mut delegates = lock(&self.delegates);
            if self.builder_started.swap(true, Ordering::AcqRel) {
                return;
            }
            let sequence = session.builder.sequence();
            delegates
                .iter_mut()
                .filter(|e| e.synced.is_none())
                .map(|e| {
                    e.synced = Some(sequence);
                    Arc::clone(&e.delegate)
                })
                .collect::<Vec<_>>()
        };
        debug!(delegates = newly_started.len(), "builder started");
        for delegate in newly_started {
            delegate.set_builder(&session.builder, &session.params);
        }
    }

    /// Run one frame: score the view, update the resident set, build and
    /// unload tiles and let every delegate react. Returns the frame's
    /// scene changes. Does nothing unless the session is running.
    pub fn update_view(&self, view: &dyn ViewState, frame_size: DVec2) -> ChangeSet {
        let mut changes = ChangeSet::new();
        let Some(session) = self.session() else {
            warn!("view update on a controller that is not running");
            return changes;
        };
        self.start_builder(&session);

        let params = &session.params;
        let keep_min_level =
            params.force_min_level && view.eye_height() >= params.force_min_level_height;

        let (update, kept) = {
            let mut display = lock(&session.display);
            let mut evaluator = ViewEvaluator::new(params, view, frame_size);
            let update = display.evaluate(&mut evaluator, keep_min_level);
            let kept = session.builder.build_tiles(self, &update, &mut changes);
            display.commit(&update, &kept);
            (update, kept)
        };

        self.builder_pre_scene_flush(&session.builder, &mut changes);

        debug!(
            target_level = update.target_level,
            to_load = update.to_load.len(),
            unload_candidates = update.unload_candidates.len(),
            kept = kept.len(),
            changes = changes.len(),
            "view update"
        );
        changes
    }
}

impl QuadTileBuilderDelegate for QuadSamplingController {
    fn id(&self) -> DelegateId {
        self.id
    }

    /// New tiles start hidden, then every delegate sees the batch.
    fn builder_load(
        &self,
        builder: &QuadTileBuilder,
        info: &TileBuilderDelegateInfo,
        changes: &mut ChangeSet,
    ) {
        changes.extend(
            info.load_tiles
                .iter()
                .flat_map(|tile| tile.draw_ids.iter())
                .map(|&id| ChangeRequest::OnOff { id, enable: false }),
        );

        let targets: Vec<QuadTileBuilderDelegateRef> = lock(&self.delegates)
            .iter()
            .filter(|e| e.synced.is_some_and(|seen| seen < info.sequence))
            .map(|e| Arc::clone(&e.delegate))
            .collect();
        for delegate in targets {
            delegate.builder_load(builder, info, changes);
        }
    }

    /// A tile stays loaded while any delegate still needs it.
    fn builder_unload_check(
        &self,
        builder: &QuadTileBuilder,
        load_tiles: &ImportantNodeSet,
        unload_tiles: &NodeSet,
        target_level: u32,
    ) -> NodeSet {
        let mut keep = NodeSet::new();
        for delegate in self.synced_delegates() {
            let vetoed =
                delegate.builder_unload_check(builder, load_tiles, unload_tiles, target_level);
            if !vetoed.is_empty() {
                trace!(
                    delegate = delegate.id().get(),
                    vetoed = vetoed.len(),
                    "delegate kept tiles"
                );
            }
            keep.extend(vetoed);
        }
        keep
    }

    fn builder_pre_scene_flush(&self, builder: &QuadTileBuilder, changes: &mut ChangeSet) {
        for delegate in self.synced_delegates() {
            delegate.builder_pre_scene_flush(builder, changes);
        }
    }

    fn builder_shutdown(&self, builder: &QuadTileBuilder, changes: &mut ChangeSet) {
        for delegate in self.synced_delegates() {
            delegate.builder_shutdown(builder, changes);
        }
    }

    fn builder_is_loading(&self) -> bool {
        QuadSamplingController::builder_is_loading(self)
    }
}
