// src/core/session.rs

//! A live view: its request, session overrides and the last computed
//! [`EffectiveView`]. Changes go through a [`Debouncer`], so any number of
//! them before the scheduler's next turn cost one recompute and one refresh.

use anyhow::{Context, Result};
use log::{debug, error};
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::cascade::StateLayer;
use crate::core::catalog::ViewRequest;
use crate::core::query::ResultSet;
use crate::core::scheduler::{Debouncer, Scheduler};
use crate::core::view::EffectiveView;
use crate::core::view_arguments::ViewArguments;
use crate::models::Value;
use crate::state::{AppContext, ViewStates};

/// Which cascade a state write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTarget {
    /// `[view]` properties such as the title or active renderer.
    View,
    /// `[datasource]` properties such as the query and sort order.
    Datasource,
    /// Options of the active renderer.
    Renderer,
}

#[derive(Default)]
struct SessionState {
    states: ViewStates,
    arguments: ViewArguments,
    effective: Option<EffectiveView>,
    recompute_count: usize,
}

type RefreshCallback = Box<dyn FnMut(&EffectiveView)>;

/// One open view. Overrides written through [`ViewSession::set_state`] are
/// kept per session and folded into the cascade on the next recompute.
pub struct ViewSession {
    context: Rc<AppContext>,
    request: ViewRequest,
    shared: Rc<RefCell<SessionState>>,
    scheduler: Rc<dyn Scheduler>,
    debouncer: Debouncer,
    on_refresh: Rc<RefCell<Option<RefreshCallback>>>,
}

impl ViewSession {
    /// A session for `request` with no overrides. Nothing is computed until
    /// the first recompute.
    pub fn new(context: Rc<AppContext>, request: ViewRequest, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            context,
            request,
            shared: Rc::new(RefCell::new(SessionState::default())),
            scheduler,
            debouncer: Debouncer::new(),
            on_refresh: Rc::new(RefCell::new(None)),
        }
    }

    /// Sets the arguments the view is opened with.
    pub fn with_arguments(self, arguments: ViewArguments) -> Self {
        self.shared.borrow_mut().arguments = arguments;
        self
    }

    /// Restores previously saved overrides.
    pub fn with_states(self, states: ViewStates) -> Self {
        self.shared.borrow_mut().states = states;
        self
    }

    /// Called after every recompute with the new effective view.
    pub fn on_refresh<F>(&self, callback: F)
    where
        F: FnMut(&EffectiveView) + 'static,
    {
        *self.on_refresh.borrow_mut() = Some(Box::new(callback));
    }

    /// The view this session shows.
    pub fn request(&self) -> &ViewRequest {
        &self.request
    }

    /// Writes a session override and schedules a recompute.
    pub fn set_state(&self, target: StateTarget, name: &str, value: Value) {
        {
            let mut shared = self.shared.borrow_mut();
            let layer = match target {
                StateTarget::View => &mut shared.states.view,
                StateTarget::Datasource => &mut shared.states.datasource,
                StateTarget::Renderer => &mut shared.states.renderer,
            };
            layer.set(name, value);
        }
        self.schedule_recompute();
    }

    /// Overrides for one cascade.
    pub fn state(&self, target: StateTarget) -> StateLayer {
        let shared = self.shared.borrow();
        match target {
            StateTarget::View => shared.states.view.clone(),
            StateTarget::Datasource => shared.states.datasource.clone(),
            StateTarget::Renderer => shared.states.renderer.clone(),
        }
    }

    /// Overrides for all three cascades, for saving.
    pub fn states(&self) -> ViewStates {
        self.shared.borrow().states.clone()
    }

    /// True when any override changed since it was loaded or saved.
    pub fn needs_saving(&self) -> bool {
        let shared = self.shared.borrow();
        shared.states.view.needs_saving()
            || shared.states.datasource.needs_saving()
            || shared.states.renderer.needs_saving()
    }

    /// Accepts the current overrides as saved.
    pub fn mark_saved(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.states.view.mark_saved();
        shared.states.datasource.mark_saved();
        shared.states.renderer.mark_saved();
    }

    /// The item graph or catalog changed underneath the view.
    pub fn notify_data_changed(&self) -> bool {
        self.schedule_recompute()
    }

    /// Recomputes immediately, bypassing the scheduler.
    pub fn recompute_now(&self) -> Option<EffectiveView> {
        run_recompute(&self.context, &self.request, &self.shared, &self.on_refresh)
    }

    /// The last computed view, if any recompute ran yet.
    pub fn effective(&self) -> Option<EffectiveView> {
        self.shared.borrow().effective.clone()
    }

    /// How many recomputes ran so far.
    pub fn recompute_count(&self) -> usize {
        self.shared.borrow().recompute_count
    }

    /// Loads the items the view's datasource currently selects.
    pub fn load_results(&self) -> Result<ResultSet> {
        let (states, arguments) = {
            let shared = self.shared.borrow();
            (shared.states.clone(), shared.arguments.clone())
        };
        let resolved = self
            .context
            .resolve_view(&self.request, &states, &arguments)
            .with_context(|| format!("Failed to resolve view {:?}", self.request))?;
        let descriptor = resolved.datasource().descriptor();
        let interpolator = self.context.interpolator();
        let results = ResultSet::load(&descriptor, self.context.graph(), &interpolator)
            .with_context(|| format!("Failed to load results for '{}'", descriptor.unique_string()))?;
        Ok(results)
    }

    fn schedule_recompute(&self) -> bool {
        let context = Rc::clone(&self.context);
        let request = self.request.clone();
        let shared = Rc::clone(&self.shared);
        let on_refresh = Rc::clone(&self.on_refresh);
        self.debouncer.notify(self.scheduler.as_ref(), move || {
            run_recompute(&context, &request, &shared, &on_refresh);
        })
    }
}

fn run_recompute(
    context: &AppContext,
    request: &ViewRequest,
    shared: &RefCell<SessionState>,
    on_refresh: &RefCell<Option<RefreshCallback>>,
) -> Option<EffectiveView> {
    let (states, arguments) = {
        let shared = shared.borrow();
        (shared.states.clone(), shared.arguments.clone())
    };

    let effective = match context.resolve_view(request, &states, &arguments) {
        Ok(resolved) => resolved.effective(),
        Err(e) => {
            error!("Failed to recompute view {:?}: {}", request, e);
            return None;
        }
    };

    {
        let mut shared = shared.borrow_mut();
        shared.effective = Some(effective.clone());
        shared.recompute_count += 1;
        debug!("Recomputed view {:?} ({} total)", request, shared.recompute_count);
    }

    // The callback may touch the session again, so no borrow is held while it runs.
    let callback = on_refresh.borrow_mut().take();
    if let Some(mut callback) = callback {
        callback(&effective);
        let mut slot = on_refresh.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
    Some(effective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{CatalogSource, LoadMode, Origin, ViewCatalog};
    use crate::core::scheduler::ManualScheduler;
    use std::cell::Cell;

    fn session() -> (ViewSession, Rc<ManualScheduler>) {
        let catalog = ViewCatalog::from_sources(
            vec![CatalogSource::new(
                "views.cvu",
                Origin::Default,
                "Note[] { title: \"Notes\" [datasource = pod] { query: \"Note\" } }",
            )],
            LoadMode::Strict,
        )
        .unwrap();
        let context = Rc::new(AppContext::in_memory(catalog));
        let scheduler = Rc::new(ManualScheduler::new());
        let session = ViewSession::new(context, ViewRequest::for_type("Note", true), scheduler.clone());
        (session, scheduler)
    }

    #[test]
    fn test_many_changes_one_recompute() {
        // --- Setup ---
        let (session, scheduler) = session();
        let refreshes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&refreshes);
        session.on_refresh(move |_| counter.set(counter.get() + 1));

        // --- Execute ---
        for i in 0..5 {
            session.set_state(StateTarget::Datasource, "sortProperty", Value::from(format!("p{}", i)));
        }
        session.notify_data_changed();
        scheduler.run_pending();

        // --- Assert ---
        assert_eq!(session.recompute_count(), 1);
        assert_eq!(refreshes.get(), 1);
        let effective = session.effective().unwrap();
        assert_eq!(effective.datasource.sort_property.as_deref(), Some("p4"));
    }

    #[test]
    fn test_nothing_runs_before_the_scheduler_turn() {
        let (session, scheduler) = session();

        session.set_state(StateTarget::View, "title", Value::from("Mine"));

        assert_eq!(session.recompute_count(), 0);
        assert!(session.effective().is_none());
        assert_eq!(scheduler.pending(), 1);
        scheduler.run_pending();
        assert_eq!(session.effective().unwrap().title.as_deref(), Some("Mine"));
    }

    #[test]
    fn test_state_tracking_and_recompute_now() {
        let (session, _scheduler) = session();
        assert!(!session.needs_saving());

        session.set_state(StateTarget::Renderer, "spacing", Value::from(2.0));
        assert!(session.needs_saving());
        assert_eq!(session.state(StateTarget::Renderer).get("spacing"), Some(&Value::from(2.0)));

        session.mark_saved();
        assert!(!session.needs_saving());

        let effective = session.recompute_now().unwrap();
        assert_eq!(effective.title.as_deref(), Some("Notes"));
        assert_eq!(session.recompute_count(), 1);
    }

    #[test]
    fn test_refresh_callback_may_reenter_session() {
        // --- Setup ---
        let (session, scheduler) = session();
        let session = Rc::new(session);
        let weak = Rc::downgrade(&session);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        session.on_refresh(move |_| {
            counter.set(counter.get() + 1);
            if let Some(session) = weak.upgrade() {
                session.set_state(StateTarget::View, "title", Value::from("Again"));
                session.recompute_now();
            }
        });

        // --- Execute ---
        session.recompute_now();

        // --- Assert ---
        assert_eq!(calls.get(), 1);
        assert_eq!(session.recompute_count(), 2);
        assert_eq!(session.effective().unwrap().title.as_deref(), Some("Again"));
        scheduler.run_pending();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_callback_replaced_during_refresh_is_kept() {
        let (session, _scheduler) = session();
        let session = Rc::new(session);
        let weak = Rc::downgrade(&session);
        let replaced = Rc::new(Cell::new(false));
        let flag = Rc::clone(&replaced);
        session.on_refresh(move |_| {
            if let Some(session) = weak.upgrade() {
                let flag = Rc::clone(&flag);
                session.on_refresh(move |_| flag.set(true));
            }
        });

        session.recompute_now();
        assert!(!replaced.get());
        session.recompute_now();
        assert!(replaced.get());
    }

    #[test]
    fn test_load_results_uses_resolved_datasource() {
        let (session, _scheduler) = session();
        let results = session.load_results().unwrap();
        assert!(results.is_empty());
        assert_eq!(results.descriptor.query.as_deref(), Some("Note"));
    }
}
