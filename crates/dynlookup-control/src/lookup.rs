#![forbid(unsafe_code)]

//! The lookup control.
//!
//! [`Lookup`] is a [`Model`]: hosts feed it [`Msg`]s (keystrokes, pointer
//! and focus events, parent scope updates, fetch completions) and execute
//! the returned [`Cmd`]s. All state lives here and is mutated only inside
//! `update`; fetches run as background tasks and come back as
//! [`Msg::FetchCompleted`], where the [`RequestArbiter`] decides whether
//! they still apply.
//!
//! # Readiness
//!
//! The control is *ready* once its selection context is settled: the
//! initial load finished, or the latest parent scope change (or Tab/scan
//! resolve) completed. Each cycle emits `ComponentInitialized(false)` once
//! and `ComponentInitialized(true)` once. While not ready no dropdown
//! fetches are issued; a request to open is remembered and honored on
//! settle if focus is still on the input.
//!
//! # Example
//!
//! ```ignore
//! let backend = Arc::new(MemoryBackend::new(rows));
//! let mut sim = ProgramSimulator::new(Lookup::new(LookupConfig::default(), backend));
//! sim.init();
//! sim.send(Msg::FocusIn(FocusTarget::Input));
//! sim.send(Msg::InputChanged("acme".into()));
//! sim.advance(Duration::from_millis(350));
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};
use unicode_segmentation::UnicodeSegmentation;

use dynlookup_core::{
    CandidateRecord, ConfigDefaulted, ConfigInput, FocusTarget, KeyCode, KeyEvent, LookupConfig,
    Modifiers, PointerButton, PointerEvent, PointerKind, PointerTarget, QueryError, Row,
};
use dynlookup_runtime::{
    Cmd, DebounceScheduler, EventFeed, Listen, Model, RequestArbiter, RequestId, SubId,
    Subscription, TimerTicket,
};

use crate::backend::{Backend, BackendQuery};
use crate::barcode::{ScanError, join_codes};
use crate::dropdown::DropdownController;
use crate::fetcher::{BrowsePlan, CandidateFetcher, FetchPurpose, ResolveKind};
use crate::notify::Notification;
use crate::parent_filter::{ParentFilterBridge, ParentScope, ScopeTransition};
use crate::pointer_focus::{FocusTimer, PointerFocusCoordinator};
use crate::selection::{SelectionModel, SelectionNotice, find_by_value};
use crate::validation::ValidationReport;

/// Subscription id of the global pointer-up listener.
pub const POINTER_UP_SUB: SubId = 0x6c6b_7570;

/// Messages understood by [`Lookup`].
#[derive(Debug)]
pub enum Msg {
    /// The search text was edited by the host's input widget.
    InputChanged(String),
    /// A key reached the control.
    Key(KeyEvent),
    /// A pointer event landed on part of the control.
    Pointer(PointerEvent),
    /// A pointer button was released anywhere on the screen.
    GlobalPointerUp,
    FocusIn(FocusTarget),
    /// Focus moved; `Some` if it moved to another part of the control.
    FocusOut(Option<FocusTarget>),
    /// The search debounce elapsed.
    SearchDue(TimerTicket),
    FocusTimer(FocusTimer, TimerTicket),
    /// A fetch finished.
    FetchCompleted {
        id: RequestId,
        purpose: FetchPurpose,
        query: BackendQuery,
        result: Result<Vec<Row>, QueryError>,
    },
    /// The parent published a new scope.
    ParentScope(ParentScope),
    /// The host assigned a value programmatically.
    AssignValue(Option<String>),
    /// Partial configuration update.
    UpdateConfig(ConfigInput),
    Show,
    Hide,
    RemoveSelection,
    /// Remove the selection and put its display text back in the input.
    EditSelection,
    /// The user asked to scan; `available` reports whether the host has a
    /// scanner.
    ScanRequested { available: bool },
    ScanCompleted(Result<Vec<String>, ScanError>),
    Attach,
    Detach,
}

/// Outputs raised for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    SelectedValue(Option<String>),
    SelectedRecord(Option<Row>),
    RecordId(Option<String>),
    HasSelection(bool),
    HasNoSelection(bool),
    ComponentInitialized(bool),
    /// Echo of the parent filter value the control now uses.
    FilterValueChange(Option<String>),
    Notify(Notification),
    /// Best-effort request to move focus.
    RequestFocus(FocusTarget),
    /// Ask the host to open its scanner.
    StartScan,
}

impl OutputEvent {
    /// Host-facing output name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SelectedValue(_) => "selectedValue",
            Self::SelectedRecord(_) => "selectedRecord",
            Self::RecordId(_) => "recordId",
            Self::HasSelection(_) => "hasSelection",
            Self::HasNoSelection(_) => "hasNoSelection",
            Self::ComponentInitialized(_) => "componentInitialized",
            Self::FilterValueChange(_) => "filterValueChange",
            Self::Notify(_) => "notify",
            Self::RequestFocus(_) => "requestFocus",
            Self::StartScan => "startScan",
        }
    }

    /// The output payload as JSON.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::SelectedValue(v) | Self::RecordId(v) | Self::FilterValueChange(v) => {
                v.clone().map_or(Value::Null, Value::String)
            }
            Self::SelectedRecord(r) => r.clone().map_or(Value::Null, Value::Object),
            Self::HasSelection(b) | Self::HasNoSelection(b) | Self::ComponentInitialized(b) => {
                Value::Bool(*b)
            }
            Self::Notify(n) => serde_json::to_value(n).unwrap_or(Value::Null),
            Self::RequestFocus(t) => serde_json::to_value(t).unwrap_or(Value::Null),
            Self::StartScan => Value::Null,
        }
    }
}

impl From<SelectionNotice> for OutputEvent {
    fn from(notice: SelectionNotice) -> Self {
        match notice {
            SelectionNotice::SelectedValue(v) => Self::SelectedValue(v),
            SelectionNotice::SelectedRecord(r) => Self::SelectedRecord(r),
            SelectionNotice::RecordId(id) => Self::RecordId(id),
            SelectionNotice::HasSelection(b) => Self::HasSelection(b),
            SelectionNotice::HasNoSelection(b) => Self::HasNoSelection(b),
        }
    }
}

/// What the control is waiting for, for hosts that show a loading message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum LoadingPhase {
    #[default]
    Preparing,
    WaitingParent,
    ApplyingParent,
    FindingMatch,
    ProcessingBarcode,
    Ready,
}

impl LoadingPhase {
    /// Text to show while loading; `None` once ready.
    #[must_use]
    pub const fn message(self) -> Option<&'static str> {
        match self {
            Self::Preparing => Some("Preparing lookup..."),
            Self::WaitingParent => Some("Waiting for parent..."),
            Self::ApplyingParent => Some("Applying parent values..."),
            Self::FindingMatch => Some("Finding match..."),
            Self::ProcessingBarcode => Some("Processing scanned barcode..."),
            Self::Ready => None,
        }
    }
}

/// Whether the host should let a key continue to its default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDisposition {
    /// The control acts on the key; suppress the default.
    Consumed,
    /// Leave the key to the host (e.g. Tab moving focus on).
    PassThrough,
}

type LookupCmd = Cmd<Msg, OutputEvent>;

/// Searchable selection control.
pub struct Lookup {
    config: LookupConfig,
    input: ConfigInput,
    diagnostics: Vec<ConfigDefaulted>,
    backend: Arc<dyn Backend>,
    pointer_feed: EventFeed<PointerEvent>,
    search_text: String,
    selection: SelectionModel,
    dropdown: DropdownController,
    fetcher: CandidateFetcher,
    arbiter: RequestArbiter,
    search_debounce: DebounceScheduler,
    parent: ParentFilterBridge,
    focus: PointerFocusCoordinator,
    in_flight: Option<FetchPurpose>,
    ready: bool,
    phase: LoadingPhase,
    open_on_settle: bool,
    attached: bool,
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lookup")
            .field("object_type", &self.config.object_type)
            .field("search_text", &self.search_text)
            .field("selected", &self.selection.value())
            .field("open", &self.dropdown.is_open())
            .field("ready", &self.ready)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Lookup {
    /// Create a control over `backend`.
    pub fn new(config: LookupConfig, backend: Arc<dyn Backend>) -> Self {
        let input = ConfigInput::from(&config);
        Self::build(config, input, Vec::new(), backend)
    }

    /// Create a control from host attributes.
    ///
    /// Invalid attributes fall back to their defaults; the diagnostics are
    /// kept in [`config_diagnostics`](Self::config_diagnostics).
    pub fn from_input(input: ConfigInput, backend: Arc<dyn Backend>) -> Self {
        let (config, diagnostics) = LookupConfig::from_input(&input);
        Self::build(config, input, diagnostics, backend)
    }

    fn build(
        config: LookupConfig,
        input: ConfigInput,
        diagnostics: Vec<ConfigDefaulted>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            parent: ParentFilterBridge::new(&config),
            config,
            input,
            diagnostics,
            backend,
            pointer_feed: EventFeed::new(),
            search_text: String::new(),
            selection: SelectionModel::new(),
            dropdown: DropdownController::new(),
            fetcher: CandidateFetcher::new(),
            arbiter: RequestArbiter::new(),
            search_debounce: DebounceScheduler::new("search"),
            focus: PointerFocusCoordinator::new(),
            in_flight: None,
            ready: false,
            phase: LoadingPhase::Preparing,
            open_on_settle: false,
            attached: false,
        }
    }

    /// Value to resolve and select once the control is ready.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.parent.stash_target(Some(value.into()));
        self
    }

    /// Listen for global pointer-ups on `feed` instead of a private one.
    #[must_use]
    pub fn with_pointer_feed(mut self, feed: EventFeed<PointerEvent>) -> Self {
        self.pointer_feed = feed;
        self
    }

    // --- accessors ---

    #[must_use]
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Attributes that were replaced by defaults at the last validation.
    #[must_use]
    pub fn config_diagnostics(&self) -> &[ConfigDefaulted] {
        &self.diagnostics
    }

    #[must_use]
    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    #[must_use]
    pub fn selected(&self) -> Option<&CandidateRecord> {
        self.selection.selected()
    }

    #[must_use]
    pub fn dropdown(&self) -> &DropdownController {
        &self.dropdown
    }

    #[must_use]
    pub fn candidates(&self) -> &[CandidateRecord] {
        self.dropdown.candidates()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.dropdown.is_open()
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub const fn loading_phase(&self) -> LoadingPhase {
        self.phase
    }

    #[must_use]
    pub fn parent_scope(&self) -> &ParentScope {
        self.parent.scope()
    }

    #[must_use]
    pub fn arbiter(&self) -> &RequestArbiter {
        &self.arbiter
    }

    #[must_use]
    pub fn focus(&self) -> &PointerFocusCoordinator {
        &self.focus
    }

    #[must_use]
    pub fn pointer_feed(&self) -> &EventFeed<PointerEvent> {
        &self.pointer_feed
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// Whether a fetch is outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether the missing parent value disables the control.
    #[must_use]
    pub const fn is_disabled_by_parent(&self) -> bool {
        self.parent.disables_input()
    }

    /// Whether the user may change the selection.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.config.is_editable() && !self.parent.disables_input()
    }

    /// Check the control before the host proceeds.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        ValidationReport::check(self.ready, self.config.required, self.selection.has_selection())
    }

    /// How the host should treat `key` if it is delivered as [`Msg::Key`]
    /// in the current state.
    #[must_use]
    pub fn classify_key(&self, key: &KeyEvent) -> KeyDisposition {
        use KeyDisposition::{Consumed, PassThrough};

        if !key.is_actionable() || !self.is_interactive() {
            return PassThrough;
        }
        if self.focus.focus() == Some(FocusTarget::SelectionChip) {
            return match key.code {
                KeyCode::Delete | KeyCode::Backspace if self.selection.has_selection() => Consumed,
                _ => PassThrough,
            };
        }
        match key.code {
            KeyCode::Up | KeyCode::Down => Consumed,
            KeyCode::Enter if self.dropdown.highlighted().is_some() => Consumed,
            KeyCode::Escape if self.dropdown.is_open() => Consumed,
            KeyCode::Tab if self.tab_populates() => Consumed,
            KeyCode::Tab if self.tab_commits() => Consumed,
            KeyCode::Char(_) | KeyCode::Backspace if !Self::has_command_modifier(key) => Consumed,
            _ => PassThrough,
        }
    }

    fn has_command_modifier(key: &KeyEvent) -> bool {
        key.modifiers
            .intersects(Modifiers::CTRL | Modifiers::ALT | Modifiers::SUPER)
    }

    fn tab_populates(&self) -> bool {
        self.config.populate_on_tab && !self.search_text.trim().is_empty()
    }

    fn tab_commits(&self) -> bool {
        self.dropdown.is_open() && self.dropdown.highlighted().is_some()
    }

    fn waiting_for_parent(&self) -> bool {
        self.config.parent_filter_field.is_some() && !self.parent.scope().initialized
    }

    // --- effects ---

    fn emit_notices(notices: Vec<SelectionNotice>) -> Vec<LookupCmd> {
        notices
            .into_iter()
            .map(|n| Cmd::emit(OutputEvent::from(n)))
            .collect()
    }

    fn request_focus(target: FocusTarget) -> LookupCmd {
        Cmd::emit(OutputEvent::RequestFocus(target))
    }

    fn set_ready(&mut self, ready: bool) -> LookupCmd {
        if self.ready == ready {
            return Cmd::none();
        }
        self.ready = ready;
        if ready {
            self.phase = LoadingPhase::Ready;
        }
        info!(ready, object_type = %self.config.object_type, "component initialized changed");
        Cmd::emit(OutputEvent::ComponentInitialized(ready))
    }

    fn issue_fetch(&mut self, purpose: FetchPurpose, query: BackendQuery) -> LookupCmd {
        let id = self.arbiter.begin();
        debug!(
            request_id = %id,
            %purpose,
            search_text = query.search_text.as_deref(),
            max_results = query.max_results,
            "fetch issued"
        );
        self.in_flight = Some(purpose.clone());
        let run = CandidateFetcher::task(Arc::clone(&self.backend), query.clone());
        Cmd::task_named("fetch", move || Msg::FetchCompleted {
            id,
            purpose,
            query,
            result: run(),
        })
    }

    /// Forget the outstanding fetch; its response will be discarded.
    fn abandon_fetch(&mut self) {
        self.arbiter.invalidate();
        self.in_flight = None;
        self.dropdown.set_loading(false);
    }

    fn begin_resolve(
        &mut self,
        kind: ResolveKind,
        target: Option<String>,
        text: Option<&str>,
        phase: LoadingPhase,
    ) -> LookupCmd {
        self.phase = phase;
        self.dropdown.set_loading(false);
        let not_ready = self.set_ready(false);
        let query = CandidateFetcher::plan_resolve(&self.config, text, self.parent.filter_value());
        let fetch = self.issue_fetch(FetchPurpose::resolve(kind, target), query);
        Cmd::batch(vec![not_ready, fetch])
    }

    /// Fill the dropdown for the current text.
    fn browse(&mut self) -> LookupCmd {
        if !self.ready {
            debug!("browse deferred until ready");
            self.open_on_settle = true;
            return Cmd::none();
        }
        let plan = self.fetcher.plan_browse(
            &self.config,
            &self.search_text,
            self.parent.filter_value(),
            self.ready,
        );
        match plan {
            BrowsePlan::Local => {
                self.abandon_fetch();
                let candidates = self.fetcher.candidates(&self.config, &self.search_text);
                debug!(candidates = candidates.len(), "filtered locally");
                self.dropdown.set_candidates(candidates);
                Cmd::none()
            }
            BrowsePlan::Remote(query) => {
                self.dropdown.set_loading(true);
                self.issue_fetch(FetchPurpose::Browse, query)
            }
        }
    }

    /// Open (or refresh) the dropdown.
    fn show(&mut self) -> LookupCmd {
        if !self.is_interactive() {
            return Cmd::none();
        }
        if !self.ready {
            debug!("open deferred until ready");
            self.open_on_settle = true;
            return Cmd::none();
        }
        self.dropdown.open();
        self.browse()
    }

    fn hide(&mut self) {
        self.dropdown.close();
    }

    /// Close and forget any open request waiting for the control to settle.
    fn dismiss(&mut self) {
        self.open_on_settle = false;
        self.dropdown.close();
    }

    fn close_on_focus_loss(&mut self) {
        self.dismiss();
        self.search_debounce.cancel();
        if !self.search_text.is_empty() && !self.selection.has_selection() {
            debug!("search text cleared on focus loss");
            self.search_text.clear();
        }
    }

    fn commit(&mut self, candidate: CandidateRecord) -> Vec<LookupCmd> {
        let notices = self.selection.select(Some(candidate));
        if notices.is_empty() {
            return Vec::new();
        }
        self.search_debounce.cancel();
        self.search_text.clear();
        self.hide();
        let mut cmds = Self::emit_notices(notices);
        cmds.push(Self::request_focus(FocusTarget::SelectionChip));
        cmds
    }

    fn set_search_text(&mut self, text: String) -> LookupCmd {
        if !self.is_interactive() {
            return Cmd::none();
        }
        self.search_text = text;
        self.dropdown.reset_highlight();
        let delay = self.config.debounce;
        self.search_debounce.schedule(delay, Msg::SearchDue)
    }

    fn report_query_error(&self, error: &QueryError) -> LookupCmd {
        error!(
            kind = error.kind(),
            cause = error.message(),
            object_type = %self.config.object_type,
            "fetch failed"
        );
        Cmd::emit(OutputEvent::Notify(Notification::query_failed(error)))
    }

    // --- handlers ---

    fn start(&mut self) -> LookupCmd {
        self.attached = true;
        let target = self
            .parent
            .take_target()
            .or_else(|| self.selection.value().map(str::to_owned));
        if self.config.parent_filter_field.is_none() {
            return self.begin_resolve(ResolveKind::Initial, target, None, LoadingPhase::Preparing);
        }

        self.phase = LoadingPhase::WaitingParent;
        if !self.parent.scope().initialized {
            debug!("waiting for parent scope");
            self.parent.stash_target(target);
            return self.set_ready(false);
        }
        if self.parent.filter_value().is_none() {
            let mut cmds = Self::emit_notices(self.selection.select(None));
            cmds.push(self.set_ready(true));
            return Cmd::batch(cmds);
        }
        self.begin_resolve(ResolveKind::Parent, target, None, LoadingPhase::ApplyingParent)
    }

    fn detach(&mut self) -> LookupCmd {
        self.attached = false;
        self.abandon_fetch();
        self.search_debounce.cancel();
        self.focus.reset();
        self.dismiss();
        debug!("detached");
        Cmd::none()
    }

    fn on_key(&mut self, key: KeyEvent) -> LookupCmd {
        if !key.is_actionable() || !self.is_interactive() {
            return Cmd::none();
        }
        if self.focus.focus() == Some(FocusTarget::SelectionChip) {
            return match key.code {
                KeyCode::Delete | KeyCode::Backspace if self.selection.has_selection() => {
                    self.remove_selection()
                }
                _ => Cmd::none(),
            };
        }
        match key.code {
            KeyCode::Down | KeyCode::Up if !self.dropdown.is_open() => self.show(),
            KeyCode::Down => {
                self.dropdown.move_down();
                Cmd::none()
            }
            KeyCode::Up => {
                self.dropdown.move_up();
                Cmd::none()
            }
            KeyCode::Enter => match self.dropdown.highlighted().cloned() {
                Some(candidate) => Cmd::batch(self.commit(candidate)),
                None => Cmd::none(),
            },
            KeyCode::Escape => {
                self.dismiss();
                Cmd::none()
            }
            KeyCode::Tab if self.tab_populates() => self.tab_populate(),
            KeyCode::Tab if self.tab_commits() => match self.dropdown.highlighted().cloned() {
                Some(candidate) => Cmd::batch(self.commit(candidate)),
                None => Cmd::none(),
            },
            KeyCode::Char(c) if !Self::has_command_modifier(&key) => {
                let mut text = self.search_text.clone();
                text.push(c);
                self.set_search_text(text)
            }
            KeyCode::Backspace if !Self::has_command_modifier(&key) => {
                let cut = self.search_text.grapheme_indices(true).next_back();
                let text = match cut {
                    Some((idx, _)) => self.search_text[..idx].to_owned(),
                    None => String::new(),
                };
                self.set_search_text(text)
            }
            _ => Cmd::none(),
        }
    }

    fn tab_populate(&mut self) -> LookupCmd {
        let text = self.search_text.trim().to_owned();
        debug!(%text, "populating on tab");
        self.hide();
        self.search_debounce.cancel();
        let mut cmds = Self::emit_notices(self.selection.clear());
        cmds.push(self.begin_resolve(
            ResolveKind::Tab,
            Some(text.clone()),
            Some(&text),
            LoadingPhase::FindingMatch,
        ));
        Cmd::batch(cmds)
    }

    fn on_pointer(&mut self, event: PointerEvent) -> LookupCmd {
        if !self.is_interactive() {
            return Cmd::none();
        }
        match (event.kind, event.target) {
            (PointerKind::Down(PointerButton::Primary), PointerTarget::Candidate(index)) => {
                let Some(candidate) = self.dropdown.selectable(index).cloned() else {
                    return Cmd::none();
                };
                let mut cmds = self.commit(candidate);
                let timeout = self.config.pointer_commit_timeout;
                cmds.push(self.focus.arm_commit(timeout, Msg::FocusTimer));
                Cmd::batch(cmds)
            }
            (PointerKind::Down(button), PointerTarget::Candidate(index)) => {
                debug!(?button, index, "non-primary press on candidate ignored");
                Cmd::none()
            }
            (PointerKind::Click(PointerButton::Primary), PointerTarget::Input)
                if !self.dropdown.is_open() =>
            {
                let delay = self.config.open_settle;
                self.focus.schedule_open(delay, Msg::FocusTimer)
            }
            (PointerKind::Click(PointerButton::Primary), PointerTarget::RemoveButton) => {
                self.remove_selection()
            }
            (PointerKind::DoubleClick(_), PointerTarget::SelectionChip) => self.edit_selection(),
            _ => Cmd::none(),
        }
    }

    fn remove_selection(&mut self) -> LookupCmd {
        if !self.is_interactive() {
            return Cmd::none();
        }
        let mut cmds = Self::emit_notices(self.selection.clear());
        self.search_text.clear();
        self.search_debounce.cancel();
        self.hide();
        cmds.push(Self::request_focus(FocusTarget::Input));
        Cmd::batch(cmds)
    }

    fn edit_selection(&mut self) -> LookupCmd {
        let Some(display) = self.selection.display_value().map(str::to_owned) else {
            return Cmd::none();
        };
        if !self.is_interactive() {
            return Cmd::none();
        }
        let cmd = self.remove_selection();
        self.search_text = display;
        cmd
    }

    fn on_focus_in(&mut self, target: FocusTarget) -> LookupCmd {
        self.focus.focus_in(target);
        if target == FocusTarget::Input && !self.dropdown.is_open() {
            let delay = self.config.open_settle;
            return self.focus.schedule_open(delay, Msg::FocusTimer);
        }
        Cmd::none()
    }

    fn on_focus_out(&mut self, to: Option<FocusTarget>) -> LookupCmd {
        if self.focus.focus_out(to) {
            let delay = self.config.close_grace;
            return self.focus.schedule_close(delay, Msg::FocusTimer);
        }
        Cmd::none()
    }

    fn on_focus_timer(&mut self, timer: FocusTimer, ticket: TimerTicket) -> LookupCmd {
        if !self.focus.fire(timer, ticket) {
            return Cmd::none();
        }
        match timer {
            FocusTimer::OpenSettle if !self.dropdown.is_open() => self.show(),
            FocusTimer::CloseGrace if self.in_flight == Some(FetchPurpose::Browse) => {
                debug!("close deferred while results are loading");
                self.focus.defer_close();
                Cmd::none()
            }
            FocusTimer::CloseGrace => {
                self.close_on_focus_loss();
                Cmd::none()
            }
            _ => Cmd::none(),
        }
    }

    fn on_global_pointer_up(&mut self) -> LookupCmd {
        if !self.focus.pointer_up() {
            return Cmd::none();
        }
        let target = if self.selection.has_selection() {
            FocusTarget::SelectionChip
        } else {
            FocusTarget::Input
        };
        Self::request_focus(target)
    }

    fn on_fetch_completed(
        &mut self,
        id: RequestId,
        purpose: FetchPurpose,
        query: BackendQuery,
        result: Result<Vec<Row>, QueryError>,
    ) -> LookupCmd {
        if !self.arbiter.settle(id, result.is_ok()).is_apply() {
            return Cmd::none();
        }
        self.in_flight = None;
        match purpose {
            FetchPurpose::Browse => self.apply_browse(id, &query, result),
            FetchPurpose::Resolve { kind, target } => self.settle_resolve(kind, target, &query, result),
        }
    }

    fn apply_browse(
        &mut self,
        id: RequestId,
        query: &BackendQuery,
        result: Result<Vec<Row>, QueryError>,
    ) -> LookupCmd {
        let cmd = match result {
            Ok(rows) => {
                self.fetcher.store(query, rows);
                let candidates = self.fetcher.candidates(&self.config, &self.search_text);
                debug!(request_id = %id, candidates = candidates.len(), "results applied");
                self.dropdown.set_candidates(candidates);
                Cmd::none()
            }
            Err(e) => {
                self.dropdown.set_candidates(Vec::new());
                self.report_query_error(&e)
            }
        };
        if self.focus.take_deferred_close() {
            self.close_on_focus_loss();
        }
        cmd
    }

    fn settle_resolve(
        &mut self,
        kind: ResolveKind,
        target: Option<String>,
        query: &BackendQuery,
        result: Result<Vec<Row>, QueryError>,
    ) -> LookupCmd {
        let mut cmds = Vec::new();
        let found = match result {
            Ok(rows) => {
                self.fetcher.store(query, rows);
                let display_fallback =
                    kind == ResolveKind::Tab || self.config.allow_display_field_match;
                target.as_deref().and_then(|value| {
                    find_by_value(self.fetcher.rows(), value, &self.config, display_fallback)
                })
            }
            Err(e) => {
                cmds.push(self.report_query_error(&e));
                None
            }
        };
        debug!(
            kind = kind.as_str(),
            target = target.as_deref(),
            matched = found.as_ref().map(|c| c.record_id.as_str()),
            "resolve settled"
        );

        let matched = found.is_some();
        let notices = if matched || kind == ResolveKind::Initial {
            self.selection.select(found)
        } else {
            self.selection.clear()
        };
        cmds.extend(Self::emit_notices(notices));

        let focus = match kind {
            ResolveKind::Tab => {
                self.open_on_settle = false;
                Some(if matched {
                    FocusTarget::SelectionChip
                } else {
                    FocusTarget::Input
                })
            }
            ResolveKind::Scan if !matched => {
                if let Some(codes) = target {
                    self.search_text = codes;
                }
                Some(FocusTarget::Input)
            }
            ResolveKind::Scan => Some(FocusTarget::SelectionChip),
            ResolveKind::Initial | ResolveKind::Parent | ResolveKind::Assign => None,
        };

        cmds.push(self.set_ready(true));
        if let Some(target) = focus {
            cmds.push(Self::request_focus(target));
        }
        if std::mem::take(&mut self.open_on_settle) && self.focus.focus() == Some(FocusTarget::Input)
        {
            cmds.push(self.show());
        }
        Cmd::batch(cmds)
    }

    fn on_parent_scope(&mut self, scope: ParentScope) -> LookupCmd {
        if self.config.parent_filter_field.is_none() {
            debug!("parent scope ignored without a parent filter field");
            return Cmd::none();
        }
        let change = self.parent.apply(scope, &self.config);
        let mut cmds = Vec::new();
        if change.filter_value_changed {
            let value = self.parent.filter_value().map(str::to_owned);
            cmds.push(Cmd::emit(OutputEvent::FilterValueChange(value)));
            self.fetcher.invalidate();
        }
        if !self.attached {
            if let ScopeTransition::Resolve { target: Some(t) } = change.transition {
                self.parent.stash_target(Some(t));
            }
            return Cmd::batch(cmds);
        }

        match change.transition {
            ScopeTransition::Unchanged => {}
            ScopeTransition::Suspended => {
                self.abandon_fetch();
                self.hide();
                self.phase = LoadingPhase::WaitingParent;
                cmds.push(self.set_ready(false));
            }
            ScopeTransition::Resolve { target } => {
                self.hide();
                if target.is_none() {
                    cmds.extend(Self::emit_notices(self.selection.clear()));
                }
                cmds.push(self.begin_resolve(
                    ResolveKind::Parent,
                    target,
                    None,
                    LoadingPhase::ApplyingParent,
                ));
            }
            ScopeTransition::ClearSelection => {
                self.abandon_fetch();
                self.hide();
                cmds.extend(Self::emit_notices(self.selection.select(None)));
                cmds.push(self.set_ready(true));
            }
            ScopeTransition::FilterEmptied => {
                self.abandon_fetch();
                self.hide();
                self.search_debounce.cancel();
                self.search_text.clear();
                cmds.extend(Self::emit_notices(self.selection.clear()));
                // Settles a parent resolve abandoned above.
                cmds.push(self.set_ready(true));
            }
        }
        Cmd::batch(cmds)
    }

    fn on_assign(&mut self, value: Option<String>) -> LookupCmd {
        let value = value.filter(|v| !v.is_empty());
        if !self.attached || self.waiting_for_parent() {
            debug!(value = value.as_deref(), "value stashed until ready");
            self.parent.stash_target(value);
            return Cmd::none();
        }
        match value {
            None => Cmd::batch(Self::emit_notices(self.selection.clear())),
            Some(v) if self.selection.value() == Some(v.as_str()) => Cmd::none(),
            Some(v) => {
                self.hide();
                self.begin_resolve(ResolveKind::Assign, Some(v), None, LoadingPhase::FindingMatch)
            }
        }
    }

    fn on_update_config(&mut self, update: ConfigInput) -> LookupCmd {
        self.input.merge(&update);
        let (config, diagnostics) = LookupConfig::from_input(&self.input);
        self.diagnostics = diagnostics;
        let refetch = LookupConfig::refetch_required(&self.config, &config);
        self.config = config;
        self.parent.reconfigure(&self.config);
        if !self.is_interactive() {
            self.dismiss();
        }
        if !refetch {
            return Cmd::none();
        }
        self.fetcher.invalidate();
        if !self.attached {
            return Cmd::none();
        }
        match self.in_flight.clone() {
            Some(FetchPurpose::Resolve { kind, target }) => {
                debug!(kind = kind.as_str(), "configuration changed, restarting resolve");
                let text = target.clone().filter(|_| kind == ResolveKind::Tab);
                let phase = self.phase;
                self.begin_resolve(kind, target, text.as_deref(), phase)
            }
            _ if self.ready => {
                debug!("configuration changed, refetching");
                self.browse()
            }
            _ => Cmd::none(),
        }
    }

    fn on_scan_requested(&mut self, available: bool) -> LookupCmd {
        if !self.config.allow_barcode_scanning || !self.is_interactive() {
            debug!("scan request ignored");
            return Cmd::none();
        }
        if !available {
            info!("barcode scanner unavailable");
            return Cmd::none();
        }
        Cmd::emit(OutputEvent::StartScan)
    }

    fn on_scan_completed(&mut self, result: Result<Vec<String>, ScanError>) -> LookupCmd {
        let codes = match result {
            Ok(codes) => codes,
            Err(e) if e.is_reportable() => {
                error!(error = %e, "scan failed");
                return Cmd::emit(OutputEvent::Notify(Notification::scan_failed(&e)));
            }
            Err(e) => {
                info!(reason = %e, "scan ended without a code");
                return Cmd::none();
            }
        };
        let Some(joined) = join_codes(&codes) else {
            debug!("scan returned no codes");
            return Cmd::none();
        };
        info!(codes = codes.len(), "scan received");
        self.hide();
        self.search_debounce.cancel();
        self.search_text.clear();
        let mut cmds = Self::emit_notices(self.selection.clear());
        cmds.push(self.begin_resolve(
            ResolveKind::Scan,
            Some(joined),
            None,
            LoadingPhase::ProcessingBarcode,
        ));
        Cmd::batch(cmds)
    }
}

impl Model for Lookup {
    type Message = Msg;
    type Output = OutputEvent;

    fn init(&mut self) -> LookupCmd {
        self.start()
    }

    fn update(&mut self, msg: Msg) -> LookupCmd {
        match msg {
            Msg::InputChanged(text) => self.set_search_text(text),
            Msg::Key(key) => self.on_key(key),
            Msg::Pointer(event) => self.on_pointer(event),
            Msg::GlobalPointerUp => self.on_global_pointer_up(),
            Msg::FocusIn(target) => self.on_focus_in(target),
            Msg::FocusOut(to) => self.on_focus_out(to),
            Msg::SearchDue(ticket) => {
                if self.search_debounce.fire(ticket) {
                    self.show()
                } else {
                    Cmd::none()
                }
            }
            Msg::FocusTimer(timer, ticket) => self.on_focus_timer(timer, ticket),
            Msg::FetchCompleted {
                id,
                purpose,
                query,
                result,
            } => self.on_fetch_completed(id, purpose, query, result),
            Msg::ParentScope(scope) => self.on_parent_scope(scope),
            Msg::AssignValue(value) => self.on_assign(value),
            Msg::UpdateConfig(update) => self.on_update_config(update),
            Msg::Show => self.show(),
            Msg::Hide => {
                self.dismiss();
                Cmd::none()
            }
            Msg::RemoveSelection => self.remove_selection(),
            Msg::EditSelection => self.edit_selection(),
            Msg::ScanRequested { available } => self.on_scan_requested(available),
            Msg::ScanCompleted(result) => self.on_scan_completed(result),
            Msg::Attach if self.attached => Cmd::none(),
            Msg::Attach => self.start(),
            Msg::Detach => self.detach(),
        }
    }

    fn subscriptions(&self) -> Vec<Box<dyn Subscription<Msg>>> {
        if !self.attached {
            return vec![];
        }
        let listen = Listen::new(POINTER_UP_SUB, self.pointer_feed.clone(), |e: PointerEvent| {
            matches!(e.kind, PointerKind::Up(_)).then_some(Msg::GlobalPointerUp)
        });
        vec![Box::new(listen)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn backend() -> Arc<MemoryBackend> {
        let rows = json!([
            {"Id": "1", "Name": "Acme"},
            {"Id": "2", "Name": "Globex"},
        ]);
        let rows = match rows {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(m) => Some(m),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Arc::new(MemoryBackend::new(rows))
    }

    /// Run tasks inline until the command tree is exhausted.
    fn drive(lookup: &mut Lookup, cmd: LookupCmd) {
        match cmd {
            Cmd::Task(_, run) => {
                let next = lookup.update(run());
                drive(lookup, next);
            }
            Cmd::Batch(cmds) => {
                for cmd in cmds {
                    drive(lookup, cmd);
                }
            }
            _ => {}
        }
    }

    fn ready_lookup() -> Lookup {
        let mut lookup = Lookup::new(LookupConfig::default(), backend());
        let cmd = lookup.init();
        drive(&mut lookup, cmd);
        assert!(lookup.is_ready());
        lookup
    }

    #[test]
    fn output_names_match_host_attributes() {
        assert_eq!(OutputEvent::HasNoSelection(true).name(), "hasNoSelection");
        assert_eq!(OutputEvent::ComponentInitialized(true).payload(), Value::Bool(true));
        assert_eq!(OutputEvent::SelectedValue(None).payload(), Value::Null);
        assert_eq!(
            OutputEvent::from(SelectionNotice::RecordId(Some("1".into()))),
            OutputEvent::RecordId(Some("1".into()))
        );
    }

    #[test]
    fn loading_phase_messages() {
        assert_eq!(LoadingPhase::WaitingParent.message(), Some("Waiting for parent..."));
        assert_eq!(LoadingPhase::Ready.message(), None);
    }

    #[test]
    fn classify_keys() {
        let mut lookup = ready_lookup();
        assert_eq!(
            lookup.classify_key(&KeyEvent::new(KeyCode::Tab)),
            KeyDisposition::PassThrough
        );
        assert_eq!(
            lookup.classify_key(&KeyEvent::new(KeyCode::Down)),
            KeyDisposition::Consumed
        );
        assert_eq!(
            lookup.classify_key(&KeyEvent::new(KeyCode::Char('c')).with_modifiers(Modifiers::CTRL)),
            KeyDisposition::PassThrough
        );
        lookup.focus.focus_in(FocusTarget::SelectionChip);
        assert_eq!(
            lookup.classify_key(&KeyEvent::new(KeyCode::Delete)),
            KeyDisposition::PassThrough
        );
    }

    #[test]
    fn tab_on_open_results_is_consumed() {
        let mut lookup = ready_lookup();
        let cmd = lookup.update(Msg::Show);
        drive(&mut lookup, cmd);
        assert!(lookup.is_open());
        let tab = KeyEvent::new(KeyCode::Tab);
        assert_eq!(lookup.classify_key(&tab), KeyDisposition::Consumed);

        let _ = lookup.update(Msg::Key(KeyEvent::new(KeyCode::Down)));
        let _ = lookup.update(Msg::Key(tab));
        assert_eq!(lookup.selected().map(|c| c.display_value.as_str()), Some("Globex"));
        assert!(!lookup.is_open());
        assert_eq!(lookup.classify_key(&tab), KeyDisposition::PassThrough);
    }

    #[test]
    fn delete_on_empty_chip_does_nothing() {
        let mut lookup = ready_lookup();
        lookup.focus.focus_in(FocusTarget::SelectionChip);
        let key = KeyEvent::new(KeyCode::Delete);
        assert_eq!(lookup.classify_key(&key), KeyDisposition::PassThrough);
        assert!(matches!(lookup.update(Msg::Key(key)), Cmd::None));
    }

    #[test]
    fn whitespace_text_does_not_populate_on_tab() {
        let mut lookup = Lookup::new(LookupConfig::default().with_populate_on_tab(true), backend());
        let cmd = lookup.init();
        drive(&mut lookup, cmd);
        let _ = lookup.update(Msg::InputChanged("   ".into()));
        let tab = KeyEvent::new(KeyCode::Tab);
        assert_eq!(lookup.classify_key(&tab), KeyDisposition::PassThrough);
        let _ = lookup.update(Msg::Key(tab));
        assert!(lookup.is_ready());
        assert!(!lookup.is_loading());
    }

    #[test]
    fn backspace_removes_whole_grapheme() {
        let mut lookup = ready_lookup();
        let _ = lookup.update(Msg::InputChanged("cafe\u{301}".into()));
        let _ = lookup.update(Msg::Key(KeyEvent::new(KeyCode::Backspace)));
        assert_eq!(lookup.search_text(), "caf");
    }

    #[test]
    fn typed_chars_append() {
        let mut lookup = ready_lookup();
        let _ = lookup.update(Msg::Key(KeyEvent::new(KeyCode::Char('a'))));
        let _ = lookup.update(Msg::Key(KeyEvent::new(KeyCode::Char('c'))));
        assert_eq!(lookup.search_text(), "ac");
    }

    #[test]
    fn disabled_control_ignores_input() {
        let mut lookup = Lookup::new(LookupConfig::default().with_disabled(true), backend());
        let _ = lookup.update(Msg::InputChanged("acme".into()));
        assert_eq!(lookup.search_text(), "");
        assert!(!lookup.is_interactive());
    }

    #[test]
    fn subscriptions_follow_attachment() {
        let mut lookup = ready_lookup();
        assert_eq!(lookup.subscriptions().len(), 1);
        let _ = lookup.update(Msg::Detach);
        assert!(lookup.subscriptions().is_empty());
    }
}
