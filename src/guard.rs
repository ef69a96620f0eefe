//! Navigation guard — the unsaved-changes state machine
//!
//! Every request to change the selected resource, selected attribution,
//! active view, or to dispatch a file request passes through here. While
//! an attribution edit is uncommitted, the requested destination is staged
//! instead of applied, and the UI is told to prompt; the user then either
//! discards the draft and proceeds, or cancels and keeps editing.
//!
//! This is an explicit three-state machine with an explicit staged value —
//! not suspended control flow — so the overwrite-on-repeat-request rule is
//! a testable property rather than an accident of ordering. Actions that a
//! state does not define are logged no-ops, never panics.

use serde::{Deserialize, Serialize};

use crate::model::PackageInfo;

// ─── Destinations ──────────────────────────────────────────────────

/// Top-level views of the application shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum View {
    Audit,
    Attribution,
    Report,
}

/// Export flavors the shell can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportKind {
    FollowUp,
    CompactBom,
    DetailedBom,
    Spdx,
}

/// A pending file operation that must not fire while edits could be lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileRequest {
    Open,
    Import { format: String },
    Export(ExportKind),
}

/// The staged navigation intent. Only the fields the request set are
/// `Some`; on confirm, exactly those are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedDestination {
    pub view: Option<View>,
    pub resource_id: Option<String>,
    pub attribution_id: Option<String>,
    pub file_request: Option<FileRequest>,
}

impl StagedDestination {
    pub fn to_view(view: View) -> Self {
        Self {
            view: Some(view),
            ..Default::default()
        }
    }

    pub fn to_resource(id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn to_attribution(id: impl Into<String>) -> Self {
        Self {
            attribution_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn to_file_request(request: FileRequest) -> Self {
        Self {
            file_request: Some(request),
            ..Default::default()
        }
    }
}

// ─── Machine ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// No uncommitted edit; navigation applies immediately.
    Clean,
    /// An attribution edit is in flight and not yet committed.
    Dirty,
    /// A navigation was attempted while dirty; its destination is staged
    /// and a confirmation prompt is being shown.
    AwaitingDecision,
}

/// What happened to a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The destination was applied. Carries the file request to dispatch,
    /// if the destination held one.
    Applied(Option<FileRequest>),
    /// The destination was staged; the prompt UI must now ask the user.
    PromptRequired,
}

/// The guard plus the selection state it protects. All transitions are
/// synchronous reactions to single user events, processed in arrival
/// order; each sees the state the previous one left behind.
#[derive(Debug)]
pub struct NavigationGuard {
    state: GuardState,
    staged: Option<StagedDestination>,
    view: View,
    selected_resource_id: Option<String>,
    selected_attribution_id: Option<String>,
    draft: Option<PackageInfo>,
}

impl Default for NavigationGuard {
    fn default() -> Self {
        Self {
            state: GuardState::Clean,
            staged: None,
            view: View::Audit,
            selected_resource_id: None,
            selected_attribution_id: None,
            draft: None,
        }
    }
}

impl NavigationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// The staged destination, present exactly while awaiting a decision.
    pub fn staged(&self) -> Option<&StagedDestination> {
        self.staged.as_ref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn selected_resource_id(&self) -> Option<&str> {
        self.selected_resource_id.as_deref()
    }

    pub fn selected_attribution_id(&self) -> Option<&str> {
        self.selected_attribution_id.as_deref()
    }

    pub fn draft(&self) -> Option<&PackageInfo> {
        self.draft.as_ref()
    }

    /// Start or update an uncommitted edit.
    pub fn begin_edit(&mut self, draft: PackageInfo) {
        match self.state {
            GuardState::Clean | GuardState::Dirty => {
                self.draft = Some(draft);
                self.state = GuardState::Dirty;
            }
            GuardState::AwaitingDecision => {
                tracing::warn!("begin_edit while awaiting decision ignored");
            }
        }
    }

    /// Route a navigation request through the guard. Clean: applied on
    /// the spot. Dirty or already awaiting: the destination is staged,
    /// overwriting any previous stage — the last request wins.
    pub fn request(&mut self, destination: StagedDestination) -> NavigationOutcome {
        match self.state {
            GuardState::Clean => {
                let file_request = self.apply(destination);
                NavigationOutcome::Applied(file_request)
            }
            GuardState::Dirty | GuardState::AwaitingDecision => {
                self.staged = Some(destination);
                self.state = GuardState::AwaitingDecision;
                NavigationOutcome::PromptRequired
            }
        }
    }

    pub fn request_view(&mut self, view: View) -> NavigationOutcome {
        self.request(StagedDestination::to_view(view))
    }

    pub fn request_resource(&mut self, id: impl Into<String>) -> NavigationOutcome {
        self.request(StagedDestination::to_resource(id))
    }

    pub fn request_attribution(&mut self, id: impl Into<String>) -> NavigationOutcome {
        self.request(StagedDestination::to_attribution(id))
    }

    pub fn request_file(&mut self, request: FileRequest) -> NavigationOutcome {
        self.request(StagedDestination::to_file_request(request))
    }

    /// "Discard and proceed": drop the draft, apply every staged field,
    /// return to Clean. Returns the applied destination so the session
    /// can follow up (reveal the resource, dispatch the file request).
    pub fn confirm_discard(&mut self) -> Option<StagedDestination> {
        if self.state != GuardState::AwaitingDecision {
            tracing::warn!(state = ?self.state, "confirm_discard in undefined state ignored");
            return None;
        }
        let destination = self.staged.take()?;
        self.draft = None;
        self.state = GuardState::Clean;
        self.apply(destination.clone());
        Some(destination)
    }

    /// Keep editing: drop the staged destination, return to Dirty with
    /// the draft untouched.
    pub fn cancel(&mut self) {
        if self.state != GuardState::AwaitingDecision {
            tracing::warn!(state = ?self.state, "cancel in undefined state ignored");
            return;
        }
        self.staged = None;
        self.state = GuardState::Dirty;
    }

    /// A successful explicit save: the draft has been committed elsewhere,
    /// so the guard returns to Clean with no destination change. A no-op
    /// while Clean; undefined (and ignored) while awaiting a decision.
    pub fn mark_saved(&mut self) {
        match self.state {
            GuardState::Clean => {}
            GuardState::Dirty => {
                self.draft = None;
                self.state = GuardState::Clean;
            }
            GuardState::AwaitingDecision => {
                tracing::warn!("mark_saved while awaiting decision ignored");
            }
        }
    }

    /// Wholesale reset on project load.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn apply(&mut self, destination: StagedDestination) -> Option<FileRequest> {
        if let Some(view) = destination.view {
            self.view = view;
        }
        if let Some(resource_id) = destination.resource_id {
            self.selected_resource_id = Some(resource_id);
        }
        if let Some(attribution_id) = destination.attribution_id {
            self.selected_attribution_id = Some(attribution_id);
        }
        destination.file_request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PackageInfo {
        PackageInfo {
            package_name: Some("new Name".into()),
            ..Default::default()
        }
    }

    #[test]
    fn clean_navigation_applies_immediately() {
        let mut guard = NavigationGuard::new();
        let outcome = guard.request_resource("/thirdParty/");
        assert_eq!(outcome, NavigationOutcome::Applied(None));
        assert_eq!(guard.selected_resource_id(), Some("/thirdParty/"));
        assert_eq!(guard.state(), GuardState::Clean);
    }

    #[test]
    fn clean_file_request_is_handed_back_for_dispatch() {
        let mut guard = NavigationGuard::new();
        let outcome = guard.request_file(FileRequest::Export(ExportKind::FollowUp));
        assert_eq!(
            outcome,
            NavigationOutcome::Applied(Some(FileRequest::Export(ExportKind::FollowUp)))
        );
    }

    #[test]
    fn guard_round_trip() {
        let mut guard = NavigationGuard::new();
        // commit while clean stays clean
        guard.mark_saved();
        assert_eq!(guard.state(), GuardState::Clean);

        guard.begin_edit(draft());
        assert_eq!(guard.state(), GuardState::Dirty);

        let outcome = guard.request(StagedDestination {
            view: Some(View::Audit),
            resource_id: Some("/new/selection".into()),
            ..Default::default()
        });
        assert_eq!(outcome, NavigationOutcome::PromptRequired);
        assert_eq!(guard.state(), GuardState::AwaitingDecision);
        assert!(guard.staged().is_some());
        // not applied yet
        assert_eq!(guard.selected_resource_id(), None);

        let applied = guard.confirm_discard().unwrap();
        assert_eq!(guard.state(), GuardState::Clean);
        assert_eq!(applied.resource_id.as_deref(), Some("/new/selection"));
        assert_eq!(guard.selected_resource_id(), Some("/new/selection"));
        assert_eq!(guard.view(), View::Audit);
        assert!(guard.draft().is_none());
        assert!(guard.staged().is_none());
    }

    #[test]
    fn cancel_keeps_draft_and_applies_nothing() {
        let mut guard = NavigationGuard::new();
        guard.request_resource("/original");
        guard.begin_edit(draft());
        guard.request_view(View::Report);
        assert_eq!(guard.state(), GuardState::AwaitingDecision);

        guard.cancel();
        assert_eq!(guard.state(), GuardState::Dirty);
        assert_eq!(guard.draft(), Some(&draft()));
        assert_eq!(guard.view(), View::Audit);
        assert_eq!(guard.selected_resource_id(), Some("/original"));
        assert!(guard.staged().is_none());
    }

    #[test]
    fn second_request_overwrites_the_stage() {
        let mut guard = NavigationGuard::new();
        guard.begin_edit(draft());
        guard.request_resource("/first");
        guard.request_resource("/second");
        assert_eq!(
            guard.staged().and_then(|d| d.resource_id.as_deref()),
            Some("/second")
        );

        guard.confirm_discard();
        assert_eq!(guard.selected_resource_id(), Some("/second"));
    }

    #[test]
    fn staged_file_request_survives_until_confirm() {
        let mut guard = NavigationGuard::new();
        guard.begin_edit(draft());
        guard.request_file(FileRequest::Open);
        let applied = guard.confirm_discard().unwrap();
        assert_eq!(applied.file_request, Some(FileRequest::Open));
        assert_eq!(guard.state(), GuardState::Clean);
    }

    #[test]
    fn undefined_actions_are_no_ops() {
        let mut guard = NavigationGuard::new();
        assert!(guard.confirm_discard().is_none());
        guard.cancel();
        assert_eq!(guard.state(), GuardState::Clean);

        guard.begin_edit(draft());
        guard.request_view(View::Report);
        guard.mark_saved(); // undefined while awaiting
        assert_eq!(guard.state(), GuardState::AwaitingDecision);
        guard.begin_edit(draft()); // likewise
        assert_eq!(guard.state(), GuardState::AwaitingDecision);
    }

    #[test]
    fn save_while_dirty_returns_to_clean_without_moving() {
        let mut guard = NavigationGuard::new();
        guard.request_resource("/here");
        guard.begin_edit(draft());
        guard.mark_saved();
        assert_eq!(guard.state(), GuardState::Clean);
        assert_eq!(guard.selected_resource_id(), Some("/here"));
        assert!(guard.draft().is_none());
    }
}
