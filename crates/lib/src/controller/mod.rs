//! # Modal/Tab Controller
//!
//! Drives the evaluation panel: opening against the host page, the Rate /
//! View / Add tabs, submissions to the webhooks, and reacting to the page
//! watch. All state changes go through `&mut self`, so a submission in
//! flight cannot be re-entered.
//!
//! Failures that the user can correct (validation, template parsing,
//! webhook rejections) are reported as an error alert on the active tab
//! *and* returned; the controller always stays re-enterable with form state
//! preserved.

pub mod add;
pub mod panel;
pub mod rate;
pub mod view;

use crate::errors::{EvalError, ValidationError};
use crate::grouping::{flatten_groups, group_identical_ratings};
use crate::host::{Diagnostics, HostPage};
use crate::session::Session;
use crate::sheet_data::SheetSource;
use crate::watch::{PageEvent, PageMutation, PageWatch, WatchConfig};
use crate::webhook::WebhookClient;
use add::AddTab;
use panel::{Alert, ResizeDrag, SubmitButton};
use rate::RateTab;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use view::ViewTab;

pub const RATE_SUCCESS: &str = "Rating submitted successfully!";
pub const ADD_SUCCESS: &str = "Metric(s) added successfully!";
pub const UPDATE_SUCCESS: &str = "Metric updated successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Rate,
    View,
    Add,
}

/// Result of asking the controller to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// The conversation was already rated; call [`EvalController::open_anyway`] to proceed.
    AlreadyRated,
}

struct OpenPanel {
    active: Tab,
    rate: RateTab,
    view: ViewTab,
    add: Option<AddTab>,
    alerts: HashMap<Tab, Alert>,
    stale: HashSet<Tab>,
    width: Option<f64>,
    drag: Option<ResizeDrag>,
    watch: PageWatch,
}

pub struct EvalController {
    host: Arc<dyn HostPage>,
    session: Session,
    webhooks: WebhookClient,
    watch_config: WatchConfig,
    panel: Option<OpenPanel>,
    /// Inbox of the current panel's watch; replaced on every open and close.
    events_rx: mpsc::UnboundedReceiver<PageEvent>,
}

/// An inbox with no sender left, so it yields nothing.
fn closed_inbox() -> mpsc::UnboundedReceiver<PageEvent> {
    mpsc::unbounded_channel().1
}

impl EvalController {
    pub fn new(
        host: Arc<dyn HostPage>,
        sheets: Arc<dyn SheetSource>,
        webhooks: WebhookClient,
        watch_config: WatchConfig,
    ) -> Self {
        Self {
            host,
            session: Session::new(sheets),
            webhooks,
            watch_config,
            panel: None,
            events_rx: closed_inbox(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_open(&self) -> bool {
        self.panel.is_some()
    }

    pub fn diagnose(&self) -> Diagnostics {
        self.session.diagnose(self.host.as_ref())
    }

    // --- Open / close ---

    /// Runs the open sequence.
    ///
    /// Refuses while the conversation is still open, then loads the page
    /// context and sheets. An already-rated conversation is reported instead
    /// of opened so the caller can confirm.
    pub async fn open(&mut self) -> Result<OpenOutcome, EvalError> {
        if self.panel.is_some() {
            return Ok(OpenOutcome::Opened);
        }
        if !self.host.is_conversation_closed() {
            warn!("Cannot evaluate: conversation is still open");
            return Err(EvalError::ConversationStillOpen);
        }

        self.session.load(self.host.as_ref()).await.map_err(|e| {
            error!("Failed to load sheets data: {e}");
            e
        })?;

        if self.session.is_already_rated() {
            info!(
                "Conversation '{}' already rated; awaiting confirmation",
                self.session.context().conversation_id
            );
            return Ok(OpenOutcome::AlreadyRated);
        }
        self.open_panel();
        Ok(OpenOutcome::Opened)
    }

    /// Opens after the user confirmed re-rating an already-rated conversation.
    pub fn open_anyway(&mut self) {
        if self.panel.is_none() {
            self.open_panel();
        }
    }

    fn open_panel(&mut self) {
        let (events, events_rx) = mpsc::unbounded_channel();
        self.events_rx = events_rx;
        let watch = PageWatch::start(
            Arc::clone(&self.host),
            self.session.context().conversation_id.clone(),
            self.watch_config,
            move |event| {
                let _ = events.send(event);
            },
        );

        let add = self
            .session
            .has_permission_to_add_metric()
            .then(|| AddTab::new(self.session.selectable_skills()));
        let metrics = self.session.metrics_for_skill();
        info!(
            "Opening evaluation panel with {} metric(s) for skill '{}'",
            metrics.len(),
            self.session.context().skill
        );

        self.panel = Some(OpenPanel {
            active: Tab::Rate,
            rate: RateTab::new(metrics.iter().copied()),
            view: ViewTab::new(metrics.iter().copied()),
            add,
            alerts: HashMap::new(),
            stale: HashSet::new(),
            width: None,
            drag: None,
            watch,
        });
    }

    /// Closes the panel and stops the page watch. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut panel) = self.panel.take() {
            panel.watch.stop().await;
            self.events_rx = closed_inbox();
            info!("Evaluation panel closed");
        }
    }

    // --- Tabs ---

    pub fn active_tab(&self) -> Option<Tab> {
        self.panel.as_ref().map(|p| p.active)
    }

    /// Tabs shown to the current user.
    pub fn tabs(&self) -> Vec<Tab> {
        match &self.panel {
            Some(panel) if panel.add.is_some() => vec![Tab::Rate, Tab::View, Tab::Add],
            Some(_) => vec![Tab::Rate, Tab::View],
            None => Vec::new(),
        }
    }

    pub fn switch_tab(&mut self, tab: Tab) -> Result<(), EvalError> {
        let panel = self.panel.as_mut().ok_or(EvalError::NotOpen)?;
        if tab == Tab::Add && panel.add.is_none() {
            return Err(ValidationError::PermissionDenied.into());
        }
        panel.active = tab;
        if panel.stale.remove(&tab) {
            Self::rebuild_tab(panel, &self.session, tab);
        }
        Ok(())
    }

    fn rebuild_tab(panel: &mut OpenPanel, session: &Session, tab: Tab) {
        match tab {
            Tab::Rate => panel.rate = RateTab::new(session.metrics_for_skill()),
            Tab::View => panel.view = ViewTab::new(session.metrics_for_skill()),
            // Add-tab drafts do not depend on the conversation.
            Tab::Add => {}
        }
    }

    fn rebuild_for_context(&mut self) {
        let Some(panel) = self.panel.as_mut() else {
            return;
        };
        let active = panel.active;
        Self::rebuild_tab(panel, &self.session, active);
        panel.stale = [Tab::Rate, Tab::View]
            .into_iter()
            .filter(|t| *t != active)
            .collect();
        panel.alerts.clear();
    }

    pub fn rate_tab(&self) -> Option<&RateTab> {
        self.panel.as_ref().map(|p| &p.rate)
    }

    pub fn rate_tab_mut(&mut self) -> Option<&mut RateTab> {
        self.panel.as_mut().map(|p| &mut p.rate)
    }

    pub fn view_tab(&self) -> Option<&ViewTab> {
        self.panel.as_ref().map(|p| &p.view)
    }

    pub fn view_tab_mut(&mut self) -> Option<&mut ViewTab> {
        self.panel.as_mut().map(|p| &mut p.view)
    }

    pub fn add_tab(&self) -> Option<&AddTab> {
        self.panel.as_ref().and_then(|p| p.add.as_ref())
    }

    pub fn add_tab_mut(&mut self) -> Option<&mut AddTab> {
        self.panel.as_mut().and_then(|p| p.add.as_mut())
    }

    pub fn alert(&self, tab: Tab) -> Option<&Alert> {
        self.panel.as_ref().and_then(|p| p.alerts.get(&tab))
    }

    /// Enters a Count value on the Rate tab, reporting negative input as an alert.
    pub fn enter_count(&mut self, input_name: &str, raw: &str) -> Result<(), EvalError> {
        let panel = self.panel.as_mut().ok_or(EvalError::NotOpen)?;
        if let Err(e) = panel.rate.inputs_mut().enter_count(input_name, raw) {
            panel.alerts.insert(Tab::Rate, Alert::error(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// The footer button for the active tab; `None` when hidden.
    pub fn submit_button(&self) -> Option<SubmitButton> {
        let panel = self.panel.as_ref()?;
        let label = match panel.active {
            Tab::View => return None,
            Tab::Rate => "Submit",
            Tab::Add if panel.add.as_ref().is_some_and(AddTab::is_previewing) => "Submit Metric",
            Tab::Add => "Process Metric(s)",
        };
        Some(SubmitButton { label })
    }

    // --- Submission ---

    /// Presses the footer button of the active tab.
    pub async fn submit(&mut self) -> Result<(), EvalError> {
        let active = self.active_tab().ok_or(EvalError::NotOpen)?;
        match active {
            Tab::Rate => self.submit_ratings().await,
            Tab::View => Ok(()),
            Tab::Add => {
                if self.add_tab().is_some_and(AddTab::is_previewing) {
                    self.submit_metrics().await
                } else {
                    self.process()
                }
            }
        }
    }

    fn report(&mut self, tab: Tab, result: Result<String, EvalError>) -> Result<(), EvalError> {
        let Some(panel) = self.panel.as_mut() else {
            return result.map(|_| ());
        };
        match result {
            Ok(message) => {
                panel.alerts.insert(tab, Alert::success(message));
                Ok(())
            }
            Err(e) => {
                warn!("{tab:?} tab error: {e}");
                panel.alerts.insert(tab, Alert::error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn post_ratings(&mut self) -> Result<String, EvalError> {
        let panel = self.panel.as_mut().ok_or(EvalError::NotOpen)?;
        let batch = panel.rate.build_batch()?;
        let groups = group_identical_ratings(&batch);
        let ratings = flatten_groups(&groups);

        let context = self.session.context().clone();
        let response = self
            .webhooks
            .submit_ratings(&context.conversation_id, &context.skill, ratings)
            .await?;
        Ok(response.message_or(RATE_SUCCESS))
    }

    /// Collects the Rate tab and posts it.
    pub async fn submit_ratings(&mut self) -> Result<(), EvalError> {
        let result = self.post_ratings().await;
        let succeeded = result.is_ok();
        self.report(Tab::Rate, result)?;
        if succeeded {
            self.reload_after_submit().await;
        }
        Ok(())
    }

    /// Validates and analyses the Add forms, moving to the preview.
    pub fn process(&mut self) -> Result<(), EvalError> {
        let session = &self.session;
        let panel = self.panel.as_mut().ok_or(EvalError::NotOpen)?;
        let add = panel
            .add
            .as_mut()
            .ok_or(EvalError::Validation(ValidationError::PermissionDenied))?;
        match add.process(|name| session.metric_exists(name)) {
            Ok(()) => {
                panel.alerts.remove(&Tab::Add);
                Ok(())
            }
            Err(e) => {
                panel.alerts.insert(Tab::Add, Alert::error(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn back_to_edit(&mut self) {
        if let Some(add) = self.add_tab_mut() {
            add.back_to_edit();
        }
    }

    async fn post_metrics(&mut self) -> Result<String, EvalError> {
        let panel = self.panel.as_mut().ok_or(EvalError::NotOpen)?;
        let add = panel
            .add
            .as_ref()
            .ok_or(EvalError::Validation(ValidationError::PermissionDenied))?;
        let rows = add.finalize()?;

        let message = self.webhooks.submit_metrics(rows).await?.message_or(ADD_SUCCESS);

        if let Some(add) = self.add_tab_mut() {
            add.reset();
        }
        Ok(message)
    }

    /// Finalizes the previewed drafts and posts them. On failure the preview stays.
    pub async fn submit_metrics(&mut self) -> Result<(), EvalError> {
        let result = self.post_metrics().await;
        let succeeded = result.is_ok();
        self.report(Tab::Add, result)?;
        if succeeded {
            self.reload_after_submit().await;
        }
        Ok(())
    }

    async fn post_metric_update(&mut self, card: usize) -> Result<String, EvalError> {
        if !self.session.has_permission_to_add_metric() {
            return Err(ValidationError::PermissionDenied.into());
        }
        let panel = self.panel.as_ref().ok_or(EvalError::NotOpen)?;
        let row = panel
            .view
            .edit_submission(card)
            .ok_or_else(|| EvalError::Submission(format!("Card {card} is not being edited")))?;

        let response = self.webhooks.submit_metrics(vec![row]).await?;
        if let Some(panel) = self.panel.as_mut() {
            panel.view.finish_edit(card);
        }
        Ok(response.message_or(UPDATE_SUCCESS))
    }

    /// Saves the enabled flag of a View card in edit mode.
    pub async fn save_metric_update(&mut self, card: usize) -> Result<(), EvalError> {
        let result = self.post_metric_update(card).await;
        let succeeded = result.is_ok();
        self.report(Tab::View, result)?;
        if succeeded {
            self.reload_after_submit().await;
        }
        Ok(())
    }

    async fn reload_after_submit(&mut self) {
        if let Err(e) = self.session.reload().await {
            warn!("Reload after submission failed: {e}");
        }
    }

    // --- Page watch ---

    /// Forwards a host-page mutation to the running watch.
    pub fn notify_mutation(&self, mutation: PageMutation) {
        if let Some(panel) = &self.panel {
            panel.watch.notify(mutation);
        }
    }

    /// Waits for the next event from the page watch.
    pub async fn next_page_event(&mut self) -> Option<PageEvent> {
        self.events_rx.recv().await
    }

    /// Handles every event the watch has emitted so far. Returns how many were handled.
    pub async fn process_page_events(&mut self) -> Result<usize, EvalError> {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_page_event(event).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Applies one watch event to the open panel. Ignored while closed.
    pub async fn handle_page_event(&mut self, event: PageEvent) -> Result<(), EvalError> {
        if self.panel.is_none() {
            debug!("Ignoring {event:?}: panel is closed");
            return Ok(());
        }
        match event {
            PageEvent::ConversationChanged {
                conversation_id,
                skill,
            } => {
                let context = self.session.context();
                if context.conversation_id == conversation_id && context.skill == skill {
                    debug!("Conversation '{conversation_id}' is already loaded");
                    return Ok(());
                }
                self.refresh_for_conversation(&conversation_id, &skill).await
            }
            PageEvent::Reinitialize => {
                if self.host.conversation_id().is_empty() {
                    return Ok(());
                }
                self.session.load(self.host.as_ref()).await?;
                self.rebuild_for_context();
                Ok(())
            }
            PageEvent::ModalDetached => {
                self.close().await;
                Ok(())
            }
        }
    }

    /// Reloads for a new conversation and re-renders the active tab in place.
    ///
    /// Inactive tabs are rebuilt when next shown.
    pub async fn refresh_for_conversation(
        &mut self,
        conversation_id: &str,
        skill: &str,
    ) -> Result<(), EvalError> {
        info!("Refreshing panel for conversation '{conversation_id}'");
        self.session.refresh(skill, conversation_id).await?;
        self.rebuild_for_context();
        Ok(())
    }

    // --- Resize ---

    pub fn begin_resize(&mut self, start_x: f64, current_width: f64) {
        if let Some(panel) = self.panel.as_mut() {
            panel.drag = Some(ResizeDrag {
                start_x,
                start_width: panel.width.unwrap_or(current_width),
            });
        }
    }

    /// Updates the width while dragging; returns the new width.
    pub fn resize(&mut self, x: f64, viewport_width: f64) -> Option<f64> {
        let panel = self.panel.as_mut()?;
        let width = panel.drag?.width_at(x, viewport_width);
        panel.width = Some(width);
        Some(width)
    }

    pub fn end_resize(&mut self) {
        if let Some(panel) = self.panel.as_mut() {
            panel.drag = None;
        }
    }

    pub fn panel_width(&self) -> Option<f64> {
        self.panel.as_ref().and_then(|p| p.width)
    }
}
