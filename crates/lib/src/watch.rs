//! # Page Watch
//!
//! A single cancellable background task that keeps the panel in sync with the
//! host page while it is open:
//!
//! * every poll interval the conversation id is re-read; a change emits
//!   [`PageEvent::ConversationChanged`]. Polling stops by itself once the modal
//!   is detached from the page.
//! * page mutations that insert client info items schedule a
//!   [`PageEvent::Reinitialize`] after a settle delay. Bursts of mutations are
//!   coalesced into one event.
//!
//! Events are delivered to a callback. [`PageWatch::stop`] may be called any
//! number of times.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY, INFO_KEY_SKILL};
use crate::host::HostPage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Something the panel should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The host page now shows a different conversation.
    ConversationChanged {
        conversation_id: String,
        skill: String,
    },
    /// Client info items were re-rendered and have settled.
    Reinitialize,
    /// The modal is no longer attached; conversation polling has stopped.
    ModalDetached,
}

/// A change to the host page's DOM, as reported by the embedding environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMutation {
    /// Nodes containing client info items were inserted.
    InfoItemsInserted,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

pub type EventCallback = Arc<dyn Fn(PageEvent) + Send + Sync + 'static>;

/// Handle to the running watch task.
pub struct PageWatch {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    mutations: mpsc::UnboundedSender<PageMutation>,
}

impl PageWatch {
    /// Spawns the watch task. `last_conversation_id` is the id already shown in the panel.
    pub fn start<F>(
        host: Arc<dyn HostPage>,
        last_conversation_id: String,
        config: WatchConfig,
        on_event: F,
    ) -> Self
    where
        F: Fn(PageEvent) + Send + Sync + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (mutations, mutation_rx) = mpsc::unbounded_channel();
        let callback: EventCallback = Arc::new(on_event);

        info!(
            "Starting page watch (poll {:?}, settle {:?})",
            config.poll_interval, config.settle_delay
        );
        let handle = tokio::spawn(run(
            host,
            last_conversation_id,
            config,
            callback,
            stop_rx,
            mutation_rx,
        ));

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            mutations,
        }
    }

    /// Reports a page mutation to the watch.
    pub fn notify(&self, mutation: PageMutation) {
        if self.mutations.send(mutation).is_err() {
            debug!("Page watch already stopped; dropping {mutation:?}");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the task and waits for it to finish.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Page watch task ended abnormally: {e}");
            }
            info!("Page watch stopped");
        }
    }
}

impl Drop for PageWatch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(
    host: Arc<dyn HostPage>,
    mut last_conversation_id: String,
    config: WatchConfig,
    on_event: EventCallback,
    mut stop_rx: oneshot::Receiver<()>,
    mut mutation_rx: mpsc::UnboundedReceiver<PageMutation>,
) {
    let mut poll = time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polling = true;

    let settle = time::sleep(config.settle_delay);
    tokio::pin!(settle);
    let mut settle_armed = false;

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = poll.tick(), if polling => {
                if !host.modal_attached() {
                    debug!("Modal detached; stopping conversation poll");
                    polling = false;
                    on_event(PageEvent::ModalDetached);
                    continue;
                }
                let conversation_id = host.conversation_id();
                if !conversation_id.is_empty() && conversation_id != last_conversation_id {
                    info!("Conversation changed: '{last_conversation_id}' -> '{conversation_id}'");
                    last_conversation_id = conversation_id.clone();
                    let skill = host
                        .info_item(INFO_KEY_SKILL)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default();
                    on_event(PageEvent::ConversationChanged { conversation_id, skill });
                }
            }
            Some(mutation) = mutation_rx.recv() => {
                if mutation == PageMutation::InfoItemsInserted {
                    settle.as_mut().reset(Instant::now() + config.settle_delay);
                    settle_armed = true;
                }
            }
            _ = &mut settle, if settle_armed => {
                settle_armed = false;
                on_event(PageEvent::Reinitialize);
            }
        }
    }
}
