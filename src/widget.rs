//! Guest chat widget: session identity, persisted quota and history, panel
//! state, and the send/reply cycle against the remote chat API.
//!
//! [`ChatWidget`] owns all widget state. Rendering happens elsewhere, through
//! a [`WidgetObserver`] that receives a [`WidgetEvent`] for every visible
//! change.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::FantabaseError;
use fantabase_core::text::{trimmed_non_empty, trimmed_opt};
use fantabase_storage::keys::SLEEPER_USERNAME_KEY;
use fantabase_storage::store::{read_lenient, remove_lenient, write_lenient};
use fantabase_storage::KeyValueStore;

pub mod client;
pub mod history;
pub mod observer;
pub mod quota;
pub mod session;
pub mod transcript;
pub mod view;
pub mod waiting;

pub use client::{ChatApi, GuestChatClient, GuestMessageRequest, GuestReply};
pub use history::{ChatHistory, ChatMessage, Role};
pub use observer::{NullObserver, WidgetEvent, WidgetObserver};
pub use quota::{QuotaDisplay, QuotaTracker, MAX_GUEST_MESSAGES};
pub use session::SessionId;
pub use transcript::{Bubble, BubbleContent, BubbleId, Transcript};
pub use view::{FocusTarget, ViewState};

use quota::QuotaCheckpoint;
use view::{InputGate, ViewMachine, ViewUpdate};
use waiting::{WaitingIndicator, WAIT_MESSAGE_INTERVAL};

pub const NO_RESPONSE_TEXT: &str = "No response text returned.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// No usable API endpoint; the configuration error was shown.
    NotConfigured,
    /// Blank text, no quota left, or the chat panel is not showing.
    Ignored,
    /// Another message is still waiting for its reply.
    Busy,
    Replied { text: String, limit_reached: bool },
    /// HTTP 429.
    RateLimited,
    /// Non-2xx reply or transport failure; the quota was rolled back.
    Failed { text: String },
}

struct WidgetState {
    quota: QuotaTracker,
    view: ViewMachine,
    transcript: Transcript,
    input_enabled: bool,
    in_flight: bool,
}

fn lock_state(state: &Mutex<WidgetState>) -> MutexGuard<'_, WidgetState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Settles a send that is abandoned before its reply arrives (the future is
/// dropped, e.g. by a timeout): the placeholder goes away, the quota rolls
/// back, and chat input comes back.
struct InFlightGuard<'a> {
    widget: &'a ChatWidget,
    placeholder: BubbleId,
    checkpoint: QuotaCheckpoint,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.widget.abandon_send(self.placeholder, self.checkpoint);
        }
    }
}

pub struct ChatWidget {
    store: Arc<dyn KeyValueStore>,
    api: Option<Arc<dyn ChatApi>>,
    observer: Arc<dyn WidgetObserver>,
    history: ChatHistory,
    session_id: SessionId,
    state: Mutex<WidgetState>,
}

impl ChatWidget {
    /// Load persisted state and route to the initial panel: chat when a
    /// sleeper username was configured before, the config form otherwise.
    /// The panel starts closed. `api` is `None` when no usable endpoint is
    /// configured.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Option<Arc<dyn ChatApi>>,
        observer: Arc<dyn WidgetObserver>,
    ) -> Self {
        let session_id = session::get_or_create_session_id(store.as_ref());
        let quota = QuotaTracker::initialize(store.clone());
        let widget = Self {
            history: ChatHistory::new(store.clone()),
            store,
            api,
            observer,
            session_id,
            state: Mutex::new(WidgetState {
                quota,
                view: ViewMachine::new(),
                transcript: Transcript::default(),
                input_enabled: false,
                in_flight: false,
            }),
        };

        {
            let mut st = lock_state(&widget.state);
            widget.refresh_quota(&st);
            if widget.sleeper_username().is_some() {
                widget.begin_chat(&mut st);
            } else {
                let update = st.view.open_config();
                if let Some(update) = update {
                    widget.apply_view(&st, update);
                }
            }
        }
        info!(
            "chat widget ready session={} remaining={}",
            widget.session_id,
            widget.remaining()
        );
        widget
    }

    /// Build the widget against the HTTP chat API named in `config`. An
    /// unusable `api_base_url` leaves the widget in the configuration-error
    /// state instead of failing.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        observer: Arc<dyn WidgetObserver>,
    ) -> Self {
        let api: Option<Arc<dyn ChatApi>> =
            match GuestChatClient::new(&config.api_base_url, config.request_timeout()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("chat API unavailable: {}", e);
                    None
                }
            };
        Self::new(store, api, observer)
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn api_configured(&self) -> bool {
        self.api.is_some()
    }

    pub fn view_state(&self) -> ViewState {
        lock_state(&self.state).view.state()
    }

    pub fn is_open(&self) -> bool {
        lock_state(&self.state).view.is_open()
    }

    pub fn is_chat_enabled(&self) -> bool {
        lock_state(&self.state).input_enabled
    }

    pub fn remaining(&self) -> u32 {
        lock_state(&self.state).quota.remaining()
    }

    pub fn quota_display(&self) -> QuotaDisplay {
        lock_state(&self.state).quota.display()
    }

    pub fn transcript(&self) -> Vec<Bubble> {
        lock_state(&self.state).transcript.bubbles().to_vec()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.read(&self.session_id)
    }

    pub fn sleeper_username(&self) -> Option<String> {
        trimmed_opt(read_lenient(self.store.as_ref(), SLEEPER_USERNAME_KEY).as_deref())
    }

    // -----------------------------------------------------------------------
    // Panel and navigation actions
    // -----------------------------------------------------------------------

    pub fn open(&self) {
        let mut st = lock_state(&self.state);
        let update = st.view.open();
        self.emit(WidgetEvent::PanelOpened);
        self.refresh_input(&mut st, true);
        match update.focus {
            Some(FocusTarget::ChatInput) if !st.input_enabled => {}
            Some(focus) => self.emit(WidgetEvent::FocusMoved(focus)),
            None => {}
        }
    }

    /// Hide the panel. An in-flight request keeps running and settles into
    /// the transcript.
    pub fn close(&self) {
        let mut st = lock_state(&self.state);
        st.view.close();
        self.emit(WidgetEvent::PanelClosed);
        self.refresh_input(&mut st, false);
    }

    pub fn toggle(&self) {
        if self.is_open() {
            self.close();
        } else {
            self.open();
        }
    }

    /// Show the sleeper-username form. Ignored once the limit is reached.
    pub fn open_config(&self) {
        let mut st = lock_state(&self.state);
        if let Some(update) = st.view.open_config() {
            self.apply_view(&st, update);
            self.refresh_input(&mut st, false);
        }
    }

    /// Save (or, when blank, forget) the sleeper username and go to chat.
    pub fn configure_sleeper(&self, username: &str) {
        match trimmed_non_empty(username) {
            Some(name) => write_lenient(self.store.as_ref(), SLEEPER_USERNAME_KEY, &name),
            None => remove_lenient(self.store.as_ref(), SLEEPER_USERNAME_KEY),
        }
        let mut st = lock_state(&self.state);
        self.begin_chat(&mut st);
    }

    /// Chat without a sleeper username.
    pub fn skip_sleeper(&self) {
        remove_lenient(self.store.as_ref(), SLEEPER_USERNAME_KEY);
        let mut st = lock_state(&self.state);
        self.begin_chat(&mut st);
    }

    /// Leave the config form without touching the stored username.
    pub fn close_config(&self) {
        let mut st = lock_state(&self.state);
        self.begin_chat(&mut st);
    }

    /// Waitlist form on the limit-reached panel. Blank input is ignored.
    pub fn submit_waitlist(&self, email: &str) -> bool {
        let Some(email) = trimmed_non_empty(email) else {
            return false;
        };
        info!("waitlist signup session={}", self.session_id);
        self.emit(WidgetEvent::WaitlistJoined { email });
        true
    }

    // -----------------------------------------------------------------------
    // Send / reply cycle
    // -----------------------------------------------------------------------

    /// Send one guest message and wait for the reply.
    ///
    /// The quota is decremented before the request goes out and reconciled
    /// when it settles: the server's `remainingMessages` wins, 429 forces 0,
    /// and any other failure restores the pre-send value. Only one message
    /// can be in flight; a second call returns [`SendOutcome::Busy`].
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let Some(api) = self.api.clone() else {
            self.emit(WidgetEvent::ApiErrorShown);
            return SendOutcome::NotConfigured;
        };

        let (request, checkpoint, placeholder, in_flight) = {
            let mut st = lock_state(&self.state);
            if st.in_flight {
                return SendOutcome::Busy;
            }

            // Another process sharing the store may have spent the quota.
            let before = st.quota.remaining();
            if st.quota.reload() != before {
                self.refresh_quota(&st);
            }
            if st.quota.is_exhausted() {
                if st.view.state() == ViewState::Chatting {
                    self.show_limit_hit(&mut st, false);
                }
                self.refresh_input(&mut st, true);
                return SendOutcome::Ignored;
            }
            let Some(message) = trimmed_non_empty(text) else {
                return SendOutcome::Ignored;
            };
            if st.view.state() != ViewState::Chatting {
                return SendOutcome::Ignored;
            }

            st.in_flight = true;

            let user = st
                .transcript
                .push(Role::User, BubbleContent::Text(message.clone()));
            self.emit_added(&user);
            self.history.append(&self.session_id, Role::User, &message);
            self.refresh_input(&mut st, false);
            self.emit(WidgetEvent::ScrolledToBottom);

            let (checkpoint, limit_hit) = st.quota.apply_optimistic();
            self.after_quota_write(&mut st, limit_hit, false, true);

            let placeholder = st.transcript.push(Role::Assistant, BubbleContent::Waiting);
            self.emit_added(&placeholder);
            self.emit(WidgetEvent::ScrolledToBottom);

            let request = GuestMessageRequest {
                message,
                session_id: self.session_id.to_string(),
                sleeper_username: self.sleeper_username(),
            };
            let in_flight = InFlightGuard {
                widget: self,
                placeholder: placeholder.id,
                checkpoint,
                armed: true,
            };
            (request, checkpoint, placeholder.id, in_flight)
        };

        info!(
            "sending guest message session={} remaining={}",
            self.session_id,
            checkpoint.previous.saturating_sub(1)
        );
        let indicator =
            WaitingIndicator::start(placeholder, self.observer.clone(), WAIT_MESSAGE_INTERVAL);
        let result = api.send_guest_message(&request).await;
        indicator.stop().await;

        let mut st = lock_state(&self.state);
        let outcome = self.settle(&mut st, placeholder, checkpoint, result);

        st.in_flight = false;
        in_flight.disarm();
        st.view.confirm_limit();
        if st.view.state() != ViewState::LimitReached {
            self.refresh_input(&mut st, true);
            self.emit(WidgetEvent::ScrolledToBottom);
        }
        outcome
    }

    fn settle(
        &self,
        st: &mut WidgetState,
        placeholder: BubbleId,
        checkpoint: QuotaCheckpoint,
        result: Result<GuestReply, FantabaseError>,
    ) -> SendOutcome {
        match result {
            Ok(GuestReply::Success {
                text,
                remaining_messages,
            }) => {
                let reply = text
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| NO_RESPONSE_TEXT.to_string());
                self.set_bubble_text(st, placeholder, &reply);
                self.history
                    .append(&self.session_id, Role::Assistant, &reply);
                let limit_reached = match remaining_messages {
                    Some(value) => {
                        let hit = st.quota.reconcile_authoritative(value);
                        self.after_quota_write(st, hit, true, false)
                    }
                    None => st.quota.is_exhausted(),
                };
                SendOutcome::Replied {
                    text: reply,
                    limit_reached,
                }
            }
            Ok(GuestReply::RateLimited) => {
                info!("guest quota exhausted server-side session={}", self.session_id);
                if st.transcript.remove(placeholder) {
                    self.emit(WidgetEvent::MessageRemoved { id: placeholder });
                }
                let hit = st.quota.set_remaining(0.0);
                self.after_quota_write(st, hit, true, false);
                SendOutcome::RateLimited
            }
            Ok(GuestReply::Failed { status, message }) => {
                let text = message.unwrap_or_else(|| format!("Request failed ({status})"));
                warn!("guest message failed status={} error={}", status, text);
                self.fail(st, placeholder, checkpoint, text)
            }
            Err(e) => {
                let reason = match e {
                    FantabaseError::Network(reason) => reason,
                    other => other.to_string(),
                };
                warn!("guest message transport failure: {}", reason);
                self.fail(st, placeholder, checkpoint, format!("Network error: {reason}"))
            }
        }
    }

    fn abandon_send(&self, placeholder: BubbleId, checkpoint: QuotaCheckpoint) {
        warn!("guest message abandoned before a reply session={}", self.session_id);
        let mut st = lock_state(&self.state);
        if st.transcript.remove(placeholder) {
            self.emit(WidgetEvent::MessageRemoved { id: placeholder });
        }
        let hit = st.quota.rollback(checkpoint);
        self.after_quota_write(&mut st, hit, false, false);
        st.in_flight = false;
        st.view.confirm_limit();
        if st.view.state() != ViewState::LimitReached {
            self.refresh_input(&mut st, true);
        }
    }

    fn fail(
        &self,
        st: &mut WidgetState,
        placeholder: BubbleId,
        checkpoint: QuotaCheckpoint,
        text: String,
    ) -> SendOutcome {
        self.set_bubble_text(st, placeholder, &text);
        let hit = st.quota.rollback(checkpoint);
        self.after_quota_write(st, hit, false, false);
        SendOutcome::Failed { text }
    }

    // -----------------------------------------------------------------------
    // State helpers (caller holds the state lock)
    // -----------------------------------------------------------------------

    fn emit(&self, event: WidgetEvent) {
        self.observer.on_event(&event);
    }

    fn emit_added(&self, bubble: &Bubble) {
        self.emit(WidgetEvent::MessageAdded {
            id: bubble.id,
            role: bubble.role,
            content: bubble.content.clone(),
        });
    }

    fn set_bubble_text(&self, st: &mut WidgetState, id: BubbleId, text: &str) {
        if st.transcript.set_text(id, text) {
            self.emit(WidgetEvent::MessageUpdated {
                id,
                text: text.to_string(),
            });
        }
    }

    fn refresh_quota(&self, st: &WidgetState) {
        self.emit(WidgetEvent::QuotaChanged(st.quota.display()));
    }

    fn refresh_input(&self, st: &mut WidgetState, requested: bool) {
        let enabled = st.view.input_enabled(InputGate {
            requested,
            api_configured: self.api.is_some(),
            remaining: st.quota.remaining(),
            in_flight: st.in_flight,
        });
        if enabled != st.input_enabled {
            st.input_enabled = enabled;
            self.emit(WidgetEvent::ChatInputChanged { enabled });
        }
    }

    fn apply_view(&self, st: &WidgetState, update: ViewUpdate) {
        self.emit(WidgetEvent::ViewChanged(update.state));
        self.refresh_quota(st);
        if let Some(focus) = update.focus {
            self.emit(WidgetEvent::FocusMoved(focus));
        }
    }

    fn show_limit_hit(&self, st: &mut WidgetState, provisional: bool) {
        let update = st.view.limit_reached(provisional);
        self.apply_view(st, update);
        self.refresh_input(st, false);
    }

    fn begin_chat(&self, st: &mut WidgetState) {
        let update = st.view.begin_chat(st.quota.remaining());
        if update.state != ViewState::Chatting {
            self.apply_view(st, update);
            self.refresh_input(st, false);
            return;
        }
        for bubble in self.history.render_into(&self.session_id, &mut st.transcript) {
            self.emit_added(&bubble);
        }
        self.apply_view(st, update);
        self.refresh_input(st, true);
        self.emit(WidgetEvent::ScrolledToBottom);
    }

    /// UI follow-up to a quota write (the write is already persisted).
    /// Returns true when the limit is now reached.
    fn after_quota_write(
        &self,
        st: &mut WidgetState,
        limit_hit: bool,
        enable_chat: bool,
        provisional: bool,
    ) -> bool {
        self.refresh_quota(st);
        if limit_hit {
            self.show_limit_hit(st, provisional);
            return true;
        }
        if let Some(update) = st.view.revoke_provisional_limit(st.quota.remaining()) {
            self.apply_view(st, update);
        }
        if enable_chat {
            self.refresh_input(st, true);
        }
        false
    }
}
