//! Which widget panel is visible and whether the chat box accepts input.
//!
//! Pure state: no storage, no rendering. The widget turns the returned
//! [`ViewUpdate`]s into observer events.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewState {
    /// Sleeper-username form.
    Config,
    Chatting,
    /// Guest allowance used up; waitlist form shown.
    LimitReached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusTarget {
    SleeperUsername,
    ChatInput,
    WaitlistEmail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewUpdate {
    pub state: ViewState,
    /// Control to focus; `None` while the panel is closed.
    pub focus: Option<FocusTarget>,
}

/// Everything besides the view itself that decides whether input is enabled.
#[derive(Clone, Copy, Debug)]
pub struct InputGate {
    pub requested: bool,
    pub api_configured: bool,
    pub remaining: u32,
    pub in_flight: bool,
}

#[derive(Debug)]
pub struct ViewMachine {
    state: ViewState,
    open: bool,
    /// The current LimitReached came from an unconfirmed optimistic decrement.
    provisional_limit: bool,
}

impl Default for ViewMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewMachine {
    /// Starts closed in `Config`; the widget immediately routes to the
    /// initial panel.
    pub fn new() -> Self {
        Self {
            state: ViewState::Config,
            open: false,
            provisional_limit: false,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn focus_for(&self, state: ViewState) -> Option<FocusTarget> {
        if !self.open {
            return None;
        }
        Some(match state {
            ViewState::Config => FocusTarget::SleeperUsername,
            ViewState::Chatting => FocusTarget::ChatInput,
            ViewState::LimitReached => FocusTarget::WaitlistEmail,
        })
    }

    fn enter(&mut self, state: ViewState) -> ViewUpdate {
        self.state = state;
        ViewUpdate {
            state,
            focus: self.focus_for(state),
        }
    }

    /// Show the panel. The view state is unchanged.
    pub fn open(&mut self) -> ViewUpdate {
        self.open = true;
        ViewUpdate {
            state: self.state,
            focus: self.focus_for(self.state),
        }
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Returns `None` once the limit is reached; that state is terminal.
    pub fn open_config(&mut self) -> Option<ViewUpdate> {
        if self.state == ViewState::LimitReached {
            return None;
        }
        Some(self.enter(ViewState::Config))
    }

    /// Leave the config panel (submit, skip, or close). Routes to
    /// `LimitReached` when nothing is left to send.
    pub fn begin_chat(&mut self, remaining: u32) -> ViewUpdate {
        if self.state == ViewState::LimitReached {
            return ViewUpdate {
                state: self.state,
                focus: self.focus_for(self.state),
            };
        }
        if remaining == 0 {
            return self.limit_reached(false);
        }
        self.enter(ViewState::Chatting)
    }

    /// `provisional` marks a limit caused only by an optimistic decrement.
    /// A confirmed limit always clears the provisional flag.
    pub fn limit_reached(&mut self, provisional: bool) -> ViewUpdate {
        self.provisional_limit = if self.state == ViewState::LimitReached {
            self.provisional_limit && provisional
        } else {
            provisional
        };
        self.enter(ViewState::LimitReached)
    }

    /// Undo a provisional limit after the server (or a rollback) restored
    /// some quota. Confirmed limits stay terminal.
    pub fn revoke_provisional_limit(&mut self, remaining: u32) -> Option<ViewUpdate> {
        if self.state != ViewState::LimitReached || !self.provisional_limit || remaining == 0 {
            return None;
        }
        self.provisional_limit = false;
        Some(self.enter(ViewState::Chatting))
    }

    /// Confirm whatever limit is currently shown.
    pub fn confirm_limit(&mut self) {
        self.provisional_limit = false;
    }

    pub fn input_enabled(&self, gate: InputGate) -> bool {
        gate.requested
            && gate.api_configured
            && gate.remaining > 0
            && !gate.in_flight
            && self.open
            && self.state == ViewState::Chatting
    }
}
