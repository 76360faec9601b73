use super::history::Role;
use super::quota::QuotaDisplay;
use super::transcript::{BubbleContent, BubbleId};
use super::view::{FocusTarget, ViewState};

/// Everything a rendering adapter needs to mirror the widget.
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetEvent {
    PanelOpened,
    PanelClosed,
    ViewChanged(ViewState),
    QuotaChanged(QuotaDisplay),
    ChatInputChanged {
        enabled: bool,
    },
    FocusMoved(FocusTarget),
    MessageAdded {
        id: BubbleId,
        role: Role,
        content: BubbleContent,
    },
    /// Rotating status phrase for a waiting bubble.
    WaitingStatus {
        id: BubbleId,
        status: &'static str,
    },
    MessageUpdated {
        id: BubbleId,
        text: String,
    },
    MessageRemoved {
        id: BubbleId,
    },
    ScrolledToBottom,
    /// No usable API endpoint. Stays visible; chat never enables.
    ApiErrorShown,
    WaitlistJoined {
        email: String,
    },
}

/// Rendering adapter. Called synchronously from widget operations (and from
/// the waiting-indicator task), so implementations must not call back into
/// the widget.
pub trait WidgetObserver: Send + Sync {
    fn on_event(&self, event: &WidgetEvent);
}

/// Observer that drops every event, for headless use.
pub struct NullObserver;

impl WidgetObserver for NullObserver {
    fn on_event(&self, _event: &WidgetEvent) {}
}
