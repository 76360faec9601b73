use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::observer::{WidgetEvent, WidgetObserver};
use super::transcript::BubbleId;

pub const WAIT_MESSAGES: [&str; 10] = [
    "Thinking",
    "Analyzing",
    "Processing",
    "Gathering info",
    "Working on it",
    "Looking into it",
    "Checking details",
    "Reviewing data",
    "Almost ready",
    "Finalizing",
];

pub const WAIT_MESSAGE_INTERVAL: Duration = Duration::from_millis(2500);

/// Rotating status text on a waiting bubble. The rotation runs as a tokio
/// task that stops when the indicator is stopped or dropped, whichever
/// comes first. No status is emitted once `stop` has returned.
pub struct WaitingIndicator {
    task: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
}

impl WaitingIndicator {
    /// Emits the first phrase immediately, then one per `interval`.
    pub fn start(bubble: BubbleId, observer: Arc<dyn WidgetObserver>, interval: Duration) -> Self {
        observer.on_event(&WidgetEvent::WaitingStatus {
            id: bubble,
            status: WAIT_MESSAGES[0],
        });
        let stopped = Arc::new(AtomicBool::new(false));
        let stop_flag = stopped.clone();
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            let mut index = 0usize;
            loop {
                ticker.tick().await;
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                index = (index + 1) % WAIT_MESSAGES.len();
                observer.on_event(&WidgetEvent::WaitingStatus {
                    id: bubble,
                    status: WAIT_MESSAGES[index],
                });
                observer.on_event(&WidgetEvent::ScrolledToBottom);
            }
        });
        Self {
            task: Some(task),
            stopped,
        }
    }

    /// Cancel the rotation and wait for the task to finish, so a tick that
    /// is already running cannot land after the bubble is settled.
    pub async fn stop(mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    fn cancel(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WaitingIndicator {
    fn drop(&mut self) {
        self.cancel();
    }
}
