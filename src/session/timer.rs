use std::pin::Pin;
use std::time::Duration;
use tokio::time::Sleep;

/// One-shot timer owned by the session loop
///
/// Cancelling drops the pending sleep, so a cancelled timer can never fire.
#[derive(Default)]
pub struct SessionTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer
    pub fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep(after)));
    }

    /// Returns true if a pending timer was cancelled
    pub fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolve when the armed timer fires; pending forever when disarmed
    ///
    /// Cancel safe. The timer disarms itself after firing.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => std::future::pending().await,
        }
    }
}
