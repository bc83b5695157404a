use crate::backend::PageDriver;
use resilio_common::ElementHandle;
use resilio_common::config::schema::ResilienceConfig;
use std::time::Duration;
use tracing::debug;

/// What the caller intends to do with a probed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOp {
    /// Any attached element will do.
    Locate,
    /// The element must also be visible.
    Interact,
}

impl ProbeOp {
    pub fn accepts(&self, element: &ElementHandle) -> bool {
        match self {
            ProbeOp::Locate => true,
            ProbeOp::Interact => element.visible,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Hit(ElementHandle),
    /// Not found (or not usable) before the deadline.
    Timeout,
    /// The page itself failed.
    Error(String),
}

/// Tries one selector under a short, fixed deadline.
#[derive(Debug, Clone)]
pub struct Prober {
    deadline: Duration,
    poll_interval: Duration,
}

impl Default for Prober {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

impl Prober {
    pub fn new(deadline: Duration, poll_interval: Duration) -> Self {
        Self {
            deadline,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.fail_fast(), config.poll_interval())
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn probe<P: PageDriver + ?Sized>(
        &self,
        page: &mut P,
        selector: &str,
        op: ProbeOp,
    ) -> ProbeOutcome {
        let poll_interval = self.poll_interval;
        let attempt = async {
            loop {
                match page.query(selector).await {
                    Ok(Some(element)) if op.accepts(&element) => return Ok(element),
                    Ok(_) => {}
                    Err(e) if e.is_transient() => {
                        debug!(selector, error = %e, "transient probe error");
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(self.deadline, attempt).await {
            Ok(Ok(element)) => ProbeOutcome::Hit(element),
            Ok(Err(e)) => ProbeOutcome::Error(e.to_string()),
            Err(_) => ProbeOutcome::Timeout,
        }
    }
}
