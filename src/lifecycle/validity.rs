use chrono::{DateTime, Duration, Utc};

/// Renew once the current certificate expires within this many hours.
pub const DEFAULT_RENEWAL_WINDOW_HOURS: i64 = 72;

/// Where a stored certificate stands at the start of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateState {
    /// No usable record: nothing stored, or stored for other hostnames.
    Absent,
    Valid,
    /// Inside the renewal window, or already expired.
    ExpiringSoon,
    ForceRenew,
}

impl CertificateState {
    pub fn needs_issue(self) -> bool {
        matches!(self, CertificateState::Absent)
    }

    pub fn needs_renewal(self) -> bool {
        matches!(
            self,
            CertificateState::ExpiringSoon | CertificateState::ForceRenew
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    window: Duration,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_RENEWAL_WINDOW_HOURS))
    }
}

impl RenewalPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Renew iff forced or `not_after - now` is strictly below the window.
    pub fn assess(&self, not_after: DateTime<Utc>, now: DateTime<Utc>, force: bool) -> CertificateState {
        if force {
            CertificateState::ForceRenew
        } else if not_after - now < self.window {
            CertificateState::ExpiringSoon
        } else {
            CertificateState::Valid
        }
    }
}
