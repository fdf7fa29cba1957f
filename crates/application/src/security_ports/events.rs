use async_trait::async_trait;

use vizgate_core::AppResult;
use vizgate_domain::GrantKey;

/// Registry mutation published by the permission synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantEvent {
    /// A grant was inserted.
    Created(GrantKey),
    /// A grant was removed.
    Deleted(GrantKey),
    /// A grant moved to a new view-menu name.
    Renamed {
        /// Previous key.
        from: GrantKey,
        /// New key.
        to: GrantKey,
    },
    /// A rename found its target already present and dropped the source.
    Merged {
        /// Removed source key.
        removed: GrantKey,
        /// Surviving target key.
        kept: GrantKey,
    },
}

impl GrantEvent {
    /// Returns a stable action name for audit sinks.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created(_) => "grant.created",
            Self::Deleted(_) => "grant.deleted",
            Self::Renamed { .. } => "grant.renamed",
            Self::Merged { .. } => "grant.merged",
        }
    }
}

/// Port receiving registry mutation events.
#[async_trait]
pub trait GrantEventSink: Send + Sync {
    /// Records one event.
    async fn record(&self, event: GrantEvent) -> AppResult<()>;
}
