use async_trait::async_trait;
use tracing::info;

use vizgate_application::{GrantEvent, GrantEventSink};
use vizgate_core::AppResult;

/// Grant event sink that writes every registry change to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingGrantEventSink;

#[async_trait]
impl GrantEventSink for TracingGrantEventSink {
    async fn record(&self, event: GrantEvent) -> AppResult<()> {
        match &event {
            GrantEvent::Created(key) | GrantEvent::Deleted(key) => info!(
                target: "vizgate::grants",
                action = event.action(),
                permission = %key.permission(),
                view_menu = %key.view_menu(),
                "grant event"
            ),
            GrantEvent::Renamed { from, to } => info!(
                target: "vizgate::grants",
                action = event.action(),
                permission = %to.permission(),
                from = %from.view_menu(),
                to = %to.view_menu(),
                "grant event"
            ),
            GrantEvent::Merged { removed, kept } => info!(
                target: "vizgate::grants",
                action = event.action(),
                permission = %kept.permission(),
                removed = %removed.view_menu(),
                kept = %kept.view_menu(),
                "grant event"
            ),
        }

        Ok(())
    }
}
