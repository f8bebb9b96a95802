//! Outbound notification sink (spec §4.6): the dispatcher owns the real
//! transport-backed implementation; supervisors only need this trait to
//! publish without taking a dependency on the transport itself.

use async_trait::async_trait;
use fabric_protocol::Notification;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// `target` is the requester-id (or node-id for node-wide events like
    /// `NodeEnabled`/`NodeDisabled`) the notification is addressed to.
    async fn publish(&self, target: &str, notification: Notification);
}

/// Drops everything; useful for hosted-service-only tests where no
/// requester is listening.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn publish(&self, _target: &str, _notification: Notification) {}
}

/// Adapts any `Transport` into a `NotificationSink`, so the application
/// supervisor can publish without depending on the transport trait
/// directly (spec §4.6's dispatcher owns the transport; the supervisor
/// only owns the narrower publish-only view).
pub struct TransportSink<T> {
    transport: std::sync::Arc<T>,
}

impl<T> TransportSink<T> {
    pub fn new(transport: std::sync::Arc<T>) -> Self {
        TransportSink { transport }
    }
}

#[async_trait]
impl<T: crate::transport::Transport> NotificationSink for TransportSink<T> {
    async fn publish(&self, target: &str, notification: Notification) {
        self.transport.notify(target, notification).await;
    }
}
