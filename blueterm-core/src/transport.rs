//! The capability seam between the session and the BLE stack.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{Device, Notification, Service};

/// Sink for unsolicited notification events.
///
/// Registered at transport construction. The transport feeds it from its own
/// delivery context, so the receiving side must never reach back into live
/// session state; it only gets the raw `(handle, payload)` event. Sends with
/// no live receiver are dropped.
pub type NotificationSink = tokio::sync::mpsc::UnboundedSender<Notification>;

/// What the session requires from a BLE stack.
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Scan for advertisements for `duration`, blocking the caller.
    ///
    /// The returned list may contain repeated addresses; the session
    /// deduplicates within the scan. All-or-nothing: a failed scan must not
    /// disturb the previous scan's connect targets, so devices the session
    /// kept from an older scan stay connectable.
    async fn scan(&self, duration: Duration) -> Result<Vec<Device>, TransportError>;

    /// Connect to `device` and run full service discovery.
    ///
    /// Implementations tear the link down before returning an error, so no
    /// half-open connection is ever observable.
    async fn connect(&self, device: &Device) -> Result<Vec<Service>, TransportError>;

    /// Close the connection if one is open. Idempotent.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Read the characteristic registered at `handle`.
    async fn read(&self, handle: u16) -> Result<Vec<u8>, TransportError>;

    /// Write `payload` to the characteristic registered at `handle`.
    ///
    /// Not gated on the WRITE property; the peripheral's rejection, if any,
    /// surfaces as the error.
    async fn write(&self, handle: u16, payload: &[u8]) -> Result<(), TransportError>;
}
