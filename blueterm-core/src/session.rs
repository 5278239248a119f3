//! Connection state machine and characteristic registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SessionError;
use crate::transport::GattTransport;
use crate::types::{Characteristic, Device, Props, Service};

/// Connection state. The registry is non-empty only while `Connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected { address: String },
}

/// The single active BLE session.
///
/// Owns the last scan's device list and the characteristic registry, and is
/// the sole mutator of both. Notifications never pass through here; they
/// flow from the transport straight into the sink registered at transport
/// construction, so a notification in flight can never race a registry
/// clear.
pub struct Session {
    transport: Arc<dyn GattTransport>,
    devices: Vec<Device>,
    registry: HashMap<u16, Characteristic>,
    state: SessionState,
}

impl Session {
    pub fn new(transport: Arc<dyn GattTransport>) -> Self {
        Self {
            transport,
            devices: Vec::new(),
            registry: HashMap::new(),
            state: SessionState::Idle,
        }
    }

    /// Devices returned by the most recent successful scan.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Scan for `duration` and replace the cached device list.
    ///
    /// Duplicate advertisements from one address update that device's entry
    /// in place, keeping its position. A failed scan keeps the previous
    /// list untouched.
    pub async fn scan(&mut self, duration: Duration) -> Result<&[Device], SessionError> {
        let found = self
            .transport
            .scan(duration)
            .await
            .map_err(SessionError::Scan)?;

        let mut devices: Vec<Device> = Vec::with_capacity(found.len());
        let mut by_address: HashMap<String, usize> = HashMap::new();
        for dev in found {
            match by_address.get(&dev.address) {
                Some(&i) => devices[i] = dev,
                None => {
                    by_address.insert(dev.address.clone(), devices.len());
                    devices.push(dev);
                }
            }
        }
        self.devices = devices;
        Ok(&self.devices)
    }

    /// Connect to the device at `index` in the last scan and discover its
    /// services.
    ///
    /// Valid only while idle. Atomic: any failure leaves the session idle
    /// with an empty registry. Returns the discovered services, in device
    /// order, for display.
    pub async fn connect(&mut self, index: usize) -> Result<Vec<Service>, SessionError> {
        if let SessionState::Connected { address } = &self.state {
            return Err(SessionError::AlreadyConnected(address.clone()));
        }
        let device = self
            .devices
            .get(index)
            .ok_or(SessionError::DeviceIndex {
                index,
                count: self.devices.len(),
            })?
            .clone();

        let services = self
            .transport
            .connect(&device)
            .await
            .map_err(SessionError::Connect)?;

        self.registry = services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .map(|ch| (ch.handle, ch.clone()))
            .collect();
        self.state = SessionState::Connected {
            address: device.address,
        };
        Ok(services)
    }

    /// Drop the connection if one is open and clear the registry.
    ///
    /// Idempotent. Returns the previous peer address, empty when there was
    /// none. State and registry are reset before the transport is told, so
    /// the idle invariant holds even if the stack reports an error.
    pub async fn disconnect(&mut self) -> String {
        let address = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Connected { address } => address,
            SessionState::Idle => String::new(),
        };
        self.registry.clear();
        if let Err(err) = self.transport.disconnect().await {
            tracing::debug!("disconnect: transport reported: {err}");
        }
        address
    }

    /// Read the characteristic at `handle`. Gated on registry membership and
    /// the READ property; while idle the registry is empty, so no transport
    /// call is ever attempted.
    pub async fn read(&self, handle: u16) -> Result<Vec<u8>, SessionError> {
        let ch = self
            .registry
            .get(&handle)
            .ok_or(SessionError::UnknownHandle(handle))?;
        if !ch.properties.contains(Props::READ) {
            return Err(SessionError::NotReadable(handle));
        }
        self.transport.read(handle).await.map_err(SessionError::Read)
    }

    /// [`read`](Self::read) plus UTF-8 decoding.
    ///
    /// A non-UTF-8 payload fails with [`SessionError::Decode`], which still
    /// carries the raw bytes, and is distinct from a transport read failure.
    pub async fn read_text(&self, handle: u16) -> Result<String, SessionError> {
        let raw = self.read(handle).await?;
        Ok(String::from_utf8(raw)?)
    }

    /// Write `payload` to the characteristic at `handle`.
    ///
    /// Gated on registry membership only, never on the WRITE property: some
    /// peripherals accept writes without advertising the bit, so the
    /// attempt goes to the transport and any rejection comes back as
    /// [`SessionError::Write`].
    pub async fn write(&self, handle: u16, payload: &[u8]) -> Result<(), SessionError> {
        if !self.registry.contains_key(&handle) {
            return Err(SessionError::UnknownHandle(handle));
        }
        self.transport
            .write(handle, payload)
            .await
            .map_err(SessionError::Write)
    }
}
