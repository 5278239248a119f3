//! Transport over the system BLE stack, via btleplug.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{GattTransport, NotificationSink};
use crate::types::{
    AdElement, AddressType, Characteristic, Device, Notification, Props, Service,
    AD_TYPE_COMPLETE_LOCAL_NAME,
};

/// btleplug-backed [`GattTransport`].
///
/// Holds at most one open link. Notifications are pumped off the peripheral's
/// stream by a background task and pushed into the sink handed over at
/// construction.
pub struct BtleTransport {
    adapter: Adapter,
    sink: NotificationSink,
    /// address -> peripheral, refreshed by every scan.
    discovered: Mutex<HashMap<String, Peripheral>>,
    link: Mutex<Option<Link>>,
}

struct Link {
    peripheral: Peripheral,
    /// Synthetic handle -> stack characteristic, valid for this link only.
    by_handle: HashMap<u16, btleplug::api::Characteristic>,
    forwarder: JoinHandle<()>,
}

impl BtleTransport {
    /// Open the Bluetooth adapter at `index` (0 is the first system adapter).
    pub async fn new(index: usize, sink: NotificationSink) -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(transport_err)?;
        let adapters = manager.adapters().await.map_err(transport_err)?;
        let count = adapters.len();
        let adapter = adapters.into_iter().nth(index).ok_or_else(|| {
            TransportError::new(format!(
                "no Bluetooth adapter at index {index} ({count} available)"
            ))
        })?;
        Ok(Self {
            adapter,
            sink,
            discovered: Mutex::new(HashMap::new()),
            link: Mutex::new(None),
        })
    }
}

#[async_trait]
impl GattTransport for BtleTransport {
    async fn scan(&self, duration: Duration) -> Result<Vec<Device>, TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(transport_err)?;
        tokio::time::sleep(duration).await;

        let peripherals = match self.adapter.peripherals().await {
            Ok(peripherals) => peripherals,
            Err(err) => {
                let _ = self.adapter.stop_scan().await;
                return Err(transport_err(err));
            }
        };
        self.adapter.stop_scan().await.map_err(transport_err)?;

        // Build into locals and swap in only once the whole snapshot is
        // good: a failed scan must leave the previous scan's connect
        // targets intact.
        let mut devices = Vec::new();
        let mut snapshot = HashMap::new();
        for peripheral in peripherals {
            let Some(props) = peripheral.properties().await.map_err(transport_err)? else {
                continue;
            };
            let address = peripheral.address().to_string();
            devices.push(Device {
                address: address.clone(),
                address_type: address_type(&props),
                advertisement: advertisement_elements(&props),
                rssi: props.rssi,
            });
            snapshot.insert(address, peripheral);
        }
        *self.discovered.lock().await = snapshot;
        Ok(devices)
    }

    async fn connect(&self, device: &Device) -> Result<Vec<Service>, TransportError> {
        // The session never connects twice, but this type is public API:
        // tear down any link a direct caller left open. Must happen before
        // the new connect; disconnecting the old peripheral afterwards
        // would drop the fresh link when it is the same device.
        if let Some(old) = self.link.lock().await.take() {
            old.forwarder.abort();
            let _ = old.peripheral.disconnect().await;
        }

        let peripheral = self
            .discovered
            .lock()
            .await
            .get(&device.address)
            .cloned()
            .ok_or_else(|| {
                TransportError::new(format!("device {} not in the last scan", device.address))
            })?;

        peripheral.connect().await.map_err(transport_err)?;
        if let Err(err) = peripheral.discover_services().await {
            let _ = peripheral.disconnect().await;
            return Err(transport_err(err));
        }

        // btleplug does not expose ATT handles; assign ascending handles in
        // discovery order and keep the mapping for this link's lifetime.
        let mut services = Vec::new();
        let mut by_handle = HashMap::new();
        let mut by_uuid = HashMap::new();
        let mut next_handle: u16 = 1;
        for svc in peripheral.services() {
            let mut characteristics = Vec::new();
            for ch in &svc.characteristics {
                let handle = next_handle;
                next_handle += 1;
                characteristics.push(Characteristic {
                    handle,
                    uuid: ch.uuid,
                    properties: props_from(ch.properties),
                });
                by_handle.insert(handle, ch.clone());
                by_uuid.entry(ch.uuid).or_insert(handle);

                if ch
                    .properties
                    .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
                {
                    if let Err(err) = peripheral.subscribe(ch).await {
                        warn!("could not subscribe to {}: {err}", ch.uuid);
                    }
                }
            }
            services.push(Service {
                uuid: svc.uuid,
                characteristics,
            });
        }

        let mut stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(err) => {
                let _ = peripheral.disconnect().await;
                return Err(transport_err(err));
            }
        };

        let sink = self.sink.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Some(&handle) = by_uuid.get(&event.uuid) else {
                    debug!("notification from unmapped characteristic {}", event.uuid);
                    continue;
                };
                if sink
                    .send(Notification {
                        handle,
                        value: event.value,
                    })
                    .is_err()
                {
                    break;
                }
            }
            debug!("notification forwarder stopped");
        });

        *self.link.lock().await = Some(Link {
            peripheral,
            by_handle,
            forwarder,
        });
        Ok(services)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(link) = self.link.lock().await.take() else {
            return Ok(());
        };
        link.forwarder.abort();
        link.peripheral.disconnect().await.map_err(transport_err)
    }

    async fn read(&self, handle: u16) -> Result<Vec<u8>, TransportError> {
        let guard = self.link.lock().await;
        let link = guard
            .as_ref()
            .ok_or_else(|| TransportError::new("not connected"))?;
        let ch = link
            .by_handle
            .get(&handle)
            .ok_or_else(|| TransportError::new(format!("handle {handle} is not mapped")))?;
        link.peripheral.read(ch).await.map_err(transport_err)
    }

    async fn write(&self, handle: u16, payload: &[u8]) -> Result<(), TransportError> {
        let guard = self.link.lock().await;
        let link = guard
            .as_ref()
            .ok_or_else(|| TransportError::new("not connected"))?;
        let ch = link
            .by_handle
            .get(&handle)
            .ok_or_else(|| TransportError::new(format!("handle {handle} is not mapped")))?;

        // Peripherals that only take unacknowledged writes reject the
        // acknowledged kind, so follow the advertised bit.
        let write_type = if ch.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        link.peripheral
            .write(ch, payload, write_type)
            .await
            .map_err(transport_err)
    }
}

fn transport_err(err: btleplug::Error) -> TransportError {
    TransportError::new(err.to_string())
}

fn address_type(props: &PeripheralProperties) -> AddressType {
    match props.address_type {
        Some(btleplug::api::AddressType::Random) => AddressType::Random,
        _ => AddressType::Public,
    }
}

fn props_from(flags: CharPropFlags) -> Props {
    let mut props = Props::default();
    if flags.contains(CharPropFlags::READ) {
        props = props | Props::READ;
    }
    if flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        props = props | Props::WRITE_WITHOUT_RESPONSE;
    }
    if flags.contains(CharPropFlags::WRITE) {
        props = props | Props::WRITE;
    }
    if flags.contains(CharPropFlags::NOTIFY) {
        props = props | Props::NOTIFY;
    }
    if flags.contains(CharPropFlags::INDICATE) {
        props = props | Props::INDICATE;
    }
    props
}

/// Rebuild AD-style elements from what the platform stack parsed out of the
/// advertisement.
fn advertisement_elements(props: &PeripheralProperties) -> Vec<AdElement> {
    let mut elements = Vec::new();
    if let Some(name) = &props.local_name {
        elements.push(AdElement {
            type_code: AD_TYPE_COMPLETE_LOCAL_NAME,
            description: "Complete Local Name".into(),
            value: name.clone(),
        });
    }
    if let Some(tx_power) = props.tx_power_level {
        elements.push(AdElement {
            type_code: 0x0a,
            description: "Tx Power".into(),
            value: tx_power.to_string(),
        });
    }
    if !props.services.is_empty() {
        elements.push(AdElement {
            type_code: 0x07,
            description: "Complete List of Service UUIDs".into(),
            value: props
                .services
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        });
    }
    for (uuid, data) in &props.service_data {
        elements.push(AdElement {
            type_code: 0x16,
            description: "Service Data".into(),
            value: format!("{uuid}: {}", hex(data)),
        });
    }
    for (company, data) in &props.manufacturer_data {
        elements.push(AdElement {
            type_code: 0xff,
            description: "Manufacturer Data".into(),
            value: format!("{company:04x}: {}", hex(data)),
        });
    }
    elements
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_prop_flags_map_to_props() {
        let flags = CharPropFlags::READ | CharPropFlags::NOTIFY;
        let props = props_from(flags);
        assert!(props.contains(Props::READ));
        assert!(props.contains(Props::NOTIFY));
        assert!(!props.contains(Props::WRITE));
    }

    #[test]
    fn advertisement_elements_carry_the_local_name() {
        let props = PeripheralProperties {
            local_name: Some("riot-shell".into()),
            ..Default::default()
        };
        let elements = advertisement_elements(&props);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].type_code, AD_TYPE_COMPLETE_LOCAL_NAME);
        assert_eq!(elements[0].value, "riot-shell");
    }
}
