//! Data model shared between the session and the transport layer.

use uuid::Uuid;

/// AD type 0x09: Complete Local Name.
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// Address type carried in a device's advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

impl std::fmt::Display for AddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressType::Public => write!(f, "public"),
            AddressType::Random => write!(f, "random"),
        }
    }
}

/// One advertising-data element: type code, human-readable description, value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdElement {
    pub type_code: u8,
    pub description: String,
    pub value: String,
}

/// A peripheral discovered during a scan.
///
/// Produced fresh on every scan; the previous scan's collection is discarded
/// wholesale, never merged.
#[derive(Debug, Clone)]
pub struct Device {
    pub address: String,
    pub address_type: AddressType,
    pub advertisement: Vec<AdElement>,
    pub rssi: Option<i16>,
}

impl Device {
    /// Advertised name (AD type 0x09), if the device broadcasts one.
    pub fn name(&self) -> Option<&str> {
        self.advertisement
            .iter()
            .find(|ad| ad.type_code == AD_TYPE_COMPLETE_LOCAL_NAME)
            .map(|ad| ad.value.as_str())
    }
}

/// Characteristic property bits, in GATT declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Props(pub u8);

impl Props {
    pub const READ: Props = Props(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Props = Props(0x04);
    pub const WRITE: Props = Props(0x08);
    pub const NOTIFY: Props = Props(0x10);
    pub const INDICATE: Props = Props(0x20);

    pub fn contains(self, other: Props) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Props {
    type Output = Props;

    fn bitor(self, rhs: Props) -> Props {
        Props(self.0 | rhs.0)
    }
}

impl std::fmt::Display for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut flags = Vec::new();
        if self.contains(Props::READ) {
            flags.push("R");
        }
        if self.contains(Props::WRITE) {
            flags.push("W");
        }
        if self.contains(Props::WRITE_WITHOUT_RESPONSE) {
            flags.push("Wn");
        }
        if self.contains(Props::NOTIFY) {
            flags.push("N");
        }
        if self.contains(Props::INDICATE) {
            flags.push("I");
        }
        write!(f, "{}", flags.join(","))
    }
}

/// A characteristic as registered during discovery.
///
/// The handle is valid only for the connection that discovered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub handle: u16,
    pub uuid: Uuid,
    pub properties: Props,
}

/// A GATT service and its characteristics, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

/// An unsolicited value push from the connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub handle: u16,
    pub value: Vec<u8>,
}
