//! Session machinery for the blueterm BLE shell client.
//!
//! Scans for peripherals, connects to one at a time, builds a characteristic
//! registry from GATT discovery and exchanges data over read/write plus an
//! asynchronous notification channel.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use blueterm_core::{btle::BtleTransport, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let transport = BtleTransport::new(0, notify_tx).await?;
//!     let mut session = Session::new(Arc::new(transport));
//!
//!     session.scan(Duration::from_secs(3)).await?;
//!     let services = session.connect(0).await?;
//!     for service in &services {
//!         println!("{}", service.uuid);
//!     }
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod error;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{SessionError, TransportError};
pub use session::{Session, SessionState};
pub use transport::{GattTransport, NotificationSink};
pub use types::{AdElement, AddressType, Characteristic, Device, Notification, Props, Service};
