//! Isochronous transfer plumbing over Linux usbdevfs.

mod pool;
mod urb;

pub use pool::{SlotBuffer, TransferPool, TransferSlot};
pub use urb::{IsoEndpoint, IsoPacketDesc, IsoUrb, UsbdevfsEndpoint};
