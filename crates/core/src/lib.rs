//! neewer-hid-core: command encoding, HID framing, and transport negotiation.
//!
//! This crate provides the core logic for driving a Neewer PL81-Pro LED panel
//! through its Realtek USB HID bridge: building checksummed command frames,
//! wrapping them in candidate HID report framings, and trying each framing
//! against the device to find out which one it accepts.

pub mod checksum;
pub mod command;
pub mod config;
pub mod device;
pub mod diagnose;
pub mod error;
pub mod framing;
pub mod negotiate;
pub mod safety;
pub mod transport;

/// Realtek USB Vendor ID.
pub const REALTEK_VID: u16 = 0x0BDA;

/// Known product IDs behind the Realtek vendor ID.
pub mod pids {
    /// HID bridge inside the PL81-Pro panel.
    pub const PL81_PRO: u16 = 0x1100;
}
