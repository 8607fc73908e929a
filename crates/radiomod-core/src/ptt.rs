//! Push-to-talk keying
//!
//! The transmitter key line is driven through a Linux input event device
//! (typically the GPIO key on a C-Media USB audio dongle). The seam is a
//! trait so the pipeline and tests can run without hardware.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Linux input event type for key events
const EV_KEY: u16 = 0x01;
/// Linux input event type for synchronization events
const EV_SYN: u16 = 0x00;
/// Synchronization code terminating an event report
const SYN_REPORT: u16 = 0x00;

/// Default PTT event device (C-Media Electronics Inc. USB Audio Device)
pub const DEFAULT_EVENT_DEVICE: &str =
    "/dev/input/by-id/usb-C-Media_Electronics_Inc._USB_Audio_Device-event-if03";

/// Default Linux event code for PTT (KEY_RADIO)
pub const DEFAULT_KEY_CODE: u16 = 385;

/// Boolean transmitter key line
pub trait PttSwitch: Send {
    /// Assert (`true`) or deassert (`false`) the key line
    fn set(&mut self, keyed: bool) -> io::Result<()>;
}

/// PTT keyed through a Linux input event device node
pub struct EventDevicePtt {
    device: File,
    key_code: u16,
}

impl EventDevicePtt {
    /// Open the event device node for writing
    pub fn open<P: AsRef<Path>>(path: P, key_code: u16) -> io::Result<Self> {
        let device = OpenOptions::new().write(true).open(path.as_ref())?;
        tracing::debug!(
            device = %path.as_ref().display(),
            key_code,
            "opened PTT event device"
        );
        Ok(Self { device, key_code })
    }

    /// Serialize one `struct input_event` (64-bit layout, zeroed timestamp;
    /// the kernel fills it in on injection)
    fn encode_event(event_type: u16, code: u16, value: i32) -> [u8; 24] {
        let mut buf = [0u8; 24];
        buf[16..18].copy_from_slice(&event_type.to_le_bytes());
        buf[18..20].copy_from_slice(&code.to_le_bytes());
        buf[20..24].copy_from_slice(&value.to_le_bytes());
        buf
    }
}

impl PttSwitch for EventDevicePtt {
    fn set(&mut self, keyed: bool) -> io::Result<()> {
        let value = i32::from(keyed);
        self.device
            .write_all(&Self::encode_event(EV_KEY, self.key_code, value))?;
        self.device
            .write_all(&Self::encode_event(EV_SYN, SYN_REPORT, 0))?;
        self.device.flush()?;
        tracing::info!(keyed, "PTT");
        Ok(())
    }
}

/// No-op key line for tests and keyless setups
#[derive(Debug, Default)]
pub struct NullPtt {
    keyed: bool,
}

impl NullPtt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current key state
    pub fn is_keyed(&self) -> bool {
        self.keyed
    }
}

impl PttSwitch for NullPtt {
    fn set(&mut self, keyed: bool) -> io::Result<()> {
        self.keyed = keyed;
        tracing::debug!(keyed, "PTT (null)");
        Ok(())
    }
}
