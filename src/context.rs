use log::info;
pub use rusb::UsbContext;

use crate::error::{Error, Result};
use crate::flash::FlashLayout;
use crate::session::Session;
use crate::transport::UsbTransport;

/// USB vendor id of the OLS bootloader.
pub const OLS_VID: u16 = 0x04d8;

/// USB product id of the OLS bootloader.
pub const OLS_PID: u16 = 0xfc90;

/// A freshly opened session together with the non-fatal problems met while setting it up.
pub struct Opened<T: UsbContext> {
    pub session: Session<UsbTransport<T>>,

    /// `InterfaceClaimFailed` or `AltSettingFailed` errors, already logged.
    pub warnings: Vec<Error>,
}

/// Entry point for finding and opening bootloader devices.
pub struct Context {
    pub usb_context: rusb::Context,
}

impl Context {
    pub fn new() -> Result<Self> {
        let usb_context = rusb::Context::new()?;
        Ok(Context { usb_context })
    }

    /// Opens the device with the given ids, using the default flash layout.
    pub fn open(&self, vendor_id: u16, product_id: u16) -> Result<Opened<rusb::Context>> {
        self.open_with_layout(vendor_id, product_id, FlashLayout::default())
    }

    /// Opens the device with the given ids and flash geometry.
    pub fn open_with_layout(
        &self,
        vendor_id: u16,
        product_id: u16,
        layout: FlashLayout,
    ) -> Result<Opened<rusb::Context>> {
        layout.validate()?;

        let handle = self
            .usb_context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or(Error::DeviceNotFound)?;
        let (transport, warnings) = UsbTransport::claim(handle)?;
        info!(
            "Opened bootloader {:04x}:{:04x}{}",
            vendor_id,
            product_id,
            if transport.reattaches_kernel_driver() {
                " (kernel driver detached)"
            } else {
                ""
            }
        );

        Ok(Opened {
            session: Session::new(transport, layout)?,
            warnings,
        })
    }
}
