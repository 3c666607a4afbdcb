use std::time::Duration;

use log::{debug, warn};
use rusb::{DeviceHandle, UsbContext};

use crate::error::{Error, Result};

/// The bootloader's interface; both endpoints are addressed against it.
const INTERFACE: u8 = 0;

/// Alternate setting selected when the interface is claimed.
const ALT_SETTING: u8 = 0;

/// Interrupt IN endpoint delivering response frames.
const RESPONSE_ENDPOINT: u8 = 0x81;

/// Host-to-device, class request, interface recipient.
const COMMAND_REQUEST_TYPE: u8 = 0x21;

/// HID SET_REPORT.
const COMMAND_REQUEST: u8 = 0x09;

/// The two transfers the protocol layer needs from a USB device.
///
/// Both return the number of bytes actually transferred; length checking is up to the caller.
pub trait Transport {
    /// Sends a serialized command frame as a control transfer.
    fn send_command(&mut self, frame: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Receives one response frame from the interrupt endpoint.
    fn receive_response(&mut self, frame: &mut [u8], timeout: Duration) -> rusb::Result<usize>;

    /// Called once the device has been told to reset and is about to vanish from the bus. No
    /// kernel driver must be reattached to it afterwards.
    fn forget_kernel_driver(&mut self) {}
}

/// The interface bookkeeping calls made on a device handle around a session.
pub(crate) trait InterfaceControl {
    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool>;
    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()>;
    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()>;
    fn release_interface(&mut self, iface: u8) -> rusb::Result<()>;
    fn set_alternate_setting(&mut self, iface: u8, setting: u8) -> rusb::Result<()>;
}

impl<T: UsbContext> InterfaceControl for DeviceHandle<T> {
    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool> {
        DeviceHandle::kernel_driver_active(self, iface)
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::detach_kernel_driver(self, iface)
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, iface)
    }

    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, iface)
    }

    fn release_interface(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, iface)
    }

    fn set_alternate_setting(&mut self, iface: u8, setting: u8) -> rusb::Result<()> {
        DeviceHandle::set_alternate_setting(self, iface, setting)
    }
}

/// Detaches a kernel driver if one is bound, claims the interface and selects its default
/// alternate setting. Returns whether a driver was detached, along with the non-fatal errors.
fn take_over<H: InterfaceControl>(handle: &mut H) -> Result<(bool, Vec<Error>)> {
    let mut warnings = Vec::new();

    // Platforms without kernel drivers report an error here, which means nothing to detach
    let detached = matches!(handle.kernel_driver_active(INTERFACE), Ok(true));
    if detached {
        debug!("Detaching kernel driver from interface {}", INTERFACE);
        handle
            .detach_kernel_driver(INTERFACE)
            .map_err(Error::DriverDetachFailed)?;
    }

    if let Err(error) = handle.claim_interface(INTERFACE) {
        let error = Error::InterfaceClaimFailed(error);
        warn!("{}", error);
        warnings.push(error);
    }

    if let Err(error) = handle.set_alternate_setting(INTERFACE, ALT_SETTING) {
        let error = Error::AltSettingFailed(error);
        warn!("{}", error);
        warnings.push(error);
    }

    Ok((detached, warnings))
}

/// Releases the interface and, if asked to, gives the kernel driver back the device.
fn give_back<H: InterfaceControl>(handle: &mut H, reattach: bool) {
    if let Err(error) = handle.release_interface(INTERFACE) {
        debug!("Releasing interface failed: {}", error);
    }

    if reattach {
        if let Err(error) = handle.attach_kernel_driver(INTERFACE) {
            warn!("Unable to reattach kernel driver: {}", error);
        }
    }
}

/// A claimed USB device speaking the bootloader protocol.
///
/// Dropping it releases the interface and gives a detached kernel driver back the device.
pub struct UsbTransport<T: UsbContext> {
    handle: DeviceHandle<T>,

    /// A kernel driver was detached on open and has to be reattached when done.
    reattach: bool,
}

impl<T: UsbContext> UsbTransport<T> {
    /// Takes over an opened device: detaches a kernel driver if one is bound, claims the interface
    /// and selects its default alternate setting.
    ///
    /// Failing to claim the interface or to set the alternate setting is not fatal. These errors
    /// are returned alongside the transport.
    pub fn claim(mut handle: DeviceHandle<T>) -> Result<(Self, Vec<Error>)> {
        let (reattach, warnings) = take_over(&mut handle)?;
        Ok((Self { handle, reattach }, warnings))
    }

    /// Whether a kernel driver will be reattached when the transport is dropped.
    pub fn reattaches_kernel_driver(&self) -> bool {
        self.reattach
    }
}

impl<T: UsbContext> Transport for UsbTransport<T> {
    fn send_command(&mut self, frame: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.write_control(
            COMMAND_REQUEST_TYPE,
            COMMAND_REQUEST,
            0,
            0,
            frame,
            timeout,
        )
    }

    fn receive_response(&mut self, frame: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.read_interrupt(RESPONSE_ENDPOINT, frame, timeout)
    }

    fn forget_kernel_driver(&mut self) {
        self.reattach = false;
    }
}

impl<T: UsbContext> Drop for UsbTransport<T> {
    fn drop(&mut self) {
        give_back(&mut self.handle, self.reattach);
        // The device handle closes itself, and the USB context goes with its last handle
    }
}
