use std::fmt;
use std::result::Result as StdResult;

use thiserror::Error;

/// Errors which can occur during session setup and communication with the bootloader.
#[derive(Debug, Error)]
pub enum Error {
    /// No USB device with the requested vendor and product id is attached.
    #[error("Device not found")]
    DeviceNotFound,

    /// A kernel driver owned the interface and could not be detached from it.
    #[error("Error detaching kernel driver: {0}")]
    DriverDetachFailed(#[source] rusb::Error),

    /// The control interface could not be claimed. Reported as a warning on open.
    #[error("Cannot claim device: {0}")]
    InterfaceClaimFailed(#[source] rusb::Error),

    /// The default alternate setting could not be selected. Reported as a warning on open.
    #[error("Unable to set alternate interface setting: {0}")]
    AltSettingFailed(#[source] rusb::Error),

    /// The transfer did not complete within the timeout.
    #[error("Communication timeout")]
    Timeout,

    /// The device stalled the transfer. It is probably not an OLS bootloader.
    #[error("Transfer rejected by the device (not an OLS bootloader?)")]
    PipeError,

    /// The device disappeared from the bus.
    #[error("Device disconnected")]
    DeviceGone,

    /// Fewer bytes than a full frame were transferred.
    #[error("Transferred too little ({actual} of {expected} bytes)")]
    ShortTransfer { expected: usize, actual: usize },

    /// Any other error reported by the USB stack.
    #[error("USB error: {0}")]
    OtherTransportError(#[source] rusb::Error),

    /// The response answered a different command than the one just sent.
    #[error("Echo id mismatch (sent {sent}, received {received}). Bootloader error")]
    EchoMismatch { sent: u8, received: u8 },

    /// A chunk of a read, write or erase failed. The whole operation was aborted.
    #[error("Error {operation} memory at 0x{address:04x}")]
    OperationFailed {
        operation: OperationKind,
        address: u16,
        #[source]
        source: Box<Error>,
    },

    /// The request cannot be expressed in the protocol (bad length, address or layout).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Flash contents read back differ from the expected data.
    #[error("Verification failed at 0x{address:04x} (expected 0x{expected:02x}, found 0x{found:02x})")]
    VerificationFailed { address: u16, expected: u8, found: u8 },
}

impl Error {
    /// Returns the underlying failure, looking through `OperationFailed` wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::OperationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn during(self, operation: OperationKind, address: u16) -> Self {
        Error::OperationFailed {
            operation,
            address,
            source: Box::new(self),
        }
    }
}

impl From<rusb::Error> for Error {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => Error::Timeout,
            rusb::Error::Pipe => Error::PipeError,
            rusb::Error::NoDevice => Error::DeviceGone,
            other => Error::OtherTransportError(other),
        }
    }
}

/// The multi-exchange operation an `OperationFailed` error was raised from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OperationKind {
    Read,
    Write,
    Erase,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Read => "reading",
            OperationKind::Write => "writing",
            OperationKind::Erase => "erasing",
        })
    }
}

/// Shorthand for a Result with the crate's own Error type.
pub type Result<T> = StdResult<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_errors_are_classified() {
        assert!(matches!(Error::from(rusb::Error::Timeout), Error::Timeout));
        assert!(matches!(Error::from(rusb::Error::Pipe), Error::PipeError));
        assert!(matches!(Error::from(rusb::Error::NoDevice), Error::DeviceGone));
        assert!(matches!(
            Error::from(rusb::Error::Io),
            Error::OtherTransportError(rusb::Error::Io)
        ));
    }

    #[test]
    fn root_cause_unwraps_nested_operations() {
        let error = Error::Timeout
            .during(OperationKind::Read, 0x0010)
            .during(OperationKind::Write, 0x0800);
        assert!(matches!(error.root_cause(), Error::Timeout));
        assert_eq!(error.to_string(), "Error writing memory at 0x0800");
    }

    #[test]
    fn root_cause_of_plain_error_is_itself() {
        let error = Error::EchoMismatch {
            sent: 3,
            received: 4,
        };
        assert!(matches!(
            error.root_cause(),
            Error::EchoMismatch {
                sent: 3,
                received: 4
            }
        ));
    }
}
