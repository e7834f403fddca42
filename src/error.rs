use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Errors raised while configuring the module. These are fatal to
/// initialization and never occur on the run-time paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("Receive buffer index ({0:?}) is out of range (size {1:?})")]
    RxIndexOutOfRange(usize, usize),
    #[error("Transmit buffer index ({0:?}) is out of range (size {1:?})")]
    TxIndexOutOfRange(usize, usize),
    #[error("Transmit buffer data length ({0:?}) is out of the valid range (0..=8)")]
    InvalidDataLength(u8),
}

/// Error conditions reported to the protocol stack. The values are the
/// CANopen error status bit numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCondition {
    /// Either error counter reached the warning limit (96)
    BusWarning = 0x01,
    /// Receive error counter reached the passive limit (128)
    RxBusPassive = 0x06,
    /// Transmit error counter reached the passive limit (128)
    TxBusPassive = 0x07,
    /// Transmit error counter reached the bus-off limit (256)
    TxBusOff = 0x12,
    /// The peripheral's receive FIFO overran
    RxOverflow = 0x13,
    /// A transmit slot was submitted while still queued
    TxOverflow = 0x14,
    /// Synchronous frames were discarded at a sync boundary
    TpdoOutsideWindow = 0x15,
}

/// CANopen emergency error codes attached to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum EmergencyCode {
    NoError = 0x0000,
    Communication = 0x8100,
    CanOverrun = 0x8110,
    CanPassive = 0x8120,
    BusOffRecovered = 0x8140,
}

/// What got discarded by a sync-window cleanup. Sent as the report's
/// auxiliary information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SyncAbort {
    /// A synchronous frame was aborted in a hardware mailbox
    Mailboxes = 1,
    /// Queued synchronous frames were dropped from the transmit slots
    Queued = 2,
}

/// Error reporting collaborator, usually the protocol stack's emergency
/// producer.
///
/// Reports are level triggered: `report` when a condition is entered,
/// `reset` when it is left. `info` is auxiliary data, e.g. the packed error
/// counter snapshot.
pub trait ErrorReporter {
    fn report(&self, condition: ErrorCondition, code: EmergencyCode, info: u32);

    fn reset(&self, condition: ErrorCondition, info: u32);

    /// Whether `condition` is currently reported as active
    fn is_error(&self, condition: ErrorCondition) -> bool;
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for &T {
    fn report(&self, condition: ErrorCondition, code: EmergencyCode, info: u32) {
        (**self).report(condition, code, info)
    }

    fn reset(&self, condition: ErrorCondition, info: u32) {
        (**self).reset(condition, info)
    }

    fn is_error(&self, condition: ErrorCondition) -> bool {
        (**self).is_error(condition)
    }
}

/// Discards all reports
impl ErrorReporter for () {
    fn report(&self, _condition: ErrorCondition, _code: EmergencyCode, _info: u32) {}

    fn reset(&self, _condition: ErrorCondition, _info: u32) {}

    fn is_error(&self, _condition: ErrorCondition) -> bool {
        false
    }
}
