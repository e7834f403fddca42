//! CAN driver core for a CANopen stack.
//!
//! Bridges an interrupt-driven CAN peripheral ([`CanBus`]) to the protocol
//! stack:
//! * received frames are matched against a fixed table of registrations and
//!   handed to the first matching [`RxCallback`]
//! * frames to send go straight to a hardware mailbox, or wait in their
//!   transmit buffer until a transmit-complete interrupt drains them, lowest
//!   buffer index first
//! * error counter changes are turned into level-triggered reports for the
//!   stack's [`ErrorReporter`]
#![no_std]

// This mod MUST go first, so that the others see its macros.
mod fmt;

mod bus;
mod codec;
mod error;
mod frame;
mod indicator;
mod module;
mod monitor;
mod rx;
mod tx;

pub use bus::{CanBus, ErrorCounters};
pub use codec::{ID_MASK, REMOTE_FLAG, RX_RTR_BIT};
pub use error::*;
pub use frame::*;
pub use indicator::*;
pub use module::*;
pub use monitor::{
    diagnose, Diagnosis, ErrorAction, ErrorSnapshot, BUS_OFF_LIMIT, PASSIVE_LIMIT, WARNING_LIMIT,
};
pub use rx::{RxCallback, RxMsg};
pub use tx::{TxHandle, TxOutcome};

pub use embedded_can::{Id, StandardId};
