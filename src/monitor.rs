use heapless::Vec;

use crate::{EmergencyCode, ErrorCondition, ErrorReporter};

/// Error counter level at which the bus warning is reported
pub const WARNING_LIMIT: u16 = 96;
/// Error counter level at which a node turns error passive
pub const PASSIVE_LIMIT: u16 = 128;
/// Transmit error counter level at which a node goes bus-off
pub const BUS_OFF_LIMIT: u16 = 256;

/// Longest sequence `diagnose` can produce
const MAX_ACTIONS: usize = 8;

/// Error counters and overrun flag read in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorSnapshot {
    pub rx: u16,
    pub tx: u16,
    pub overrun: bool,
}

impl ErrorSnapshot {
    /// `tx << 16 | rx << 8 | overrun`, the form compared between polls and
    /// forwarded as report info.
    pub fn packed(&self) -> u32 {
        ((self.tx as u32) << 16) | ((self.rx as u32) << 8) | self.overrun as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorAction {
    Report(ErrorCondition, EmergencyCode),
    Reset(ErrorCondition),
}

impl ErrorAction {
    pub fn forward<E: ErrorReporter + ?Sized>(self, reporter: &E, info: u32) {
        match self {
            Self::Report(condition, code) => reporter.report(condition, code, info),
            Self::Reset(condition) => reporter.reset(condition, info),
        }
    }
}

pub type Diagnosis = Vec<ErrorAction, MAX_ACTIONS>;

/// Derives the report/reset sequence for a changed snapshot.
///
/// `first_tx_done` gates the transmit passive report during bootup,
/// `tx_passive_active` tells whether transmit passive is currently reported.
pub fn diagnose(
    snapshot: ErrorSnapshot,
    first_tx_done: bool,
    tx_passive_active: bool,
) -> Diagnosis {
    let mut actions = Diagnosis::new();
    let mut push = |action: ErrorAction| {
        // Capacity covers the longest path
        let _ = actions.push(action);
    };

    let ErrorSnapshot { rx, tx, overrun } = snapshot;

    if tx >= BUS_OFF_LIMIT {
        push(ErrorAction::Report(
            ErrorCondition::TxBusOff,
            EmergencyCode::BusOffRecovered,
        ));
    } else {
        push(ErrorAction::Reset(ErrorCondition::TxBusOff));

        if rx >= WARNING_LIMIT || tx >= WARNING_LIMIT {
            push(ErrorAction::Report(
                ErrorCondition::BusWarning,
                EmergencyCode::NoError,
            ));
        }

        if rx >= PASSIVE_LIMIT {
            push(ErrorAction::Report(
                ErrorCondition::RxBusPassive,
                EmergencyCode::CanPassive,
            ));
        } else {
            push(ErrorAction::Reset(ErrorCondition::RxBusPassive));
        }

        if tx >= PASSIVE_LIMIT {
            if first_tx_done {
                push(ErrorAction::Report(
                    ErrorCondition::TxBusPassive,
                    EmergencyCode::CanPassive,
                ));
            }
        } else if tx_passive_active {
            push(ErrorAction::Reset(ErrorCondition::TxBusPassive));
            push(ErrorAction::Reset(ErrorCondition::TxOverflow));
        }

        if rx < WARNING_LIMIT && tx < WARNING_LIMIT {
            push(ErrorAction::Reset(ErrorCondition::BusWarning));
        }
    }

    if overrun {
        push(ErrorAction::Report(
            ErrorCondition::RxOverflow,
            EmergencyCode::CanOverrun,
        ));
    }

    actions
}

/// Remembers the last diagnosed snapshot so unchanged polls are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ErrorMonitor {
    last: u32,
}

impl ErrorMonitor {
    /// Stores `snapshot`, returning whether it differs from the last one.
    pub(crate) fn update(&mut self, snapshot: &ErrorSnapshot) -> bool {
        let packed = snapshot.packed();

        if packed == self.last {
            return false;
        }

        self.last = packed;
        true
    }
}
