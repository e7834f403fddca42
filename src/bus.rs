use crate::frame::CanMessage;

/// Error counters as read from the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorCounters {
    pub rx: u16,
    pub tx: u16,
}

/// The CAN peripheral as seen by the module.
///
/// Every method must return immediately: they are called from the receive
/// and transmit-complete interrupts as well as from the foreground, always
/// inside a critical section. The application wires the peripheral's two
/// interrupt vectors to [`Interrupts`](crate::Interrupts).
pub trait CanBus {
    /// Places `frame` into a free transmit mailbox. Returns `false` when all
    /// mailboxes are occupied.
    fn try_transmit(&mut self, frame: &CanMessage) -> bool;

    /// Fetches the next received frame, if any.
    fn try_receive(&mut self) -> Option<CanMessage>;

    fn error_counters(&self) -> ErrorCounters;

    /// Whether a receive FIFO has overrun
    fn rx_overrun(&self) -> bool;

    /// Aborts every pending transmission in the hardware mailboxes.
    fn abort_transmissions(&mut self);

    /// Index of the receive registration selected by the hardware filter that
    /// accepted the last received frame. Only consulted when hardware
    /// filtering is enabled.
    fn filter_index(&self) -> Option<usize> {
        None
    }

    /// Resets the peripheral.
    fn reset(&mut self) {}
}
