use crate::{
    codec::{ID_MASK, RX_RTR_BIT},
    ConfigError, MAX_DATA_LENGTH,
};

/// A received frame as delivered to receive callbacks.
///
/// The identifier carries the 11-bit CAN-ID plus [`REMOTE_FLAG`](crate::REMOTE_FLAG)
/// for remote frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxMsg {
    ident: u16,
    dlc: u8,
    data: [u8; MAX_DATA_LENGTH],
}

impl RxMsg {
    pub(crate) fn new(ident: u16, dlc: u8, data: [u8; MAX_DATA_LENGTH]) -> Self {
        Self { ident, dlc, data }
    }

    pub fn ident(&self) -> u16 {
        self.ident
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// The received payload, `dlc` bytes long. Zeroed for remote frames.
    pub fn data(&self) -> &[u8] {
        &self.data[..(self.dlc as usize).min(MAX_DATA_LENGTH)]
    }
}

/// Consumer of received frames, registered per receive buffer.
///
/// Invoked from the receive interrupt; implementations must not block.
pub trait RxCallback {
    fn on_receive(&self, msg: &RxMsg);
}

impl<F: Fn(&RxMsg)> RxCallback for F {
    fn on_receive(&self, msg: &RxMsg) {
        self(msg)
    }
}

/// One entry of the receive registration table
#[derive(Clone, Copy)]
pub(crate) struct RxBuffer<'a> {
    ident: u16,
    mask: u16,
    callback: Option<&'a (dyn RxCallback + Sync)>,
}

impl<'a> RxBuffer<'a> {
    /// Matches nothing: no decoded identifier has every bit set
    const UNUSED: Self = Self {
        ident: 0xFFFF,
        mask: 0xFFFF,
        callback: None,
    };

    fn new(ident: u16, mask: u16, rtr: bool, callback: &'a (dyn RxCallback + Sync)) -> Self {
        let mut ident = ident & ID_MASK;

        if rtr {
            ident |= RX_RTR_BIT;
        }

        Self {
            ident,
            mask: (mask & ID_MASK) | RX_RTR_BIT,
            callback: Some(callback),
        }
    }

    fn matches(&self, ident: u16) -> bool {
        ((ident ^ self.ident) & self.mask) == 0
    }
}

/// Fixed-size receive registration table. Scan order is first-match-wins.
pub(crate) struct RxTable<'a, const N: usize> {
    buffers: [RxBuffer<'a>; N],
}

impl<'a, const N: usize> RxTable<'a, N> {
    pub(crate) fn new() -> Self {
        Self {
            buffers: [RxBuffer::UNUSED; N],
        }
    }

    pub(crate) fn register(
        &mut self,
        index: usize,
        ident: u16,
        mask: u16,
        rtr: bool,
        callback: &'a (dyn RxCallback + Sync),
    ) -> Result<(), ConfigError> {
        let buffer = self
            .buffers
            .get_mut(index)
            .ok_or(ConfigError::RxIndexOutOfRange(index, N))?;

        *buffer = RxBuffer::new(ident, mask, rtr, callback);

        Ok(())
    }

    /// Finds the registration for `ident`.
    ///
    /// With a hardware filter `candidate`, only that entry is verified;
    /// otherwise the table is scanned from index 0.
    pub(crate) fn find(&self, ident: u16, candidate: Option<usize>) -> Option<usize> {
        match candidate {
            Some(index) => self
                .buffers
                .get(index)
                .filter(|buffer| buffer.matches(ident))
                .map(|_| index),
            None => self.buffers.iter().position(|buffer| buffer.matches(ident)),
        }
    }

    /// Runs the callback registered at `index`. Returns whether one was
    /// invoked.
    pub(crate) fn deliver(&self, index: usize, msg: &RxMsg) -> bool {
        match self.buffers.get(index).and_then(|buffer| buffer.callback) {
            Some(callback) => {
                callback.on_receive(msg);
                true
            }
            None => false,
        }
    }
}
