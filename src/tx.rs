use crate::{
    bus::CanBus,
    codec::{self, ID_MASK, REMOTE_FLAG},
    ConfigError, SyncAbort, MAX_DATA_LENGTH,
};

/// Software transmit buffer, one per logical message source.
///
/// A full buffer is queued and waits for a free hardware mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct TxBuffer {
    ident: u16,
    dlc: u8,
    data: [u8; MAX_DATA_LENGTH],
    full: bool,
    sync: bool,
}

impl TxBuffer {
    const EMPTY: Self = Self {
        ident: 0,
        dlc: 0,
        data: [0; MAX_DATA_LENGTH],
        full: false,
        sync: false,
    };

    /// `dlc` is clamped to 8, callers validate it beforehand.
    pub(crate) fn new(ident: u16, rtr: bool, dlc: u8, sync: bool) -> Self {
        let mut ident = ident & ID_MASK;

        if rtr {
            ident |= REMOTE_FLAG;
        }

        Self {
            ident,
            dlc: dlc.min(MAX_DATA_LENGTH as u8),
            sync,
            ..Self::EMPTY
        }
    }

    pub(crate) fn ident(&self) -> u16 {
        self.ident
    }

    pub(crate) fn dlc(&self) -> u8 {
        self.dlc
    }

    pub(crate) fn raw_data(&self) -> &[u8; MAX_DATA_LENGTH] {
        &self.data
    }

    /// Copies up to `dlc` bytes of `data` into the buffer. Bytes past the
    /// end of a shorter `data` keep their previous value.
    pub(crate) fn write(&mut self, data: &[u8]) {
        let len = data.len().min(self.dlc as usize);
        self.data[..len].copy_from_slice(&data[..len]);
    }

    pub(crate) fn is_full(&self) -> bool {
        self.full
    }
}

/// Names a configured transmit buffer. Obtained from
/// [`CanModule::tx_buffer_init`](crate::CanModule::tx_buffer_init).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxHandle(usize);

impl TxHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Result of a send request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub enum TxOutcome {
    /// Handed to a hardware mailbox right away
    Sent,
    /// Queued until a mailbox frees up
    Queued,
    /// The buffer was still queued from an earlier request. The new request
    /// was processed anyway.
    Overflow,
}

/// The transmit buffers and the counters shared between the foreground and
/// the transmit-complete interrupt. Only ever touched inside a critical
/// section.
pub(crate) struct TxQueue<const N: usize> {
    buffers: [TxBuffer; N],
    /// Number of full buffers
    pending: usize,
    /// A synchronous frame occupies a hardware mailbox
    inhibit: bool,
    /// The first frame after reset (bootup) has left the device
    first_tx_done: bool,
}

impl<const N: usize> TxQueue<N> {
    pub(crate) fn new() -> Self {
        Self {
            buffers: [TxBuffer::EMPTY; N],
            pending: 0,
            inhibit: false,
            first_tx_done: false,
        }
    }

    pub(crate) fn configure(
        &mut self,
        index: usize,
        buffer: TxBuffer,
    ) -> Result<TxHandle, ConfigError> {
        let slot = self
            .buffers
            .get_mut(index)
            .ok_or(ConfigError::TxIndexOutOfRange(index, N))?;

        *slot = buffer;

        Ok(TxHandle(index))
    }

    pub(crate) fn buffer(&self, handle: TxHandle) -> Option<&TxBuffer> {
        self.buffers.get(handle.0)
    }

    pub(crate) fn buffer_mut(&mut self, handle: TxHandle) -> Option<&mut TxBuffer> {
        self.buffers.get_mut(handle.0)
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending
    }

    pub(crate) fn first_tx_done(&self) -> bool {
        self.first_tx_done
    }

    /// Transmits the buffer right away if nothing is queued and a mailbox is
    /// free, otherwise queues it.
    pub(crate) fn submit<B: CanBus>(&mut self, handle: TxHandle, bus: &mut B) -> TxOutcome {
        let Some(buffer) = self.buffers.get_mut(handle.0) else {
            return TxOutcome::Overflow;
        };

        let overflow = buffer.full;

        let outcome = if self.pending == 0 {
            let frame = codec::encode(buffer);

            if bus.try_transmit(&frame) {
                if buffer.sync {
                    self.inhibit = true;
                }

                trace!("tx: {:#x} [{}]", buffer.ident, buffer.dlc);
                TxOutcome::Sent
            } else {
                buffer.full = true;
                self.pending += 1;

                debug!("tx: mailboxes full, queued {:#x}", buffer.ident);
                TxOutcome::Queued
            }
        } else {
            buffer.full = true;
            self.pending += 1;

            debug!("tx: queued {:#x} behind {} pending", buffer.ident, self.pending - 1);
            TxOutcome::Queued
        };

        if overflow {
            TxOutcome::Overflow
        } else {
            outcome
        }
    }

    /// Handles a transmit-complete interrupt: drains the lowest-indexed full
    /// buffer, at most one per call. Returns the index of the drained buffer.
    pub(crate) fn on_mailbox_free<B: CanBus>(&mut self, bus: &mut B) -> Option<usize> {
        self.first_tx_done = true;
        self.inhibit = false;

        if self.pending == 0 {
            return None;
        }

        match self.buffers.iter_mut().enumerate().find(|(_, buffer)| buffer.full) {
            Some((index, buffer)) => {
                buffer.full = false;
                self.pending -= 1;
                self.inhibit = buffer.sync;

                if bus.try_transmit(&codec::encode(buffer)) {
                    trace!("tx: {:#x} [{}] from buffer {}", buffer.ident, buffer.dlc, index);
                } else {
                    warn!("tx: no mailbox for drained buffer {}, frame dropped", index);
                }

                Some(index)
            }
            None => {
                // Counter drifted from the buffer flags
                self.pending = 0;
                None
            }
        }
    }

    /// Drops in-flight and queued synchronous frames. Returns what was
    /// discarded, the queued case taking precedence.
    pub(crate) fn clear_sync<B: CanBus>(&mut self, bus: &mut B) -> Option<SyncAbort> {
        let mut aborted = None;

        if self.inhibit {
            bus.abort_transmissions();
            self.inhibit = false;
            aborted = Some(SyncAbort::Mailboxes);
        }

        if self.pending != 0 {
            for buffer in self.buffers.iter_mut().filter(|b| b.full && b.sync) {
                buffer.full = false;
                self.pending = self.pending.saturating_sub(1);
                aborted = Some(SyncAbort::Queued);
            }
        }

        aborted
    }
}
