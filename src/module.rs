use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

use crate::{
    bus::CanBus,
    codec,
    monitor::{diagnose, ErrorMonitor, ErrorSnapshot},
    rx::{RxCallback, RxTable},
    tx::{TxBuffer, TxHandle, TxOutcome, TxQueue},
    ConfigError, EmergencyCode, ErrorCondition, ErrorReporter, MAX_DATA_LENGTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleConfig {
    /// The peripheral's filter banks select the receive registration (see
    /// [`CanBus::filter_index`]) instead of a scan of the table.
    pub use_hardware_filters: bool,
}

/// CAN module connecting a peripheral to the protocol stack.
///
/// Registrations are made through `&mut self` during configuration. Once
/// configured, the module is shared (typically as a `&'static`) between the
/// foreground and the receive/transmit-complete interrupts, all of which
/// only need `&self`.
///
/// `RX` and `TX` are the sizes of the receive registration table and of the
/// transmit buffer array. Lower transmit buffer indexes are drained first.
pub struct CanModule<'a, B, E, const RX: usize, const TX: usize> {
    config: ModuleConfig,
    normal: AtomicBool,
    rx: RxTable<'a, RX>,
    tx: Mutex<RefCell<TxQueue<TX>>>,
    bus: Mutex<RefCell<B>>,
    monitor: Mutex<RefCell<ErrorMonitor>>,
    reporter: E,
}

impl<'a, B: CanBus, E: ErrorReporter, const RX: usize, const TX: usize>
    CanModule<'a, B, E, RX, TX>
{
    /// Creates the module in configuration mode with every receive
    /// registration unused and every transmit buffer empty.
    pub fn new(bus: B, reporter: E, config: ModuleConfig) -> Self {
        debug!(
            "can: init, {} rx / {} tx buffers, hardware filters: {}",
            RX,
            TX,
            config.use_hardware_filters
        );

        Self {
            config,
            normal: AtomicBool::new(false),
            rx: RxTable::new(),
            tx: Mutex::new(RefCell::new(TxQueue::new())),
            bus: Mutex::new(RefCell::new(bus)),
            monitor: Mutex::new(RefCell::new(ErrorMonitor::default())),
            reporter,
        }
    }

    /* Configuration */

    /// Registers `callback` for frames matching `ident` under `mask`.
    ///
    /// Only the 11 identifier bits of `ident` and `mask` are used. `rtr`
    /// selects remote frames; the RTR bit is always compared.
    pub fn rx_buffer_init(
        &mut self,
        index: usize,
        ident: u16,
        mask: u16,
        rtr: bool,
        callback: &'a (dyn RxCallback + Sync),
    ) -> Result<(), ConfigError> {
        self.rx.register(index, ident, mask, rtr, callback)
    }

    /// Configures the transmit buffer at `index` for one logical message
    /// source. Synchronous buffers (`sync`) are discarded by
    /// [`clear_pending_sync`](Self::clear_pending_sync).
    pub fn tx_buffer_init(
        &mut self,
        index: usize,
        ident: u16,
        rtr: bool,
        len: u8,
        sync: bool,
    ) -> Result<TxHandle, ConfigError> {
        if len as usize > MAX_DATA_LENGTH {
            return Err(ConfigError::InvalidDataLength(len));
        }

        self.tx
            .get_mut()
            .get_mut()
            .configure(index, TxBuffer::new(ident, rtr, len, sync))
    }

    /* Mode */

    pub fn set_configuration_mode(&self) {
        debug!("can: configuration mode");
        self.normal.store(false, Ordering::Relaxed);
    }

    pub fn set_normal_mode(&self) {
        debug!("can: normal mode");
        self.normal.store(true, Ordering::Relaxed);
    }

    pub fn is_normal_mode(&self) -> bool {
        self.normal.load(Ordering::Relaxed)
    }

    /// Leaves normal mode and resets the peripheral.
    pub fn reset(&self) {
        self.normal.store(false, Ordering::Relaxed);
        critical_section::with(|cs| self.bus.borrow_ref_mut(cs).reset());
    }

    pub fn disable(&self) {
        self.normal.store(false, Ordering::Relaxed);
    }

    /* Transmission */

    /// Copies `data` into the buffer and transmits it, or queues it when no
    /// mailbox is free.
    ///
    /// At most the configured length is copied. Sending a buffer that is
    /// still queued reports [`ErrorCondition::TxOverflow`] (once the first
    /// frame has left the device) and queues it again.
    pub fn send(&self, handle: TxHandle, data: &[u8]) -> TxOutcome {
        let (outcome, first_tx_done, ident) = critical_section::with(|cs| {
            let mut tx = self.tx.borrow_ref_mut(cs);
            let mut bus = self.bus.borrow_ref_mut(cs);

            let ident = match tx.buffer_mut(handle) {
                Some(buffer) => {
                    buffer.write(data);
                    buffer.ident()
                }
                None => 0,
            };

            let outcome = tx.submit(handle, &mut *bus);

            (outcome, tx.first_tx_done(), ident)
        });

        if outcome == TxOutcome::Overflow {
            warn!("tx: buffer {} overflow ({:#x})", handle.index(), ident);

            // Bootup message may still be in the mailboxes
            if first_tx_done {
                self.reporter.report(
                    ErrorCondition::TxOverflow,
                    EmergencyCode::CanOverrun,
                    ident as u32,
                );
            }
        }

        outcome
    }

    /// Discards synchronous frames at a sync window boundary: aborts the
    /// hardware mailboxes if one holds a synchronous frame and drops queued
    /// synchronous buffers.
    pub fn clear_pending_sync(&self) {
        let aborted = critical_section::with(|cs| {
            let mut bus = self.bus.borrow_ref_mut(cs);
            self.tx.borrow_ref_mut(cs).clear_sync(&mut *bus)
        });

        if let Some(aborted) = aborted {
            debug!("tx: sync window cleanup ({:?})", aborted);

            self.reporter.report(
                ErrorCondition::TpdoOutsideWindow,
                EmergencyCode::Communication,
                u8::from(aborted) as u32,
            );
        }
    }

    /* Bus health */

    /// Reads the error counters and forwards condition changes to the
    /// reporter. A no-op while the counters are unchanged.
    pub fn verify_errors(&self) {
        let changed = critical_section::with(|cs| {
            let bus = self.bus.borrow_ref(cs);
            let counters = bus.error_counters();
            let snapshot = ErrorSnapshot {
                rx: counters.rx,
                tx: counters.tx,
                overrun: bus.rx_overrun(),
            };

            self.monitor
                .borrow_ref_mut(cs)
                .update(&snapshot)
                .then(|| (snapshot, self.tx.borrow_ref(cs).first_tx_done()))
        });

        let Some((snapshot, first_tx_done)) = changed else {
            return;
        };

        debug!(
            "can: errors rx {} tx {} overrun {}",
            snapshot.rx,
            snapshot.tx,
            snapshot.overrun
        );

        let info = snapshot.packed();
        let tx_passive_active = self.reporter.is_error(ErrorCondition::TxBusPassive);

        for action in diagnose(snapshot, first_tx_done, tx_passive_active) {
            action.forward(&self.reporter, info);
        }
    }

    /* Interrupts */

    /// Receive interrupt: fetches one frame and hands it to the first
    /// matching registration. Unmatched frames are dropped.
    pub fn on_receive(&self) {
        let received = critical_section::with(|cs| {
            let mut bus = self.bus.borrow_ref_mut(cs);
            let frame = bus.try_receive()?;
            Some((frame, bus.filter_index()))
        });

        let Some((frame, candidate)) = received else {
            return;
        };

        let msg = codec::decode(&frame);
        trace!("rx: {:#x} [{}]", msg.ident(), msg.dlc());

        let index = if self.config.use_hardware_filters {
            candidate.and_then(|candidate| self.rx.find(msg.ident(), Some(candidate)))
        } else {
            self.rx.find(msg.ident(), None)
        };

        if let Some(index) = index {
            self.rx.deliver(index, &msg);
        }
    }

    /// Transmit-complete interrupt: sends the next queued buffer, if any.
    pub fn on_transmit_complete(&self) {
        critical_section::with(|cs| {
            let mut bus = self.bus.borrow_ref_mut(cs);
            self.tx.borrow_ref_mut(cs).on_mailbox_free(&mut *bus);
        });
    }

    /// Handle for the peripheral's interrupt vectors.
    pub fn interrupts(&self) -> Interrupts<'_, 'a, B, E, RX, TX> {
        Interrupts { module: self }
    }

    /* Status */

    pub fn config(&self) -> ModuleConfig {
        self.config
    }

    pub fn reporter(&self) -> &E {
        &self.reporter
    }

    /// Number of queued transmit buffers
    pub fn pending_count(&self) -> usize {
        critical_section::with(|cs| self.tx.borrow_ref(cs).pending())
    }

    pub fn is_buffer_full(&self, handle: TxHandle) -> bool {
        critical_section::with(|cs| {
            self.tx
                .borrow_ref(cs)
                .buffer(handle)
                .is_some_and(|buffer| buffer.is_full())
        })
    }

    /// Whether a transmit-complete interrupt occurred since creation
    pub fn first_transmission_done(&self) -> bool {
        critical_section::with(|cs| self.tx.borrow_ref(cs).first_tx_done())
    }

    /// Runs `f` with exclusive access to the peripheral.
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.bus.borrow_ref_mut(cs)))
    }
}

/// The module's interrupt entry points, to be captured by the application's
/// interrupt vectors.
pub struct Interrupts<'m, 'a, B, E, const RX: usize, const TX: usize> {
    module: &'m CanModule<'a, B, E, RX, TX>,
}

impl<B, E, const RX: usize, const TX: usize> Clone for Interrupts<'_, '_, B, E, RX, TX> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B, E, const RX: usize, const TX: usize> Copy for Interrupts<'_, '_, B, E, RX, TX> {}

impl<B: CanBus, E: ErrorReporter, const RX: usize, const TX: usize>
    Interrupts<'_, '_, B, E, RX, TX>
{
    pub fn receive(&self) {
        self.module.on_receive()
    }

    pub fn transmit_complete(&self) {
        self.module.on_transmit_complete()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use embedded_can::StandardId;

    use super::{CanModule, ModuleConfig};
    use crate::{bus::mock::MockBus, CanMessage, ConfigError, RxMsg, TxOutcome};

    fn data_frame(id: u16) -> CanMessage {
        CanMessage::new_data(StandardId::new(id).unwrap(), &[id as u8]).unwrap()
    }

    #[test]
    fn starts_in_configuration_mode() {
        let module = CanModule::<_, _, 1, 1>::new(MockBus::default(), (), ModuleConfig::default());

        assert!(!module.is_normal_mode());
        module.set_normal_mode();
        assert!(module.is_normal_mode());
        module.set_configuration_mode();
        assert!(!module.is_normal_mode());

        module.set_normal_mode();
        module.reset();
        assert!(!module.is_normal_mode());
        assert_eq!(module.with_bus(|bus| bus.resets), 1);

        module.set_normal_mode();
        module.disable();
        assert!(!module.is_normal_mode());
    }

    #[test]
    fn tx_buffer_init_validates_arguments() {
        let mut module =
            CanModule::<_, _, 1, 2>::new(MockBus::default(), (), ModuleConfig::default());

        assert_eq!(
            module.tx_buffer_init(0, 0x180, false, 9, false),
            Err(ConfigError::InvalidDataLength(9))
        );
        assert_eq!(
            module.tx_buffer_init(2, 0x180, false, 8, false),
            Err(ConfigError::TxIndexOutOfRange(2, 2))
        );
        assert_eq!(
            module
                .tx_buffer_init(1, 0x180, false, 8, false)
                .map(|handle| handle.index()),
            Ok(1)
        );
    }

    #[test]
    fn send_copies_payload() {
        let mut module =
            CanModule::<_, _, 1, 1>::new(MockBus::with_mailboxes(1), (), ModuleConfig::default());
        let handle = module.tx_buffer_init(0, 0x281, false, 2, false).unwrap();

        assert_eq!(module.send(handle, &[0xCA, 0xFE, 0xEE]), TxOutcome::Sent);
        assert_eq!(
            module.with_bus(|bus| bus.sent[0]),
            CanMessage::new_data(StandardId::new(0x281).unwrap(), &[0xCA, 0xFE]).unwrap()
        );
    }

    #[test]
    fn spurious_receive_interrupt_is_ignored() {
        let hits = AtomicUsize::new(0);
        let callback = |_: &RxMsg| {
            hits.fetch_add(1, Ordering::Relaxed);
        };

        let mut module =
            CanModule::<_, _, 1, 1>::new(MockBus::default(), (), ModuleConfig::default());
        module.rx_buffer_init(0, 0x100, 0x7FF, false, &callback).unwrap();

        module.interrupts().receive();
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn hardware_filter_index_selects_registration() {
        let hits = AtomicUsize::new(0);
        let callback = |_: &RxMsg| {
            hits.fetch_add(1, Ordering::Relaxed);
        };

        let config = ModuleConfig {
            use_hardware_filters: true,
        };
        let mut module = CanModule::<_, _, 2, 1>::new(MockBus::default(), (), config);
        module.rx_buffer_init(0, 0x100, 0x7FF, false, &callback).unwrap();
        module.rx_buffer_init(1, 0x200, 0x7FF, false, &callback).unwrap();

        // Filter points at the wrong registration
        module.with_bus(|bus| {
            bus.inbox.push(data_frame(0x100));
            bus.filter_index = Some(1);
        });
        module.on_receive();
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        // No filter information at all
        module.with_bus(|bus| {
            bus.inbox.push(data_frame(0x100));
            bus.filter_index = None;
        });
        module.on_receive();
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        module.with_bus(|bus| {
            bus.inbox.push(data_frame(0x200));
            bus.filter_index = Some(1);
        });
        module.on_receive();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
