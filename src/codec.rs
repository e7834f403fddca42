use embedded_can::StandardId;

use crate::{frame::CanMessage, rx::RxMsg, tx::TxBuffer, MAX_DATA_LENGTH};

/// The 11-bit CAN identifier
pub const ID_MASK: u16 = 0x07FF;

/// RTR compare bit used by receive registrations (identifier and mask)
pub const RX_RTR_BIT: u16 = 0x0800;

/// Remote marker carried by transmit buffers and decoded receive records.
///
/// This is not the bit receive registrations compare against, see
/// [`RX_RTR_BIT`].
pub const REMOTE_FLAG: u16 = 0x8000;

fn standard_id(ident: u16) -> StandardId {
    // Masked to 11 bits, so always in range
    StandardId::new(ident & ID_MASK).unwrap_or(StandardId::ZERO)
}

/* Encoding */

/// Converts a transmit buffer into the frame handed to the peripheral.
pub(crate) fn encode(buffer: &TxBuffer) -> CanMessage {
    CanMessage::from_parts(
        standard_id(buffer.ident()),
        buffer.dlc() as usize,
        buffer.raw_data(),
        buffer.ident() & REMOTE_FLAG != 0,
    )
}

/* Decoding */

/// Converts a frame fetched from the peripheral into the record passed to
/// receive callbacks.
pub(crate) fn decode(frame: &CanMessage) -> RxMsg {
    let mut ident = frame.standard_id().as_raw() & ID_MASK;

    if frame.is_remote() {
        ident |= REMOTE_FLAG;
    }

    let mut data = [0u8; MAX_DATA_LENGTH];
    let payload = frame.data();
    data[..payload.len()].copy_from_slice(payload);

    RxMsg::new(ident, frame.dlc() as u8, data)
}
