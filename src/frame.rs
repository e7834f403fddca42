use embedded_can::{Id, StandardId};

/// Maximum number of data bytes in a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// A classic CAN 2.0 frame with an 11-bit identifier, as exchanged with the
/// peripheral driver.
///
/// The data, if absent, means that it is an RTR frame. The DLC is kept
/// separately so remote frames can still request a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanMessage {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    id: StandardId,
    dlc: usize,
    data: Option<[u8; MAX_DATA_LENGTH]>,
}

impl CanMessage {
    /// Creates a new data frame. `data` must have a length in the range 0..=8
    /// or else `None` will be returned instead.
    pub fn new_data(id: StandardId, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DATA_LENGTH {
            return None;
        }

        let mut copy = [0u8; MAX_DATA_LENGTH];
        copy[..data.len()].copy_from_slice(data);

        Some(Self {
            id,
            dlc: data.len(),
            data: Some(copy),
        })
    }

    /// Creates a new remote frame. `dlc` must be in the range 0..=8 or else
    /// `None` will be returned instead.
    pub fn new_remote(id: StandardId, dlc: usize) -> Option<Self> {
        if dlc > MAX_DATA_LENGTH {
            return None;
        }

        Some(Self {
            id,
            dlc,
            data: None,
        })
    }

    /// Builds a frame from already validated parts, clamping the DLC to 8.
    pub(crate) fn from_parts(
        id: StandardId,
        dlc: usize,
        data: &[u8; MAX_DATA_LENGTH],
        remote: bool,
    ) -> Self {
        Self {
            id,
            dlc: dlc.min(MAX_DATA_LENGTH),
            data: if remote { None } else { Some(*data) },
        }
    }

    /// Gets the 11-bit identifier of the frame
    pub fn standard_id(&self) -> StandardId {
        self.id
    }

    /// Gets the DLC (Data Length Code) of the frame
    pub fn dlc(&self) -> usize {
        self.dlc
    }

    /// Gets the data associated with the frame. Empty for RTR frames.
    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..self.dlc],
            None => &[],
        }
    }

    pub fn is_remote(&self) -> bool {
        self.data.is_none()
    }
}

impl embedded_can::Frame for CanMessage {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Self::new_data(id, data),
            Id::Extended(_) => None,
        }
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Self::new_remote(id, dlc),
            Id::Extended(_) => None,
        }
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        self.is_remote()
    }

    fn id(&self) -> Id {
        Id::Standard(self.id)
    }

    fn dlc(&self) -> usize {
        self.dlc
    }

    fn data(&self) -> &[u8] {
        CanMessage::data(self)
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::{ExtendedId, Frame, Id, StandardId};

    use super::CanMessage;

    #[test]
    fn data_frame_limits() {
        assert!(CanMessage::new_data(StandardId::ZERO, &[0; 9]).is_none());

        let frame = CanMessage::new_data(StandardId::MAX, &[1, 2, 3]).unwrap();
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert!(!frame.is_remote());
    }

    #[test]
    fn remote_frame_has_no_data() {
        assert!(CanMessage::new_remote(StandardId::ZERO, 9).is_none());

        let frame = CanMessage::new_remote(StandardId::MAX, 4).unwrap();
        assert_eq!(frame.dlc(), 4);
        assert!(frame.data().is_empty());
        assert!(frame.is_remote());
    }

    #[test]
    fn embedded_can_frame_rejects_extended_ids() {
        assert!(<CanMessage as Frame>::new(ExtendedId::MAX, &[]).is_none());
        assert!(<CanMessage as Frame>::new_remote(ExtendedId::ZERO, 0).is_none());

        let frame = <CanMessage as Frame>::new(StandardId::new(0x123).unwrap(), &[0xAA]).unwrap();
        assert_eq!(Frame::id(&frame), Id::Standard(StandardId::new(0x123).unwrap()));
        assert!(frame.is_standard());
        assert!(frame.is_data_frame());
    }

    #[test]
    fn from_parts_clamps_dlc() {
        let frame = CanMessage::from_parts(StandardId::ZERO, 15, &[7; 8], false);
        assert_eq!(frame.dlc(), 8);
        assert_eq!(frame.data(), &[7; 8]);
    }
}
