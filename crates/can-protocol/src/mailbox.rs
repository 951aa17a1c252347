//! Host Mailbox Wire Format
//!
//! Frames cross the USB link as the four 32-bit words of a bxCAN FIFO
//! mailbox, little-endian, 16 bytes per frame:
//!
//! | word | bits | content |
//! |------|------|---------|
//! | RIR  | 31..21 | standard identifier |
//! | RIR  | 31..3  | extended identifier (when IDE is set) |
//! | RIR  | 2 / 1 / 0 | IDE / RTR / TXRQ |
//! | RDTR | 3..0 | DLC |
//! | RDTR | 11..4 | bus annotation |
//! | RDTR | 31..16 | timestamp |
//! | RDLR | all | payload bytes 0..3 |
//! | RDHR | all | payload bytes 4..7 |

use crate::error::ProtocolError;
use crate::frame::{CanFrame, MAX_DLC};

/// Size of one encoded mailbox record
pub const MAILBOX_SIZE: usize = 16;

const RIR_TXRQ: u32 = 1 << 0;
const RIR_RTR: u32 = 1 << 1;
const RIR_IDE: u32 = 1 << 2;

/// Raw mailbox register image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxWords {
    /// Identifier register
    pub rir: u32,
    /// Data length / time register
    pub rdtr: u32,
    /// Low data register
    pub rdlr: u32,
    /// High data register
    pub rdhr: u32,
}

impl MailboxWords {
    /// Build the register image for a frame
    pub fn from_frame(frame: &CanFrame) -> Self {
        let mut rir = if frame.extended {
            (frame.id << 3) | RIR_IDE
        } else {
            frame.id << 21
        };
        if frame.rtr {
            rir |= RIR_RTR;
        }
        if frame.tx_request {
            rir |= RIR_TXRQ;
        }

        let rdtr = u32::from(frame.dlc & 0xF)
            | (u32::from(frame.bus) << 4)
            | (u32::from(frame.timestamp) << 16);

        Self {
            rir,
            rdtr,
            rdlr: u32::from_le_bytes([frame.data[0], frame.data[1], frame.data[2], frame.data[3]]),
            rdhr: u32::from_le_bytes([frame.data[4], frame.data[5], frame.data[6], frame.data[7]]),
        }
    }

    /// Decode the register image into a frame
    pub fn to_frame(&self) -> Result<CanFrame, ProtocolError> {
        let dlc = (self.rdtr & 0xF) as u8;
        if dlc > MAX_DLC {
            return Err(ProtocolError::InvalidDlc(dlc));
        }

        let extended = self.rir & RIR_IDE != 0;
        let id = if extended { self.rir >> 3 } else { self.rir >> 21 };

        let mut data = [0u8; 8];
        data[..4].copy_from_slice(&self.rdlr.to_le_bytes());
        data[4..].copy_from_slice(&self.rdhr.to_le_bytes());

        Ok(CanFrame {
            id,
            extended,
            rtr: self.rir & RIR_RTR != 0,
            tx_request: self.rir & RIR_TXRQ != 0,
            dlc,
            data,
            bus: ((self.rdtr >> 4) & 0xFF) as u8,
            timestamp: (self.rdtr >> 16) as u16,
        })
    }

    /// Bus annotation without decoding the rest of the record
    pub fn bus_annotation(&self) -> u8 {
        ((self.rdtr >> 4) & 0xFF) as u8
    }

    /// Serialize to the 16-byte wire record
    pub fn encode(&self) -> [u8; MAILBOX_SIZE] {
        let mut out = [0u8; MAILBOX_SIZE];
        for (chunk, word) in out
            .chunks_exact_mut(4)
            .zip([self.rir, self.rdtr, self.rdlr, self.rdhr])
        {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Parse one 16-byte wire record
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != MAILBOX_SIZE {
            return Err(ProtocolError::InvalidLength {
                expected: MAILBOX_SIZE,
                actual: bytes.len(),
            });
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Ok(Self {
            rir: word(0),
            rdtr: word(4),
            rdlr: word(8),
            rdhr: word(12),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusNumber;

    #[test]
    fn test_standard_id_layout() {
        let frame = CanFrame::new_standard(0x123, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap()
            .as_tx_request();
        let words = MailboxWords::from_frame(&frame);

        assert_eq!(words.rir, (0x123 << 21) | 1);
        assert_eq!(words.rdtr, 8);
        assert_eq!(words.rdlr, 0x0403_0201);
        assert_eq!(words.rdhr, 0x0807_0605);
    }

    #[test]
    fn test_receipt_annotation_layout() {
        let mut frame = CanFrame::new_extended(0x1ABC_DEF0, &[0xFF])
            .unwrap()
            .as_receipt(BusNumber::BUS2);
        frame.timestamp = 0x1234;
        let words = MailboxWords::from_frame(&frame);

        assert_eq!(words.rir, (0x1ABC_DEF0 << 3) | 0b100);
        assert_eq!(words.rdtr, 0x1234_0000 | (0x82 << 4) | 1);
        assert_eq!(words.bus_annotation(), 0x82);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert_eq!(
            MailboxWords::decode(&[0u8; 12]),
            Err(ProtocolError::InvalidLength { expected: 16, actual: 12 })
        );

        let words = MailboxWords { rdtr: 0xF, ..Default::default() };
        assert_eq!(words.to_frame(), Err(ProtocolError::InvalidDlc(15)));
    }

    #[test]
    fn test_wire_bytes_are_little_endian() {
        let words = MailboxWords {
            rir: 0x0102_0304,
            rdtr: 0x0000_0018,
            rdlr: 0,
            rdhr: 0xAABB_CCDD,
        };
        let bytes = words.encode();
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[12..16], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(MailboxWords::decode(&bytes).unwrap(), words);
    }
}
