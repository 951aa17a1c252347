//! Host Transport Framing
//!
//! The USB transport moves whole 16-byte mailbox records. These helpers
//! turn the RX queue into bulk-in payloads and bulk-out payloads into
//! submissions; the transport itself lives elsewhere.

use can_protocol::{BusNumber, MailboxWords, ProtocolError, MAILBOX_SIZE};

use crate::error::GatewayError;
use crate::gateway::{CanGateway, SubmitOutcome};
use crate::hardware::CanHardware;
use crate::hooks::SafetyHooks;

/// Fill `buf` with as many whole records from the RX queue as fit.
///
/// Returns the number of bytes written (a multiple of [`MAILBOX_SIZE`]).
pub fn drain_to_host<H: CanHardware, S: SafetyHooks>(
    gateway: &CanGateway<H, S>,
    buf: &mut [u8],
) -> usize {
    let mut written = 0;
    for chunk in buf.chunks_exact_mut(MAILBOX_SIZE) {
        let Some(frame) = gateway.pop_received() else {
            break;
        };
        chunk.copy_from_slice(&MailboxWords::from_frame(&frame).encode());
        written += MAILBOX_SIZE;
    }
    written
}

/// Submit every record in a bulk-out payload on the bus named by its
/// annotation.
///
/// The whole payload is validated before anything is submitted. Returns the
/// number of records that were queued or bit-banged; records dropped by the
/// safety policy, a full queue or an out-of-range bus (including a stray
/// receipt flag) are not counted.
pub fn submit_from_host<H: CanHardware, S: SafetyHooks>(
    gateway: &CanGateway<H, S>,
    data: &[u8],
) -> Result<usize, ProtocolError> {
    if data.len() % MAILBOX_SIZE != 0 {
        return Err(ProtocolError::InvalidLength {
            expected: (data.len() / MAILBOX_SIZE + 1) * MAILBOX_SIZE,
            actual: data.len(),
        });
    }

    let mut records = Vec::with_capacity(data.len() / MAILBOX_SIZE);
    for chunk in data.chunks_exact(MAILBOX_SIZE) {
        let words = MailboxWords::decode(chunk)?;
        records.push((words.to_frame()?, words.bus_annotation()));
    }

    let accepted = records
        .iter()
        .map(|(frame, bus)| gateway.submit(*frame, *bus))
        .filter(|outcome| matches!(outcome, SubmitOutcome::Queued | SubmitOutcome::Bitbanged))
        .count();
    Ok(accepted)
}

/// Apply a host forwarding request where any negative target means "none"
pub fn set_forwarding<H: CanHardware, S: SafetyHooks>(
    gateway: &CanGateway<H, S>,
    from: u8,
    to: i32,
) -> Result<(), GatewayError> {
    let from = BusNumber::new(from).ok_or(GatewayError::BusOutOfRange(from))?;
    let to = match u8::try_from(to) {
        Ok(raw) => Some(BusNumber::new(raw).ok_or(GatewayError::BusOutOfRange(raw))?),
        Err(_) if to < 0 => None,
        Err(_) => return Err(GatewayError::BusOutOfRange(u8::MAX)),
    };
    gateway.set_forward(from, to);
    Ok(())
}
