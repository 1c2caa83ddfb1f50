//! Command identifiers and the request/response envelope.
//!
//! Every request is the 16-bit big-endian command id followed by a
//! command-specific payload. The machine answers on the read characteristic
//! with the same id echoed in front of its response payload.

use crate::constants::COMMAND_HEADER_SIZE;
use crate::error::PP1Error;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum CommandId {
    MachineInfo = 0x0000,
    MachineState = 0x0001,
    ServiceCount = 0x0100,
    PatternUuidRequest = 0x0702,
    MaskTrace = 0x0704,
    LayoutSend = 0x0705,
    EmbSewingInfoRequest = 0x0706,
    PatternSewingInfo = 0x0707,
    EmbSewingDataDelete = 0x0708,
    NeedleModeInstructions = 0x0709,
    EmbUuidSend = 0x070A,
    ResumeFlagRequest = 0x070B,
    Resume = 0x070C,
    StartSewing = 0x070E,
    MaskTrace1 = 0x0710,
    EmbOrgPoint = 0x0800,
    MachineSettingInfo = 0x0C02,
    SendDataInfo = 0x1200,
    SendData = 0x1201,
    ClearError = 0x1300,
}

/// Builds the wire bytes for a command.
pub fn encode_frame(command: CommandId, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(COMMAND_HEADER_SIZE + payload.len());
    frame.put_u16(command.into());
    frame.put_slice(payload);
    frame.freeze()
}

/// A response read back from the machine, with its echoed id checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub command: CommandId,
    pub payload: Bytes,
}

impl ResponseFrame {
    /// Strips and verifies the echoed command id.
    pub fn parse(command: CommandId, response: Bytes) -> Result<Self, PP1Error> {
        if response.len() < COMMAND_HEADER_SIZE {
            return Err(PP1Error::InsufficientData {
                command,
                expected: COMMAND_HEADER_SIZE,
                actual: response.len(),
            });
        }
        let echoed = u16::from_be_bytes([response[0], response[1]]);
        if echoed != u16::from(command) {
            return Err(PP1Error::MalformedResponse {
                command,
                message: format!("response echoes command {echoed:#06x}"),
            });
        }
        Ok(Self {
            command,
            payload: response.slice(COMMAND_HEADER_SIZE..),
        })
    }

    /// The acknowledgement code in the first payload byte.
    pub fn status_code(&self) -> Result<u8, PP1Error> {
        self.payload.first().copied().ok_or(PP1Error::InsufficientData {
            command: self.command,
            expected: COMMAND_HEADER_SIZE + 1,
            actual: COMMAND_HEADER_SIZE,
        })
    }
}
