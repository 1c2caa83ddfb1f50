//! Typed responses and the wire layouts they are decoded from.
//!
//! The field tables below are the protocol documentation: each `*Raw` struct
//! mirrors one payload byte for byte, with the endianness of every multi-byte
//! field spelled out in its type. Machine info mixes big-endian version words
//! with little-endian geometry; everything else is little-endian.

use crate::command::{CommandId, ResponseFrame};
use crate::constants::COMMAND_HEADER_SIZE;
use crate::error::PP1Error;
use bytes::Bytes;
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;
use zerocopy::byteorder::{big_endian, little_endian};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// A response payload with a fixed layout.
pub trait Response: Sized {
    const COMMAND: CommandId;

    fn decode_payload(payload: &[u8]) -> Result<Self, PP1Error>;
}

/// Checks the echoed id of a raw response and decodes its payload as `R`.
pub fn decode<R: Response>(response: Bytes) -> Result<R, PP1Error> {
    let frame = ResponseFrame::parse(R::COMMAND, response)?;
    R::decode_payload(&frame.payload)
}

fn read_raw<T: FromBytes + KnownLayout + Immutable>(command: CommandId, payload: &[u8]) -> Result<T, PP1Error> {
    T::read_from_prefix(payload)
        .map(|(raw, _rest)| raw)
        .map_err(|_| PP1Error::InsufficientData {
            command,
            expected: COMMAND_HEADER_SIZE + std::mem::size_of::<T>(),
            actual: COMMAND_HEADER_SIZE + payload.len(),
        })
}

fn ascii_field(bytes: &[u8]) -> String {
    let text: Vec<u8> = bytes.iter().copied().filter(|&b| b != 0).collect();
    String::from_utf8_lossy(&text).into_owned()
}

// --- Machine info ---

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct MachineInfoRaw {
    pub software_version: big_endian::U16, // 0..2, hundredths
    pub serial_number: [u8; 9],            // 2..11, ASCII
    pub reserved0: [u8; 5],
    pub mac_address: [u8; 6], // 16..22
    pub reserved1: [u8; 2],
    pub bluetooth_version: big_endian::U16, // 24..26
    pub reserved2: [u8; 3],
    pub max_width: little_endian::U16,  // 29..31, 0.1 mm
    pub max_height: little_endian::U16, // 31..33, 0.1 mm
    pub reserved3: [u8; 2],
    pub software_revision: u8, // 35
    pub reserved4: [u8; 3],
    pub model_code: [u8; 11], // 39..50, ASCII
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineInfo {
    pub serial_number: String,
    pub model_number: String,
    pub software_version: String,
    pub bluetooth_version: u16,
    /// Hoop width in 0.1 mm
    pub max_width: u16,
    /// Hoop height in 0.1 mm
    pub max_height: u16,
    pub mac_address: String,
}

impl From<MachineInfoRaw> for MachineInfo {
    fn from(raw: MachineInfoRaw) -> Self {
        let software_version = format!(
            "{:.2}.{}",
            f64::from(raw.software_version.get()) / 100.0,
            raw.software_revision
        );
        let mac_address = raw
            .mac_address
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");

        MachineInfo {
            serial_number: ascii_field(&raw.serial_number),
            model_number: ascii_field(&raw.model_code),
            software_version,
            bluetooth_version: raw.bluetooth_version.get(),
            max_width: raw.max_width.get(),
            max_height: raw.max_height.get(),
            mac_address,
        }
    }
}

impl Response for MachineInfo {
    const COMMAND: CommandId = CommandId::MachineInfo;

    fn decode_payload(payload: &[u8]) -> Result<Self, PP1Error> {
        read_raw::<MachineInfoRaw>(Self::COMMAND, payload).map(MachineInfo::from)
    }
}

impl fmt::Display for MachineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model: {}, Serial: {}, SW: {}, BT: {}, Hoop: {:.1} x {:.1} mm, MAC: {}",
            self.model_number,
            self.serial_number,
            self.software_version,
            self.bluetooth_version,
            f64::from(self.max_width) / 10.0,
            f64::from(self.max_height) / 10.0,
            self.mac_address
        )
    }
}

// --- Machine state ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive, Serialize)]
#[repr(u8)]
pub enum MachineStatus {
    Initial = 0x00,
    LowerThread = 0x01,
    Idle = 0x10,
    SewingWait = 0x11,
    SewingDataReceive = 0x12,
    MaskTraceLockWait = 0x20,
    MaskTracing = 0x21,
    MaskTraceComplete = 0x22,
    Sewing = 0x30,
    SewingComplete = 0x31,
    SewingInterruption = 0x32,
    ColorChangeWait = 0x40,
    Pause = 0x41,
    Stop = 0x42,
    HoopAvoidance = 0x50,
    HoopAvoidanceInProgress = 0x51,
    RlReceiving = 0x60,
    RlReceived = 0x61,
    TryConnecting = 0xFF,
    // Kept last so the catch-all's implicit discriminant (0xDE) stays unused.
    None = 0xDD,

    #[num_enum(catch_all)]
    Unknown(u8),
}

impl MachineStatus {
    pub fn name(&self) -> String {
        let name = match self {
            MachineStatus::Initial => "Initializing",
            MachineStatus::LowerThread => "Lower thread",
            MachineStatus::Idle => "Idle",
            MachineStatus::SewingWait => "Ready to sew",
            MachineStatus::SewingDataReceive => "Receiving data",
            MachineStatus::MaskTraceLockWait => "Waiting for mask trace",
            MachineStatus::MaskTracing => "Mask tracing",
            MachineStatus::MaskTraceComplete => "Mask trace complete",
            MachineStatus::Sewing => "Sewing",
            MachineStatus::SewingComplete => "Complete",
            MachineStatus::SewingInterruption => "Interrupted",
            MachineStatus::ColorChangeWait => "Waiting for color change",
            MachineStatus::Pause => "Paused",
            MachineStatus::Stop => "Stopped",
            MachineStatus::HoopAvoidance => "Hoop avoidance",
            MachineStatus::HoopAvoidanceInProgress => "Hoop avoidance in progress",
            MachineStatus::RlReceiving => "RL receiving",
            MachineStatus::RlReceived => "RL received",
            MachineStatus::None => "None",
            MachineStatus::TryConnecting => "Connecting",
            MachineStatus::Unknown(code) => return format!("Unknown ({code:#04x})"),
        };
        name.to_string()
    }

    pub fn can_upload_pattern(&self) -> bool {
        matches!(
            self,
            MachineStatus::Idle
                | MachineStatus::SewingWait
                | MachineStatus::MaskTraceComplete
                | MachineStatus::SewingComplete
        )
    }

    pub fn can_start_mask_trace(&self) -> bool {
        matches!(
            self,
            MachineStatus::Idle | MachineStatus::SewingWait | MachineStatus::MaskTraceComplete
        )
    }

    pub fn can_start_sewing(&self) -> bool {
        matches!(self, MachineStatus::SewingWait | MachineStatus::MaskTraceComplete)
    }

    pub fn can_resume_sewing(&self) -> bool {
        matches!(
            self,
            MachineStatus::Pause | MachineStatus::Stop | MachineStatus::SewingInterruption
        )
    }

    /// Whether the machine is in the middle of something a disconnect would interrupt.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            MachineStatus::SewingDataReceive
                | MachineStatus::MaskTracing
                | MachineStatus::Sewing
                | MachineStatus::HoopAvoidanceInProgress
        )
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct MachineStateRaw {
    pub status: u8,
    pub reserved: u8,
    pub error: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MachineState {
    pub status: MachineStatus,
    pub error: u8,
}

impl Response for MachineState {
    const COMMAND: CommandId = CommandId::MachineState;

    fn decode_payload(payload: &[u8]) -> Result<Self, PP1Error> {
        let raw = read_raw::<MachineStateRaw>(Self::COMMAND, payload)?;
        Ok(MachineState {
            status: MachineStatus::from_primitive(raw.status),
            error: raw.error,
        })
    }
}

// --- Pattern info ---

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PatternInfoRaw {
    pub bound_left: little_endian::I16,
    pub bound_top: little_endian::I16,
    pub bound_right: little_endian::I16,
    pub bound_bottom: little_endian::I16,
    pub total_time: little_endian::U16,
    pub total_stitches: little_endian::U16,
    pub speed: little_endian::U16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternInfo {
    pub bound_left: i16,
    pub bound_top: i16,
    pub bound_right: i16,
    pub bound_bottom: i16,
    pub total_time: u16,
    pub total_stitches: u16,
    pub speed: u16,
}

impl From<PatternInfoRaw> for PatternInfo {
    fn from(raw: PatternInfoRaw) -> Self {
        PatternInfo {
            bound_left: raw.bound_left.get(),
            bound_top: raw.bound_top.get(),
            bound_right: raw.bound_right.get(),
            bound_bottom: raw.bound_bottom.get(),
            total_time: raw.total_time.get(),
            total_stitches: raw.total_stitches.get(),
            speed: raw.speed.get(),
        }
    }
}

impl Response for PatternInfo {
    const COMMAND: CommandId = CommandId::EmbSewingInfoRequest;

    fn decode_payload(payload: &[u8]) -> Result<Self, PP1Error> {
        read_raw::<PatternInfoRaw>(Self::COMMAND, payload).map(PatternInfo::from)
    }
}

// --- Sewing progress ---

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SewingProgressRaw {
    pub current_stitch: little_endian::U16,
    pub current_time: little_endian::I16,
    pub stop_time: little_endian::I16,
    pub position_x: little_endian::I16,
    pub position_y: little_endian::I16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SewingProgress {
    pub current_stitch: u16,
    pub current_time: i16,
    pub stop_time: i16,
    pub position_x: i16,
    pub position_y: i16,
}

impl From<SewingProgressRaw> for SewingProgress {
    fn from(raw: SewingProgressRaw) -> Self {
        SewingProgress {
            current_stitch: raw.current_stitch.get(),
            current_time: raw.current_time.get(),
            stop_time: raw.stop_time.get(),
            position_x: raw.position_x.get(),
            position_y: raw.position_y.get(),
        }
    }
}

impl Response for SewingProgress {
    const COMMAND: CommandId = CommandId::PatternSewingInfo;

    fn decode_payload(payload: &[u8]) -> Result<Self, PP1Error> {
        read_raw::<SewingProgressRaw>(Self::COMMAND, payload).map(SewingProgress::from)
    }
}

// --- Pattern UUID ---

/// Identifier of the pattern loaded on the machine; `None` when the machine
/// reports nothing (short or all-zero answer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedPattern(pub Option<Uuid>);

impl Response for LoadedPattern {
    const COMMAND: CommandId = CommandId::PatternUuidRequest;

    fn decode_payload(payload: &[u8]) -> Result<Self, PP1Error> {
        let Ok((raw, _)) = <[u8; 16]>::read_from_prefix(payload) else {
            return Ok(LoadedPattern(None));
        };
        if raw.iter().all(|&b| b == 0) {
            return Ok(LoadedPattern(None));
        }
        Ok(LoadedPattern(Some(Uuid::from_bytes(raw))))
    }
}

// --- Request payloads ---

/// SendDataInfo payload announcing an upload.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DataInfoRaw {
    pub data_type: u8,
    pub length: little_endian::U32,
    pub checksum: little_endian::U16,
}

/// LayoutSend payload placing the pattern in the hoop.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct LayoutRaw {
    pub move_x: little_endian::I16,
    pub move_y: little_endian::I16,
    pub size_x: little_endian::I16,
    pub size_y: little_endian::I16,
    pub rotate: little_endian::I16,
    pub flip: u8,
    pub frame: u8,
}
