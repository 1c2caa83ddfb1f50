//! An in-memory stand-in for a PP1 machine.
//!
//! [`SimulatedMachine`] answers the documented command surface the way the
//! real machine does over BLE: every write prepares the response the next
//! read returns. It checks both upload checksums, keeps the received pattern,
//! and can be told to reject steps, which makes it useful for exercising the
//! upload sequence without hardware. Clones share the same machine, so a test
//! can keep one handle while the queue owns another.

use crate::command::CommandId;
use crate::constants::{COMMAND_HEADER_SIZE, RESPONSE_CONTINUE, RESPONSE_OK};
use crate::error::PP1Error;
use crate::pen::{XFlag, decode_pen};
use crate::queue::Transport;
use crate::response::{MachineInfoRaw, MachineStatus, PatternInfoRaw, SewingProgressRaw};
use crate::upload::{checksum8, checksum16};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;
use zerocopy::byteorder::{big_endian, little_endian};
use zerocopy::{FromZeros, IntoBytes};

/// Response code the simulator uses for a refused chunk.
pub const RESPONSE_CHECKSUM_ERROR: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub serial_number: String,
    pub model_code: String,
    pub software_version: u16,
    pub software_revision: u8,
    pub bluetooth_version: u16,
    pub mac_address: [u8; 6],
    pub max_width: u16,
    pub max_height: u16,
}

impl Default for MachineIdentity {
    fn default() -> Self {
        Self {
            serial_number: "SIM000001".to_string(),
            model_code: "PP1".to_string(),
            software_version: 100,
            software_revision: 0,
            bluetooth_version: 5,
            mac_address: [0x00, 0x80, 0x92, 0x12, 0x34, 0x56],
            max_width: 1000,
            max_height: 1000,
        }
    }
}

/// Fault injection knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Code returned to SendDataInfo instead of 0x00
    pub reject_announce: Option<u8>,
    /// Code returned to EmbUuidSend instead of 0x00
    pub reject_uuid: Option<u8>,
    /// Report the transfer complete once this many bytes have arrived
    pub complete_at: Option<usize>,
    /// Never report the transfer complete
    pub never_complete: bool,
    /// Fail reads of responses to this command
    pub fail_read: Option<CommandId>,
}

#[derive(Debug, Default)]
struct MachineModel {
    identity: MachineIdentity,
    faults: Faults,
    status: u8,
    error: u8,
    announced: Option<(usize, u16)>,
    received: Vec<u8>,
    pattern: Option<Vec<u8>>,
    uuid: Option<[u8; 16]>,
    layout: Option<Vec<u8>>,
    current_stitch: u16,
    writes: Vec<Bytes>,
    last_command: Option<u16>,
    last_response: Option<Bytes>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedMachine {
    model: Arc<Mutex<MachineModel>>,
}

impl SimulatedMachine {
    pub fn new(identity: MachineIdentity) -> Self {
        let model = MachineModel {
            identity,
            status: MachineStatus::Idle.into(),
            ..Default::default()
        };
        Self {
            model: Arc::new(Mutex::new(model)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MachineModel> {
        self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    pub fn set_status(&self, status: MachineStatus) {
        self.lock().status = status.into();
    }

    pub fn set_current_stitch(&self, stitch: u16) {
        self.lock().current_stitch = stitch;
    }

    /// Every frame written so far, in order.
    pub fn writes(&self) -> Vec<Bytes> {
        self.lock().writes.clone()
    }

    /// Command ids of every frame written so far.
    pub fn commands(&self) -> Vec<u16> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.len() >= COMMAND_HEADER_SIZE)
            .map(|w| u16::from_be_bytes([w[0], w[1]]))
            .collect()
    }

    /// The completely received pattern, if any.
    pub fn pattern(&self) -> Option<Vec<u8>> {
        self.lock().pattern.clone()
    }

    /// Bytes received by the transfer in progress (or the last one).
    pub fn received(&self) -> Vec<u8> {
        self.lock().received.clone()
    }

    pub fn uuid(&self) -> Option<[u8; 16]> {
        self.lock().uuid
    }

    pub fn layout(&self) -> Option<Vec<u8>> {
        self.lock().layout.clone()
    }
}

impl MachineModel {
    fn respond(&mut self, command: u16, payload: &[u8]) -> Vec<u8> {
        let Ok(command) = CommandId::try_from(command) else {
            return vec![RESPONSE_OK];
        };
        match command {
            CommandId::MachineInfo => self.machine_info(),
            CommandId::MachineState => vec![self.status, 0x00, self.error],
            CommandId::EmbSewingDataDelete => {
                self.pattern = None;
                self.uuid = None;
                self.received.clear();
                self.announced = None;
                self.status = MachineStatus::Idle.into();
                vec![RESPONSE_OK]
            }
            CommandId::SendDataInfo => self.announce(payload),
            CommandId::SendData => vec![self.receive_chunk(payload)],
            CommandId::EmbUuidSend => match self.faults.reject_uuid {
                Some(code) => vec![code],
                None => {
                    let mut uuid = [0u8; 16];
                    let n = payload.len().min(16);
                    uuid[..n].copy_from_slice(&payload[..n]);
                    self.uuid = Some(uuid);
                    vec![RESPONSE_OK]
                }
            },
            CommandId::PatternUuidRequest => self.uuid.unwrap_or_default().to_vec(),
            CommandId::LayoutSend => {
                self.layout = Some(payload.to_vec());
                if self.pattern.is_some() {
                    self.status = MachineStatus::SewingWait.into();
                }
                vec![RESPONSE_OK]
            }
            CommandId::EmbSewingInfoRequest => self.pattern_info(),
            CommandId::PatternSewingInfo => self.sewing_progress(),
            CommandId::MaskTrace => {
                self.status = MachineStatus::MaskTraceComplete.into();
                vec![RESPONSE_OK]
            }
            CommandId::StartSewing => {
                self.status = MachineStatus::Sewing.into();
                vec![RESPONSE_OK]
            }
            CommandId::ClearError => {
                self.error = 0;
                vec![RESPONSE_OK]
            }
            _ => vec![RESPONSE_OK],
        }
    }

    fn machine_info(&self) -> Vec<u8> {
        let id = &self.identity;
        let mut raw = MachineInfoRaw::new_zeroed();
        raw.software_version = big_endian::U16::new(id.software_version);
        copy_ascii(&mut raw.serial_number, &id.serial_number);
        raw.mac_address = id.mac_address;
        raw.bluetooth_version = big_endian::U16::new(id.bluetooth_version);
        raw.max_width = little_endian::U16::new(id.max_width);
        raw.max_height = little_endian::U16::new(id.max_height);
        raw.software_revision = id.software_revision;
        copy_ascii(&mut raw.model_code, &id.model_code);
        raw.as_bytes().to_vec()
    }

    fn announce(&mut self, payload: &[u8]) -> Vec<u8> {
        if let Some(code) = self.faults.reject_announce {
            return vec![code];
        }
        if payload.len() < 7 {
            return vec![RESPONSE_CHECKSUM_ERROR];
        }
        let length = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]) as usize;
        let checksum = u16::from_le_bytes([payload[5], payload[6]]);
        self.announced = Some((length, checksum));
        self.received.clear();
        self.pattern = None;
        self.status = MachineStatus::SewingDataReceive.into();
        vec![RESPONSE_OK]
    }

    fn receive_chunk(&mut self, payload: &[u8]) -> u8 {
        let Some((length, checksum)) = self.announced else {
            return RESPONSE_CHECKSUM_ERROR;
        };
        if payload.len() < 5 {
            return RESPONSE_CHECKSUM_ERROR;
        }
        let offset = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        let (data, sum) = payload[4..].split_at(payload.len() - 5);
        if offset != self.received.len() || checksum8(data) != sum[0] {
            return RESPONSE_CHECKSUM_ERROR;
        }
        self.received.extend_from_slice(data);

        let complete = self.received.len() >= length || self.faults.complete_at.is_some_and(|n| self.received.len() >= n);
        if self.faults.never_complete || !complete {
            return RESPONSE_CONTINUE;
        }
        if self.received.len() >= length && checksum16(&self.received) != checksum {
            return RESPONSE_CHECKSUM_ERROR;
        }
        self.pattern = Some(self.received.clone());
        self.status = MachineStatus::Idle.into();
        RESPONSE_OK
    }

    fn pattern_info(&self) -> Vec<u8> {
        let mut raw = PatternInfoRaw::new_zeroed();
        if let Some(records) = self.pattern.as_deref().and_then(|p| decode_pen(p).ok()) {
            let stitched: Vec<_> = records.iter().filter(|r| !r.is_feed()).collect();
            let xs = stitched.iter().map(|r| r.x_coordinate());
            let ys = stitched.iter().map(|r| r.y_coordinate());
            raw.bound_left = little_endian::I16::new(xs.clone().min().unwrap_or(0));
            raw.bound_right = little_endian::I16::new(xs.max().unwrap_or(0));
            raw.bound_top = little_endian::I16::new(ys.clone().min().unwrap_or(0));
            raw.bound_bottom = little_endian::I16::new(ys.max().unwrap_or(0));
            let colors = records.iter().filter(|r| r.x_flag() == XFlag::ColorEnd).count() + 1;
            let minutes = (records.len() as u64 * 150 + colors as u64 * 3000).div_ceil(60_000);
            raw.total_time = little_endian::U16::new(minutes.min(u64::from(u16::MAX)) as u16);
            raw.total_stitches = little_endian::U16::new(records.len().min(usize::from(u16::MAX)) as u16);
            raw.speed = little_endian::U16::new(400);
        }
        raw.as_bytes().to_vec()
    }

    fn sewing_progress(&self) -> Vec<u8> {
        let mut raw = SewingProgressRaw::new_zeroed();
        raw.current_stitch = little_endian::U16::new(self.current_stitch);
        raw.as_bytes().to_vec()
    }
}

fn copy_ascii(field: &mut [u8], text: &str) {
    let n = text.len().min(field.len());
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
}

#[async_trait]
impl Transport for SimulatedMachine {
    async fn write_command(&mut self, frame: &[u8]) -> Result<(), PP1Error> {
        let mut model = self.lock();
        model.writes.push(Bytes::copy_from_slice(frame));
        if frame.len() < COMMAND_HEADER_SIZE {
            model.last_command = None;
            model.last_response = None;
            return Ok(());
        }
        let command = u16::from_be_bytes([frame[0], frame[1]]);
        let payload = model.respond(command, &frame[COMMAND_HEADER_SIZE..]);

        let mut response = BytesMut::with_capacity(COMMAND_HEADER_SIZE + payload.len());
        response.put_u16(command);
        response.put_slice(&payload);
        trace!(command, bytes = hex::encode(&response), "Simulated response");
        model.last_command = Some(command);
        model.last_response = Some(response.freeze());
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Bytes, PP1Error> {
        let model = self.lock();
        if let (Some(failing), Some(last)) = (model.faults.fail_read, model.last_command) {
            if u16::from(failing) == last {
                return Err(PP1Error::Transport("simulated read failure".to_string()));
            }
        }
        model
            .last_response
            .clone()
            .ok_or_else(|| PP1Error::Transport("no response available".to_string()))
    }
}
