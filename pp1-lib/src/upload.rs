//! The pattern upload sequence.
//!
//! An upload is five strictly ordered steps, each depending on the previous
//! one having been accepted:
//!
//! 1. delete whatever pattern the machine holds,
//! 2. announce the total length and a 16-bit additive checksum,
//! 3. transfer the data in chunks, each with its offset and an 8-bit checksum,
//! 4. assign the pattern a fresh random 128-bit id,
//! 5. send the layout (placement in the hoop).
//!
//! The first failure ends the upload and is reported with its step. Nothing is
//! rolled back: a half-transferred pattern stays on the machine until it is
//! explicitly deleted.

use crate::command::{CommandId, ResponseFrame};
use crate::constants::{DATA_TYPE_EMBROIDERY, MAX_CHUNK_SIZE, RESPONSE_CONTINUE, RESPONSE_OK};
use crate::error::{PP1Error, UploadStep};
use crate::queue::CommandQueue;
use crate::response::{DataInfoRaw, LayoutRaw};
use bytes::{BufMut, BytesMut};
use rand::RngCore;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;
use zerocopy::IntoBytes;
use zerocopy::byteorder::little_endian::{I16, U16, U32};

/// Sum of all bytes modulo 2^16, sent with the announcement.
pub fn checksum16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Sum of all bytes modulo 256, appended to every chunk.
pub fn checksum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Placement of the pattern in the hoop, sent as the last upload step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout {
    pub move_x: i16,
    pub move_y: i16,
    pub size_x: i16,
    pub size_y: i16,
    pub rotate: i16,
    pub flip: u8,
    pub frame: u8,
}

impl Layout {
    pub fn to_payload(&self) -> [u8; 12] {
        let raw = LayoutRaw {
            move_x: I16::new(self.move_x),
            move_y: I16::new(self.move_y),
            size_x: I16::new(self.size_x),
            size_y: I16::new(self.size_y),
            rotate: I16::new(self.rotate),
            flip: self.flip,
            frame: self.frame,
        };
        let mut payload = [0u8; 12];
        payload.copy_from_slice(raw.as_bytes());
        payload
    }
}

/// SendDataInfo payload for a buffer.
pub fn data_info_payload(data: &[u8]) -> Result<[u8; 7], PP1Error> {
    let length = u32::try_from(data.len())
        .map_err(|_| PP1Error::Config(format!("pattern of {} bytes is too large", data.len())))?;
    let raw = DataInfoRaw {
        data_type: DATA_TYPE_EMBROIDERY,
        length: U32::new(length),
        checksum: U16::new(checksum16(data)),
    };
    let mut payload = [0u8; 7];
    payload.copy_from_slice(raw.as_bytes());
    Ok(payload)
}

/// SendData payload: offset, chunk bytes, chunk checksum.
pub fn chunk_payload(offset: usize, chunk: &[u8]) -> Vec<u8> {
    let mut payload = BytesMut::with_capacity(4 + chunk.len() + 1);
    payload.put_u32_le(offset as u32);
    payload.put_slice(chunk);
    payload.put_u8(checksum8(chunk));
    payload.to_vec()
}

/// Drives the upload steps over a [`CommandQueue`].
pub struct PatternUploader<'a> {
    queue: &'a CommandQueue,
    chunk_size: usize,
    chunk_delay: Duration,
    layout: Layout,
}

impl<'a> PatternUploader<'a> {
    pub fn new(queue: &'a CommandQueue) -> Self {
        Self {
            queue,
            chunk_size: MAX_CHUNK_SIZE,
            chunk_delay: Duration::ZERO,
            layout: Layout::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn with_chunk_delay(mut self, chunk_delay: Duration) -> Self {
        self.chunk_delay = chunk_delay;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Uploads PEN data and returns the id the pattern was registered under.
    ///
    /// `on_progress` receives the percentage of bytes sent after every chunk;
    /// it never decreases and is exactly 100.0 once the machine reports the
    /// transfer complete.
    pub async fn upload<R, F>(&self, data: &[u8], rng: &mut R, mut on_progress: F) -> Result<Uuid, PP1Error>
    where
        R: RngCore,
        F: FnMut(f64),
    {
        if data.is_empty() {
            return Err(PP1Error::EmptyPattern);
        }
        info!(bytes = data.len(), "Starting pattern upload");

        self.delete().await.map_err(|e| e.at_step(UploadStep::Delete))?;
        self.announce(data).await.map_err(|e| e.at_step(UploadStep::Announce))?;
        self.transfer(data, &mut on_progress)
            .await
            .map_err(|e| e.at_step(UploadStep::Transfer))?;

        let mut id = [0u8; 16];
        rng.fill_bytes(&mut id);
        let uuid = Uuid::from_bytes(id);
        self.identify(uuid).await.map_err(|e| e.at_step(UploadStep::Identify))?;

        self.send_layout().await.map_err(|e| e.at_step(UploadStep::Layout))?;

        info!(%uuid, "Pattern uploaded");
        Ok(uuid)
    }

    async fn request(&self, command: CommandId, payload: &[u8]) -> Result<ResponseFrame, PP1Error> {
        let response = self.queue.enqueue(command, payload).await?;
        ResponseFrame::parse(command, response)
    }

    async fn delete(&self) -> Result<(), PP1Error> {
        debug!("Deleting existing pattern");
        self.request(CommandId::EmbSewingDataDelete, &[]).await?;
        Ok(())
    }

    async fn announce(&self, data: &[u8]) -> Result<(), PP1Error> {
        let payload = data_info_payload(data)?;
        debug!(length = data.len(), checksum = checksum16(data), "Announcing pattern");
        let code = self.request(CommandId::SendDataInfo, &payload).await?.status_code()?;
        if code != RESPONSE_OK {
            return Err(PP1Error::UploadRejected {
                step: UploadStep::Announce,
                code,
            });
        }
        Ok(())
    }

    async fn transfer<F: FnMut(f64)>(&self, data: &[u8], on_progress: &mut F) -> Result<(), PP1Error> {
        let total = data.len();
        let mut offset = 0;

        for chunk in data.chunks(self.chunk_size) {
            let payload = chunk_payload(offset, chunk);
            let code = self.request(CommandId::SendData, &payload).await?.status_code()?;
            offset += chunk.len();

            match code {
                RESPONSE_OK => {
                    if offset < total {
                        debug!(offset, total, "Machine reported the transfer complete early");
                    }
                    on_progress(100.0);
                    return Ok(());
                }
                RESPONSE_CONTINUE if offset < total => {
                    on_progress(offset as f64 / total as f64 * 100.0);
                    debug!(offset, total, "Chunk accepted");
                }
                RESPONSE_CONTINUE => break,
                code => {
                    return Err(PP1Error::UploadRejected {
                        step: UploadStep::Transfer,
                        code,
                    });
                }
            }

            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        Err(PP1Error::TransferIncomplete { sent: offset, total })
    }

    async fn identify(&self, uuid: Uuid) -> Result<(), PP1Error> {
        debug!(%uuid, "Assigning pattern id");
        let code = self
            .request(CommandId::EmbUuidSend, uuid.as_bytes())
            .await?
            .status_code()?;
        if code != RESPONSE_OK {
            return Err(PP1Error::UploadRejected {
                step: UploadStep::Identify,
                code,
            });
        }
        Ok(())
    }

    async fn send_layout(&self) -> Result<(), PP1Error> {
        debug!(layout = ?self.layout, "Sending layout");
        self.request(CommandId::LayoutSend, &self.layout.to_payload()).await?;
        Ok(())
    }
}
