use crate::command::{CommandId, ResponseFrame};
use crate::config::SessionConfig;
use crate::constants::MASK_TRACE_START;
use crate::error::PP1Error;
use crate::queue::{CommandQueue, Transport};
use crate::response::{self, LoadedPattern, MachineInfo, MachineState, PatternInfo, Response, SewingProgress};
use crate::upload::{Layout, PatternUploader};
use rand::RngCore;
use tracing::info;
use uuid::Uuid;

/// A session with a Brother PP1 machine.
///
/// Every operation goes through one [`CommandQueue`], so the methods can be
/// called concurrently from several tasks (`PP1` is cheap to clone) without
/// their exchanges interleaving on the link.
#[derive(Clone)]
pub struct PP1 {
    queue: CommandQueue,
    config: SessionConfig,
}

impl PP1 {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            queue: CommandQueue::new(config.settle_interval()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Starts using a connected transport. Must be called inside a tokio runtime.
    pub fn connect<T: Transport>(&self, transport: T) {
        self.queue.attach(transport);
    }

    /// Fails every command still waiting with `Disconnected` and drops the transport.
    pub fn disconnect(&self) {
        self.queue.detach();
    }

    pub fn is_connected(&self) -> bool {
        self.queue.is_connected()
    }

    async fn read<R: Response>(&self) -> Result<R, PP1Error> {
        let raw = self.queue.enqueue(R::COMMAND, &[]).await?;
        response::decode::<R>(raw)
    }

    async fn send(&self, command: CommandId, payload: &[u8]) -> Result<ResponseFrame, PP1Error> {
        let raw = self.queue.enqueue(command, payload).await?;
        ResponseFrame::parse(command, raw)
    }

    pub async fn get_machine_info(&self) -> Result<MachineInfo, PP1Error> {
        self.read().await
    }

    pub async fn get_machine_state(&self) -> Result<MachineState, PP1Error> {
        self.read().await
    }

    pub async fn get_pattern_info(&self) -> Result<PatternInfo, PP1Error> {
        self.read().await
    }

    pub async fn get_sewing_progress(&self) -> Result<SewingProgress, PP1Error> {
        self.read().await
    }

    /// Id of the pattern on the machine, `None` if it holds none.
    pub async fn get_pattern_uuid(&self) -> Result<Option<Uuid>, PP1Error> {
        let LoadedPattern(uuid) = self.read().await?;
        Ok(uuid)
    }

    pub async fn delete_design(&self) -> Result<(), PP1Error> {
        info!("Deleting pattern");
        self.send(CommandId::EmbSewingDataDelete, &[]).await?;
        Ok(())
    }

    pub async fn start_sewing(&self) -> Result<(), PP1Error> {
        info!("Starting sewing");
        self.send(CommandId::StartSewing, &[]).await?;
        Ok(())
    }

    /// Resumes an interrupted pattern. The machine keeps its position, so this
    /// sends the same command as [`PP1::start_sewing`].
    pub async fn resume_sewing(&self) -> Result<(), PP1Error> {
        info!("Resuming sewing");
        self.send(CommandId::StartSewing, &[]).await?;
        Ok(())
    }

    pub async fn start_mask_trace(&self) -> Result<(), PP1Error> {
        info!("Starting mask trace");
        self.send(CommandId::MaskTrace, &[MASK_TRACE_START]).await?;
        Ok(())
    }

    pub async fn clear_error(&self) -> Result<(), PP1Error> {
        info!("Clearing machine error");
        self.send(CommandId::ClearError, &[]).await?;
        Ok(())
    }

    pub async fn send_layout(&self, layout: &Layout) -> Result<(), PP1Error> {
        self.send(CommandId::LayoutSend, &layout.to_payload()).await?;
        Ok(())
    }

    /// Uploads PEN data with the default (untransformed) layout.
    pub async fn upload<R, F>(&self, data: &[u8], rng: &mut R, on_progress: F) -> Result<Uuid, PP1Error>
    where
        R: RngCore,
        F: FnMut(f64),
    {
        self.upload_with_layout(data, Layout::default(), rng, on_progress).await
    }

    pub async fn upload_with_layout<R, F>(
        &self,
        data: &[u8],
        layout: Layout,
        rng: &mut R,
        on_progress: F,
    ) -> Result<Uuid, PP1Error>
    where
        R: RngCore,
        F: FnMut(f64),
    {
        PatternUploader::new(&self.queue)
            .with_chunk_size(self.config.chunk_size)
            .with_chunk_delay(self.config.chunk_delay())
            .with_layout(layout)
            .upload(data, rng, on_progress)
            .await
    }
}
