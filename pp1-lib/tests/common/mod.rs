//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use pp1_lib::codec::encode;
#[allow(unused_imports)]
pub use pp1_lib::command::CommandId;
#[allow(unused_imports)]
pub use pp1_lib::config::SessionConfig;
#[allow(unused_imports)]
pub use pp1_lib::error::{ErrorKind, PP1Error, UploadStep};
#[allow(unused_imports)]
pub use pp1_lib::queue::{CommandQueue, Transport};
#[allow(unused_imports)]
pub use pp1_lib::sim::{Faults, MachineIdentity, SimulatedMachine};
#[allow(unused_imports)]
pub use pp1_lib::stitch::Stitch;
#[allow(unused_imports)]
pub use pp1_lib::PP1;
#[allow(unused_imports)]
pub use rand::SeedableRng;
#[allow(unused_imports)]
pub use rand::rngs::StdRng;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// One side of an exchange as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Write(u16),
    Read(u16),
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<(Event, Instant)>,
    last_command: Option<u16>,
    failing_reads: HashSet<u16>,
    read_delay: Duration,
}

/// Transport that echoes every command with a one-byte OK payload and
/// records when each write and read happened.
#[derive(Debug, Clone, Default)]
#[allow(dead_code)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recorder>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read take this long, so overlapping exchanges would show.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().read_delay = delay;
        self
    }

    pub fn fail_reads_of(self, command: CommandId) -> Self {
        self.inner.lock().unwrap().failing_reads.insert(command.into());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.iter().map(|(e, _)| *e).collect()
    }

    pub fn timestamps(&self) -> Vec<Instant> {
        self.inner.lock().unwrap().events.iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn write_command(&mut self, frame: &[u8]) -> Result<(), PP1Error> {
        let command = u16::from_be_bytes([frame[0], frame[1]]);
        let mut recorder = self.inner.lock().unwrap();
        recorder.events.push((Event::Write(command), Instant::now()));
        recorder.last_command = Some(command);
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Bytes, PP1Error> {
        let delay = self.inner.lock().unwrap().read_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut recorder = self.inner.lock().unwrap();
        let command = recorder.last_command.expect("read before any write");
        recorder.events.push((Event::Read(command), Instant::now()));
        if recorder.failing_reads.contains(&command) {
            return Err(PP1Error::Transport("read failed".to_string()));
        }
        let mut response = command.to_be_bytes().to_vec();
        response.push(0x00);
        Ok(Bytes::from(response))
    }
}

/// Installs a subscriber once per test binary; `RUST_LOG=debug` shows every frame.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Session config without any waiting, for fast tests.
#[allow(dead_code)]
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        settle_interval_ms: 0,
        chunk_delay_ms: 0,
        ..SessionConfig::default()
    }
}

/// A connected session backed by a fresh simulated machine.
#[allow(dead_code)]
pub fn simulated_session(config: SessionConfig) -> (PP1, SimulatedMachine) {
    let machine = SimulatedMachine::new(MachineIdentity::default());
    let pp1 = PP1::new(config);
    pp1.connect(machine.clone());
    (pp1, machine)
}

/// A single-color zig-zag of `count` stitches, small enough for any hoop.
#[allow(dead_code)]
pub fn zigzag(count: usize) -> Vec<Stitch> {
    (0..count)
        .map(|i| {
            let x = (i % 100) as i32 * 5;
            let y = if i % 2 == 0 { 0 } else { 30 } + (i / 100) as i32 * 40;
            Stitch::normal(x, y, 0)
        })
        .collect()
}

/// PEN bytes for a zig-zag design.
#[allow(dead_code)]
pub fn zigzag_pen(count: usize) -> Vec<u8> {
    encode(&zigzag(count)).expect("zig-zag is in range").bytes
}
