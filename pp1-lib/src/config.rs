use crate::constants::MAX_CHUNK_SIZE;
use crate::error::PP1Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Thread colors used for color indices the design has no thread for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette {
    colors: Vec<String>,
}

impl Palette {
    pub fn new(colors: Vec<String>) -> Result<Self, PP1Error> {
        if colors.is_empty() {
            return Err(PP1Error::Config("palette must contain at least one color".to_string()));
        }
        Ok(Self { colors })
    }

    /// Color for `index`, wrapping around the palette.
    pub fn color(&self, index: usize) -> &str {
        match self.colors.len() {
            0 => "#000000",
            len => &self.colors[index % len],
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for Palette {
    fn default() -> Self {
        let colors = [
            "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF", "#00FFFF", "#FFA500", "#800080",
        ];
        Self {
            colors: colors.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Tunables for a session with one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between writing a command and reading its response
    pub settle_interval_ms: u64,
    /// Bytes of pattern data per SendData command
    pub chunk_size: usize,
    /// Delay between two SendData commands
    pub chunk_delay_ms: u64,
    pub palette: Palette,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_interval_ms: 50,
            chunk_size: MAX_CHUNK_SIZE,
            chunk_delay_ms: 10,
            palette: Palette::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, PP1Error> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PP1Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), PP1Error> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(PP1Error::Config(format!(
                "chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.palette.is_empty() {
            return Err(PP1Error::Config("palette must contain at least one color".to_string()));
        }
        Ok(())
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}
