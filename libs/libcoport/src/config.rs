//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size in bytes of one stored message reference.
///
/// Ring capacity is derived from the configured buffer size divided by this.
pub const REFERENCE_SIZE: usize = 16;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoportConfig {
    /// Port table capacities
    #[serde(default)]
    pub table: TableConfig,

    /// Buffer sizing for the transfer disciplines
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Notifier pool settings
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Per-kind port table capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Maximum number of ring-of-handles ports
    #[serde(default = "default_port_capacity")]
    pub ring_ports: usize,

    /// Maximum number of rendezvous ports
    #[serde(default = "default_port_capacity")]
    pub rendezvous_ports: usize,

    /// Maximum number of byte-stream ports
    #[serde(default = "default_port_capacity")]
    pub stream_ports: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            ring_ports: default_port_capacity(),
            rendezvous_ports: default_port_capacity(),
            stream_ports: default_port_capacity(),
        }
    }
}

/// Transfer buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Bytes reserved for each ring's reference array
    #[serde(default = "default_buffer_bytes")]
    pub ring_buffer_bytes: usize,

    /// Largest payload accepted by ring and rendezvous sends
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Bytes of buffering per byte-stream port
    #[serde(default = "default_buffer_bytes")]
    pub stream_buffer_bytes: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ring_buffer_bytes: default_buffer_bytes(),
            max_message_size: default_max_message_size(),
            stream_buffer_bytes: default_buffer_bytes(),
        }
    }
}

impl TransferConfig {
    /// Number of message slots in each ring
    pub fn ring_capacity(&self) -> usize {
        self.ring_buffer_bytes / REFERENCE_SIZE
    }
}

/// Notifier pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Number of notifier worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded queue depth per worker
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

// Default value functions
fn default_port_capacity() -> usize {
    64
}

fn default_buffer_bytes() -> usize {
    4096
}

fn default_max_message_size() -> usize {
    4096
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

impl CoportConfig {
    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let table = &self.table;
        if table.ring_ports == 0 || table.rendezvous_ports == 0 || table.stream_ports == 0 {
            anyhow::bail!("port table capacities must be non-zero");
        }
        // Slot indices travel in a u32
        let largest = table.ring_ports.max(table.rendezvous_ports).max(table.stream_ports);
        if largest > u32::MAX as usize {
            anyhow::bail!("port table capacity {} exceeds u32 range", largest);
        }
        if self.transfer.ring_capacity() == 0 {
            anyhow::bail!(
                "ring_buffer_bytes must hold at least one {}-byte reference",
                REFERENCE_SIZE
            );
        }
        if self.transfer.max_message_size == 0 {
            anyhow::bail!("max_message_size must be non-zero");
        }
        if self.transfer.stream_buffer_bytes == 0 {
            anyhow::bail!("stream_buffer_bytes must be non-zero");
        }
        if self.notifier.workers == 0 || self.notifier.queue_depth == 0 {
            anyhow::bail!("notifier workers and queue_depth must be non-zero");
        }
        Ok(())
    }
}
