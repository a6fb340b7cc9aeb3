use serde::{Deserialize, Serialize};

pub mod registry;

pub const BYTES_PER_GIB: u64 = 1_073_741_824;

/// Converts a GiB amount into bytes, rounding to the nearest byte.
pub fn gib(amount: f64) -> u64 {
    (amount * BYTES_PER_GIB as f64).round() as u64
}

pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB as f64
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HardwareError {
    #[error("unknown GPU '{name}'. Available: {}", available.join(", "))]
    NotFound {
        name: String,
        available: Vec<String>,
    },

    #[error(
        "hardware '{name}' has no usable memory: reserved {reserved_bytes} B >= total {total_bytes} B"
    )]
    NonPositiveUsable {
        name: String,
        total_bytes: u64,
        reserved_bytes: u64,
    },
}

/// One accelerator as the estimator sees it.
///
/// `reserved_bytes` covers the driver, the CUDA context, and the allocator's
/// fragmentation allowance. Everything else is usable by the training process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareSpec {
    name: String,
    total_bytes: u64,
    reserved_bytes: u64,
}

impl HardwareSpec {
    pub fn new(
        name: impl Into<String>,
        total_bytes: u64,
        reserved_bytes: u64,
    ) -> Result<Self, HardwareError> {
        let name = name.into();
        if reserved_bytes >= total_bytes {
            return Err(HardwareError::NonPositiveUsable {
                name,
                total_bytes,
                reserved_bytes,
            });
        }
        Ok(Self {
            name,
            total_bytes,
            reserved_bytes,
        })
    }

    /// Same as [`HardwareSpec::new`] with both amounts given in GiB.
    pub fn from_gib(
        name: impl Into<String>,
        total_gib: f64,
        reserved_gib: f64,
    ) -> Result<Self, HardwareError> {
        Self::new(name, gib(total_gib), gib(reserved_gib))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }

    /// `total - reserved`. Always > 0.
    pub fn usable_bytes(&self) -> u64 {
        self.total_bytes - self.reserved_bytes
    }
}

impl std::fmt::Display for HardwareSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "HardwareSpec:")?;
        crate::i_nlns(
            f,
            &[
                format_args!("Name: {}", self.name),
                format_args!("Total VRAM: {:.1} GB", bytes_to_gib(self.total_bytes)),
                format_args!("Overhead: {:.1} GB", bytes_to_gib(self.reserved_bytes)),
                format_args!("Usable VRAM: {:.1} GB", bytes_to_gib(self.usable_bytes())),
            ],
        )
    }
}
