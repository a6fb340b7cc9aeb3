//! # fitcheck_devices: Accelerator specs and logging for fitcheck
//!
//! The fitcheck_devices crate is a workspace member of the fitcheck project.
//! It is used as a dependency by the `fitcheck_models` crate for fit decisions
//! and by the `fitcheck` crate for hardware lookup.
//!
//! ## Features
//!
//! * `HardwareSpec`: total memory, reserved overhead, and the derived usable memory of one accelerator
//! * A static registry of common accelerators addressable by name or alias ("3090", "a100-80gb", "h100")
//! * Logging tools

// Internal modules
mod hardware;
mod logging;

// Internal imports
#[allow(unused_imports)]
use anyhow::{anyhow, bail, Error, Result};
#[allow(unused_imports)]
use tracing::{debug, error, info, span, trace, warn, Level};

// Public exports
pub use self::{
    hardware::{
        bytes_to_gib, gib,
        registry::{HardwareEntry, HardwareRegistry},
        HardwareError, HardwareSpec, BYTES_PER_GIB,
    },
    logging::{i_nlns, LoggingConfig, LoggingConfigTrait},
};
