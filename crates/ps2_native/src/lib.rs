//! # PS2 Native Data
//!
//! Instance data for PS2 geometry: per-mesh buffers holding a DMA tag chain,
//! the pass that relocates the chain's reference tags between file-relative
//! and absolute addressing, and the native-data stream format that carries
//! those buffers on disk.
//!
//! ## Features
//!
//! - **Tag chains**: bounds-checked decoding and walking of `cnt`/`ref`/`ret` tags
//! - **Fix-up**: in-place relocation with full rollback on a malformed chain
//! - **Native data**: read, write and size accounting for the stream format
//! - **Render dispatch**: program selection over lighting bits and material effects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ps2_native::prelude::*;
//! use std::fs::File;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let codec = NativeDataCodec::new(NativeDataConfig::default());
//!     let mut file = File::open("native.bin")?;
//!     let mut header = codec.read(&mut file, 2)?;
//!
//!     for mesh in header.meshes_mut() {
//!         fix(mesh, 0x0010_0000)?;
//!     }
//!
//!     let mut out = File::create("native_out.bin")?;
//!     codec.write(&mut out, &mut header)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

pub mod adc;
pub mod chunk;
pub mod config;
pub mod dma;
pub mod error;
pub mod instance;
pub mod logging;
pub mod native_data;
pub mod render;

pub use error::{ChainError, NativeDataError};
pub use instance::{FixupState, InstanceBuffer, InstanceHeader};
pub use native_data::{NativeDataCodec, NativeDataConfig};

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        ChainError, NativeDataError,
        FixupState, InstanceBuffer, InstanceHeader,
        NativeDataCodec, NativeDataConfig,
        adc::AdcData,
        config::{Config, ConfigError},
        dma::{
            fix, fix_in_place, unfix, walk, walk_with, chain_extent,
            DmaAddress, FixOutcome, Fragment, Walk, WalkEnd,
        },
        render::{
            render_geometry, EnvFrameCache, LightingBits, MaterialEffect,
            MeshMaterial, RenderBackend, RenderContext, RenderError,
        },
    };
}
