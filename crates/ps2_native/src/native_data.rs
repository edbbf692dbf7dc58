//! PS2 native-data stream format
//!
//! The native-data section of a geometry is a struct chunk holding the
//! platform id followed by one record per mesh:
//!
//! ```text
//! chunk header     12 bytes  (ID_STRUCT, length, version)
//! platform          u32
//! per mesh:
//!   data size       u32
//!   fix-up state    u32      (0 unfixed, 1 passthrough, 2 fixed)
//!   data            [u8; data size]
//! ```
//!
//! Buffers are always written in their relative form, so a stored state is
//! never 2 on output. Reading leaves buffers exactly as stored.

use std::io::{self, Read, Seek, Write};

use crate::chunk::{find_chunk, read_u32, write_u32, ChunkHeader, ID_STRUCT};
use crate::config::{Config, Deserialize, Serialize};
use crate::dma::{fix, unfix, FixOutcome};
use crate::error::{ChainError, NativeDataError};
use crate::instance::{FixupState, InstanceBuffer, InstanceHeader};

/// Platform id of PS2 native data
pub const PLATFORM_PS2: u32 = 4;

/// Library version written into chunk headers by default (3.3.0.2)
pub const DEFAULT_LIBRARY_VERSION: u32 = 0x0C02_FFFF;

/// Bytes of chunk header and platform id ahead of the mesh records
pub const HEADER_OVERHEAD: usize = ChunkHeader::SIZE + 4;

/// Bytes of `(size, state)` ahead of each mesh's data
pub const MESH_RECORD_OVERHEAD: usize = 8;

/// Settings for reading and writing native data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeDataConfig {
    /// Platform id the stream must carry
    pub platform: u32,
    /// Library version stamped on written chunk headers
    pub library_version: u32,
    /// Warn when a struct chunk's length disagrees with its mesh records
    pub check_struct_length: bool,
}

impl Default for NativeDataConfig {
    fn default() -> Self {
        Self {
            platform: PLATFORM_PS2,
            library_version: DEFAULT_LIBRARY_VERSION,
            check_struct_length: true,
        }
    }
}

impl Config for NativeDataConfig {}

impl InstanceHeader {
    /// Exact number of bytes [`NativeDataCodec::write`] emits for this header
    #[must_use]
    pub fn computed_size(&self) -> usize {
        HEADER_OVERHEAD
            + self
                .meshes()
                .iter()
                .map(|mesh| MESH_RECORD_OVERHEAD + mesh.len())
                .sum::<usize>()
    }
}

/// Reads and writes the native-data section of a geometry
#[derive(Debug, Clone, Default)]
pub struct NativeDataCodec {
    config: NativeDataConfig,
}

impl NativeDataCodec {
    /// Create a codec with the given settings
    #[must_use]
    pub const fn new(config: NativeDataConfig) -> Self {
        Self { config }
    }

    /// Codec settings
    #[must_use]
    pub const fn config(&self) -> &NativeDataConfig {
        &self.config
    }

    /// Read the instance data of a geometry with `mesh_count` meshes
    ///
    /// `mesh_count` comes from the geometry's mesh header, which precedes
    /// the native data in the stream. No header is returned on error.
    pub fn read<R: Read + Seek>(
        &self,
        reader: &mut R,
        mesh_count: usize,
    ) -> Result<InstanceHeader, NativeDataError> {
        let chunk = find_chunk(reader, ID_STRUCT)?.ok_or(NativeDataError::MissingChunk(ID_STRUCT))?;

        let platform = read_u32(reader)?;
        if platform != self.config.platform {
            return Err(NativeDataError::Format {
                expected: self.config.platform,
                found: platform,
            });
        }

        // The count is untrusted; the stream bounds how many records exist
        let mut meshes = Vec::new();
        for index in 0..mesh_count {
            meshes.push(read_mesh(reader, index)?);
        }
        let header = InstanceHeader::from_meshes(meshes);

        let consumed = header.computed_size() - ChunkHeader::SIZE;
        if self.config.check_struct_length && consumed != chunk.length as usize {
            log::warn!(
                "Native data struct declares {} bytes but its {} meshes use {}",
                chunk.length,
                mesh_count,
                consumed
            );
        }
        log::debug!("Read native data: {} meshes, {} bytes", mesh_count, consumed);
        Ok(header)
    }

    /// Write the instance data of a geometry
    ///
    /// Fixed buffers are unfixed first, so the header is left in its
    /// relative form. If any buffer cannot be unfixed nothing is written and
    /// the buffers already unfixed are fixed again at their old base.
    pub fn write<W: Write>(
        &self,
        writer: &mut W,
        header: &mut InstanceHeader,
    ) -> Result<(), NativeDataError> {
        unfix_all(header)?;

        let size = header.computed_size();
        ChunkHeader {
            id: ID_STRUCT,
            length: to_u32(size - ChunkHeader::SIZE)?,
            version: self.config.library_version,
        }
        .write(writer)?;
        write_u32(writer, self.config.platform)?;

        for mesh in header.meshes() {
            write_u32(writer, to_u32(mesh.len())?)?;
            write_u32(writer, mesh.state().as_raw())?;
            writer.write_all(mesh.as_bytes())?;
        }
        log::debug!("Wrote native data: {} meshes, {} bytes", header.mesh_count(), size);
        Ok(())
    }
}

/// Unfix every mesh, or none of them
fn unfix_all(header: &mut InstanceHeader) -> Result<(), ChainError> {
    let mut unfixed = Vec::new();
    let mut failure = None;
    for (index, mesh) in header.meshes_mut().iter_mut().enumerate() {
        let base = mesh.base();
        match unfix(mesh) {
            Ok(FixOutcome::Relocated { .. }) => unfixed.extend(base.map(|base| (index, base))),
            Ok(FixOutcome::Skipped) => {}
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    let Some(err) = failure else {
        return Ok(());
    };
    for (index, base) in unfixed {
        if let Some(mesh) = header.mesh_mut(index) {
            if let Err(refix) = fix(mesh, base) {
                log::warn!("Mesh {index} could not be fixed again after a failed write: {refix}");
            }
        }
    }
    Err(err)
}

fn read_mesh<R: Read>(reader: &mut R, index: usize) -> Result<InstanceBuffer, NativeDataError> {
    let size = read_u32(reader)?;
    let raw_state = read_u32(reader)?;
    let state = FixupState::try_from(raw_state)
        .map_err(|state| NativeDataError::InvalidFixupState { mesh: index, state })?;

    // Bounded by what the stream actually holds, not by the declared size
    let mut data = Vec::new();
    reader.by_ref().take(u64::from(size)).read_to_end(&mut data)?;
    if data.len() != size as usize {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("mesh {index} declares {size} bytes, stream holds {}", data.len()),
        )
        .into());
    }

    if state == FixupState::Fixed {
        log::warn!("Mesh {index} was stored fixed; its base address is unknown");
    }
    Ok(InstanceBuffer::from_bytes(&data, state, None))
}

fn to_u32(len: usize) -> Result<u32, NativeDataError> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{len} bytes do not fit in a u32 size")).into()
    })
}
