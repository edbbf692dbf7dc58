//! Geometry ADC flag
//!
//! PS2 tristrip geometry marks strip restarts with the vertex ADC bit. A
//! geometry converted that way carries a small ADC chunk whose payload is a
//! single zero word; geometries without it omit the chunk entirely.

use std::io::{Read, Write};

use crate::chunk::{read_u32, write_u32, ChunkHeader, ID_ADC};
use crate::error::NativeDataError;

/// ADC state of one geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdcData {
    /// Whether the geometry's strips use ADC bits
    pub formatted: bool,
}

impl AdcData {
    /// Bytes of the ADC chunk, header included
    pub const CHUNK_SIZE: usize = ChunkHeader::SIZE + 4;

    /// Read an ADC chunk at the current stream position
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, NativeDataError> {
        let header = ChunkHeader::read(reader)?;
        if header.id != ID_ADC {
            return Err(NativeDataError::MissingChunk(ID_ADC));
        }
        match read_u32(reader)? {
            0 => Ok(Self { formatted: true }),
            other => Err(NativeDataError::InvalidAdc(other)),
        }
    }

    /// Write the ADC chunk; writes nothing for unformatted geometry
    pub fn write<W: Write>(&self, writer: &mut W, version: u32) -> Result<(), NativeDataError> {
        if !self.formatted {
            return Ok(());
        }
        ChunkHeader {
            id: ID_ADC,
            length: 4,
            version,
        }
        .write(writer)?;
        write_u32(writer, 0)?;
        Ok(())
    }

    /// Bytes [`Self::write`] emits, or `None` when the chunk is omitted
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        if self.formatted {
            Some(Self::CHUNK_SIZE)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_new_geometry_is_unformatted() {
        let adc = AdcData::default();
        assert!(!adc.formatted);
        assert_eq!(adc.size(), None);

        let mut out = Vec::new();
        adc.write(&mut out, 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_formatted_round_trip() {
        let adc = AdcData { formatted: true };
        let mut out = Vec::new();
        adc.write(&mut out, 0x0C02_FFFF).unwrap();
        assert_eq!(Some(out.len()), adc.size());
        assert_eq!(out.len(), 16);

        assert_eq!(AdcData::read(&mut Cursor::new(out)).unwrap(), adc);
    }

    #[test]
    fn test_read_rejects_nonzero_payload() {
        let mut out = Vec::new();
        ChunkHeader { id: ID_ADC, length: 4, version: 0 }.write(&mut out).unwrap();
        write_u32(&mut out, 5).unwrap();
        assert!(matches!(
            AdcData::read(&mut Cursor::new(out)),
            Err(NativeDataError::InvalidAdc(5))
        ));
    }

    #[test]
    fn test_read_rejects_other_chunk() {
        let mut out = Vec::new();
        ChunkHeader { id: 0x50E, length: 4, version: 0 }.write(&mut out).unwrap();
        write_u32(&mut out, 0).unwrap();
        assert!(matches!(
            AdcData::read(&mut Cursor::new(out)),
            Err(NativeDataError::MissingChunk(ID_ADC))
        ));
    }
}
