//! Chunk framing of the binary stream
//!
//! Every section of the stream starts with a 12-byte header of three
//! little-endian words: chunk id, payload length and library version.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Plain struct chunk that opens a section's own data
pub const ID_STRUCT: u32 = 0x01;
/// Geometry ADC flag chunk
pub const ID_ADC: u32 = 0x134;
/// Platform-native geometry data chunk
pub const ID_NATIVEDATA: u32 = 0x510;

/// A chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Chunk id
    pub id: u32,
    /// Payload length in bytes, excluding this header
    pub length: u32,
    /// Packed library version that wrote the chunk
    pub version: u32,
}

impl ChunkHeader {
    /// Size of a chunk header in bytes
    pub const SIZE: usize = 12;

    /// Read a header from the current stream position
    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            id: read_u32(reader)?,
            length: read_u32(reader)?,
            version: read_u32(reader)?,
        })
    }

    /// Write this header
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32(writer, self.id)?;
        write_u32(writer, self.length)?;
        write_u32(writer, self.version)
    }
}

/// Skip chunks until one with `id` is found
///
/// Leaves the stream just past the found header. Returns `None` if the
/// stream ends first.
pub fn find_chunk<R: Read + Seek>(reader: &mut R, id: u32) -> io::Result<Option<ChunkHeader>> {
    loop {
        let header = match ChunkHeader::read(reader) {
            Ok(header) => header,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        };
        if header.id == id {
            return Ok(Some(header));
        }
        log::trace!("Skipping chunk {:#x} ({} bytes)", header.id, header.length);
        reader.seek(SeekFrom::Current(i64::from(header.length)))?;
    }
}

/// Read a little-endian `u32`
pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a little-endian `u32`
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let mut out = Vec::new();
        ChunkHeader { id: ID_STRUCT, length: 8, version: 0x1803_FFFF }
            .write(&mut out)
            .unwrap();
        assert_eq!(out.len(), ChunkHeader::SIZE);
        assert_eq!(&out[0..4], &[1, 0, 0, 0]);
        assert_eq!(&out[4..8], &[8, 0, 0, 0]);
    }

    #[test]
    fn test_find_chunk_skips_other_chunks() {
        let mut out = Vec::new();
        ChunkHeader { id: 0x03, length: 4, version: 0 }.write(&mut out).unwrap();
        write_u32(&mut out, 0xFFFF_FFFF).unwrap();
        ChunkHeader { id: ID_STRUCT, length: 4, version: 7 }.write(&mut out).unwrap();
        write_u32(&mut out, 42).unwrap();

        let mut cursor = Cursor::new(out);
        let header = find_chunk(&mut cursor, ID_STRUCT).unwrap().unwrap();
        assert_eq!(header.version, 7);
        assert_eq!(read_u32(&mut cursor).unwrap(), 42);
    }

    #[test]
    fn test_find_chunk_at_end_of_stream() {
        let mut cursor = Cursor::new(Vec::new());
        assert_eq!(find_chunk(&mut cursor, ID_STRUCT).unwrap(), None);
    }
}
