//! Per-mesh instance buffers and the per-geometry header that owns them
//!
//! An [`InstanceBuffer`] is an owned byte arena holding one mesh's DMA tag
//! chain. The arena is built from 16-byte aligned quad-words so the chain is
//! always laid out the way the DMA controller expects, whatever the host
//! allocator does. Only the fix-up pass in [`crate::dma`] mutates the bytes.

use bytemuck::{Pod, Zeroable};

use crate::error::ChainError;

/// Size of a DMA quad-word in bytes
pub const QUAD_WORD: usize = 16;

/// One 16-byte aligned quad-word of buffer storage
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
struct QuadWord([u8; QUAD_WORD]);

/// Addressing state of a buffer's `ref` tags
///
/// The discriminants are the values stored in the native-data stream.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FixupState {
    /// `ref` tags hold quad-word offsets from the start of the buffer
    #[default]
    Unfixed = 0,
    /// The producer declared that no fix-up is needed.
    ///
    /// Only ever decoded from a stream, never produced by the fixer.
    PassthroughNoFix = 1,
    /// `ref` tags hold absolute addresses
    Fixed = 2,
}

impl FixupState {
    /// Raw stream value
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for FixupState {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unfixed),
            1 => Ok(Self::PassthroughNoFix),
            2 => Ok(Self::Fixed),
            other => Err(other),
        }
    }
}

/// Packed DMA data for one mesh
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceBuffer {
    words: Vec<QuadWord>,
    len: usize,
    state: FixupState,
    base: Option<u32>,
}

impl InstanceBuffer {
    /// Create a buffer whose `ref` tags hold relative offsets
    #[must_use]
    pub fn unfixed(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes, FixupState::Unfixed, None)
    }

    /// Create a buffer the producer marked as needing no fix-up
    #[must_use]
    pub fn passthrough(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes, FixupState::PassthroughNoFix, None)
    }

    /// Create a buffer whose `ref` tags already hold addresses relative to `base`
    #[must_use]
    pub fn fixed(bytes: &[u8], base: u32) -> Self {
        Self::from_bytes(bytes, FixupState::Fixed, Some(base))
    }

    pub(crate) fn from_bytes(bytes: &[u8], state: FixupState, base: Option<u32>) -> Self {
        let mut buffer = Self::zeroed(bytes.len(), state);
        buffer.bytes_mut().copy_from_slice(bytes);
        buffer.base = base;
        buffer
    }

    /// Zero-filled buffer of `len` bytes, used by the stream reader
    pub(crate) fn zeroed(len: usize, state: FixupState) -> Self {
        Self {
            words: vec![QuadWord::default(); len.div_ceil(QUAD_WORD)],
            len,
            state,
            base: None,
        }
    }

    /// Buffer length in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current addressing state
    #[must_use]
    pub const fn state(&self) -> FixupState {
        self.state
    }

    /// Base address the buffer was fixed against, if known
    #[must_use]
    pub const fn base(&self) -> Option<u32> {
        self.base
    }

    /// The buffer contents
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<QuadWord, u8>(&self.words)[..self.len]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<QuadWord, u8>(&mut self.words)[..self.len]
    }

    /// The arena's own address as a 32-bit DMA address
    ///
    /// Only meaningful where host memory is directly visible to the DMA
    /// controller; on wider hosts this is usually out of range.
    pub fn host_base(&self) -> Result<u32, ChainError> {
        let address = self.words.as_ptr() as usize;
        u32::try_from(address).map_err(|_| ChainError::AddressOutOfRange(address))
    }

    pub(crate) fn mark_fixed(&mut self, base: u32) {
        self.state = FixupState::Fixed;
        self.base = Some(base);
    }

    pub(crate) fn mark_unfixed(&mut self) {
        self.state = FixupState::Unfixed;
        self.base = None;
    }
}

/// Instance data for one geometry: one buffer per mesh
///
/// The mesh count comes from the geometry's mesh header and is fixed at
/// construction. Dropping the header releases every buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceHeader {
    meshes: Vec<InstanceBuffer>,
}

impl InstanceHeader {
    /// Header with `mesh_count` empty, unfixed buffers
    #[must_use]
    pub fn with_mesh_count(mesh_count: usize) -> Self {
        Self {
            meshes: vec![InstanceBuffer::default(); mesh_count],
        }
    }

    /// Header owning the given buffers, in mesh order
    #[must_use]
    pub fn from_meshes(meshes: Vec<InstanceBuffer>) -> Self {
        Self { meshes }
    }

    /// Number of meshes
    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// All buffers in mesh order
    #[must_use]
    pub fn meshes(&self) -> &[InstanceBuffer] {
        &self.meshes
    }

    /// Mutable access to the buffers; the count cannot change
    pub fn meshes_mut(&mut self) -> &mut [InstanceBuffer] {
        &mut self.meshes
    }

    /// Buffer of one mesh
    #[must_use]
    pub fn mesh(&self, index: usize) -> Option<&InstanceBuffer> {
        self.meshes.get(index)
    }

    /// Mutable buffer of one mesh
    pub fn mesh_mut(&mut self, index: usize) -> Option<&mut InstanceBuffer> {
        self.meshes.get_mut(index)
    }

    /// Replace one mesh's buffer wholesale, returning the old one
    pub fn replace_mesh(&mut self, index: usize, buffer: InstanceBuffer) -> Option<InstanceBuffer> {
        self.meshes
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, buffer))
    }

    /// Release every buffer, then the header
    pub fn destroy(self) {
        log::trace!("Destroying instance header with {} meshes", self.meshes.len());
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixup_state_raw_values() {
        assert_eq!(FixupState::Unfixed.as_raw(), 0);
        assert_eq!(FixupState::PassthroughNoFix.as_raw(), 1);
        assert_eq!(FixupState::Fixed.as_raw(), 2);

        assert_eq!(FixupState::try_from(1), Ok(FixupState::PassthroughNoFix));
        assert_eq!(FixupState::try_from(3), Err(3));
    }

    #[test]
    fn test_buffer_is_quad_word_aligned() {
        let buffer = InstanceBuffer::unfixed(&[1, 2, 3, 4, 5]);
        assert_eq!(buffer.as_bytes().as_ptr() as usize % QUAD_WORD, 0);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.as_bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_constructors_set_state() {
        assert_eq!(InstanceBuffer::unfixed(&[]).state(), FixupState::Unfixed);
        assert_eq!(InstanceBuffer::passthrough(&[]).state(), FixupState::PassthroughNoFix);

        let fixed = InstanceBuffer::fixed(&[0; 16], 0x1000);
        assert_eq!(fixed.state(), FixupState::Fixed);
        assert_eq!(fixed.base(), Some(0x1000));
    }

    #[test]
    fn test_header_owns_mesh_count_buffers() {
        let mut header = InstanceHeader::with_mesh_count(3);
        assert_eq!(header.mesh_count(), 3);
        assert!(header.meshes().iter().all(InstanceBuffer::is_empty));

        let old = header.replace_mesh(1, InstanceBuffer::unfixed(&[7; 32]));
        assert_eq!(old, Some(InstanceBuffer::default()));
        assert_eq!(header.mesh(1).map(InstanceBuffer::len), Some(32));
        assert!(header.replace_mesh(3, InstanceBuffer::default()).is_none());

        header.destroy();
    }
}
