//! DMA tag decoding
//!
//! A source-chain tag is the first 64 bits of a quad-word:
//!
//! ```text
//! word 0: [31] IRQ  [30:28] ID  [27:26] PCE  [15:0] QWC
//! word 1: ADDR (ref tags only)
//! ```
//!
//! Tags are never stored; each one is decoded on demand from the buffer
//! bytes as a [`Tag`] view.

use crate::error::ChainError;
use crate::instance::QUAD_WORD;

/// A 32-bit address as seen by the DMA controller
pub type DmaAddress = u32;

/// Mask selecting the tag ID bits of word 0
pub const TAG_ID_MASK: u32 = 0x7000_0000;

/// Mask selecting the quad-word count of word 0
pub const QWC_MASK: u32 = 0xFFFF;

const WORD: usize = 4;

/// The tag IDs used by instance data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// `cnt`: QWC quad-words of payload follow the tag, then the next tag
    Continuation,
    /// `ref`: QWC quad-words of payload live at ADDR, the next tag follows
    Reference,
    /// `ret`: QWC quad-words of payload follow the tag and the chain ends
    Terminator,
}

impl TagKind {
    /// Decode the ID bits of a tag word
    #[must_use]
    pub const fn from_word(word: u32) -> Option<Self> {
        match word & TAG_ID_MASK {
            0x1000_0000 => Some(Self::Continuation),
            0x3000_0000 => Some(Self::Reference),
            0x6000_0000 => Some(Self::Terminator),
            _ => None,
        }
    }

    /// ID bits for this kind, already shifted into place
    #[must_use]
    pub const fn id_bits(self) -> u32 {
        match self {
            Self::Continuation => 0x1000_0000,
            Self::Reference => 0x3000_0000,
            Self::Terminator => 0x6000_0000,
        }
    }
}

/// Build word 0 of a tag
#[must_use]
pub const fn encode(kind: TagKind, qwc: u16) -> u32 {
    kind.id_bits() | qwc as u32
}

/// A decoded tag at a byte offset into a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Byte offset of the tag
    pub offset: usize,
    /// Tag kind
    pub kind: TagKind,
    /// Quad-word count
    pub qwc: u16,
    /// Raw word 0
    pub word: u32,
}

impl Tag {
    /// Decode the tag at `offset`
    ///
    /// Fails on an unknown ID or if the tag's quad-word block (including the
    /// inline payload of `cnt` and `ret` tags) does not fit in `bytes`.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<Self, ChainError> {
        let word = read_word(bytes, offset)?;
        let kind = TagKind::from_word(word).ok_or(ChainError::UnknownTag { offset, word })?;
        let tag = Self {
            offset,
            kind,
            qwc: (word & QWC_MASK) as u16,
            word,
        };

        let needed = tag.block_len();
        if bytes.len().saturating_sub(offset) < needed {
            return Err(ChainError::Truncated {
                offset,
                needed,
                len: bytes.len(),
            });
        }
        Ok(tag)
    }

    /// Bytes from this tag to the next one
    #[must_use]
    pub const fn block_len(&self) -> usize {
        match self.kind {
            TagKind::Reference => QUAD_WORD,
            TagKind::Continuation | TagKind::Terminator => (self.qwc as usize + 1) * QUAD_WORD,
        }
    }

    /// Offset of the tag that follows this one
    #[must_use]
    pub const fn next_offset(&self) -> usize {
        self.offset + self.block_len()
    }

    /// Payload length in bytes
    ///
    /// Inline payload starts right after the 8-byte tag, so it also covers
    /// the upper half of the tag's quad-word.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        match self.kind {
            TagKind::Reference => self.qwc as usize * QUAD_WORD,
            TagKind::Continuation | TagKind::Terminator => self.qwc as usize * QUAD_WORD + 2 * WORD,
        }
    }

    /// Offset of inline payload
    #[must_use]
    pub const fn inline_offset(&self) -> usize {
        self.offset + 2 * WORD
    }

    /// Offset of the ADDR word
    #[must_use]
    pub const fn address_offset(&self) -> usize {
        self.offset + WORD
    }
}

/// Iterator over the tags of a chain, ending after the `ret` tag
///
/// Yields at most one error, after which iteration stops.
pub struct TagCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> TagCursor<'a> {
    /// Start decoding at offset 0
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            done: false,
        }
    }
}

impl Iterator for TagCursor<'_> {
    type Item = Result<Tag, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match Tag::decode(self.bytes, self.offset) {
            Ok(tag) => {
                self.done = tag.kind == TagKind::Terminator;
                self.offset = tag.next_offset();
                Some(Ok(tag))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Read a little-endian word
pub(crate) fn read_word(bytes: &[u8], offset: usize) -> Result<u32, ChainError> {
    bytes
        .get(offset..offset + WORD)
        .and_then(|word| word.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ChainError::Truncated {
            offset,
            needed: WORD,
            len: bytes.len(),
        })
}

/// Write a little-endian word; the caller has already bounds-checked `offset`
pub(crate) fn write_word(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + WORD].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_kind_decode() {
        assert_eq!(TagKind::from_word(0x1000_0003), Some(TagKind::Continuation));
        assert_eq!(TagKind::from_word(0x3000_0000), Some(TagKind::Reference));
        assert_eq!(TagKind::from_word(0xE000_0000), Some(TagKind::Terminator));
        assert_eq!(TagKind::from_word(0x0000_0000), None);
        assert_eq!(TagKind::from_word(0x2000_0000), None);
        assert_eq!(encode(TagKind::Reference, 2), 0x3000_0002);
    }

    #[test]
    fn test_block_and_payload_lengths() {
        let bytes = words(&[encode(TagKind::Continuation, 1), 0, 0, 0, 0, 0, 0, 0]);
        let tag = Tag::decode(&bytes, 0).unwrap();
        assert_eq!(tag.qwc, 1);
        assert_eq!(tag.block_len(), 32);
        assert_eq!(tag.payload_len(), 24);
        assert_eq!(tag.inline_offset(), 8);

        let bytes = words(&[encode(TagKind::Reference, 2), 3, 0, 0]);
        let tag = Tag::decode(&bytes, 0).unwrap();
        assert_eq!(tag.block_len(), 16);
        assert_eq!(tag.payload_len(), 32);
        assert_eq!(tag.address_offset(), 4);
    }

    #[test]
    fn test_decode_rejects_short_block() {
        // cnt with one quad-word of payload but only the tag present
        let bytes = words(&[encode(TagKind::Continuation, 1), 0, 0, 0]);
        assert_eq!(
            Tag::decode(&bytes, 0),
            Err(ChainError::Truncated { offset: 0, needed: 32, len: 16 })
        );

        assert_eq!(
            Tag::decode(&[0u8; 2], 0),
            Err(ChainError::Truncated { offset: 0, needed: 4, len: 2 })
        );
    }

    #[test]
    fn test_cursor_stops_after_terminator() {
        let bytes = words(&[
            encode(TagKind::Continuation, 0), 0, 0, 0,
            encode(TagKind::Terminator, 0), 0, 0, 0,
            0xDEAD_BEEF, 0, 0, 0,
        ]);
        let tags: Vec<_> = TagCursor::new(&bytes).collect::<Result<_, _>>().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1].kind, TagKind::Terminator);
        assert_eq!(tags[1].offset, 16);
    }

    #[test]
    fn test_cursor_yields_single_error() {
        let bytes = words(&[0x4000_0000, 0, 0, 0]);
        let mut cursor = TagCursor::new(&bytes);
        assert_eq!(
            cursor.next(),
            Some(Err(ChainError::UnknownTag { offset: 0, word: 0x4000_0000 }))
        );
        assert_eq!(cursor.next(), None);
    }
}
