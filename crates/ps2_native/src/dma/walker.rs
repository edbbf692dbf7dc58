//! Tag chain walking
//!
//! [`walk`] splits a fixed buffer into the payload fragments the DMA
//! controller would transfer, in transfer order. [`chain_extent`] is the
//! size diagnostic: it reports how much of the buffer the chain accounts for
//! and works in either addressing state.

use std::ops::Range;

use crate::dma::tag::{read_word, Tag, TagCursor, TagKind};
use crate::error::ChainError;
use crate::instance::{FixupState, InstanceBuffer, QUAD_WORD};

/// Where a fragment's bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentSource {
    /// Payload following a `cnt` or `ret` tag
    Inline,
    /// Payload addressed by a `ref` tag
    Referenced,
}

/// One span of payload, as a byte range of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Byte offset of the payload
    pub offset: usize,
    /// Payload length in bytes
    pub len: usize,
    /// Tag kind that produced it
    pub source: FragmentSource,
}

impl Fragment {
    /// Byte range of the payload
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// How a walk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEnd {
    /// The chain reached its `ret` tag
    Terminated,
    /// The buffer is not fixed; nothing was walked
    NotFixed,
    /// The chain could not be decoded; fragments before the fault are kept
    Faulted(ChainError),
}

/// Result of walking a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk {
    /// Payload fragments in transfer order
    pub fragments: Vec<Fragment>,
    /// How the walk ended
    pub end: WalkEnd,
}

impl Walk {
    /// Total payload bytes across all fragments
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.fragments.iter().map(|fragment| fragment.len).sum()
    }

    /// Whether the chain was walked to its terminator
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.end, WalkEnd::Terminated)
    }
}

/// How `ref` addresses are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Addressing {
    /// Quad-word offsets from the start of the buffer
    Relative,
    /// Absolute addresses, buffer starting at `base`
    Absolute { base: u32 },
}

impl Addressing {
    pub(crate) fn of(buffer: &InstanceBuffer) -> Result<Self, ChainError> {
        match buffer.state() {
            FixupState::Fixed => buffer
                .base()
                .map(|base| Self::Absolute { base })
                .ok_or(ChainError::MissingBase),
            FixupState::Unfixed | FixupState::PassthroughNoFix => Ok(Self::Relative),
        }
    }
}

/// Byte range of the payload a `ref` tag points at
pub(crate) fn referenced_range(
    bytes: &[u8],
    tag: &Tag,
    addressing: Addressing,
) -> Result<Range<usize>, ChainError> {
    let address = read_word(bytes, tag.address_offset())?;
    let offset = match addressing {
        Addressing::Relative => (address as usize).checked_mul(QUAD_WORD),
        Addressing::Absolute { base } => address.checked_sub(base).map(|diff| diff as usize),
    };
    let len = tag.payload_len();
    offset
        .and_then(|start| Some(start..start.checked_add(len)?))
        .filter(|range| range.end <= bytes.len())
        .ok_or(ChainError::ReferenceOutOfBounds {
            tag_offset: tag.offset,
            offset: offset.unwrap_or(usize::MAX),
            len,
            buffer_len: bytes.len(),
        })
}

fn fragment_of(bytes: &[u8], tag: &Tag, addressing: Addressing) -> Result<Fragment, ChainError> {
    match tag.kind {
        TagKind::Continuation | TagKind::Terminator => Ok(Fragment {
            offset: tag.inline_offset(),
            len: tag.payload_len(),
            source: FragmentSource::Inline,
        }),
        TagKind::Reference => {
            let range = referenced_range(bytes, tag, addressing)?;
            Ok(Fragment {
                offset: range.start,
                len: range.len(),
                source: FragmentSource::Referenced,
            })
        }
    }
}

/// Walk a fixed buffer's chain and collect its payload fragments
///
/// Returns at once with [`WalkEnd::NotFixed`] unless the buffer is fixed.
/// A decode fault ends the walk early; it is logged and reported through
/// [`WalkEnd::Faulted`].
#[must_use]
pub fn walk(buffer: &InstanceBuffer) -> Walk {
    let mut fragments = Vec::new();
    let end = walk_fragments(buffer, |fragment| fragments.push(fragment));
    Walk { fragments, end }
}

/// Walk a fixed buffer's chain, handing each payload slice to `visit`
pub fn walk_with<F>(buffer: &InstanceBuffer, mut visit: F) -> WalkEnd
where
    F: FnMut(&[u8]),
{
    let bytes = buffer.as_bytes();
    walk_fragments(buffer, |fragment| visit(&bytes[fragment.range()]))
}

fn walk_fragments<F>(buffer: &InstanceBuffer, mut emit: F) -> WalkEnd
where
    F: FnMut(Fragment),
{
    if buffer.state() != FixupState::Fixed {
        return WalkEnd::NotFixed;
    }
    let bytes = buffer.as_bytes();
    let result = Addressing::of(buffer).and_then(|addressing| {
        for tag in TagCursor::new(bytes) {
            emit(fragment_of(bytes, &tag?, addressing)?);
        }
        Ok(())
    });

    match result {
        Ok(()) => WalkEnd::Terminated,
        Err(err) => {
            log::warn!("DMA walk stopped early: {err}");
            WalkEnd::Faulted(err)
        }
    }
}

/// How much of a buffer its tag chain accounts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainExtent {
    /// Bytes from the start of the buffer to the end of the `ret` block
    pub chain_len: usize,
    /// End of the furthest payload addressed by a `ref` tag
    pub referenced_end: Option<usize>,
    /// Total buffer length
    pub buffer_len: usize,
}

impl ChainExtent {
    /// Bytes the chain accounts for
    #[must_use]
    pub fn used(&self) -> usize {
        self.referenced_end.map_or(self.chain_len, |end| end.max(self.chain_len))
    }

    /// Bytes past everything the chain accounts for
    #[must_use]
    pub fn trailing(&self) -> usize {
        self.buffer_len.saturating_sub(self.used())
    }
}

/// Measure a buffer's chain in either addressing state
pub fn chain_extent(buffer: &InstanceBuffer) -> Result<ChainExtent, ChainError> {
    let bytes = buffer.as_bytes();
    let addressing = Addressing::of(buffer)?;
    let mut chain_len = 0;
    let mut referenced_end: Option<usize> = None;

    for tag in TagCursor::new(bytes) {
        let tag = tag?;
        if tag.kind == TagKind::Reference {
            let end = referenced_range(bytes, &tag, addressing)?.end;
            referenced_end = Some(referenced_end.map_or(end, |last| last.max(end)));
        }
        chain_len = tag.next_offset();
    }

    Ok(ChainExtent {
        chain_len,
        referenced_end,
        buffer_len: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::testing::{referenced_chain, words};
    use crate::dma::tag::encode;

    #[test]
    fn test_walk_requires_fixed_state() {
        let buffer = InstanceBuffer::unfixed(&referenced_chain());
        let walk = walk(&buffer);
        assert_eq!(walk.end, WalkEnd::NotFixed);
        assert!(walk.fragments.is_empty());
    }

    #[test]
    fn test_walk_emits_fragments_in_order() {
        // cnt(0) | ref(2) -> offset 3 qw | ret(0) | 2 qw payload
        let mut buffer = InstanceBuffer::unfixed(&referenced_chain());
        crate::dma::fix(&mut buffer, 0x1000).unwrap();

        let walk = walk(&buffer);
        assert!(walk.is_complete());
        assert_eq!(
            walk.fragments,
            vec![
                Fragment { offset: 8, len: 8, source: FragmentSource::Inline },
                Fragment { offset: 48, len: 32, source: FragmentSource::Referenced },
                Fragment { offset: 40, len: 8, source: FragmentSource::Inline },
            ]
        );
        assert_eq!(walk.payload_len(), 48);
    }

    #[test]
    fn test_walk_with_visits_payload_bytes() {
        let mut bytes = referenced_chain();
        bytes[48..80].fill(0xAB);
        let mut buffer = InstanceBuffer::unfixed(&bytes);
        crate::dma::fix(&mut buffer, 0x2000).unwrap();

        let mut seen = Vec::new();
        let end = walk_with(&buffer, |payload| seen.push(payload.to_vec()));
        assert_eq!(end, WalkEnd::Terminated);
        assert_eq!(seen.len(), 3);
        assert!(seen[1].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_walk_reports_unknown_tag() {
        let bytes = words(&[
            encode(TagKind::Continuation, 0), 0, 0, 0,
            0x4000_0000, 0, 0, 0,
        ]);
        let buffer = InstanceBuffer::fixed(&bytes, 0x1000);

        let walk = walk(&buffer);
        assert_eq!(walk.fragments.len(), 1);
        assert_eq!(
            walk.end,
            WalkEnd::Faulted(ChainError::UnknownTag { offset: 16, word: 0x4000_0000 })
        );
    }

    #[test]
    fn test_walk_detects_missing_terminator() {
        let bytes = words(&[
            encode(TagKind::Continuation, 0), 0, 0, 0,
            encode(TagKind::Continuation, 0), 0, 0, 0,
        ]);
        let buffer = InstanceBuffer::fixed(&bytes, 0x1000);

        let walk = walk(&buffer);
        assert_eq!(walk.fragments.len(), 2);
        assert_eq!(
            walk.end,
            WalkEnd::Faulted(ChainError::Truncated { offset: 32, needed: 4, len: 32 })
        );
    }

    #[test]
    fn test_walk_rejects_reference_outside_buffer() {
        let bytes = words(&[
            encode(TagKind::Reference, 1), 0x1100, 0, 0,
            encode(TagKind::Terminator, 0), 0, 0, 0,
        ]);
        let buffer = InstanceBuffer::fixed(&bytes, 0x1000);

        assert!(matches!(
            walk(&buffer).end,
            WalkEnd::Faulted(ChainError::ReferenceOutOfBounds { tag_offset: 0, offset: 0x100, .. })
        ));
    }

    #[test]
    fn test_extent_in_both_states() {
        let mut bytes = referenced_chain();
        bytes.extend_from_slice(&[0; 16]);
        let mut buffer = InstanceBuffer::unfixed(&bytes);

        let relative = chain_extent(&buffer).unwrap();
        assert_eq!(relative.chain_len, 48);
        assert_eq!(relative.referenced_end, Some(80));
        assert_eq!(relative.used(), 80);
        assert_eq!(relative.trailing(), 16);

        crate::dma::fix(&mut buffer, 0x8000).unwrap();
        assert_eq!(chain_extent(&buffer).unwrap(), relative);
    }

    #[test]
    fn test_extent_without_references() {
        let bytes = words(&[
            encode(TagKind::Continuation, 0), 0, 0, 0,
            encode(TagKind::Terminator, 1), 0, 0, 0,
            0, 0, 0, 0,
        ]);
        let extent = chain_extent(&InstanceBuffer::unfixed(&bytes)).unwrap();
        assert_eq!(extent.referenced_end, None);
        assert_eq!(extent.used(), 48);
        assert_eq!(extent.trailing(), 0);
    }
}
