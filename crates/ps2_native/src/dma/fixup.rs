//! Relocation of `ref` tag addresses
//!
//! On disk a `ref` tag's ADDR word is a quad-word offset from the start of
//! the buffer. Before the chain can be handed to the DMA controller every
//! such offset must become an absolute address, and before it is written
//! back it must become relative again.
//!
//! Both passes first walk the whole chain without touching it and only patch
//! the collected words once the `ret` tag has been reached. A malformed chain
//! therefore leaves the buffer exactly as it was.

use crate::dma::tag::{read_word, write_word, DmaAddress, TagCursor, TagKind};
use crate::error::ChainError;
use crate::instance::{FixupState, InstanceBuffer, QUAD_WORD};

const QUAD_WORD_U32: u32 = QUAD_WORD as u32;

/// What a fix or unfix call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// The chain was relocated; `references` ADDR words were rewritten
    Relocated {
        /// Number of `ref` tags patched
        references: usize,
    },
    /// The buffer was not in a state this pass applies to; nothing changed
    Skipped,
}

/// Rewrite every `ref` offset as an absolute address starting at `base`
///
/// Does nothing unless the buffer is [`FixupState::Unfixed`]: fixed buffers
/// are already absolute and passthrough buffers need no fix-up.
pub fn fix(buffer: &mut InstanceBuffer, base: DmaAddress) -> Result<FixOutcome, ChainError> {
    if buffer.state() != FixupState::Unfixed {
        return Ok(FixOutcome::Skipped);
    }

    let patches = collect_patches(buffer.as_bytes(), |tag_offset, offset| {
        offset
            .checked_mul(QUAD_WORD_U32)
            .and_then(|bytes| base.checked_add(bytes))
            .ok_or(ChainError::RelocationOverflow {
                tag_offset,
                offset,
                base,
            })
    })
    .inspect_err(|err| log::warn!("DMA fix-up aborted, buffer left unfixed: {err}"))?;

    let references = apply(buffer, &patches);
    buffer.mark_fixed(base);
    Ok(FixOutcome::Relocated { references })
}

/// Fix a buffer against the address of its own storage
///
/// Only valid where host memory is what the DMA controller sees.
pub fn fix_in_place(buffer: &mut InstanceBuffer) -> Result<FixOutcome, ChainError> {
    let base = buffer.host_base()?;
    fix(buffer, base)
}

/// Rewrite every absolute `ref` address as an offset from the buffer start
///
/// Does nothing unless the buffer is [`FixupState::Fixed`].
pub fn unfix(buffer: &mut InstanceBuffer) -> Result<FixOutcome, ChainError> {
    if buffer.state() != FixupState::Fixed {
        return Ok(FixOutcome::Skipped);
    }
    let base = buffer.base().ok_or(ChainError::MissingBase)?;

    let patches = collect_patches(buffer.as_bytes(), |tag_offset, address| {
        address
            .checked_sub(base)
            .filter(|diff| diff % QUAD_WORD_U32 == 0)
            .map(|diff| diff / QUAD_WORD_U32)
            .ok_or(ChainError::RelocationOutOfRange {
                tag_offset,
                address,
                base,
            })
    })
    .inspect_err(|err| log::warn!("DMA unfix aborted, buffer left fixed: {err}"))?;

    let references = apply(buffer, &patches);
    buffer.mark_unfixed();
    Ok(FixOutcome::Relocated { references })
}

/// Walk the chain to its terminator and compute the new ADDR words
fn collect_patches<F>(bytes: &[u8], mut relocate: F) -> Result<Vec<(usize, u32)>, ChainError>
where
    F: FnMut(usize, u32) -> Result<u32, ChainError>,
{
    let mut patches = Vec::new();
    for tag in TagCursor::new(bytes) {
        let tag = tag?;
        if tag.kind == TagKind::Reference {
            let at = tag.address_offset();
            patches.push((at, relocate(tag.offset, read_word(bytes, at)?)?));
        }
    }
    Ok(patches)
}

fn apply(buffer: &mut InstanceBuffer, patches: &[(usize, u32)]) -> usize {
    let bytes = buffer.bytes_mut();
    for &(at, value) in patches {
        write_word(bytes, at, value);
    }
    patches.len()
}
