//! Error types for tag chains and the native-data stream

use thiserror::Error;

/// Errors raised while decoding or relocating a DMA tag chain
///
/// All offsets are byte offsets from the start of the instance buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The tag id bits match none of `cnt`, `ref` or `ret`
    #[error("unknown DMA tag {word:#010X} at offset {offset:#x}")]
    UnknownTag {
        /// Offset of the offending tag
        offset: usize,
        /// The raw first tag word
        word: u32,
    },

    /// The chain ran past the end of the buffer before reaching a `ret` tag
    #[error("tag chain truncated at offset {offset:#x}: needs {needed} bytes, buffer holds {len}")]
    Truncated {
        /// Offset where the missing bytes start
        offset: usize,
        /// Bytes required from `offset`
        needed: usize,
        /// Total buffer length
        len: usize,
    },

    /// `base + offset * 16` does not fit in a 32-bit address
    #[error("relocating quad-word offset {offset:#x} against base {base:#010X} overflows")]
    RelocationOverflow {
        /// Offset of the `ref` tag
        tag_offset: usize,
        /// Relative quad-word offset stored in the tag
        offset: u32,
        /// Base address being applied
        base: u32,
    },

    /// An absolute address lies below the base or is not quad-word granular
    #[error("address {address:#010X} in tag at {tag_offset:#x} is not a quad-word offset from base {base:#010X}")]
    RelocationOutOfRange {
        /// Offset of the `ref` tag
        tag_offset: usize,
        /// Absolute address stored in the tag
        address: u32,
        /// Base address the buffer was fixed against
        base: u32,
    },

    /// A `ref` tag points at payload outside the buffer
    #[error("ref tag at {tag_offset:#x} points at {len} bytes from offset {offset:#x}, outside the {buffer_len}-byte buffer")]
    ReferenceOutOfBounds {
        /// Offset of the `ref` tag
        tag_offset: usize,
        /// Resolved payload offset
        offset: usize,
        /// Payload length in bytes
        len: usize,
        /// Total buffer length
        buffer_len: usize,
    },

    /// The buffer is marked fixed but the base it was fixed against is unknown
    #[error("buffer is fixed against an unknown base address")]
    MissingBase,

    /// A host address cannot be expressed as a 32-bit DMA address
    #[error("host address {0:#x} does not fit in a 32-bit DMA address")]
    AddressOutOfRange(usize),
}

/// Errors raised by the native-data stream codec
#[derive(Error, Debug)]
pub enum NativeDataError {
    /// IO error from the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream carries data for another platform
    #[error("platform mismatch: expected {expected}, found {found}")]
    Format {
        /// Platform id this codec accepts
        expected: u32,
        /// Platform id found in the stream
        found: u32,
    },

    /// A required chunk was not found before end of stream
    #[error("chunk {0:#x} not found")]
    MissingChunk(u32),

    /// A mesh record carries a fix-up state other than 0, 1 or 2
    #[error("invalid fix-up state {state} for mesh {mesh}")]
    InvalidFixupState {
        /// Mesh index
        mesh: usize,
        /// Raw state value
        state: u32,
    },

    /// The ADC chunk payload was not the expected zero word
    #[error("invalid ADC payload {0:#x}")]
    InvalidAdc(u32),

    /// Tag chain failure while unfixing for write
    #[error("tag chain error: {0}")]
    Chain(#[from] ChainError),
}
