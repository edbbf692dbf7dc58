//! Per-object lighting bits

use bitflags::bitflags;

bitflags! {
    /// Light types affecting an object, as reported by the lighting callback
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LightingBits: u32 {
        /// At least one directional light
        const DIRECT = 0x1;
        /// At least one point light
        const POINT = 0x2;
        /// At least one spot light
        const SPOT = 0x4;
    }
}

/// Lighting configurations that have their own vertex program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightingClass {
    /// Ambient light only
    Ambient,
    /// Ambient plus directional lights
    AmbientDirect,
    /// Any point or spot light present
    All,
}

impl LightingBits {
    /// Pick the vertex program class; unknown bits are ignored
    #[must_use]
    pub fn class(self) -> LightingClass {
        let bits = self & Self::all();
        if bits.is_empty() {
            LightingClass::Ambient
        } else if bits == Self::DIRECT {
            LightingClass::AmbientDirect
        } else {
            LightingClass::All
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lighting_classes() {
        assert_eq!(LightingBits::empty().class(), LightingClass::Ambient);
        assert_eq!(LightingBits::DIRECT.class(), LightingClass::AmbientDirect);
        assert_eq!(LightingBits::POINT.class(), LightingClass::All);
        assert_eq!((LightingBits::DIRECT | LightingBits::SPOT).class(), LightingClass::All);
    }

    #[test]
    fn test_bits_outside_mask_are_ignored() {
        assert_eq!(LightingBits::from_bits_retain(0x10).class(), LightingClass::Ambient);
        assert_eq!(LightingBits::from_bits_retain(0x11).class(), LightingClass::AmbientDirect);
    }
}
