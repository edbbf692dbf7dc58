//! Material effects and the programs they select

use crate::render::env_map::FrameId;
use crate::render::lighting::LightingClass;

/// Opaque texture handle owned by the graphics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Environment-map texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvTexture {
    /// Texture handle
    pub id: TextureId,
    /// Whether the texture has an alpha channel
    pub has_alpha: bool,
}

/// Environment-map effect parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvMap {
    /// Reflection texture; the effect is off without one
    pub texture: Option<EnvTexture>,
    /// Reflection strength; the effect is off at zero
    pub coefficient: f32,
    /// Frame the reflection is relative to; `None` means the camera
    pub frame: Option<FrameId>,
}

/// Material effect attached to a mesh's material
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MaterialEffect {
    /// No effect
    #[default]
    Nothing,
    /// Environment map
    EnvMap(EnvMap),
    /// Bump map
    BumpMap,
    /// Bump map plus environment map
    BumpEnvMap,
    /// Dual texture pass
    Dual,
    /// Texture-coordinate transform
    UvTransform,
    /// Dual texture pass with texture-coordinate transform
    DualUvTransform,
}

/// Kind of a material effect, without its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// See [`MaterialEffect::Nothing`]
    Nothing,
    /// See [`MaterialEffect::EnvMap`]
    EnvMap,
    /// See [`MaterialEffect::BumpMap`]
    BumpMap,
    /// See [`MaterialEffect::BumpEnvMap`]
    BumpEnvMap,
    /// See [`MaterialEffect::Dual`]
    Dual,
    /// See [`MaterialEffect::UvTransform`]
    UvTransform,
    /// See [`MaterialEffect::DualUvTransform`]
    DualUvTransform,
}

/// How this renderer handles an effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectSupport<'a> {
    /// Rendered with the default programs
    Default,
    /// Rendered with the env-map programs
    EnvMap(&'a EnvMap),
    /// Not implemented; rendered with the default programs instead
    Unsupported(EffectKind),
}

impl MaterialEffect {
    /// The effect's kind
    #[must_use]
    pub const fn kind(&self) -> EffectKind {
        match self {
            Self::Nothing => EffectKind::Nothing,
            Self::EnvMap(_) => EffectKind::EnvMap,
            Self::BumpMap => EffectKind::BumpMap,
            Self::BumpEnvMap => EffectKind::BumpEnvMap,
            Self::Dual => EffectKind::Dual,
            Self::UvTransform => EffectKind::UvTransform,
            Self::DualUvTransform => EffectKind::DualUvTransform,
        }
    }

    /// How the effect is rendered
    #[must_use]
    pub const fn support(&self) -> EffectSupport<'_> {
        match self {
            Self::Nothing => EffectSupport::Default,
            Self::EnvMap(env) => EffectSupport::EnvMap(env),
            Self::BumpMap | Self::BumpEnvMap | Self::Dual | Self::UvTransform | Self::DualUvTransform => {
                EffectSupport::Unsupported(self.kind())
            }
        }
    }
}

/// Vertex program variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexProgram {
    /// Plain lit geometry
    Default(LightingClass),
    /// Lit geometry with env-map texture coordinates
    EnvMap(LightingClass),
}

/// Pixel program variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelProgram {
    /// Vertex color only
    Default,
    /// Vertex color times base texture
    DefaultTextured,
    /// Vertex color plus env reflection
    EnvMap,
    /// Base texture plus env reflection
    EnvMapTextured,
}

impl PixelProgram {
    /// Default pixel program for a material with or without a base texture
    #[must_use]
    pub const fn default_for(textured: bool) -> Self {
        if textured {
            Self::DefaultTextured
        } else {
            Self::Default
        }
    }

    /// Env-map pixel program for a material with or without a base texture
    #[must_use]
    pub const fn env_map_for(textured: bool) -> Self {
        if textured {
            Self::EnvMapTextured
        } else {
            Self::EnvMap
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_effects_are_explicit() {
        for effect in [
            MaterialEffect::BumpMap,
            MaterialEffect::BumpEnvMap,
            MaterialEffect::Dual,
            MaterialEffect::UvTransform,
            MaterialEffect::DualUvTransform,
        ] {
            assert_eq!(effect.support(), EffectSupport::Unsupported(effect.kind()));
        }
    }

    #[test]
    fn test_supported_effects() {
        assert_eq!(MaterialEffect::Nothing.support(), EffectSupport::Default);

        let env = EnvMap { texture: None, coefficient: 1.0, frame: None };
        assert_eq!(MaterialEffect::EnvMap(env).support(), EffectSupport::EnvMap(&env));
    }

    #[test]
    fn test_pixel_program_choice() {
        assert_eq!(PixelProgram::default_for(true), PixelProgram::DefaultTextured);
        assert_eq!(PixelProgram::default_for(false), PixelProgram::Default);
        assert_eq!(PixelProgram::env_map_for(true), PixelProgram::EnvMapTextured);
        assert_eq!(PixelProgram::env_map_for(false), PixelProgram::EnvMap);
    }
}
