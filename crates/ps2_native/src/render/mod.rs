//! Render dispatch for PS2 instance data
//!
//! For each mesh of a geometry this picks the vertex and pixel programs from
//! the object's lighting bits and the material effect, makes sure the mesh's
//! DMA chain is fixed, and hands both to a [`RenderBackend`].
//!
//! # Design Philosophy
//!
//! The dispatcher only decides *what* to draw:
//! - Program objects, textures and constants belong to the backend
//! - Buffers reach the backend fixed, never in their file form
//! - Per-frame memoisation lives in an explicit [`EnvFrameCache`]

pub mod effect;
pub mod env_map;
pub mod lighting;

pub use effect::{
    EffectKind, EffectSupport, EnvMap, EnvTexture, MaterialEffect, PixelProgram, TextureId,
    VertexProgram,
};
pub use env_map::{normal_to_texcoord, EnvFrameCache, EnvMatrix, FrameId, FrameTransforms, Mat4};
pub use lighting::{LightingBits, LightingClass};

use thiserror::Error;

use crate::config::{Config, Deserialize, Serialize};
use crate::dma::{fix, DmaAddress};
use crate::error::ChainError;
use crate::instance::{FixupState, InstanceBuffer, InstanceHeader};

/// Render dispatch errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// A mesh's DMA chain could not be fixed
    #[error("DMA chain error: {0}")]
    Chain(#[from] ChainError),

    /// The geometry has a different number of materials than meshes
    #[error("{materials} materials for {meshes} meshes")]
    MaterialCountMismatch {
        /// Meshes in the instance header
        meshes: usize,
        /// Materials supplied
        materials: usize,
    },

    /// An env frame has no world matrix
    #[error("unknown frame {0:?}")]
    UnknownFrame(FrameId),

    /// An env frame's world matrix cannot be inverted
    #[error("frame {0:?} has a singular world matrix")]
    SingularFrame(FrameId),

    /// The backend failed to draw
    #[error("backend error: {0}")]
    Backend(String),
}

/// Render settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Modulate the env reflection by vertex color (PS2 look) instead of
    /// clamping vertex color to white first (PC look)
    pub modulate_env_map: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self { modulate_env_map: true }
    }
}

impl Config for RenderSettings {}

impl RenderSettings {
    /// Vertex color clamp constant for the env pixel programs
    #[must_use]
    pub const fn color_clamp(&self) -> [f32; 4] {
        if self.modulate_env_map {
            [0.0; 4]
        } else {
            [1.0; 4]
        }
    }
}

/// Material data the dispatcher needs for one mesh
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshMaterial {
    /// Material color, RGBA
    pub color: [u8; 4],
    /// Base texture
    pub texture: Option<TextureId>,
    /// Material effect
    pub effect: MaterialEffect,
    /// Whether the mesh's vertices carry alpha
    pub vertex_alpha: bool,
}

impl MeshMaterial {
    fn needs_alpha(&self) -> bool {
        self.vertex_alpha || self.color[3] != 255
    }
}

/// Per-object inputs to dispatch
pub struct RenderContext<'a> {
    /// Lights affecting the object
    pub lighting: LightingBits,
    /// Whether the geometry has normals
    pub has_normals: bool,
    /// Frame used by env maps that do not name one
    pub camera_frame: FrameId,
    /// World matrices for env frames
    pub frames: &'a dyn FrameTransforms,
    /// Render settings
    pub settings: RenderSettings,
}

/// Why a mesh was drawn with the default programs despite its effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// The effect is not implemented
    Unsupported(EffectKind),
    /// Env map without a texture or with zero coefficient
    EnvMapDisabled,
    /// Env map on geometry without normals
    MissingNormals,
}

/// Env-map pass parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvPass {
    /// Reflection texture, bound to stage 1
    pub texture: TextureId,
    /// Normal-to-texture matrix
    pub matrix: EnvMatrix,
    /// Reflection strength
    pub shininess: f32,
    /// Vertex color clamp
    pub color_clamp: [f32; 4],
}

/// Everything the backend needs to draw one mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    /// Mesh index within the geometry
    pub mesh: usize,
    /// Vertex program
    pub vertex_program: VertexProgram,
    /// Pixel program
    pub pixel_program: PixelProgram,
    /// Base texture, bound to stage 0
    pub texture: Option<TextureId>,
    /// Env-map pass, drawn with additive source blending
    pub env: Option<EnvPass>,
    /// Whether alpha blending is needed
    pub vertex_alpha: bool,
    /// Set when the effect could not be honoured
    pub fallback: Option<Fallback>,
}

/// Graphics backend consuming fixed instance data
pub trait RenderBackend {
    /// DMA address the mesh's buffer will be transferred from
    ///
    /// Defaults to the buffer's own storage address.
    fn dma_base(&mut self, mesh: usize, buffer: &InstanceBuffer) -> Result<DmaAddress, ChainError> {
        let _ = mesh;
        buffer.host_base()
    }

    /// Draw one mesh from its fixed DMA chain
    fn draw(&mut self, command: &DrawCommand, data: &[u8]) -> Result<(), RenderError>;
}

/// Select programs for one mesh
pub fn plan_draw(
    mesh: usize,
    material: &MeshMaterial,
    ctx: &RenderContext<'_>,
    cache: &mut EnvFrameCache,
) -> Result<DrawCommand, RenderError> {
    let lighting = ctx.lighting.class();
    let textured = material.texture.is_some();
    let default = DrawCommand {
        mesh,
        vertex_program: VertexProgram::Default(lighting),
        pixel_program: PixelProgram::default_for(textured),
        texture: material.texture,
        env: None,
        vertex_alpha: material.needs_alpha(),
        fallback: None,
    };
    let fallback = |reason: Fallback| -> Result<DrawCommand, RenderError> {
        Ok(DrawCommand { fallback: Some(reason), ..default })
    };

    match material.effect.support() {
        EffectSupport::Default => Ok(default),
        EffectSupport::Unsupported(kind) => {
            log::trace!("Mesh {mesh}: {kind:?} not supported, using default programs");
            fallback(Fallback::Unsupported(kind))
        }
        EffectSupport::EnvMap(_) if !ctx.has_normals => fallback(Fallback::MissingNormals),
        EffectSupport::EnvMap(env) => {
            let Some(texture) = env.texture.filter(|_| env.coefficient != 0.0) else {
                return fallback(Fallback::EnvMapDisabled);
            };
            let matrix = cache.env_matrix(env.frame.unwrap_or(ctx.camera_frame), ctx.frames)?;
            Ok(DrawCommand {
                vertex_program: VertexProgram::EnvMap(lighting),
                pixel_program: PixelProgram::env_map_for(textured),
                env: Some(EnvPass {
                    texture: texture.id,
                    matrix,
                    shininess: env.coefficient,
                    color_clamp: ctx.settings.color_clamp(),
                }),
                vertex_alpha: texture.has_alpha || material.needs_alpha(),
                ..default
            })
        }
    }
}

/// Make sure a buffer is fixed and return its bytes
fn prepare<'b, B: RenderBackend>(
    mesh: usize,
    buffer: &'b mut InstanceBuffer,
    backend: &mut B,
) -> Result<&'b [u8], RenderError> {
    if buffer.state() == FixupState::Unfixed {
        let base = backend.dma_base(mesh, buffer)?;
        fix(buffer, base)?;
    }
    Ok(buffer.as_bytes())
}

/// Draw every mesh of a geometry
///
/// Unfixed buffers are fixed before they reach the backend and stay fixed
/// afterwards. Returns the number of meshes drawn.
pub fn render_geometry<B: RenderBackend>(
    header: &mut InstanceHeader,
    materials: &[MeshMaterial],
    ctx: &RenderContext<'_>,
    cache: &mut EnvFrameCache,
    backend: &mut B,
) -> Result<usize, RenderError> {
    if materials.len() != header.mesh_count() {
        return Err(RenderError::MaterialCountMismatch {
            meshes: header.mesh_count(),
            materials: materials.len(),
        });
    }

    for (mesh, (buffer, material)) in header.meshes_mut().iter_mut().zip(materials).enumerate() {
        let command = plan_draw(mesh, material, ctx, cache)?;
        let data = prepare(mesh, buffer, backend)?;
        backend.draw(&command, data)?;
    }
    Ok(materials.len())
}
