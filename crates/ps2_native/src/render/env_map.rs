//! Environment-map texture matrices
//!
//! The env-map matrix takes view-space normals into texture space through
//! the inverse of the env frame's world matrix. Consecutive meshes usually
//! share one env frame, so the last matrix is kept in an [`EnvFrameCache`]
//! that the caller owns for the duration of one frame submission.

use std::collections::HashMap;

use nalgebra::Matrix4;

use crate::render::RenderError;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Identity of a frame (scene-graph node) supplying a world matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Source of world matrices for frames
pub trait FrameTransforms {
    /// World matrix of `frame`, if it exists
    fn world_matrix(&self, frame: FrameId) -> Option<Mat4>;
}

impl FrameTransforms for HashMap<FrameId, Mat4> {
    fn world_matrix(&self, frame: FrameId) -> Option<Mat4> {
        self.get(&frame).copied()
    }
}

/// Maps a unit normal's x/y from [-1, 1] to texture coordinates in [0, 1]
#[must_use]
pub fn normal_to_texcoord() -> Mat4 {
    Mat4::new(
        0.5, 0.0, 0.0, 0.5,
        0.0, -0.5, 0.0, 0.5,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// An env-map matrix and whether it differs from the previous one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvMatrix {
    /// Normal-to-texture matrix
    pub matrix: Mat4,
    /// False when the previous lookup was for the same frame
    pub changed: bool,
}

/// Last env frame and its matrix
#[derive(Debug, Clone, Default)]
pub struct EnvFrameCache {
    last: Option<(FrameId, Mat4)>,
}

impl EnvFrameCache {
    /// Create an empty cache
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Forget the cached frame
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Env-map matrix for `frame`, computed only when the frame changes
    pub fn env_matrix(
        &mut self,
        frame: FrameId,
        frames: &dyn FrameTransforms,
    ) -> Result<EnvMatrix, RenderError> {
        if let Some((last, matrix)) = self.last {
            if last == frame {
                return Ok(EnvMatrix { matrix, changed: false });
            }
        }

        let world = frames.world_matrix(frame).ok_or(RenderError::UnknownFrame(frame))?;
        let inverse = world.try_inverse().ok_or(RenderError::SingularFrame(frame))?;
        let matrix = normal_to_texcoord() * inverse;
        self.last = Some((frame, matrix));
        Ok(EnvMatrix { matrix, changed: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Vector3, Vector4};

    fn frames() -> HashMap<FrameId, Mat4> {
        HashMap::from([
            (FrameId(1), Mat4::identity()),
            (FrameId(2), Mat4::new_translation(&Vector3::new(1.0, 2.0, 3.0))),
            (FrameId(3), Mat4::zeros()),
        ])
    }

    #[test]
    fn test_identity_frame_maps_normals_to_texcoords() {
        let mut cache = EnvFrameCache::new();
        let env = cache.env_matrix(FrameId(1), &frames()).unwrap();
        assert!(env.changed);

        let up = env.matrix * Vector4::new(0.0, 1.0, 0.0, 1.0);
        assert_relative_eq!(up, Vector4::new(0.5, 0.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_same_frame_is_cached() {
        let frames = frames();
        let mut cache = EnvFrameCache::new();
        let first = cache.env_matrix(FrameId(2), &frames).unwrap();
        let second = cache.env_matrix(FrameId(2), &frames).unwrap();
        assert!(!second.changed);
        assert_relative_eq!(first.matrix, second.matrix);

        assert!(cache.env_matrix(FrameId(1), &frames).unwrap().changed);
        cache.clear();
        assert!(cache.env_matrix(FrameId(1), &frames).unwrap().changed);
    }

    #[test]
    fn test_translation_is_inverted() {
        let mut cache = EnvFrameCache::new();
        let env = cache.env_matrix(FrameId(2), &frames()).unwrap();
        let expected = normal_to_texcoord() * Mat4::new_translation(&Vector3::new(-1.0, -2.0, -3.0));
        assert_relative_eq!(env.matrix, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_bad_frames() {
        let mut cache = EnvFrameCache::new();
        assert!(matches!(
            cache.env_matrix(FrameId(3), &frames()),
            Err(RenderError::SingularFrame(FrameId(3)))
        ));
        assert!(matches!(
            cache.env_matrix(FrameId(9), &frames()),
            Err(RenderError::UnknownFrame(FrameId(9)))
        ));
    }
}
