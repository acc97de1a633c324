//! Renderer tunables.

use serde::{Deserialize, Serialize};

/// Largest surface dimension the 3D pipe can address.
pub const MAX_3D_SIZE: u32 = 16384;
/// Floats held by the vertex staging arena.
pub const VERTEX_CAPACITY: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Largest width/height accepted for any bound surface.
    pub max_3d_size: u32,
    /// Capacity of the vertex staging arena, in floats.
    pub vertex_capacity: usize,
    /// Words that must be free before state emission starts; otherwise the batch is submitted.
    pub state_reserve_words: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_3d_size: MAX_3D_SIZE,
            vertex_capacity: VERTEX_CAPACITY,
            state_reserve_words: 150,
        }
    }
}

impl RenderConfig {
    pub fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.max_3d_size && height <= self.max_3d_size
    }
}
