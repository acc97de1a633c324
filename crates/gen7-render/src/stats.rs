use serde::Serialize;

/// Counters kept by the rendering context since it was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    /// Primitive commands written.
    pub primitives: u64,
    /// Runs that extended the previous primitive instead of issuing a new one.
    pub merged_primitives: u64,
    pub ca_passes: u64,
    /// Vertex runs copied into the batch itself.
    pub inline_vertex_uploads: u64,
    /// Vertex runs written into their own buffer.
    pub buffer_vertex_uploads: u64,
    pub binding_table_reuses: u64,
    pub submissions: u64,
}

impl RenderStats {
    pub fn vertex_uploads(&self) -> u64 {
        self.inline_vertex_uploads + self.buffer_vertex_uploads
    }
}
