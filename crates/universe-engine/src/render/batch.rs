use crate::buffer::{Bindable, GrowableBuffer};
use crate::device::{BufferTarget, BufferUsage, Primitive, ScalarType};
use crate::error::{RenderError, Result};
use crate::layout::{ATTR_COLOR, ATTR_POSITION, AttributeLayout};

use super::context::RenderContext;
use super::renderable::Renderable;

/// Floats per batched vertex: position (2) + color (4).
pub const BATCH_VERTEX_FLOATS: usize = 6;

/// Largest batch addressable with 16-bit indices.
pub const MAX_BATCH_VERTICES: usize = u16::MAX as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Vertices accumulated before a flush is forced.
    pub max_vertices: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_vertices: 4000 }
    }
}

/// Accumulates renderables into one shared vertex/index buffer pair and
/// draws them with a single indexed call per flush.
///
/// `begin` -> `submit`* -> `end`. A submission that would push the batch
/// past `max_vertices` flushes what is pending first.
#[derive(Debug)]
pub struct BatchRenderer {
    config: BatchConfig,
    vertices: GrowableBuffer<f32>,
    indices: GrowableBuffer<u16>,
    layout: AttributeLayout,
    /// Rebased copy of the incoming indices; the caller's array is never touched.
    scratch: Vec<u16>,
    running: usize,
    drawing: bool,
    flushes: u64,
}

impl BatchRenderer {
    pub fn new(ctx: &mut RenderContext, config: BatchConfig) -> Result<Self> {
        if config.max_vertices == 0 || config.max_vertices > MAX_BATCH_VERTICES {
            return Err(RenderError::capacity(
                "batch renderer",
                config.max_vertices,
                MAX_BATCH_VERTICES,
            ));
        }

        let mut layout = AttributeLayout::new();
        layout.register(ATTR_POSITION, ScalarType::Float, 2)?;
        layout.register(ATTR_COLOR, ScalarType::Float, 4)?;

        let vertices = GrowableBuffer::new(
            ctx,
            BufferTarget::Vertex,
            BufferUsage::Dynamic,
            config.max_vertices * BATCH_VERTEX_FLOATS,
        )?;
        let indices =
            GrowableBuffer::new(ctx, BufferTarget::Index, BufferUsage::Dynamic, config.max_vertices)?;

        log::debug!("batch renderer ready: {} vertices per flush", config.max_vertices);
        Ok(Self {
            config,
            vertices,
            indices,
            layout,
            scratch: Vec::new(),
            running: 0,
            drawing: false,
            flushes: 0,
        })
    }

    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Vertices submitted since the last flush.
    pub fn running_count(&self) -> usize {
        self.running
    }

    /// Flushes issued since creation.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Rebased indices waiting for the next flush.
    pub fn pending_indices(&self) -> &[u16] {
        self.indices.as_slice()
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.drawing {
            return Err(RenderError::usage("batch renderer", "begin called while drawing"));
        }
        self.drawing = true;
        Ok(())
    }

    pub fn submit(&mut self, ctx: &mut RenderContext, renderable: &dyn Renderable) -> Result<()> {
        if !self.drawing {
            return Err(RenderError::usage("batch renderer", "submit called while idle"));
        }

        let count = renderable.vertex_count();
        let vertices = renderable.vertices();
        let indices = renderable.indices();
        self.validate(count, vertices, indices)?;
        if count == 0 {
            return Ok(());
        }

        if self.running + count > self.config.max_vertices {
            self.flush(ctx)?;
        }

        // `running + count <= max_vertices <= 65536`, so every rebased index fits.
        let base = self.running as u16;
        self.scratch.clear();
        self.scratch.extend(indices.iter().map(|&i| i + base));

        let mark = self.vertices.position();
        self.vertices.put(ctx, vertices)?;
        if let Err(err) = self.indices.put(ctx, &self.scratch) {
            // Drop the vertices again so nothing pending lacks its indices.
            self.vertices.set_position(mark)?;
            return Err(err);
        }
        self.running += count;
        Ok(())
    }

    fn validate(&self, count: usize, vertices: &[f32], indices: &[u16]) -> Result<()> {
        if count > self.config.max_vertices {
            return Err(RenderError::capacity(
                "batch renderable",
                count,
                self.config.max_vertices,
            ));
        }
        if vertices.len() != count * BATCH_VERTEX_FLOATS {
            return Err(RenderError::mismatch(
                "batch renderable",
                format!(
                    "{count} vertices need {} floats, got {}",
                    count * BATCH_VERTEX_FLOATS,
                    vertices.len()
                ),
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= count) {
            return Err(RenderError::mismatch(
                "batch renderable",
                format!("index {bad} out of range for {count} vertices"),
            ));
        }
        Ok(())
    }

    /// Draws what is pending with one indexed call, then rewinds both buffers.
    pub fn flush(&mut self, ctx: &mut RenderContext) -> Result<()> {
        if !self.drawing {
            return Err(RenderError::usage("batch renderer", "flush called while idle"));
        }
        if self.indices.is_empty() {
            self.running = 0;
            self.vertices.clear()?;
            return Ok(());
        }

        let shader = ctx.shaders().batch;
        ctx.use_shader(Some(shader))?;
        let view_projection = ctx.view_projection();
        ctx.set_transform(view_projection)?;
        self.vertices.bind(ctx)?;
        self.indices.bind(ctx)?;
        self.layout.bind_all(ctx, shader)?;
        ctx.draw_elements(Primitive::Triangles, 0, self.indices.count() as u32)?;

        log::debug!(
            "batch flush #{}: {} vertices, {} indices",
            self.flushes + 1,
            self.running,
            self.indices.count()
        );
        self.vertices.clear()?;
        self.indices.clear()?;
        self.running = 0;
        self.flushes += 1;
        Ok(())
    }

    /// Flushes the remainder and returns to idle.
    pub fn end(&mut self, ctx: &mut RenderContext) -> Result<()> {
        if !self.drawing {
            return Err(RenderError::usage("batch renderer", "end called while idle"));
        }
        self.flush(ctx)?;
        self.drawing = false;
        Ok(())
    }

    /// Drops whatever is pending and returns to idle without drawing.
    /// Used when a frame fails halfway.
    pub fn abandon(&mut self) {
        if self.running > 0 {
            log::warn!("batch renderer: discarding {} pending vertices", self.running);
        }
        // Only fails on disposed buffers, and then there is nothing to discard.
        let _ = self.vertices.clear();
        let _ = self.indices.clear();
        self.running = 0;
        self.drawing = false;
    }

    pub fn dispose(&mut self, ctx: &mut RenderContext) -> Result<()> {
        self.vertices.dispose(ctx)?;
        self.indices.dispose(ctx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CallLog, DeviceCall};
    use crate::paint::Color;
    use crate::render::context::tests::recording_context;
    use crate::render::renderable::BatchMesh;

    fn mesh(vertex_count: usize, indices: &[u16]) -> BatchMesh {
        let mut vertices = Vec::new();
        for i in 0..vertex_count {
            vertices.extend_from_slice(&[i as f32, 0.0]);
            vertices.extend_from_slice(&Color::WHITE.to_array());
        }
        BatchMesh::from_parts(vertices, indices.to_vec())
    }

    fn batch(max_vertices: usize) -> (RenderContext, CallLog, BatchRenderer) {
        let (mut ctx, log) = recording_context();
        let batch = BatchRenderer::new(&mut ctx, BatchConfig { max_vertices }).unwrap();
        log.clear();
        (ctx, log, batch)
    }

    fn indexed_draws(log: &CallLog) -> Vec<Vec<u16>> {
        log.draws()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::DrawElements { indices, .. } => Some(indices),
                _ => None,
            })
            .collect()
    }

    // ── state machine ─────────────────────────────────────────────────────

    #[test]
    fn begin_twice_fails() {
        let (_ctx, _log, mut batch) = batch(10);
        batch.begin().unwrap();
        let err = batch.begin().unwrap_err();
        assert!(matches!(err, RenderError::UsageState { .. }));
    }

    #[test]
    fn submit_or_end_while_idle_fails() {
        let (mut ctx, log, mut batch) = batch(10);
        let quad = mesh(4, &[0, 1, 2, 0, 2, 3]);
        assert!(matches!(
            batch.submit(&mut ctx, &quad),
            Err(RenderError::UsageState { .. })
        ));
        assert!(batch.end(&mut ctx).is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn failed_index_write_rewinds_vertices() {
        let (mut ctx, _log, mut batch) = batch(100);
        let quad = mesh(4, &[0, 1, 2, 0, 2, 3]);
        batch.begin().unwrap();
        batch.submit(&mut ctx, &quad).unwrap();
        let mark = batch.vertices.position();

        batch.indices.dispose(&mut ctx).unwrap();
        let err = batch.submit(&mut ctx, &quad).unwrap_err();
        assert!(matches!(err, RenderError::ResourceState { .. }));
        assert_eq!(batch.vertices.position(), mark);
        assert_eq!(batch.running, 4);
    }

    // ── rebasing ──────────────────────────────────────────────────────────

    #[test]
    fn indices_are_rebased_across_renderables() {
        let (mut ctx, log, mut batch) = batch(100);
        let first = mesh(4, &[0, 1, 2, 1, 2, 3]);
        let second = mesh(3, &[0, 1, 2]);

        batch.begin().unwrap();
        batch.submit(&mut ctx, &first).unwrap();
        batch.submit(&mut ctx, &second).unwrap();

        assert_eq!(batch.pending_indices(), &[0, 1, 2, 1, 2, 3, 4, 5, 6]);
        assert_eq!(batch.running_count(), 7);
        // Callers keep their local indices.
        assert_eq!(second.indices(), &[0, 1, 2]);

        batch.end(&mut ctx).unwrap();
        assert_eq!(indexed_draws(&log), vec![vec![0, 1, 2, 1, 2, 3, 4, 5, 6]]);
    }

    #[test]
    fn resubmitting_the_same_renderable_is_stable() {
        let (mut ctx, _log, mut batch) = batch(100);
        let tri = mesh(3, &[0, 1, 2]);
        batch.begin().unwrap();
        batch.submit(&mut ctx, &tri).unwrap();
        batch.submit(&mut ctx, &tri).unwrap();
        assert_eq!(batch.pending_indices(), &[0, 1, 2, 3, 4, 5]);
        batch.end(&mut ctx).unwrap();
    }

    // ── flushing ──────────────────────────────────────────────────────────

    #[test]
    fn overflow_flushes_exactly_once() {
        let (mut ctx, log, mut batch) = batch(10);
        let six = mesh(6, &[0, 1, 2, 3, 4, 5]);

        batch.begin().unwrap();
        batch.submit(&mut ctx, &six).unwrap();
        assert_eq!(batch.flush_count(), 0);
        batch.submit(&mut ctx, &six).unwrap();

        assert_eq!(batch.flush_count(), 1);
        assert_eq!(batch.running_count(), 6);
        assert_eq!(indexed_draws(&log), vec![vec![0, 1, 2, 3, 4, 5]]);
        assert_eq!(batch.pending_indices(), &[0, 1, 2, 3, 4, 5]);

        batch.end(&mut ctx).unwrap();
        assert_eq!(batch.flush_count(), 2);
    }

    #[test]
    fn filling_exactly_to_capacity_does_not_flush() {
        let (mut ctx, _log, mut batch) = batch(10);
        batch.begin().unwrap();
        batch.submit(&mut ctx, &mesh(4, &[0, 1, 2])).unwrap();
        batch.submit(&mut ctx, &mesh(6, &[0, 1, 2])).unwrap();
        assert_eq!(batch.flush_count(), 0);
        assert_eq!(batch.running_count(), 10);
        batch.end(&mut ctx).unwrap();
    }

    #[test]
    fn empty_end_draws_nothing() {
        let (mut ctx, log, mut batch) = batch(10);
        batch.begin().unwrap();
        batch.end(&mut ctx).unwrap();
        assert!(log.draws().is_empty());
        assert_eq!(batch.flush_count(), 0);
    }

    #[test]
    fn flush_draws_with_camera_transform() {
        let (mut ctx, log, mut batch) = batch(10);
        let vp = glam::Mat4::from_scale(glam::Vec3::splat(0.5));
        ctx.set_view_projection(vp);

        batch.begin().unwrap();
        batch.submit(&mut ctx, &mesh(3, &[0, 1, 2])).unwrap();
        batch.end(&mut ctx).unwrap();

        let calls = log.calls();
        assert!(calls.contains(&DeviceCall::UseShader(Some(ctx.shaders().batch))));
        assert!(calls.contains(&DeviceCall::SetTransform(vp)));
    }

    // ── validation ────────────────────────────────────────────────────────

    #[test]
    fn rejects_invalid_renderables() {
        let (mut ctx, _log, mut batch) = batch(10);
        batch.begin().unwrap();

        let too_big = mesh(11, &[]);
        assert!(matches!(
            batch.submit(&mut ctx, &too_big),
            Err(RenderError::Capacity { .. })
        ));

        let out_of_range = mesh(3, &[0, 1, 3]);
        assert!(matches!(
            batch.submit(&mut ctx, &out_of_range),
            Err(RenderError::ConfigurationMismatch { .. })
        ));

        assert_eq!(batch.running_count(), 0);
        assert!(batch.pending_indices().is_empty());
    }

    #[test]
    fn vertex_length_must_match_count() {
        struct Lying;
        impl Renderable for Lying {
            fn vertices(&self) -> &[f32] {
                &[0.0; 7]
            }
            fn indices(&self) -> &[u16] {
                &[]
            }
            fn vertex_count(&self) -> usize {
                1
            }
        }

        let (mut ctx, _log, mut batch) = batch(10);
        batch.begin().unwrap();
        let err = batch.submit(&mut ctx, &Lying).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn limits_are_checked_on_creation() {
        let (mut ctx, _log) = recording_context();
        for max_vertices in [0, MAX_BATCH_VERTICES + 1] {
            let err = BatchRenderer::new(&mut ctx, BatchConfig { max_vertices }).unwrap_err();
            assert!(matches!(err, RenderError::Capacity { .. }));
        }
    }
}
