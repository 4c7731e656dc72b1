use bytemuck::Pod;

use crate::device::{BufferId, BufferTarget, BufferUsage};
use crate::error::{RenderError, Result};
use crate::render::RenderContext;

use super::Bindable;
use super::growth::{BUFFER_GROWTH_THRESHOLD, grow_capacity};

/// Typed device buffer that grows on demand.
///
/// A CPU shadow of `capacity` elements mirrors the device allocation. Writes
/// land in the shadow first and are uploaded right away, so draws always
/// observe the latest `put`/`set`/`unmap`.
///
/// Invariant: `position <= count <= capacity`, and `capacity` never shrinks.
#[derive(Debug)]
pub struct GrowableBuffer<T: Pod> {
    id: Option<BufferId>,
    target: BufferTarget,
    usage: BufferUsage,
    immutable: bool,
    data: Vec<T>,
    position: usize,
    count: usize,
    mapped: bool,
    /// Device allocation matches `data.len()`.
    stored: bool,
}

impl<T: Pod> GrowableBuffer<T> {
    pub fn new(
        ctx: &mut RenderContext,
        target: BufferTarget,
        usage: BufferUsage,
        capacity: usize,
    ) -> Result<Self> {
        let id = ctx.create_buffer(target, usage)?;
        Ok(Self {
            id: Some(id),
            target,
            usage,
            immutable: false,
            data: vec![T::zeroed(); capacity],
            position: 0,
            count: 0,
            mapped: false,
            stored: false,
        })
    }

    /// Buffer sized exactly to `data` that refuses to grow afterwards.
    pub fn immutable(ctx: &mut RenderContext, target: BufferTarget, data: &[T]) -> Result<Self> {
        let mut buffer = Self::new(ctx, target, BufferUsage::Static, data.len())?;
        buffer.immutable = true;
        buffer.put(ctx, data)?;
        Ok(buffer)
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn target(&self) -> BufferTarget {
        self.target
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// High-water mark of written elements.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Next write cursor of `put`.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.id.is_none()
    }

    /// Written elements, as the next draw will see them.
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.count]
    }

    pub fn id(&self) -> Result<BufferId> {
        self.id
            .ok_or_else(|| RenderError::resource(self.label(), "disposed"))
    }

    pub fn is_bound(&self, ctx: &RenderContext) -> bool {
        self.id
            .is_some_and(|id| ctx.cache().is_buffer_bound(self.target, id))
    }

    fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{} {id}", self.target),
            None => format!("disposed {} buffer", self.target),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.id()?;
        if self.mapped {
            return Err(RenderError::usage(self.label(), "is mapped"));
        }
        Ok(())
    }

    // ── writing ───────────────────────────────────────────────────────────

    /// Appends at `position`.
    pub fn put(&mut self, ctx: &mut RenderContext, values: &[T]) -> Result<()> {
        self.ensure_writable()?;
        let start = self.position;
        let end = self.end_of(start, values.len())?;
        self.reserve(end)?;

        self.data[start..end].copy_from_slice(values);
        self.upload(ctx, start, end)?;

        self.position = end;
        self.count = self.count.max(end);
        Ok(())
    }

    /// Writes at `offset`. Moves `position` only when the write reaches past it.
    pub fn set(&mut self, ctx: &mut RenderContext, offset: usize, values: &[T]) -> Result<()> {
        self.ensure_writable()?;
        let end = self.end_of(offset, values.len())?;
        self.reserve(end)?;

        self.data[offset..end].copy_from_slice(values);
        self.upload(ctx, offset, end)?;

        if end > self.position {
            self.position = end;
            self.count = self.count.max(end);
        }
        Ok(())
    }

    /// Moves the write cursor, e.g. after filling a mapped window or to
    /// rewind a partial write. `count` never shrinks here.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        self.ensure_writable()?;
        if position > self.capacity() {
            return Err(RenderError::capacity(self.label(), position, self.capacity()));
        }
        self.position = position;
        self.count = self.count.max(position);
        Ok(())
    }

    /// Resets `position` and `count`. Capacity and device memory are kept.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.position = 0;
        self.count = 0;
        Ok(())
    }

    /// Grows the shadow so that at least `min` elements fit. The device
    /// allocation follows on the next upload.
    pub fn reserve(&mut self, min: usize) -> Result<()> {
        self.id()?;
        let capacity = self.capacity();
        if min <= capacity {
            return Ok(());
        }
        if self.immutable {
            return Err(RenderError::usage(
                self.label(),
                format!("immutable buffer of {capacity} elements cannot grow to {min}"),
            ));
        }

        let grown = grow_capacity(capacity, min, BUFFER_GROWTH_THRESHOLD)?;
        log::debug!("{}: growing {capacity} -> {grown} elements", self.label());
        self.data.resize(grown, T::zeroed());
        self.stored = false;
        Ok(())
    }

    fn end_of(&self, offset: usize, len: usize) -> Result<usize> {
        offset
            .checked_add(len)
            .ok_or_else(|| RenderError::capacity(self.label(), usize::MAX, super::MAX_CAPACITY))
    }

    fn upload(&mut self, ctx: &mut RenderContext, start: usize, end: usize) -> Result<()> {
        if start == end && self.stored {
            return Ok(());
        }
        self.bind(ctx)?;
        if self.stored {
            let bytes: &[u8] = bytemuck::cast_slice(&self.data[start..end]);
            ctx.buffer_sub_data(self.target, start * size_of::<T>(), bytes)?;
        } else {
            let bytes: &[u8] = bytemuck::cast_slice(&self.data);
            ctx.buffer_data(self.target, bytes.len(), bytes)?;
            self.stored = true;
        }
        Ok(())
    }

    // ── mapping ───────────────────────────────────────────────────────────

    /// Opens an exclusive write window over the whole capacity.
    ///
    /// Binds the buffer first. Edits become visible to draws at `unmap`.
    pub fn map(&mut self, ctx: &mut RenderContext) -> Result<&mut [T]> {
        self.id()?;
        if self.mapped {
            return Err(RenderError::usage(self.label(), "is already mapped"));
        }
        self.bind(ctx)?;
        self.mapped = true;
        Ok(self.data.as_mut_slice())
    }

    /// The open mapped window.
    pub fn mapped_mut(&mut self) -> Result<&mut [T]> {
        self.id()?;
        if !self.mapped {
            return Err(RenderError::usage(self.label(), "is not mapped"));
        }
        Ok(self.data.as_mut_slice())
    }

    pub fn unmap(&mut self, ctx: &mut RenderContext) -> Result<()> {
        self.id()?;
        if !self.mapped {
            return Err(RenderError::usage(self.label(), "is not mapped"));
        }
        self.upload(ctx, 0, self.capacity())?;
        self.mapped = false;
        Ok(())
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    /// Releases the device allocation. Any later use is an error.
    pub fn dispose(&mut self, ctx: &mut RenderContext) -> Result<()> {
        let id = self.id()?;
        ctx.delete_buffer(id)?;
        self.id = None;
        self.mapped = false;
        Ok(())
    }
}

impl<T: Pod> Bindable for GrowableBuffer<T> {
    fn bind(&self, ctx: &mut RenderContext) -> Result<()> {
        let id = self.id()?;
        ctx.bind_buffer(self.target, Some(id))?;
        Ok(())
    }

    fn unbind(&self, ctx: &mut RenderContext) -> Result<()> {
        self.id()?;
        if self.mapped {
            return Err(RenderError::usage(self.label(), "cannot unbind while mapped"));
        }
        if self.is_bound(ctx) {
            ctx.bind_buffer(self.target, None)?;
        }
        Ok(())
    }
}

impl<T: Pod> Drop for GrowableBuffer<T> {
    fn drop(&mut self) {
        if self.id.is_some() {
            log::warn!("{} dropped without dispose", self.label());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCall;
    use crate::render::context::tests::recording_context;

    fn vertex_buffer(ctx: &mut RenderContext, capacity: usize) -> GrowableBuffer<f32> {
        GrowableBuffer::new(ctx, BufferTarget::Vertex, BufferUsage::Dynamic, capacity).unwrap()
    }

    fn assert_ordered(buf: &GrowableBuffer<f32>) {
        assert!(buf.position() <= buf.count());
        assert!(buf.count() <= buf.capacity());
    }

    // ── cursor ────────────────────────────────────────────────────────────

    #[test]
    fn cursor_and_capacity_stay_ordered() {
        let (mut ctx, _log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 4);

        let mut last_capacity = buf.capacity();
        let writes: &[(Option<usize>, usize)] =
            &[(None, 3), (None, 5), (Some(2), 1), (Some(40), 8), (None, 2), (Some(0), 60)];
        for &(offset, len) in writes {
            let values = vec![1.0; len];
            match offset {
                Some(at) => buf.set(&mut ctx, at, &values).unwrap(),
                None => buf.put(&mut ctx, &values).unwrap(),
            }
            assert_ordered(&buf);
            assert!(buf.capacity() >= last_capacity);
            last_capacity = buf.capacity();
        }
        assert_eq!(buf.count(), 60);
        buf.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn set_behind_cursor_keeps_position() {
        let (mut ctx, _log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 8);
        buf.put(&mut ctx, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        buf.set(&mut ctx, 1, &[9.0]).unwrap();

        assert_eq!(buf.position(), 4);
        assert_eq!(buf.as_slice(), &[1.0, 9.0, 3.0, 4.0]);
        buf.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn clear_keeps_capacity() {
        let (mut ctx, _log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 2);
        buf.put(&mut ctx, &[0.0; 10]).unwrap();
        let capacity = buf.capacity();
        buf.clear().unwrap();
        assert_eq!((buf.position(), buf.count(), buf.capacity()), (0, 0, capacity));
        buf.dispose(&mut ctx).unwrap();
    }

    // ── device traffic ────────────────────────────────────────────────────

    #[test]
    fn growth_reallocates_then_updates_in_place() {
        let (mut ctx, log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 2);
        buf.put(&mut ctx, &[1.0, 2.0]).unwrap();
        buf.put(&mut ctx, &[3.0]).unwrap();
        // 2 -> (2 + 1) * 2
        assert_eq!(buf.capacity(), 6);
        buf.put(&mut ctx, &[4.0]).unwrap();

        let uploads: Vec<_> = log
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::BufferData { .. } | DeviceCall::BufferSubData { .. }))
            .collect();
        assert_eq!(
            uploads,
            vec![
                DeviceCall::BufferData { target: BufferTarget::Vertex, size: 8 },
                DeviceCall::BufferData { target: BufferTarget::Vertex, size: 24 },
                DeviceCall::BufferSubData { target: BufferTarget::Vertex, offset: 12, len: 4 },
            ]
        );
        assert_eq!(log.count(|c| matches!(c, DeviceCall::BindBuffer { .. })), 1);
        buf.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn immutable_buffer_refuses_to_grow() {
        let (mut ctx, _log) = recording_context();
        let mut buf = GrowableBuffer::immutable(&mut ctx, BufferTarget::Index, &[0u16, 1, 2]).unwrap();
        let err = buf.put(&mut ctx, &[3]).unwrap_err();
        assert!(matches!(err, RenderError::UsageState { .. }));
        assert_eq!(buf.as_slice(), &[0, 1, 2]);
        buf.dispose(&mut ctx).unwrap();
    }

    // ── mapping ───────────────────────────────────────────────────────────

    #[test]
    fn put_while_mapped_fails() {
        let (mut ctx, _log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 4);
        buf.map(&mut ctx).unwrap();

        let err = buf.put(&mut ctx, &[1.0]).unwrap_err();
        assert!(matches!(err, RenderError::UsageState { .. }));
        assert!(buf.set(&mut ctx, 0, &[1.0]).is_err());
        assert!(buf.clear().is_err());
        assert_eq!(buf.count(), 0);

        buf.unmap(&mut ctx).unwrap();
        buf.put(&mut ctx, &[1.0]).unwrap();
        buf.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn map_while_mapped_fails() {
        let (mut ctx, _log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 4);
        buf.map(&mut ctx).unwrap();
        let err = buf.map(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::UsageState { .. }));
        buf.unmap(&mut ctx).unwrap();
        assert!(buf.unmap(&mut ctx).is_err());
        buf.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn mapped_edits_reach_device_at_unmap() {
        let (mut ctx, log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 3);
        buf.put(&mut ctx, &[0.0; 3]).unwrap();
        log.clear();

        buf.map(&mut ctx).unwrap()[1] = 5.0;
        buf.mapped_mut().unwrap()[2] = 6.0;
        assert!(log.is_empty());
        assert!(buf.is_bound(&ctx));

        buf.unmap(&mut ctx).unwrap();
        assert_eq!(
            log.calls(),
            vec![DeviceCall::BufferSubData { target: BufferTarget::Vertex, offset: 0, len: 12 }]
        );
        assert_eq!(buf.as_slice(), &[0.0, 5.0, 6.0]);
        buf.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn position_follows_a_mapped_fill() {
        let (mut ctx, log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 8);
        buf.put(&mut ctx, &[1.0; 2]).unwrap();

        let window = buf.map(&mut ctx).unwrap();
        window[2..5].copy_from_slice(&[3.0, 4.0, 5.0]);
        assert!(buf.set_position(5).is_err());
        buf.unmap(&mut ctx).unwrap();

        buf.set_position(5).unwrap();
        assert_eq!((buf.position(), buf.count()), (5, 5));
        assert_eq!(buf.as_slice(), &[1.0, 1.0, 3.0, 4.0, 5.0]);

        log.clear();
        buf.put(&mut ctx, &[6.0]).unwrap();
        assert_eq!(
            log.calls(),
            vec![DeviceCall::BufferSubData { target: BufferTarget::Vertex, offset: 20, len: 4 }]
        );

        // Rewinding keeps the count; the next put overwrites.
        buf.set_position(1).unwrap();
        assert_eq!((buf.position(), buf.count()), (1, 6));
        assert!(matches!(buf.set_position(9), Err(RenderError::Capacity { .. })));
        buf.dispose(&mut ctx).unwrap();
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    #[test]
    fn dispose_twice_or_use_after_dispose_fails() {
        let (mut ctx, log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 4);
        buf.bind(&mut ctx).unwrap();
        buf.dispose(&mut ctx).unwrap();

        assert!(!buf.is_bound(&ctx));
        let err = buf.dispose(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::ResourceState { .. }));
        assert!(matches!(buf.put(&mut ctx, &[1.0]), Err(RenderError::ResourceState { .. })));
        assert!(buf.map(&mut ctx).is_err());
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteBuffer(_))), 1);
    }

    #[test]
    fn unbind_only_touches_device_when_bound() {
        let (mut ctx, log) = recording_context();
        let mut buf = vertex_buffer(&mut ctx, 4);
        buf.unbind(&mut ctx).unwrap();
        assert_eq!(log.count(|c| matches!(c, DeviceCall::BindBuffer { .. })), 0);

        buf.bind(&mut ctx).unwrap();
        buf.unbind(&mut ctx).unwrap();
        assert_eq!(log.count(|c| matches!(c, DeviceCall::BindBuffer { .. })), 2);
        buf.dispose(&mut ctx).unwrap();
    }
}
