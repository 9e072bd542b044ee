//! Bind group 0 shared by every pass: the frame uniform and all batch
//! uniforms of the frame, addressed through a dynamic offset.

use std::num::NonZeroU64;

use crate::uniforms::{BatchUniform, FrameUniform, aligned_stride};

const FRAME_UNIFORM_SIZE: u64 = std::mem::size_of::<FrameUniform>() as u64;
const BATCH_UNIFORM_SIZE: u64 = std::mem::size_of::<BatchUniform>() as u64;

/// Batch slots allocated up front.
const INITIAL_BATCH_CAPACITY: usize = 8;

pub struct FrameBindings {
    layout: wgpu::BindGroupLayout,
    frame_buffer: wgpu::Buffer,
    batch_buffer: wgpu::Buffer,
    batch_stride: u64,
    batch_capacity: usize,
    bind_group: wgpu::BindGroup,
    /// Batches laid out at `batch_stride`, reused across frames.
    staging: Vec<u8>,
}

impl FrameBindings {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint-frame-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(FRAME_UNIFORM_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(BATCH_UNIFORM_SIZE),
                    },
                    count: None,
                },
            ],
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glint-frame-uniform"),
            size: FRAME_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let batch_stride = aligned_stride(
            BATCH_UNIFORM_SIZE,
            device.limits().min_uniform_buffer_offset_alignment,
        );
        let batch_buffer = create_batch_buffer(device, batch_stride, INITIAL_BATCH_CAPACITY);
        let bind_group = create_bind_group(device, &layout, &frame_buffer, &batch_buffer);

        Self {
            layout,
            frame_buffer,
            batch_buffer,
            batch_stride,
            batch_capacity: INITIAL_BATCH_CAPACITY,
            bind_group,
            staging: Vec::new(),
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Byte distance between consecutive batches in the batch buffer.
    pub fn batch_stride(&self) -> u64 {
        self.batch_stride
    }

    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    /// Dynamic offset selecting batch `index`.
    pub fn batch_offset(&self, index: usize) -> u32 {
        (index as u64 * self.batch_stride) as u32
    }

    /// Queue the frame uniform and every batch of the frame for upload.
    ///
    /// The batch buffer grows to the next power of two when `batches` does
    /// not fit; the bind group is rebuilt in that case.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &FrameUniform,
        batches: &[BatchUniform],
    ) {
        if batches.len() > self.batch_capacity {
            let capacity = batches.len().next_power_of_two();
            log::debug!(
                "Growing batch uniform buffer from {} to {} batches",
                self.batch_capacity,
                capacity
            );
            self.batch_buffer = create_batch_buffer(device, self.batch_stride, capacity);
            self.bind_group =
                create_bind_group(device, &self.layout, &self.frame_buffer, &self.batch_buffer);
            self.batch_capacity = capacity;
        }

        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(frame));

        if batches.is_empty() {
            return;
        }
        let stride = self.batch_stride as usize;
        self.staging.clear();
        self.staging.resize(batches.len() * stride, 0);
        for (chunk, batch) in self.staging.chunks_exact_mut(stride).zip(batches) {
            chunk[..BATCH_UNIFORM_SIZE as usize].copy_from_slice(bytemuck::bytes_of(batch));
        }
        queue.write_buffer(&self.batch_buffer, 0, &self.staging);
    }
}

fn create_batch_buffer(device: &wgpu::Device, stride: u64, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("glint-batch-uniforms"),
        size: stride * capacity.max(1) as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    frame_buffer: &wgpu::Buffer,
    batch_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("glint-frame-bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: batch_buffer,
                    offset: 0,
                    size: NonZeroU64::new(BATCH_UNIFORM_SIZE),
                }),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::init_headless_blocking;
    use bytemuck::Zeroable;

    #[test]
    fn test_batch_offsets_follow_stride() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let bindings = FrameBindings::new(&ctx.device);
        let alignment = u64::from(ctx.device.limits().min_uniform_buffer_offset_alignment);
        assert_eq!(bindings.batch_stride() % alignment, 0);
        assert!(bindings.batch_stride() >= BATCH_UNIFORM_SIZE);
        assert_eq!(bindings.batch_offset(0), 0);
        assert_eq!(u64::from(bindings.batch_offset(3)), 3 * bindings.batch_stride());
    }

    #[test]
    fn test_batch_buffer_grows_to_power_of_two() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let mut bindings = FrameBindings::new(&ctx.device);
        let frame = FrameUniform::zeroed();
        let batches = vec![BatchUniform::zeroed(); INITIAL_BATCH_CAPACITY + 1];
        bindings.upload(&ctx.device, &ctx.queue, &frame, &batches);
        assert_eq!(bindings.batch_capacity(), 16);

        bindings.upload(&ctx.device, &ctx.queue, &frame, &batches[..2]);
        assert_eq!(bindings.batch_capacity(), 16, "capacity never shrinks");
    }
}
