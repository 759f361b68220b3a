//! Descriptor set layouts, pools and writers.
//!
//! - [`DescriptorSetLayout`] is built from a [`LayoutBindings`] table that
//!   stays inspectable after creation
//! - [`DescriptorPool`] allocates sets and reports exhaustion as a
//!   recoverable [`RhiError::DescriptorPoolExhausted`]
//! - [`DescriptorWriter`] collects buffer/image writes checked against the
//!   layout and applies them to a new or existing set
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use orbit_rhi::device::Device;
//! use orbit_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
//!
//! # fn example(device: Arc<Device>, ubo: vk::DescriptorBufferInfo) -> Result<(), orbit_rhi::RhiError> {
//! let layout = DescriptorSetLayout::builder()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::ALL_GRAPHICS, 1)
//!     .build(device.clone())?;
//!
//! let pool = DescriptorPool::builder()
//!     .set_max_sets(2)
//!     .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .build(device)?;
//!
//! let set = DescriptorWriter::new(&layout, &pool)
//!     .write_buffer(0, ubo)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default `maxSets` for pools that do not set one.
pub const DEFAULT_MAX_SETS: u32 = 1000;

/// Binding table of a descriptor set layout, keyed by binding number.
#[derive(Clone, Debug, Default)]
pub struct LayoutBindings {
    bindings: BTreeMap<u32, vk::DescriptorSetLayoutBinding<'static>>,
}

impl LayoutBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `binding`.
    ///
    /// # Panics
    ///
    /// Panics if `binding` is already declared.
    pub fn add_binding(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) {
        assert!(
            !self.bindings.contains_key(&binding),
            "Binding {} already in use",
            binding
        );
        self.bindings.insert(
            binding,
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
    }

    /// Returns the declaration of `binding`, if any.
    pub fn get(&self, binding: u32) -> Option<&vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings.get(&binding)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in ascending binding order.
    pub fn to_vec(&self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings.values().copied().collect()
    }
}

/// Builder returned by [`DescriptorSetLayout::builder`].
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: LayoutBindings,
}

impl DescriptorSetLayoutBuilder {
    /// Declares a binding. See [`LayoutBindings::add_binding`].
    ///
    /// # Panics
    ///
    /// Panics if `binding` is already declared.
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        self.bindings
            .add_binding(binding, descriptor_type, stage_flags, count);
        self
    }

    /// Creates the layout.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateDescriptorSetLayout` fails.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        DescriptorSetLayout::new(device, self.bindings)
    }
}

/// Descriptor set layout together with its binding table.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: LayoutBindings,
}

impl DescriptorSetLayout {
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::default()
    }

    /// Creates a layout from a binding table.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateDescriptorSetLayout` fails.
    pub fn new(device: Arc<Device>, bindings: LayoutBindings) -> RhiResult<Self> {
        let raw_bindings = bindings.to_vec();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&raw_bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            raw_bindings.len()
        );

        Ok(Self {
            device,
            layout,
            bindings,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &LayoutBindings {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Builder returned by [`DescriptorPool::builder`].
pub struct DescriptorPoolBuilder {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            pool_sizes: Vec::new(),
            max_sets: DEFAULT_MAX_SETS,
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorPoolBuilder {
    pub fn add_pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(descriptor_type)
                .descriptor_count(count),
        );
        self
    }

    pub fn set_max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    pub fn set_pool_flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Creates the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateDescriptorPool` fails.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorPool> {
        DescriptorPool::new(device, self.max_sets, self.flags, &self.pool_sizes)
    }
}

/// Descriptor pool.
///
/// Not thread-safe; synchronize access externally.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Creates a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateDescriptorPool` fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        flags: vk::DescriptorPoolCreateFlags,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(flags);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
            flags,
        })
    }

    /// Allocates one set with `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorPoolExhausted`] when the pool is out of
    /// memory or fragmented. Callers may create a new pool and retry. Other
    /// failures are returned as [`RhiError::VulkanError`].
    pub fn allocate_descriptor(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(sets[0]),
            Err(result) => Err(map_allocation_error(result)),
        }
    }

    /// Returns sets to the pool.
    ///
    /// The pool must have been created with `FREE_DESCRIPTOR_SET`, and the
    /// sets must no longer be in use by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkFreeDescriptorSets` fails.
    pub fn free_descriptors(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if !self
            .flags
            .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        {
            warn!("free_descriptors on a pool without FREE_DESCRIPTOR_SET, ignored");
            return Ok(());
        }
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }
        debug!("Freed {} descriptor set(s)", sets.len());
        Ok(())
    }

    /// Returns every set allocated from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkResetDescriptorPool` fails.
    pub fn reset_pool(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        debug!("Reset descriptor pool");
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

fn map_allocation_error(result: vk::Result) -> RhiError {
    match result {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            RhiError::DescriptorPoolExhausted
        }
        other => RhiError::VulkanError(other),
    }
}

/// A write waiting to be applied to a descriptor set.
#[derive(Clone, Copy, Debug)]
pub enum PendingWrite {
    Buffer(vk::DescriptorType, vk::DescriptorBufferInfo),
    Image(vk::DescriptorType, vk::DescriptorImageInfo),
}

/// Writes keyed by binding, validated against a [`LayoutBindings`] table.
///
/// A second write to the same binding replaces the first.
#[derive(Clone, Debug, Default)]
pub struct PendingWrites {
    writes: BTreeMap<u32, PendingWrite>,
}

impl PendingWrites {
    /// Stages a buffer write.
    ///
    /// # Panics
    ///
    /// Panics if the layout does not declare `binding` or declares it with
    /// more than one descriptor.
    pub fn write_buffer(
        &mut self,
        bindings: &LayoutBindings,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) {
        let ty = single_descriptor_type(bindings, binding);
        self.writes.insert(binding, PendingWrite::Buffer(ty, info));
    }

    /// Stages an image write.
    ///
    /// # Panics
    ///
    /// Same conditions as [`write_buffer`](Self::write_buffer).
    pub fn write_image(
        &mut self,
        bindings: &LayoutBindings,
        binding: u32,
        info: vk::DescriptorImageInfo,
    ) {
        let ty = single_descriptor_type(bindings, binding);
        self.writes.insert(binding, PendingWrite::Image(ty, info));
    }

    pub fn get(&self, binding: u32) -> Option<&PendingWrite> {
        self.writes.get(&binding)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Builds the `VkWriteDescriptorSet` array targeting `set`.
    pub fn to_vk_writes(&self, set: vk::DescriptorSet) -> Vec<vk::WriteDescriptorSet<'_>> {
        self.writes
            .iter()
            .map(|(&binding, write)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0);
                match write {
                    PendingWrite::Buffer(ty, info) => base
                        .descriptor_type(*ty)
                        .buffer_info(std::slice::from_ref(info)),
                    PendingWrite::Image(ty, info) => base
                        .descriptor_type(*ty)
                        .image_info(std::slice::from_ref(info)),
                }
            })
            .collect()
    }
}

fn single_descriptor_type(bindings: &LayoutBindings, binding: u32) -> vk::DescriptorType {
    let declared = bindings
        .get(binding)
        .unwrap_or_else(|| panic!("Layout does not contain binding {}", binding));
    assert!(
        declared.descriptor_count == 1,
        "Binding {} expects {} descriptors, single-descriptor writes only",
        binding,
        declared.descriptor_count
    );
    declared.descriptor_type
}

/// Collects writes for one descriptor set.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    writes: PendingWrites,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            writes: PendingWrites::default(),
        }
    }

    /// Stages a buffer write. See [`PendingWrites::write_buffer`].
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.writes
            .write_buffer(self.layout.bindings(), binding, info);
        self
    }

    /// Stages an image write. See [`PendingWrites::write_image`].
    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.writes
            .write_image(self.layout.bindings(), binding, info);
        self
    }

    /// Allocates a set from the pool and applies the staged writes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorPoolExhausted`] if the pool is full.
    pub fn build(&self) -> RhiResult<vk::DescriptorSet> {
        let set = self.pool.allocate_descriptor(self.layout.handle())?;
        self.overwrite(set);
        Ok(set)
    }

    /// Applies the staged writes to an existing set.
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let writes = self.writes.to_vk_writes(set);
        if writes.is_empty() {
            return;
        }
        unsafe {
            self.pool
                .device
                .handle()
                .update_descriptor_sets(&writes, &[]);
        }
        debug!("Wrote {} descriptor binding(s)", writes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bindings() -> LayoutBindings {
        let mut bindings = LayoutBindings::new();
        bindings.add_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::ALL_GRAPHICS,
            1,
        );
        bindings.add_binding(
            1,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            1,
        );
        bindings.add_binding(
            2,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            4,
        );
        bindings
    }

    #[test]
    fn test_layout_bindings_sorted() {
        let bindings = sample_bindings();
        let raw = bindings.to_vec();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0].binding, 0);
        assert_eq!(raw[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
        assert_eq!(raw[2].descriptor_count, 4);
    }

    #[test]
    #[should_panic(expected = "already in use")]
    fn test_duplicate_binding_panics() {
        let mut bindings = sample_bindings();
        bindings.add_binding(
            1,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::ShaderStageFlags::VERTEX,
            1,
        );
    }

    #[test]
    fn test_last_write_wins() {
        let bindings = sample_bindings();
        let mut writes = PendingWrites::default();

        let first = vk::DescriptorBufferInfo::default().offset(0).range(64);
        let second = vk::DescriptorBufferInfo::default().offset(256).range(64);
        writes.write_buffer(&bindings, 0, first);
        writes.write_buffer(&bindings, 0, second);

        assert_eq!(writes.len(), 1);
        match writes.get(0) {
            Some(PendingWrite::Buffer(ty, info)) => {
                assert_eq!(*ty, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
                assert_eq!(info.offset, 256);
            }
            other => panic!("unexpected write {:?}", other),
        }

        let vk_writes = writes.to_vk_writes(vk::DescriptorSet::null());
        assert_eq!(vk_writes.len(), 1);
        assert_eq!(vk_writes[0].descriptor_count, 1);
    }

    #[test]
    fn test_writes_carry_declared_type() {
        let bindings = sample_bindings();
        let mut writes = PendingWrites::default();
        writes.write_image(&bindings, 1, vk::DescriptorImageInfo::default());
        writes.write_buffer(&bindings, 0, vk::DescriptorBufferInfo::default());

        let vk_writes = writes.to_vk_writes(vk::DescriptorSet::null());
        assert_eq!(vk_writes[0].dst_binding, 0);
        assert_eq!(vk_writes[1].dst_binding, 1);
        assert_eq!(
            vk_writes[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    #[should_panic(expected = "does not contain binding")]
    fn test_write_to_undeclared_binding_panics() {
        let bindings = sample_bindings();
        let mut writes = PendingWrites::default();
        writes.write_buffer(&bindings, 7, vk::DescriptorBufferInfo::default());
    }

    #[test]
    #[should_panic(expected = "single-descriptor writes only")]
    fn test_write_to_array_binding_panics() {
        let bindings = sample_bindings();
        let mut writes = PendingWrites::default();
        writes.write_image(&bindings, 2, vk::DescriptorImageInfo::default());
    }

    #[test]
    fn test_pool_exhaustion_is_recoverable() {
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            RhiError::DescriptorPoolExhausted
        ));
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_FRAGMENTED_POOL),
            RhiError::DescriptorPoolExhausted
        ));
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_DEVICE_LOST),
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn test_pool_builder_defaults() {
        let builder = DescriptorPool::builder()
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 4);
        assert_eq!(builder.max_sets, DEFAULT_MAX_SETS);
        assert_eq!(builder.pool_sizes.len(), 1);
        assert!(builder.flags.is_empty());
    }
}
