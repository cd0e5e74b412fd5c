// Host-visible buffers for vertex and index data
//
// Every buffer gets its own allocation from the first host-visible memory
// type. Coherency is not assumed: writes flush and invalidate explicitly.

use ash::vk;

use crate::error::ConfigureError;

/// Lowest memory type index allowed by `type_bits` that is host-visible.
pub fn find_host_visible_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let allowed = type_bits & (1 << i) != 0;
        allowed
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    })
}

/// A buffer with its dedicated allocation.
#[derive(Debug, Clone, Copy)]
pub struct HostBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Size of the backing allocation, at least the requested buffer size.
    pub allocation_size: vk::DeviceSize,
}

impl HostBuffer {
    /// Create a buffer and bind fresh host-visible memory to it
    pub fn new(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, ConfigureError> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .map_err(ConfigureError::Buffer)?;

        match Self::allocate(device, memory_properties, buffer) {
            Ok((memory, allocation_size)) => Ok(Self {
                buffer,
                memory,
                allocation_size,
            }),
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    fn allocate(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        buffer: vk::Buffer,
    ) -> Result<(vk::DeviceMemory, vk::DeviceSize), ConfigureError> {
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index =
            find_host_visible_memory_type(memory_properties, requirements.memory_type_bits)
                .ok_or(ConfigureError::NoHostVisibleMemory)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }
            .map_err(ConfigureError::Memory)?;

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { device.free_memory(memory, None) };
            return Err(ConfigureError::Memory(e));
        }

        Ok((memory, requirements.size))
    }

    /// Copy `data` to the start of the allocation.
    ///
    /// Maps the whole allocation, copies, flushes, invalidates, unmaps.
    pub fn write(&self, device: &ash::Device, data: &[u8]) -> Result<(), vk::Result> {
        debug_assert!(data.len() as vk::DeviceSize <= self.allocation_size);
        self.with_mapped(device, |mapped| unsafe {
            mapped.copy_from_nonoverlapping(data.as_ptr(), data.len());
        })
    }

    /// Read back the whole allocation.
    pub fn read(&self, device: &ash::Device) -> Result<Vec<u8>, vk::Result> {
        let mut out = vec![0u8; self.allocation_size as usize];
        self.with_mapped(device, |mapped| unsafe {
            out.as_mut_ptr()
                .copy_from_nonoverlapping(mapped, out.len());
        })?;
        Ok(out)
    }

    fn with_mapped<F>(&self, device: &ash::Device, access: F) -> Result<(), vk::Result>
    where
        F: FnOnce(*mut u8),
    {
        let mapped = unsafe {
            device.map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        }? as *mut u8;

        access(mapped);

        let range = vk::MappedMemoryRange::builder()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .build();

        let synced = unsafe {
            device
                .flush_mapped_memory_ranges(&[range])
                .and_then(|()| device.invalidate_mapped_memory_ranges(&[range]))
        };

        unsafe { device.unmap_memory(self.memory) };
        synced
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}
