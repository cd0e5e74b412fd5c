// Synchronization primitives
//
// One frame in flight: a single pair of semaphores orders acquire, render
// and present. The CPU side waits on the queue instead of a fence.

use ash::vk;

use crate::error::ConfigureError;

pub struct FrameSync {
    pub image_acquired: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self, ConfigureError> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        let image_acquired = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(ConfigureError::Semaphore)?;

        match unsafe { device.create_semaphore(&semaphore_info, None) } {
            Ok(render_finished) => Ok(Self {
                image_acquired,
                render_finished,
            }),
            Err(e) => {
                unsafe { device.destroy_semaphore(image_acquired, None) };
                Err(ConfigureError::Semaphore(e))
            }
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_acquired, None);
            device.destroy_semaphore(self.render_finished, None);
        }
    }
}
