//! The mastering output every source voice routes into.

use crate::device::{Device, Target};
use crate::error::Result;
use crate::operation::OperationId;
use crate::spatial::ChannelMask;

/// Owner of the device's single master output.
///
/// Move-only; the master is released exactly once when this is dropped.
pub struct MasterOutput {
    device: Device,
    channels: u16,
    channel_mask: ChannelMask,
}

impl MasterOutput {
    pub(crate) fn create(device: Device, channels: u16) -> Result<Self> {
        let channel_mask = device.create_master(channels)?;
        Ok(Self {
            device,
            channels,
            channel_mask,
        })
    }

    /// Sets the final output gain. Linear amplitude, 1.0 is unity.
    pub fn set_volume(&self, volume: f32, operation: OperationId) -> Result<()> {
        self.device.set_volume(Target::Master, volume, operation)
    }

    pub fn get_volume(&self) -> f32 {
        self.device.volume(Target::Master).unwrap_or_else(|e| {
            log::error!("Master volume query failed: {}", e);
            0.0
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }
}

impl Drop for MasterOutput {
    fn drop(&mut self) {
        self.device.destroy_master();
    }
}
