//! The processing pass: mixes every started voice into the master buffer.

use super::Device;
use super::state::{DeviceState, Notification, NotificationKind, QueuedBuffer, VoiceSlot};
use crate::events::VoiceErrorKind;
use crate::notifier::VoiceCallback;
use crate::voice::VoiceId;
use std::collections::VecDeque;
use std::sync::Arc;

impl Device {
    /// Renders one processing pass into `out`, interleaved in the master
    /// layout, and returns the number of frames mixed.
    ///
    /// `out` is always overwritten; a stopped device or a missing master
    /// output yields silence and `0`. Voice callbacks raised during the pass
    /// run after the device lock is released.
    pub(crate) fn render(&self, out: &mut [f32]) -> usize {
        let mut notifications = Vec::new();
        let frames = self.lock_state().render(out, &mut notifications);
        for notification in &notifications {
            notification.dispatch();
        }
        frames
    }
}

impl DeviceState {
    fn render(&mut self, out: &mut [f32], notifications: &mut Vec<Notification>) -> usize {
        out.fill(0.0);
        let (channels, volume) = match &self.master {
            Some(master) if self.running => (master.channels as usize, master.volume),
            _ => return 0,
        };
        let frames = out.len() / channels;

        notifications.append(&mut self.deferred);
        for (id, voice) in self.voices.iter_mut() {
            if voice.started {
                voice.render(*id, out, frames, channels, notifications);
            }
        }

        if volume != 1.0 {
            for sample in out.iter_mut() {
                *sample *= volume;
            }
        }
        frames
    }
}

impl VoiceSlot {
    /// Bytes the pass needs beyond what is queued; 0 when an infinite loop is queued.
    fn bytes_required(&self, frames: usize) -> u32 {
        if self.queue.iter().any(|b| b.loops_remaining.is_none()) {
            return 0;
        }
        let needed = frames as f64 * self.frequency_ratio as f64;
        let available: f64 = self
            .queue
            .iter()
            .map(|b| {
                let passes = 1.0 + b.loops_remaining.unwrap_or(0) as f64;
                b.frames as f64 * passes - b.position
            })
            .sum();
        let missing = (needed - available).max(0.0).ceil() as usize;
        u32::try_from(missing * self.format.block_align()).unwrap_or(u32::MAX)
    }

    fn render(
        &mut self,
        id: VoiceId,
        out: &mut [f32],
        frames: usize,
        dst_channels: usize,
        notifications: &mut Vec<Notification>,
    ) {
        let src_channels = self.format.channels as usize;
        let alpha = if self.use_filter {
            self.filter.frequency
        } else {
            1.0
        };

        notifications.push(Notification::new(
            id,
            &self.callback,
            NotificationKind::ProcessingPassStart(self.bytes_required(frames)),
        ));

        for frame in 0..frames {
            let Some(buffer) = self.queue.front_mut() else {
                break;
            };
            if !buffer.started {
                buffer.started = true;
                notifications.push(Notification::new(
                    id,
                    &self.callback,
                    NotificationKind::BufferStart(buffer.clip.context()),
                ));
            }

            let base = buffer.position as usize * src_channels;
            let samples = buffer.clip.samples();
            for channel in 0..src_channels {
                let mut sample = samples[base + channel];
                if !sample.is_finite() {
                    if !buffer.reported_error {
                        buffer.reported_error = true;
                        notifications.push(Notification::new(
                            id,
                            &self.callback,
                            NotificationKind::VoiceError(
                                buffer.clip.context(),
                                VoiceErrorKind::NonFiniteSample,
                            ),
                        ));
                    }
                    sample = 0.0;
                }

                let state = &mut self.filter_state[channel];
                *state = if alpha >= 1.0 {
                    sample
                } else {
                    *state + alpha * (sample - *state)
                };
                self.frame[channel] = *state * self.volume;
            }

            for dst in 0..dst_channels {
                let mut acc = 0.0;
                for src in 0..src_channels {
                    acc += self.frame[src] * self.output_matrix[src + src_channels * dst];
                }
                out[frame * dst_channels + dst] += acc;
            }

            buffer.position += self.frequency_ratio as f64;
            self.samples_played += 1;
            retire_finished(&mut self.queue, id, &self.callback, notifications);
        }

        notifications.push(Notification::new(
            id,
            &self.callback,
            NotificationKind::ProcessingPassEnd,
        ));
    }
}

/// Pops every buffer whose read position has run past its end, handling loops.
fn retire_finished(
    queue: &mut VecDeque<QueuedBuffer>,
    id: VoiceId,
    callback: &Arc<dyn VoiceCallback>,
    notifications: &mut Vec<Notification>,
) {
    loop {
        let Some(buffer) = queue.front_mut() else {
            break;
        };
        let length = buffer.frames as f64;
        if buffer.position < length {
            break;
        }

        let context = buffer.clip.context();
        match buffer.loops_remaining {
            Some(0) => {
                let end_of_stream = buffer.end_of_stream;
                queue.pop_front();
                notifications.push(Notification::new(
                    id,
                    callback,
                    NotificationKind::BufferEnd(context),
                ));
                if end_of_stream {
                    notifications.push(Notification::new(
                        id,
                        callback,
                        NotificationKind::StreamEnd,
                    ));
                }
            }
            remaining => {
                buffer.loops_remaining = remaining.map(|n| n - 1);
                buffer.position -= length;
                notifications.push(Notification::new(
                    id,
                    callback,
                    NotificationKind::LoopEnd(context),
                ));
            }
        }
    }
}
