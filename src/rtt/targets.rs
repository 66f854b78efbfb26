//! Render targets owned by a pipeline: the ping-pong pair and the history ring.

use crate::device::{RenderDevice, TextureDesc, TextureId};
use crate::error::RttError;

/// Fixed-depth ring of past outputs.
///
/// Slot 0 always holds the newest frame. A ring of depth `H` owns `H + 1`
/// textures so the frame being written never aliases one being sampled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryRing {
    slots: Vec<TextureId>,
}

impl HistoryRing {
    fn new(slots: Vec<TextureId>) -> Self {
        Self { slots }
    }

    /// Number of lookback frames.
    pub fn depth(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[TextureId] {
        &self.slots
    }

    fn head(&self) -> Option<TextureId> {
        self.slots.first().copied()
    }

    /// Frames behind the head, newest first.
    pub fn lookback(&self) -> &[TextureId] {
        self.slots.get(1..).unwrap_or(&[])
    }

    /// Moves the oldest slot to the front and returns it as the next write target.
    pub fn rotate(&mut self) -> Option<TextureId> {
        if self.is_empty() {
            return None;
        }
        self.slots.rotate_right(1);
        self.head()
    }
}

/// Every texture a pipeline renders into.
#[derive(Debug)]
pub struct RenderTargets {
    color: [TextureId; 2],
    history: HistoryRing,
    width: u32,
    height: u32,
}

impl RenderTargets {
    /// Allocates two color targets plus `history + 1` ring slots when
    /// `history > 0`.
    ///
    /// On failure every texture allocated so far is destroyed before the error
    /// is returned.
    pub fn allocate(
        device: &mut dyn RenderDevice,
        desc: &TextureDesc,
        history: usize,
    ) -> Result<Self, RttError> {
        let ring = if history > 0 { history + 1 } else { 0 };
        let mut allocated = Vec::with_capacity(2 + ring);
        for _ in 0..2 + ring {
            match device.create_texture(desc) {
                Ok(id) => allocated.push(id),
                Err(err) => {
                    for id in allocated {
                        device.destroy_texture(id);
                    }
                    return Err(err);
                }
            }
        }

        let history = HistoryRing::new(allocated.split_off(2));
        log::debug!(
            "allocated {}x{} render targets, history depth {}",
            desc.width,
            desc.height,
            history.depth()
        );
        Ok(Self {
            color: [allocated[0], allocated[1]],
            history,
            width: desc.width,
            height: desc.height,
        })
    }

    pub fn color(&self, index: usize) -> TextureId {
        self.color[index & 1]
    }

    pub fn colors(&self) -> [TextureId; 2] {
        self.color
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryRing {
        &mut self.history
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn swap(&mut self) {
        self.color.swap(0, 1);
    }

    /// Reallocates storage of every target in place; ids are kept.
    ///
    /// All or nothing: when one target fails, the ones already resized go back
    /// to the previous size and the error is returned.
    pub fn resize(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) -> Result<(), RttError> {
        let ids: Vec<TextureId> = self.color.iter().chain(self.history.slots()).copied().collect();
        for (done, id) in ids.iter().enumerate() {
            if let Err(err) = device.resize_texture(*id, width, height) {
                for resized in &ids[..done] {
                    if let Err(undo) = device.resize_texture(*resized, self.width, self.height) {
                        log::warn!("could not restore {resized:?} to {}x{}: {undo}", self.width, self.height);
                    }
                }
                return Err(err);
            }
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        for id in self.color.into_iter().chain(self.history.slots) {
            device.destroy_texture(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::rtt::TextureOptions;

    fn desc() -> TextureDesc {
        TextureDesc {
            width: 8,
            height: 4,
            options: TextureOptions::default(),
        }
    }

    #[test]
    fn ring_rotation_moves_oldest_to_front() {
        let mut ring = HistoryRing::new(vec![TextureId(1), TextureId(2), TextureId(3)]);
        assert_eq!(ring.depth(), 2);
        assert_eq!(ring.rotate(), Some(TextureId(3)));
        assert_eq!(ring.slots(), &[TextureId(3), TextureId(1), TextureId(2)]);
        assert_eq!(ring.lookback(), &[TextureId(1), TextureId(2)]);
    }

    #[test]
    fn empty_ring_does_not_rotate() {
        let mut ring = HistoryRing::default();
        assert_eq!(ring.rotate(), None);
        assert!(ring.lookback().is_empty());
        assert_eq!(ring.depth(), 0);
    }

    #[test]
    fn allocates_ring_only_with_history() {
        let mut device = RecordingDevice::new(8, 4);
        let plain = RenderTargets::allocate(&mut device, &desc(), 0).unwrap();
        assert!(plain.history().is_empty());
        assert_eq!(device.live_textures(), 2);

        let with_history = RenderTargets::allocate(&mut device, &desc(), 2).unwrap();
        assert_eq!(with_history.history().slots().len(), 3);
        assert_eq!(device.live_textures(), 7);

        plain.destroy(&mut device);
        with_history.destroy(&mut device);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn failed_allocation_releases_partial_targets() {
        let mut device = RecordingDevice::new(8, 4);
        device.fail_texture_allocation_after(3);
        let err = RenderTargets::allocate(&mut device, &desc(), 4).unwrap_err();
        assert!(matches!(err, RttError::Device(_)));
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn resize_keeps_ids() {
        let mut device = RecordingDevice::new(8, 4);
        let mut targets = RenderTargets::allocate(&mut device, &desc(), 1).unwrap();
        let before = targets.colors();
        targets.resize(&mut device, 16, 16).unwrap();
        assert_eq!(targets.colors(), before);
        assert_eq!(targets.size(), (16, 16));
        assert_eq!(device.texture_size(before[0]), Some((16, 16)));
        assert_eq!(device.texture_size(targets.history().slots()[1]), Some((16, 16)));
    }

    #[test]
    fn failed_resize_restores_every_target() {
        let mut device = RecordingDevice::new(8, 4);
        let mut targets = RenderTargets::allocate(&mut device, &desc(), 1).unwrap();
        device.fail_resize_of(targets.history().slots()[0]);

        let err = targets.resize(&mut device, 16, 16).unwrap_err();
        assert!(matches!(err, RttError::Device(_)));
        assert_eq!(targets.size(), (8, 4));
        for id in targets.colors().iter().chain(targets.history().slots()) {
            assert_eq!(device.texture_size(*id), Some((8, 4)));
        }
    }
}
