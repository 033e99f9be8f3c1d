use crate::display::backend::TrayBackend;
use crate::display::grid::{blit, TileGrid};
use anyhow::{Context, Result};

/// Owns the icon slots for one tile grid and the scratch tile they are fed
/// from. Slots exist from `open` until `close`; there is always exactly one
/// per grid cell while open.
#[derive(Debug)]
pub struct DisplaySession {
    grid: TileGrid,
    scratch: Vec<u32>,
    prime_first_icon: bool,
    open: bool,
}

impl DisplaySession {
    pub fn new(grid: TileGrid, prime_first_icon: bool) -> Self {
        Self {
            scratch: grid.scratch(),
            grid,
            prime_first_icon,
            open: false,
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self, backend: &mut dyn TrayBackend) -> Result<()> {
        if self.open {
            return Ok(());
        }

        backend
            .create_tile_bitmap(self.grid.tile_side())
            .context("create shared tile bitmap")?;

        if self.prime_first_icon {
            let primed = backend.add_slot(0).and_then(|()| backend.remove_slot(0));
            if let Err(err) = primed {
                tracing::warn!(?err, "failed to prime the first tray icon");
            }
        }

        let slots = self.grid.slot_count() as u32;
        for slot in 0..slots {
            if let Err(err) = backend.add_slot(slot) {
                for added in 0..slot {
                    let _ = backend.remove_slot(added);
                }
                backend.release_tile_bitmap();
                return Err(err).with_context(|| format!("allocate tray icon slot {slot}"));
            }
        }

        self.open = true;
        tracing::info!(
            slots,
            tile_side = self.grid.tile_side(),
            "display session opened"
        );
        Ok(())
    }

    /// Pushes every visible tile of `framebuffer` to its slot. A failed slot
    /// update is logged and skipped. Returns the number of tiles updated.
    pub fn present(
        &mut self,
        backend: &mut dyn TrayBackend,
        framebuffer: &[u32],
    ) -> Result<usize> {
        if !self.open {
            return Ok(0);
        }

        let mut failed = 0usize;
        let presented = blit(&self.grid, framebuffer, &mut self.scratch, |slot, pixels| {
            if let Err(err) = update_slot(&mut *backend, slot, pixels) {
                failed += 1;
                tracing::warn!(slot, ?err, "tray icon update failed");
            }
            Ok(())
        })?;

        tracing::trace!(presented, failed, "frame presented");
        Ok(presented - failed)
    }

    /// Releases every slot and the shared bitmap. Safe to call repeatedly.
    pub fn close(&mut self, backend: &mut dyn TrayBackend) {
        if !self.open {
            return;
        }

        for slot in 0..self.grid.slot_count() as u32 {
            if let Err(err) = backend.remove_slot(slot) {
                tracing::warn!(slot, ?err, "failed to remove tray icon slot");
            }
        }
        backend.release_tile_bitmap();

        self.open = false;
        tracing::info!("display session closed");
    }
}

/// Replaces the icon shown in `slot` with `pixels`, one tile in size.
pub fn update_slot(backend: &mut dyn TrayBackend, slot: usize, pixels: &[u32]) -> Result<()> {
    backend
        .present_tile(slot as u32, pixels)
        .with_context(|| format!("update tray icon slot {slot}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::backend::MockTrayBackend;

    fn session(width: usize, height: usize, prime: bool) -> DisplaySession {
        DisplaySession::new(TileGrid::new(width, height, 8).expect("grid"), prime)
    }

    #[test]
    fn open_then_close_allocates_and_releases_every_slot() {
        let (mut backend, handle) = MockTrayBackend::new();
        let mut session = session(64, 64, false);

        session.open(&mut backend).expect("open");
        assert!(session.is_open());
        assert_eq!(handle.snapshot().live_slots.len(), 64);

        session.close(&mut backend);
        let state = handle.snapshot();
        assert_eq!(state.slots_added, 64);
        assert_eq!(state.slots_removed, 64);
        assert!(state.live_slots.is_empty());
        assert_eq!(state.bitmaps_released, 1);
        assert_eq!(state.tile_side, None);
    }

    #[test]
    fn priming_adds_and_drops_one_extra_icon() {
        let (mut backend, handle) = MockTrayBackend::new();
        let mut session = session(64, 64, true);

        session.open(&mut backend).expect("open");
        let state = handle.snapshot();
        assert_eq!(state.slots_added, 65);
        assert_eq!(state.slots_removed, 1);
        assert_eq!(state.live_slots.len(), 64);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut backend, handle) = MockTrayBackend::new();
        let mut session = session(64, 64, false);
        session.open(&mut backend).expect("open");

        session.close(&mut backend);
        session.close(&mut backend);
        assert_eq!(handle.snapshot().slots_removed, 64);
        assert_eq!(handle.snapshot().bitmaps_released, 1);
    }

    #[test]
    fn failed_slot_allocation_rolls_back() {
        let (mut backend, handle) = MockTrayBackend::new();
        handle.fail_slot(10);
        let mut session = session(64, 64, false);

        assert!(session.open(&mut backend).is_err());
        assert!(!session.is_open());
        let state = handle.snapshot();
        assert!(state.live_slots.is_empty());
        assert_eq!(state.slots_removed, 10);
        assert_eq!(state.bitmaps_released, 1);
    }

    #[test]
    fn every_tile_builds_and_destroys_one_icon() {
        let (mut backend, handle) = MockTrayBackend::new();
        let mut session = session(64, 64, false);
        session.open(&mut backend).expect("open");

        let frame = vec![0x00ff_0000; 64 * 64];
        assert_eq!(session.present(&mut backend, &frame).expect("present"), 64);
        assert_eq!(session.present(&mut backend, &frame).expect("present"), 64);

        let state = handle.snapshot();
        assert_eq!(state.icons_created, 128);
        assert_eq!(state.icons_destroyed, 128);
        assert_eq!(state.live_slots.len(), 64);
    }

    #[test]
    fn update_slot_targets_a_single_icon() {
        let (mut backend, handle) = MockTrayBackend::new();
        let mut session = session(64, 64, false);
        session.open(&mut backend).expect("open");

        let tile = vec![3u32; 64];
        update_slot(&mut backend, 9, &tile).expect("update");
        assert_eq!(handle.take_presented(), vec![(9, tile)]);
    }

    #[test]
    fn failed_tile_update_is_skipped_and_reported_with_its_slot() {
        let (mut backend, handle) = MockTrayBackend::new();
        let mut session = session(64, 64, false);
        session.open(&mut backend).expect("open");

        backend.remove_slot(5).expect("drop slot 5");
        let err = update_slot(&mut backend, 5, &[0u32; 64]).expect_err("slot 5 fails");
        assert!(format!("{err:#}").contains("slot 5"));

        let frame = vec![1u32; 64 * 64];
        assert_eq!(session.present(&mut backend, &frame).expect("present"), 63);
        let slots: Vec<u32> = handle.take_presented().into_iter().map(|(slot, _)| slot).collect();
        assert_eq!(slots.len(), 63);
        assert!(!slots.contains(&5));
    }

    #[test]
    fn present_before_open_draws_nothing() {
        let (mut backend, handle) = MockTrayBackend::new();
        let mut session = session(64, 64, false);
        let frame = vec![0u32; 64 * 64];
        assert_eq!(session.present(&mut backend, &frame).expect("present"), 0);
        assert!(handle.take_presented().is_empty());
    }
}
