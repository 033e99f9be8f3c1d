use crate::input::{deliver_raw_key, KeyQueue, KeySource};
use anyhow::{anyhow, bail, Result};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpOutcome {
    pub dispatched: usize,
    /// The host destroyed the drawable surface while dispatching.
    pub destroy_requested: bool,
}

/// Host services the presenter drives: a hidden drawable surface with its
/// event pump, one shared icon bitmap, and a set of addressable icon slots.
pub trait TrayBackend {
    /// Registers and creates the drawable surface. Key messages dispatched to
    /// it during `pump_events` are delivered into `keys`.
    fn create_surface(&mut self, class_name: &str, title: &str, keys: Arc<KeyQueue>)
        -> Result<()>;
    fn destroy_surface(&mut self);
    fn has_surface(&self) -> bool;
    fn set_title(&mut self, title: &str) -> Result<()>;
    /// Dispatches every pending host event without waiting for new ones.
    fn pump_events(&mut self) -> PumpOutcome;

    fn create_tile_bitmap(&mut self, tile_side: usize) -> Result<()>;
    fn release_tile_bitmap(&mut self);
    fn add_slot(&mut self, slot: u32) -> Result<()>;
    fn remove_slot(&mut self, slot: u32) -> Result<()>;
    /// Loads `pixels` into the shared bitmap and shows a freshly built icon
    /// in `slot`. The icon is released once the host holds its own copy.
    fn present_tile(&mut self, slot: u32, pixels: &[u32]) -> Result<()>;
}

#[cfg(windows)]
pub fn platform_backend() -> Box<dyn TrayBackend> {
    Box::new(crate::display::win32::Win32TrayBackend::default())
}

#[cfg(not(windows))]
pub fn platform_backend() -> Box<dyn TrayBackend> {
    Box::new(DefaultTrayBackend)
}

#[cfg(not(windows))]
#[derive(Debug, Default)]
pub struct DefaultTrayBackend;

#[cfg(not(windows))]
impl TrayBackend for DefaultTrayBackend {
    fn create_surface(&mut self, _class_name: &str, _title: &str, _keys: Arc<KeyQueue>) -> Result<()> {
        Err(anyhow!("tray icon presentation is not supported on this platform"))
    }

    fn destroy_surface(&mut self) {}

    fn has_surface(&self) -> bool {
        false
    }

    fn set_title(&mut self, _title: &str) -> Result<()> {
        Ok(())
    }

    fn pump_events(&mut self) -> PumpOutcome {
        PumpOutcome::default()
    }

    fn create_tile_bitmap(&mut self, _tile_side: usize) -> Result<()> {
        Err(anyhow!("tray icon presentation is not supported on this platform"))
    }

    fn release_tile_bitmap(&mut self) {}

    fn add_slot(&mut self, _slot: u32) -> Result<()> {
        Err(anyhow!("tray icon presentation is not supported on this platform"))
    }

    fn remove_slot(&mut self, _slot: u32) -> Result<()> {
        Ok(())
    }

    fn present_tile(&mut self, _slot: u32, _pixels: &[u32]) -> Result<()> {
        Err(anyhow!("tray icon presentation is not supported on this platform"))
    }
}

/// In-memory backend recording every host call. Tests drive it through the
/// paired [`MockTrayHandle`].
#[derive(Clone)]
pub struct MockTrayBackend {
    state: Arc<Mutex<MockTrayState>>,
}

#[derive(Debug, Default, Clone)]
pub struct MockTrayState {
    pub surface: bool,
    pub surfaces_created: usize,
    pub surfaces_destroyed: usize,
    pub title: Option<String>,
    pub tile_side: Option<usize>,
    pub bitmaps_released: usize,
    pub live_slots: BTreeSet<u32>,
    pub slots_added: usize,
    pub slots_removed: usize,
    pub icons_created: usize,
    pub icons_destroyed: usize,
    pub pumps: usize,
    /// Tiles presented since the last `take_presented`, in call order.
    pub presented: Vec<(u32, Vec<u32>)>,
    pub fail_surface: bool,
    pub fail_slot: Option<u32>,
    keys: Option<Arc<KeyQueue>>,
    pending_keys: Vec<(bool, u32)>,
    destroy_pending: bool,
}

impl MockTrayBackend {
    pub fn new() -> (Self, MockTrayHandle) {
        let state = Arc::new(Mutex::new(MockTrayState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockTrayHandle { state },
        )
    }

    fn state(&self) -> Result<MutexGuard<'_, MockTrayState>> {
        self.state.lock().map_err(|_| anyhow!("lock"))
    }
}

impl TrayBackend for MockTrayBackend {
    fn create_surface(&mut self, _class_name: &str, title: &str, keys: Arc<KeyQueue>) -> Result<()> {
        let mut state = self.state()?;
        if state.fail_surface {
            bail!("window registration failed");
        }
        state.surface = true;
        state.surfaces_created += 1;
        state.title = Some(title.to_string());
        state.keys = Some(keys);
        Ok(())
    }

    fn destroy_surface(&mut self) {
        if let Ok(mut state) = self.state() {
            if state.surface {
                state.surfaces_destroyed += 1;
            }
            state.surface = false;
            state.keys = None;
        }
    }

    fn has_surface(&self) -> bool {
        self.state().map(|state| state.surface).unwrap_or(false)
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        self.state()?.title = Some(title.to_string());
        Ok(())
    }

    fn pump_events(&mut self) -> PumpOutcome {
        let Ok(mut state) = self.state() else {
            return PumpOutcome::default();
        };
        state.pumps += 1;
        let pending = std::mem::take(&mut state.pending_keys);
        if let Some(keys) = state.keys.as_ref() {
            for &(pressed, raw) in &pending {
                deliver_raw_key(keys, KeySource::Window, pressed, raw);
            }
        }
        let destroy_requested = std::mem::take(&mut state.destroy_pending);
        PumpOutcome {
            dispatched: pending.len() + usize::from(destroy_requested),
            destroy_requested,
        }
    }

    fn create_tile_bitmap(&mut self, tile_side: usize) -> Result<()> {
        self.state()?.tile_side = Some(tile_side);
        Ok(())
    }

    fn release_tile_bitmap(&mut self) {
        if let Ok(mut state) = self.state() {
            if state.tile_side.take().is_some() {
                state.bitmaps_released += 1;
            }
        }
    }

    fn add_slot(&mut self, slot: u32) -> Result<()> {
        let mut state = self.state()?;
        if state.fail_slot == Some(slot) {
            bail!("shell refused icon slot {slot}");
        }
        state.live_slots.insert(slot);
        state.slots_added += 1;
        Ok(())
    }

    fn remove_slot(&mut self, slot: u32) -> Result<()> {
        let mut state = self.state()?;
        if !state.live_slots.remove(&slot) {
            bail!("icon slot {slot} is not live");
        }
        state.slots_removed += 1;
        Ok(())
    }

    fn present_tile(&mut self, slot: u32, pixels: &[u32]) -> Result<()> {
        let mut state = self.state()?;
        let Some(side) = state.tile_side else {
            bail!("no tile bitmap");
        };
        if pixels.len() != side * side {
            bail!("tile has {} pixels, bitmap holds {}", pixels.len(), side * side);
        }
        if !state.live_slots.contains(&slot) {
            bail!("icon slot {slot} is not live");
        }
        state.icons_created += 1;
        state.presented.push((slot, pixels.to_vec()));
        state.icons_destroyed += 1;
        Ok(())
    }
}

pub struct MockTrayHandle {
    state: Arc<Mutex<MockTrayState>>,
}

impl MockTrayHandle {
    pub fn snapshot(&self) -> MockTrayState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    pub fn take_presented(&self) -> Vec<(u32, Vec<u32>)> {
        self.state
            .lock()
            .map(|mut state| std::mem::take(&mut state.presented))
            .unwrap_or_default()
    }

    /// Queues a window key message for the next pump.
    pub fn send_window_key(&self, pressed: bool, raw: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_keys.push((pressed, raw));
        }
    }

    /// Makes the next pump report that the surface was destroyed.
    pub fn destroy_window(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.destroy_pending = true;
        }
    }

    pub fn fail_surface_creation(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_surface = true;
        }
    }

    pub fn fail_slot(&self, slot: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_slot = Some(slot);
        }
    }
}
