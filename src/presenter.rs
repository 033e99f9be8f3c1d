use crate::display::{platform_backend, DisplaySession, TileGrid, TrayBackend};
use crate::input::{KeyEvent, KeyQueue, KeyboardHook};
use crate::settings::PresenterSettings;
use crate::termination::{TerminationSignal, TerminationTrigger};
use anyhow::{bail, Context, Result};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterState {
    Uninitialized,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { tiles: usize },
    /// The session has been torn down; the caller should stop ticking.
    Closed,
}

/// Presents a fixed-size framebuffer through tray icons and collects key
/// input for a polling game loop.
pub struct Presenter {
    settings: PresenterSettings,
    backend: Box<dyn TrayBackend>,
    session: DisplaySession,
    keys: Arc<KeyQueue>,
    hook: Option<KeyboardHook>,
    termination: Arc<TerminationSignal>,
    state: PresenterState,
}

impl Presenter {
    pub fn new(
        mut settings: PresenterSettings,
        width: usize,
        height: usize,
        backend: Box<dyn TrayBackend>,
    ) -> Result<Self> {
        settings.sanitize();
        let grid = TileGrid::new(width, height, settings.blocks_per_row)
            .context("build tile grid for framebuffer")?;
        Ok(Self {
            session: DisplaySession::new(grid, settings.prime_first_icon),
            keys: Arc::new(KeyQueue::with_capacity(settings.key_queue_capacity)),
            settings,
            backend,
            hook: None,
            termination: Arc::new(TerminationSignal::new()),
            state: PresenterState::Uninitialized,
        })
    }

    /// Presenter on the host's native tray backend.
    pub fn with_platform_backend(settings: PresenterSettings, width: usize, height: usize) -> Result<Self> {
        Self::new(settings, width, height, platform_backend())
    }

    pub fn state(&self) -> PresenterState {
        self.state
    }

    pub fn grid(&self) -> &TileGrid {
        self.session.grid()
    }

    pub fn settings(&self) -> &PresenterSettings {
        &self.settings
    }

    /// Shared handle for additional key producers.
    pub fn key_queue(&self) -> Arc<KeyQueue> {
        Arc::clone(&self.keys)
    }

    pub fn termination(&self) -> Arc<TerminationSignal> {
        Arc::clone(&self.termination)
    }

    /// Creates the drawable surface, starts the key producers and allocates
    /// the icon slots. Does nothing when already running. On failure nothing
    /// stays allocated.
    pub fn init(&mut self) -> Result<()> {
        if self.state == PresenterState::Running {
            return Ok(());
        }
        if self.termination.is_closing() {
            bail!("presenter has already been closed");
        }

        self.backend
            .create_surface(
                &self.settings.window_class_name,
                &self.settings.window_title,
                Arc::clone(&self.keys),
            )
            .context("create drawable surface")?;

        if self.settings.install_keyboard_hook {
            match KeyboardHook::subscribe(Arc::clone(&self.keys)) {
                Ok(hook) => self.hook = Some(hook),
                Err(err) => {
                    tracing::warn!(?err, "keyboard hook unavailable, using window messages only")
                }
            }
        }

        if let Err(err) = self.session.open(self.backend.as_mut()) {
            self.hook = None;
            self.backend.destroy_surface();
            return Err(err);
        }

        self.state = PresenterState::Running;
        tracing::info!(
            width = self.grid().width(),
            height = self.grid().height(),
            "presenter running"
        );
        Ok(())
    }

    /// One display refresh: dispatch pending host events, then push every
    /// visible tile of `framebuffer` to its icon.
    pub fn tick(&mut self, framebuffer: &[u32]) -> Result<FrameStatus> {
        if self.state != PresenterState::Running {
            if self.termination.is_closing() {
                return Ok(FrameStatus::Closed);
            }
            bail!("tick called before init");
        }

        if self.termination.requested().is_some() {
            self.close_for(TerminationTrigger::ConsoleSignal);
            return Ok(FrameStatus::Closed);
        }

        let pumped = self.backend.pump_events();
        if pumped.destroy_requested {
            self.close_for(TerminationTrigger::WindowDestroyed);
            return Ok(FrameStatus::Closed);
        }

        let tiles = self.session.present(self.backend.as_mut(), framebuffer)?;
        tracing::trace!(dispatched = pumped.dispatched, tiles, "tick");
        Ok(FrameStatus::Presented { tiles })
    }

    pub fn poll_key(&self) -> Option<KeyEvent> {
        self.keys.poll()
    }

    /// Best-effort window title update; ignored until a surface exists.
    pub fn set_title(&mut self, title: &str) {
        if !self.backend.has_surface() {
            return;
        }
        if let Err(err) = self.backend.set_title(title) {
            tracing::warn!(?err, "failed to set window title");
        }
    }

    /// Tears the session down. Only the first call, from any trigger, does
    /// any work.
    pub fn close(&mut self) {
        self.close_for(TerminationTrigger::Explicit);
    }

    fn close_for(&mut self, trigger: TerminationTrigger) {
        if self.state != PresenterState::Running {
            return;
        }
        self.termination.request(trigger);
        if !self.termination.begin_close() {
            return;
        }

        tracing::info!(trigger = ?self.termination.requested(), "closing presenter");
        self.hook = None;
        self.session.close(self.backend.as_mut());
        self.backend.destroy_surface();
        self.state = PresenterState::Uninitialized;
        self.termination.mark_closed();
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.close();
    }
}
