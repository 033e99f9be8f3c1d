pub mod backend;
pub mod grid;
pub mod session;
#[cfg(windows)]
pub mod win32;

pub use backend::{platform_backend, MockTrayBackend, MockTrayHandle, PumpOutcome, TrayBackend};
pub use grid::{blit, TileGrid};
pub use session::{update_slot, DisplaySession};
