pub mod display;
pub mod input;
pub mod logging;
pub mod presenter;
pub mod settings;
pub mod termination;

pub use input::{KeyEvent, KeyQueue};
pub use presenter::{FrameStatus, Presenter, PresenterState};
pub use settings::PresenterSettings;
