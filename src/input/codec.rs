//! Normalization of host virtual-key codes into the game's logical key space
//! and the 16-bit wire form stored in the key queue.

/// Logical key codes understood by the game loop.
pub mod keys {
    pub const ENTER: u8 = 13;
    pub const ESCAPE: u8 = 27;
    pub const LEFT_ARROW: u8 = 0xac;
    pub const UP_ARROW: u8 = 0xad;
    pub const RIGHT_ARROW: u8 = 0xae;
    pub const DOWN_ARROW: u8 = 0xaf;
    pub const USE: u8 = 0xa2;
    pub const FIRE: u8 = 0xa3;
    pub const RSHIFT: u8 = 0x80 + 0x36;
}

/// Host virtual-key codes with a dedicated logical mapping.
///
/// Values match the Win32 `VK_*` constants so that the codec stays usable
/// (and testable) without the platform bindings.
pub mod vk {
    pub const RETURN: u8 = 0x0d;
    pub const SHIFT: u8 = 0x10;
    pub const CONTROL: u8 = 0x11;
    pub const SPACE: u8 = 0x20;
    pub const LEFT: u8 = 0x25;
    pub const UP: u8 = 0x26;
    pub const RIGHT: u8 = 0x27;
    pub const DOWN: u8 = 0x28;
    // Escape is left to the host (it dismisses the tray overflow), Delete
    // stands in for it.
    pub const DELETE: u8 = 0x2e;
}

const PRESSED_SHIFT: u16 = 8;
const CODE_MASK: u16 = 0x00ff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub pressed: bool,
    pub code: u8,
}

impl KeyEvent {
    pub const fn new(pressed: bool, code: u8) -> Self {
        Self { pressed, code }
    }

    pub fn pack(self) -> u16 {
        pack(self.pressed, self.code)
    }

    pub fn unpack(data: u16) -> Self {
        let (pressed, code) = unpack(data);
        Self { pressed, code }
    }
}

/// Producer a key event arrived from. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Window,
    Hook,
}

pub fn normalize(raw: u8) -> u8 {
    match raw {
        vk::RETURN => keys::ENTER,
        vk::DELETE => keys::ESCAPE,
        vk::LEFT => keys::LEFT_ARROW,
        vk::RIGHT => keys::RIGHT_ARROW,
        vk::UP => keys::UP_ARROW,
        vk::DOWN => keys::DOWN_ARROW,
        vk::CONTROL => keys::FIRE,
        vk::SPACE => keys::USE,
        vk::SHIFT => keys::RSHIFT,
        other => other.to_ascii_lowercase(),
    }
}

/// Normalizes a full-width host key code. Only the low byte is significant.
pub fn normalize_wide(raw: u32) -> u8 {
    normalize((raw & 0xff) as u8)
}

pub fn pack(pressed: bool, code: u8) -> u16 {
    (u16::from(pressed) << PRESSED_SHIFT) | u16::from(code)
}

pub fn unpack(data: u16) -> (bool, u8) {
    ((data >> PRESSED_SHIFT) & 1 == 1, (data & CODE_MASK) as u8)
}
