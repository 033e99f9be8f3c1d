pub mod codec;
pub mod keyboard_hook;
pub mod queue;

pub use codec::{normalize, pack, unpack, KeyEvent, KeySource};
pub use keyboard_hook::KeyboardHook;
pub use queue::KeyQueue;

/// Routes one raw key notification from any producer into `queue`.
///
/// Host codes wider than a byte are truncated to their low byte before
/// normalization.
pub fn deliver_raw_key(queue: &KeyQueue, source: KeySource, pressed: bool, raw: u32) {
    let event = KeyEvent::new(pressed, codec::normalize_wide(raw));
    tracing::trace!(?source, raw, code = event.code, pressed, "key event");
    queue.push_event(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_from_both_sources_shares_one_code_space() {
        let queue = KeyQueue::default();
        deliver_raw_key(&queue, KeySource::Hook, true, u32::from(b'W'));
        deliver_raw_key(&queue, KeySource::Window, false, u32::from(b'W'));
        assert_eq!(queue.poll(), Some(KeyEvent::new(true, b'w')));
        assert_eq!(queue.poll(), Some(KeyEvent::new(false, b'w')));
    }
}
