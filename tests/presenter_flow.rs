use std::sync::Arc;
use std::thread;
use trayframe::display::MockTrayBackend;
use trayframe::input::codec::{keys, vk};
use trayframe::input::{deliver_raw_key, KeySource};
use trayframe::termination::TerminationTrigger;
use trayframe::{FrameStatus, KeyEvent, Presenter, PresenterSettings, PresenterState};

fn settings() -> PresenterSettings {
    PresenterSettings {
        install_keyboard_hook: false,
        ..PresenterSettings::default()
    }
}

fn numbered(width: usize, height: usize) -> Vec<u32> {
    (0..width * height).map(|i| i as u32).collect()
}

#[test]
fn hook_and_window_keys_arrive_in_push_order() {
    let (backend, handle) = MockTrayBackend::new();
    let mut presenter = Presenter::new(settings(), 64, 64, Box::new(backend)).expect("presenter");
    presenter.init().expect("init");

    let hook_queue = presenter.key_queue();
    deliver_raw_key(&hook_queue, KeySource::Hook, true, u32::from(vk::LEFT));
    handle.send_window_key(false, u32::from(b'A'));

    let status = presenter.tick(&numbered(64, 64)).expect("tick");
    assert_eq!(status, FrameStatus::Presented { tiles: 64 });

    assert_eq!(presenter.poll_key(), Some(KeyEvent::new(true, keys::LEFT_ARROW)));
    assert_eq!(presenter.poll_key(), Some(KeyEvent::new(false, b'a')));
    assert_eq!(presenter.poll_key(), None);
}

#[test]
fn open_and_close_without_ticks_leaks_no_slots() {
    let (backend, handle) = MockTrayBackend::new();
    let mut presenter = Presenter::new(settings(), 320, 200, Box::new(backend)).expect("presenter");

    presenter.init().expect("init");
    assert_eq!(presenter.state(), PresenterState::Running);
    assert_eq!(handle.snapshot().live_slots.len(), 64);

    presenter.close();
    presenter.close();
    let state = handle.snapshot();
    assert!(state.live_slots.is_empty());
    // One extra add/remove pair for the primed first icon.
    assert_eq!(state.slots_added, 65);
    assert_eq!(state.slots_removed, 65);
    assert_eq!(state.bitmaps_released, 1);
    assert!(!state.surface);
    assert_eq!(presenter.state(), PresenterState::Uninitialized);
}

#[test]
fn overhanging_grid_stops_after_last_visible_row() {
    let (backend, handle) = MockTrayBackend::new();
    let mut presenter = Presenter::new(settings(), 320, 200, Box::new(backend)).expect("presenter");
    presenter.init().expect("init");

    let status = presenter.tick(&numbered(320, 200)).expect("tick");
    assert_eq!(status, FrameStatus::Presented { tiles: 40 });

    let presented = handle.take_presented();
    let slots: Vec<u32> = presented.iter().map(|(slot, _)| *slot).collect();
    assert_eq!(slots, (0..40).collect::<Vec<_>>());
    assert!(presented.iter().all(|(_, pixels)| pixels.len() == 40 * 40));
}

#[test]
fn partial_bottom_row_is_padded_with_black() {
    let (backend, handle) = MockTrayBackend::new();
    let mut presenter = Presenter::new(settings(), 64, 60, Box::new(backend)).expect("presenter");
    presenter.init().expect("init");

    let frame = vec![0x00ff_ffff; 64 * 60];
    presenter.tick(&frame).expect("tick");

    let presented = handle.take_presented();
    assert_eq!(presented.len(), 64);
    for (slot, pixels) in presented.iter().filter(|(slot, _)| *slot >= 56) {
        assert!(pixels[..32].iter().all(|&p| p == 0x00ff_ffff), "slot {slot}");
        assert!(pixels[32..].iter().all(|&p| p == 0), "slot {slot}");
    }
}

#[test]
fn short_framebuffer_fails_the_tick() {
    let (backend, _handle) = MockTrayBackend::new();
    let mut presenter = Presenter::new(settings(), 64, 64, Box::new(backend)).expect("presenter");
    presenter.init().expect("init");
    assert!(presenter.tick(&[0; 100]).is_err());
}

#[test]
fn console_signal_from_another_thread_is_closed_by_next_tick() {
    let (backend, handle) = MockTrayBackend::new();
    let mut presenter = Presenter::new(settings(), 64, 64, Box::new(backend)).expect("presenter");
    presenter.init().expect("init");

    let signal = presenter.termination();
    let waiter = thread::spawn(move || {
        signal.request(TerminationTrigger::ConsoleSignal);
        signal.wait_closed(std::time::Duration::from_secs(5))
    });

    let frame = numbered(64, 64);
    while !presenter.termination().is_closed() {
        if presenter.tick(&frame).expect("tick") == FrameStatus::Closed {
            break;
        }
        thread::yield_now();
    }

    assert!(waiter.join().expect("waiter"));
    assert!(handle.snapshot().live_slots.is_empty());
    assert_eq!(
        presenter.termination().requested(),
        Some(TerminationTrigger::ConsoleSignal)
    );
}

#[test]
fn producers_on_other_threads_feed_the_same_queue() {
    let (backend, _handle) = MockTrayBackend::new();
    let settings = PresenterSettings {
        key_queue_capacity: 64,
        ..settings()
    };
    let mut presenter = Presenter::new(settings, 64, 64, Box::new(backend)).expect("presenter");
    presenter.init().expect("init");

    let queue = presenter.key_queue();
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for raw in [vk::UP, vk::SPACE, vk::CONTROL] {
                deliver_raw_key(&queue, KeySource::Hook, true, u32::from(raw));
            }
        })
    };
    producer.join().expect("producer");

    let codes: Vec<u8> = std::iter::from_fn(|| presenter.poll_key())
        .map(|event| event.code)
        .collect();
    assert_eq!(codes, vec![keys::UP_ARROW, keys::USE, keys::FIRE]);
}
