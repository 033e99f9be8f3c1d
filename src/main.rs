use std::process::ExitCode;
use std::time::{Duration, Instant};
use trayframe::input::codec::keys;
use trayframe::settings::{resolve_settings_path, PresenterSettings};
use trayframe::{logging, termination, FrameStatus, Presenter};

const WIDTH: usize = 320;
const HEIGHT: usize = 200;
const FRAME_TIME: Duration = Duration::from_millis(1000 / 35);

fn main() -> ExitCode {
    let settings = match resolve_settings_path().and_then(|path| PresenterSettings::load(&path)) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load settings: {err:#}");
            PresenterSettings::default()
        }
    };
    logging::init(settings.debug_logging, settings.log_file.as_deref());

    match run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: PresenterSettings) -> anyhow::Result<()> {
    let mut presenter = Presenter::with_platform_backend(settings, WIDTH, HEIGHT)?;
    termination::install_console_handler(presenter.termination())?;
    presenter.init()?;

    let mut framebuffer = vec![0u32; WIDTH * HEIGHT];
    let (mut dx, mut dy) = (0usize, 0usize);
    let mut frames = 0u64;
    let started = Instant::now();

    loop {
        let frame_start = Instant::now();
        paint_test_pattern(&mut framebuffer, dx, dy);

        if presenter.tick(&framebuffer)? == FrameStatus::Closed {
            break;
        }

        while let Some(key) = presenter.poll_key() {
            tracing::info!(pressed = key.pressed, code = key.code, "key");
            if !key.pressed {
                continue;
            }
            match key.code {
                keys::ESCAPE => presenter.close(),
                keys::LEFT_ARROW => dx = dx.wrapping_add(8),
                keys::RIGHT_ARROW => dx = dx.wrapping_sub(8),
                keys::UP_ARROW => dy = dy.wrapping_add(8),
                keys::DOWN_ARROW => dy = dy.wrapping_sub(8),
                _ => {}
            }
        }

        frames += 1;
        if frames % 35 == 0 {
            let fps = frames as f64 / started.elapsed().as_secs_f64();
            presenter.set_title(&format!("trayframe {fps:.1} fps"));
        }

        if let Some(rest) = FRAME_TIME.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
        dx = dx.wrapping_add(1);
    }

    tracing::info!(frames, "presenter closed");
    Ok(())
}

fn paint_test_pattern(framebuffer: &mut [u32], dx: usize, dy: usize) {
    for (y, row) in framebuffer.chunks_exact_mut(WIDTH).enumerate() {
        for (x, pixel) in row.iter_mut().enumerate() {
            let v = ((x.wrapping_add(dx)) ^ (y.wrapping_add(dy))) as u32 & 0xff;
            *pixel = (v << 16) | ((255 - v) << 8) | (v / 2);
        }
    }
}
