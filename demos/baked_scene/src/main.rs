//! Interactive bake demo.
//!
//! Controls: F spawn cube, R remove cube, L rebuild lightmaps, 1/2/3 add a
//! directional/point/spot light, T toggle the newest light, P export
//! lightmaps as PNG, Esc quit. Type a color (`0.2 0.6 1.0` or `#3399ff`)
//! on stdin to tint the next light.
//!
//! Pass a JSON bake config path as the first argument to override defaults.

mod scene;

use std::io::BufRead;
use std::time::Instant;

use anyhow::Result;
use lightbake::BakeConfig;
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use scene::{BakedScene, NewLight};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => BakeConfig::load(&path)?,
        None => BakeConfig::default(),
    };

    let (color_tx, color_rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match scene::parse_color(&line) {
                Some(color) => {
                    if color_tx.send(color).is_err() {
                        break;
                    }
                }
                None => log::warn!("could not parse color {line:?}"),
            }
        }
    });

    let event_loop = EventLoop::new()?;
    let mut window_attributes = Window::default_attributes();
    window_attributes.title = "Baked Scene".into();
    window_attributes.inner_size = Some(LogicalSize::new(1280, 720).into());
    let window = event_loop.create_window(window_attributes)?;
    // The surface borrows the window for the rest of the program.
    let window: &'static Window = Box::leak(Box::new(window));

    let mut scene = BakedScene::new(window, config, color_rx)?;

    let mut last_frame = Instant::now();
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(size) => scene.resize(size),
            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(key) = pressed_key(&event) {
                    if key == KeyCode::Escape {
                        elwt.exit();
                    } else if let Err(err) = handle_key(&mut scene, key) {
                        log::error!("{err:?}");
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = scene.draw() {
                    log::error!("draw failed: {err:?}");
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            scene.update(now - last_frame);
            last_frame = now;
            window.request_redraw();
        }
        _ => {}
    })?;

    Ok(())
}

fn pressed_key(event: &KeyEvent) -> Option<KeyCode> {
    match event.physical_key {
        PhysicalKey::Code(code) if event.state == ElementState::Pressed && !event.repeat => {
            Some(code)
        }
        _ => None,
    }
}

fn handle_key(scene: &mut BakedScene, key: KeyCode) -> Result<()> {
    match key {
        KeyCode::KeyF => scene.spawn_cube(),
        KeyCode::KeyR => scene.remove_cube(),
        KeyCode::KeyL => scene.rebuild(),
        KeyCode::Digit1 => scene.add_light(NewLight::Directional),
        KeyCode::Digit2 => scene.add_light(NewLight::Point),
        KeyCode::Digit3 => scene.add_light(NewLight::Spot),
        KeyCode::KeyT => scene.toggle_light(),
        KeyCode::KeyP => scene.export_lightmaps(),
        _ => Ok(()),
    }
}
