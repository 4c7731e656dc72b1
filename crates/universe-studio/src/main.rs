use std::f32::consts::TAU;
use std::rc::Rc;

use anyhow::{Context, Result};
use universe_engine::coords::NormalRect;
use universe_engine::device::{GpuInit, Primitive};
use universe_engine::input::{Key, NodeEvent};
use universe_engine::logging::{LoggingConfig, init_logging};
use universe_engine::paint::Color;
use universe_engine::render::ImageData;
use universe_engine::scene::{Camera, Display, DisplayConfig, Node, NodeCtx, NodeId};
use universe_engine::shape::{Rectangle, Shape};
use universe_engine::window::{Runtime, RuntimeConfig};

/// Spins its children around +Z. Space pauses.
struct Spinner {
    speed: f32,
    paused: bool,
}

impl Node for Spinner {
    fn update(&mut self, ctx: &mut NodeCtx<'_>, dt: f32) {
        if !self.paused {
            ctx.transform.rotate_z(self.speed * dt);
        }
    }

    fn on_event(&mut self, event: &NodeEvent) {
        if let NodeEvent::KeyPressed { key: Key::Space, repeat: false, .. } = event {
            self.paused = !self.paused;
            log::info!("spinner {}", if self.paused { "paused" } else { "running" });
        }
    }
}

fn hexagon(radius: f32, color: Color) -> Result<Shape> {
    let mut shape = Shape::new(Primitive::TriangleFan);
    shape.fill(color);
    shape.begin()?;
    for i in 0..6 {
        let angle = i as f32 * TAU / 6.0;
        shape.vertex(radius * angle.cos(), radius * angle.sin())?;
    }
    shape.end()?;
    Ok(shape)
}

fn checkerboard(size: u32, cell: u32) -> Result<ImageData> {
    let image = image::RgbaImage::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            image::Rgba([235, 235, 235, 255])
        } else {
            image::Rgba([40, 90, 160, 255])
        }
    });
    Ok(ImageData::rgba(size, size, image.into_raw())?)
}

fn textured_quad(image: ImageData, half: f32) -> Result<Shape> {
    let mut shape = Shape::new(Primitive::TriangleFan);
    shape.fill_texture(Rc::new(image));
    shape.begin()?;
    shape.vertex_uv(-half, -half, 0.0, 1.0)?;
    shape.vertex_uv(half, -half, 1.0, 1.0)?;
    shape.vertex_uv(half, half, 1.0, 0.0)?;
    shape.vertex_uv(-half, half, 0.0, 0.0)?;
    shape.end()?;
    Ok(shape)
}

fn add_child(display: &mut Display, parent: NodeId, node: impl Node) -> Result<NodeId> {
    let id = display.create_node(node);
    display.add(parent, id)?;
    Ok(id)
}

fn build_scene(display: &mut Display) -> Result<()> {
    let root = display.root();

    // Overview on the left, close-up of the spinner on the right.
    add_child(display, root, Camera::orthographic(NormalRect::new(0.0, 0.0, 0.5, 1.0), 10.0))?;
    add_child(display, root, Camera::orthographic(NormalRect::new(0.5, 0.0, 0.5, 1.0), 4.0))?;

    let spinner = add_child(display, root, Spinner { speed: 1.2, paused: false })?;
    add_child(display, spinner, hexagon(2.5, Color::from_hex(0xE0A030))?)?;

    let moon = add_child(display, spinner, hexagon(0.6, Color::from_hex(0x50C878))?)?;
    display.transform_mut(moon)?.translate_xy(3.5, 0.0);
    display.behavior_mut::<Shape>(moon)?.set_batched(true);

    let quad = add_child(display, root, textured_quad(checkerboard(64, 8)?, 2.0)?)?;
    display.transform_mut(quad)?.translate_xy(-6.0, 5.0);

    for row in 0..4 {
        for col in 0..8 {
            let shade = 0.3 + 0.1 * row as f32;
            let rect = Rectangle::new(0.8, 0.8, Color::rgb(shade, 0.2, 1.0 - shade));
            let id = add_child(display, root, rect)?;
            display
                .transform_mut(id)?
                .translate_xy(-7.0 + col as f32 * 2.0, -5.0 - row as f32);
        }
    }

    log::info!("scene built: {} nodes", display.len());
    Ok(())
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let mut display = Display::new(DisplayConfig {
        clear_color: Color::from_hex(0x101418),
        ..DisplayConfig::default()
    });
    build_scene(&mut display).context("failed to build the demo scene")?;

    Runtime::run(
        RuntimeConfig {
            title: "Universe Studio".to_string(),
            ..RuntimeConfig::default()
        },
        GpuInit::default(),
        display,
    )
}
