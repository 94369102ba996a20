//! Debug drawing of the physics world
//!
//! A read-only consumer of the broadphase: it finds what is visible through
//! `query_region` and emits draw calls to a [`DebugDrawHandle`]. Nothing here
//! renders; a frontend implements the handle, and [`DrawCommandBuffer`]
//! records the calls for headless use and tests.

use std::collections::BTreeSet;

use broad2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::body::{Body, BodyKey, BodyType, Fixture};
use crate::shapes::Shape;
use crate::system::MapId;
use crate::world::PhysicsWorld;

/// Length of the axis stubs drawn at body origins
pub const AXIS_STUB_LENGTH: f32 = 0.25;

/// Linear RGBA colour
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const RED: Self = Self::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Self = Self::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Self = Self::rgb(0.0, 0.0, 1.0);
    pub const YELLOW: Self = Self::rgb(1.0, 1.0, 0.0);
    pub const GREY: Self = Self::rgb(0.5, 0.5, 0.5);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// Output sink for debug drawing; coordinates are local to the current transform
pub trait DebugDrawHandle {
    fn set_transform(&mut self, transform: Transform2D);
    fn draw_rect(&mut self, rect: Aabb, color: Color, filled: bool);
    fn draw_circle(&mut self, center: Vec2, radius: f32, color: Color, filled: bool);
    fn draw_polygon(&mut self, vertices: &[Vec2], color: Color);
    fn draw_line(&mut self, from: Vec2, to: Vec2, color: Color);
}

/// One recorded draw call
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    SetTransform(Transform2D),
    Rect { rect: Aabb, color: Color, filled: bool },
    Circle { center: Vec2, radius: f32, color: Color, filled: bool },
    Polygon { vertices: Vec<Vec2>, color: Color },
    Line { from: Vec2, to: Vec2, color: Color },
}

/// A [`DebugDrawHandle`] that records every call
#[derive(Clone, Debug, Default)]
pub struct DrawCommandBuffer {
    commands: Vec<DrawCommand>,
}

impl DrawCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl DebugDrawHandle for DrawCommandBuffer {
    fn set_transform(&mut self, transform: Transform2D) {
        self.commands.push(DrawCommand::SetTransform(transform));
    }

    fn draw_rect(&mut self, rect: Aabb, color: Color, filled: bool) {
        self.commands.push(DrawCommand::Rect { rect, color, filled });
    }

    fn draw_circle(&mut self, center: Vec2, radius: f32, color: Color, filled: bool) {
        self.commands.push(DrawCommand::Circle { center, radius, color, filled });
    }

    fn draw_polygon(&mut self, vertices: &[Vec2], color: Color) {
        self.commands.push(DrawCommand::Polygon {
            vertices: vertices.to_vec(),
            color,
        });
    }

    fn draw_line(&mut self, from: Vec2, to: Vec2, color: Color) {
        self.commands.push(DrawCommand::Line { from, to, color });
    }
}

/// Draw a shape in body-local coordinates
pub fn draw_shape(handle: &mut impl DebugDrawHandle, shape: &Shape, color: Color) {
    match shape {
        Shape::Circle(circle) => handle.draw_circle(circle.center, circle.radius, color, true),
        Shape::Polygon(polygon) => handle.draw_polygon(&polygon.vertices, color),
        Shape::Edge(edge) => handle.draw_line(edge.a, edge.b, color),
    }
}

/// How close a body is to sleeping, in `[0, 1]`; sleeping bodies are at 1
pub fn sleep_percent(body: &Body, time_to_sleep: f32) -> f32 {
    if !body.awake || time_to_sleep <= 0.0 {
        return 1.0;
    }
    (body.sleep_time / time_to_sleep).clamp(0.0, 1.0)
}

/// White for a fully awake body, fading into `color` as it approaches sleep
pub fn wake_color(color: Color, percent: f32) -> Color {
    let percent = percent.clamp(0.0, 1.0);
    Color {
        r: 1.0 - percent * (1.0 - color.r),
        g: 1.0 - percent * (1.0 - color.g),
        b: 1.0 - percent * (1.0 - color.b),
        a: color.a,
    }
}

/// Base colour of a fixture before the wake blend
pub fn fixture_color(body: &Body, fixture: &Fixture) -> Color {
    let base = match body.body_type {
        BodyType::Static => Color::GREY,
        BodyType::Kinematic => Color::BLUE,
        BodyType::Dynamic => Color::GREEN,
    };
    if fixture.hard {
        base
    } else {
        base.with_alpha(0.5)
    }
}

/// Colour of a tree node outline by depth
fn depth_color(depth: u32, is_leaf: bool) -> Color {
    if is_leaf {
        return Color::GREEN.with_alpha(0.25);
    }
    const PALETTE: [Color; 4] = [Color::RED, Color::YELLOW, Color::BLUE, Color::WHITE];
    PALETTE[depth as usize % PALETTE.len()].with_alpha(0.2)
}

/// What the overlay draws
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub show_shapes: bool,
    pub show_aabbs: bool,
    pub show_tree: bool,
    pub show_axes: bool,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            show_shapes: true,
            show_aabbs: true,
            show_tree: false,
            show_axes: false,
        }
    }
}

/// World overlay: shapes, bounds and the bodies under the mouse
#[derive(Clone, Debug, Default)]
pub struct DebugOverlay {
    pub settings: OverlaySettings,
    hovered: Vec<BodyKey>,
}

impl DebugOverlay {
    pub fn new(settings: OverlaySettings) -> Self {
        Self {
            settings,
            hovered: Vec::new(),
        }
    }

    /// Bodies found under the mouse by the last [`draw_world`][Self::draw_world]
    pub fn hovered(&self) -> &[BodyKey] {
        &self.hovered
    }

    /// Draw everything of `map` visible in `viewport`
    ///
    /// Returns the bodies whose world AABB contains `mouse`.
    pub fn draw_world(
        &mut self,
        world: &PhysicsWorld,
        map: MapId,
        viewport: Aabb,
        mouse: Option<Vec2>,
        handle: &mut impl DebugDrawHandle,
    ) -> &[BodyKey] {
        self.hovered.clear();
        if !viewport.is_valid() {
            return &self.hovered;
        }

        let time_to_sleep = world.config().time_to_sleep;
        let bodies: BTreeSet<BodyKey> = world
            .query_region(map, viewport)
            .filter_map(|fixture| world.fixture(fixture).map(|f| f.body))
            .collect();

        for &body_key in &bodies {
            let Some(body) = world.body(body_key) else {
                continue;
            };
            let Some(world_box) = world.body_aabb(body_key) else {
                continue;
            };

            if self.settings.show_shapes {
                let percent = sleep_percent(body, time_to_sleep);
                handle.set_transform(body.transform);
                for fixture in world.fixtures_of(body_key).iter().filter_map(|f| world.fixture(*f)) {
                    let color = wake_color(fixture_color(body, fixture), percent);
                    for shape in &fixture.shapes {
                        draw_shape(handle, shape, color);
                    }
                }
                handle.set_transform(Transform2D::identity());
            }

            if mouse.is_some_and(|m| world_box.contains_point(m)) {
                self.hovered.push(body_key);
            }

            if self.settings.show_aabbs {
                handle.draw_rect(world_box, Color::RED.with_alpha(0.33), false);
            }
        }

        if self.settings.show_tree {
            if let Some(broadphase) = world.broadphase().map(map) {
                for node in broadphase.tree().nodes() {
                    if node.aabb.overlaps(&viewport) {
                        handle.draw_rect(node.aabb, depth_color(node.depth, node.is_leaf), false);
                    }
                }
            }
        }

        if self.settings.show_axes {
            draw_entity_axes(world, map, viewport, handle);
        }

        &self.hovered
    }

    /// Text lines describing the hovered bodies, separated by a rule
    pub fn hover_lines(&self, world: &PhysicsWorld) -> Vec<String> {
        let mut lines = Vec::new();
        for (i, &body) in self.hovered.iter().enumerate() {
            if i > 0 {
                lines.push("------".to_string());
            }
            lines.extend(body_info_lines(world, body));
        }
        lines
    }
}

/// Layer and mask in binary, the enabled/hard/anchored flags and the shape kinds of each fixture
pub fn body_info_lines(world: &PhysicsWorld, key: BodyKey) -> Vec<String> {
    let Some(body) = world.body(key) else {
        return Vec::new();
    };
    let mut lines = vec![format!("Body: {:?}", key)];
    for &fixture_key in world.fixtures_of(key) {
        let Some(fixture) = world.fixture(fixture_key) else {
            continue;
        };
        lines.push(format!("Layer: {:b}", fixture.filter.layer.bits()));
        lines.push(format!("Mask: {:b}", fixture.filter.mask.bits()));
        lines.push(format!(
            "Enabled: {}, Hard: {}, Anchored: {}",
            !world.broadphase().is_disabled(fixture_key),
            fixture.hard,
            body.is_static()
        ));
        let kinds: Vec<&str> = fixture.shapes.iter().map(Shape::kind_name).collect();
        lines.push(format!("Shapes: {}", kinds.join(", ")));
    }
    lines
}

/// Red X and green Y stubs at the origin of every body of `map` inside `viewport`
pub fn draw_entity_axes(
    world: &PhysicsWorld,
    map: MapId,
    viewport: Aabb,
    handle: &mut impl DebugDrawHandle,
) {
    for (_, body) in world.bodies() {
        let position = body.position();
        if body.map != map || !viewport.contains_point(position) {
            continue;
        }
        let rotation = body.transform.rotation;
        handle.draw_line(position, position + rotation.x_axis() * AXIS_STUB_LENGTH, Color::RED);
        handle.draw_line(position, position + rotation.y_axis() * AXIS_STUB_LENGTH, Color::GREEN);
    }
}
