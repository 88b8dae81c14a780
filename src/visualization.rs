//! Interactive 3D replay of a decision record using kiss3d.
//!
//! Commits are replayed in order: each one places the committed module in its
//! cell, each rollback clears the cell again. A module is drawn as a core cube
//! with one arm per face whose label is not `0`, coloured by label; modules
//! without any such face are left invisible.

use kiss3d::prelude::*;

use blockwave::{Catalog, DecisionKind, DecisionRecord, Direction, Grid, Label, Module};

/// Size of the cube at the centre of a drawn module.
const CORE_SIZE: f32 = 0.35;
/// Thickness of a connector arm.
const ARM_WIDTH: f32 = 0.2;
/// Most decisions replayed per frame.
const MAX_SPEED: usize = 256;

fn label_color(label: Label) -> Color {
    const PALETTE: [(f32, f32, f32); 6] = [
        (0.9, 0.9, 0.9),
        (0.2, 0.6, 1.0),
        (1.0, 0.4, 0.2),
        (0.3, 0.9, 0.3),
        (1.0, 0.9, 0.2),
        (0.8, 0.3, 0.9),
    ];
    let (r, g, b) = PALETTE[label.rem_euclid(PALETTE.len() as Label) as usize];
    Color::new(r, g, b, 1.0)
}

/// Adds the nodes drawing `module` centred on `center`.
fn draw_module(scene: &mut SceneNode3d, module: &Module, center: Vec3) -> Vec<SceneNode3d> {
    let connected: Vec<Direction> = Direction::ALL
        .into_iter()
        .filter(|&direction| module.face(direction) != 0)
        .collect();
    if connected.is_empty() {
        return Vec::new();
    }

    let mut nodes = vec![scene
        .add_cube(CORE_SIZE, CORE_SIZE, CORE_SIZE)
        .set_color(Color::new(0.6, 0.6, 0.6, 1.0))
        .set_position(center)];

    for direction in connected {
        let (dx, dy, dz) = direction.offset();
        let axis = Vec3::new(dx as f32, dy as f32, dz as f32);
        // arms reach from the core to the cell face
        let length = 0.5 - CORE_SIZE / 2.0;
        let extent = |component: i32| {
            if component != 0 {
                length
            } else {
                ARM_WIDTH
            }
        };
        let node = scene
            .add_cube(extent(dx), extent(dy), extent(dz))
            .set_color(label_color(module.face(direction)))
            .set_position(center + axis * (CORE_SIZE / 2.0 + length / 2.0));
        nodes.push(node);
    }
    nodes
}

struct Replay<'a> {
    grid: &'a Grid,
    catalog: &'a Catalog,
    decisions: &'a DecisionRecord,
    /// Index of the next decision to apply.
    cursor: usize,
    /// Nodes currently drawn per cell.
    placed: Vec<Vec<SceneNode3d>>,
}

impl<'a> Replay<'a> {
    fn new(grid: &'a Grid, catalog: &'a Catalog, decisions: &'a DecisionRecord) -> Self {
        Self {
            grid,
            catalog,
            decisions,
            cursor: 0,
            placed: (0..grid.len()).map(|_| Vec::new()).collect(),
        }
    }

    fn is_done(&self) -> bool {
        self.cursor >= self.decisions.len()
    }

    fn clear_cell(&mut self, cell: usize) {
        for mut node in self.placed[cell].drain(..) {
            node.remove();
        }
    }

    fn reset(&mut self) {
        for cell in 0..self.placed.len() {
            self.clear_cell(cell);
        }
        self.cursor = 0;
    }

    /// Applies the next decision, if any.
    fn step(&mut self, scene: &mut SceneNode3d) {
        let Some(decision) = self.decisions.entries().get(self.cursor) else {
            return;
        };
        self.cursor += 1;

        let Ok(cell) = self.grid.index_of(decision.coord) else {
            return;
        };
        self.clear_cell(cell);
        if decision.kind == DecisionKind::Commit {
            if let Some(module) = self.catalog.by_id(decision.module) {
                let [x, y, z] = self.grid.world_position(cell);
                self.placed[cell] = draw_module(scene, module, Vec3::new(x, y, z));
            }
        }
    }

    fn title(&self, paused: bool, speed: usize) -> String {
        format!(
            "Decision {}/{} ({}x){} - [Space] pause, [Right] step, [Up/Down] speed, [R] restart",
            self.cursor,
            self.decisions.len(),
            speed,
            if paused { " paused" } else { "" }
        )
    }
}

/// Replays `decisions` over `grid` in an interactive 3D viewer.
pub fn display(grid: &Grid, catalog: &Catalog, decisions: &DecisionRecord) {
    pollster::block_on(display_async(grid, catalog, decisions));
}

async fn display_async(grid: &Grid, catalog: &Catalog, decisions: &DecisionRecord) {
    if decisions.is_empty() {
        println!("No decisions to replay");
        return;
    }

    let mut replay = Replay::new(grid, catalog, decisions);
    let mut paused = false;
    let mut speed: usize = 1;

    let mut window = Window::new(&replay.title(paused, speed)).await;

    let dims = grid.dimensions();
    let mut camera = OrbitCamera3d::default();
    camera.set_dist(dims.x.max(dims.y).max(dims.z) as f32 * 2.0 + 4.0);

    let mut scene = SceneNode3d::empty();
    scene
        .add_light(Light::point(100.0))
        .set_position(Vec3::new(10.0, 15.0, 10.0));

    loop {
        let mut manual_steps = 0;
        for event in window.events().iter() {
            if let kiss3d::event::WindowEvent::Key(key, action, _) = event.value {
                use kiss3d::event::{Action, Key};
                if action == Action::Press {
                    match key {
                        Key::Space => paused = !paused,
                        Key::Right => manual_steps += 1,
                        Key::Up => speed = (speed * 2).min(MAX_SPEED),
                        Key::Down => speed = (speed / 2).max(1),
                        Key::R => replay.reset(),
                        _ => {}
                    }
                }
            }
        }

        let steps = if paused { manual_steps } else { speed };
        for _ in 0..steps {
            if replay.is_done() {
                break;
            }
            replay.step(&mut scene);
        }
        window.set_title(&replay.title(paused, speed));

        if !window.render_3d(&mut scene, &mut camera).await {
            break;
        }
    }
}
