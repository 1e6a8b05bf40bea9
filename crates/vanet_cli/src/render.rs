//! ASCII map rendering.
//!
//! The city grid prints one character per arc-second cell, top-left corner
//! first: `.` for empty, digits for counts or signal levels, `+` past nine,
//! and `R` on RSU cells (the reserved −1 marker).

use bevy_ecs::prelude::World;

use vanet_core::cells::{CityGrid, CITY_HEIGHT, CITY_WIDTH, RSU_MARKER};
use vanet_core::ecs::{GeoPosition, NodeDirectory, RoadNode, Rsu};
use vanet_core::systems::global_map::GlobalGrids;

fn cell_char(value: i32) -> char {
    match value {
        RSU_MARKER => 'R',
        0 => '.',
        1..=9 => char::from_digit(value as u32, 10).unwrap_or('?'),
        _ => '+',
    }
}

fn grid_to_string(grid: &CityGrid) -> String {
    let mut out = String::with_capacity((CITY_WIDTH + 1) * CITY_HEIGHT);
    for y in 0..CITY_HEIGHT as i32 {
        for x in 0..CITY_WIDTH as i32 {
            out.push(cell_char(grid.get(x, y).unwrap_or(0)));
        }
        out.push('\n');
    }
    out
}

/// Mark every RSU cell with the reserved render marker.
fn overlay_rsus(grid: &mut CityGrid, world: &World) {
    let directory = world.resource::<NodeDirectory>();
    for (_, entity) in directory.rsu_entities() {
        let Some(position) = world.get::<GeoPosition>(entity) else {
            continue;
        };
        let _ = grid.set(position.xcell as i32, position.ycell as i32, RSU_MARKER);
    }
}

/// Active vehicles per cell, with RSU markers.
pub fn vehicle_map(world: &World) -> String {
    let mut grid = CityGrid::new();
    let directory = world.resource::<NodeDirectory>();
    for (_, entity) in directory.vehicle_entities() {
        let (Some(node), Some(position)) = (
            world.get::<RoadNode>(entity),
            world.get::<GeoPosition>(entity),
        ) else {
            continue;
        };
        if !node.active {
            continue;
        }
        let (x, y) = (position.xcell as i32, position.ycell as i32);
        // Vehicles can wander off the rendered tile; those stay unmapped.
        if let Ok(count) = grid.get(x, y) {
            let _ = grid.set(x, y, count + 1);
        }
    }
    overlay_rsus(&mut grid, world);
    grid_to_string(&grid)
}

/// City-wide signal levels from the active RSUs, with RSU markers.
pub fn signal_map(world: &World) -> String {
    let mut grid = world.resource::<GlobalGrids>().signal.clone();
    overlay_rsus(&mut grid, world);
    grid_to_string(&grid)
}

/// Every RSU's 11×11 coverage map, one block per RSU.
pub fn coverage_maps(world: &World) -> String {
    let directory = world.resource::<NodeDirectory>();
    let mut out = String::new();
    for (id, entity) in directory.rsu_entities() {
        let Some(rsu) = world.get::<Rsu>(entity) else {
            continue;
        };
        out.push_str(&format!("RSU {id} ({} cells)\n", rsu.covered_cell_count));
        for yy in 0..11 {
            for xx in 0..11 {
                let signal = rsu.coverage.get(xx, yy);
                out.push(if signal == 0 {
                    '.'
                } else {
                    char::from_digit(signal as u32, 10).unwrap_or('?')
                });
            }
            out.push('\n');
        }
    }
    out
}
