use gridroute_common::db::model::{Tap, NET_GROUND};
use gridroute_common::geom::coord::GridCoord;
use gridroute_common::util::config::RouterConfig;
use gridroute_router::grid::{Grid3D, Occupancy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Builds a random in-memory design against an empty grid, in place of
/// parsing one from a file: a ground bus along the bottom row of the base
/// layer, a handful of single-cell obstructions, and `num_nets` two- to
/// four-terminal nets with taps scattered across the pin layers.
pub fn build_synthetic_design(
    config: &RouterConfig,
    num_nets: usize,
    seed: u64,
) -> (Grid3D, gridroute_common::db::model::NetlistArena) {
    let mut grid = Grid3D::new(config.grid.channels_x, config.grid.channels_y, config.grid.num_layers);
    let mut arena = gridroute_common::db::model::NetlistArena::new();
    let mut rng = StdRng::seed_from_u64(seed);

    paint_ground_bus(&mut grid);
    scatter_obstructions(&mut grid, &mut rng, num_nets);

    let pin_layers = config.grid.pin_layers.max(1).min(config.grid.num_layers.max(1));
    let mut used: HashSet<GridCoord> = HashSet::new();
    for i in 0..num_nets {
        let net_id = arena.add_net(10 + i as u32, format!("net{i}"));
        let terminal_count = rng.gen_range(2..=4);
        for _ in 0..terminal_count {
            let Some(coord) = pick_free_coord(&grid, &mut rng, pin_layers, &mut used) else {
                break;
            };
            let node_id = arena.add_node(net_id);
            arena.node_mut(node_id).taps.push(Tap::plain(coord));
        }
    }

    (grid, arena)
}

fn paint_ground_bus(grid: &mut Grid3D) {
    for x in 0..grid.width {
        let c = GridCoord::new(x, 0, 0);
        grid.obs_mut(c).occupancy = Occupancy::Net(NET_GROUND);
        grid.obs_mut(c).routed = true;
    }
}

fn scatter_obstructions(grid: &mut Grid3D, rng: &mut StdRng, count: usize) {
    let n = count / 4;
    for _ in 0..n {
        let x = rng.gen_range(0..grid.width);
        let y = rng.gen_range(1..grid.height);
        let layer = rng.gen_range(0..grid.layers);
        let c = GridCoord::new(x, y, layer);
        if grid.obs(c).is_free() {
            grid.obs_mut(c).occupancy = Occupancy::Obstruction;
        }
    }
}

fn pick_free_coord(grid: &Grid3D, rng: &mut StdRng, pin_layers: u8, used: &mut HashSet<GridCoord>) -> Option<GridCoord> {
    for _ in 0..64 {
        let x = rng.gen_range(0..grid.width);
        let y = rng.gen_range(1..grid.height);
        let layer = rng.gen_range(0..pin_layers);
        let c = GridCoord::new(x, y, layer);
        if grid.obs(c).is_free() && used.insert(c) {
            return Some(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_bus_covers_the_entire_bottom_row_of_the_base_layer() {
        let mut grid = Grid3D::new(8, 8, 2);
        paint_ground_bus(&mut grid);
        for x in 0..grid.width {
            let c = GridCoord::new(x, 0, 0);
            assert_eq!(grid.obs(c).net_number(), Some(NET_GROUND));
            assert!(grid.obs(c).routed);
        }
    }

    #[test]
    fn build_synthetic_design_gives_every_net_distinct_tap_coordinates() {
        let config = RouterConfig::default();
        let (_, arena) = build_synthetic_design(&config, 6, 42);

        assert_eq!(arena.nets.len(), 6);
        let mut seen = HashSet::new();
        for net in &arena.nets {
            assert!(net.nodes.len() >= 2, "every net should get at least two terminals");
            for &node_id in &net.nodes {
                for tap in &arena.node(node_id).taps {
                    assert!(seen.insert(tap.coord), "tap coordinates must not be reused across nets");
                }
            }
        }
    }

    #[test]
    fn build_synthetic_design_never_places_a_tap_on_the_ground_row() {
        let config = RouterConfig::default();
        let (_, arena) = build_synthetic_design(&config, 10, 7);

        for net in &arena.nets {
            for &node_id in &net.nodes {
                for tap in &arena.node(node_id).taps {
                    assert_ne!(tap.coord.y, 0, "pin placement must avoid the ground bus row");
                }
            }
        }
    }

    #[test]
    fn same_seed_produces_the_same_design() {
        let config = RouterConfig::default();
        let (_, arena_a) = build_synthetic_design(&config, 5, 99);
        let (_, arena_b) = build_synthetic_design(&config, 5, 99);

        let taps_of = |arena: &gridroute_common::db::model::NetlistArena| -> Vec<GridCoord> {
            arena
                .nets
                .iter()
                .flat_map(|n| n.nodes.iter())
                .flat_map(|&node_id| arena.node(node_id).taps.iter().map(|t| t.coord).collect::<Vec<_>>())
                .collect()
        };

        assert_eq!(taps_of(&arena_a), taps_of(&arena_b));
    }
}
