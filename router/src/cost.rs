use crate::grid::{Direction, GridCoord, Grid3D, Occupancy};
use gridroute_common::db::model::{BoundingBox, Net, NetlistArena};
use gridroute_common::util::config::RouterConfig;

/// Search stage, controlling how aggressively a candidate cell's
/// occupancy by another net is tolerated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Fresh = 0,
    RipUp = 2,
    Desperation = 3,
}

/// Computes the cost of stepping from `from` in direction `dir`, and
/// returns the neighbor coordinate plus its candidate total cost if this
/// is an improvement over whatever cost that neighbor currently holds (the
/// caller is responsible for the "currently holds" comparison and for
/// applying the result to the PR cell). Returns `None` if the step is not
/// routable at all under the current stage.
pub fn eval_pt(
    grid: &Grid3D,
    arena: &NetlistArena,
    config: &RouterConfig,
    net: &Net,
    stage: Stage,
    bbox: &BoundingBox,
    from: GridCoord,
    dir: Direction,
) -> Option<(GridCoord, i64)> {
    let to = grid.neighbor(from, dir)?;
    if !bbox.contains_xy(to.x, to.y) {
        return None;
    }

    let from_cost = grid.pr(from).cost()?;
    let cell = grid.obs(to);

    match cell.occupancy {
        Occupancy::Net(other) if other != net.number => {
            if is_terminal_of_other_net(grid, to, other) {
                return None;
            }
            if net.noripup.contains(&other) {
                return None;
            }
            if stage == Stage::Fresh {
                return None;
            }
        }
        Occupancy::Obstruction => {
            if stage < Stage::Desperation {
                return None;
            }
        }
        Occupancy::PinObstruct(mask) if mask.any() && stage == Stage::Fresh => {
            return None;
        }
        _ => {}
    }

    if stage >= Stage::RipUp && cell.drc_blockage {
        for (ndir, nb) in grid.neighbors(to) {
            if !ndir.is_lateral() {
                continue;
            }
            if let Occupancy::Net(blocker) = grid.obs(nb).occupancy {
                if net.noripup.contains(&blocker) {
                    return None;
                }
            }
        }
    }

    let mut step_cost = cost_of_step(config, grid, to, dir);

    if to.layer > 0 {
        let below = GridCoord::new(to.x, to.y, to.layer - 1);
        step_cost += crossing_cost_below(grid, arena, config, below);
    }
    if to.layer + 1 < grid.layers {
        let above = GridCoord::new(to.x, to.y, to.layer + 1);
        step_cost += crossing_cost_above(grid, arena, config, above);
    }

    if let Some(info) = grid.node_info.get(&to) {
        if let Some(stub) = info.stub {
            step_cost += config.cost.offset_cost * stub.abs().round() as i64;
        }
    }

    if let Occupancy::Net(other) = cell.occupancy {
        if other != net.number && stage >= Stage::RipUp {
            step_cost += config.cost.conflict_cost;
        }
    }

    Some((to, from_cost + step_cost))
}

/// Penalizes crossing under a node's tap one layer below `to`, mirroring
/// the original router's "NODEIPTR(newpt.lay - 1)" check: a cell that is
/// itself the search's current source/target is exempt, a node with its
/// last remaining tap (ordinary or extended) is heavily penalized, one
/// with more than one ordinary tap gets the lighter cross-under cost, and
/// a node with no access at all costs nothing since it will never route
/// anyway.
fn crossing_cost_below(grid: &Grid3D, arena: &NetlistArena, config: &RouterConfig, below: GridCoord) -> i64 {
    let Some(info) = grid.node_info.get(&below) else {
        return 0;
    };
    let pr = grid.pr(below);
    if pr.flags.target || pr.flags.source {
        return 0;
    }
    let node = arena.node(info.node);
    if node.taps.len() == 1 {
        config.cost.block_cost
    } else if node.taps.is_empty() {
        match node.extended_taps.len() {
            0 => 0,
            1 => config.cost.block_cost * 10,
            _ => config.cost.block_cost,
        }
    } else {
        config.cost.xver_cost
    }
}

/// Penalizes crossing over a node's tap one layer above `to`, mirroring
/// the original router's "NODEIPTR(newpt.lay + 1)" check — simpler than
/// the lay-1 case, with no extended-tap escalation.
fn crossing_cost_above(grid: &Grid3D, arena: &NetlistArena, config: &RouterConfig, above: GridCoord) -> i64 {
    let Some(info) = grid.node_info.get(&above) else {
        return 0;
    };
    let pr = grid.pr(above);
    if pr.flags.target || pr.flags.source {
        return 0;
    }
    let node = arena.node(info.node);
    if node.taps.len() == 1 {
        config.cost.block_cost
    } else {
        config.cost.xver_cost
    }
}

fn cost_of_step(config: &RouterConfig, grid: &Grid3D, to: GridCoord, dir: Direction) -> i64 {
    if !dir.is_lateral() {
        return config.cost.via_cost;
    }
    let vertical_preferred = config
        .layers
        .get(to.layer as usize)
        .map(|l| l.vertical)
        .unwrap_or(grid.layers > 0 && to.layer % 2 == 1);

    let moves_vertically = matches!(dir, Direction::North | Direction::South);
    if moves_vertically == vertical_preferred {
        config.cost.seg_cost
    } else {
        config.cost.jog_cost
    }
}

fn is_terminal_of_other_net(grid: &Grid3D, at: GridCoord, other: u32) -> bool {
    grid.node_info.contains_key(&at) && matches!(grid.obs(at).occupancy, Occupancy::Net(n) if n == other)
}
