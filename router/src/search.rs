use crate::cost::{eval_pt, Stage};
use crate::grid::{Direction, GridCoord, Grid3D, PrPayload};
use gridroute_common::db::model::{BoundingBox, Net, NetlistArena};
use gridroute_common::util::config::RouterConfig;

/// Label-correcting expansion from every cell currently flagged `SOURCE`
/// toward the nearest cell flagged `TARGET`. `seeds` carries the source
/// cells in priority-rank order (0 = highest priority, as assigned by
/// source/target marking) so the very first frontier is seeded in a fixed,
/// reproducible order; everything discovered afterwards is pushed onto a
/// single LIFO worklist, matching the "stable, single-threaded,
/// deterministic tie-break" scheduling model.
pub fn run_wavefront(
    grid: &mut Grid3D,
    arena: &NetlistArena,
    config: &RouterConfig,
    net: &Net,
    stage: Stage,
    bbox: &BoundingBox,
    seeds: &[(u8, GridCoord)],
) -> Option<(GridCoord, i64)> {
    let mut stack: Vec<GridCoord> = Vec::new();
    let mut buckets: Vec<Vec<GridCoord>> = vec![Vec::new(); 6];
    for &(rank, c) in seeds {
        buckets[(rank as usize).min(5)].push(c);
        grid.pr_mut(c).flags.on_stack = true;
    }
    // Drain low-priority buckets first so rank 0 ends up on top of the
    // stack and pops before anything else.
    for rank in (0..6).rev() {
        stack.extend(buckets[rank].drain(..));
    }

    let mut best: Option<(GridCoord, i64)> = None;

    while let Some(cell) = stack.pop() {
        if grid.pr(cell).flags.processed {
            continue;
        }
        {
            let pr = grid.pr_mut(cell);
            pr.flags.processed = true;
            pr.flags.on_stack = false;
        }

        let cost = match grid.pr(cell).cost() {
            Some(c) => c,
            None => continue,
        };

        if let Some((_, best_cost)) = best {
            if cost >= best_cost {
                continue;
            }
        }

        if grid.pr(cell).flags.target {
            if best.is_none_or(|(_, bc)| cost < bc) {
                best = Some((cell, cost));
            }
            continue;
        }

        for dir in Direction::ALL {
            let Some((nb, nb_cost)) = eval_pt(grid, arena, config, net, stage, bbox, cell, dir)
            else {
                continue;
            };

            let improves = match grid.pr(nb).cost() {
                Some(existing) => nb_cost < existing,
                None => true,
            };
            if !improves {
                continue;
            }

            let pr = grid.pr_mut(nb);
            pr.payload = PrPayload::Cost(nb_cost);
            pr.pred = Some(dir.opposite());
            pr.flags.processed = false;
            // Intended "not already queued" check (the array-based source
            // this is modeled on negates with bitwise-NOT here, which is
            // harmless only because PROCESSED gating drops the duplicate;
            // a proper logical check avoids queuing the duplicate at all).
            if !pr.flags.on_stack {
                pr.flags.on_stack = true;
                stack.push(nb);
            }
        }
    }

    best
}

/// Walks a found target's predecessor chain back to a `SOURCE` cell,
/// returning the raw point list from source to target inclusive, or
/// `None` if the chain runs out without ever reaching a `SOURCE` cell
/// (the search exited without actually connecting anything).
pub fn reconstruct_path(grid: &Grid3D, target: GridCoord) -> Option<Vec<GridCoord>> {
    let mut path = vec![target];
    let mut current = target;
    while !grid.pr(current).flags.source {
        let dir = grid.pr(current).pred?;
        let prev = grid.neighbor(current, dir)?;
        path.push(prev);
        current = prev;
    }
    path.reverse();
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridroute_common::db::model::NetlistArena;
    use gridroute_common::util::config::RouterConfig;

    #[test]
    fn wavefront_finds_adjacent_target_with_minimal_cost() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let config = RouterConfig::default();
        let bbox = BoundingBox { min: GridCoord::new(0, 0, 0), max: GridCoord::new(3, 3, 0) };

        let source = GridCoord::new(0, 0, 0);
        let target = GridCoord::new(0, 1, 0);
        grid.pr_mut(source).flags.source = true;
        grid.pr_mut(source).payload = PrPayload::Cost(0);
        grid.pr_mut(target).flags.target = true;

        let net = arena.net(net_id).clone();
        let found = run_wavefront(&mut grid, &arena, &config, &net, Stage::Fresh, &bbox, &[(0, source)]);

        assert_eq!(found.map(|(c, _)| c), Some(target));
    }

    #[test]
    fn reconstruct_path_walks_back_to_source() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let config = RouterConfig::default();
        let bbox = BoundingBox { min: GridCoord::new(0, 0, 0), max: GridCoord::new(3, 3, 0) };

        let source = GridCoord::new(0, 0, 0);
        let target = GridCoord::new(2, 0, 0);
        grid.pr_mut(source).flags.source = true;
        grid.pr_mut(source).payload = PrPayload::Cost(0);
        grid.pr_mut(target).flags.target = true;

        let net = arena.net(net_id).clone();
        let found = run_wavefront(&mut grid, &arena, &config, &net, Stage::Fresh, &bbox, &[(0, source)]).unwrap();
        let path = reconstruct_path(&grid, found.0).unwrap();

        assert_eq!(path.first(), Some(&source));
        assert_eq!(path.last(), Some(&target));
    }

    #[test]
    fn reconstruct_path_fails_cleanly_on_a_cell_never_reached() {
        let grid = Grid3D::new(2, 2, 1);
        assert!(reconstruct_path(&grid, GridCoord::new(1, 1, 0)).is_none());
    }
}
