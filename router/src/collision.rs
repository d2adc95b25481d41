use crate::grid::{Direction, GridCoord, Grid3D, Occupancy};
use gridroute_common::db::indices::{NetId, RouteId};
use gridroute_common::db::model::{is_power_bus, Endpoint, NetlistArena, RouteFlags};
use gridroute_common::util::config::RouterConfig;
use std::collections::HashSet;

/// Scans every cell of `route_id`'s segments and returns the distinct
/// foreign net numbers occupying them (power-bus nets excluded, since
/// they are expected to coexist with many routed nets). For each
/// conflicting net, the specific route whose segments contain the
/// collision point is flagged `RIP`.
pub fn find_colliding(grid: &Grid3D, arena: &mut NetlistArena, net_number: u32, route_id: RouteId) -> Vec<u32> {
    let mut colliding = HashSet::new();
    let cells: Vec<GridCoord> = arena.route(route_id).covers().collect();

    for cell in cells {
        if !grid.in_bounds(cell) {
            continue;
        }
        if let Occupancy::Net(other) = grid.obs(cell).occupancy {
            if other != net_number && !is_power_bus(other) {
                colliding.insert(other);
                flag_owning_route(arena, other, cell);
            }
        }
        if grid.obs(cell).drc_blockage {
            for (dir, nb) in grid.neighbors(cell) {
                if !dir.is_lateral() {
                    continue;
                }
                if let Occupancy::Net(other) = grid.obs(nb).occupancy {
                    if other != net_number && !is_power_bus(other) {
                        colliding.insert(other);
                        flag_owning_route(arena, other, nb);
                    }
                }
            }
        }
    }

    colliding.into_iter().collect()
}

fn flag_owning_route(arena: &mut NetlistArena, net_number: u32, cell: GridCoord) {
    let Some(net_id) = arena.net_by_number(net_number) else {
        return;
    };
    for &route_id in &arena.net(net_id).routes.clone() {
        if arena.route(route_id).covers().any(|c| c == cell) {
            arena.route_mut(route_id).flags = RouteFlags::Rip;
        }
    }
}

/// Resolves an `Obs` mismatch found while tearing down a route: if the
/// cell's current occupant net still has live routes, it must be ripped
/// as collateral damage before continuing; otherwise the occupant is an
/// orphan left over from some earlier inconsistent state and the caller
/// may simply overwrite it.
pub fn analyze_route_overwrite(arena: &NetlistArena, found_net: u32) -> bool {
    arena
        .net_by_number(found_net)
        .map(|id| !arena.net(id).routes.is_empty())
        .unwrap_or(false)
}

/// Tears down routes of `net_id`. If `flagged_only`, only routes marked
/// `RIP` are removed. Every covered cell's `Obs` occupancy is restored to
/// free (or to the pre-routing pin-obstruction sentinel, if one was
/// recorded), and DRC-blockage reference counts set by this route's
/// writeback are decremented. If `retain`, route records are left in
/// place (segments intact) so the caller may attempt to recommit them;
/// otherwise they are freed via [`crate::commit::remove_routes`]-style
/// bookkeeping.
pub fn ripup_net(
    grid: &mut Grid3D,
    arena: &mut NetlistArena,
    config: &RouterConfig,
    net_id: NetId,
    flagged_only: bool,
    retain: bool,
) {
    let net_number = arena.net(net_id).number;
    let route_ids: Vec<RouteId> = arena.net(net_id).routes.clone();

    for route_id in &route_ids {
        let flagged = matches!(arena.route(*route_id).flags, RouteFlags::Rip);
        if flagged_only && !flagged {
            continue;
        }

        let cells: Vec<GridCoord> = arena.route(*route_id).covers().collect();
        for cell in cells {
            if !grid.in_bounds(cell) {
                continue;
            }
            let is_own_tap = grid
                .node_info
                .get(&cell)
                .is_some_and(|info| arena.node(info.node).net == net_id);

            // A cell this route is supposed to own but whose Obs entry
            // names a different, still-live net is an inconsistent state
            // (e.g. a prior pass overwrote it without tearing this route
            // down first). Rip the live occupant out as collateral damage
            // before proceeding to overwrite; an orphaned Obs entry (the
            // occupant net has no routes left) is simply overwritten.
            if let Occupancy::Net(found) = grid.obs(cell).occupancy {
                if found != net_number {
                    if analyze_route_overwrite(arena, found) {
                        if let Some(foreign_id) = arena.net_by_number(found) {
                            log::warn!("rip-up: Obs mismatch at {:?}, net '{}' still live, ripping as collateral", cell, found);
                            ripup_net(grid, arena, config, foreign_id, false, retain);
                        }
                    }
                }
            }

            if is_own_tap {
                grid.obs_mut(cell).routed = false;
            } else {
                let pin_mask = grid.obs(cell).pin_obstruct;
                let obs = grid.obs_mut(cell);
                obs.occupancy = if pin_mask.any() {
                    Occupancy::PinObstruct(pin_mask)
                } else {
                    Occupancy::Free
                };
                obs.routed = false;
            }

            for dir in [Direction::North, Direction::South, Direction::East, Direction::West] {
                if let Some(nb) = grid.neighbor(cell, dir) {
                    let obs = grid.obs_mut(nb);
                    if obs.drc_refcount > 0 {
                        obs.drc_refcount -= 1;
                        if obs.drc_refcount == 0 {
                            obs.drc_blockage = false;
                        }
                    }
                }
            }
        }
    }

    if !retain {
        for route_id in route_ids {
            let flagged = matches!(arena.route(route_id).flags, RouteFlags::Rip);
            if flagged_only && !flagged {
                continue;
            }
            arena.remove_route(net_id, route_id);
        }
    }
}

/// Propagates `RIP` flags to fixpoint: if a route is ripped and another
/// same-net route's endpoint binding depends on it, that dependent route
/// is ripped too, since its source no longer exists.
pub fn ripup_dependent(arena: &mut NetlistArena, net_id: NetId) {
    loop {
        let route_ids = arena.net(net_id).routes.clone();
        let ripped: HashSet<RouteId> = route_ids
            .iter()
            .copied()
            .filter(|&r| matches!(arena.route(r).flags, RouteFlags::Rip))
            .collect();

        let mut changed = false;
        for &route_id in &route_ids {
            if ripped.contains(&route_id) {
                continue;
            }
            let depends_on_ripped = [arena.route(route_id).start, arena.route(route_id).end]
                .into_iter()
                .any(|ep| matches!(ep, Endpoint::Route(r) if ripped.contains(&r)));
            if depends_on_ripped {
                arena.route_mut(route_id).flags = RouteFlags::Rip;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridroute_common::db::model::{Endpoint as Ep, Segment};
    use gridroute_common::util::config::RouterConfig;

    #[test]
    fn find_colliding_reports_the_occupying_net() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();

        let foreign = arena.add_net(20, "foreign");
        let foreign_route = arena.add_route(foreign);
        arena.route_mut(foreign_route).segments.push(Segment::wire(GridCoord::new(0, 0, 0), GridCoord::new(2, 0, 0)));
        for x in 0..=2 {
            grid.obs_mut(GridCoord::new(x, 0, 0)).occupancy = Occupancy::Net(20);
        }

        let mine = arena.add_net(10, "mine");
        let my_route = arena.add_route(mine);
        arena.route_mut(my_route).segments.push(Segment::wire(GridCoord::new(1, 0, 0), GridCoord::new(1, 0, 0)));

        let colliding = find_colliding(&grid, &mut arena, 10, my_route);

        assert_eq!(colliding, vec![20]);
        assert_eq!(arena.route(foreign_route).flags, RouteFlags::Rip);
    }

    #[test]
    fn ripup_net_restores_free_cells_and_clears_refcounts() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let route_id = arena.add_route(net_id);
        arena.route_mut(route_id).segments.push(Segment::wire(GridCoord::new(1, 1, 0), GridCoord::new(1, 1, 0)));

        let cell = GridCoord::new(1, 1, 0);
        grid.obs_mut(cell).occupancy = Occupancy::Net(10);
        grid.obs_mut(cell).routed = true;
        grid.obs_mut(GridCoord::new(0, 1, 0)).drc_refcount = 1;
        grid.obs_mut(GridCoord::new(0, 1, 0)).drc_blockage = true;

        let config = RouterConfig::default();
        ripup_net(&mut grid, &mut arena, &config, net_id, false, false);

        assert!(grid.obs(cell).is_free());
        assert!(!grid.obs(cell).routed);
        assert_eq!(grid.obs(GridCoord::new(0, 1, 0)).drc_refcount, 0);
        assert!(!grid.obs(GridCoord::new(0, 1, 0)).drc_blockage);
        assert!(arena.net(net_id).routes.is_empty());
    }

    #[test]
    fn ripup_net_tears_down_a_live_occupant_found_at_a_mismatched_cell() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let route_id = arena.add_route(net_id);
        let cell = GridCoord::new(1, 1, 0);
        arena.route_mut(route_id).segments.push(Segment::wire(cell, cell));

        // Obs at this cell inconsistently names a different, still-live
        // net rather than net 10.
        let stale = arena.add_net(20, "stale");
        let stale_route = arena.add_route(stale);
        arena.route_mut(stale_route).segments.push(Segment::wire(cell, cell));
        grid.obs_mut(cell).occupancy = Occupancy::Net(20);

        let config = RouterConfig::default();
        ripup_net(&mut grid, &mut arena, &config, net_id, false, false);

        assert!(arena.net(stale).routes.is_empty(), "the stale live occupant should be ripped as collateral");
        assert!(arena.net(net_id).routes.is_empty());
    }

    #[test]
    fn ripup_dependent_propagates_through_a_route_chain() {
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let base = arena.add_route(net_id);
        let dependent = arena.add_route(net_id);
        arena.route_mut(dependent).start = Ep::Route(base);
        arena.route_mut(base).flags = RouteFlags::Rip;

        ripup_dependent(&mut arena, net_id);

        assert_eq!(arena.route(dependent).flags, RouteFlags::Rip);
    }
}
