use crate::grid::{GridCoord, Grid3D};
use gridroute_common::db::model::{NetlistArena, SegmentKind};
use gridroute_common::util::config::RouterConfig;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Verifies every quantified invariant a routed grid must satisfy,
/// logging a colorized pass/fail line per check in the same style as the
/// design's placement/DRC verification passes.
pub fn run(grid: &Grid3D, arena: &NetlistArena, config: &RouterConfig) -> Result<(), String> {
    log::info!("Starting Route Verification");
    let mut msgs = Vec::new();

    if let Err(e) = check_segment_ownership(grid, arena) {
        log::error!("\x1b[31mFAIL\x1b[0m: {}", e);
        msgs.push(e);
    } else {
        log::info!("\x1b[32mPASS\x1b[0m: segment ownership matches Obs");
    }

    if let Err(e) = check_routed_coverage(grid, arena) {
        log::error!("\x1b[31mFAIL\x1b[0m: {}", e);
        msgs.push(e);
    } else {
        log::info!("\x1b[32mPASS\x1b[0m: every ROUTED_NET cell is covered");
    }

    if let Err(e) = check_no_shared_cells(arena) {
        log::error!("\x1b[31mFAIL\x1b[0m: {}", e);
        msgs.push(e);
    } else {
        log::info!("\x1b[32mPASS\x1b[0m: no two nets share a cell");
    }

    if let Err(e) = check_segment_continuity(arena) {
        log::error!("\x1b[31mFAIL\x1b[0m: {}", e);
        msgs.push(e);
    } else {
        log::info!("\x1b[32mPASS\x1b[0m: segments are contiguous and axis-aligned");
    }

    if let Err(e) = check_stacked_via_limit(arena, config) {
        log::error!("\x1b[31mFAIL\x1b[0m: {}", e);
        msgs.push(e);
    } else {
        log::info!("\x1b[32mPASS\x1b[0m: no via stack exceeds the configured limit");
    }

    if msgs.is_empty() {
        log::info!("\x1b[32mSUCCESS\x1b[0m: routed grid is valid");
        Ok(())
    } else {
        log::error!("\x1b[31mFAILURE\x1b[0m: {} invariant violations", msgs.len());
        Err(msgs.join("; "))
    }
}

fn check_segment_ownership(grid: &Grid3D, arena: &NetlistArena) -> Result<(), String> {
    let failed = AtomicBool::new(false);
    arena.nets.par_iter().for_each(|net| {
        for &route_id in &net.routes {
            for cell in arena.route(route_id).covers() {
                if !grid.in_bounds(cell) {
                    continue;
                }
                if grid.obs(cell).net_number() != Some(net.number) {
                    failed.store(true, Ordering::Relaxed);
                }
            }
        }
    });
    if failed.load(Ordering::Relaxed) {
        Err("a committed segment's cells disagree with Obs.net".to_string())
    } else {
        Ok(())
    }
}

fn check_routed_coverage(grid: &Grid3D, arena: &NetlistArena) -> Result<(), String> {
    let mut covered = std::collections::HashSet::new();
    for net in &arena.nets {
        for &route_id in &net.routes {
            covered.extend(arena.route(route_id).covers());
        }
    }
    for layer in 0..grid.layers {
        for y in 0..grid.height {
            for x in 0..grid.width {
                let c = GridCoord::new(x, y, layer);
                if grid.obs(c).routed && !covered.contains(&c) {
                    return Err(format!("cell {:?} marked ROUTED_NET but no segment covers it", c));
                }
            }
        }
    }
    Ok(())
}

/// Checks route records directly, independent of `Obs` (which
/// [`check_segment_ownership`] already cross-references): two live routes
/// claiming the same cell is a defect even before asking what `Obs` thinks
/// happened there.
fn check_no_shared_cells(arena: &NetlistArena) -> Result<(), String> {
    let mut owner: std::collections::HashMap<GridCoord, u32> = std::collections::HashMap::new();
    for net in &arena.nets {
        for &route_id in &net.routes {
            for cell in arena.route(route_id).covers() {
                if let Some(&existing) = owner.get(&cell) {
                    if existing != net.number {
                        return Err(format!("cell {:?} claimed by nets {} and {}", cell, existing, net.number));
                    }
                }
                owner.insert(cell, net.number);
            }
        }
    }
    Ok(())
}

fn check_segment_continuity(arena: &NetlistArena) -> Result<(), String> {
    for net in &arena.nets {
        for &route_id in &net.routes {
            let segs = &arena.route(route_id).segments;
            for w in segs.windows(2) {
                let shares = w[0].to == w[1].from || w[0].to == w[1].to || w[0].from == w[1].from;
                if !shares {
                    return Err(format!("route in net '{}' has a discontinuous segment chain", net.name));
                }
            }
            for seg in segs {
                if seg.kind == SegmentKind::Via && (seg.from.x != seg.to.x || seg.from.y != seg.to.y) {
                    return Err(format!("via segment in net '{}' is not axis-stationary", net.name));
                }
                if seg.kind == SegmentKind::Wire && seg.from.layer != seg.to.layer {
                    return Err(format!("wire segment in net '{}' changes layer", net.name));
                }
            }
        }
    }
    Ok(())
}

fn check_stacked_via_limit(arena: &NetlistArena, config: &RouterConfig) -> Result<(), String> {
    let limit = config.stacked_contacts as usize;
    for net in &arena.nets {
        for &route_id in &net.routes {
            let segs = &arena.route(route_id).segments;
            let mut run = 0usize;
            for seg in segs {
                if seg.kind == SegmentKind::Via {
                    run += 1;
                    if run > limit {
                        return Err(format!("route in net '{}' stacks {} vias (limit {})", net.name, run, limit));
                    }
                } else {
                    run = 0;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Occupancy;
    use gridroute_common::db::model::{Segment, NetlistArena as Arena};

    #[test]
    fn valid_single_segment_route_passes_every_check() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = Arena::new();
        let net_id = arena.add_net(10, "n0");
        let route_id = arena.add_route(net_id);
        arena.route_mut(route_id).segments.push(Segment::wire(GridCoord::new(0, 0, 0), GridCoord::new(2, 0, 0)));
        for x in 0..=2 {
            let cell = GridCoord::new(x, 0, 0);
            grid.obs_mut(cell).occupancy = Occupancy::Net(10);
            grid.obs_mut(cell).routed = true;
        }

        let config = RouterConfig::default();
        assert!(run(&grid, &arena, &config).is_ok());
    }

    #[test]
    fn ownership_mismatch_between_segment_and_obs_is_caught() {
        let grid = Grid3D::new(4, 4, 1);
        let mut arena = Arena::new();
        let net_id = arena.add_net(10, "n0");
        let route_id = arena.add_route(net_id);
        arena.route_mut(route_id).segments.push(Segment::wire(GridCoord::new(0, 0, 0), GridCoord::new(1, 0, 0)));
        // Obs was never painted, so it disagrees with the committed segment.
        let config = RouterConfig::default();
        assert!(run(&grid, &arena, &config).is_err());
    }

    #[test]
    fn discontinuous_segment_chain_is_caught() {
        let mut arena = Arena::new();
        let net_id = arena.add_net(10, "n0");
        let route_id = arena.add_route(net_id);
        let segs = &mut arena.route_mut(route_id).segments;
        segs.push(Segment::wire(GridCoord::new(0, 0, 0), GridCoord::new(1, 0, 0)));
        segs.push(Segment::wire(GridCoord::new(3, 0, 0), GridCoord::new(4, 0, 0)));

        assert!(check_segment_continuity(&arena).is_err());
    }

    #[test]
    fn via_stack_over_the_configured_limit_is_caught() {
        let mut arena = Arena::new();
        let net_id = arena.add_net(10, "n0");
        let route_id = arena.add_route(net_id);
        let segs = &mut arena.route_mut(route_id).segments;
        segs.push(Segment::via((0, 0), 0));
        segs.push(Segment::via((0, 0), 1));
        segs.push(Segment::via((0, 0), 2));

        let config = RouterConfig { stacked_contacts: 1, ..RouterConfig::default() };
        assert!(check_stacked_via_limit(&arena, &config).is_err());
    }
}
