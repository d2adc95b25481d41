pub mod check;
pub mod collision;
pub mod commit;
pub mod cost;
pub mod grid;
pub mod mark;
pub mod search;
pub mod via;

use cost::Stage;
use gridroute_common::db::indices::{NetId, NodeId, RouteId};
use gridroute_common::db::model::{is_power_bus, BoundingBox, Endpoint, NetlistArena};
use gridroute_common::util::config::RouterConfig;
use grid::Grid3D;
use std::collections::{HashSet, VecDeque};
use via::ViaLibrary;

#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("routed grid failed invariant verification: {0}")]
    InvariantViolation(String),
}

#[derive(Debug, Default)]
pub struct RouteReport {
    /// Net numbers that remained unroutable even at the desperation stage,
    /// after exhausting the rip-up retry budget.
    pub failed_nets: Vec<u32>,
    pub ripup_passes: usize,
}

/// Routes every net in `arena` against `grid`, in net-declaration order,
/// detecting and resolving collisions introduced by later nets against
/// earlier ones via bounded rip-up-and-retry, then verifies the result.
/// Single-threaded: at most one net is ever under active search, matching
/// the cooperative scheduling model the `PR` search state depends on.
pub fn route_design(
    grid: &mut Grid3D,
    arena: &mut NetlistArena,
    via_lib: &dyn ViaLibrary,
    config: &RouterConfig,
) -> Result<RouteReport, RouteError> {
    let _timer = gridroute_common::util::profiler::ScopedTimer::new("route_design");
    let mut pending: VecDeque<NetId> = (0..arena.nets.len()).map(NetId::new).collect();
    let mut report = RouteReport::default();

    while let Some(net_id) = pending.pop_front() {
        report.ripup_passes += 1;
        if report.ripup_passes > config.max_ripup_passes {
            report.failed_nets.push(arena.net(net_id).number);
            for remaining in pending.drain(..) {
                report.failed_nets.push(arena.net(remaining).number);
            }
            log::warn!("exceeded max_ripup_passes, remaining nets left unrouted");
            break;
        }

        let net_number = arena.net(net_id).number;
        log::info!("routing net '{}' (#{})", arena.net(net_id).name, net_number);

        match route_net(grid, arena, via_lib, config, net_id) {
            Ok(new_routes) => {
                let colliders = collect_colliders(grid, arena, net_number, &new_routes);
                for foreign_number in colliders {
                    let Some(foreign_id) = arena.net_by_number(foreign_number) else {
                        continue;
                    };
                    collision::ripup_dependent(arena, foreign_id);
                    collision::ripup_net(grid, arena, config, foreign_id, true, true);
                    log::info!("rip-up: net '{}' collided with net '{}'", net_number, foreign_number);
                    if !pending.contains(&foreign_id) {
                        pending.push_back(foreign_id);
                    }
                }
                commit::writeback_all_routes(grid, config, net_number, arena, net_id);
            }
            Err(()) => {
                log::warn!("net '{}' (#{}) could not be fully routed", arena.net(net_id).name, net_number);
                report.failed_nets.push(net_number);
            }
        }
    }

    if let Err(msg) = check::run(grid, arena, config) {
        return Err(RouteError::InvariantViolation(msg));
    }

    Ok(report)
}

fn collect_colliders(grid: &Grid3D, arena: &mut NetlistArena, net_number: u32, routes: &[RouteId]) -> HashSet<u32> {
    let mut colliders = HashSet::new();
    for &route_id in routes {
        colliders.extend(collision::find_colliding(grid, arena, net_number, route_id));
    }
    colliders
}

/// Routes every still-unconnected node of one net, escalating from stage
/// `Fresh` through `RipUp` to `Desperation` if the net as a whole cannot be
/// completed at a lower stage. Returns the set of newly committed routes,
/// or `Err(())` if even `Desperation` leaves a terminal unreachable (the
/// node is then permanently disabled so later passes don't keep retrying
/// it).
fn route_net(
    grid: &mut Grid3D,
    arena: &mut NetlistArena,
    via_lib: &dyn ViaLibrary,
    config: &RouterConfig,
    net_id: NetId,
) -> Result<Vec<RouteId>, ()> {
    let net_number = arena.net(net_id).number;
    for stage in [Stage::Fresh, Stage::RipUp, Stage::Desperation] {
        match route_net_at_stage(grid, arena, via_lib, config, net_id, stage) {
            Some(routes) => return Ok(routes),
            None if stage == Stage::Desperation => {
                if let Some(node_id) = mark::find_unrouted_node(arena, net_number) {
                    mark::disable_node_nets(grid, arena, node_id);
                }
                return Err(());
            }
            None => continue,
        }
    }
    Err(())
}

/// Attempts to complete every remaining terminal of `net_id` at a single
/// fixed stage, seeding the wavefront from whichever nodes are already
/// connected (starting from the net's first node) and retiring each
/// target node as it is reached. Returns `None` the moment any terminal
/// cannot be marked or reached at this stage, leaving the caller to retry
/// the whole net at the next stage.
fn route_net_at_stage(
    grid: &mut Grid3D,
    arena: &mut NetlistArena,
    via_lib: &dyn ViaLibrary,
    config: &RouterConfig,
    net_id: NetId,
    stage: Stage,
) -> Option<Vec<RouteId>> {
    let net_number = arena.net(net_id).number;
    let mut committed = Vec::new();

    if is_power_bus(net_number) {
        while let Some(node_id) = mark::find_unrouted_node(arena, net_number) {
            grid.reset_pr();
            let mut bbox = BoundingBox::empty();
            let mut seeds = Vec::new();
            match mark::set_node_to_net(grid, arena, net_number, node_id, mark::MarkFlag::Source, stage, &mut bbox, &mut seeds) {
                mark::MarkOutcome::Marked | mark::MarkOutcome::AlreadyConnected => {}
                _ => return None,
            }
            if mark::mark_targets(grid, arena, net_number, node_id, stage, &mut bbox) == mark::MarkOutcome::Unreachable {
                return None;
            }
            let expanded = bbox.expanded(8, grid.width, grid.height);
            let found = search::run_wavefront(grid, arena, config, arena.net(net_id), stage, &expanded, &seeds)?;
            match commit::commit_proute(grid, arena, via_lib, config, net_id, stage, found.0, Endpoint::Node(node_id), Endpoint::Unbound) {
                commit::CommitOutcome::Committed(route_id) => committed.push(route_id),
                _ => return None,
            }
        }
        return Some(committed);
    }

    let nodes = arena.net(net_id).nodes.clone();
    let Some(&first) = nodes.first() else {
        return Some(committed);
    };
    let mut connected: HashSet<NodeId> = HashSet::from([first]);

    for &target_node in nodes.iter().skip(1) {
        if connected.contains(&target_node) {
            continue;
        }
        grid.reset_pr();
        let mut bbox = BoundingBox::empty();
        let mut seeds = Vec::new();

        for &source_node in &connected {
            if mark::set_node_to_net(grid, arena, net_number, source_node, mark::MarkFlag::Source, stage, &mut bbox, &mut seeds)
                == mark::MarkOutcome::Fatal
            {
                return None;
            }
        }
        if mark::set_routes_to_net(grid, arena, net_number, first, stage, &mut bbox, &mut seeds) == mark::MarkOutcome::Fatal {
            return None;
        }

        match mark::set_node_to_net(grid, arena, net_number, target_node, mark::MarkFlag::Target, stage, &mut bbox, &mut seeds) {
            mark::MarkOutcome::Fatal => return None,
            mark::MarkOutcome::AlreadyConnected => {
                connected.insert(target_node);
                continue;
            }
            _ => {}
        }

        let expanded = bbox.expanded(8, grid.width, grid.height);
        let found = search::run_wavefront(grid, arena, config, arena.net(net_id), stage, &expanded, &seeds)?;

        match commit::commit_proute(
            grid,
            arena,
            via_lib,
            config,
            net_id,
            stage,
            found.0,
            Endpoint::Node(first),
            Endpoint::Node(target_node),
        ) {
            commit::CommitOutcome::Committed(route_id) => {
                committed.push(route_id);
                connected.insert(target_node);
                mark::clear_target_node(grid, arena, target_node);
            }
            _ => return None,
        }
    }

    Some(committed)
}
