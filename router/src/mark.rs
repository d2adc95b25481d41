use crate::cost::Stage;
use crate::grid::{Grid3D, GridCoord, Occupancy, PrPayload};
use gridroute_common::db::indices::{NodeId, RouteId};
use gridroute_common::db::model::{is_power_bus, BoundingBox, Endpoint, NetlistArena, Tap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkFlag {
    Source,
    Target,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyConnected,
    Unreachable,
    Fatal,
}

/// Paints every routable tap of `node` as `SOURCE` or `TARGET`, escalating
/// through stages 0 -> 2 -> 3 when nothing could be marked at the current
/// stage. Cells successfully marked `SOURCE` are appended to `seeds` in
/// rank order for the wavefront's initial frontier; `bbox` accumulates the
/// search confinement box.
pub fn set_node_to_net(
    grid: &mut Grid3D,
    arena: &NetlistArena,
    net_number: u32,
    node_id: NodeId,
    flag: MarkFlag,
    stage: Stage,
    bbox: &mut BoundingBox,
    seeds: &mut Vec<(u8, GridCoord)>,
) -> MarkOutcome {
    let node = arena.node(node_id);
    let mut marked_any = false;

    for tap in node.taps.clone() {
        match mark_one_tap(grid, net_number, node_id, tap, flag, stage, false) {
            TapOutcome::AlreadyConnected => return MarkOutcome::AlreadyConnected,
            TapOutcome::Marked(rank) => {
                marked_any = true;
                bbox.accumulate(tap.coord);
                if flag == MarkFlag::Source {
                    seeds.push((rank, tap.coord));
                }
            }
            TapOutcome::Skipped => {}
        }
    }

    for tap in node.extended_taps.clone() {
        let owned = grid
            .node_info
            .get(&tap.coord)
            .is_some_and(|info| info.node == node_id);
        if !owned {
            continue;
        }
        match mark_one_tap(grid, net_number, node_id, tap, flag, stage, true) {
            TapOutcome::AlreadyConnected => return MarkOutcome::AlreadyConnected,
            TapOutcome::Marked(rank) => {
                marked_any = true;
                bbox.accumulate(tap.coord);
                if flag == MarkFlag::Source {
                    seeds.push((rank, tap.coord));
                }
            }
            TapOutcome::Skipped => {}
        }
    }

    if marked_any {
        return MarkOutcome::Marked;
    }

    match stage {
        Stage::Fresh => set_node_to_net(grid, arena, net_number, node_id, flag, Stage::RipUp, bbox, seeds),
        Stage::RipUp => {
            set_node_to_net(grid, arena, net_number, node_id, flag, Stage::Desperation, bbox, seeds)
        }
        Stage::Desperation => MarkOutcome::Fatal,
    }
}

enum TapOutcome {
    Marked(u8),
    AlreadyConnected,
    Skipped,
}

fn mark_one_tap(
    grid: &mut Grid3D,
    net_number: u32,
    node_id: NodeId,
    tap: Tap,
    flag: MarkFlag,
    stage: Stage,
    is_extended: bool,
) -> TapOutcome {
    if !grid.in_bounds(tap.coord) {
        return TapOutcome::Skipped;
    }

    let occupancy = grid.obs(tap.coord).occupancy;
    let acceptable = match (stage, occupancy) {
        (_, Occupancy::Free) | (_, Occupancy::PinObstruct(_)) => true,
        (_, Occupancy::Net(n)) if n == net_number => true,
        (Stage::Fresh, _) => false,
        (Stage::RipUp, Occupancy::Net(_)) => true,
        (Stage::RipUp, Occupancy::Obstruction) => false,
        (Stage::Desperation, _) => true,
    };
    if !acceptable {
        return TapOutcome::Skipped;
    }

    let pr = grid.pr_mut(tap.coord);
    let opposite_already_set = match flag {
        MarkFlag::Source => pr.flags.target,
        MarkFlag::Target => pr.flags.source,
    };
    if opposite_already_set {
        return TapOutcome::AlreadyConnected;
    }

    let conflict = stage >= Stage::RipUp && matches!(occupancy, Occupancy::Net(n) if n != net_number);

    match flag {
        MarkFlag::Source => {
            pr.flags.source = true;
            pr.flags.conflict = conflict;
            pr.payload = PrPayload::Cost(0);
        }
        MarkFlag::Target => {
            pr.flags.target = true;
            pr.flags.conflict = conflict;
        }
    }

    grid.node_info.insert(
        tap.coord,
        crate::grid::NodeInfoEntry {
            node: node_id,
            offset: tap.offset,
            stub: tap.stub_length,
        },
    );

    TapOutcome::Marked(tap.rank(is_extended))
}

/// Marks every still-unconnected terminal of `net` as `TARGET`, excluding
/// `source_node`. For same-net routes already committed from a prior
/// terminal, every covered cell is also marked `SOURCE` by walking the
/// route endpoint graph (an explicit worklist rather than recursion, so a
/// highly fanned-out net cannot blow the stack).
pub fn set_routes_to_net(
    grid: &mut Grid3D,
    arena: &mut NetlistArena,
    net_number: u32,
    source_node: NodeId,
    stage: Stage,
    bbox: &mut BoundingBox,
    seeds: &mut Vec<(u8, GridCoord)>,
) -> MarkOutcome {
    let net_id = match arena.net_by_number(net_number) {
        Some(id) => id,
        None => return MarkOutcome::Fatal,
    };

    for route_id in arena.net(net_id).routes.clone() {
        arena.route_mut(route_id).visited = false;
    }

    let mut worklist: Vec<RouteId> = arena.net(net_id).routes.clone();
    let mut any_fatal = false;

    while let Some(route_id) = worklist.pop() {
        if arena.route(route_id).visited {
            continue;
        }
        arena.route_mut(route_id).visited = true;

        let cells: Vec<GridCoord> = arena.route(route_id).covers().collect();
        for cell in cells {
            if !grid.in_bounds(cell) {
                continue;
            }
            let pr = grid.pr_mut(cell);
            if !pr.flags.source {
                pr.flags.source = true;
                pr.payload = PrPayload::Cost(0);
                bbox.accumulate(cell);
                seeds.push((0, cell));
            }
        }

        for endpoint in [arena.route(route_id).start, arena.route(route_id).end] {
            match endpoint {
                Endpoint::Node(node_id) if node_id != source_node => {
                    match set_node_to_net(grid, arena, net_number, node_id, MarkFlag::Source, stage, bbox, seeds) {
                        MarkOutcome::Fatal => any_fatal = true,
                        _ => {}
                    }
                }
                Endpoint::Route(child) => worklist.push(child),
                _ => {}
            }
        }
    }

    for route_id in arena.net(net_id).routes.clone() {
        arena.route_mut(route_id).visited = false;
    }

    if any_fatal {
        MarkOutcome::Fatal
    } else {
        MarkOutcome::Marked
    }
}

/// Marks every node of `net`, except `source_node`, as `TARGET`. Power-bus
/// nets instead paint every grid cell whose `Obs` net number already
/// matches the bus as a target, since a bus occupies non-contiguous cells
/// throughout the grid rather than a handful of discrete terminals.
pub fn mark_targets(
    grid: &mut Grid3D,
    arena: &NetlistArena,
    net_number: u32,
    source_node: NodeId,
    stage: Stage,
    bbox: &mut BoundingBox,
) -> MarkOutcome {
    if is_power_bus(net_number) {
        let mut found = false;
        for layer in 0..grid.layers {
            for y in 0..grid.height {
                for x in 0..grid.width {
                    let c = GridCoord::new(x, y, layer);
                    if grid.obs(c).net_number() == Some(net_number) {
                        grid.pr_mut(c).flags.target = true;
                        bbox.accumulate(c);
                        found = true;
                    }
                }
            }
        }
        return if found { MarkOutcome::Marked } else { MarkOutcome::Unreachable };
    }

    let mut dummy_seeds = Vec::new();
    let net_id = match arena.net_by_number(net_number) {
        Some(id) => id,
        None => return MarkOutcome::Fatal,
    };
    let mut any = false;
    for &node_id in &arena.net(net_id).nodes {
        if node_id == source_node {
            continue;
        }
        if count_targets(grid, arena, node_id) > 0 {
            any = true;
            continue;
        }
        match set_node_to_net(grid, arena, net_number, node_id, MarkFlag::Target, stage, bbox, &mut dummy_seeds) {
            MarkOutcome::Fatal => return MarkOutcome::Fatal,
            MarkOutcome::Marked | MarkOutcome::AlreadyConnected => any = true,
            MarkOutcome::Unreachable => {}
        }
    }
    if any {
        MarkOutcome::Marked
    } else {
        MarkOutcome::Unreachable
    }
}

/// Number of a node's taps still flagged `TARGET` (not yet reached by a
/// completed search this pass).
pub fn count_targets(grid: &Grid3D, arena: &NetlistArena, node_id: NodeId) -> usize {
    let node = arena.node(node_id);
    node.taps
        .iter()
        .chain(node.extended_taps.iter())
        .filter(|t| grid.in_bounds(t.coord) && grid.pr(t.coord).flags.target)
        .count()
}

/// Clears the `TARGET` flag from every tap of `node`, used once a route
/// discovers it has reached that node so it is not offered again to a
/// later terminal in the same net.
pub fn clear_target_node(grid: &mut Grid3D, arena: &NetlistArena, node_id: NodeId) {
    let node = arena.node(node_id);
    for tap in node.taps.iter().chain(node.extended_taps.iter()) {
        if grid.in_bounds(tap.coord) {
            grid.pr_mut(tap.coord).flags.target = false;
        }
    }
}

/// Clears `TARGET` from every node of `net` except `keep`, used when a
/// node has just been satisfied and the remaining targets must be
/// re-evaluated against a fresh source set.
pub fn clear_non_source_targets(grid: &mut Grid3D, arena: &NetlistArena, net_number: u32, keep: NodeId) {
    let Some(net_id) = arena.net_by_number(net_number) else {
        return;
    };
    for &node_id in &arena.net(net_id).nodes {
        if node_id != keep {
            clear_target_node(grid, arena, node_id);
        }
    }
}

/// Permanently obstructs every free tap of `node`, so later searches never
/// attempt to route to a terminal that has been given up on. Implements
/// the "any of SOURCE|TARGET|COST set" check with the intended logical-OR
/// precedence.
pub fn disable_node_nets(grid: &mut Grid3D, arena: &NetlistArena, node_id: NodeId) {
    let node = arena.node(node_id);
    for tap in node.taps.iter().chain(node.extended_taps.iter()) {
        if !grid.in_bounds(tap.coord) {
            continue;
        }
        let pr = grid.pr(tap.coord);
        let busy = pr.flags.source || pr.flags.target || pr.cost().is_some();
        if busy {
            continue;
        }
        grid.obs_mut(tap.coord).occupancy = Occupancy::Obstruction;
    }
}

/// Returns the first node of `net` with no committed route endpoint
/// bound to any of its taps.
pub fn find_unrouted_node(arena: &NetlistArena, net_number: u32) -> Option<NodeId> {
    let net_id = arena.net_by_number(net_number)?;
    let net = arena.net(net_id);
    for &node_id in &net.nodes {
        let connected = net.routes.iter().any(|&route_id| {
            let route = arena.route(route_id);
            matches!(route.start, Endpoint::Node(n) if n == node_id)
                || matches!(route.end, Endpoint::Node(n) if n == node_id)
        });
        if !connected {
            return Some(node_id);
        }
    }
    None
}
