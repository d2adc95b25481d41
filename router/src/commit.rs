use crate::cost::Stage;
use crate::grid::{Direction, GridCoord, Grid3D, Occupancy};
use crate::via::ViaLibrary;
use gridroute_common::db::indices::{NetId, RouteId};
use gridroute_common::db::model::{segment_cells, Endpoint, NetlistArena, Segment, SegmentKind};
use gridroute_common::util::config::RouterConfig;

#[derive(Debug)]
pub enum CommitOutcome {
    Committed(RouteId),
    Discontinuous,
    RepairFailed,
}

/// Reconstructs the path to `target`, repairs stacked vias and minimum-area
/// violations, coalesces it into segments, and records a new route on
/// `net`. At stage `RipUp`, writeback into `Obs` is deferred: the caller
/// must tear down colliding nets and then call [`writeback_route`].
///
/// `default_start`/`default_end` are used only when the reconstructed
/// path's own endpoints don't resolve to anything more specific — see
/// [`resolve_endpoint`]. The caller usually doesn't know, before the path
/// exists, whether it actually began at a node tap or somewhere along an
/// already-committed route of the same net, so the real endpoint binding
/// can only be determined here.
pub fn commit_proute(
    grid: &mut Grid3D,
    arena: &mut NetlistArena,
    via_lib: &dyn ViaLibrary,
    config: &RouterConfig,
    net_id: NetId,
    stage: Stage,
    target: GridCoord,
    default_start: Endpoint,
    default_end: Endpoint,
) -> CommitOutcome {
    let Some(mut path) = crate::search::reconstruct_path(grid, target) else {
        return CommitOutcome::Discontinuous;
    };

    let start = resolve_endpoint(grid, arena, net_id, path[0], default_start);
    let end = resolve_endpoint(grid, arena, net_id, *path.last().unwrap(), default_end);

    if !repair_stacked_vias(grid, config, stage, &mut path) {
        if stage == Stage::Fresh {
            return CommitOutcome::RepairFailed;
        }
    }

    let stubs = repair_minimum_area(grid, via_lib, config, &path);
    let segments = splice_area_stubs(generate_segments(&path), stubs);
    let route_id = arena.add_route(net_id);
    {
        let route = arena.route_mut(route_id);
        route.segments = segments;
        route.start = start;
        route.end = end;
    }

    if stage != Stage::RipUp {
        let net_number = arena.net(net_id).number;
        writeback_route(grid, config, net_number, route_id, arena);
    }

    CommitOutcome::Committed(route_id)
}

/// Binds a reconstructed path's endpoint cell to whatever actually owns
/// it: a node's tap if `grid.node_info` names one, otherwise whichever of
/// the net's already-committed routes covers the cell (the case
/// `mark::set_routes_to_net` seeds as a `SOURCE` without any node tap at
/// all), falling back to the caller's default when neither applies.
fn resolve_endpoint(grid: &Grid3D, arena: &NetlistArena, net_id: NetId, cell: GridCoord, default: Endpoint) -> Endpoint {
    if let Some(info) = grid.node_info.get(&cell) {
        return Endpoint::Node(info.node);
    }
    for &route_id in &arena.net(net_id).routes {
        if arena.route(route_id).covers().any(|c| c == cell) {
            return Endpoint::Route(route_id);
        }
    }
    default
}

/// Scans for runs of consecutive via transitions taller than
/// `stacked_contacts` (a run of N transitions spans N+1 layers) and
/// inserts a one-cell lateral jog at an interior via point of the
/// offending run. A single probe helper checks
/// all four lateral neighbors plus their adjacent-layer partner, in place
/// of four copy-pasted direction-specific blocks.
fn repair_stacked_vias(
    grid: &mut Grid3D,
    config: &RouterConfig,
    stage: Stage,
    path: &mut Vec<GridCoord>,
) -> bool {
    let limit = config.stacked_contacts as usize;
    let mut i = 0;
    while i + 1 < path.len() {
        let mut run_end = i;
        while run_end + 1 < path.len()
            && path[run_end].x == path[run_end + 1].x
            && path[run_end].y == path[run_end + 1].y
            && path[run_end].layer != path[run_end + 1].layer
        {
            run_end += 1;
        }
        let run_len = run_end - i;
        if run_len > limit {
            let mid = i + run_len / 2;
            match probe_lateral_jog(grid, stage, path[mid]) {
                Some(jog) => path[mid] = jog,
                None => return false,
            }
        }
        i = run_end.max(i + 1);
    }
    true
}

fn probe_lateral_jog(grid: &Grid3D, stage: Stage, at: GridCoord) -> Option<GridCoord> {
    let mut best: Option<(GridCoord, i64)> = None;
    for dir in [Direction::North, Direction::South, Direction::East, Direction::West] {
        let Some(candidate) = grid.neighbor(at, dir) else {
            continue;
        };
        let reachable = grid.pr(candidate).pred.is_some() || grid.pr(candidate).flags.source;
        if !reachable {
            continue;
        }
        let partner_layer_ok = if at.layer + 1 < grid.layers {
            grid.neighbor(candidate, Direction::Up).is_some()
        } else {
            grid.neighbor(candidate, Direction::Down).is_some()
        };
        if !partner_layer_ok {
            continue;
        }
        let routable = match grid.obs(candidate).occupancy {
            Occupancy::Free | Occupancy::PinObstruct(_) => true,
            Occupancy::Net(_) => stage >= Stage::RipUp,
            Occupancy::Obstruction => stage == Stage::Desperation,
        };
        if !routable {
            continue;
        }
        let cost = grid.pr(candidate).cost().unwrap_or(i64::MAX);
        if best.is_none_or(|(_, bc)| cost < bc) {
            best = Some((candidate, cost));
        }
    }
    best.map(|(c, _)| c)
}

/// For an interior via (not the top or bottom of its stack) whose
/// base-layer metal falls below the layer's minimum-area rule, returns a
/// one-cell lateral stub anchored at the via's contact point, extending in
/// the layer's preferred routing direction. The via's own position is left
/// untouched; [`splice_area_stubs`] inserts the stub as an extra segment
/// right after the via so the repair shows up as real covered metal.
fn repair_minimum_area(
    grid: &Grid3D,
    via_lib: &dyn ViaLibrary,
    config: &RouterConfig,
    path: &[GridCoord],
) -> Vec<(GridCoord, Segment)> {
    let mut stubs = Vec::new();
    for i in 1..path.len().saturating_sub(1) {
        let (prev, cur, next) = (path[i - 1], path[i], path[i + 1]);
        let is_via = prev.layer != cur.layer && next.layer != cur.layer && prev.x == cur.x && prev.y == cur.y;
        if !is_via {
            continue;
        }
        let width = via_lib.via_width(cur.layer);
        let min_area = via_lib.min_route_area(cur.layer);
        let pitch = config
            .layers
            .get(cur.layer as usize)
            .map(|l| if l.vertical { l.pitch_y } else { l.pitch_x })
            .unwrap_or(0.2);
        if width * pitch >= min_area {
            continue;
        }
        let dir = if via_lib.prefers_vertical_extension(cur.layer) { Direction::North } else { Direction::East };
        if let Some(ext) = grid.neighbor(cur, dir) {
            stubs.push((cur, Segment::wire(cur, ext)));
        }
    }
    stubs
}

/// Inserts each minimum-area stub immediately after the via segment whose
/// contact point it extends. The stub shares an endpoint with both the via
/// below and whatever comes after it, so segment continuity still holds.
fn splice_area_stubs(mut segments: Vec<Segment>, stubs: Vec<(GridCoord, Segment)>) -> Vec<Segment> {
    for (via_point, stub) in stubs {
        let at = segments.iter().position(|s| s.kind == SegmentKind::Via && (s.from == via_point || s.to == via_point));
        if let Some(pos) = at {
            segments.insert(pos + 1, stub);
        }
    }
    segments
}

/// Coalesces a raw point list into wire/via segments, merging consecutive
/// same-direction wire steps into a single segment.
fn generate_segments(path: &[GridCoord]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut run_start = 0;
    let mut i = 0;
    while i + 1 < path.len() {
        let (a, b) = (path[i], path[i + 1]);
        if a.layer != b.layer {
            if i > run_start {
                segments.push(Segment::wire(path[run_start], a));
            }
            segments.push(Segment::via((a.x, a.y), a.layer.min(b.layer)));
            run_start = i + 1;
        }
        i += 1;
    }
    if run_start < path.len() - 1 {
        segments.push(Segment::wire(path[run_start], path[path.len() - 1]));
    }
    segments
}

/// Applies every segment of `route_id` to `Obs`: marks covered cells with
/// the owning net and sets DRC-blockage reservations on the neighbors the
/// layer's `needblock` policy names. Called immediately by
/// [`commit_proute`] except at stage `RipUp`, where the caller defers it
/// until colliding nets have been torn down.
pub fn writeback_route(
    grid: &mut Grid3D,
    config: &RouterConfig,
    net_number: u32,
    route_id: RouteId,
    arena: &NetlistArena,
) {
    let route = arena.route(route_id);
    for segment in &route.segments {
        writeback_segment(grid, config, net_number, segment);
    }
}

/// Per-segment half of [`writeback_route`], also used when reinstating a
/// single previously ripped segment without recommitting the whole route.
pub fn writeback_segment(grid: &mut Grid3D, config: &RouterConfig, net_number: u32, segment: &Segment) {
    for cell in segment_cells(segment) {
        if !grid.in_bounds(cell) {
            continue;
        }
        {
            let obs = grid.obs_mut(cell);
            obs.occupancy = Occupancy::Net(net_number);
            obs.routed = true;
        }

        let needblock = config.layers.get(cell.layer as usize).map(|l| l.needblock);
        let Some(mask) = needblock else { continue };
        let is_via = segment.kind == SegmentKind::Via;
        let block_x = if is_via { mask.via_block_x } else { mask.route_block_x };
        let block_y = if is_via { mask.via_block_y } else { mask.route_block_y };

        let mut dirs = Vec::new();
        if block_x {
            dirs.push(Direction::East);
            dirs.push(Direction::West);
        }
        if block_y {
            dirs.push(Direction::North);
            dirs.push(Direction::South);
        }
        for dir in dirs {
            if let Some(nb) = grid.neighbor(cell, dir) {
                let obs = grid.obs_mut(nb);
                obs.drc_blockage = true;
                obs.drc_refcount = obs.drc_refcount.saturating_add(1).min(15);
            }
        }

        if let Some(layer_below) = cell.layer.checked_sub(1) {
            let below = GridCoord::new(cell.x, cell.y, layer_below);
            if grid.in_bounds(below) {
                if let Occupancy::PinObstruct(pin_mask) = grid.obs(below).occupancy {
                    if pin_mask.any() {
                        let obs = grid.obs_mut(cell);
                        obs.drc_blockage = true;
                        obs.drc_refcount = obs.drc_refcount.saturating_add(1).min(15);
                    }
                }
            }
        }
    }
}

/// Applies writeback for every currently un-written route of `net`,
/// used after a batch of stage-2 colliders has been ripped and every
/// surviving route's segments must finally be painted into `Obs`.
pub fn writeback_all_routes(grid: &mut Grid3D, config: &RouterConfig, net_number: u32, arena: &NetlistArena, net_id: NetId) {
    for &route_id in &arena.net(net_id).routes {
        writeback_route(grid, config, net_number, route_id, arena);
    }
}

/// Discards a net's routes without touching `Obs` (the counterpart of
/// `ripup_net` for routes that were never written back, e.g. a stage-0
/// attempt abandoned before commit).
pub fn remove_routes(arena: &mut NetlistArena, net_id: NetId, only_flagged: bool) {
    let route_ids: Vec<RouteId> = arena.net(net_id).routes.clone();
    for route_id in route_ids {
        let flagged = matches!(arena.route(route_id).flags, gridroute_common::db::model::RouteFlags::Rip);
        if only_flagged && !flagged {
            continue;
        }
        arena.remove_route(net_id, route_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridroute_common::util::config::RouterConfig;

    struct FixedVia;
    impl ViaLibrary for FixedVia {
        fn via_width(&self, _layer: u8) -> f64 {
            0.1
        }
        fn min_route_area(&self, _layer: u8) -> f64 {
            0.0
        }
        fn prefers_vertical_extension(&self, _layer: u8) -> bool {
            false
        }
    }

    #[test]
    fn generate_segments_coalesces_a_straight_run_and_emits_one_via() {
        let path = vec![
            GridCoord::new(0, 0, 0),
            GridCoord::new(1, 0, 0),
            GridCoord::new(2, 0, 0),
            GridCoord::new(2, 0, 1),
            GridCoord::new(2, 1, 1),
        ];
        let segs = generate_segments(&path);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].kind, SegmentKind::Wire);
        assert_eq!(segs[1].kind, SegmentKind::Via);
        assert_eq!(segs[2].kind, SegmentKind::Wire);
    }

    #[test]
    fn repair_stacked_vias_jogs_a_run_longer_than_the_configured_limit() {
        let mut grid = Grid3D::new(4, 4, 5);
        let config = RouterConfig { stacked_contacts: 1, ..RouterConfig::default() };

        // A 4-layer via stack at (1,1) is 3 transitions deep, exceeding the
        // limit of stacked_contacts=1.
        let mut path = vec![
            GridCoord::new(1, 1, 0),
            GridCoord::new(1, 1, 1),
            GridCoord::new(1, 1, 2),
            GridCoord::new(1, 1, 3),
        ];
        for layer in 0..5 {
            let reachable = GridCoord::new(0, 1, layer);
            grid.pr_mut(reachable).pred = Some(Direction::East);
        }

        let ok = repair_stacked_vias(&mut grid, &config, Stage::Fresh, &mut path);
        assert!(ok);
        // The midpoint should have jogged off the (1,1) column.
        assert!(path.iter().any(|c| c.x != 1 || c.y != 1));
    }

    #[test]
    fn writeback_segment_marks_cells_owned_and_routed() {
        let mut grid = Grid3D::new(4, 4, 2);
        let config = RouterConfig::default();
        let seg = Segment::wire(GridCoord::new(0, 0, 0), GridCoord::new(2, 0, 0));

        writeback_segment(&mut grid, &config, 42, &seg);

        for x in 0..=2 {
            let cell = grid.obs(GridCoord::new(x, 0, 0));
            assert_eq!(cell.net_number(), Some(42));
            assert!(cell.routed);
        }
    }

    struct ThinVia;
    impl ViaLibrary for ThinVia {
        fn via_width(&self, _layer: u8) -> f64 {
            0.1
        }
        fn min_route_area(&self, _layer: u8) -> f64 {
            10.0
        }
        fn prefers_vertical_extension(&self, _layer: u8) -> bool {
            false
        }
    }

    #[test]
    fn repair_minimum_area_produces_a_stub_for_an_undersized_interior_via() {
        let grid = Grid3D::new(4, 4, 3);
        let config = RouterConfig::default();
        let via_lib = ThinVia;

        // A via stack through layer 1, which is interior (neither the
        // bottom nor the top of the path).
        let path = vec![GridCoord::new(1, 1, 0), GridCoord::new(1, 1, 1), GridCoord::new(1, 1, 2)];
        let stubs = repair_minimum_area(&grid, &via_lib, &config, &path);

        assert_eq!(stubs.len(), 1);
        let (via_point, stub) = &stubs[0];
        assert_eq!(*via_point, GridCoord::new(1, 1, 1));
        assert_eq!(stub.kind, SegmentKind::Wire);
        // Horizontal preference (prefers_vertical_extension == false).
        assert_eq!(stub.to, GridCoord::new(2, 1, 1));
    }

    #[test]
    fn splice_area_stubs_inserts_the_stub_right_after_its_via_and_keeps_continuity() {
        let path = vec![GridCoord::new(1, 1, 0), GridCoord::new(1, 1, 1), GridCoord::new(1, 1, 2)];
        let segments = generate_segments(&path);
        assert_eq!(segments.len(), 2, "two stacked vias, no lateral wire run");

        let stub = Segment::wire(GridCoord::new(1, 1, 1), GridCoord::new(2, 1, 1));
        let spliced = splice_area_stubs(segments, vec![(GridCoord::new(1, 1, 1), stub)]);

        assert_eq!(spliced.len(), 3);
        assert_eq!(spliced[1].kind, SegmentKind::Wire);
        for w in spliced.windows(2) {
            let shares_endpoint = w[0].to == w[1].from || w[0].to == w[1].to || w[0].from == w[1].from;
            assert!(shares_endpoint, "segments {:?} and {:?} must share an endpoint", w[0], w[1]);
        }
    }

    #[test]
    fn resolve_endpoint_binds_to_the_covering_route_when_no_node_owns_the_cell() {
        let grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let route_id = arena.add_route(net_id);
        let cell = GridCoord::new(1, 1, 0);
        arena.route_mut(route_id).segments.push(Segment::wire(cell, cell));

        // mark::set_routes_to_net seeds a SOURCE cell this way: covered by
        // an already-committed route, with no node tap at that cell at all.
        let fallback = Endpoint::Node(gridroute_common::db::indices::NodeId::new(99));
        let bound = resolve_endpoint(&grid, &arena, net_id, cell, fallback);
        assert_eq!(bound, Endpoint::Route(route_id));
    }

    #[test]
    fn resolve_endpoint_prefers_a_node_tap_over_route_coverage() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let node_id = arena.add_node(net_id);
        let route_id = arena.add_route(net_id);
        let cell = GridCoord::new(1, 1, 0);
        // The cell is covered by a route AND is a node's own tap; the tap
        // binding wins since it is the more specific endpoint.
        arena.route_mut(route_id).segments.push(Segment::wire(cell, cell));
        grid.node_info.insert(cell, crate::grid::NodeInfoEntry { node: node_id, offset: None, stub: None });

        let bound = resolve_endpoint(&grid, &arena, net_id, cell, Endpoint::Unbound);
        assert_eq!(bound, Endpoint::Node(node_id));
    }

    #[test]
    fn resolve_endpoint_falls_back_to_the_default_when_nothing_owns_the_cell() {
        let grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let cell = GridCoord::new(1, 1, 0);

        let bound = resolve_endpoint(&grid, &arena, net_id, cell, Endpoint::Unbound);
        assert_eq!(bound, Endpoint::Unbound);
    }

    #[test]
    fn commit_proute_fails_cleanly_when_no_path_was_ever_found() {
        let mut grid = Grid3D::new(4, 4, 1);
        let mut arena = NetlistArena::new();
        let net_id = arena.add_net(10, "n0");
        let config = RouterConfig::default();
        let via_lib = FixedVia;

        let outcome = commit_proute(
            &mut grid,
            &mut arena,
            &via_lib,
            &config,
            net_id,
            Stage::Fresh,
            GridCoord::new(3, 3, 0),
            Endpoint::Unbound,
            Endpoint::Unbound,
        );
        assert!(matches!(outcome, CommitOutcome::Discontinuous));
    }
}
