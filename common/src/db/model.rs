use crate::db::indices::{NetId, NodeId, RouteId};
use crate::geom::coord::GridCoord;
use std::collections::HashMap;

/// Reserved net numbers, shared with `Obs` cell interpretation.
pub const NET_FREE: u32 = 0;
pub const NET_GROUND: u32 = 1;
pub const NET_SUPPLY: u32 = 2;
pub const NET_ANTENNA: u32 = 3;
pub const NET_OBSTRUCT: u32 = u32::MAX;

pub fn is_power_bus(net_number: u32) -> bool {
    matches!(net_number, NET_GROUND | NET_SUPPLY | NET_ANTENNA)
}

/// A grid point at which a terminal may be physically contacted, plus the
/// sub-grid metadata needed to land a via or stub on an off-grid pin.
#[derive(Clone, Copy, Debug)]
pub struct Tap {
    pub coord: GridCoord,
    pub stub_length: Option<f64>,
    pub offset: Option<f64>,
}

impl Tap {
    pub fn plain(coord: GridCoord) -> Self {
        Self { coord, stub_length: None, offset: None }
    }

    /// Rank used by source/target seeding to prioritize easy taps first
    /// (lower is higher priority), per the tap-geometry table.
    pub fn rank(&self, is_extended: bool) -> u8 {
        match (is_extended, self.stub_length.is_some(), self.offset.is_some()) {
            (false, false, false) => 0,
            (false, true, false) => 1,
            (true, _, false) => 2,
            (false, false, true) => 3,
            (_, true, true) | (true, false, true) => 4,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub net: NetId,
    pub node_number: u32,
    pub taps: Vec<Tap>,
    pub extended_taps: Vec<Tap>,
}

impl Node {
    pub fn new(net: NetId, node_number: u32) -> Self {
        Self { net, node_number, taps: Vec::new(), extended_taps: Vec::new() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Wire,
    Via,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentTag {
    None,
    OffsetStart,
    OffsetEnd,
}

#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub kind: SegmentKind,
    pub from: GridCoord,
    pub to: GridCoord,
    pub tag: SegmentTag,
}

impl Segment {
    pub fn wire(from: GridCoord, to: GridCoord) -> Self {
        debug_assert_eq!(from.layer, to.layer);
        debug_assert!(from.x == to.x || from.y == to.y);
        Self { kind: SegmentKind::Wire, from, to, tag: SegmentTag::None }
    }

    pub fn via(at: (u32, u32), low_layer: u8) -> Self {
        Self {
            kind: SegmentKind::Via,
            from: GridCoord::new(at.0, at.1, low_layer),
            to: GridCoord::new(at.0, at.1, low_layer + 1),
            tag: SegmentTag::None,
        }
    }
}

/// What a route's endpoint is bound to: a net terminal, or another
/// already-committed route of the same net (a weak, non-owning link
/// resolved through the arena rather than a direct pointer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Node(NodeId),
    Route(RouteId),
    Unbound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteFlags {
    None,
    Rip,
}

#[derive(Clone, Debug)]
pub struct Route {
    pub net: NetId,
    pub segments: Vec<Segment>,
    pub start: Endpoint,
    pub end: Endpoint,
    pub flags: RouteFlags,
    /// Scratch bit used while walking the same-net route graph during
    /// source/target marking, to guard against re-entering a route that
    /// is reachable via more than one path.
    pub visited: bool,
}

impl Route {
    pub fn new(net: NetId) -> Self {
        Self {
            net,
            segments: Vec::new(),
            start: Endpoint::Unbound,
            end: Endpoint::Unbound,
            flags: RouteFlags::None,
            visited: false,
        }
    }

    pub fn covers(&self) -> impl Iterator<Item = GridCoord> + '_ {
        self.segments.iter().flat_map(|seg| segment_cells(seg))
    }
}

/// Every grid cell physically occupied by a segment, inclusive of both
/// endpoints (a via occupies exactly its two endpoint cells).
pub fn segment_cells(seg: &Segment) -> Vec<GridCoord> {
    match seg.kind {
        SegmentKind::Via => vec![seg.from, seg.to],
        SegmentKind::Wire => {
            let layer = seg.from.layer;
            let mut cells = Vec::new();
            if seg.from.y == seg.to.y {
                let (lo, hi) = (seg.from.x.min(seg.to.x), seg.from.x.max(seg.to.x));
                for x in lo..=hi {
                    cells.push(GridCoord::new(x, seg.from.y, layer));
                }
            } else {
                let (lo, hi) = (seg.from.y.min(seg.to.y), seg.from.y.max(seg.to.y));
                for y in lo..=hi {
                    cells.push(GridCoord::new(seg.from.x, y, layer));
                }
            }
            cells
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoundingBox {
    pub min: GridCoord,
    pub max: GridCoord,
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self {
            min: GridCoord::new(u32::MAX, u32::MAX, u8::MAX),
            max: GridCoord::new(0, 0, 0),
        }
    }

    pub fn accumulate(&mut self, c: GridCoord) {
        self.min.x = self.min.x.min(c.x);
        self.min.y = self.min.y.min(c.y);
        self.min.layer = self.min.layer.min(c.layer);
        self.max.x = self.max.x.max(c.x);
        self.max.y = self.max.y.max(c.y);
        self.max.layer = self.max.layer.max(c.layer);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn expanded(&self, halo: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            min: GridCoord::new(self.min.x.saturating_sub(halo), self.min.y.saturating_sub(halo), 0),
            max: GridCoord::new(
                (self.max.x + halo).min(width.saturating_sub(1)),
                (self.max.y + halo).min(height.saturating_sub(1)),
                self.max.layer,
            ),
        }
    }

    pub fn contains_xy(&self, x: u32, y: u32) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }
}

#[derive(Clone, Debug)]
pub struct Net {
    pub number: u32,
    pub name: String,
    pub nodes: Vec<NodeId>,
    pub routes: Vec<RouteId>,
    pub bbox: BoundingBox,
    /// Other net numbers this net may never rip up, regardless of stage.
    pub noripup: Vec<u32>,
}

impl Net {
    pub fn new(number: u32, name: String) -> Self {
        Self {
            number,
            name,
            nodes: Vec::new(),
            routes: Vec::new(),
            bbox: BoundingBox::empty(),
            noripup: Vec::new(),
        }
    }
}

/// Owns every net, node and route for the duration of a run. Node<->tap
/// and node<->grid-cell links outside this arena are weak back-references
/// resolved by coordinate lookup (see `gridroute_router::grid::NodeInfoTable`),
/// never by ownership.
#[derive(Default)]
pub struct NetlistArena {
    pub nets: Vec<Net>,
    pub nodes: Vec<Node>,
    pub routes: Vec<Route>,
    number_to_net: HashMap<u32, NetId>,
}

impl NetlistArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_net(&mut self, number: u32, name: impl Into<String>) -> NetId {
        if let Some(&id) = self.number_to_net.get(&number) {
            return id;
        }
        let id = NetId::new(self.nets.len());
        self.nets.push(Net::new(number, name.into()));
        self.number_to_net.insert(number, id);
        id
    }

    pub fn net_by_number(&self, number: u32) -> Option<NetId> {
        self.number_to_net.get(&number).copied()
    }

    pub fn add_node(&mut self, net: NetId) -> NodeId {
        let node_number = self.nets[net.index()].nodes.len() as u32;
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(net, node_number));
        self.nets[net.index()].nodes.push(id);
        id
    }

    pub fn add_route(&mut self, net: NetId) -> RouteId {
        let id = RouteId::new(self.routes.len());
        self.routes.push(Route::new(net));
        self.nets[net.index()].routes.push(id);
        id
    }

    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    pub fn net_mut(&mut self, id: NetId) -> &mut Net {
        &mut self.nets[id.index()]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn route(&self, id: RouteId) -> &Route {
        &self.routes[id.index()]
    }

    pub fn route_mut(&mut self, id: RouteId) -> &mut Route {
        &mut self.routes[id.index()]
    }

    /// Removes a route's record entirely (the `retain=false` case of
    /// rip-up). Leaves a hole in `routes` rather than shifting indices,
    /// since `RouteId`s elsewhere may still reference later routes.
    pub fn remove_route(&mut self, net: NetId, id: RouteId) {
        self.routes[id.index()].segments.clear();
        self.nets[net.index()].routes.retain(|&r| r != id);
    }
}
