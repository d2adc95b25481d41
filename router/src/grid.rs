use gridroute_common::db::indices::NodeId;
use gridroute_common::db::model::NET_OBSTRUCT;
pub use gridroute_common::geom::coord::GridCoord;
use std::collections::HashMap;

/// Six-connected step direction. Ties during expansion are broken in this
/// declaration order (N, S, E, W, Up, Down).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn is_lateral(self) -> bool {
        !matches!(self, Direction::Up | Direction::Down)
    }
}

/// A bitmask over the four lateral directions, used both for `Obs`
/// directional-blockage bits and for per-direction pin-obstruct metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirMask {
    bits: u8,
}

impl DirMask {
    const fn bit(dir: Direction) -> u8 {
        match dir {
            Direction::North => 0b0001,
            Direction::South => 0b0010,
            Direction::East => 0b0100,
            Direction::West => 0b1000,
            Direction::Up | Direction::Down => 0,
        }
    }

    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn set(&mut self, dir: Direction) {
        self.bits |= Self::bit(dir);
    }

    pub fn clear(&mut self, dir: Direction) {
        self.bits &= !Self::bit(dir);
    }

    pub fn contains(&self, dir: Direction) -> bool {
        self.bits & Self::bit(dir) != 0
    }

    pub fn any(&self) -> bool {
        self.bits != 0
    }
}

/// Long-lived per-cell occupancy state. `0`/power-bus/obstruction net
/// numbers are distinguished from the pre-routing pin-obstruction sentinel
/// (`NO_NET | dir`) restored by rip-up, since the latter still carries
/// directional metadata that must survive a ripped route's tear-down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occupancy {
    Free,
    Net(u32),
    Obstruction,
    PinObstruct(DirMask),
}

impl Default for Occupancy {
    fn default() -> Self {
        Occupancy::Free
    }
}

/// Explicit named-field record for one `Obs[x,y,l]` cell, in place of the
/// single packed machine word the routine this crate is modeled on uses.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObsCell {
    pub occupancy: Occupancy,
    pub routed: bool,
    pub blocked: DirMask,
    pub pin_obstruct: DirMask,
    pub drc_blockage: bool,
    pub drc_refcount: u8,
}

impl ObsCell {
    pub fn net_number(&self) -> Option<u32> {
        match self.occupancy {
            Occupancy::Net(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_obstruction(&self) -> bool {
        matches!(self.occupancy, Occupancy::Obstruction)
    }

    pub fn is_free(&self) -> bool {
        matches!(self.occupancy, Occupancy::Free)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrFlags {
    pub source: bool,
    pub target: bool,
    pub processed: bool,
    pub on_stack: bool,
    pub conflict: bool,
}

/// The cost/net tagged union from the routine this is modeled on, expressed
/// as a sum type rather than a flag-selected cast: a cell is either on (or
/// reachable from) the current search frontier with a known `Cost`, or it
/// is outside the search and merely records which other net occupies it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrPayload {
    Cost(i64),
    OtherNet(u32),
}

impl Default for PrPayload {
    fn default() -> Self {
        PrPayload::OtherNet(NET_OBSTRUCT)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PrCell {
    pub flags: PrFlags,
    pub pred: Option<Direction>,
    pub payload: PrPayload,
}

impl PrCell {
    pub fn cost(&self) -> Option<i64> {
        match self.payload {
            PrPayload::Cost(c) => Some(c),
            PrPayload::OtherNet(_) => None,
        }
    }

    pub fn reset_for_search(&mut self) {
        self.flags = PrFlags::default();
        self.pred = None;
        self.payload = PrPayload::OtherNet(NET_OBSTRUCT);
    }
}

/// Weak, non-owning back-reference from a pin-layer grid cell to the node
/// that may be contacted there. Ownership of `Node` records lives in the
/// `NetlistArena`; this table only ever resolves a coordinate to a node.
#[derive(Clone, Copy, Debug)]
pub struct NodeInfoEntry {
    pub node: NodeId,
    pub offset: Option<f64>,
    pub stub: Option<f64>,
}

pub struct Grid3D {
    pub width: u32,
    pub height: u32,
    pub layers: u8,
    obs: Vec<ObsCell>,
    pr: Vec<PrCell>,
    pub node_info: HashMap<GridCoord, NodeInfoEntry>,
}

impl Grid3D {
    pub fn new(width: u32, height: u32, layers: u8) -> Self {
        let n = width as usize * height as usize * layers as usize;
        Self {
            width,
            height,
            layers,
            obs: vec![ObsCell::default(); n],
            pr: vec![PrCell::default(); n],
            node_info: HashMap::new(),
        }
    }

    #[inline]
    pub fn index(&self, c: GridCoord) -> usize {
        (c.layer as usize * self.height as usize + c.y as usize) * self.width as usize
            + c.x as usize
    }

    pub fn in_bounds(&self, c: GridCoord) -> bool {
        c.x < self.width && c.y < self.height && c.layer < self.layers
    }

    pub fn obs(&self, c: GridCoord) -> &ObsCell {
        &self.obs[self.index(c)]
    }

    pub fn obs_mut(&mut self, c: GridCoord) -> &mut ObsCell {
        let i = self.index(c);
        &mut self.obs[i]
    }

    pub fn pr(&self, c: GridCoord) -> &PrCell {
        &self.pr[self.index(c)]
    }

    pub fn pr_mut(&mut self, c: GridCoord) -> &mut PrCell {
        let i = self.index(c);
        &mut self.pr[i]
    }

    /// Resets every PR cell's search-transient state. Called once before a
    /// net's first terminal is seeded; re-seeding the next terminal
    /// within the same net reuses whatever committed-route SOURCE marks
    /// are still standing rather than clearing again.
    pub fn reset_pr(&mut self) {
        for cell in &mut self.pr {
            cell.reset_for_search();
        }
    }

    pub fn neighbor(&self, c: GridCoord, dir: Direction) -> Option<GridCoord> {
        let (x, y, l) = (c.x as i64, c.y as i64, c.layer as i64);
        let (nx, ny, nl) = match dir {
            Direction::North => (x, y + 1, l),
            Direction::South => (x, y - 1, l),
            Direction::East => (x + 1, y, l),
            Direction::West => (x - 1, y, l),
            Direction::Up => (x, y, l + 1),
            Direction::Down => (x, y, l - 1),
        };
        if nx < 0 || ny < 0 || nl < 0 {
            return None;
        }
        let coord = GridCoord::new(nx as u32, ny as u32, nl as u8);
        self.in_bounds(coord).then_some(coord)
    }

    pub fn neighbors(&self, c: GridCoord) -> impl Iterator<Item = (Direction, GridCoord)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(move |d| self.neighbor(c, d).map(|n| (d, n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_clamps_at_grid_edges() {
        let grid = Grid3D::new(4, 4, 2);
        let origin = GridCoord::new(0, 0, 0);
        assert!(grid.neighbor(origin, Direction::South).is_none());
        assert!(grid.neighbor(origin, Direction::West).is_none());
        assert!(grid.neighbor(origin, Direction::Down).is_none());
        assert_eq!(grid.neighbor(origin, Direction::North), Some(GridCoord::new(0, 1, 0)));
        assert_eq!(grid.neighbor(origin, Direction::Up), Some(GridCoord::new(0, 0, 1)));
    }

    #[test]
    fn neighbors_yields_six_in_bounds_only() {
        let grid = Grid3D::new(4, 4, 2);
        let mid = GridCoord::new(1, 1, 0);
        let found: Vec<_> = grid.neighbors(mid).collect();
        // Down is out of bounds at layer 0, so only 5 of 6 remain.
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn dir_mask_tracks_lateral_directions_independently() {
        let mut mask = DirMask::empty();
        assert!(!mask.any());
        mask.set(Direction::East);
        assert!(mask.contains(Direction::East));
        assert!(!mask.contains(Direction::West));
        mask.clear(Direction::East);
        assert!(!mask.any());
    }

    #[test]
    fn reset_pr_clears_flags_but_leaves_obs_untouched() {
        let mut grid = Grid3D::new(2, 2, 1);
        let c = GridCoord::new(0, 0, 0);
        grid.obs_mut(c).occupancy = Occupancy::Net(7);
        grid.pr_mut(c).flags.source = true;
        grid.pr_mut(c).payload = PrPayload::Cost(42);

        grid.reset_pr();

        assert!(!grid.pr(c).flags.source);
        assert_eq!(grid.pr(c).cost(), None);
        assert_eq!(grid.obs(c).net_number(), Some(7));
    }
}
