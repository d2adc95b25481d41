use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default = "default_stacked_contacts")]
    pub stacked_contacts: u32,
    #[serde(default = "default_max_ripup_passes")]
    pub max_ripup_passes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            cost: CostConfig::default(),
            layers: default_layers(),
            stacked_contacts: default_stacked_contacts(),
            max_ripup_passes: default_max_ripup_passes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GridConfig {
    #[serde(default = "default_channels")]
    pub channels_x: u32,
    #[serde(default = "default_channels")]
    pub channels_y: u32,
    #[serde(default = "default_num_layers")]
    pub num_layers: u8,
    #[serde(default = "default_pin_layers")]
    pub pin_layers: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            channels_x: default_channels(),
            channels_y: default_channels(),
            num_layers: default_num_layers(),
            pin_layers: default_pin_layers(),
        }
    }
}

/// Per-step cost knobs consulted by the evaluator on every candidate move.
#[derive(Debug, Deserialize, Clone)]
pub struct CostConfig {
    #[serde(default = "default_seg_cost")]
    pub seg_cost: i64,
    #[serde(default = "default_jog_cost")]
    pub jog_cost: i64,
    #[serde(default = "default_via_cost")]
    pub via_cost: i64,
    #[serde(default = "default_xver_cost")]
    pub xver_cost: i64,
    #[serde(default = "default_block_cost")]
    pub block_cost: i64,
    #[serde(default = "default_offset_cost")]
    pub offset_cost: i64,
    #[serde(default = "default_conflict_cost")]
    pub conflict_cost: i64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            seg_cost: default_seg_cost(),
            jog_cost: default_jog_cost(),
            via_cost: default_via_cost(),
            xver_cost: default_xver_cost(),
            block_cost: default_block_cost(),
            offset_cost: default_offset_cost(),
            conflict_cost: default_conflict_cost(),
        }
    }
}

/// Per-layer routing orientation and DRC neighbor-blocking policy.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LayerConfig {
    #[serde(default)]
    pub vertical: bool,
    #[serde(default = "default_pitch")]
    pub pitch_x: f64,
    #[serde(default = "default_pitch")]
    pub pitch_y: f64,
    #[serde(default = "default_path_width")]
    pub path_width: f64,
    #[serde(default = "default_min_route_area")]
    pub min_route_area: f64,
    #[serde(default)]
    pub needblock: NeedBlockMask,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            vertical: false,
            pitch_x: default_pitch(),
            pitch_y: default_pitch(),
            path_width: default_path_width(),
            min_route_area: default_min_route_area(),
            needblock: NeedBlockMask::default(),
        }
    }
}

/// Which orthogonal neighbors must receive a DRC-blockage mark when a
/// route or via is committed to a cell on this layer.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct NeedBlockMask {
    #[serde(default)]
    pub route_block_x: bool,
    #[serde(default)]
    pub route_block_y: bool,
    #[serde(default)]
    pub via_block_x: bool,
    #[serde(default)]
    pub via_block_y: bool,
}

fn default_channels() -> u32 {
    64
}
fn default_num_layers() -> u8 {
    4
}
fn default_pin_layers() -> u8 {
    2
}
fn default_seg_cost() -> i64 {
    1
}
fn default_jog_cost() -> i64 {
    2
}
fn default_via_cost() -> i64 {
    10
}
fn default_xver_cost() -> i64 {
    15
}
fn default_block_cost() -> i64 {
    25
}
fn default_offset_cost() -> i64 {
    1
}
fn default_conflict_cost() -> i64 {
    100
}
fn default_pitch() -> f64 {
    0.2
}
fn default_path_width() -> f64 {
    0.1
}
fn default_min_route_area() -> f64 {
    0.0
}
fn default_stacked_contacts() -> u32 {
    1
}
fn default_max_ripup_passes() -> usize {
    256
}
fn default_layers() -> Vec<LayerConfig> {
    (0..default_num_layers())
        .map(|i| LayerConfig {
            vertical: i % 2 == 1,
            ..LayerConfig::default()
        })
        .collect()
}
