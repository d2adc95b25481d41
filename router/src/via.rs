/// External via-geometry collaborator (§6 "Inputs from the placement/
/// obstruction pipeline"). The maze core never computes physical via
/// widths or minimum-area rules itself; it only asks this trait.
pub trait ViaLibrary {
    fn via_width(&self, layer: u8) -> f64;
    fn min_route_area(&self, layer: u8) -> f64;
    /// Preferred lateral extension direction when repairing a minimum-area
    /// violation: `true` for the layer's routing orientation (vertical),
    /// `false` for horizontal.
    fn prefers_vertical_extension(&self, layer: u8) -> bool;
}

/// A `ViaLibrary` driven purely by `RouterConfig`'s per-layer table, used
/// when no real library is available (demos, unit tests).
pub struct ConfigViaLibrary<'a> {
    pub layers: &'a [gridroute_common::util::config::LayerConfig],
}

impl ViaLibrary for ConfigViaLibrary<'_> {
    fn via_width(&self, layer: u8) -> f64 {
        self.layers
            .get(layer as usize)
            .map(|l| l.path_width)
            .unwrap_or(0.1)
    }

    fn min_route_area(&self, layer: u8) -> f64 {
        self.layers
            .get(layer as usize)
            .map(|l| l.min_route_area)
            .unwrap_or(0.0)
    }

    fn prefers_vertical_extension(&self, layer: u8) -> bool {
        self.layers
            .get(layer as usize)
            .map(|l| l.vertical)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridroute_common::util::config::LayerConfig;

    fn layers() -> Vec<LayerConfig> {
        vec![
            LayerConfig { vertical: false, path_width: 0.2, min_route_area: 0.08, ..Default::default() },
            LayerConfig { vertical: true, path_width: 0.3, min_route_area: 0.12, ..Default::default() },
        ]
    }

    #[test]
    fn reads_per_layer_values_from_the_config_table() {
        let layers = layers();
        let lib = ConfigViaLibrary { layers: &layers };

        assert_eq!(lib.via_width(0), 0.2);
        assert_eq!(lib.via_width(1), 0.3);
        assert!(!lib.prefers_vertical_extension(0));
        assert!(lib.prefers_vertical_extension(1));
        assert_eq!(lib.min_route_area(1), 0.12);
    }

    #[test]
    fn falls_back_to_safe_defaults_past_the_configured_layer_count() {
        let layers = layers();
        let lib = ConfigViaLibrary { layers: &layers };

        assert_eq!(lib.via_width(5), 0.1);
        assert_eq!(lib.min_route_area(5), 0.0);
        assert!(!lib.prefers_vertical_extension(5));
    }
}
