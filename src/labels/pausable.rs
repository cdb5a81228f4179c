//! Time-sliced placement. A pass walks layers top-down and yields once its
//! per-call budget is spent, resuming from an explicit cursor next frame.

use std::collections::HashSet;
use std::time::Instant;

use crate::error::PlacementError;
use crate::labels::placement::{sort_parts, BucketPart, Placement, PlacementConfig, SymbolLayerTiles};
use crate::labels::projection::ScreenTransform;

/// Millisecond time source.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Progress through one layer: first collect parts tile by tile, then place them.
#[derive(Debug, Default)]
struct LayerCursor {
    tile_index: usize,
    part_index: usize,
    parts: Vec<BucketPart>,
    sort_across_tiles: bool,
    sorted: bool,
    seen: HashSet<u32>,
}

impl LayerCursor {
    fn new(layer: &SymbolLayerTiles) -> Self {
        Self {
            sort_across_tiles: layer.tiles.iter().any(|t| t.bucket.layout.sort_by_key),
            ..Self::default()
        }
    }

    /// Returns true when paused before finishing the layer.
    fn advance(
        &mut self,
        layer: &mut SymbolLayerTiles,
        placement: &mut Placement,
        should_pause: &dyn Fn() -> bool,
    ) -> Result<bool, PlacementError> {
        while self.tile_index < layer.tiles.len() {
            placement.bucket_parts(&mut self.parts, layer, self.tile_index, self.sort_across_tiles);
            self.tile_index += 1;
            if should_pause() {
                return Ok(true);
            }
        }

        if self.sort_across_tiles && !self.sorted {
            sort_parts(&mut self.parts);
            self.sorted = true;
        }

        while self.part_index < self.parts.len() {
            placement.place_layer_bucket_part(layer, &self.parts[self.part_index], &mut self.seen)?;
            self.part_index += 1;
            if should_pause() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A placement pass spread over several frames.
#[derive(Debug)]
pub struct PausablePlacement {
    placement: Placement,
    /// Index of the next layer to place, counting down from the topmost.
    current_layer: Option<usize>,
    in_progress: Option<LayerCursor>,
    done: bool,
}

impl PausablePlacement {
    /// `layer_count` is the number of layers later passed to
    /// [`PausablePlacement::continue_placement`], in style order.
    pub fn new(transform: ScreenTransform, config: PlacementConfig, layer_count: usize, prev: Option<Placement>) -> Self {
        Self {
            placement: Placement::new(transform, config, prev),
            current_layer: layer_count.checked_sub(1),
            in_progress: None,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Place until done or until the time budget is spent. `layers` must be
    /// the same list, in the same order, on every call.
    pub fn continue_placement(&mut self, layers: &mut [SymbolLayerTiles], clock: &dyn Clock) -> Result<(), PlacementError> {
        let config = *self.placement.config();
        let start = clock.now();
        let should_pause = || !config.force_full_placement && clock.now() - start > config.time_budget_ms;
        let zoom = self.placement.transform().zoom;

        while let Some(index) = self.current_layer {
            if let Some(layer) = layers.get_mut(index) {
                if layer.in_zoom_range(zoom) {
                    let cursor = self.in_progress.get_or_insert_with(|| LayerCursor::new(layer));
                    if cursor.advance(layer, &mut self.placement, &should_pause)? {
                        log::debug!(
                            "placement paused in layer {} after {:.2}ms",
                            layer.layer_id,
                            clock.now() - start
                        );
                        return Ok(());
                    }
                    self.in_progress = None;
                }
            }
            self.current_layer = index.checked_sub(1);
        }

        self.done = true;
        Ok(())
    }

    /// Commit the finished pass and hand back the placement.
    pub fn commit(mut self, now: f64) -> Placement {
        self.placement.commit(now);
        self.placement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::symbol_bucket::{SymbolBucket, SymbolInstance, SymbolLayout};
    use crate::labels::types::{Anchor, CollisionBox, OverlapMode, SymbolPlacement, TextJustify};
    use crate::tile_id::OverscaledTileId;
    use glam::Vec2;
    use std::cell::Cell;

    /// Advances by `step` every time it is read.
    struct SteppingClock {
        time: Cell<f64>,
        step: f64,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> f64 {
            let t = self.time.get();
            self.time.set(t + self.step);
            t
        }
    }

    fn symbol(id: u32, x: f32, sort_key: f64) -> SymbolInstance {
        SymbolInstance {
            anchor: Anchor::point(Vec2::new(x, 100.0)),
            feature_index: id,
            key: id.to_string(),
            cross_tile_id: id,
            sort_key,
            text_box: Some(CollisionBox::new(Vec2::new(x, 100.0), -20.0, -10.0, 20.0, 10.0)),
            text_circles: Vec::new(),
            icon_box: None,
            text_box_scale: 1.0,
            variable_offsets: Vec::new(),
            justification: TextJustify::Center,
            shaping: None,
            icon: None,
            unplaceable: false,
        }
    }

    fn bucket(bucket_instance_id: u32, symbols: Vec<SymbolInstance>, sort_by_key: bool) -> SymbolBucket {
        SymbolBucket {
            layer_id: "labels".into(),
            source_id: "source".into(),
            tile: OverscaledTileId::new(0, 0, 0, 0, 0),
            bucket_instance_id,
            symbol_instances: symbols,
            layout: SymbolLayout {
                placement: SymbolPlacement::Point,
                text_overlap: OverlapMode::Never,
                icon_overlap: OverlapMode::Never,
                text_ignore_placement: false,
                icon_ignore_placement: false,
                text_optional: false,
                icon_optional: false,
                variable_anchors: Vec::new(),
                sort_by_key,
            },
            tile_pixel_ratio: 1.0,
            just_reloaded: false,
            holding_for_fade: false,
        }
    }

    fn transform() -> ScreenTransform {
        ScreenTransform::new(800.0, 600.0, 0.0)
    }

    fn layers() -> Vec<SymbolLayerTiles> {
        let matrix = transform().tile_matrix(Vec2::ZERO, 1.0);
        let bottom = SymbolLayerTiles::new("bottom", "source").with_tile(matrix, bucket(1, vec![symbol(1, 100.0, 0.0)], false));
        let top = SymbolLayerTiles::new("top", "source")
            .with_tile(matrix, bucket(2, vec![symbol(2, 105.0, 0.0), symbol(3, 300.0, 0.0)], false))
            .with_tile(matrix, bucket(3, vec![symbol(4, 500.0, 0.0)], false));
        vec![bottom, top]
    }

    #[test]
    fn test_top_layer_wins() {
        let mut layers = layers();
        let clock = SystemClock::new();
        let config = PlacementConfig {
            force_full_placement: true,
            ..PlacementConfig::default()
        };
        let mut pausable = PausablePlacement::new(transform(), config, layers.len(), None);
        pausable.continue_placement(&mut layers, &clock).unwrap();
        assert!(pausable.is_done());

        let placement = pausable.commit(0.0);
        assert!(placement.placement(2).unwrap().text);
        assert!(!placement.placement(1).unwrap().text);
    }

    #[test]
    fn test_resumes_where_it_paused() {
        let mut layers = layers();
        let clock = SteppingClock {
            time: Cell::new(0.0),
            step: 5.0,
        };
        let mut pausable = PausablePlacement::new(transform(), PlacementConfig::default(), layers.len(), None);

        let mut calls = 0;
        while !pausable.is_done() {
            pausable.continue_placement(&mut layers, &clock).unwrap();
            calls += 1;
            assert!(calls < 20);
        }
        assert!(calls > 1);

        // same outcome as an unpaused pass
        let placement = pausable.commit(0.0);
        for id in [2, 3, 4] {
            assert!(placement.placement(id).unwrap().text);
        }
        assert!(!placement.placement(1).unwrap().text);
    }

    #[test]
    fn test_sort_key_interleaves_tiles() {
        let matrix = transform().tile_matrix(Vec2::ZERO, 1.0);
        // the low key in the second tile is placed before the first tile's symbol
        let mut layers = vec![SymbolLayerTiles::new("sorted", "source")
            .with_tile(matrix, bucket(1, vec![symbol(1, 100.0, 5.0)], true))
            .with_tile(matrix, bucket(2, vec![symbol(2, 110.0, 1.0)], true))];
        let config = PlacementConfig {
            force_full_placement: true,
            ..PlacementConfig::default()
        };
        let mut pausable = PausablePlacement::new(transform(), config, 1, None);
        pausable.continue_placement(&mut layers, &SystemClock::new()).unwrap();
        let placement = pausable.commit(0.0);
        assert!(placement.placement(2).unwrap().text);
        assert!(!placement.placement(1).unwrap().text);
    }

    #[test]
    fn test_layers_outside_zoom_are_skipped() {
        let mut layers = layers();
        layers[1].minzoom = Some(5.0);
        let config = PlacementConfig {
            force_full_placement: true,
            ..PlacementConfig::default()
        };
        let mut pausable = PausablePlacement::new(transform(), config, layers.len(), None);
        pausable.continue_placement(&mut layers, &SystemClock::new()).unwrap();
        let placement = pausable.commit(0.0);
        assert!(placement.placement(2).is_none());
        assert!(placement.placement(1).unwrap().text);
    }

    #[test]
    fn test_empty_pass_is_done() {
        let mut pausable = PausablePlacement::new(transform(), PlacementConfig::default(), 0, None);
        pausable.continue_placement(&mut [], &SystemClock::new()).unwrap();
        assert!(pausable.is_done());
    }
}
