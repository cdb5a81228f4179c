//! Cross-tile symbol identity.
//!
//! A label that appears in several tiles (a parent and its children while
//! zooming, or the same tile reloaded) keeps one `cross_tile_id` so its
//! fade state carries over instead of blinking.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::labels::symbol_bucket::{SymbolBucket, SymbolInstance};
use crate::labels::types::EXTENT;
use crate::tile_id::OverscaledTileId;

/// Anchors are compared on a grid 1/32 of a tile unit at 512px tiles.
const ROUNDING_FACTOR: f64 = 512.0 / EXTENT as f64 / 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexedSymbol {
    x: i64,
    y: i64,
    cross_tile_id: u32,
}

/// Quantized symbol positions of one bucket, grouped by key.
#[derive(Debug, Clone)]
pub struct TileLayerIndex {
    tile: OverscaledTileId,
    bucket_instance_id: u32,
    index_by_key: HashMap<String, Vec<IndexedSymbol>>,
}

impl TileLayerIndex {
    pub fn new(tile: OverscaledTileId, symbols: &[SymbolInstance], bucket_instance_id: u32) -> Self {
        let mut index_by_key: HashMap<String, Vec<IndexedSymbol>> = HashMap::new();
        for symbol in symbols {
            let (x, y) = scaled_coordinates(&tile, symbol, &tile);
            index_by_key.entry(symbol.key.clone()).or_default().push(IndexedSymbol {
                x,
                y,
                cross_tile_id: symbol.cross_tile_id,
            });
        }
        Self {
            tile,
            bucket_instance_id,
            index_by_key,
        }
    }

    pub fn tile(&self) -> OverscaledTileId {
        self.tile
    }

    pub fn bucket_instance_id(&self) -> u32 {
        self.bucket_instance_id
    }

    /// Copy ids from this index onto unmatched `symbols` of `new_tile` whose key
    /// matches and whose anchor falls within tolerance. Ids already claimed at
    /// the new tile's zoom are skipped so one id never lands twice.
    pub fn find_matches(&self, symbols: &mut [SymbolInstance], new_tile: &OverscaledTileId, claimed: &mut HashSet<u32>) {
        let tolerance: i64 = if self.tile.canonical.z < new_tile.canonical.z {
            1
        } else {
            1 << (self.tile.canonical.z - new_tile.canonical.z)
        };

        for symbol in symbols.iter_mut() {
            if symbol.cross_tile_id != 0 {
                continue;
            }
            let Some(candidates) = self.index_by_key.get(&symbol.key) else {
                continue;
            };
            let (x, y) = scaled_coordinates(&self.tile, symbol, new_tile);
            let matched = candidates.iter().find(|c| {
                (c.x - x).abs() <= tolerance && (c.y - y).abs() <= tolerance && !claimed.contains(&c.cross_tile_id)
            });
            if let Some(candidate) = matched {
                claimed.insert(candidate.cross_tile_id);
                symbol.cross_tile_id = candidate.cross_tile_id;
            }
        }
    }

    pub fn cross_tile_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.index_by_key.values().flatten().map(|s| s.cross_tile_id)
    }

    fn rewrapped(mut self, wrap: i32) -> Self {
        self.tile = self.tile.unwrap_to(wrap);
        self
    }
}

/// World position of `symbol` (in `symbol_tile`) on the quantized grid at `index_tile`'s zoom.
fn scaled_coordinates(index_tile: &OverscaledTileId, symbol: &SymbolInstance, symbol_tile: &OverscaledTileId) -> (i64, i64) {
    let zoom_difference = symbol_tile.canonical.z as i32 - index_tile.canonical.z as i32;
    let scale = ROUNDING_FACTOR / 2f64.powi(zoom_difference);
    let extent = EXTENT as f64;
    let x = (symbol_tile.canonical.x as f64 * extent + symbol.anchor.point.x as f64) * scale;
    let y = (symbol_tile.canonical.y as f64 * extent + symbol.anchor.point.y as f64) * scale;
    (x.floor() as i64, y.floor() as i64)
}

/// Hands out cross-tile ids. 0 means "unassigned", so the first id is 1.
#[derive(Debug, Clone, Default)]
pub struct CrossTileIdGenerator {
    max_cross_tile_id: u32,
}

impl CrossTileIdGenerator {
    pub fn generate(&mut self) -> u32 {
        self.max_cross_tile_id += 1;
        self.max_cross_tile_id
    }
}

/// Per-layer index across all tiles currently holding buckets for that layer.
#[derive(Debug, Clone, Default)]
pub struct CrossTileSymbolLayerIndex {
    indexes: BTreeMap<u8, BTreeMap<OverscaledTileId, TileLayerIndex>>,
    used_cross_tile_ids: BTreeMap<u8, HashSet<u32>>,
    lng: f64,
}

impl CrossTileSymbolLayerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the camera crosses the antimeridian, tiles are renumbered into
    /// another world copy. Shift the stored tiles by the same number of wraps
    /// so they still match.
    pub fn handle_wrap_jump(&mut self, lng: f64) {
        let wrap_delta = ((lng - self.lng) / 360.0).round() as i32;
        if wrap_delta != 0 {
            for zoom_indexes in self.indexes.values_mut() {
                let shifted = std::mem::take(zoom_indexes)
                    .into_values()
                    .map(|index| {
                        let wrap = index.tile.wrap + wrap_delta;
                        index.rewrapped(wrap)
                    })
                    .map(|index| (index.tile, index))
                    .collect();
                *zoom_indexes = shifted;
            }
            log::debug!("cross-tile index shifted by {wrap_delta} world copies");
        }
        self.lng = lng;
    }

    /// Assign cross-tile ids to `bucket`. Returns false when this exact bucket
    /// is already indexed.
    pub fn add_bucket(&mut self, bucket: &mut SymbolBucket, ids: &mut CrossTileIdGenerator) -> bool {
        let tile = bucket.tile;
        let zoom = tile.overscaled_z;

        if let Some(existing) = self.indexes.get(&zoom).and_then(|z| z.get(&tile)) {
            if existing.bucket_instance_id == bucket.bucket_instance_id {
                return false;
            }
            // a reloaded tile replaces its old bucket
            let existing = existing.clone();
            self.remove_bucket_cross_tile_ids(zoom, &existing);
        }

        for symbol in bucket.symbol_instances.iter_mut() {
            symbol.cross_tile_id = 0;
        }

        let claimed = self.used_cross_tile_ids.entry(zoom).or_default();
        for (&index_zoom, zoom_indexes) in &self.indexes {
            if index_zoom > zoom {
                for index in zoom_indexes.values() {
                    if index.tile.is_child_of(&tile) {
                        index.find_matches(&mut bucket.symbol_instances, &tile, claimed);
                    }
                }
            } else if let Some(parent) = zoom_indexes.get(&tile.scaled_to(index_zoom)) {
                parent.find_matches(&mut bucket.symbol_instances, &tile, claimed);
            }
        }

        let mut fresh = 0usize;
        for symbol in bucket.symbol_instances.iter_mut() {
            if symbol.cross_tile_id == 0 {
                symbol.cross_tile_id = ids.generate();
                claimed.insert(symbol.cross_tile_id);
                fresh += 1;
            }
        }
        log::trace!(
            "indexed bucket {} for {}: {} symbols, {} new ids",
            bucket.bucket_instance_id,
            tile,
            bucket.symbol_instances.len(),
            fresh
        );

        self.indexes.entry(zoom).or_default().insert(
            tile,
            TileLayerIndex::new(tile, &bucket.symbol_instances, bucket.bucket_instance_id),
        );
        true
    }

    fn remove_bucket_cross_tile_ids(&mut self, zoom: u8, index: &TileLayerIndex) {
        if let Some(used) = self.used_cross_tile_ids.get_mut(&zoom) {
            for id in index.cross_tile_ids() {
                used.remove(&id);
            }
        }
    }

    /// Drop every bucket whose instance id is not in `current`. Returns
    /// whether anything was removed.
    pub fn remove_stale_buckets(&mut self, current: &HashSet<u32>) -> bool {
        let mut stale = Vec::new();
        for (&zoom, zoom_indexes) in &self.indexes {
            for (tile, index) in zoom_indexes {
                if !current.contains(&index.bucket_instance_id) {
                    stale.push((zoom, *tile));
                }
            }
        }

        for (zoom, tile) in &stale {
            if let Some(index) = self.indexes.get_mut(zoom).and_then(|z| z.remove(tile)) {
                self.remove_bucket_cross_tile_ids(*zoom, &index);
            }
        }
        !stale.is_empty()
    }

    pub fn tile_count(&self) -> usize {
        self.indexes.values().map(BTreeMap::len).sum()
    }
}

/// Cross-tile indexes for every symbol layer of a style.
#[derive(Debug, Clone, Default)]
pub struct CrossTileSymbolIndex {
    layer_indexes: BTreeMap<String, CrossTileSymbolLayerIndex>,
    cross_tile_ids: CrossTileIdGenerator,
    max_bucket_instance_id: u32,
}

impl CrossTileSymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the current buckets of one layer. Buckets without an instance id
    /// get one; buckets of tiles no longer present are dropped. Returns
    /// whether any symbol ids changed, which calls for a new placement.
    pub fn add_layer<'a>(
        &mut self,
        layer_id: &str,
        buckets: impl IntoIterator<Item = &'a mut SymbolBucket>,
        lng: f64,
    ) -> bool {
        let layer_index = self.layer_indexes.entry(layer_id.to_string()).or_default();
        layer_index.handle_wrap_jump(lng);

        let mut changed = false;
        let mut current = HashSet::new();
        for bucket in buckets {
            if bucket.bucket_instance_id == 0 {
                self.max_bucket_instance_id += 1;
                bucket.bucket_instance_id = self.max_bucket_instance_id;
            }
            if layer_index.add_bucket(bucket, &mut self.cross_tile_ids) {
                changed = true;
            }
            current.insert(bucket.bucket_instance_id);
        }

        if layer_index.remove_stale_buckets(&current) {
            changed = true;
        }
        changed
    }

    /// Forget layers that are no longer in the style.
    pub fn prune_unused_layers(&mut self, used_layers: &[&str]) {
        let used: HashSet<&str> = used_layers.iter().copied().collect();
        self.layer_indexes.retain(|id, _| used.contains(id.as_str()));
    }

    pub fn layer(&self, layer_id: &str) -> Option<&CrossTileSymbolLayerIndex> {
        self.layer_indexes.get(layer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::symbol_bucket::SymbolLayout;
    use crate::labels::types::{Anchor, TextJustify};
    use glam::Vec2;

    fn symbol(key: &str, x: f32, y: f32) -> SymbolInstance {
        SymbolInstance {
            anchor: Anchor::point(Vec2::new(x, y)),
            feature_index: 0,
            key: key.to_string(),
            cross_tile_id: 0,
            sort_key: 0.0,
            text_box: None,
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

    fn bucket(tile: OverscaledTileId, symbols: Vec<SymbolInstance>) -> SymbolBucket {
        SymbolBucket {
            layer_id: "labels".into(),
            source_id: "source".into(),
            tile,
            bucket_instance_id: 0,
            symbol_instances: symbols,
            layout: SymbolLayout {
                placement: Default::default(),
                text_overlap: Default::default(),
                icon_overlap: Default::default(),
                text_ignore_placement: false,
                icon_ignore_placement: false,
                text_optional: false,
                icon_optional: false,
                variable_anchors: Vec::new(),
                sort_by_key: false,
            },
            tile_pixel_ratio: 16.0,
            just_reloaded: true,
            holding_for_fade: false,
        }
    }

    fn ids(bucket: &SymbolBucket) -> Vec<u32> {
        bucket.symbol_instances.iter().map(|s| s.cross_tile_id).collect()
    }

    #[test]
    fn test_ids_carry_from_parent_to_child() {
        let mut index = CrossTileSymbolIndex::new();
        let parent_tile = OverscaledTileId::new(6, 0, 6, 8, 8);
        let child_tile = OverscaledTileId::new(7, 0, 7, 16, 16);

        let mut parent = bucket(
            parent_tile,
            vec![symbol("A", 1000.0, 1000.0), symbol("B", 1000.0, 1000.0), symbol("C", 5000.0, 5000.0)],
        );
        assert!(index.add_layer("labels", [&mut parent], 0.0));
        assert_eq!(ids(&parent), vec![1, 2, 3]);
        assert_eq!(parent.bucket_instance_id, 1);

        // A and B sit at the same place in the child; C is outside the child tile
        let mut child = bucket(
            child_tile,
            vec![symbol("A", 2000.0, 2000.0), symbol("B", 2000.0, 2000.0), symbol("D", 100.0, 100.0)],
        );
        assert!(index.add_layer("labels", [&mut parent, &mut child], 0.0));
        assert_eq!(ids(&child), vec![1, 2, 4]);
    }

    #[test]
    fn test_same_bucket_is_not_reindexed() {
        let mut index = CrossTileSymbolIndex::new();
        let tile = OverscaledTileId::new(3, 0, 3, 1, 1);
        let mut b = bucket(tile, vec![symbol("A", 10.0, 10.0)]);
        assert!(index.add_layer("labels", [&mut b], 0.0));
        assert!(!index.add_layer("labels", [&mut b], 0.0));
        assert_eq!(ids(&b), vec![1]);
    }

    #[test]
    fn test_duplicate_keys_get_distinct_ids() {
        let mut index = CrossTileSymbolIndex::new();
        let parent_tile = OverscaledTileId::new(6, 0, 6, 8, 8);
        let mut parent = bucket(parent_tile, vec![symbol("A", 1000.0, 1000.0)]);
        index.add_layer("labels", [&mut parent], 0.0);

        let child_tile = OverscaledTileId::new(7, 0, 7, 16, 16);
        let mut child = bucket(child_tile, vec![symbol("A", 2000.0, 2000.0), symbol("A", 2001.0, 2001.0)]);
        index.add_layer("labels", [&mut parent, &mut child], 0.0);
        let child_ids = ids(&child);
        assert_eq!(child_ids[0], 1);
        assert_ne!(child_ids[1], 1);
    }

    #[test]
    fn test_stale_buckets_are_removed() {
        let mut index = CrossTileSymbolIndex::new();
        let mut a = bucket(OverscaledTileId::new(5, 0, 5, 1, 1), vec![symbol("A", 10.0, 10.0)]);
        let mut b = bucket(OverscaledTileId::new(5, 0, 5, 2, 1), vec![symbol("B", 10.0, 10.0)]);
        index.add_layer("labels", [&mut a, &mut b], 0.0);
        assert_eq!(index.layer("labels").map(|l| l.tile_count()), Some(2));

        assert!(index.add_layer("labels", [&mut a], 0.0));
        assert_eq!(index.layer("labels").map(|l| l.tile_count()), Some(1));

        index.prune_unused_layers(&["other"]);
        assert!(index.layer("labels").is_none());
    }

    #[test]
    fn test_reloaded_tile_keeps_ids() {
        let mut index = CrossTileSymbolIndex::new();
        let tile = OverscaledTileId::new(4, 0, 4, 3, 3);
        let mut first = bucket(tile, vec![symbol("A", 500.0, 500.0)]);
        let mut neighbor = bucket(OverscaledTileId::new(3, 0, 3, 1, 1), vec![symbol("A", 4346.0, 4346.0)]);
        index.add_layer("labels", [&mut neighbor, &mut first], 0.0);
        let original = ids(&first)[0];

        // a rebuilt bucket for the same tile matches the parent's symbol again
        let mut reloaded = bucket(tile, vec![symbol("A", 500.0, 500.0)]);
        index.add_layer("labels", [&mut neighbor, &mut reloaded], 0.0);
        assert_eq!(ids(&reloaded)[0], original);
        assert_ne!(reloaded.bucket_instance_id, first.bucket_instance_id);
    }

    #[test]
    fn test_wrap_jump() {
        let mut layer = CrossTileSymbolLayerIndex::new();
        let mut ids = CrossTileIdGenerator::default();
        let mut b = bucket(OverscaledTileId::new(2, 0, 2, 1, 1), vec![symbol("A", 10.0, 10.0)]);
        b.bucket_instance_id = 1;
        layer.add_bucket(&mut b, &mut ids);

        layer.handle_wrap_jump(360.0);
        let mut wrapped = bucket(OverscaledTileId::new(2, 1, 2, 1, 1), vec![symbol("A", 10.0, 10.0)]);
        wrapped.bucket_instance_id = 1;
        assert!(!layer.add_bucket(&mut wrapped, &mut ids));
    }
}
