//! Uniform grid spatial index for screen-space collision tests.
//!
//! Boxes and circles live in two arenas; each cell stores `u32` handles into
//! them, so an entry spanning many cells is stored once.

use std::collections::HashSet;

use crate::labels::types::OverlapMode;

/// Handle of an entry within its arena.
pub type EntryHandle = u32;

#[derive(Debug, Clone)]
struct BoxEntry<K> {
    key: K,
    overlap: OverlapMode,
    bbox: [f32; 4],
}

#[derive(Debug, Clone)]
struct CircleEntry<K> {
    key: K,
    overlap: OverlapMode,
    x: f32,
    y: f32,
    radius: f32,
}

/// An entry returned by [`GridIndex::query`]. Circles report their bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridHit<'a, K> {
    pub key: &'a K,
    pub bbox: [f32; 4],
}

/// Grid over `[0, width] x [0, height]` holding keyed boxes and circles.
#[derive(Debug, Clone)]
pub struct GridIndex<K> {
    width: f32,
    height: f32,
    x_cell_count: usize,
    y_cell_count: usize,
    x_scale: f32,
    y_scale: f32,
    box_cells: Vec<Vec<EntryHandle>>,
    circle_cells: Vec<Vec<EntryHandle>>,
    boxes: Vec<BoxEntry<K>>,
    circles: Vec<CircleEntry<K>>,
}

/// Shape being tested against the grid.
#[derive(Clone, Copy)]
enum Probe {
    Rect,
    Circle { x: f32, y: f32, radius: f32 },
}

impl<K> GridIndex<K> {
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        let cell_size = cell_size.max(1.0);
        let x_cell_count = ((width / cell_size).ceil() as usize).max(1);
        let y_cell_count = ((height / cell_size).ceil() as usize).max(1);
        let cell_count = x_cell_count * y_cell_count;

        Self {
            width,
            height,
            x_cell_count,
            y_cell_count,
            x_scale: x_cell_count as f32 / width.max(f32::EPSILON),
            y_scale: y_cell_count as f32 / height.max(f32::EPSILON),
            box_cells: vec![Vec::new(); cell_count],
            circle_cells: vec![Vec::new(); cell_count],
            boxes: Vec::new(),
            circles: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Number of boxes plus circles.
    pub fn keys_len(&self) -> usize {
        self.boxes.len() + self.circles.len()
    }

    pub fn insert(&mut self, key: K, overlap: OverlapMode, x1: f32, y1: f32, x2: f32, y2: f32) -> EntryHandle {
        let handle = self.boxes.len() as EntryHandle;
        for cell in self.cell_range(x1, y1, x2, y2) {
            self.box_cells[cell].push(handle);
        }
        self.boxes.push(BoxEntry {
            key,
            overlap,
            bbox: [x1, y1, x2, y2],
        });
        handle
    }

    pub fn insert_circle(&mut self, key: K, overlap: OverlapMode, x: f32, y: f32, radius: f32) -> EntryHandle {
        let handle = self.circles.len() as EntryHandle;
        for cell in self.cell_range(x - radius, y - radius, x + radius, y + radius) {
            self.circle_cells[cell].push(handle);
        }
        self.circles.push(CircleEntry {
            key,
            overlap,
            x,
            y,
            radius,
        });
        handle
    }

    /// Every entry whose shape touches the rectangle, each reported once.
    pub fn query(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<GridHit<'_, K>> {
        if self.outside(x1, y1, x2, y2) {
            return Vec::new();
        }

        let mut result = Vec::new();
        if self.covers_grid(x1, y1, x2, y2) {
            for entry in &self.boxes {
                result.push(GridHit {
                    key: &entry.key,
                    bbox: entry.bbox,
                });
            }
            for entry in &self.circles {
                result.push(GridHit {
                    key: &entry.key,
                    bbox: circle_bbox(entry),
                });
            }
            return result;
        }

        let mut seen_boxes = HashSet::new();
        let mut seen_circles = HashSet::new();
        for cell in self.cell_range(x1, y1, x2, y2) {
            for &handle in &self.box_cells[cell] {
                let entry = &self.boxes[handle as usize];
                if seen_boxes.insert(handle) && boxes_collide([x1, y1, x2, y2], entry.bbox) {
                    result.push(GridHit {
                        key: &entry.key,
                        bbox: entry.bbox,
                    });
                }
            }
            for &handle in &self.circle_cells[cell] {
                let entry = &self.circles[handle as usize];
                if seen_circles.insert(handle)
                    && circle_and_rect_collide(entry.x, entry.y, entry.radius, [x1, y1, x2, y2])
                {
                    result.push(GridHit {
                        key: &entry.key,
                        bbox: circle_bbox(entry),
                    });
                }
            }
        }
        result
    }

    /// Whether a box with the given overlap mode would collide with any entry
    /// accepted by `predicate`. A box covering the whole grid always collides.
    pub fn hit_test(
        &self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        overlap: OverlapMode,
        predicate: Option<&dyn Fn(&K) -> bool>,
    ) -> bool {
        if self.outside(x1, y1, x2, y2) {
            return false;
        }
        if self.covers_grid(x1, y1, x2, y2) {
            return true;
        }
        self.any_hit([x1, y1, x2, y2], Probe::Rect, overlap, predicate)
    }

    pub fn hit_test_circle(
        &self,
        x: f32,
        y: f32,
        radius: f32,
        overlap: OverlapMode,
        predicate: Option<&dyn Fn(&K) -> bool>,
    ) -> bool {
        let rect = [x - radius, y - radius, x + radius, y + radius];
        if self.outside(rect[0], rect[1], rect[2], rect[3]) {
            return false;
        }
        self.any_hit(rect, Probe::Circle { x, y, radius }, overlap, predicate)
    }

    fn any_hit(
        &self,
        rect: [f32; 4],
        probe: Probe,
        overlap: OverlapMode,
        predicate: Option<&dyn Fn(&K) -> bool>,
    ) -> bool {
        let accepts = |key: &K, existing: OverlapMode| {
            predicate.map_or(true, |p| p(key)) && !overlap.allows(existing)
        };

        let mut seen_boxes = HashSet::new();
        let mut seen_circles = HashSet::new();
        for cell in self.cell_range(rect[0], rect[1], rect[2], rect[3]) {
            for &handle in &self.box_cells[cell] {
                if !seen_boxes.insert(handle) {
                    continue;
                }
                let entry = &self.boxes[handle as usize];
                let touches = match probe {
                    Probe::Rect => boxes_collide(rect, entry.bbox),
                    Probe::Circle { x, y, radius } => circle_and_rect_collide(x, y, radius, entry.bbox),
                };
                if touches && accepts(&entry.key, entry.overlap) {
                    return true;
                }
            }
            for &handle in &self.circle_cells[cell] {
                if !seen_circles.insert(handle) {
                    continue;
                }
                let entry = &self.circles[handle as usize];
                let touches = match probe {
                    Probe::Rect => circle_and_rect_collide(entry.x, entry.y, entry.radius, rect),
                    Probe::Circle { x, y, radius } => {
                        circles_collide(entry.x, entry.y, entry.radius, x, y, radius)
                    }
                };
                if touches && accepts(&entry.key, entry.overlap) {
                    return true;
                }
            }
        }
        false
    }

    fn outside(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        x2 < 0.0 || x1 > self.width || y2 < 0.0 || y1 > self.height
    }

    fn covers_grid(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        x1 <= 0.0 && y1 <= 0.0 && self.width <= x2 && self.height <= y2
    }

    fn cell_range(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> impl Iterator<Item = usize> {
        let cx1 = self.x_cell(x1);
        let cy1 = self.y_cell(y1);
        let cx2 = self.x_cell(x2);
        let cy2 = self.y_cell(y2);
        let stride = self.x_cell_count;
        (cx1..=cx2).flat_map(move |x| (cy1..=cy2).map(move |y| stride * y + x))
    }

    fn x_cell(&self, x: f32) -> usize {
        ((x * self.x_scale).floor().max(0.0) as usize).min(self.x_cell_count - 1)
    }

    fn y_cell(&self, y: f32) -> usize {
        ((y * self.y_scale).floor().max(0.0) as usize).min(self.y_cell_count - 1)
    }
}

fn circle_bbox<K>(entry: &CircleEntry<K>) -> [f32; 4] {
    [
        entry.x - entry.radius,
        entry.y - entry.radius,
        entry.x + entry.radius,
        entry.y + entry.radius,
    ]
}

/// Touching edges count as a collision.
#[inline]
fn boxes_collide(a: [f32; 4], b: [f32; 4]) -> bool {
    a[0] <= b[2] && a[1] <= b[3] && a[2] >= b[0] && a[3] >= b[1]
}

#[inline]
fn circles_collide(x1: f32, y1: f32, r1: f32, x2: f32, y2: f32, r2: f32) -> bool {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let both = r1 + r2;
    both * both > dx * dx + dy * dy
}

fn circle_and_rect_collide(cx: f32, cy: f32, radius: f32, rect: [f32; 4]) -> bool {
    let half_width = (rect[2] - rect[0]) / 2.0;
    let dist_x = (cx - (rect[0] + half_width)).abs();
    if dist_x > half_width + radius {
        return false;
    }

    let half_height = (rect[3] - rect[1]) / 2.0;
    let dist_y = (cy - (rect[1] + half_height)).abs();
    if dist_y > half_height + radius {
        return false;
    }

    if dist_x <= half_width || dist_y <= half_height {
        return true;
    }

    let dx = dist_x - half_width;
    let dy = dist_y - half_height;
    dx * dx + dy * dy <= radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_collision() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(1u32, OverlapMode::Never, 0.0, 0.0, 10.0, 10.0);
        assert!(!grid.hit_test(50.0, 50.0, 60.0, 60.0, OverlapMode::Never, None));
    }

    #[test]
    fn test_collision() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(1u32, OverlapMode::Never, 0.0, 0.0, 20.0, 20.0);
        assert!(grid.hit_test(10.0, 10.0, 30.0, 30.0, OverlapMode::Never, None));
        assert!(!grid.hit_test(10.0, 10.0, 30.0, 30.0, OverlapMode::Always, None));
    }

    #[test]
    fn test_cooperative_entries() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(1u32, OverlapMode::Cooperative, 0.0, 0.0, 20.0, 20.0);
        assert!(!grid.hit_test(5.0, 5.0, 15.0, 15.0, OverlapMode::Cooperative, None));
        assert!(grid.hit_test(5.0, 5.0, 15.0, 15.0, OverlapMode::Never, None));

        grid.insert(2u32, OverlapMode::Never, 40.0, 40.0, 50.0, 50.0);
        assert!(grid.hit_test(45.0, 45.0, 55.0, 55.0, OverlapMode::Cooperative, None));
    }

    #[test]
    fn test_predicate_filters_keys() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(7u32, OverlapMode::Never, 0.0, 0.0, 20.0, 20.0);
        let other_group = |key: &u32| *key == 8;
        assert!(!grid.hit_test(0.0, 0.0, 5.0, 5.0, OverlapMode::Never, Some(&other_group)));
        let same_group = |key: &u32| *key == 7;
        assert!(grid.hit_test(0.0, 0.0, 5.0, 5.0, OverlapMode::Never, Some(&same_group)));
    }

    #[test]
    fn test_circles() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert_circle(1u32, OverlapMode::Never, 50.0, 50.0, 10.0);
        assert!(grid.hit_test_circle(65.0, 50.0, 6.0, OverlapMode::Never, None));
        assert!(!grid.hit_test_circle(75.0, 50.0, 6.0, OverlapMode::Never, None));
        // box near the circle's bounding-box corner but outside the circle
        assert!(!grid.hit_test(58.0, 58.0, 62.0, 62.0, OverlapMode::Never, None));
        assert!(grid.hit_test(55.0, 55.0, 62.0, 62.0, OverlapMode::Never, None));
    }

    #[test]
    fn test_query_reports_each_entry_once() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert("a", OverlapMode::Never, 0.0, 0.0, 45.0, 45.0);
        grid.insert_circle("b", OverlapMode::Never, 80.0, 80.0, 5.0);
        let hits = grid.query(10.0, 10.0, 30.0, 30.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].key, "a");
        assert_eq!(grid.query(-10.0, -10.0, 200.0, 200.0).len(), 2);
        assert_eq!(grid.keys_len(), 2);
    }

    #[test]
    fn test_whole_grid_hit() {
        let grid: GridIndex<u32> = GridIndex::new(100.0, 100.0, 10.0);
        assert!(grid.hit_test(-1.0, -1.0, 101.0, 101.0, OverlapMode::Never, None));
        assert!(!grid.hit_test(150.0, 150.0, 160.0, 160.0, OverlapMode::Never, None));
    }
}
