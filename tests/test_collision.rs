// tests/test_collision.rs
// Collision index behaviour seen from a placement pass
// Overlap tests are symmetric, inclusive at edges and honour overlap modes
//
// RELEVANT FILES: src/labels/collision_index.rs, src/labels/grid.rs

#[cfg(test)]
mod collision_tests {
    use glam::{Mat4, Vec2};
    use mapstyle::labels::{
        CollisionBox, CollisionConfig, CollisionIndex, CollisionKey, GridIndex, OverlapMode, PlacementContext,
        ScreenTransform,
    };

    fn key(feature_index: u32) -> CollisionKey {
        CollisionKey {
            bucket_instance_id: 1,
            feature_index,
            collision_group_id: 0,
        }
    }

    fn index() -> (CollisionIndex, Mat4) {
        let transform = ScreenTransform::new(800.0, 600.0, 0.0);
        let matrix = transform.tile_matrix(Vec2::ZERO, 1.0);
        (CollisionIndex::new(transform, CollisionConfig::default()), matrix)
    }

    fn ctx(matrix: &Mat4) -> PlacementContext<'_> {
        PlacementContext {
            pos_matrix: matrix,
            text_pixel_ratio: 1.0,
            translation: Vec2::ZERO,
            predicate: None,
        }
    }

    fn label(x: f32, y: f32) -> CollisionBox {
        CollisionBox::new(Vec2::new(x, y), -20.0, -10.0, 20.0, 10.0)
    }

    fn collides_after(first: &CollisionBox, second: &CollisionBox) -> bool {
        let (mut index, matrix) = index();
        let placed = index.place_collision_box(first, OverlapMode::Never, Vec2::ZERO, &ctx(&matrix));
        let bbox = placed.bbox.expect("first box fits on an empty index");
        index.insert_collision_box(bbox, OverlapMode::Never, false, key(1));
        !index
            .place_collision_box(second, OverlapMode::Never, Vec2::ZERO, &ctx(&matrix))
            .placeable()
    }

    #[test]
    fn overlap_is_symmetric() {
        let pairs = [
            (label(100.0, 100.0), label(110.0, 105.0)),
            (label(100.0, 100.0), label(180.0, 100.0)),
            (label(400.0, 300.0), label(440.0, 300.0)),
            (label(400.0, 300.0), label(400.0, 321.0)),
        ];
        for (a, b) in &pairs {
            assert_eq!(collides_after(a, b), collides_after(b, a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn later_box_is_rejected_where_earlier_sits() {
        let (mut index, matrix) = index();
        let ctx = ctx(&matrix);

        let first = index.place_collision_box(&label(200.0, 200.0), OverlapMode::Never, Vec2::ZERO, &ctx);
        let bbox = first.bbox.expect("empty index accepts the first box");
        index.insert_collision_box(bbox, OverlapMode::Never, false, key(1));

        let overlapping = index.place_collision_box(&label(215.0, 205.0), OverlapMode::Never, Vec2::ZERO, &ctx);
        assert!(!overlapping.placeable());
        assert!(!overlapping.occluded);

        let clear = index.place_collision_box(&label(300.0, 200.0), OverlapMode::Never, Vec2::ZERO, &ctx);
        assert!(clear.placeable());

        let forced = index.place_collision_box(&label(215.0, 205.0), OverlapMode::Always, Vec2::ZERO, &ctx);
        assert!(forced.placeable());
    }

    #[test]
    fn shared_edges_collide() {
        let mut grid = GridIndex::new(200.0, 200.0, 25.0);
        grid.insert(1u32, OverlapMode::Never, 10.0, 10.0, 50.0, 50.0);
        assert!(grid.hit_test(50.0, 20.0, 90.0, 40.0, OverlapMode::Never, None));
        assert!(!grid.hit_test(50.5, 20.0, 90.0, 40.0, OverlapMode::Never, None));
    }

    #[test]
    fn cooperative_boxes_share_space() {
        let mut grid = GridIndex::new(200.0, 200.0, 25.0);
        grid.insert(1u32, OverlapMode::Cooperative, 10.0, 10.0, 50.0, 50.0);
        assert!(!grid.hit_test(20.0, 20.0, 60.0, 60.0, OverlapMode::Cooperative, None));
        assert!(grid.hit_test(20.0, 20.0, 60.0, 60.0, OverlapMode::Never, None));
    }

    #[test]
    fn ignored_placement_does_not_block() {
        let (mut index, matrix) = index();
        let ctx = ctx(&matrix);
        let bbox = index
            .place_collision_box(&label(200.0, 200.0), OverlapMode::Never, Vec2::ZERO, &ctx)
            .bbox
            .expect("fits");
        index.insert_collision_box(bbox, OverlapMode::Never, true, key(1));

        assert!(index
            .place_collision_box(&label(200.0, 200.0), OverlapMode::Never, Vec2::ZERO, &ctx)
            .placeable());
        // still answers rendered-symbol queries
        let hits = index.query_rendered_symbols(&[Vec2::new(200.0, 200.0)]);
        assert_eq!(hits.get(&1), Some(&vec![1]));
    }
}
