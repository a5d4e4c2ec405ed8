//! 编辑会话的端到端场景

use approx::assert_relative_eq;
use cadastra_core::prelude::*;

const POINT: EntityTypeId = EntityTypeId(1);
const LINE: EntityTypeId = EntityTypeId(2);

fn new_point(model: &mut Model, x: f64, y: f64) -> FeatureId {
    model
        .execute(
            EditData::NewPoint(NewPointData {
                position: Point2::new(x, y),
                entity: POINT,
            }),
            None,
        )
        .unwrap()
        .primary
        .unwrap()
}

fn two_distances(a: FeatureId, b: FeatureId, d1: f64, d2: f64) -> EditData {
    EditData::IntersectTwoDistances(TwoDistancesData {
        first: DistanceFrom {
            from: a,
            distance: Distance::meters(d1),
        },
        second: DistanceFrom {
            from: b,
            distance: Distance::meters(d2),
        },
        choice: Choice::near(Point2::new(50.0, 40.0)),
        point_entity: POINT,
        first_line: None,
        second_line: None,
    })
}

fn radial(from: FeatureId, length: f64) -> EditData {
    EditData::Radial(RadialData {
        direction: Direction::bearing(from, 0.0),
        length: Distance::meters(length),
        point_entity: POINT,
        line: Some(LINE),
    })
}

fn position(model: &Model, id: FeatureId) -> Point2 {
    model.feature(id).unwrap().position().unwrap()
}

/// a(0,0)、b(100,0)，两距离交会出 P，再从 P 向北放样 Q
struct Fixture {
    model: Model,
    a: FeatureId,
    b: FeatureId,
    p: FeatureId,
    q: FeatureId,
    p_edit: EditSequence,
}

fn fixture() -> Fixture {
    let mut model = Model::default();
    let a = new_point(&mut model, 0.0, 0.0);
    let b = new_point(&mut model, 100.0, 0.0);
    let executed = model.execute(two_distances(a, b, 70.71, 70.71), None).unwrap();
    let p = executed.primary.unwrap();
    let q = model.execute(radial(p, 10.0), None).unwrap().primary.unwrap();
    Fixture {
        model,
        a,
        b,
        p,
        q,
        p_edit: executed.sequence,
    }
}

#[test]
fn test_two_distance_intersection_with_hint() {
    let f = fixture();
    let p = position(&f.model, f.p);
    assert_relative_eq!(p.x, 50.0, epsilon = 1e-9);
    assert!((p.y - 50.0).abs() < 0.01);
    assert_relative_eq!(position(&f.model, f.q).y, p.y + 10.0, epsilon = 1e-9);
}

#[test]
fn test_infeasible_distances_create_nothing() {
    let mut model = Model::default();
    let a = new_point(&mut model, 0.0, 0.0);
    let b = new_point(&mut model, 200.0, 0.0);
    let data = two_distances(a, b, 50.0, 50.0);

    assert!(!model.calculate(&data).unwrap().success());
    assert_eq!(model.execute(data, None), Err(EditError::NoSolution));
    assert_eq!(model.features().len(), 2);
    assert_eq!(model.edit_count(), 2);
}

#[test]
fn test_rollback_on_empty_session() {
    let mut model = Model::default();
    let status = model.rollback();
    assert_eq!(status, RollbackStatus::Nothing);
    assert_eq!(status.code(), 0);
    assert!(model.features().is_empty());
}

#[test]
fn test_full_packet_allocates_next() {
    let mut model = Model::default();
    for _ in 0..100 {
        let handle = model.ids_mut().reserve(POINT).unwrap();
        model.ids_mut().commit(handle).unwrap();
    }
    let group = model.ids().group(1).unwrap();
    assert_eq!(group.packets().len(), 1);
    assert_eq!(group.packets()[0].used_count(), 100);

    let range = model.ids_mut().get_allocation(1).unwrap();
    assert_eq!((range.min, range.max), (101, 200));
}

#[test]
fn test_correct_moves_point_and_dependents() {
    let mut f = fixture();
    let key_before = f.model.feature(f.p).unwrap().key.clone();

    f.model.correct(f.p_edit, two_distances(f.a, f.b, 80.0, 80.0)).unwrap();

    let p = f.model.feature(f.p).unwrap();
    assert_eq!(p.key, key_before);
    assert_eq!(p.kind(), FeatureKind::Point);
    let expected_y = (80.0f64 * 80.0 - 50.0 * 50.0).sqrt();
    assert_relative_eq!(position(&f.model, f.p).x, 50.0, epsilon = 1e-9);
    assert_relative_eq!(position(&f.model, f.p).y, expected_y, epsilon = 1e-9);
    // Q 随 P 重算
    assert_relative_eq!(position(&f.model, f.q).y, expected_y + 10.0, epsilon = 1e-9);

    let record = f.model.record(f.p_edit).unwrap();
    assert!(record.describe().contains("80m"));
}

#[test]
fn test_correct_with_same_inputs_changes_nothing() {
    let mut f = fixture();
    let before: Vec<Feature> = f.model.features().iter().cloned().collect();
    let data = f.model.record(f.p_edit).unwrap().data.clone();

    let items = f.model.update_items(f.p_edit, &data).unwrap();
    assert!(items.is_empty());

    f.model.correct(f.p_edit, data).unwrap();
    let after: Vec<Feature> = f.model.features().iter().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn test_update_items_preview() {
    let f = fixture();
    let items = f.model.update_items(f.p_edit, &two_distances(f.a, f.b, 80.0, 80.0)).unwrap();
    let names: Vec<&str> = items.fields.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    let moved: Vec<FeatureId> = items.moved.iter().map(|m| m.id).collect();
    assert_eq!(moved, vec![f.p, f.q]);
    assert_eq!(items.dependents.len(), 1);

    // 预览不改变模型
    assert!((position(&f.model, f.p).y - 50.0).abs() < 0.01);
}

#[test]
fn test_failed_roll_forward_is_transactional() {
    let mut model = Model::default();
    let a = new_point(&mut model, 0.0, 0.0);
    let b = new_point(&mut model, 100.0, 0.0);
    let p_edit = model.execute(two_distances(a, b, 70.71, 70.71), None).unwrap();
    let p = p_edit.primary.unwrap();
    let dependent = model.execute(two_distances(p, b, 38.0, 38.0), None).unwrap();
    let before: Vec<Feature> = model.features().iter().cloned().collect();

    // P 移到 (50, 62.45) 后离 b 80 米，38 + 38 不够
    let err = model.correct(p_edit.sequence, two_distances(a, b, 80.0, 80.0)).unwrap_err();
    assert_eq!(
        err,
        EditError::RollForward {
            sequence: dependent.sequence,
            source: Box::new(EditError::NoSolution),
        }
    );
    let after: Vec<Feature> = model.features().iter().cloned().collect();
    assert_eq!(before, after);
    assert!(model.record(p_edit.sequence).unwrap().describe().contains("70.71m"));
}

#[test]
fn test_rollback_is_inverse_of_execute() {
    let mut f = fixture();
    let active = f.model.features().active_count();
    let used = f.model.ids().used_count();
    let edits = f.model.edit_count();

    let executed = f.model.execute(two_distances(f.a, f.q, 60.0, 60.0), None).unwrap();
    assert_eq!(f.model.ids().used_count(), used + 1);

    let status = f.model.rollback();
    assert_eq!(status, RollbackStatus::RolledBack(executed.sequence));
    assert_eq!(status.code(), executed.sequence.0);
    assert_eq!(f.model.features().active_count(), active);
    assert_eq!(f.model.ids().used_count(), used);
    assert_eq!(f.model.edit_count(), edits);
}

#[test]
fn test_only_tail_can_be_rolled_back() {
    let mut f = fixture();
    assert_eq!(f.model.rollback_edit(f.p_edit), Err(EditError::NotTail(f.p_edit)));
    assert_eq!(f.model.edit_count(), 4);
}

#[test]
fn test_subdivision_and_rollback() {
    let mut model = Model::default();
    let a = new_point(&mut model, 0.0, 0.0);
    let b = new_point(&mut model, 100.0, 0.0);
    let line = model
        .execute(
            EditData::NewLine(NewLineData {
                start: a,
                end: b,
                arc: None,
                entity: LINE,
            }),
            None,
        )
        .unwrap()
        .primary
        .unwrap();

    let executed = model
        .execute(
            EditData::LineSubdivision(SubdivisionData {
                line,
                distances: vec![
                    Distance::meters(30.0).fixed(),
                    Distance::meters(30.0),
                    Distance::meters(30.0),
                ],
                from_end: false,
                point_entity: POINT,
            }),
            None,
        )
        .unwrap();
    assert!(!model.feature(line).unwrap().active);
    let record = model.record(executed.sequence).unwrap();
    assert_eq!(record.created.len(), 5);
    assert_relative_eq!(position(&model, executed.primary.unwrap()).x, 30.0, epsilon = 1e-9);
    assert_eq!(model.features().count_kind(FeatureKind::Line), 3);

    model.rollback();
    assert!(model.feature(line).unwrap().active);
    assert_eq!(model.features().count_kind(FeatureKind::Line), 1);
    assert_eq!(model.features().count_kind(FeatureKind::Point), 2);
}

#[test]
fn test_import_reports_progress() {
    let mut model = Model::default();
    let data = EditData::Import(ImportData {
        source: "field.csv".to_string(),
        points: vec![
            ImportPoint {
                key: Some(500),
                position: Point2::new(0.0, 0.0),
            },
            ImportPoint {
                key: None,
                position: Point2::new(10.0, 0.0),
            },
            ImportPoint {
                key: None,
                position: Point2::new(10.0, 10.0),
            },
        ],
        lines: vec![ImportLine { start: 0, end: 1 }],
        point_entity: POINT,
        line_entity: Some(LINE),
    });

    let mut calls = Vec::new();
    let mut listener = |done: usize, total: usize| calls.push((done, total));
    let executed = model.execute_with_progress(data, None, &mut listener).unwrap();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls.last(), Some(&(4, 4)));

    assert_eq!(model.feature(executed.primary.unwrap()).unwrap().label(), "500");
    // 只申请覆盖 500 的包，未指定编号的点从这个包里取号
    let packets = model.ids().group(1).unwrap().packets();
    assert_eq!(packets.len(), 1);
    assert_eq!((packets[0].range().min, packets[0].range().max), (401, 500));
    assert!(model.features().find_by_key("401").is_some());

    let record = model.record(executed.sequence).unwrap();
    assert_eq!(model.record_keys(record), vec![Some(500), Some(401), Some(402), None]);
    assert_eq!(
        model.correct(executed.sequence, record.data.clone()),
        Err(EditError::NotCorrectable(EditKind::Import))
    );
}

#[test]
fn test_packets_never_overlap() {
    let mut model = Model::default();
    for i in 0..250 {
        new_point(&mut model, i as f64, 0.0);
    }
    model.ids_mut().reserve_specific(POINT, 777).unwrap();
    let packets = model.ids().group(1).unwrap().packets();
    for (i, p) in packets.iter().enumerate() {
        for q in &packets[i + 1..] {
            assert!(!p.range().overlaps(&q.range()));
        }
    }
    assert_eq!(packets.last().unwrap().range().max, 800);
}

#[test]
fn test_replay_reproduces_geometry() {
    let f = fixture();
    let mut replayed = Model::default();
    for record in f.model.records() {
        replayed
            .replay(ReplayEntry {
                sequence: record.sequence,
                first_feature: record.first_feature,
                data: record.data.clone(),
                keys: f.model.record_keys(record),
                when: record.when,
            })
            .unwrap();
    }
    let original: Vec<Feature> = f.model.features().iter().cloned().collect();
    let copy: Vec<Feature> = replayed.features().iter().cloned().collect();
    assert_eq!(original, copy);
}

fn radial_along(direction: Direction) -> EditData {
    EditData::Radial(RadialData {
        direction,
        length: Distance::meters(10.0),
        point_entity: POINT,
        line: None,
    })
}

#[test]
fn test_undefined_directions_are_rejected() {
    let mut model = Model::default();
    let a = new_point(&mut model, 0.0, 0.0);
    let b = new_point(&mut model, 0.0, 0.0);
    let c = new_point(&mut model, 0.0, 100.0);
    let edits = model.edit_count();

    for direction in [
        Direction::angle(a, a, 0.5),
        Direction::angle(b, a, 0.5),
        Direction::deflection(b, a, 0.5),
        Direction::parallel(c, a, b),
    ] {
        let result = model.execute(radial_along(direction), None);
        assert!(matches!(result, Err(EditError::InvalidObservation(_))), "{result:?}");
    }
    assert_eq!(model.edit_count(), edits);
    assert_eq!(model.features().len(), 3);
    assert_eq!(model.ids().used_count(), 3);
}

#[test]
fn test_correction_onto_station_fails_roll_forward() {
    let mut model = Model::default();
    let station = new_point(&mut model, 0.0, 0.0);
    let backsight_edit = model
        .execute(
            EditData::NewPoint(NewPointData {
                position: Point2::new(0.0, 100.0),
                entity: POINT,
            }),
            None,
        )
        .unwrap();
    let backsight = backsight_edit.primary.unwrap();
    let dependent = model
        .execute(radial_along(Direction::angle(backsight, station, 0.5)), None)
        .unwrap();

    let err = model
        .correct(
            backsight_edit.sequence,
            EditData::NewPoint(NewPointData {
                position: Point2::new(0.0, 0.0),
                entity: POINT,
            }),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EditError::RollForward { sequence, ref source }
            if sequence == dependent.sequence && matches!(**source, EditError::InvalidObservation(_))
    ));
    assert_eq!(position(&model, backsight), Point2::new(0.0, 100.0));
}

#[test]
fn test_delete_point_with_its_line_and_roll_back() {
    let mut f = fixture();
    let radial_line = f.model.features().lines_touching(f.q)[0];
    let active_before = f.model.features().active_count();

    let data = DeletionData::with_attached_lines(vec![f.q], f.model.features());
    assert_eq!(data.features, vec![f.q, radial_line]);
    let executed = f.model.execute(EditData::Deletion(data), None).unwrap();
    assert_eq!(executed.primary, None);
    assert!(!f.model.feature(f.q).unwrap().active);
    assert!(!f.model.feature(radial_line).unwrap().active);
    assert_eq!(f.model.features().active_count(), active_before - 2);

    // 被删的点不能再被引用
    assert_eq!(
        f.model.execute(radial(f.q, 5.0), None).unwrap_err(),
        EditError::InactiveFeature(f.q)
    );
    assert!(f.model.recall(|r| r.data.kind() == EditKind::Deletion, true).is_none());

    assert_eq!(f.model.rollback(), RollbackStatus::RolledBack(executed.sequence));
    assert!(f.model.feature(f.q).unwrap().active);
    assert!(f.model.feature(radial_line).unwrap().active);
    assert_eq!(f.model.features().active_count(), active_before);
}

#[test]
fn test_point_cannot_be_deleted_under_its_line() {
    let mut f = fixture();
    let count = f.model.edit_count();
    let err = f
        .model
        .execute(EditData::Deletion(DeletionData { features: vec![f.q] }), None)
        .unwrap_err();
    assert!(matches!(err, EditError::InvalidObservation(_)));
    assert!(f.model.feature(f.q).unwrap().active);
    assert_eq!(f.model.edit_count(), count);
}

#[test]
fn test_correction_rolls_through_deletion() {
    let mut f = fixture();
    let data = DeletionData::with_attached_lines(vec![f.q], f.model.features());
    f.model.execute(EditData::Deletion(data), None).unwrap();

    f.model.correct(f.p_edit, two_distances(f.a, f.b, 80.0, 80.0)).unwrap();
    let expected_y = (80.0f64 * 80.0 - 50.0 * 50.0).sqrt();
    assert_relative_eq!(position(&f.model, f.q).y, expected_y + 10.0, epsilon = 1e-9);
    assert!(!f.model.feature(f.q).unwrap().active);
}

#[test]
fn test_attached_point_follows_corrected_line() {
    let mut model = Model::default();
    let a = new_point(&mut model, 0.0, 0.0);
    let b_edit = model
        .execute(
            EditData::NewPoint(NewPointData {
                position: Point2::new(100.0, 0.0),
                entity: POINT,
            }),
            None,
        )
        .unwrap();
    let b = b_edit.primary.unwrap();
    let line = model
        .execute(
            EditData::NewLine(NewLineData {
                start: a,
                end: b,
                arc: None,
                entity: LINE,
            }),
            None,
        )
        .unwrap()
        .primary
        .unwrap();

    let geometry = model.features().line_geometry(line).unwrap();
    let data = AttachPointData::at(line, &geometry, &Point2::new(25.0, 0.0), 0.001, POINT).unwrap();
    let attached = model.execute(EditData::AttachPoint(data), None).unwrap().primary.unwrap();
    assert!(model.feature(line).unwrap().active);
    assert_relative_eq!(position(&model, attached).x, 25.0, epsilon = 1e-6);

    // 线变长后点仍在四分之一处
    model
        .correct(
            b_edit.sequence,
            EditData::NewPoint(NewPointData {
                position: Point2::new(200.0, 0.0),
                entity: POINT,
            }),
        )
        .unwrap();
    assert_relative_eq!(position(&model, attached).x, 50.0, epsilon = 1e-6);
}
