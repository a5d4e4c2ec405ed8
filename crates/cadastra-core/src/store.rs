//! 要素存储
//!
//! 要素按内部编号保存在有序表里。线的几何不单独保存，
//! 而是由端点（以及圆心）当前的位置推出，因此点移动后线会自动跟随。

use crate::feature::{EditSequence, EntityTypeId, Feature, FeatureId, FeatureKey, FeatureKind, LineTopology, Shape};
use crate::geometry::{Arc, LineGeometry, Segment};
use crate::math::{BoundingBox2, Point2};
use std::collections::BTreeMap;

/// 要素存储
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    features: BTreeMap<FeatureId, Feature>,
    next_id: u32,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self {
            features: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// 下一个将被分配的内部编号
    pub fn next_id(&self) -> FeatureId {
        FeatureId(self.next_id.max(1))
    }

    /// 跳过编号直到 `id`（重放日志时保持编号一致）
    pub fn skip_to(&mut self, id: FeatureId) {
        debug_assert!(id.0 >= self.next_id().0, "feature ids must not go backwards");
        self.next_id = self.next_id.max(id.0);
    }

    /// 添加新要素，返回其内部编号
    pub fn insert(
        &mut self,
        key: Option<FeatureKey>,
        entity: EntityTypeId,
        creator: EditSequence,
        shape: Shape,
    ) -> FeatureId {
        let id = self.next_id();
        self.next_id = id.0 + 1;
        self.features.insert(
            id,
            Feature {
                id,
                key,
                entity,
                creator,
                shape,
                active: true,
            },
        );
        id
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(&id)
    }

    pub fn get_mut(&mut self, id: FeatureId) -> Option<&mut Feature> {
        self.features.get_mut(&id)
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.features.contains_key(&id)
    }

    /// 要素总数（含非活动要素）
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// 活动要素数量
    pub fn active_count(&self) -> usize {
        self.features.values().filter(|f| f.active).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Feature> {
        self.features.values().filter(|f| f.active)
    }

    pub fn set_active(&mut self, id: FeatureId, active: bool) {
        if let Some(f) = self.features.get_mut(&id) {
            f.active = active;
        }
    }

    /// 点要素位置
    pub fn point_position(&self, id: FeatureId) -> Option<Point2> {
        match self.features.get(&id).map(|f| &f.shape) {
            Some(Shape::Point(p)) => Some(*p),
            _ => None,
        }
    }

    /// 按当前端点位置求线的几何
    pub fn geometry_of(&self, topology: &LineTopology) -> Option<LineGeometry> {
        let start = self.point_position(topology.start)?;
        let end = self.point_position(topology.end)?;
        match topology.arc {
            None => Some(LineGeometry::Segment(Segment::new(start, end))),
            Some(arc) => {
                let center = self.point_position(arc.center)?;
                Some(LineGeometry::Arc(Arc::from_points(center, start, end, arc.clockwise)))
            }
        }
    }

    /// 线要素的几何
    pub fn line_geometry(&self, id: FeatureId) -> Option<LineGeometry> {
        self.features.get(&id)?.line().and_then(|t| self.geometry_of(t))
    }

    /// 以 `point` 为端点或圆心的线（含非活动线）
    pub fn lines_touching(&self, point: FeatureId) -> Vec<FeatureId> {
        self.features
            .values()
            .filter(|f| f.line().is_some_and(|t| t.points().any(|p| p == point)))
            .map(|f| f.id)
            .collect()
    }

    /// 按用户编号查找活动要素
    pub fn find_by_key(&self, key: &str) -> Option<&Feature> {
        self.iter_active().find(|f| f.key.as_ref().is_some_and(|k| k.text == key))
    }

    /// 某类要素的数量
    pub fn count_kind(&self, kind: FeatureKind) -> usize {
        self.iter_active().filter(|f| f.kind() == kind).count()
    }

    /// 活动点和文本的范围
    pub fn extent(&self) -> Option<BoundingBox2> {
        BoundingBox2::from_points(self.iter_active().filter_map(|f| f.position()))
    }
}
