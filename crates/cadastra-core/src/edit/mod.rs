//! 编辑操作
//!
//! 每种编辑由 `EditKind` 区分，输入参数放在各自的载荷结构里（`EditData`）。
//! 各种编辑的行为通过静态的函数指针表 `EditHandler` 分派：
//!
//! - `references`: 输入引用了哪些要素
//! - `compute`: 由输入和被引用要素的当前几何计算结果（纯函数）
//! - `describe`: 审计显示用的单行描述
//!
//! 计算结果 `Outcome` 只描述“要创建什么、要停用什么”，真正修改要素存储
//! 由 `Model` 完成。

pub mod deletion;
pub mod import;
pub mod intersect;
pub mod line;
pub mod path;
pub mod simple;
pub mod update;

use crate::coords::CoordinateSystem;
use crate::error::EditError;
use crate::feature::{ArcTopology, EntityTypeId, Feature, FeatureId, FeatureKind, LineTopology, Shape};
use crate::geometry::{LineGeometry, TextGeometry};
use crate::intersect::SolverParams;
use crate::math::Point2;
use crate::observation::{Direction, Distance, ResolvedDirection};
use crate::settings::Settings;
use crate::store::FeatureStore;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use deletion::DeletionData;
pub use import::{ImportData, ImportLine, ImportPoint, NoProgress, ProgressListener};
pub use intersect::{
    DirectionDistanceData, DirectionLineData, DistanceFrom, RadialData, TwoDirectionsData, TwoDistancesData,
    TwoLinesData,
};
pub use line::{AttachPointData, ExtensionData, PointOnLineData, SubdivisionData, MAX_POSITION_RATIO};
pub use path::{Adjustment, Leg, PathData};
pub use simple::{NewLineData, NewPointData, NewTextData};
pub use update::{MovedFeature, UpdateItem, UpdateItems};

/// 编辑种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    IntersectDirectionDistance,
    IntersectTwoDistances,
    IntersectTwoDirections,
    IntersectDirectionLine,
    IntersectTwoLines,
    Radial,
    PointOnLine,
    AttachPoint,
    LineSubdivision,
    LineExtension,
    Path,
    NewPoint,
    NewLine,
    NewText,
    Import,
    Deletion,
}

/// 编辑输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EditData {
    IntersectDirectionDistance(DirectionDistanceData),
    IntersectTwoDistances(TwoDistancesData),
    IntersectTwoDirections(TwoDirectionsData),
    IntersectDirectionLine(DirectionLineData),
    IntersectTwoLines(TwoLinesData),
    Radial(RadialData),
    PointOnLine(PointOnLineData),
    AttachPoint(AttachPointData),
    LineSubdivision(SubdivisionData),
    LineExtension(ExtensionData),
    Path(PathData),
    NewPoint(NewPointData),
    NewLine(NewLineData),
    NewText(NewTextData),
    Import(ImportData),
    Deletion(DeletionData),
}

impl EditData {
    pub fn kind(&self) -> EditKind {
        match self {
            EditData::IntersectDirectionDistance(_) => EditKind::IntersectDirectionDistance,
            EditData::IntersectTwoDistances(_) => EditKind::IntersectTwoDistances,
            EditData::IntersectTwoDirections(_) => EditKind::IntersectTwoDirections,
            EditData::IntersectDirectionLine(_) => EditKind::IntersectDirectionLine,
            EditData::IntersectTwoLines(_) => EditKind::IntersectTwoLines,
            EditData::Radial(_) => EditKind::Radial,
            EditData::PointOnLine(_) => EditKind::PointOnLine,
            EditData::AttachPoint(_) => EditKind::AttachPoint,
            EditData::LineSubdivision(_) => EditKind::LineSubdivision,
            EditData::LineExtension(_) => EditKind::LineExtension,
            EditData::Path(_) => EditKind::Path,
            EditData::NewPoint(_) => EditKind::NewPoint,
            EditData::NewLine(_) => EditKind::NewLine,
            EditData::NewText(_) => EditKind::NewText,
            EditData::Import(_) => EditKind::Import,
            EditData::Deletion(_) => EditKind::Deletion,
        }
    }

    pub fn handler(&self) -> &'static EditHandler {
        handler(self.kind())
    }

    pub fn references(&self) -> Vec<FeatureId> {
        (self.handler().references)(self)
    }

    pub fn describe(&self) -> String {
        (self.handler().describe)(self)
    }
}

/// 各种编辑载荷的公共行为
pub trait EditPayload {
    /// 输入引用的要素
    fn references(&self) -> Vec<FeatureId>;

    /// 计算编辑结果
    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError>;

    /// 单行描述
    fn describe(&self) -> String;
}

/// 编辑分派表项
pub struct EditHandler {
    pub kind: EditKind,
    pub name: &'static str,
    /// 是否支持修正
    pub can_correct: bool,
    pub references: fn(&EditData) -> Vec<FeatureId>,
    pub compute: fn(&EditData, &EditContext<'_>) -> Result<Outcome, EditError>,
    pub describe: fn(&EditData) -> String,
}

impl fmt::Debug for EditHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditHandler")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("can_correct", &self.can_correct)
            .finish()
    }
}

macro_rules! handler {
    ($kind:ident, $name:expr, $can_correct:expr) => {
        EditHandler {
            kind: EditKind::$kind,
            name: $name,
            can_correct: $can_correct,
            references: |data| match data {
                EditData::$kind(d) => d.references(),
                _ => Vec::new(),
            },
            compute: |data, ctx| match data {
                EditData::$kind(d) => d.compute(ctx),
                other => Err(EditError::KindChanged {
                    expected: EditKind::$kind,
                    found: other.kind(),
                }),
            },
            describe: |data| match data {
                EditData::$kind(d) => d.describe(),
                _ => String::new(),
            },
        }
    };
}

/// 按 `EditKind` 声明顺序排列
static HANDLERS: [EditHandler; 16] = [
    handler!(IntersectDirectionDistance, "Intersect direction and distance", true),
    handler!(IntersectTwoDistances, "Intersect two distances", true),
    handler!(IntersectTwoDirections, "Intersect two directions", true),
    handler!(IntersectDirectionLine, "Intersect direction and line", true),
    handler!(IntersectTwoLines, "Intersect two lines", true),
    handler!(Radial, "Radial line", true),
    handler!(PointOnLine, "Point on line", true),
    handler!(AttachPoint, "Attach point to line", true),
    handler!(LineSubdivision, "Line subdivision", true),
    handler!(LineExtension, "Line extension", true),
    handler!(Path, "Connection path", true),
    handler!(NewPoint, "New point", true),
    handler!(NewLine, "New line", true),
    handler!(NewText, "New text", true),
    handler!(Import, "Import", false),
    handler!(Deletion, "Deletion", false),
];

/// 查分派表
pub fn handler(kind: EditKind) -> &'static EditHandler {
    let h = &HANDLERS[kind as usize];
    debug_assert_eq!(h.kind, kind, "edit handler table out of order");
    h
}

/// 编辑创建的要素的角色名，例如 `To`、`Section[2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role {
    pub name: &'static str,
    pub index: Option<u32>,
}

impl Role {
    pub const fn new(name: &'static str) -> Self {
        Self { name, index: None }
    }

    pub const fn indexed(name: &'static str, index: u32) -> Self {
        Self {
            name,
            index: Some(index),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.name, i),
            None => f.write_str(self.name),
        }
    }
}

/// 交会点
pub const TO: Role = Role::new("To");

/// 线端点：已有的点，或同一编辑中新建的点
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Endpoint {
    Existing(FeatureId),
    Created(Role),
}

/// 新线的圆弧参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcSpec {
    pub center: Endpoint,
    pub clockwise: bool,
}

/// 待创建要素的形状
#[derive(Debug, Clone, PartialEq)]
pub enum NewShape {
    Point(Point2),
    Line {
        start: Endpoint,
        end: Endpoint,
        arc: Option<ArcSpec>,
    },
    Text(TextGeometry),
}

impl NewShape {
    pub fn kind(&self) -> FeatureKind {
        match self {
            NewShape::Point(_) => FeatureKind::Point,
            NewShape::Line { .. } => FeatureKind::Line,
            NewShape::Text(_) => FeatureKind::Text,
        }
    }
}

/// 一个待创建的要素
#[derive(Debug, Clone, PartialEq)]
pub struct Creation {
    pub role: Role,
    pub entity: EntityTypeId,
    pub shape: NewShape,
    /// 指定的用户编号
    pub key: Option<u32>,
}

/// 编辑计算结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// 按创建顺序排列；线引用的新建点必须排在线之前
    pub created: Vec<Creation>,
    /// 要停用的已有要素
    pub retired: Vec<FeatureId>,
    /// 主要结果的角色
    pub primary: Option<Role>,
    /// 求解器给出的全部候选位置
    pub candidates: Vec<Point2>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_point(role: Role, entity: EntityTypeId, position: Point2) -> Self {
        let mut outcome = Self::new();
        outcome.add_point(role, entity, position);
        outcome.primary = Some(role);
        outcome
    }

    pub fn add_point(&mut self, role: Role, entity: EntityTypeId, position: Point2) {
        self.created.push(Creation {
            role,
            entity,
            shape: NewShape::Point(position),
            key: None,
        });
    }

    pub fn add_line(&mut self, role: Role, entity: EntityTypeId, start: Endpoint, end: Endpoint, arc: Option<ArcSpec>) {
        self.created.push(Creation {
            role,
            entity,
            shape: NewShape::Line { start, end, arc },
            key: None,
        });
    }

    /// 按角色查新建点的位置
    pub fn position_of(&self, role: Role) -> Option<Point2> {
        self.created.iter().find(|c| c.role == role).and_then(|c| match &c.shape {
            NewShape::Point(p) => Some(*p),
            NewShape::Text(t) => Some(t.position),
            NewShape::Line { .. } => None,
        })
    }

    pub fn primary_position(&self) -> Option<Point2> {
        self.primary.and_then(|role| self.position_of(role))
    }

    pub fn roles(&self) -> Vec<Role> {
        self.created.iter().map(|c| c.role).collect()
    }
}

/// 编辑计算的上下文
///
/// 计算只读取要素存储，不做任何修改。
pub struct EditContext<'a> {
    pub features: &'a FeatureStore,
    pub coords: &'a dyn CoordinateSystem,
    pub settings: &'a Settings,
    /// 是否要求被引用要素处于活动状态（重算已提交的编辑时不要求）
    pub check_active: bool,
}

impl<'a> EditContext<'a> {
    pub fn params(&self) -> SolverParams {
        self.settings.solver_params()
    }

    pub fn tolerance(&self) -> f64 {
        self.settings.tolerance
    }

    /// 取被引用的要素
    pub fn feature(&self, id: FeatureId) -> Result<&'a Feature, EditError> {
        let feature = self.features.get(id).ok_or(EditError::MissingFeature(id))?;
        if self.check_active && !feature.active {
            return Err(EditError::InactiveFeature(id));
        }
        Ok(feature)
    }

    /// 点要素的位置
    pub fn point(&self, id: FeatureId) -> Result<Point2, EditError> {
        match &self.feature(id)?.shape {
            Shape::Point(p) => Ok(*p),
            _ => Err(EditError::WrongKind {
                feature: id,
                expected: FeatureKind::Point,
            }),
        }
    }

    /// 线要素的拓扑、几何和实体类型
    pub fn line(&self, id: FeatureId) -> Result<(LineTopology, LineGeometry, EntityTypeId), EditError> {
        let feature = self.feature(id)?;
        let topology = *feature.line().ok_or(EditError::WrongKind {
            feature: id,
            expected: FeatureKind::Line,
        })?;
        let geometry = self
            .features
            .geometry_of(&topology)
            .ok_or(EditError::MissingFeature(topology.start))?;
        Ok((topology, geometry, feature.entity))
    }

    /// 检查实体类型存在且适用于指定种类
    pub fn entity(&self, entity: EntityTypeId, kind: FeatureKind) -> Result<EntityTypeId, EditError> {
        let et = self
            .settings
            .entity_type(entity)
            .ok_or(EditError::UnknownEntity(entity))?;
        if et.kind != kind {
            return Err(EditError::WrongEntityKind { entity, expected: kind });
        }
        Ok(entity)
    }

    /// 求方向的起点和方位角
    pub fn direction(&self, direction: &Direction) -> Result<ResolvedDirection, EditError> {
        if !direction.is_valid() {
            return Err(EditError::InvalidObservation(format!(
                "undefined direction {}",
                direction.describe()
            )));
        }
        direction.resolve(|id| self.point(id), self.coords)
    }

    /// 检查距离并返回地面米数
    pub fn distance(&self, distance: &Distance) -> Result<f64, EditError> {
        if !distance.is_valid() {
            return Err(EditError::InvalidObservation(format!(
                "distance must be greater than zero (got {})",
                distance.meters
            )));
        }
        Ok(distance.meters)
    }
}

/// 由线拓扑推出新线的圆弧参数
pub(crate) fn arc_spec(topology: &LineTopology) -> Option<ArcSpec> {
    topology.arc.map(|ArcTopology { center, clockwise }| ArcSpec {
        center: Endpoint::Existing(center),
        clockwise,
    })
}

/// 用线上的若干点把线分成几段，停用原来的线
///
/// `points` 须按从起点到终点的顺序排列。各段继承原线的实体类型和圆弧参数，
/// 角色依次为 `name[1]`、`name[2]` ...
pub(crate) fn add_sections(
    outcome: &mut Outcome,
    line: FeatureId,
    topology: &LineTopology,
    entity: EntityTypeId,
    points: &[Endpoint],
    name: &'static str,
) {
    let arc = arc_spec(topology);
    let ends: Vec<Endpoint> = std::iter::once(Endpoint::Existing(topology.start))
        .chain(points.iter().copied())
        .chain(std::iter::once(Endpoint::Existing(topology.end)))
        .collect();
    for (i, pair) in ends.windows(2).enumerate() {
        outcome.add_line(Role::indexed(name, i as u32 + 1), entity, pair[0], pair[1], arc);
    }
    outcome.retired.push(line);
}

/// 交点不能落在要分割的线的端点上
pub(crate) fn check_split_point(
    line: FeatureId,
    geometry: &LineGeometry,
    at: &Point2,
    tolerance: f64,
) -> Result<(), EditError> {
    let tol = tolerance.max(crate::math::TINY);
    if (at - geometry.start()).norm() <= tol || (at - geometry.end()).norm() <= tol {
        return Err(EditError::InvalidObservation(format!(
            "cannot split line {} at one of its end points",
            line
        )));
    }
    Ok(())
}
