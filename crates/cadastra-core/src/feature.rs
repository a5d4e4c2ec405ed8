//! 要素定义
//!
//! 要素是地籍图上的持久对象：点、线（线段或圆弧）、文本注记。
//! 每个要素由唯一一条编辑记录创建，删除只是置为非活动状态。

use crate::geometry::TextGeometry;
use crate::math::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 要素内部编号，在模型内单调分配，永不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(pub u32);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 编辑记录序号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditSequence(pub u32);

impl fmt::Display for EditSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 要素的几何种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Point,
    Line,
    Text,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Point => "point",
            FeatureKind::Line => "line",
            FeatureKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// 实体类型编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityTypeId(pub u32);

/// 实体类型（例如“界址点”“地块边界”）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: EntityTypeId,
    pub name: String,
    pub kind: FeatureKind,
}

/// 用户可见的要素编号，由编号组分配
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    /// 编号组
    pub group: u32,
    /// 原始编号
    pub raw: u32,
    /// 格式化后的文本
    pub text: String,
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// 圆弧线的附加拓扑
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcTopology {
    pub center: FeatureId,
    pub clockwise: bool,
}

/// 线的拓扑：端点引用点要素，几何由端点当前位置推出
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineTopology {
    pub start: FeatureId,
    pub end: FeatureId,
    pub arc: Option<ArcTopology>,
}

impl LineTopology {
    pub fn segment(start: FeatureId, end: FeatureId) -> Self {
        Self { start, end, arc: None }
    }

    /// 线依赖的点要素
    pub fn points(&self) -> impl Iterator<Item = FeatureId> {
        [Some(self.start), Some(self.end), self.arc.map(|a| a.center)]
            .into_iter()
            .flatten()
    }
}

/// 要素形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Point(Point2),
    Line(LineTopology),
    Text(TextGeometry),
}

impl Shape {
    pub fn kind(&self) -> FeatureKind {
        match self {
            Shape::Point(_) => FeatureKind::Point,
            Shape::Line(_) => FeatureKind::Line,
            Shape::Text(_) => FeatureKind::Text,
        }
    }
}

/// 要素
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub key: Option<FeatureKey>,
    pub entity: EntityTypeId,
    /// 创建该要素的编辑记录
    pub creator: EditSequence,
    pub shape: Shape,
    pub active: bool,
}

impl Feature {
    pub fn kind(&self) -> FeatureKind {
        self.shape.kind()
    }

    pub fn position(&self) -> Option<Point2> {
        match &self.shape {
            Shape::Point(p) => Some(*p),
            Shape::Text(t) => Some(t.position),
            Shape::Line(_) => None,
        }
    }

    pub fn line(&self) -> Option<&LineTopology> {
        match &self.shape {
            Shape::Line(l) => Some(l),
            _ => None,
        }
    }

    /// 显示名：有用户编号时用编号，否则用内部编号
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.text.clone(),
            None => self.id.to_string(),
        }
    }
}
