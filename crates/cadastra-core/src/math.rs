//! 数学基础类型
//!
//! 坐标采用测量惯例：X 为东坐标，Y 为北坐标。
//! 方位角（bearing）从北方向顺时针量取，单位为弧度，范围 [0, 2π)。

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub type Point2 = nalgebra::Point2<f64>;
pub type Vector2 = nalgebra::Vector2<f64>;

/// 数值比较的极小值
pub const EPSILON: f64 = 1e-10;

/// 几何判断使用的默认容差（米）
pub const TINY: f64 = 1e-6;

/// 完整圆周
pub const TAU: f64 = 2.0 * PI;

/// 把角度归一化到 [0, 2π)
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid 对很小的负数可能返回 TAU
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// 从 `from` 到 `to` 的方位角
pub fn bearing(from: &Point2, to: &Point2) -> f64 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    normalize_angle(dx.atan2(dy))
}

/// 极坐标推算：从 `origin` 沿方位角 `bearing` 前进 `distance`
pub fn polar(origin: &Point2, bearing: f64, distance: f64) -> Point2 {
    Point2::new(
        origin.x + distance * bearing.sin(),
        origin.y + distance * bearing.cos(),
    )
}

/// 方位角对应的单位向量
pub fn unit(bearing: f64) -> Vector2 {
    Vector2::new(bearing.sin(), bearing.cos())
}

/// 绕 `origin` 顺时针旋转 `angle`
pub fn rotate(point: &Point2, origin: &Point2, angle: f64) -> Point2 {
    let d = point - origin;
    if d.norm() < EPSILON {
        return *point;
    }
    polar(origin, bearing(origin, point) + angle, d.norm())
}

/// 两点距离
pub fn distance(a: &Point2, b: &Point2) -> f64 {
    (b - a).norm()
}

/// 2D 包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2 {
    pub min: Point2,
    pub max: Point2,
}

impl BoundingBox2 {
    pub fn new(min: Point2, max: Point2) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Point2>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first, first);
        for p in iter {
            bbox.expand_to_include(&p);
        }
        Some(bbox)
    }

    pub fn expand_to_include(&mut self, point: &Point2) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    /// 对角线长度
    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }
}
