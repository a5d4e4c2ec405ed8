//! 几何图元定义
//!
//! 支持的基本图元：
//! - 线段 (Segment)
//! - 圆 (Circle)
//! - 圆弧 (Arc)，以圆心方位角表示起止位置
//! - 线几何 (LineGeometry)，即线段或圆弧
//! - 文本 (TextGeometry)

use crate::math::{self, BoundingBox2, Point2, Vector2, EPSILON, TAU};
use serde::{Deserialize, Serialize};

/// 线段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point2,
    pub end: Point2,
}

impl Segment {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    /// 计算线段长度
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// 起点到终点的方位角
    pub fn bearing(&self) -> f64 {
        math::bearing(&self.start, &self.end)
    }

    /// 计算线段方向向量（单位向量）
    pub fn direction(&self) -> Vector2 {
        (self.end - self.start).normalize()
    }

    /// 计算点到线段的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        let v = self.end - self.start;
        let w = point - self.start;

        let c1 = w.dot(&v);
        if c1 <= 0.0 {
            return (point - self.start).norm();
        }

        let c2 = v.dot(&v);
        if c2 <= c1 {
            return (point - self.end).norm();
        }

        let b = c1 / c2;
        let pb = self.start + v * b;
        (point - pb).norm()
    }
}

/// 圆
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// 计算周长
    pub fn circumference(&self) -> f64 {
        TAU * self.radius
    }

    /// 计算点到圆的距离（负值表示在圆内）
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        (point - self.center).norm() - self.radius
    }

    /// 圆上指定方位角的点
    pub fn point_at(&self, bearing: f64) -> Point2 {
        math::polar(&self.center, bearing, self.radius)
    }
}

/// 圆弧
///
/// 起止位置用圆心到端点的方位角表示，`clockwise` 指从起点到终点的走向。
/// 起止重合时视为整圆。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub circle: Circle,
    pub start_bearing: f64,
    pub end_bearing: f64,
    pub clockwise: bool,
}

impl Arc {
    /// 由圆心、起点、终点构造；半径取圆心到起点的距离
    pub fn from_points(center: Point2, start: Point2, end: Point2, clockwise: bool) -> Self {
        Self {
            circle: Circle::new(center, math::distance(&center, &start)),
            start_bearing: math::bearing(&center, &start),
            end_bearing: math::bearing(&center, &end),
            clockwise,
        }
    }

    pub fn center(&self) -> Point2 {
        self.circle.center
    }

    pub fn radius(&self) -> f64 {
        self.circle.radius
    }

    /// 获取起点
    pub fn start_point(&self) -> Point2 {
        self.circle.point_at(self.start_bearing)
    }

    /// 获取终点
    pub fn end_point(&self) -> Point2 {
        self.circle.point_at(self.end_bearing)
    }

    /// 扫过的角度，范围 (0, 2π]
    pub fn sweep_angle(&self) -> f64 {
        let sweep = if self.clockwise {
            math::normalize_angle(self.end_bearing - self.start_bearing)
        } else {
            math::normalize_angle(self.start_bearing - self.end_bearing)
        };
        if sweep < EPSILON {
            TAU
        } else {
            sweep
        }
    }

    /// 计算弧长
    pub fn length(&self) -> f64 {
        self.sweep_angle() * self.radius()
    }

    /// 沿弧走过 `angle` 后的圆心方位角
    fn bearing_after(&self, angle: f64) -> f64 {
        if self.clockwise {
            math::normalize_angle(self.start_bearing + angle)
        } else {
            math::normalize_angle(self.start_bearing - angle)
        }
    }

    /// 圆心方位角是否落在弧上（`tolerance` 为弧长容差）
    pub fn contains_bearing(&self, bearing: f64, tolerance: f64) -> bool {
        let offset = if self.clockwise {
            math::normalize_angle(bearing - self.start_bearing)
        } else {
            math::normalize_angle(self.start_bearing - bearing)
        };
        let slack = tolerance / self.radius().max(EPSILON);
        offset <= self.sweep_angle() + slack || offset >= TAU - slack
    }

    /// 点（假定在圆上）是否落在弧上
    pub fn contains(&self, point: &Point2, tolerance: f64) -> bool {
        self.contains_bearing(math::bearing(&self.center(), point), tolerance)
    }

    /// 反向的弧
    pub fn reversed(&self) -> Self {
        Self {
            circle: self.circle,
            start_bearing: self.end_bearing,
            end_bearing: self.start_bearing,
            clockwise: !self.clockwise,
        }
    }
}

/// 线要素的几何：线段或圆弧
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LineGeometry {
    Segment(Segment),
    Arc(Arc),
}

impl LineGeometry {
    pub fn start(&self) -> Point2 {
        match self {
            LineGeometry::Segment(s) => s.start,
            LineGeometry::Arc(a) => a.start_point(),
        }
    }

    pub fn end(&self) -> Point2 {
        match self {
            LineGeometry::Segment(s) => s.end,
            LineGeometry::Arc(a) => a.end_point(),
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            LineGeometry::Segment(s) => s.length(),
            LineGeometry::Arc(a) => a.length(),
        }
    }

    /// 从起点沿线量取 `distance` 处的位置；超出范围返回 `None`
    pub fn position_at(&self, distance: f64) -> Option<Point2> {
        let length = self.length();
        if distance < -EPSILON || distance > length + EPSILON {
            return None;
        }
        let distance = distance.clamp(0.0, length);
        match self {
            LineGeometry::Segment(s) => {
                if length < EPSILON {
                    return Some(s.start);
                }
                Some(s.start + (s.end - s.start) * (distance / length))
            }
            LineGeometry::Arc(a) => Some(a.circle.point_at(a.bearing_after(distance / a.radius()))),
        }
    }

    /// 端点处沿行进方向的方位角（`at_end` 为 false 时取起点处、指向线外的方向）
    pub fn outward_bearing(&self, at_end: bool) -> f64 {
        match self {
            LineGeometry::Segment(s) => {
                if at_end {
                    math::bearing(&s.start, &s.end)
                } else {
                    math::bearing(&s.end, &s.start)
                }
            }
            LineGeometry::Arc(a) => {
                let quarter = std::f64::consts::FRAC_PI_2;
                // 顺时针走向的切线方位角 = 半径方位角 + 90°
                let (b, cw) = if at_end {
                    (a.end_bearing, a.clockwise)
                } else {
                    (a.start_bearing, !a.clockwise)
                };
                if cw {
                    math::normalize_angle(b + quarter)
                } else {
                    math::normalize_angle(b - quarter)
                }
            }
        }
    }

    /// 计算点到线的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        match self {
            LineGeometry::Segment(s) => s.distance_to_point(point),
            LineGeometry::Arc(a) => {
                if a.contains(point, 0.0) {
                    a.circle.distance_to_point(point).abs()
                } else {
                    let d1 = (point - a.start_point()).norm();
                    let d2 = (point - a.end_point()).norm();
                    d1.min(d2)
                }
            }
        }
    }

    /// 线上一点到起点的沿线距离；点离线超过 `tolerance` 时返回 `None`
    pub fn length_to(&self, point: &Point2, tolerance: f64) -> Option<f64> {
        if self.distance_to_point(point) > tolerance {
            return None;
        }
        match self {
            LineGeometry::Segment(s) => {
                let length = s.length();
                if length < EPSILON {
                    return Some(0.0);
                }
                let along = (point - s.start).dot(&(s.end - s.start)) / length;
                Some(along.clamp(0.0, length))
            }
            LineGeometry::Arc(a) => {
                let bearing = math::bearing(&a.center(), point);
                let offset = if a.clockwise {
                    math::normalize_angle(bearing - a.start_bearing)
                } else {
                    math::normalize_angle(a.start_bearing - bearing)
                };
                let sweep = a.sweep_angle();
                // 容差内超出弧端的点归到较近的端点
                let offset = if offset <= sweep {
                    offset
                } else if offset - sweep < TAU - offset {
                    sweep
                } else {
                    0.0
                };
                Some(offset * a.radius())
            }
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            LineGeometry::Segment(s) => LineGeometry::Segment(Segment::new(s.end, s.start)),
            LineGeometry::Arc(a) => LineGeometry::Arc(a.reversed()),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        let mut bbox = BoundingBox2::new(self.start(), self.start());
        bbox.expand_to_include(&self.end());
        if let LineGeometry::Arc(a) = self {
            // 检查象限点
            for quadrant in [0.0, 0.5, 1.0, 1.5] {
                let b = quadrant * std::f64::consts::PI;
                if a.contains_bearing(b, 0.0) {
                    bbox.expand_to_include(&a.circle.point_at(b));
                }
            }
        }
        bbox
    }
}

/// 文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGeometry {
    pub position: Point2,
    pub content: String,
    /// 字高（米）
    pub height: f64,
    /// 旋转角（弧度，从正东逆时针）
    pub rotation: f64,
}

impl TextGeometry {
    pub fn new(position: Point2, content: impl Into<String>, height: f64) -> Self {
        Self {
            position,
            content: content.into(),
            height,
            rotation: 0.0,
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }
}
