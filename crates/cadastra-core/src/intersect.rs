//! 交会求解器
//!
//! 两个几何约束求交点。约束可以是：
//! - 方向射线（从已知点出发的方位角）
//! - 距离圆（以已知点为圆心）
//! - 已有的线（线段或圆弧）
//!
//! 结果为 0 个（无解）、1 个（相切或唯一解）或 2 个候选点。
//! 无解不是错误，由调用方决定如何提示。
//!
//! 候选点的顺序与约束的给出顺序无关：
//! - 方向与圆/线：沿射线由近到远
//! - 圆与圆：按从任一圆心量得的最小方位角从小到大
//! - 其余组合：按坐标排序

use crate::coords::CoordinateSystem;
use crate::geometry::{Circle, LineGeometry};
use crate::math::{self, Point2, Vector2, EPSILON};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// 求解器参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverParams {
    /// 相切判断容差（米）
    pub tolerance: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

/// 平面上的几何约束
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// 从 `start` 出发、方位角为 `bearing` 的射线
    Direction { start: Point2, bearing: f64 },
    /// 距离圆
    Circle(Circle),
    /// 已有的线
    Line(LineGeometry),
}

/// 多解时的取舍方式
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Choice {
    /// 取第一个候选点
    #[default]
    Default,
    /// 取第二个候选点（只有一个时取该点）
    Alternate,
    /// 取离提示点最近的候选点
    Near { point: Point2 },
}

impl Choice {
    pub fn near(point: Point2) -> Self {
        Choice::Near { point }
    }
}

/// 交点集合，最多两个
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intersections {
    points: Vec<Point2>,
}

impl Intersections {
    pub fn none() -> Self {
        Self::default()
    }

    fn from_vec(points: Vec<Point2>) -> Self {
        debug_assert!(points.len() <= 2, "at most two intersections");
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point2> {
        self.points.get(index).copied()
    }

    pub fn as_slice(&self) -> &[Point2] {
        &self.points
    }

    /// 按取舍方式选出一个点
    pub fn choose(&self, choice: &Choice) -> Option<Point2> {
        match choice {
            Choice::Default => self.get(0),
            Choice::Alternate => self.get(1).or_else(|| self.get(0)),
            Choice::Near { point } => self.nearest(point),
        }
    }

    /// 离 `hint` 最近的点
    pub fn nearest(&self, hint: &Point2) -> Option<Point2> {
        self.points
            .iter()
            .copied()
            .min_by(|a, b| (a - hint).norm().total_cmp(&(b - hint).norm()))
    }
}

/// 两个约束求交
pub fn intersect(a: &Constraint, b: &Constraint, params: &SolverParams) -> Intersections {
    use Constraint::*;
    let tol = params.tolerance;
    let result = match (a, b) {
        (Direction { start: s1, bearing: b1 }, Direction { start: s2, bearing: b2 }) => {
            direction_direction(s1, *b1, s2, *b2, tol)
        }
        (Direction { start, bearing }, Circle(c)) | (Circle(c), Direction { start, bearing }) => {
            direction_circle(start, *bearing, c, tol)
        }
        (Direction { start, bearing }, Line(l)) | (Line(l), Direction { start, bearing }) => {
            direction_line(start, *bearing, l, tol)
        }
        (Circle(c1), Circle(c2)) => circle_circle(c1, c2, tol),
        (Circle(c), Line(l)) | (Line(l), Circle(c)) => circle_line(c, l, tol),
        (Line(l1), Line(l2)) => line_line(l1, l2, tol),
    };
    debug!("intersection {:?} x {:?}: {} candidate(s)", kind_name(a), kind_name(b), result.len());
    result
}

fn kind_name(c: &Constraint) -> &'static str {
    match c {
        Constraint::Direction { .. } => "direction",
        Constraint::Circle(_) => "circle",
        Constraint::Line(_) => "line",
    }
}

/// 两条方向射线求交；平行或交点在任一起点之后时无解
pub fn direction_direction(s1: &Point2, b1: f64, s2: &Point2, b2: f64, tol: f64) -> Intersections {
    let (sin1, cos1) = b1.sin_cos();
    let (sin2, cos2) = b2.sin_cos();
    let det = sin2 * cos1 - sin1 * cos2;
    if det.abs() < EPSILON {
        return Intersections::none();
    }

    let dx = s2.x - s1.x;
    let dy = s2.y - s1.y;
    // 沿第一条射线的距离
    let t1 = (sin2 * dy - cos2 * dx) / det;
    let p = Point2::new(s1.x + sin1 * t1, s1.y + cos1 * t1);
    // 沿第二条射线的距离
    let t2 = (p - s2).dot(&math::unit(b2));

    if t1 < -tol || t2 < -tol {
        return Intersections::none();
    }
    Intersections::from_vec(vec![p])
}

/// 无限直线 `origin + t·dir`（`dir` 为单位向量）与圆求交，返回参数 t
fn line_params_circle(origin: &Point2, dir: &Vector2, circle: &Circle, tol: f64) -> Vec<f64> {
    let to_center = circle.center - origin;
    let along = to_center.dot(dir);
    // 圆心到直线的垂距
    let off = (to_center.x * dir.y - to_center.y * dir.x).abs();
    let r = circle.radius;

    if off > r + tol {
        return Vec::new();
    }
    if (off - r).abs() <= tol {
        return vec![along];
    }
    let h = (r * r - off * off).max(0.0).sqrt();
    vec![along - h, along + h]
}

/// 方向射线与圆求交，近的在前
pub fn direction_circle(start: &Point2, bearing: f64, circle: &Circle, tol: f64) -> Intersections {
    let dir = math::unit(bearing);
    let points = line_params_circle(start, &dir, circle, tol)
        .into_iter()
        .filter(|t| *t >= -tol)
        .map(|t| start + dir * t.max(0.0))
        .collect();
    Intersections::from_vec(points)
}

/// 方向射线与已有线求交，近的在前
pub fn direction_line(start: &Point2, bearing: f64, line: &LineGeometry, tol: f64) -> Intersections {
    match line {
        LineGeometry::Segment(seg) => {
            let len = seg.length();
            if len < EPSILON {
                return Intersections::none();
            }
            let r = direction_direction(start, bearing, &seg.start, seg.bearing(), tol);
            match r.get(0) {
                Some(p) if (p - seg.start).norm() <= len + tol => r,
                _ => Intersections::none(),
            }
        }
        LineGeometry::Arc(arc) => {
            let mut points: Vec<Point2> = direction_circle(start, bearing, &arc.circle, tol).points;
            points.retain(|p| arc.contains(p, tol));
            Intersections::from_vec(points)
        }
    }
}

/// 两圆求交
///
/// 相离、内含或同心时无解；外切或内切（在容差内）时一个解。
pub fn circle_circle(c1: &Circle, c2: &Circle, tol: f64) -> Intersections {
    let d = math::distance(&c1.center, &c2.center);
    if d < EPSILON {
        return Intersections::none();
    }

    let (r1, r2) = (c1.radius, c2.radius);
    let sum = r1 + r2;
    let diff = (r1 - r2).abs();
    if d > sum + tol || d < diff - tol {
        return Intersections::none();
    }

    let u = (c2.center - c1.center) / d;
    // 交点弦中点到第一个圆心的距离
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let mid = c1.center + u * a;

    if (d - sum).abs() <= tol || (d - diff).abs() <= tol {
        return Intersections::from_vec(vec![mid]);
    }

    let h = (r1 * r1 - a * a).max(0.0).sqrt();
    let perp = Vector2::new(-u.y, u.x);
    let mut points = vec![mid + perp * h, mid - perp * h];

    // 以从任一圆心量得的最小方位角排序，与圆的给出顺序无关
    let key = |p: &Point2| math::bearing(&c1.center, p).min(math::bearing(&c2.center, p));
    points.sort_by(|p, q| key(p).total_cmp(&key(q)));
    Intersections::from_vec(points)
}

/// 圆与已有线求交
pub fn circle_line(circle: &Circle, line: &LineGeometry, tol: f64) -> Intersections {
    let mut points = match line {
        LineGeometry::Segment(seg) => {
            let len = seg.length();
            if len < EPSILON {
                return Intersections::none();
            }
            let dir = seg.direction();
            line_params_circle(&seg.start, &dir, circle, tol)
                .into_iter()
                .filter(|t| *t >= -tol && *t <= len + tol)
                .map(|t| seg.start + dir * t.clamp(0.0, len))
                .collect()
        }
        LineGeometry::Arc(arc) => {
            let mut points = circle_circle(circle, &arc.circle, tol).points;
            points.retain(|p| arc.contains(p, tol));
            points
        }
    };
    sort_by_coordinates(&mut points);
    Intersections::from_vec(points)
}

/// 两条已有线求交
pub fn line_line(l1: &LineGeometry, l2: &LineGeometry, tol: f64) -> Intersections {
    let mut points: Vec<Point2> = match (l1, l2) {
        (LineGeometry::Segment(s1), LineGeometry::Segment(_)) => {
            let len1 = s1.length();
            if len1 < EPSILON {
                return Intersections::none();
            }
            direction_line(&s1.start, s1.bearing(), l2, tol)
                .points
                .into_iter()
                .filter(|p| (p - s1.start).norm() <= len1 + tol)
                .collect()
        }
        (LineGeometry::Segment(_), LineGeometry::Arc(arc)) | (LineGeometry::Arc(arc), LineGeometry::Segment(_)) => {
            let seg = if let LineGeometry::Segment(_) = l1 { l1 } else { l2 };
            let mut points = circle_line(&arc.circle, seg, tol).points;
            points.retain(|p| arc.contains(p, tol));
            points
        }
        (LineGeometry::Arc(a1), LineGeometry::Arc(a2)) => {
            let mut points = circle_circle(&a1.circle, &a2.circle, tol).points;
            points.retain(|p| a1.contains(p, tol) && a2.contains(p, tol));
            points
        }
    };
    sort_by_coordinates(&mut points);
    Intersections::from_vec(points)
}

fn sort_by_coordinates(points: &mut [Point2]) {
    points.sort_by(|p, q| match p.x.total_cmp(&q.x) {
        Ordering::Equal => p.y.total_cmp(&q.y),
        other => other,
    });
}

/// 以地面观测值表示的约束
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observed {
    Direction { start: Point2, bearing: f64 },
    /// 地面距离
    Distance { center: Point2, ground: f64 },
    Line(LineGeometry),
}

impl Observed {
    /// 按比例因子换算成平面约束；`towards` 为求比例因子时线的另一端
    fn to_plane(self, towards: Option<&Point2>, coords: &dyn CoordinateSystem) -> Constraint {
        match self {
            Observed::Direction { start, bearing } => Constraint::Direction { start, bearing },
            Observed::Distance { center, ground } => {
                let end = towards.unwrap_or(&center);
                let sfac = coords.line_scale_factor(&center, end);
                Constraint::Circle(Circle::new(center, ground * sfac))
            }
            Observed::Line(line) => Constraint::Line(line),
        }
    }

    fn has_distance(&self) -> bool {
        matches!(self, Observed::Distance { .. })
    }
}

/// 求解结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solution {
    /// 全部候选点
    pub candidates: Intersections,
    /// 按取舍方式选中的点
    pub position: Option<Point2>,
}

/// 用地面观测值求交
///
/// 距离先按圆心处的比例因子换算求出近似解，再用圆心到近似解的线比例因子
/// 重新换算并求最终解。
pub fn solve_observed(
    a: &Observed,
    b: &Observed,
    choice: &Choice,
    coords: &dyn CoordinateSystem,
    params: &SolverParams,
) -> Solution {
    let first = intersect(&a.to_plane(None, coords), &b.to_plane(None, coords), params);
    let approx = first.choose(choice);

    if !(a.has_distance() || b.has_distance()) {
        return Solution {
            position: approx,
            candidates: first,
        };
    }

    let Some(approx) = approx else {
        return Solution::default();
    };

    let candidates = intersect(
        &a.to_plane(Some(&approx), coords),
        &b.to_plane(Some(&approx), coords),
        params,
    );
    // 第二次求解保持与第一次相同的取舍
    let position = match choice {
        Choice::Near { .. } => candidates.choose(choice),
        _ => candidates.nearest(&approx),
    };
    Solution { candidates, position }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{ConstantScale, PlaneSystem};
    use crate::geometry::{Arc, Segment};
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    const TOL: f64 = 1e-6;

    fn circle(x: f64, y: f64, r: f64) -> Constraint {
        Constraint::Circle(Circle::new(Point2::new(x, y), r))
    }

    fn params() -> SolverParams {
        SolverParams::default()
    }

    #[test]
    fn test_two_circles_two_candidates() {
        let r = intersect(&circle(0.0, 0.0, 70.71), &circle(100.0, 0.0, 70.71), &params());
        assert_eq!(r.len(), 2);
        let hint = Point2::new(50.0, 40.0);
        let chosen = r.choose(&Choice::near(hint)).unwrap();
        assert!((chosen.x - 50.0).abs() < 1e-9);
        assert!((chosen.y - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_two_circles_too_far_apart() {
        let r = intersect(&circle(0.0, 0.0, 50.0), &circle(200.0, 0.0, 50.0), &params());
        assert!(r.is_empty());
    }

    #[test]
    fn test_two_circles_one_inside_other() {
        let r = intersect(&circle(0.0, 0.0, 100.0), &circle(10.0, 0.0, 20.0), &params());
        assert!(r.is_empty());
    }

    #[test]
    fn test_two_circles_feasibility_boundary() {
        // 外切
        let r = intersect(&circle(0.0, 0.0, 40.0), &circle(100.0, 0.0, 60.0), &params());
        assert_eq!(r.len(), 1);
        assert!((r.get(0).unwrap() - Point2::new(40.0, 0.0)).norm() < 1e-9);

        // 容差内仍视为相切
        let r = intersect(&circle(0.0, 0.0, 40.0), &circle(100.0, 0.0, 60.0 - 1e-7), &params());
        assert_eq!(r.len(), 1);

        // 内切
        let r = intersect(&circle(0.0, 0.0, 100.0), &circle(40.0, 0.0, 60.0), &params());
        assert_eq!(r.len(), 1);
        assert!((r.get(0).unwrap() - Point2::new(100.0, 0.0)).norm() < 1e-9);

        // 略超出容差则有两个解
        let r = intersect(&circle(0.0, 0.0, 40.0), &circle(100.0, 0.0, 60.001), &params());
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_circle_order_is_symmetric() {
        let a = circle(10.0, 20.0, 80.0);
        let b = circle(90.0, -15.0, 55.0);
        let ab = intersect(&a, &b, &params());
        let ba = intersect(&b, &a, &params());
        assert_eq!(ab.len(), 2);
        for i in 0..2 {
            assert!((ab.get(i).unwrap() - ba.get(i).unwrap()).norm() < 1e-9);
        }
    }

    #[test]
    fn test_direction_direction() {
        let a = Constraint::Direction {
            start: Point2::origin(),
            bearing: FRAC_PI_4,
        };
        let b = Constraint::Direction {
            start: Point2::new(100.0, 0.0),
            bearing: 7.0 * FRAC_PI_4,
        };
        let r = intersect(&a, &b, &params());
        assert_eq!(r.len(), 1);
        assert!((r.get(0).unwrap() - Point2::new(50.0, 50.0)).norm() < 1e-9);

        let ba = intersect(&b, &a, &params());
        assert!((ba.get(0).unwrap() - Point2::new(50.0, 50.0)).norm() < 1e-9);
    }

    #[test]
    fn test_parallel_directions() {
        let a = Constraint::Direction {
            start: Point2::origin(),
            bearing: 0.0,
        };
        let b = Constraint::Direction {
            start: Point2::new(10.0, 0.0),
            bearing: 0.0,
        };
        assert!(intersect(&a, &b, &params()).is_empty());
    }

    #[test]
    fn test_directions_meeting_behind() {
        // 两条射线的延长线在起点后方相交
        let a = Constraint::Direction {
            start: Point2::origin(),
            bearing: 5.0 * FRAC_PI_4,
        };
        let b = Constraint::Direction {
            start: Point2::new(100.0, 0.0),
            bearing: 3.0 * FRAC_PI_4,
        };
        assert!(intersect(&a, &b, &params()).is_empty());
    }

    #[test]
    fn test_direction_circle() {
        let ray = Constraint::Direction {
            start: Point2::new(-100.0, 0.0),
            bearing: FRAC_PI_2,
        };
        let r = intersect(&ray, &circle(0.0, 0.0, 10.0), &params());
        assert_eq!(r.len(), 2);
        // 近的在前
        assert!((r.get(0).unwrap() - Point2::new(-10.0, 0.0)).norm() < 1e-9);
        assert!((r.get(1).unwrap() - Point2::new(10.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_direction_from_inside_circle() {
        let r = direction_circle(&Point2::origin(), 0.0, &Circle::new(Point2::origin(), 10.0), TOL);
        assert_eq!(r.len(), 1);
        assert!((r.get(0).unwrap() - Point2::new(0.0, 10.0)).norm() < 1e-9);
    }

    #[test]
    fn test_direction_tangent_and_miss() {
        let tangent = direction_circle(&Point2::new(-100.0, 10.0), FRAC_PI_2, &Circle::new(Point2::origin(), 10.0), TOL);
        assert_eq!(tangent.len(), 1);
        let miss = direction_circle(&Point2::new(-100.0, 11.0), FRAC_PI_2, &Circle::new(Point2::origin(), 10.0), TOL);
        assert!(miss.is_empty());
        let away = direction_circle(&Point2::new(-100.0, 0.0), 3.0 * FRAC_PI_2, &Circle::new(Point2::origin(), 10.0), TOL);
        assert!(away.is_empty());
    }

    #[test]
    fn test_direction_segment() {
        let seg = LineGeometry::Segment(Segment::new(Point2::new(50.0, -10.0), Point2::new(50.0, 10.0)));
        let hit = direction_line(&Point2::origin(), FRAC_PI_2, &seg, TOL);
        assert_eq!(hit.len(), 1);
        assert!((hit.get(0).unwrap() - Point2::new(50.0, 0.0)).norm() < 1e-9);

        let miss = direction_line(&Point2::new(0.0, 20.0), FRAC_PI_2, &seg, TOL);
        assert!(miss.is_empty());
    }

    #[test]
    fn test_direction_arc() {
        // 四分之一圆弧，从正北顺时针到正东
        let arc = LineGeometry::Arc(Arc::from_points(
            Point2::origin(),
            Point2::new(0.0, 10.0),
            Point2::new(10.0, 0.0),
            true,
        ));
        let r = direction_line(&Point2::new(-20.0, 5.0), FRAC_PI_2, &arc, TOL);
        assert_eq!(r.len(), 1);
        assert!(r.get(0).unwrap().x > 0.0);
    }

    #[test]
    fn test_circle_segment() {
        let seg = LineGeometry::Segment(Segment::new(Point2::new(-20.0, 0.0), Point2::new(5.0, 0.0)));
        let r = circle_line(&Circle::new(Point2::origin(), 10.0), &seg, TOL);
        assert_eq!(r.len(), 1);
        assert!((r.get(0).unwrap() - Point2::new(-10.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_line_line() {
        let a = LineGeometry::Segment(Segment::new(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0)));
        let b = LineGeometry::Segment(Segment::new(Point2::new(0.0, 10.0), Point2::new(10.0, 0.0)));
        let r = intersect(&Constraint::Line(a), &Constraint::Line(b), &params());
        assert_eq!(r.len(), 1);
        assert!((r.get(0).unwrap() - Point2::new(5.0, 5.0)).norm() < 1e-9);

        let c = LineGeometry::Segment(Segment::new(Point2::new(20.0, 0.0), Point2::new(30.0, 10.0)));
        assert!(line_line(&a, &c, TOL).is_empty());
    }

    #[test]
    fn test_segment_arc() {
        let arc = LineGeometry::Arc(Arc::from_points(
            Point2::origin(),
            Point2::new(0.0, 10.0),
            Point2::new(0.0, -10.0),
            true,
        ));
        let seg = LineGeometry::Segment(Segment::new(Point2::new(-20.0, 0.0), Point2::new(20.0, 0.0)));
        let r = line_line(&seg, &arc, TOL);
        assert_eq!(r.len(), 1);
        assert!((r.get(0).unwrap() - Point2::new(10.0, 0.0)).norm() < 1e-9);
        assert_eq!(line_line(&arc, &seg, TOL), r);
    }

    #[test]
    fn test_choice_alternate_falls_back() {
        let one = Intersections::from_vec(vec![Point2::new(1.0, 2.0)]);
        assert_eq!(one.choose(&Choice::Alternate), Some(Point2::new(1.0, 2.0)));
        assert_eq!(Intersections::none().choose(&Choice::Default), None);
    }

    #[test]
    fn test_solve_observed_applies_scale_factor() {
        let sys = ConstantScale { factor: 0.5 };
        let a = Observed::Distance {
            center: Point2::origin(),
            ground: 200.0,
        };
        let b = Observed::Direction {
            start: Point2::origin(),
            bearing: 0.0,
        };
        let sol = solve_observed(&a, &b, &Choice::Default, &sys, &params());
        let p = sol.position.unwrap();
        assert!((p - Point2::new(0.0, 100.0)).norm() < 1e-9);
    }

    #[test]
    fn test_solve_observed_near_tangent_needs_scale() {
        // 地面距离下两圆相交，换算到平面后相离
        let sys = ConstantScale { factor: 0.9 };
        let a = Observed::Distance {
            center: Point2::origin(),
            ground: 60.0,
        };
        let b = Observed::Distance {
            center: Point2::new(100.0, 0.0),
            ground: 50.0,
        };
        let plane = solve_observed(&a, &b, &Choice::Default, &PlaneSystem, &params());
        assert_eq!(plane.candidates.len(), 2);
        let scaled = solve_observed(&a, &b, &Choice::Default, &sys, &params());
        assert!(scaled.candidates.is_empty());
        assert!(scaled.position.is_none());
    }

    #[test]
    fn test_alternate_is_stable_between_passes() {
        let sys = ConstantScale { factor: 0.9996 };
        let a = Observed::Distance {
            center: Point2::origin(),
            ground: 70.71,
        };
        let b = Observed::Distance {
            center: Point2::new(100.0, 0.0),
            ground: 70.71,
        };
        let first = solve_observed(&a, &b, &Choice::Default, &sys, &params()).position.unwrap();
        let second = solve_observed(&a, &b, &Choice::Alternate, &sys, &params()).position.unwrap();
        assert!((first - second).norm() > 50.0);
        assert!(first.y > 0.0 && second.y < 0.0);
    }
}
