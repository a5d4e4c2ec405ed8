//! 测量观测值
//!
//! 编辑记录的输入由观测值组成：距离（带录入单位）和方向（方位角、
//! 后视角、偏转角、平行方向），方向还可以带一个偏移。
//! 观测值只保存引用的要素编号，位置在计算时由调用方提供。

use crate::coords::CoordinateSystem;
use crate::error::EditError;
use crate::feature::FeatureId;
use crate::input::{InputParser, ParseError};
use crate::math::{self, Point2};
use crate::units::{self, DistanceUnit};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// 观测距离
///
/// 以米保存地面距离，并记住录入时使用的单位以便回显。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub meters: f64,
    pub unit: DistanceUnit,
    /// 细分调整时保持不变的距离
    #[serde(default)]
    pub fixed: bool,
}

impl Distance {
    /// 以指定单位的数值创建
    pub fn new(value: f64, unit: DistanceUnit) -> Self {
        Self {
            meters: unit.to_meters(value),
            unit,
            fixed: false,
        }
    }

    pub fn meters(meters: f64) -> Self {
        Self::new(meters, DistanceUnit::Meters)
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// 解析 `100`、`100m`、`328ft` 之类的输入
    pub fn parse(input: &str, entry_unit: DistanceUnit) -> Result<Self, ParseError> {
        let (meters, unit) = InputParser::parse_distance(input, entry_unit)?;
        Ok(Self {
            meters,
            unit,
            fixed: false,
        })
    }

    /// 是否为有意义的正距离
    pub fn is_valid(&self) -> bool {
        self.meters.is_finite() && self.meters > 0.0
    }

    /// 取绝对值（从线尾量取时使用）
    pub fn positive(mut self) -> Self {
        self.meters = self.meters.abs();
        self
    }

    /// 在 `tolerance` 内相等
    pub fn approx_eq(&self, other: &Distance, tolerance: f64) -> bool {
        self.fixed == other.fixed && (self.meters - other.meters).abs() < tolerance
    }

    /// 换算为 `from` 到 `towards` 之间的平面距离
    pub fn planar(&self, from: &Point2, towards: &Point2, coords: &dyn CoordinateSystem) -> f64 {
        self.meters * coords.line_scale_factor(from, towards)
    }

    /// 按录入单位格式化
    pub fn format(&self) -> String {
        let mut s = self.unit.format(self.meters, true);
        if self.fixed {
            s.push('F');
        }
        s
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// 方向的偏移
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Offset {
    /// 垂直于方向的偏移距离（地面距离）
    Distance { distance: Distance, left: bool },
    /// 方向经过的偏移点
    Point { point: FeatureId },
}

/// 方向观测的种类
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectionKind {
    /// 从 `from` 出发的方位角
    Bearing { from: FeatureId, bearing: f64 },
    /// 在 `from` 处从后视点顺时针量取的角度（负值为逆时针）
    Angle { backsight: FeatureId, from: FeatureId, angle: f64 },
    /// 在 `from` 处相对后视线延长线的偏转角
    Deflection { backsight: FeatureId, from: FeatureId, angle: f64 },
    /// 经过 `from` 且平行于 `start`→`end` 的方向
    Parallel { from: FeatureId, start: FeatureId, end: FeatureId },
}

/// 方向观测
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub kind: DirectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
}

/// 方向在当前几何下的求值结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedDirection {
    /// 方向起点（已考虑偏移）
    pub start: Point2,
    /// 方位角
    pub bearing: f64,
}

impl Direction {
    pub fn bearing(from: FeatureId, bearing: f64) -> Self {
        Self {
            kind: DirectionKind::Bearing { from, bearing },
            offset: None,
        }
    }

    pub fn angle(backsight: FeatureId, from: FeatureId, angle: f64) -> Self {
        Self {
            kind: DirectionKind::Angle { backsight, from, angle },
            offset: None,
        }
    }

    pub fn deflection(backsight: FeatureId, from: FeatureId, angle: f64) -> Self {
        Self {
            kind: DirectionKind::Deflection { backsight, from, angle },
            offset: None,
        }
    }

    pub fn parallel(from: FeatureId, start: FeatureId, end: FeatureId) -> Self {
        Self {
            kind: DirectionKind::Parallel { from, start, end },
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 方向出发的点
    pub fn from(&self) -> FeatureId {
        match self.kind {
            DirectionKind::Bearing { from, .. }
            | DirectionKind::Angle { from, .. }
            | DirectionKind::Deflection { from, .. }
            | DirectionKind::Parallel { from, .. } => from,
        }
    }

    /// 引用的全部要素
    pub fn references(&self) -> Vec<FeatureId> {
        let mut refs = match self.kind {
            DirectionKind::Bearing { from, .. } => vec![from],
            DirectionKind::Angle { backsight, from, .. } | DirectionKind::Deflection { backsight, from, .. } => {
                vec![from, backsight]
            }
            DirectionKind::Parallel { from, start, end } => vec![from, start, end],
        };
        if let Some(Offset::Point { point }) = self.offset {
            refs.push(point);
        }
        refs
    }

    /// 观测值本身是否有意义
    pub fn is_valid(&self) -> bool {
        let value_ok = match self.kind {
            DirectionKind::Bearing { bearing, .. } => bearing.is_finite(),
            DirectionKind::Angle { angle, .. } | DirectionKind::Deflection { angle, .. } => angle.is_finite(),
            DirectionKind::Parallel { start, end, .. } => start != end,
        };
        let offset_ok = match self.offset {
            Some(Offset::Distance { distance, .. }) => distance.meters.is_finite() && distance.meters >= 0.0,
            _ => true,
        };
        value_ok && offset_ok
    }

    /// 用当前位置求方向的起点和方位角
    ///
    /// 后视点与测站重合，或平行方向的参考线两端重合时方向没有定义。
    pub fn resolve(
        &self,
        position: impl Fn(FeatureId) -> Result<Point2, EditError>,
        coords: &dyn CoordinateSystem,
    ) -> Result<ResolvedDirection, EditError> {
        let from = position(self.from())?;
        let bearing = match self.kind {
            DirectionKind::Bearing { bearing, .. } => math::normalize_angle(bearing),
            DirectionKind::Angle { backsight, from: station, angle } => {
                let bs = position(backsight)?;
                defined_bearing(&from, &bs, backsight, station)? + angle
            }
            DirectionKind::Deflection { backsight, from: station, angle } => {
                let bs = position(backsight)?;
                defined_bearing(&bs, &from, backsight, station)? + angle
            }
            DirectionKind::Parallel { start, end, .. } => {
                let s = position(start)?;
                let e = position(end)?;
                defined_bearing(&s, &e, start, end)?
            }
        };
        let bearing = math::normalize_angle(bearing);

        let start = match self.offset {
            None => from,
            Some(Offset::Point { point }) => position(point)?,
            Some(Offset::Distance { distance, left }) => {
                let signed = if left { -distance.meters } else { distance.meters };
                // 先按平面距离求近似垂足，再用线比例因子修正
                let perp = bearing + FRAC_PI_2;
                let approx = math::polar(&from, perp, signed);
                let sfac = coords.line_scale_factor(&from, &approx);
                math::polar(&from, perp, signed * sfac)
            }
        };

        Ok(ResolvedDirection { start, bearing })
    }

    /// 审计显示用的简短描述
    pub fn describe(&self) -> String {
        let base = match self.kind {
            DirectionKind::Bearing { from, bearing } => format!("{} from {}", units::format_dms(bearing), from),
            DirectionKind::Angle { backsight, from, angle } => {
                format!("{} at {} from backsight {}", units::format_dms(angle), from, backsight)
            }
            DirectionKind::Deflection { backsight, from, angle } => {
                format!("deflection {} at {} from {}", units::format_dms(angle), from, backsight)
            }
            DirectionKind::Parallel { from, start, end } => format!("parallel to {}-{} from {}", start, end, from),
        };
        match self.offset {
            None => base,
            Some(Offset::Distance { distance, left }) => {
                format!("{} offset {} {}", base, distance, if left { "L" } else { "R" })
            }
            Some(Offset::Point { point }) => format!("{} through {}", base, point),
        }
    }
}

/// 两个不重合的点之间的方位角
fn defined_bearing(from: &Point2, to: &Point2, a: FeatureId, b: FeatureId) -> Result<f64, EditError> {
    if math::distance(from, to) < math::TINY {
        return Err(EditError::InvalidObservation(format!(
            "direction is undefined: {} and {} coincide",
            a, b
        )));
    }
    Ok(math::bearing(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{ConstantScale, PlaneSystem};
    use std::collections::HashMap;

    fn lookup(points: &HashMap<FeatureId, Point2>) -> impl Fn(FeatureId) -> Result<Point2, EditError> + '_ {
        move |id| points.get(&id).copied().ok_or(EditError::MissingFeature(id))
    }

    fn sample() -> HashMap<FeatureId, Point2> {
        HashMap::from([
            (FeatureId(1), Point2::new(0.0, 0.0)),
            (FeatureId(2), Point2::new(0.0, 100.0)),
            (FeatureId(3), Point2::new(50.0, 50.0)),
            (FeatureId(4), Point2::new(60.0, 50.0)),
        ])
    }

    #[test]
    fn test_distance_parse_and_format() {
        let d = Distance::parse("100ft", DistanceUnit::Meters).unwrap();
        assert!((d.meters - 30.48).abs() < 1e-9);
        assert_eq!(d.format(), "100ft");
        assert!(d.is_valid());
        assert!(!Distance::meters(0.0).is_valid());
        assert!(!Distance::meters(f64::NAN).is_valid());
    }

    #[test]
    fn test_distance_planar() {
        let d = Distance::meters(100.0);
        let sys = ConstantScale { factor: 0.9996 };
        let planar = d.planar(&Point2::origin(), &Point2::new(100.0, 0.0), &sys);
        assert!((planar - 99.96).abs() < 1e-9);
    }

    #[test]
    fn test_angle_direction() {
        let points = sample();
        // 在点1 后视点2（正北），顺时针 90° 指向正东
        let dir = Direction::angle(FeatureId(2), FeatureId(1), FRAC_PI_2);
        let r = dir.resolve(lookup(&points), &PlaneSystem).unwrap();
        assert!((r.bearing - FRAC_PI_2).abs() < 1e-12);
        assert_eq!(r.start, Point2::origin());
    }

    #[test]
    fn test_deflection_direction() {
        let points = sample();
        // 从点2 到点1 的延长线朝南，右偏 90° 朝西
        let dir = Direction::deflection(FeatureId(2), FeatureId(1), FRAC_PI_2);
        let r = dir.resolve(lookup(&points), &PlaneSystem).unwrap();
        assert!((r.bearing - 3.0 * FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_direction() {
        let points = sample();
        let dir = Direction::parallel(FeatureId(1), FeatureId(3), FeatureId(4));
        let r = dir.resolve(lookup(&points), &PlaneSystem).unwrap();
        assert!((r.bearing - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_offset_distance_right() {
        let points = sample();
        let dir = Direction::bearing(FeatureId(1), 0.0).with_offset(Offset::Distance {
            distance: Distance::meters(10.0),
            left: false,
        });
        let r = dir.resolve(lookup(&points), &PlaneSystem).unwrap();
        assert!((r.start - Point2::new(10.0, 0.0)).norm() < 1e-9);

        let left = Direction::bearing(FeatureId(1), 0.0).with_offset(Offset::Distance {
            distance: Distance::meters(10.0),
            left: true,
        });
        let r = left.resolve(lookup(&points), &PlaneSystem).unwrap();
        assert!((r.start - Point2::new(-10.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_offset_point() {
        let points = sample();
        let dir = Direction::bearing(FeatureId(1), 0.0).with_offset(Offset::Point { point: FeatureId(3) });
        let r = dir.resolve(lookup(&points), &PlaneSystem).unwrap();
        assert_eq!(r.start, Point2::new(50.0, 50.0));
        assert!(dir.references().contains(&FeatureId(3)));
    }

    #[test]
    fn test_missing_reference_propagates() {
        let points = sample();
        let dir = Direction::angle(FeatureId(9), FeatureId(1), 0.0);
        assert_eq!(
            dir.resolve(lookup(&points), &PlaneSystem),
            Err(EditError::MissingFeature(FeatureId(9)))
        );
    }

    #[test]
    fn test_coincident_points_leave_direction_undefined() {
        let mut points = sample();
        points.insert(FeatureId(5), Point2::new(50.0, 50.0));
        let undefined = |dir: Direction| {
            matches!(
                dir.resolve(lookup(&points), &PlaneSystem),
                Err(EditError::InvalidObservation(_))
            )
        };
        // 后视点就是测站本身
        assert!(undefined(Direction::angle(FeatureId(1), FeatureId(1), 0.5)));
        assert!(undefined(Direction::deflection(FeatureId(3), FeatureId(5), 0.5)));
        // 参考线两端位置相同
        assert!(undefined(Direction::parallel(FeatureId(1), FeatureId(3), FeatureId(5))));
        assert!(!undefined(Direction::parallel(FeatureId(1), FeatureId(3), FeatureId(4))));
    }

    #[test]
    fn test_direction_validity() {
        assert!(Direction::bearing(FeatureId(1), 1.0).is_valid());
        assert!(!Direction::bearing(FeatureId(1), f64::INFINITY).is_valid());
        assert!(!Direction::parallel(FeatureId(1), FeatureId(2), FeatureId(2)).is_valid());
    }
}
