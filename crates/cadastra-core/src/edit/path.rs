//! 连接导线
//!
//! 从一个已知点出发，按若干段（leg）的起始角和各边距离推算到另一个已知点。
//! 推算终点与已知终点一般不重合，按整体旋转和比例把导线配合到两点之间：
//!
//! ```text
//!   from ──▶ p1 ──▶ p2 ──▶ ... ──▶ to
//!   各边方位角 + rotation，各边长度 × scale
//! ```

use super::{EditContext, EditPayload, Endpoint, Outcome, Role};
use crate::coords::CoordinateSystem;
use crate::error::EditError;
use crate::feature::{EntityTypeId, FeatureId, FeatureKind};
use crate::math::{self, Point2, TINY};
use crate::observation::Distance;
use crate::units;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 导线的一段：起始角和若干条边
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// 相对前一段的转角；第一段忽略
    #[serde(default)]
    pub start_angle: f64,
    /// 起始角为偏转角
    #[serde(default)]
    pub deflection: bool,
    pub spans: Vec<Distance>,
}

impl Leg {
    /// 由上一段的方位角求本段方位角
    fn add_start_angle(&self, bearing: f64) -> f64 {
        if self.start_angle.abs() < TINY {
            bearing
        } else if self.deflection {
            math::normalize_angle(bearing + self.start_angle)
        } else {
            math::normalize_angle(bearing + self.start_angle - PI)
        }
    }
}

/// 导线配合结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    /// 北坐标闭合差
    pub dn: f64,
    /// 东坐标闭合差
    pub de: f64,
    /// 推算的导线全长（地面）
    pub length: f64,
    /// 相对精度 1:precision；无闭合差时为 0
    pub precision: f64,
    /// 整体旋转角
    pub rotation: f64,
    /// 整体比例
    pub scale: f64,
}

/// 按观测值推算各边端点（从原点、方位角 0 起算），返回 (方位角, 距离) 序列
fn traverse(legs: &[Leg]) -> Vec<(f64, f64)> {
    let mut bearing = 0.0;
    let mut spans = Vec::new();
    for (i, leg) in legs.iter().enumerate() {
        if i > 0 {
            bearing = leg.add_start_angle(bearing);
        }
        spans.extend(leg.spans.iter().map(|d| (bearing, d.meters)));
    }
    spans
}

/// 计算导线配合
pub fn adjust(legs: &[Leg], from: &Point2, to: &Point2, coords: &dyn CoordinateSystem) -> Result<Adjustment, EditError> {
    let spans = traverse(legs);
    let got_end = spans
        .iter()
        .fold(Point2::origin(), |p, (bearing, d)| math::polar(&p, *bearing, *d));
    let got_dist = math::distance(&Point2::origin(), &got_end);
    if got_dist < TINY {
        return Err(EditError::InvalidObservation("connection path closes on itself".to_string()));
    }
    let got_bear = math::bearing(&Point2::origin(), &got_end);

    let want_dist = math::distance(from, to);
    if want_dist < TINY {
        return Err(EditError::InvalidObservation(
            "connection path must join two different points".to_string(),
        ));
    }
    let want_bear = math::bearing(from, to);
    let rotation = want_bear - got_bear;

    // 推算终点换到平面上
    let approx = math::polar(from, want_bear, got_dist);
    let line_fac = coords.line_scale_factor(from, &approx);
    let end = math::polar(from, want_bear, got_dist * line_fac);

    let dn = to.y - end.y;
    let de = to.x - end.x;
    let delta = dn.hypot(de);
    let precision = if delta < TINY { 0.0 } else { want_dist / delta };

    Ok(Adjustment {
        dn,
        de,
        length: got_dist,
        precision,
        rotation,
        scale: want_dist / got_dist,
    })
}

/// 连接导线编辑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathData {
    pub from: FeatureId,
    pub to: FeatureId,
    pub legs: Vec<Leg>,
    pub point_entity: EntityTypeId,
    pub line_entity: EntityTypeId,
}

impl PathData {
    pub fn span_count(&self) -> usize {
        self.legs.iter().map(|l| l.spans.len()).sum()
    }
}

impl EditPayload for PathData {
    fn references(&self) -> Vec<FeatureId> {
        vec![self.from, self.to]
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.span_count() == 0 {
            return Err(EditError::InvalidObservation("connection path has no spans".to_string()));
        }
        for d in self.legs.iter().flat_map(|l| &l.spans) {
            ctx.distance(d)?;
        }
        if self.legs.iter().any(|l| !l.start_angle.is_finite()) {
            return Err(EditError::InvalidObservation("undefined start angle".to_string()));
        }
        let point_entity = ctx.entity(self.point_entity, FeatureKind::Point)?;
        let line_entity = ctx.entity(self.line_entity, FeatureKind::Line)?;
        let from = ctx.point(self.from)?;
        let to = ctx.point(self.to)?;

        let adj = adjust(&self.legs, &from, &to, ctx.coords)?;
        let spans = traverse(&self.legs);

        let mut outcome = Outcome::new();
        let mut pos = from;
        let mut prev = Endpoint::Existing(self.from);
        let last = spans.len() - 1;
        for (i, (bearing, d)) in spans.iter().enumerate() {
            let index = i as u32 + 1;
            let next = if i == last {
                Endpoint::Existing(self.to)
            } else {
                pos = math::polar(&pos, math::normalize_angle(bearing + adj.rotation), d * adj.scale);
                let role = Role::indexed("Point", index);
                outcome.add_point(role, point_entity, pos);
                Endpoint::Created(role)
            };
            outcome.add_line(Role::indexed("Line", index), line_entity, prev, next, None);
            prev = next;
        }
        if last > 0 {
            outcome.primary = Some(Role::indexed("Point", 1));
        }
        Ok(outcome)
    }

    fn describe(&self) -> String {
        let legs: Vec<String> = self
            .legs
            .iter()
            .map(|leg| {
                let spans: Vec<String> = leg.spans.iter().map(|d| d.to_string()).collect();
                if leg.start_angle.abs() < TINY {
                    spans.join(" ")
                } else {
                    format!(
                        "{}{} {}",
                        units::format_dms(leg.start_angle),
                        if leg.deflection { "d" } else { "" },
                        spans.join(" ")
                    )
                }
            })
            .collect();
        format!("path {} to {}: {}", self.from, self.to, legs.join(" / "))
    }
}
