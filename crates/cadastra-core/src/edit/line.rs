//! 沿已有线的编辑：线上定点、附着点、线段细分、线延长

use super::{add_sections, ArcSpec, EditContext, EditPayload, Endpoint, Outcome, Role, TO};
use crate::error::EditError;
use crate::feature::{EntityTypeId, FeatureId, FeatureKind};
use crate::geometry::LineGeometry;
use crate::math::{self, Point2, TAU};
use crate::observation::Distance;
use serde::{Deserialize, Serialize};

pub const EXTENSION: Role = Role::new("Extension");

/// 线两端之间的比例因子
fn line_scale(ctx: &EditContext<'_>, geometry: &LineGeometry) -> f64 {
    ctx.coords.line_scale_factor(&geometry.start(), &geometry.end())
}

/// 线上定点：从线的一端量取距离，在该处分割线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOnLineData {
    pub line: FeatureId,
    pub distance: Distance,
    /// 从线的终点量取
    #[serde(default)]
    pub from_end: bool,
    pub point_entity: EntityTypeId,
}

impl EditPayload for PointOnLineData {
    fn references(&self) -> Vec<FeatureId> {
        vec![self.line]
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        let (topology, geometry, line_entity) = ctx.line(self.line)?;
        let ground = ctx.distance(&self.distance)?;
        let entity = ctx.entity(self.point_entity, FeatureKind::Point)?;

        let length = geometry.length();
        let planar = ground * line_scale(ctx, &geometry);
        let tol = ctx.tolerance();
        if planar >= length - tol {
            return Err(EditError::InvalidObservation(format!(
                "distance {} is not shorter than line {}",
                self.distance, self.line
            )));
        }
        let along = if self.from_end { length - planar } else { planar };
        let position = geometry.position_at(along).ok_or(EditError::NoSolution)?;

        let mut outcome = Outcome::with_primary_point(TO, entity, position);
        add_sections(&mut outcome, self.line, &topology, line_entity, &[Endpoint::Created(TO)], "Section");
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!(
            "{} from {} of line {}",
            self.distance,
            if self.from_end { "end" } else { "start" },
            self.line
        )
    }
}

/// 附着点位置比例的分母
pub const MAX_POSITION_RATIO: u32 = 1_000_000_000;

/// 附着点：按沿线长度的比例在线上放一个点，不分割线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachPointData {
    pub line: FeatureId,
    /// 从起点量起的长度占线长的比例，以 `MAX_POSITION_RATIO` 为 1
    pub position_ratio: u32,
    pub point_entity: EntityTypeId,
}

impl AttachPointData {
    /// 由线上（容差内）的一个位置求比例
    pub fn at(
        line: FeatureId,
        geometry: &LineGeometry,
        position: &Point2,
        tolerance: f64,
        point_entity: EntityTypeId,
    ) -> Result<Self, EditError> {
        let length = geometry.length();
        let along = geometry
            .length_to(position, tolerance.max(math::TINY))
            .filter(|_| length > math::TINY)
            .ok_or_else(|| {
                EditError::InvalidObservation(format!("position does not coincide with line {}", line))
            })?;
        let ratio = (along / length * f64::from(MAX_POSITION_RATIO)).round();
        Ok(Self {
            line,
            position_ratio: (ratio as u32).min(MAX_POSITION_RATIO),
            point_entity,
        })
    }
}

impl EditPayload for AttachPointData {
    fn references(&self) -> Vec<FeatureId> {
        vec![self.line]
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.position_ratio > MAX_POSITION_RATIO {
            return Err(EditError::InvalidObservation(format!(
                "position ratio {} exceeds {}",
                self.position_ratio, MAX_POSITION_RATIO
            )));
        }
        let (_, geometry, _) = ctx.line(self.line)?;
        let entity = ctx.entity(self.point_entity, FeatureKind::Point)?;

        let along = geometry.length() * (f64::from(self.position_ratio) / f64::from(MAX_POSITION_RATIO));
        let position = geometry.position_at(along).ok_or(EditError::NoSolution)?;
        Ok(Outcome::with_primary_point(TO, entity, position))
    }

    fn describe(&self) -> String {
        format!(
            "attach point to line {} at {:.6} of its length",
            self.line,
            f64::from(self.position_ratio) / f64::from(MAX_POSITION_RATIO)
        )
    }
}

/// 按线长调整细分距离
///
/// 固定距离保持不变，其余距离按同一比例伸缩，使总长等于 `length`。
/// 全部距离都固定时无法调整。
pub fn adjusted_lengths(distances: &[(f64, bool)], length: f64) -> Result<Vec<f64>, EditError> {
    if distances.iter().any(|(d, _)| !(d.is_finite() && *d > 0.0)) {
        return Err(EditError::InvalidObservation(
            "subdivision distances must be greater than zero".to_string(),
        ));
    }
    let total: f64 = distances.iter().map(|(d, _)| d).sum();
    let fixed: f64 = distances.iter().filter(|(_, f)| *f).map(|(d, _)| d).sum();
    let play = total - fixed;
    if play <= 0.0 {
        return Err(EditError::InvalidObservation(
            "cannot adjust a subdivision where every distance is fixed".to_string(),
        ));
    }
    let factor = (play + (length - total)) / play;
    let adjusted: Vec<f64> = distances
        .iter()
        .map(|(d, f)| if *f { *d } else { d * factor })
        .collect();
    if adjusted.iter().any(|d| *d <= 0.0) {
        return Err(EditError::InvalidObservation(
            "fixed distances exceed the length of the line".to_string(),
        ));
    }
    Ok(adjusted)
}

/// 线段细分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdivisionData {
    pub line: FeatureId,
    /// 依次量取的各段距离
    pub distances: Vec<Distance>,
    #[serde(default)]
    pub from_end: bool,
    pub point_entity: EntityTypeId,
}

impl EditPayload for SubdivisionData {
    fn references(&self) -> Vec<FeatureId> {
        vec![self.line]
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.distances.len() < 2 {
            return Err(EditError::InvalidObservation(
                "a subdivision needs at least two distances".to_string(),
            ));
        }
        let (topology, geometry, line_entity) = ctx.line(self.line)?;
        let entity = ctx.entity(self.point_entity, FeatureKind::Point)?;

        let sfac = line_scale(ctx, &geometry);
        let observed: Vec<(f64, bool)> = self.distances.iter().map(|d| (d.meters * sfac, d.fixed)).collect();
        let length = geometry.length();
        let adjusted = adjusted_lengths(&observed, length)?;

        // 最后一段的终点就是线的另一端
        let mut along = 0.0;
        let mut points = Vec::with_capacity(adjusted.len() - 1);
        for d in &adjusted[..adjusted.len() - 1] {
            along += d;
            let at = if self.from_end { length - along } else { along };
            points.push(geometry.position_at(at).ok_or(EditError::NoSolution)?);
        }

        let mut outcome = Outcome::new();
        for (i, p) in points.iter().enumerate() {
            outcome.add_point(Role::indexed("Point", i as u32 + 1), entity, *p);
        }
        outcome.primary = Some(Role::indexed("Point", 1));

        let mut order: Vec<Endpoint> = (1..=points.len() as u32)
            .map(|i| Endpoint::Created(Role::indexed("Point", i)))
            .collect();
        if self.from_end {
            order.reverse();
        }
        add_sections(&mut outcome, self.line, &topology, line_entity, &order, "Section");
        Ok(outcome)
    }

    fn describe(&self) -> String {
        let list: Vec<String> = self.distances.iter().map(|d| d.to_string()).collect();
        format!(
            "subdivide line {} from {}: {}",
            self.line,
            if self.from_end { "end" } else { "start" },
            list.join(" ")
        )
    }
}

/// 线延长：沿线在端点处的方向（圆弧沿同一圆）延长
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionData {
    pub line: FeatureId,
    /// 从终点延长，否则从起点延长
    #[serde(default = "default_true")]
    pub from_end: bool,
    pub length: Distance,
    pub point_entity: EntityTypeId,
    /// 同时生成延长线
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_entity: Option<EntityTypeId>,
}

fn default_true() -> bool {
    true
}

impl EditPayload for ExtensionData {
    fn references(&self) -> Vec<FeatureId> {
        vec![self.line]
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        let (topology, geometry, _) = ctx.line(self.line)?;
        let ground = ctx.distance(&self.length)?;
        let entity = ctx.entity(self.point_entity, FeatureKind::Point)?;

        let (anchor, anchor_id) = if self.from_end {
            (geometry.end(), topology.end)
        } else {
            (geometry.start(), topology.start)
        };

        let (position, arc) = match &geometry {
            LineGeometry::Segment(_) => {
                let bearing = geometry.outward_bearing(self.from_end);
                let approx = math::polar(&anchor, bearing, ground);
                let planar = self.length.planar(&anchor, &approx, ctx.coords);
                (math::polar(&anchor, bearing, planar), None)
            }
            LineGeometry::Arc(a) => {
                let planar = ground * line_scale(ctx, &geometry);
                let angle = planar / a.radius();
                if angle + a.sweep_angle() >= TAU {
                    return Err(EditError::InvalidObservation(format!(
                        "extension of {} would close the circle",
                        self.length
                    )));
                }
                // 顺时针走向时方位角增大
                let forward = if self.from_end { a.clockwise } else { !a.clockwise };
                let base = if self.from_end { a.end_bearing } else { a.start_bearing };
                let bearing = if forward { base + angle } else { base - angle };
                let center = topology.arc.map(|arc| arc.center).ok_or(EditError::WrongKind {
                    feature: self.line,
                    expected: FeatureKind::Line,
                })?;
                let arc = ArcSpec {
                    center: Endpoint::Existing(center),
                    clockwise: forward,
                };
                (a.circle.point_at(math::normalize_angle(bearing)), Some(arc))
            }
        };

        let mut outcome = Outcome::with_primary_point(TO, entity, position);
        if let Some(line_entity) = self.line_entity {
            let line_entity = ctx.entity(line_entity, FeatureKind::Line)?;
            outcome.add_line(EXTENSION, line_entity, Endpoint::Existing(anchor_id), Endpoint::Created(TO), arc);
        }
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!(
            "extend line {} by {} from {}",
            self.line,
            self.length,
            if self.from_end { "end" } else { "start" }
        )
    }
}
