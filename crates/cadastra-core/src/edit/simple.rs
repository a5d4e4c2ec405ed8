//! 直接录入的要素：点、线、文本

use super::{ArcSpec, Creation, EditContext, EditPayload, Endpoint, NewShape, Outcome, Role, TO};
use crate::error::EditError;
use crate::feature::{ArcTopology, EntityTypeId, FeatureId, FeatureKind};
use crate::geometry::TextGeometry;
use crate::math::{self, Point2};
use serde::{Deserialize, Serialize};

pub const LINE: Role = Role::new("Line");
pub const TEXT: Role = Role::new("Text");

/// 圆弧两端到圆心的距离允许的差值（米）
const RADIUS_TOLERANCE: f64 = 1e-3;

/// 按坐标新建点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPointData {
    pub position: Point2,
    pub entity: EntityTypeId,
}

impl EditPayload for NewPointData {
    fn references(&self) -> Vec<FeatureId> {
        Vec::new()
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if !(self.position.x.is_finite() && self.position.y.is_finite()) {
            return Err(EditError::InvalidObservation("point position is not finite".to_string()));
        }
        let entity = ctx.entity(self.entity, FeatureKind::Point)?;
        Ok(Outcome::with_primary_point(TO, entity, self.position))
    }

    fn describe(&self) -> String {
        format!("point at {:.3},{:.3}", self.position.x, self.position.y)
    }
}

/// 连接两个已有点的线段或圆弧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLineData {
    pub start: FeatureId,
    pub end: FeatureId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arc: Option<ArcTopology>,
    pub entity: EntityTypeId,
}

impl EditPayload for NewLineData {
    fn references(&self) -> Vec<FeatureId> {
        let mut refs = vec![self.start, self.end];
        if let Some(arc) = self.arc {
            refs.push(arc.center);
        }
        refs
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        let entity = ctx.entity(self.entity, FeatureKind::Line)?;
        let start = ctx.point(self.start)?;
        let end = ctx.point(self.end)?;

        let arc = match self.arc {
            None => {
                if math::distance(&start, &end) <= ctx.tolerance() {
                    return Err(EditError::InvalidObservation(format!(
                        "line from {} to {} has no length",
                        self.start, self.end
                    )));
                }
                None
            }
            Some(arc) => {
                let center = ctx.point(arc.center)?;
                let r1 = math::distance(&center, &start);
                let r2 = math::distance(&center, &end);
                if r1 <= ctx.tolerance() || (r1 - r2).abs() > RADIUS_TOLERANCE {
                    return Err(EditError::InvalidObservation(format!(
                        "{} and {} are not on a circle centred at {}",
                        self.start, self.end, arc.center
                    )));
                }
                Some(ArcSpec {
                    center: Endpoint::Existing(arc.center),
                    clockwise: arc.clockwise,
                })
            }
        };

        let mut outcome = Outcome::new();
        outcome.add_line(LINE, entity, Endpoint::Existing(self.start), Endpoint::Existing(self.end), arc);
        outcome.primary = Some(LINE);
        Ok(outcome)
    }

    fn describe(&self) -> String {
        match self.arc {
            None => format!("line {} to {}", self.start, self.end),
            Some(arc) => format!(
                "{} arc {} to {} about {}",
                if arc.clockwise { "clockwise" } else { "counter-clockwise" },
                self.start,
                self.end,
                arc.center
            ),
        }
    }
}

/// 文本注记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTextData {
    pub text: TextGeometry,
    pub entity: EntityTypeId,
}

impl EditPayload for NewTextData {
    fn references(&self) -> Vec<FeatureId> {
        Vec::new()
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.text.content.trim().is_empty() {
            return Err(EditError::InvalidObservation("text is empty".to_string()));
        }
        if !(self.text.height.is_finite() && self.text.height > 0.0) {
            return Err(EditError::InvalidObservation("text height must be greater than zero".to_string()));
        }
        let entity = ctx.entity(self.entity, FeatureKind::Text)?;
        let mut outcome = Outcome::new();
        outcome.created.push(Creation {
            role: TEXT,
            entity,
            shape: NewShape::Text(self.text.clone()),
            key: None,
        });
        outcome.primary = Some(TEXT);
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!("text \"{}\"", self.text.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::PlaneSystem;
    use crate::feature::{EditSequence, Shape};
    use crate::settings::Settings;
    use crate::store::FeatureStore;

    fn context<'a>(store: &'a FeatureStore, settings: &'a Settings) -> EditContext<'a> {
        EditContext {
            features: store,
            coords: &PlaneSystem,
            settings,
            check_active: true,
        }
    }

    #[test]
    fn test_new_point_wrong_entity_kind() {
        let store = FeatureStore::new();
        let settings = Settings::default();
        let data = NewPointData {
            position: Point2::new(1.0, 2.0),
            entity: EntityTypeId(2),
        };
        assert_eq!(
            data.compute(&context(&store, &settings)),
            Err(EditError::WrongEntityKind {
                entity: EntityTypeId(2),
                expected: FeatureKind::Point
            })
        );
    }

    #[test]
    fn test_new_arc_requires_common_radius() {
        let mut store = FeatureStore::new();
        let c = store.insert(None, EntityTypeId(1), EditSequence(1), Shape::Point(Point2::origin()));
        let s = store.insert(None, EntityTypeId(1), EditSequence(1), Shape::Point(Point2::new(0.0, 10.0)));
        let e = store.insert(None, EntityTypeId(1), EditSequence(1), Shape::Point(Point2::new(12.0, 0.0)));
        let settings = Settings::default();
        let data = NewLineData {
            start: s,
            end: e,
            arc: Some(ArcTopology { center: c, clockwise: true }),
            entity: EntityTypeId(2),
        };
        assert!(data.compute(&context(&store, &settings)).is_err());
        assert_eq!(data.references(), vec![s, e, c]);
    }

    #[test]
    fn test_new_text() {
        let store = FeatureStore::new();
        let settings = Settings::default();
        let data = NewTextData {
            text: TextGeometry::new(Point2::new(5.0, 5.0), "Lot 12", 2.5),
            entity: EntityTypeId(3),
        };
        let outcome = data.compute(&context(&store, &settings)).unwrap();
        assert_eq!(outcome.primary_position(), Some(Point2::new(5.0, 5.0)));
        assert_eq!(data.describe(), "text \"Lot 12\"");
    }
}
