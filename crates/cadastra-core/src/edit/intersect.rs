//! 交会编辑
//!
//! 由方向、距离、已有线两两组合求出新点，可选地同时生成观测线，
//! 与已有线相交时还可以在交点处把线分成两段。

use super::{add_sections, check_split_point, EditContext, EditPayload, Endpoint, Outcome, Role, TO};
use crate::error::EditError;
use crate::feature::{EntityTypeId, FeatureId, FeatureKind};
use crate::intersect::{self, solve_observed, Choice, Constraint, Observed};
use crate::math::{self, Point2};
use crate::observation::{Direction, Distance};
use serde::{Deserialize, Serialize};

pub const DIRECTION_LINE: Role = Role::new("DirectionLine");
pub const DISTANCE_LINE: Role = Role::new("DistanceLine");

/// 在已有线上的取舍：有提示点时取最近的，否则取第一个
fn close_to_choice(close_to: Option<Point2>) -> Choice {
    close_to.map(Choice::near).unwrap_or_default()
}

/// 求解并生成主要的新点
fn solved_point(
    ctx: &EditContext<'_>,
    a: &Observed,
    b: &Observed,
    choice: &Choice,
    point_entity: EntityTypeId,
) -> Result<Outcome, EditError> {
    let entity = ctx.entity(point_entity, FeatureKind::Point)?;
    let solution = solve_observed(a, b, choice, ctx.coords, &ctx.params());
    let position = solution.position.ok_or(EditError::NoSolution)?;
    let mut outcome = Outcome::with_primary_point(TO, entity, position);
    outcome.candidates = solution.candidates.as_slice().to_vec();
    Ok(outcome)
}

/// 可选的、从已知点连到新点的线
fn add_line_to(
    ctx: &EditContext<'_>,
    outcome: &mut Outcome,
    role: Role,
    entity: Option<EntityTypeId>,
    from: FeatureId,
) -> Result<(), EditError> {
    if let Some(entity) = entity {
        let entity = ctx.entity(entity, FeatureKind::Line)?;
        outcome.add_line(role, entity, Endpoint::Existing(from), Endpoint::Created(TO), None);
    }
    Ok(())
}

fn describe_entities(lines: &[Option<EntityTypeId>]) -> &'static str {
    if lines.iter().any(Option::is_some) {
        " (with lines)"
    } else {
        ""
    }
}

/// 方向与距离交会
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionDistanceData {
    pub direction: Direction,
    pub distance: Distance,
    /// 距离的起算点
    pub distance_from: FeatureId,
    #[serde(default)]
    pub choice: Choice,
    pub point_entity: EntityTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_line: Option<EntityTypeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_line: Option<EntityTypeId>,
}

impl EditPayload for DirectionDistanceData {
    fn references(&self) -> Vec<FeatureId> {
        let mut refs = self.direction.references();
        refs.push(self.distance_from);
        refs
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        let dir = ctx.direction(&self.direction)?;
        let ground = ctx.distance(&self.distance)?;
        let center = ctx.point(self.distance_from)?;

        let mut outcome = solved_point(
            ctx,
            &Observed::Direction {
                start: dir.start,
                bearing: dir.bearing,
            },
            &Observed::Distance { center, ground },
            &self.choice,
            self.point_entity,
        )?;
        add_line_to(ctx, &mut outcome, DIRECTION_LINE, self.direction_line, self.direction.from())?;
        add_line_to(ctx, &mut outcome, DISTANCE_LINE, self.distance_line, self.distance_from)?;
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!(
            "{} and {} from {}{}",
            self.direction.describe(),
            self.distance,
            self.distance_from,
            describe_entities(&[self.direction_line, self.distance_line])
        )
    }
}

/// 从某点量取的距离
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceFrom {
    pub from: FeatureId,
    pub distance: Distance,
}

/// 两距离交会
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoDistancesData {
    pub first: DistanceFrom,
    pub second: DistanceFrom,
    #[serde(default)]
    pub choice: Choice,
    pub point_entity: EntityTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_line: Option<EntityTypeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_line: Option<EntityTypeId>,
}

impl TwoDistancesData {
    fn observed(&self, ctx: &EditContext<'_>, d: &DistanceFrom) -> Result<Observed, EditError> {
        Ok(Observed::Distance {
            center: ctx.point(d.from)?,
            ground: ctx.distance(&d.distance)?,
        })
    }
}

impl EditPayload for TwoDistancesData {
    fn references(&self) -> Vec<FeatureId> {
        vec![self.first.from, self.second.from]
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.first.from == self.second.from {
            return Err(EditError::InvalidObservation(
                "both distances are measured from the same point".to_string(),
            ));
        }
        let a = self.observed(ctx, &self.first)?;
        let b = self.observed(ctx, &self.second)?;
        let mut outcome = solved_point(ctx, &a, &b, &self.choice, self.point_entity)?;
        add_line_to(ctx, &mut outcome, Role::indexed("DistanceLine", 1), self.first_line, self.first.from)?;
        add_line_to(ctx, &mut outcome, Role::indexed("DistanceLine", 2), self.second_line, self.second.from)?;
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!(
            "{} from {} and {} from {}{}",
            self.first.distance,
            self.first.from,
            self.second.distance,
            self.second.from,
            describe_entities(&[self.first_line, self.second_line])
        )
    }
}

/// 两方向交会
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoDirectionsData {
    pub first: Direction,
    pub second: Direction,
    pub point_entity: EntityTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_line: Option<EntityTypeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_line: Option<EntityTypeId>,
}

impl EditPayload for TwoDirectionsData {
    fn references(&self) -> Vec<FeatureId> {
        let mut refs = self.first.references();
        refs.extend(self.second.references());
        refs
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        let d1 = ctx.direction(&self.first)?;
        let d2 = ctx.direction(&self.second)?;
        let mut outcome = solved_point(
            ctx,
            &Observed::Direction {
                start: d1.start,
                bearing: d1.bearing,
            },
            &Observed::Direction {
                start: d2.start,
                bearing: d2.bearing,
            },
            &Choice::Default,
            self.point_entity,
        )?;
        add_line_to(ctx, &mut outcome, Role::indexed("DirectionLine", 1), self.first_line, self.first.from())?;
        add_line_to(ctx, &mut outcome, Role::indexed("DirectionLine", 2), self.second_line, self.second.from())?;
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!(
            "{} and {}{}",
            self.first.describe(),
            self.second.describe(),
            describe_entities(&[self.first_line, self.second_line])
        )
    }
}

/// 方向与已有线交会
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionLineData {
    pub direction: Direction,
    pub line: FeatureId,
    /// 有两个交点时取离该点近的
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_to: Option<Point2>,
    /// 是否在交点处分割线
    #[serde(default)]
    pub split: bool,
    pub point_entity: EntityTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_line: Option<EntityTypeId>,
}

impl EditPayload for DirectionLineData {
    fn references(&self) -> Vec<FeatureId> {
        let mut refs = self.direction.references();
        refs.push(self.line);
        refs
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        let dir = ctx.direction(&self.direction)?;
        let (topology, geometry, line_entity) = ctx.line(self.line)?;
        let mut outcome = solved_point(
            ctx,
            &Observed::Direction {
                start: dir.start,
                bearing: dir.bearing,
            },
            &Observed::Line(geometry),
            &close_to_choice(self.close_to),
            self.point_entity,
        )?;
        add_line_to(ctx, &mut outcome, DIRECTION_LINE, self.direction_line, self.direction.from())?;

        if self.split {
            let at = outcome.primary_position().ok_or(EditError::NoSolution)?;
            check_split_point(self.line, &geometry, &at, ctx.tolerance())?;
            add_sections(&mut outcome, self.line, &topology, line_entity, &[Endpoint::Created(TO)], "Section");
        }
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!(
            "{} to line {}{}",
            self.direction.describe(),
            self.line,
            if self.split { " (split)" } else { "" }
        )
    }
}

/// 两条已有线交会
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoLinesData {
    pub first: FeatureId,
    pub second: FeatureId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_to: Option<Point2>,
    #[serde(default)]
    pub split_first: bool,
    #[serde(default)]
    pub split_second: bool,
    pub point_entity: EntityTypeId,
}

impl EditPayload for TwoLinesData {
    fn references(&self) -> Vec<FeatureId> {
        vec![self.first, self.second]
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.first == self.second {
            return Err(EditError::InvalidObservation(format!(
                "line {} cannot be intersected with itself",
                self.first
            )));
        }
        let (topo1, geom1, entity1) = ctx.line(self.first)?;
        let (topo2, geom2, entity2) = ctx.line(self.second)?;
        let entity = ctx.entity(self.point_entity, FeatureKind::Point)?;

        let candidates = intersect::intersect(&Constraint::Line(geom1), &Constraint::Line(geom2), &ctx.params());
        let position = candidates
            .choose(&close_to_choice(self.close_to))
            .ok_or(EditError::NoSolution)?;
        let mut outcome = Outcome::with_primary_point(TO, entity, position);
        outcome.candidates = candidates.as_slice().to_vec();

        if self.split_first {
            check_split_point(self.first, &geom1, &position, ctx.tolerance())?;
            add_sections(&mut outcome, self.first, &topo1, entity1, &[Endpoint::Created(TO)], "FirstSection");
        }
        if self.split_second {
            check_split_point(self.second, &geom2, &position, ctx.tolerance())?;
            add_sections(&mut outcome, self.second, &topo2, entity2, &[Endpoint::Created(TO)], "SecondSection");
        }
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!("line {} and line {}", self.first, self.second)
    }
}

/// 极坐标放样：从一点沿方向量取距离
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialData {
    pub direction: Direction,
    pub length: Distance,
    pub point_entity: EntityTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<EntityTypeId>,
}

impl EditPayload for RadialData {
    fn references(&self) -> Vec<FeatureId> {
        self.direction.references()
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        let dir = ctx.direction(&self.direction)?;
        let ground = ctx.distance(&self.length)?;
        let entity = ctx.entity(self.point_entity, FeatureKind::Point)?;

        let approx = math::polar(&dir.start, dir.bearing, ground);
        let planar = self.length.planar(&dir.start, &approx, ctx.coords);
        let position = math::polar(&dir.start, dir.bearing, planar);

        let mut outcome = Outcome::with_primary_point(TO, entity, position);
        add_line_to(ctx, &mut outcome, DIRECTION_LINE, self.line, self.direction.from())?;
        Ok(outcome)
    }

    fn describe(&self) -> String {
        format!("radial {} along {}", self.length, self.direction.describe())
    }
}
