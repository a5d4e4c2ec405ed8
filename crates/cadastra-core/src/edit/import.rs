//! 批量导入
//!
//! 一次导入生成一条编辑记录，所有点和线作为这条记录的创建结果。
//! 导入在调用线程上同步执行，通过 `ProgressListener` 报告进度。

use super::{Creation, EditContext, EditPayload, Endpoint, NewShape, Outcome, Role};
use crate::error::EditError;
use crate::feature::{EntityTypeId, FeatureId, FeatureKind};
use crate::math::Point2;
use serde::{Deserialize, Serialize};

/// 导入进度的接收方
pub trait ProgressListener {
    /// 已处理 `done` 个，共 `total` 个
    fn progress(&mut self, done: usize, total: usize);
}

/// 不报告进度
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn progress(&mut self, _done: usize, _total: usize) {}
}

impl<F: FnMut(usize, usize)> ProgressListener for F {
    fn progress(&mut self, done: usize, total: usize) {
        self(done, total)
    }
}

/// 导入的点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportPoint {
    /// 指定的编号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<u32>,
    pub position: Point2,
}

/// 导入的线，端点为点列表中的下标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportLine {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportData {
    /// 数据来源（文件名等）
    #[serde(default)]
    pub source: String,
    pub points: Vec<ImportPoint>,
    #[serde(default)]
    pub lines: Vec<ImportLine>,
    pub point_entity: EntityTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_entity: Option<EntityTypeId>,
}

fn point_role(index: usize) -> Role {
    Role::indexed("Point", index as u32 + 1)
}

impl EditPayload for ImportData {
    fn references(&self) -> Vec<FeatureId> {
        Vec::new()
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.points.is_empty() {
            return Err(EditError::InvalidObservation("nothing to import".to_string()));
        }
        let point_entity = ctx.entity(self.point_entity, FeatureKind::Point)?;

        let mut outcome = Outcome::new();
        for (i, p) in self.points.iter().enumerate() {
            if !(p.position.x.is_finite() && p.position.y.is_finite()) {
                return Err(EditError::InvalidObservation(format!("point {} is not finite", i + 1)));
            }
            outcome.created.push(Creation {
                role: point_role(i),
                entity: point_entity,
                shape: NewShape::Point(p.position),
                key: p.key,
            });
        }

        if !self.lines.is_empty() {
            let line_entity = self
                .line_entity
                .ok_or_else(|| EditError::InvalidObservation("no entity type for imported lines".to_string()))?;
            let line_entity = ctx.entity(line_entity, FeatureKind::Line)?;
            for (i, line) in self.lines.iter().enumerate() {
                let count = self.points.len();
                if line.start >= count || line.end >= count || line.start == line.end {
                    return Err(EditError::InvalidObservation(format!(
                        "line {} refers to points {} and {}",
                        i + 1,
                        line.start,
                        line.end
                    )));
                }
                outcome.add_line(
                    Role::indexed("Line", i as u32 + 1),
                    line_entity,
                    Endpoint::Created(point_role(line.start)),
                    Endpoint::Created(point_role(line.end)),
                    None,
                );
            }
        }

        outcome.primary = Some(point_role(0));
        Ok(outcome)
    }

    fn describe(&self) -> String {
        let source = if self.source.is_empty() {
            String::new()
        } else {
            format!(" from {}", self.source)
        };
        format!("import {} points, {} lines{}", self.points.len(), self.lines.len(), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::PlaneSystem;
    use crate::settings::Settings;
    use crate::store::FeatureStore;

    fn data(lines: Vec<ImportLine>) -> ImportData {
        ImportData {
            source: "survey.csv".to_string(),
            points: vec![
                ImportPoint {
                    key: Some(7),
                    position: Point2::new(0.0, 0.0),
                },
                ImportPoint {
                    key: None,
                    position: Point2::new(10.0, 0.0),
                },
            ],
            lines,
            point_entity: EntityTypeId(1),
            line_entity: Some(EntityTypeId(2)),
        }
    }

    #[test]
    fn test_import_outcome() {
        let store = FeatureStore::new();
        let settings = Settings::default();
        let ctx = EditContext {
            features: &store,
            coords: &PlaneSystem,
            settings: &settings,
            check_active: true,
        };
        let outcome = data(vec![ImportLine { start: 0, end: 1 }]).compute(&ctx).unwrap();
        assert_eq!(outcome.created.len(), 3);
        assert_eq!(outcome.created[0].key, Some(7));
        assert_eq!(outcome.primary_position(), Some(Point2::origin()));

        assert!(data(vec![ImportLine { start: 0, end: 5 }]).compute(&ctx).is_err());
        assert_eq!(data(Vec::new()).describe(), "import 2 points, 0 lines from survey.csv");
    }

    #[test]
    fn test_closure_as_listener() {
        let mut calls = Vec::new();
        {
            let mut listener = |done: usize, total: usize| calls.push((done, total));
            listener.progress(1, 2);
        }
        assert_eq!(calls, vec![(1, 2)]);
    }
}
