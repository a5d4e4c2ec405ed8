//! 删除要素
//!
//! 删除只是停用：被删要素留在存储里，撤销删除编辑即恢复。点要素被删时，
//! 仍以它为端点或圆心的活动线必须一并列入删除清单。

use super::{EditContext, EditPayload, Outcome};
use crate::error::EditError;
use crate::feature::{FeatureId, FeatureKind};
use crate::store::FeatureStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionData {
    /// 要停用的要素
    pub features: Vec<FeatureId>,
}

impl DeletionData {
    /// 删除清单，补上依附于清单中点要素的活动线
    pub fn with_attached_lines(features: Vec<FeatureId>, store: &FeatureStore) -> Self {
        let mut listed: BTreeSet<FeatureId> = features.iter().copied().collect();
        let mut all = features;
        let points: Vec<FeatureId> = all
            .iter()
            .copied()
            .filter(|id| store.get(*id).is_some_and(|f| f.kind() == FeatureKind::Point))
            .collect();
        for point in points {
            for line in store.lines_touching(point) {
                if store.get(line).is_some_and(|f| f.active) && listed.insert(line) {
                    all.push(line);
                }
            }
        }
        Self { features: all }
    }
}

impl EditPayload for DeletionData {
    fn references(&self) -> Vec<FeatureId> {
        self.features.clone()
    }

    fn compute(&self, ctx: &EditContext<'_>) -> Result<Outcome, EditError> {
        if self.features.is_empty() {
            return Err(EditError::InvalidObservation("nothing to delete".to_string()));
        }
        let mut listed = BTreeSet::new();
        for id in &self.features {
            ctx.feature(*id)?;
            if !listed.insert(*id) {
                return Err(EditError::InvalidObservation(format!(
                    "feature {} is listed for deletion twice",
                    id
                )));
            }
        }

        // 重算已提交的删除时，这些线已经停用
        if ctx.check_active {
            for id in &self.features {
                if ctx.feature(*id)?.kind() != FeatureKind::Point {
                    continue;
                }
                let kept = ctx
                    .features
                    .lines_touching(*id)
                    .into_iter()
                    .find(|line| !listed.contains(line) && ctx.features.get(*line).is_some_and(|f| f.active));
                if let Some(line) = kept {
                    return Err(EditError::InvalidObservation(format!(
                        "point {} is still used by line {}",
                        id, line
                    )));
                }
            }
        }

        let mut outcome = Outcome::new();
        outcome.retired = self.features.clone();
        Ok(outcome)
    }

    fn describe(&self) -> String {
        let list: Vec<String> = self.features.iter().map(|id| id.to_string()).collect();
        format!("delete {}", list.join(", "))
    }
}
