//! 修正预览
//!
//! 列出修正会改动的输入字段（新旧值的文本形式）和会移动的要素。

use super::EditData;
use crate::error::EditError;
use crate::feature::{EditSequence, FeatureId};
use crate::math::Point2;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// 改动的输入字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateItem {
    pub name: String,
    pub old: String,
    pub new: String,
}

/// 会移动的要素
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovedFeature {
    pub id: FeatureId,
    pub before: Point2,
    pub after: Point2,
}

/// 修正的影响
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItems {
    pub sequence: EditSequence,
    pub fields: Vec<UpdateItem>,
    pub moved: Vec<MovedFeature>,
    /// 需要随之重算的后续编辑
    pub dependents: Vec<EditSequence>,
}

impl UpdateItems {
    /// 是否没有任何改动
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.moved.is_empty()
    }
}

/// 编码后 `{"kind": ..., "data": {...}}` 中的 `data` 字段表
fn fields<T: Serialize>(data: &T) -> Result<serde_json::Map<String, Value>, EditError> {
    let value = serde_json::to_value(data).map_err(|e| EditError::Encoding(e.to_string()))?;
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(fields)) => Ok(fields),
            _ => Err(EditError::Encoding("edit input has no data fields".to_string())),
        },
        _ => Err(EditError::Encoding("edit input is not an object".to_string())),
    }
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// 比较两份输入的顶层字段
pub fn diff_fields(old: &EditData, new: &EditData) -> Result<Vec<UpdateItem>, EditError> {
    let old = fields(old)?;
    let new = fields(new)?;
    let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    let items = names
        .into_iter()
        .filter(|name| old.get(*name) != new.get(*name))
        .map(|name| UpdateItem {
            name: name.clone(),
            old: render(old.get(name)),
            new: render(new.get(name)),
        })
        .collect();
    Ok(items)
}
