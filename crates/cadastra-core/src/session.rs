//! 编辑会话
//!
//! 会话是按序号排列、只追加的编辑记录序列。只能撤销最后一条记录。

use crate::edit::{handler, EditData, Role};
use crate::feature::{EditSequence, FeatureId};
use chrono::{DateTime, Utc};

/// 一条已提交的编辑
#[derive(Debug, Clone, PartialEq)]
pub struct EditRecord {
    pub sequence: EditSequence,
    /// 所属会话
    pub session: u32,
    pub data: EditData,
    /// 按创建顺序排列的新要素
    pub created: Vec<(Role, FeatureId)>,
    /// 被停用的已有要素
    pub retired: Vec<FeatureId>,
    pub primary: Option<FeatureId>,
    /// 本记录创建的第一个要素的编号（重放时保持一致）
    pub first_feature: FeatureId,
    pub when: DateTime<Utc>,
}

impl EditRecord {
    /// 审计显示用的单行描述
    pub fn describe(&self) -> String {
        format!(
            "{:>5} {} {}: {}",
            self.sequence,
            self.when.format("%Y-%m-%d %H:%M:%S"),
            handler(self.data.kind()).name,
            self.data.describe()
        )
    }

    pub fn created_id(&self, role: Role) -> Option<FeatureId> {
        self.created.iter().find(|(r, _)| *r == role).map(|(_, id)| *id)
    }

    pub fn created_ids(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.created.iter().map(|(_, id)| *id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 可以追加编辑
    Open,
    /// 刚撤销过最后一条编辑
    RolledBack,
}

/// 编辑会话
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u32,
    pub user: String,
    pub started: DateTime<Utc>,
    records: Vec<EditRecord>,
    state: SessionState,
}

impl Session {
    pub fn new(id: u32, user: impl Into<String>, started: DateTime<Utc>) -> Self {
        Self {
            id,
            user: user.into(),
            started,
            records: Vec::new(),
            state: SessionState::Open,
        }
    }

    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last(&self) -> Option<&EditRecord> {
        self.records.last()
    }

    pub fn find(&self, sequence: EditSequence) -> Option<&EditRecord> {
        self.records.iter().find(|r| r.sequence == sequence)
    }

    pub(crate) fn find_mut(&mut self, sequence: EditSequence) -> Option<&mut EditRecord> {
        self.records.iter_mut().find(|r| r.sequence == sequence)
    }

    pub(crate) fn push(&mut self, record: EditRecord) {
        debug_assert!(
            self.records.last().map_or(true, |last| last.sequence < record.sequence),
            "edit sequence must increase"
        );
        self.records.push(record);
        self.state = SessionState::Open;
    }

    pub(crate) fn pop(&mut self) -> Option<EditRecord> {
        let record = self.records.pop()?;
        self.state = SessionState::RolledBack;
        Some(record)
    }
}
