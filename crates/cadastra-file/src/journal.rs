//! 编辑日志（.cjl）
//!
//! 以 JSON 文本保存会话：每条编辑只记录种类和输入，以及重放时需要保持
//! 一致的序号、首个要素编号和用户编号。几何不保存，加载时按顺序重放得到。
//!
//! ```text
//! { "format": "cadastra-journal", "version": 1,
//!   "packets": [ { "group": 1, "min": 1, "max": 100, "used": 3 } ],
//!   "sessions": [ { "id": 1, "user": "...", "started": "...",
//!                   "edits": [ { "sequence": 1, "first_feature": 1, "keys": [1],
//!                                "edit": { "kind": "NewPoint", "data": { ... } } } ] } ] }
//! ```

use crate::error::JournalError;
use cadastra_core::edit::EditData;
use cadastra_core::feature::{EditSequence, FeatureId};
use cadastra_core::ids::PacketRecord;
use cadastra_core::model::{Model, ReplayEntry};
use cadastra_core::session::EditRecord;
use cadastra_core::settings::Settings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// 格式标识
const FORMAT_NAME: &str = "cadastra-journal";

/// 当前格式版本
const FORMAT_VERSION: u32 = 1;

/// 一条编辑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEdit {
    pub sequence: EditSequence,
    pub first_feature: FeatureId,
    pub when: DateTime<Utc>,
    /// 新要素的原始编号，与创建顺序一致
    pub keys: Vec<Option<u32>>,
    pub edit: EditData,
}

impl JournalEdit {
    fn from_record(model: &Model, record: &EditRecord) -> Self {
        Self {
            sequence: record.sequence,
            first_feature: record.first_feature,
            when: record.when,
            keys: model.record_keys(record),
            edit: record.data.clone(),
        }
    }
}

/// 一个会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalSession {
    pub id: u32,
    pub user: String,
    pub started: DateTime<Utc>,
    pub edits: Vec<JournalEdit>,
}

/// 编辑日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub format: String,
    pub version: u32,
    #[serde(default)]
    pub packets: Vec<PacketRecord>,
    pub sessions: Vec<JournalSession>,
}

impl Journal {
    /// 从模型当前状态生成日志；没有编辑的会话不写入
    pub fn from_model(model: &Model) -> Self {
        let sessions = model
            .sessions()
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| JournalSession {
                id: s.id,
                user: s.user.clone(),
                started: s.started,
                edits: s.records().iter().map(|r| JournalEdit::from_record(model, r)).collect(),
            })
            .collect();
        Self {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            packets: model.ids().packet_records(),
            sessions,
        }
    }

    pub fn edit_count(&self) -> usize {
        self.sessions.iter().map(|s| s.edits.len()).sum()
    }

    pub fn edits(&self) -> impl Iterator<Item = &JournalEdit> {
        self.sessions.iter().flat_map(|s| &s.edits)
    }

    pub fn to_writer(&self, writer: impl Write) -> Result<(), JournalError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, JournalError> {
        let journal: Journal = serde_json::from_reader(reader)?;
        journal.check_header()?;
        Ok(journal)
    }

    fn check_header(&self) -> Result<(), JournalError> {
        if self.format != FORMAT_NAME {
            return Err(JournalError::InvalidFormat(format!(
                "unexpected format \"{}\", not a Cadastra journal",
                self.format
            )));
        }
        if self.version > FORMAT_VERSION {
            return Err(JournalError::UnsupportedVersion(format!(
                "Journal version {} is newer than supported version {}",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// 按日志重放出新的模型
    pub fn replay(&self, settings: Settings) -> Result<Model, JournalError> {
        let mut model = Model::new(settings);
        model.ids_mut().restore_packets(&self.packets)?;

        for session in &self.sessions {
            model.restore_session(session.id, session.user.clone(), session.started);
            for edit in &session.edits {
                if edit.sequence < model.next_sequence() {
                    return Err(JournalError::InvalidFormat(format!(
                        "edit {} is out of order",
                        edit.sequence
                    )));
                }
                if edit.first_feature < model.features().next_id() {
                    return Err(JournalError::InvalidFormat(format!(
                        "edit {} reuses feature {}",
                        edit.sequence, edit.first_feature
                    )));
                }
                let entry = ReplayEntry {
                    sequence: edit.sequence,
                    first_feature: edit.first_feature,
                    data: edit.edit.clone(),
                    keys: edit.keys.clone(),
                    when: edit.when,
                };
                model.replay(entry).map_err(|source| JournalError::Replay {
                    sequence: edit.sequence,
                    source,
                })?;
            }
        }

        tracing::info!(
            "Replayed {} edit(s) in {} session(s), {} active feature(s)",
            self.edit_count(),
            self.sessions.len(),
            model.features().active_count()
        );
        Ok(model)
    }
}

/// 保存模型的编辑日志
pub fn save(model: &Model, path: &Path) -> Result<(), JournalError> {
    let journal = Journal::from_model(model);
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    journal.to_writer(&mut writer)?;
    writer.flush()?;

    tracing::info!(
        "Saved {} edit(s), {} packet(s) to {}",
        journal.edit_count(),
        journal.packets.len(),
        path.display()
    );
    Ok(())
}

/// 读取编辑日志
pub fn load(path: &Path) -> Result<Journal, JournalError> {
    let file = File::open(path)?;
    let journal = Journal::from_reader(BufReader::new(file))?;
    tracing::info!("Loaded {} edit(s) from {}", journal.edit_count(), path.display());
    Ok(journal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadastra_core::prelude::*;

    fn sample_model() -> Model {
        let mut model = Model::default();
        for (x, y) in [(0.0, 0.0), (100.0, 0.0)] {
            model
                .execute(
                    EditData::NewPoint(NewPointData {
                        position: Point2::new(x, y),
                        entity: EntityTypeId(1),
                    }),
                    None,
                )
                .unwrap();
        }
        model
    }

    #[test]
    fn test_journal_text_roundtrip() {
        let model = sample_model();
        let journal = Journal::from_model(&model);
        assert_eq!(journal.edit_count(), 2);

        let mut buffer = Vec::new();
        journal.to_writer(&mut buffer).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.contains("\"kind\": \"NewPoint\""));

        let loaded = Journal::from_reader(buffer.as_slice()).unwrap();
        assert_eq!(loaded, journal);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut journal = Journal::from_model(&sample_model());
        journal.version = FORMAT_VERSION + 1;
        let mut buffer = Vec::new();
        journal.to_writer(&mut buffer).unwrap();

        let result = Journal::from_reader(buffer.as_slice());
        assert!(matches!(result, Err(JournalError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_wrong_format_rejected() {
        let text = r#"{ "format": "zip", "version": 1, "sessions": [] }"#;
        let result = Journal::from_reader(text.as_bytes());
        assert!(matches!(result, Err(JournalError::InvalidFormat(_))));
    }

    #[test]
    fn test_out_of_order_edits_rejected() {
        let mut journal = Journal::from_model(&sample_model());
        journal.sessions[0].edits.swap(0, 1);
        let result = journal.replay(Settings::default());
        assert!(matches!(result, Err(JournalError::InvalidFormat(_))));
    }

    #[test]
    fn test_replay_failure_names_edit() {
        let mut journal = Journal::from_model(&sample_model());
        // 第二条编辑改为引用不存在的要素
        journal.sessions[0].edits[1].edit = EditData::Radial(RadialData {
            direction: Direction::bearing(FeatureId(42), 0.0),
            length: Distance::meters(10.0),
            point_entity: EntityTypeId(1),
            line: None,
        });
        journal.sessions[0].edits[1].keys = vec![None];

        match journal.replay(Settings::default()) {
            Err(JournalError::Replay { sequence, .. }) => assert_eq!(sequence, EditSequence(2)),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
