//! 编辑模型
//!
//! `Model` 持有要素存储、编号管理器和会话列表，是编辑操作的显式上下文。
//! 只有 `execute`、`correct` 和撤销会修改模型，其余操作都没有副作用。
//!
//! 修正（correct）在要素存储的副本上进行：先重算被修正的记录，再按序号
//! 重算所有受影响的后续记录，全部成功后才替换原存储。

use crate::coords::CoordinateSystem;
use crate::edit::{
    self, handler, update, EditContext, EditData, EditKind, Endpoint, NewShape, NoProgress, Outcome,
    ProgressListener, Role, UpdateItems,
};
use crate::error::EditError;
use crate::feature::{EditSequence, Feature, FeatureId, FeatureKey, LineTopology, Shape};
use crate::ids::{IdHandle, IdManager, LocalAuthority, NumberingAuthority};
use crate::math::Point2;
use crate::session::{EditRecord, Session};
use crate::settings::Settings;
use crate::store::FeatureStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    pub sequence: EditSequence,
    /// 主要的新要素（通常是新点）
    pub primary: Option<FeatureId>,
}

/// 预览结果
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Preview {
    pub primary: Option<Point2>,
    pub alt1: Option<Point2>,
    pub alt2: Option<Point2>,
}

impl Preview {
    pub fn success(&self) -> bool {
        self.primary.is_some()
    }
}

/// 撤销结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStatus {
    /// 没有可撤销的编辑
    Nothing,
    RolledBack(EditSequence),
}

impl RollbackStatus {
    /// 状态码：撤销的编辑序号，没有可撤销的编辑时为 0
    pub fn code(&self) -> u32 {
        match self {
            RollbackStatus::Nothing => 0,
            RollbackStatus::RolledBack(seq) => seq.0,
        }
    }
}

/// 重放一条已记录的编辑所需的信息
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntry {
    pub sequence: EditSequence,
    pub first_feature: FeatureId,
    pub data: EditData,
    /// 各新要素的原始编号，与创建顺序一致
    pub keys: Vec<Option<u32>>,
    pub when: DateTime<Utc>,
}

/// 修正计划：更新后的存储副本和受影响的范围
struct CorrectionPlan {
    features: FeatureStore,
    moved: BTreeSet<FeatureId>,
    dependents: Vec<EditSequence>,
}

/// 编辑模型
#[derive(Debug)]
pub struct Model {
    settings: Settings,
    coords: Arc<dyn CoordinateSystem>,
    features: FeatureStore,
    ids: IdManager,
    sessions: Vec<Session>,
    next_sequence: u32,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Model {
    pub fn new(settings: Settings) -> Self {
        Self::with_authority(settings, Box::new(LocalAuthority))
    }

    /// 使用指定的编号审批方
    pub fn with_authority(settings: Settings, authority: Box<dyn NumberingAuthority>) -> Self {
        let coords = settings.coordinate_system.build();
        let ids = IdManager::new(&settings.id_groups, authority);
        let session = Session::new(1, settings.user.clone(), Utc::now());
        Self {
            settings,
            coords,
            features: FeatureStore::new(),
            ids,
            sessions: vec![session],
            next_sequence: 1,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn coords(&self) -> &dyn CoordinateSystem {
        self.coords.as_ref()
    }

    pub fn features(&self) -> &FeatureStore {
        &self.features
    }

    pub fn ids(&self) -> &IdManager {
        &self.ids
    }

    pub fn ids_mut(&mut self) -> &mut IdManager {
        &mut self.ids
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn current_session(&self) -> &Session {
        debug_assert!(!self.sessions.is_empty());
        &self.sessions[self.sessions.len() - 1]
    }

    fn current_session_mut(&mut self) -> &mut Session {
        let last = self.sessions.len() - 1;
        &mut self.sessions[last]
    }

    /// 下一条编辑将使用的序号
    pub fn next_sequence(&self) -> EditSequence {
        EditSequence(self.next_sequence)
    }

    /// 全部会话中的编辑记录，按序号排列
    pub fn records(&self) -> impl Iterator<Item = &EditRecord> {
        self.sessions.iter().flat_map(|s| s.records())
    }

    pub fn record(&self, sequence: EditSequence) -> Option<&EditRecord> {
        self.records().find(|r| r.sequence == sequence)
    }

    pub fn edit_count(&self) -> usize {
        self.sessions.iter().map(|s| s.len()).sum()
    }

    /// 记录的新要素的原始编号
    pub fn record_keys(&self, record: &EditRecord) -> Vec<Option<u32>> {
        record
            .created_ids()
            .map(|id| self.features.get(id).and_then(|f| f.key.as_ref()).map(|k| k.raw))
            .collect()
    }

    /// 开始新的会话，返回会话编号
    pub fn start_session(&mut self, user: impl Into<String>) -> u32 {
        let id = self.current_session().id + 1;
        self.restore_session(id, user, Utc::now());
        id
    }

    /// 恢复已有会话；当前会话为空时直接替换
    pub fn restore_session(&mut self, id: u32, user: impl Into<String>, started: DateTime<Utc>) {
        let session = Session::new(id, user, started);
        if self.current_session().is_empty() {
            *self.current_session_mut() = session;
        } else {
            self.sessions.push(session);
        }
        info!("Session {} started", id);
    }

    fn context(&self, check_active: bool) -> EditContext<'_> {
        EditContext {
            features: &self.features,
            coords: self.coords.as_ref(),
            settings: &self.settings,
            check_active,
        }
    }

    /// 预览：计算结果但不修改模型
    ///
    /// 无解时返回不成功的预览，而不是错误。
    pub fn calculate(&self, data: &EditData) -> Result<Preview, EditError> {
        let outcome = match (handler(data.kind()).compute)(data, &self.context(true)) {
            Ok(outcome) => outcome,
            Err(EditError::NoSolution) => return Ok(Preview::default()),
            Err(e) => return Err(e),
        };
        Ok(Preview {
            primary: outcome.primary_position(),
            alt1: outcome.candidates.first().copied(),
            alt2: outcome.candidates.get(1).copied(),
        })
    }

    /// 执行编辑
    ///
    /// `handle` 为界面预先预留的编号，用于主要的新要素；没有用上时归还。
    pub fn execute(&mut self, data: EditData, handle: Option<IdHandle>) -> Result<Executed, EditError> {
        self.execute_with_progress(data, handle, &mut NoProgress)
    }

    /// 执行编辑并报告创建要素的进度
    pub fn execute_with_progress(
        &mut self,
        data: EditData,
        handle: Option<IdHandle>,
        progress: &mut dyn ProgressListener,
    ) -> Result<Executed, EditError> {
        let sequence = self.next_sequence();
        let first_feature = self.features.next_id();
        self.apply(data, sequence, first_feature, Keys::Allocate(handle), Utc::now(), progress)
    }

    /// 重放已记录的编辑，保持序号、要素编号和用户编号不变
    pub fn replay(&mut self, entry: ReplayEntry) -> Result<Executed, EditError> {
        debug_assert!(entry.sequence.0 >= self.next_sequence, "replayed edits must be in order");
        debug_assert!(entry.first_feature >= self.features.next_id(), "replayed feature ids must not go backwards");
        self.apply(
            entry.data,
            entry.sequence,
            entry.first_feature,
            Keys::Recorded(entry.keys),
            entry.when,
            &mut NoProgress,
        )
    }

    fn apply(
        &mut self,
        data: EditData,
        sequence: EditSequence,
        first_feature: FeatureId,
        keys: Keys,
        when: DateTime<Utc>,
        progress: &mut dyn ProgressListener,
    ) -> Result<Executed, EditError> {
        let outcome = match (handler(data.kind()).compute)(&data, &self.context(true)) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Keys::Allocate(Some(handle)) = keys {
                    self.ids.release(handle);
                }
                warn!("{:?} edit rejected: {}", data.kind(), e);
                return Err(e);
            }
        };

        let feature_keys = self.assign_keys(&outcome, keys)?;

        // 以下不会失败
        self.features.skip_to(first_feature);
        let total = outcome.created.len();
        let mut created: Vec<(Role, FeatureId)> = Vec::with_capacity(total);
        for (i, (creation, key)) in outcome.created.iter().zip(feature_keys).enumerate() {
            let shape = match &creation.shape {
                NewShape::Point(p) => Shape::Point(*p),
                NewShape::Text(t) => Shape::Text(t.clone()),
                NewShape::Line { start, end, arc } => Shape::Line(LineTopology {
                    start: resolve(&created, start),
                    end: resolve(&created, end),
                    arc: arc.map(|a| crate::feature::ArcTopology {
                        center: resolve(&created, &a.center),
                        clockwise: a.clockwise,
                    }),
                }),
            };
            let id = self.features.insert(key, creation.entity, sequence, shape);
            created.push((creation.role, id));
            progress.progress(i + 1, total);
        }
        for id in &outcome.retired {
            self.features.set_active(*id, false);
        }

        let primary = outcome.primary.and_then(|role| lookup(&created, role));
        let session = self.current_session().id;
        let record = EditRecord {
            sequence,
            session,
            data,
            created,
            retired: outcome.retired,
            primary,
            first_feature,
            when,
        };
        info!(
            "Edit {} ({}) created {} feature(s)",
            sequence,
            handler(record.data.kind()).name,
            record.created.len()
        );
        self.current_session_mut().push(record);
        self.next_sequence = self.next_sequence.max(sequence.0 + 1);
        Ok(Executed { sequence, primary })
    }

    /// 为新要素预留并提交编号；任何一步失败都归还已预留的编号
    fn assign_keys(&mut self, outcome: &Outcome, keys: Keys) -> Result<Vec<Option<FeatureKey>>, EditError> {
        let (mut handle, recorded) = match keys {
            Keys::Allocate(handle) => (handle, None),
            Keys::Recorded(keys) => (None, Some(keys)),
        };
        let recorded = recorded.as_deref();
        if let Some(recorded) = recorded {
            debug_assert_eq!(recorded.len(), outcome.created.len(), "recorded keys do not match the edit");
        }

        let mut handles: Vec<Option<IdHandle>> = Vec::with_capacity(outcome.created.len());
        let mut failure = None;
        for (i, creation) in outcome.created.iter().enumerate() {
            let wanted = match recorded {
                Some(recorded) => recorded.get(i).copied().flatten(),
                None => creation.key,
            };
            let reserved = if let Some(raw) = wanted {
                self.ids.reserve_specific(creation.entity, raw).map(Some)
            } else if recorded.is_some() || self.ids.group_for(creation.entity).is_none() {
                Ok(None)
            } else if outcome.primary == Some(creation.role)
                && handle.as_ref().is_some_and(|h| h.is_valid_for(creation.entity))
            {
                Ok(handle.take())
            } else {
                self.ids.reserve(creation.entity).map(Some)
            };
            match reserved {
                Ok(h) => handles.push(h),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(unused) = handle {
            self.ids.release(unused);
        }
        if let Some(e) = failure {
            for h in handles.into_iter().flatten() {
                self.ids.release(h);
            }
            warn!("Identifier allocation failed: {}", e);
            return Err(e.into());
        }

        let mut committed: Vec<Option<FeatureKey>> = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some(h) = pending.next() {
            let key = match h {
                None => None,
                Some(h) => match self.ids.commit(h) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        for key in committed.iter().flatten() {
                            self.ids.free(key);
                        }
                        for h in pending.by_ref().flatten() {
                            self.ids.release(h);
                        }
                        return Err(e.into());
                    }
                },
            };
            committed.push(key);
        }
        Ok(committed)
    }

    /// 撤销当前会话的最后一条编辑
    pub fn rollback(&mut self) -> RollbackStatus {
        let Some(record) = self.current_session_mut().pop() else {
            info!("Nothing to roll back");
            return RollbackStatus::Nothing;
        };
        for id in record.created_ids().collect::<Vec<_>>().into_iter().rev() {
            let key = self.features.get(id).and_then(|f| f.key.clone());
            debug_assert!(self.features.contains(id), "created feature {} is missing", id);
            if let Some(key) = key {
                self.ids.free(&key);
            }
            self.features.set_active(id, false);
        }
        for id in &record.retired {
            self.features.set_active(*id, true);
        }
        info!("Rolled back edit {} ({})", record.sequence, handler(record.data.kind()).name);
        RollbackStatus::RolledBack(record.sequence)
    }

    /// 撤销指定的编辑；只能撤销当前会话的最后一条
    pub fn rollback_edit(&mut self, sequence: EditSequence) -> Result<RollbackStatus, EditError> {
        if self.current_session().last().map(|r| r.sequence) == Some(sequence) {
            return Ok(self.rollback());
        }
        if self.record(sequence).is_some() {
            warn!("Refused to roll back edit {}: not the last edit", sequence);
            return Err(EditError::NotTail(sequence));
        }
        Err(EditError::UnknownEdit(sequence))
    }

    /// 从最新的记录往前查找
    pub fn recall(&self, predicate: impl Fn(&EditRecord) -> bool, correctable_only: bool) -> Option<&EditRecord> {
        self.sessions
            .iter()
            .rev()
            .flat_map(|s| s.records().iter().rev())
            .filter(|r| !correctable_only || handler(r.data.kind()).can_correct)
            .find(|r| predicate(r))
    }

    /// 修正已提交的编辑
    ///
    /// 新要素的编号不变，只改变位置；依赖这些位置的后续编辑按序号重算。
    /// 任何一步失败时模型保持不变。
    pub fn correct(&mut self, sequence: EditSequence, data: EditData) -> Result<(), EditError> {
        let plan = self.plan_correction(sequence, &data)?;
        self.features = plan.features;
        if let Some(record) = self.sessions.iter_mut().find_map(|s| s.find_mut(sequence)) {
            record.data = data;
        }
        info!(
            "Corrected edit {}: {} feature(s) moved, {} dependent edit(s) recalculated",
            sequence,
            plan.moved.len(),
            plan.dependents.len()
        );
        Ok(())
    }

    /// 修正会带来的改动，不修改模型
    pub fn update_items(&self, sequence: EditSequence, data: &EditData) -> Result<UpdateItems, EditError> {
        let plan = self.plan_correction(sequence, data)?;
        let old = self.record(sequence).ok_or(EditError::UnknownEdit(sequence))?;
        let moved = plan
            .moved
            .iter()
            .filter_map(|id| {
                let before = self.features.get(*id)?.position()?;
                let after = plan.features.get(*id)?.position()?;
                (before != after).then_some(edit::MovedFeature { id: *id, before, after })
            })
            .collect();
        Ok(UpdateItems {
            sequence,
            fields: update::diff_fields(&old.data, data)?,
            moved,
            dependents: plan.dependents,
        })
    }

    fn plan_correction(&self, sequence: EditSequence, data: &EditData) -> Result<CorrectionPlan, EditError> {
        let record = self.record(sequence).ok_or(EditError::UnknownEdit(sequence))?;
        let kind = record.data.kind();
        if !handler(kind).can_correct {
            return Err(EditError::NotCorrectable(kind));
        }
        if data.kind() != kind {
            return Err(EditError::KindChanged {
                expected: kind,
                found: data.kind(),
            });
        }

        let previous: BTreeSet<FeatureId> = record.data.references().into_iter().collect();
        for id in data.references() {
            let feature = self.features.get(id).ok_or(EditError::MissingFeature(id))?;
            if feature.creator >= sequence {
                return Err(EditError::ForwardReference { feature: id, sequence });
            }
            if !feature.active && !previous.contains(&id) {
                return Err(EditError::InactiveFeature(id));
            }
        }

        let mut features = self.features.clone();
        let mut moved = self.recompute(record, data, &mut features)?;
        let mut dependents = Vec::new();

        for later in self.records().filter(|r| r.sequence > sequence) {
            if !later.data.references().iter().any(|id| moved.contains(id)) {
                continue;
            }
            debug!("Recalculating edit {} after correction of {}", later.sequence, sequence);
            let more = self
                .recompute(later, &later.data, &mut features)
                .map_err(|e| EditError::RollForward {
                    sequence: later.sequence,
                    source: Box::new(e),
                })?;
            moved.extend(more);
            dependents.push(later.sequence);
        }

        Ok(CorrectionPlan {
            features,
            moved,
            dependents,
        })
    }

    /// 在 `features` 上重算一条记录，返回几何发生变化的要素（含随点移动的线）
    fn recompute(
        &self,
        record: &EditRecord,
        data: &EditData,
        features: &mut FeatureStore,
    ) -> Result<BTreeSet<FeatureId>, EditError> {
        let outcome = {
            let ctx = EditContext {
                features: &*features,
                coords: self.coords.as_ref(),
                settings: &self.settings,
                check_active: false,
            };
            (handler(data.kind()).compute)(data, &ctx)?
        };

        let roles = outcome.roles();
        let expected: Vec<Role> = record.created.iter().map(|(role, _)| *role).collect();
        if roles != expected {
            return Err(EditError::StructureChanged(format!(
                "edit {} would create {} feature(s) instead of {}",
                record.sequence,
                roles.len(),
                expected.len()
            )));
        }
        if outcome.retired != record.retired {
            return Err(EditError::StructureChanged(format!(
                "edit {} would retire different features",
                record.sequence
            )));
        }

        let mut moved = BTreeSet::new();
        for (creation, (role, id)) in outcome.created.iter().zip(&record.created) {
            let shape = match &creation.shape {
                NewShape::Point(p) => Shape::Point(*p),
                NewShape::Text(t) => Shape::Text(t.clone()),
                NewShape::Line { start, end, arc } => Shape::Line(LineTopology {
                    start: resolve(&record.created, start),
                    end: resolve(&record.created, end),
                    arc: arc.map(|a| crate::feature::ArcTopology {
                        center: resolve(&record.created, &a.center),
                        clockwise: a.clockwise,
                    }),
                }),
            };
            let Some(feature) = features.get_mut(*id) else {
                panic!("feature {} created by edit {} is missing", id, record.sequence);
            };
            if feature.entity != creation.entity {
                return Err(EditError::StructureChanged(format!("entity type of {} would change", role)));
            }
            if feature.shape != shape {
                feature.shape = shape;
                moved.insert(*id);
            }
        }

        // 线的几何由端点推出，端点移动的线也算移动
        let points: Vec<FeatureId> = moved.iter().copied().collect();
        for id in points {
            moved.extend(features.lines_touching(id));
        }
        Ok(moved)
    }

    /// 查要素
    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    /// 编辑种类的显示名
    pub fn kind_name(kind: EditKind) -> &'static str {
        handler(kind).name
    }
}

/// 新要素编号的来源
enum Keys {
    /// 新编辑：按编号组分配，可附带界面预留的编号
    Allocate(Option<IdHandle>),
    /// 重放：使用记录下的编号
    Recorded(Vec<Option<u32>>),
}

fn lookup(created: &[(Role, FeatureId)], role: Role) -> Option<FeatureId> {
    created.iter().find(|(r, _)| *r == role).map(|(_, id)| *id)
}

fn resolve(created: &[(Role, FeatureId)], endpoint: &Endpoint) -> FeatureId {
    match endpoint {
        Endpoint::Existing(id) => *id,
        Endpoint::Created(role) => match lookup(created, *role) {
            Some(id) => id,
            None => panic!("line refers to {} before it was created", role),
        },
    }
}
