//! 要素编号分配
//!
//! 每个编号组按固定大小的编号包（packet）申请连续编号段。包之间首尾相接、
//! 互不重叠。编号先预留（`IdHandle`），编辑提交时才真正占用；放弃时归还。
//!
//! ```text
//! 编号组 lowest_id=1, packet_size=100
//!   包1: [1, 100]    包2: [101, 200]    ...
//! ```

use crate::feature::{EntityTypeId, FeatureKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// 编号分配错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("No identifier group for entity type {0:?}")]
    NoGroup(EntityTypeId),

    #[error("Unknown identifier group {0}")]
    UnknownGroup(u32),

    #[error("Numbering authority refused allocation {min}-{max} for group {group}")]
    AuthorityUnavailable { group: u32, min: u32, max: u32 },

    #[error("Identifier group {0} is exhausted")]
    Exhausted(u32),

    #[error("Identifier {0} is already reserved")]
    AlreadyReserved(u32),

    #[error("Identifier {0} is already in use")]
    AlreadyUsed(u32),

    #[error("Identifier {0} was not reserved")]
    NotReserved(u32),

    #[error("Identifier {0} is outside the range of its group")]
    OutOfRange(u32),

    #[error("Identifier packet {min}-{max} overlaps an existing packet")]
    Overlap { min: u32, max: u32 },

    #[error("Identifier handle belongs to a different entity type")]
    WrongEntity,
}

/// 编号组配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdGroupConfig {
    pub id: u32,
    pub name: String,
    /// 组内最小编号
    pub lowest_id: u32,
    /// 组内最大编号
    #[serde(default = "default_highest")]
    pub highest_id: u32,
    pub packet_size: u32,
    /// 是否附加校验位
    #[serde(default)]
    pub check_digit: bool,
    /// 编号前缀
    #[serde(default)]
    pub prefix: String,
    /// 数字部分最小位数（不足补零）
    #[serde(default)]
    pub width: usize,
    /// 使用该组编号的实体类型
    #[serde(default)]
    pub entity_types: Vec<EntityTypeId>,
}

fn default_highest() -> u32 {
    u32::MAX / 10
}

/// 闭区间编号段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub min: u32,
    pub max: u32,
}

impl IdRange {
    pub fn size(&self) -> u32 {
        self.max - self.min + 1
    }

    pub fn contains(&self, id: u32) -> bool {
        self.min <= id && id <= self.max
    }

    pub fn overlaps(&self, other: &IdRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

/// 编号段的审批方（例如共享的编号服务器）
pub trait NumberingAuthority: std::fmt::Debug + Send {
    /// 是否同意把 `range` 分给编号组 `group`
    fn approve(&mut self, group: u32, range: IdRange) -> bool;
}

/// 本地审批，总是同意
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAuthority;

impl NumberingAuthority for LocalAuthority {
    fn approve(&mut self, _group: u32, _range: IdRange) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Free,
    Reserved,
    Used,
}

/// 编号包
#[derive(Debug, Clone)]
pub struct IdPacket {
    range: IdRange,
    slots: Vec<Slot>,
}

impl IdPacket {
    fn new(range: IdRange) -> Self {
        Self {
            range,
            slots: vec![Slot::Free; range.size() as usize],
        }
    }

    pub fn range(&self) -> IdRange {
        self.range
    }

    pub fn size(&self) -> u32 {
        self.range.size()
    }

    /// 已占用的编号数
    pub fn used_count(&self) -> u32 {
        self.slots.iter().filter(|s| **s == Slot::Used).count() as u32
    }

    pub fn reserved_count(&self) -> u32 {
        self.slots.iter().filter(|s| **s == Slot::Reserved).count() as u32
    }

    pub fn has_avail(&self) -> bool {
        self.slots.contains(&Slot::Free)
    }

    fn slot(&self, id: u32) -> Option<Slot> {
        if !self.range.contains(id) {
            return None;
        }
        self.slots.get((id - self.range.min) as usize).copied()
    }

    fn set(&mut self, id: u32, slot: Slot) {
        let index = (id - self.range.min) as usize;
        self.slots[index] = slot;
    }

    fn reserve_next(&mut self) -> Option<u32> {
        let index = self.slots.iter().position(|s| *s == Slot::Free)?;
        self.slots[index] = Slot::Reserved;
        Some(self.range.min + index as u32)
    }

    fn reserve(&mut self, id: u32) -> Result<(), IdError> {
        match self.slot(id) {
            Some(Slot::Free) => {
                self.set(id, Slot::Reserved);
                Ok(())
            }
            Some(Slot::Reserved) => Err(IdError::AlreadyReserved(id)),
            Some(Slot::Used) => Err(IdError::AlreadyUsed(id)),
            None => Err(IdError::OutOfRange(id)),
        }
    }

    fn release(&mut self, id: u32) {
        if self.slot(id) == Some(Slot::Reserved) {
            self.set(id, Slot::Free);
        }
    }

    fn commit(&mut self, id: u32) -> Result<(), IdError> {
        match self.slot(id) {
            Some(Slot::Reserved) => {
                self.set(id, Slot::Used);
                Ok(())
            }
            Some(Slot::Used) => Err(IdError::AlreadyUsed(id)),
            Some(Slot::Free) => Err(IdError::NotReserved(id)),
            None => Err(IdError::OutOfRange(id)),
        }
    }

    fn free(&mut self, id: u32) {
        debug_assert_eq!(self.slot(id), Some(Slot::Used), "freeing identifier {} that is not in use", id);
        self.set(id, Slot::Free);
    }
}

/// 编号组
#[derive(Debug, Clone)]
pub struct IdGroup {
    config: IdGroupConfig,
    /// 已分配的最大编号（0 表示还没有分配过）
    max_allocated: u32,
    packets: Vec<IdPacket>,
}

impl IdGroup {
    pub fn new(config: IdGroupConfig) -> Self {
        Self {
            config,
            max_allocated: 0,
            packets: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &IdGroupConfig {
        &self.config
    }

    pub fn packets(&self) -> &[IdPacket] {
        &self.packets
    }

    pub fn max_allocated(&self) -> u32 {
        self.max_allocated
    }

    pub fn used_count(&self) -> u32 {
        self.packets.iter().map(|p| p.used_count()).sum()
    }

    /// 申请下一个编号包
    ///
    /// 第一个包从 `lowest_id` 开始，之后的包紧接上一个包的末尾。
    pub fn get_allocation(&mut self, authority: &mut dyn NumberingAuthority) -> Result<IdRange, IdError> {
        let size = self.config.packet_size.max(1);
        let min = if self.max_allocated == 0 {
            self.config.lowest_id.max(1)
        } else {
            self.max_allocated
                .checked_add(1)
                .ok_or(IdError::Exhausted(self.config.id))?
        };
        let max = min
            .checked_add(size - 1)
            .filter(|max| *max <= self.config.highest_id)
            .ok_or(IdError::Exhausted(self.config.id))?;
        let range = IdRange { min, max };
        self.approve_packet(range, authority)?;
        Ok(range)
    }

    /// 经审批后加入新包
    fn approve_packet(&mut self, range: IdRange, authority: &mut dyn NumberingAuthority) -> Result<(), IdError> {
        if !authority.approve(self.config.id, range) {
            warn!(
                "Numbering authority refused {}-{} for group {}",
                range.min, range.max, self.config.name
            );
            return Err(IdError::AuthorityUnavailable {
                group: self.config.id,
                min: range.min,
                max: range.max,
            });
        }
        self.add_packet(range)?;
        info!(
            "Allocated identifiers {}-{} for group {}",
            range.min, range.max, self.config.name
        );
        Ok(())
    }

    /// 插入新包；包按 `min` 排序且互不重叠，只需检查插入位置两侧
    fn add_packet(&mut self, range: IdRange) -> Result<(), IdError> {
        let at = self.packets.partition_point(|p| p.range.min < range.min);
        let overlaps = |i: usize| self.packets.get(i).is_some_and(|p| p.range.overlaps(&range));
        if (at > 0 && overlaps(at - 1)) || overlaps(at) {
            return Err(IdError::Overlap {
                min: range.min,
                max: range.max,
            });
        }
        self.packets.insert(at, IdPacket::new(range));
        self.max_allocated = self.max_allocated.max(range.max);
        Ok(())
    }

    fn packet_index(&self, id: u32) -> Option<usize> {
        let at = self.packets.partition_point(|p| p.range.max < id);
        self.packets.get(at).filter(|p| p.range.contains(id)).map(|_| at)
    }

    fn packet_mut(&mut self, id: u32) -> Option<&mut IdPacket> {
        let index = self.packet_index(id)?;
        Some(&mut self.packets[index])
    }

    /// 预留最早一个有空位的包中的第一个空编号；都满了就申请新包
    fn reserve_next(&mut self, authority: &mut dyn NumberingAuthority) -> Result<u32, IdError> {
        if let Some(id) = self.packets.iter_mut().find(|p| p.has_avail()).and_then(|p| p.reserve_next()) {
            return Ok(id);
        }
        let range = self.get_allocation(authority)?;
        self.packet_mut(range.min)
            .and_then(|p| p.reserve_next())
            .ok_or(IdError::Exhausted(self.config.id))
    }

    /// 预留指定编号；没有包覆盖该编号时只申请覆盖它的那一个包
    fn reserve_specific(&mut self, id: u32, authority: &mut dyn NumberingAuthority) -> Result<(), IdError> {
        if id < self.config.lowest_id.max(1) || id > self.config.highest_id {
            return Err(IdError::OutOfRange(id));
        }
        if self.packet_index(id).is_none() {
            let range = self.range_containing(id);
            self.approve_packet(range, authority)?;
        }
        self.packet_mut(id).ok_or(IdError::OutOfRange(id))?.reserve(id)
    }

    /// 按包大小对齐且包含 `id` 的编号段，截去与已有包重叠的部分
    ///
    /// 调用前 `id` 不属于任何包。
    fn range_containing(&self, id: u32) -> IdRange {
        let size = self.config.packet_size.max(1);
        let lowest = self.config.lowest_id.max(1);
        let min = lowest + (id - lowest) / size * size;
        let max = min.saturating_add(size - 1).min(self.config.highest_id);

        let at = self.packets.partition_point(|p| p.range.max < id);
        let min = match at.checked_sub(1).map(|i| self.packets[i].range.max) {
            Some(prev) if prev >= min => prev + 1,
            _ => min,
        };
        let max = match self.packets.get(at) {
            Some(next) if next.range.min <= max => next.range.min - 1,
            _ => max,
        };
        IdRange { min, max }
    }

    /// 格式化编号
    pub fn format_key(&self, id: u32) -> String {
        let mut key = format!("{}{:0width$}", self.config.prefix, id, width = self.config.width);
        if self.config.check_digit {
            key.push_str(&check_digit(id).to_string());
        }
        key
    }

    /// 数值形式的编号（含校验位）；编号不是纯数字时返回 `None`
    pub fn numeric_key(&self, id: u32) -> Option<u32> {
        if !self.config.prefix.is_empty() || self.config.width > 1 {
            return None;
        }
        if self.config.check_digit {
            id.checked_mul(10)?.checked_add(check_digit(id))
        } else {
            Some(id)
        }
    }
}

/// 校验位：反复求各位数字之和直到只剩一位
pub fn check_digit(num: u32) -> u32 {
    let mut val = num;
    while val > 9 {
        let mut total = 0;
        while val != 0 {
            total += val % 10;
            val /= 10;
        }
        val = total;
    }
    val
}

/// 已预留、尚未提交的编号
///
/// 句柄不能复制；要么通过 `IdManager::commit` 提交，要么通过 `IdManager::release` 归还。
#[derive(Debug, PartialEq, Eq)]
pub struct IdHandle {
    group: u32,
    entity: EntityTypeId,
    raw: u32,
}

impl IdHandle {
    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn entity(&self) -> EntityTypeId {
        self.entity
    }

    /// 是否可用于指定实体类型
    pub fn is_valid_for(&self, entity: EntityTypeId) -> bool {
        self.entity == entity
    }
}

/// 编号包的持久化记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub group: u32,
    pub min: u32,
    pub max: u32,
    pub used: u32,
}

/// 编号管理器
#[derive(Debug)]
pub struct IdManager {
    groups: Vec<IdGroup>,
    authority: Box<dyn NumberingAuthority>,
}

impl Default for IdManager {
    fn default() -> Self {
        Self::new(&[], Box::new(LocalAuthority))
    }
}

impl IdManager {
    pub fn new(configs: &[IdGroupConfig], authority: Box<dyn NumberingAuthority>) -> Self {
        Self {
            groups: configs.iter().cloned().map(IdGroup::new).collect(),
            authority,
        }
    }

    pub fn groups(&self) -> &[IdGroup] {
        &self.groups
    }

    pub fn group(&self, id: u32) -> Option<&IdGroup> {
        self.groups.iter().find(|g| g.id() == id)
    }

    fn group_mut(&mut self, id: u32) -> Result<&mut IdGroup, IdError> {
        self.groups
            .iter_mut()
            .find(|g| g.id() == id)
            .ok_or(IdError::UnknownGroup(id))
    }

    /// 实体类型对应的编号组
    pub fn group_for(&self, entity: EntityTypeId) -> Option<&IdGroup> {
        self.groups.iter().find(|g| g.config.entity_types.contains(&entity))
    }

    /// 更换编号审批方
    pub fn set_authority(&mut self, authority: Box<dyn NumberingAuthority>) {
        self.authority = authority;
    }

    /// 为编号组申请新包
    pub fn get_allocation(&mut self, group: u32) -> Result<IdRange, IdError> {
        let index = self
            .groups
            .iter()
            .position(|g| g.id() == group)
            .ok_or(IdError::UnknownGroup(group))?;
        self.groups[index].get_allocation(self.authority.as_mut())
    }

    fn group_index_for(&self, entity: EntityTypeId) -> Result<usize, IdError> {
        self.groups
            .iter()
            .position(|g| g.config.entity_types.contains(&entity))
            .ok_or(IdError::NoGroup(entity))
    }

    /// 为实体类型预留下一个编号
    pub fn reserve(&mut self, entity: EntityTypeId) -> Result<IdHandle, IdError> {
        let index = self.group_index_for(entity)?;
        let group = &mut self.groups[index];
        let raw = group.reserve_next(self.authority.as_mut())?;
        Ok(IdHandle {
            group: group.id(),
            entity,
            raw,
        })
    }

    /// 为实体类型预留指定编号
    pub fn reserve_specific(&mut self, entity: EntityTypeId, raw: u32) -> Result<IdHandle, IdError> {
        let index = self.group_index_for(entity)?;
        let group = &mut self.groups[index];
        group.reserve_specific(raw, self.authority.as_mut())?;
        Ok(IdHandle {
            group: group.id(),
            entity,
            raw,
        })
    }

    /// 归还未提交的编号
    pub fn release(&mut self, handle: IdHandle) {
        if let Ok(group) = self.group_mut(handle.group) {
            if let Some(packet) = group.packet_mut(handle.raw) {
                packet.release(handle.raw);
            }
        }
    }

    /// 提交编号，返回格式化后的要素编号
    pub fn commit(&mut self, handle: IdHandle) -> Result<FeatureKey, IdError> {
        let group = self.group_mut(handle.group)?;
        group
            .packet_mut(handle.raw)
            .ok_or(IdError::OutOfRange(handle.raw))?
            .commit(handle.raw)?;
        Ok(FeatureKey {
            group: handle.group,
            raw: handle.raw,
            text: group.format_key(handle.raw),
        })
    }

    /// 释放已占用的编号（撤销编辑时调用）
    pub fn free(&mut self, key: &FeatureKey) {
        let packet = self
            .group_mut(key.group)
            .ok()
            .and_then(|g| g.packet_mut(key.raw));
        match packet {
            Some(packet) => packet.free(key.raw),
            None => debug_assert!(false, "key {} does not belong to any packet", key.text),
        }
    }

    /// 全部编号组已占用的编号总数
    pub fn used_count(&self) -> u32 {
        self.groups.iter().map(|g| g.used_count()).sum()
    }

    /// 导出编号包记录
    pub fn packet_records(&self) -> Vec<PacketRecord> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.packets.iter().map(move |p| PacketRecord {
                    group: g.id(),
                    min: p.range.min,
                    max: p.range.max,
                    used: p.used_count(),
                })
            })
            .collect()
    }

    /// 恢复编号包（不经过审批方）；占用状态由随后的编辑重放重建
    pub fn restore_packets(&mut self, records: &[PacketRecord]) -> Result<(), IdError> {
        for record in records {
            if record.min > record.max {
                return Err(IdError::OutOfRange(record.min));
            }
            self.group_mut(record.group)?.add_packet(IdRange {
                min: record.min,
                max: record.max,
            })?;
        }
        Ok(())
    }
}
