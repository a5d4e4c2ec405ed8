//! 编辑配置
//!
//! 所有字段都有默认值，配置文件中可以只写需要改动的部分。

use crate::coords::CoordinateSystemConfig;
use crate::feature::{EntityType, EntityTypeId, FeatureKind};
use crate::ids::IdGroupConfig;
use crate::intersect::SolverParams;
use crate::math::TINY;
use crate::units::DistanceUnit;
use serde::{Deserialize, Serialize};

/// 编辑配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 几何判断容差（米）
    pub tolerance: f64,
    /// 没有单位缩写时的距离录入单位
    pub entry_unit: DistanceUnit,
    /// 当前用户
    pub user: String,
    /// 实体类型表
    pub entity_types: Vec<EntityType>,
    /// 编号组
    pub id_groups: Vec<IdGroupConfig>,
    /// 坐标系统
    pub coordinate_system: CoordinateSystemConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tolerance: TINY,
            entry_unit: DistanceUnit::Meters,
            user: "surveyor".to_string(),
            entity_types: vec![
                EntityType {
                    id: EntityTypeId(1),
                    name: "Parcel point".to_string(),
                    kind: FeatureKind::Point,
                },
                EntityType {
                    id: EntityTypeId(2),
                    name: "Parcel boundary".to_string(),
                    kind: FeatureKind::Line,
                },
                EntityType {
                    id: EntityTypeId(3),
                    name: "Annotation".to_string(),
                    kind: FeatureKind::Text,
                },
                EntityType {
                    id: EntityTypeId(4),
                    name: "Construction point".to_string(),
                    kind: FeatureKind::Point,
                },
            ],
            id_groups: vec![IdGroupConfig {
                id: 1,
                name: "Parcel points".to_string(),
                lowest_id: 1,
                highest_id: 99_999_999,
                packet_size: 100,
                check_digit: false,
                prefix: String::new(),
                width: 0,
                entity_types: vec![EntityTypeId(1)],
            }],
            coordinate_system: CoordinateSystemConfig::Plane,
        }
    }
}

impl Settings {
    /// 从 JSON 文本读取
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn solver_params(&self) -> SolverParams {
        SolverParams {
            tolerance: self.tolerance,
        }
    }

    pub fn entity_type(&self, id: EntityTypeId) -> Option<&EntityType> {
        self.entity_types.iter().find(|e| e.id == id)
    }

    /// 第一个指定种类的实体类型
    pub fn default_entity(&self, kind: FeatureKind) -> Option<EntityTypeId> {
        self.entity_types.iter().find(|e| e.kind == kind).map(|e| e.id)
    }
}
