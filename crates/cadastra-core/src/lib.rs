//! Cadastra 核心引擎
//!
//! 地籍测量编辑的核心：可修正、可撤销的编辑日志，以及由方向、距离、
//! 已有线交会出新点的平面几何求解。
//!
//! # 架构设计
//!
//! - `intersect`: 无状态的交会求解函数，结果为 0、1 或 2 个候选点
//! - `ids`: 编号组与编号包，预留/提交/归还
//! - `edit`: 编辑种类、输入载荷和静态分派表
//! - `model`: 显式的编辑上下文，负责执行、修正、撤销
//!
//! # 示例
//!
//! ```rust
//! use cadastra_core::prelude::*;
//!
//! let mut model = Model::default();
//! let a = model
//!     .execute(EditData::NewPoint(NewPointData { position: Point2::new(0.0, 0.0), entity: EntityTypeId(1) }), None)
//!     .unwrap();
//! let b = model
//!     .execute(EditData::NewPoint(NewPointData { position: Point2::new(100.0, 0.0), entity: EntityTypeId(1) }), None)
//!     .unwrap();
//!
//! let data = EditData::IntersectTwoDistances(TwoDistancesData {
//!     first: DistanceFrom { from: a.primary.unwrap(), distance: Distance::meters(70.71) },
//!     second: DistanceFrom { from: b.primary.unwrap(), distance: Distance::meters(70.71) },
//!     choice: Choice::near(Point2::new(50.0, 40.0)),
//!     point_entity: EntityTypeId(1),
//!     first_line: None,
//!     second_line: None,
//! });
//! let preview = model.calculate(&data).unwrap();
//! assert!(preview.success());
//! ```

pub mod coords;
pub mod edit;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod ids;
pub mod input;
pub mod intersect;
pub mod math;
pub mod model;
pub mod observation;
pub mod session;
pub mod settings;
pub mod store;
pub mod units;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::coords::{CoordinateSystem, CoordinateSystemConfig, PlaneSystem, TransverseMercator};
    pub use crate::edit::{
        AttachPointData, DeletionData, DirectionDistanceData, DirectionLineData, DistanceFrom, EditData, EditKind,
        ExtensionData, ImportData, ImportLine, ImportPoint, Leg, NewLineData, NewPointData, NewTextData, PathData,
        PointOnLineData,
        ProgressListener, RadialData, SubdivisionData, TwoDirectionsData, TwoDistancesData, TwoLinesData,
        UpdateItems,
    };
    pub use crate::error::EditError;
    pub use crate::feature::{EditSequence, EntityTypeId, Feature, FeatureId, FeatureKind};
    pub use crate::geometry::{Arc, Circle, LineGeometry, Segment, TextGeometry};
    pub use crate::ids::{IdError, IdGroupConfig, IdHandle, IdManager, NumberingAuthority};
    pub use crate::input::{InputParser, ParseError};
    pub use crate::intersect::{Choice, Constraint, Intersections, SolverParams};
    pub use crate::math::{Point2, Vector2};
    pub use crate::model::{Executed, Model, Preview, ReplayEntry, RollbackStatus};
    pub use crate::observation::{Direction, Distance, Offset};
    pub use crate::session::{EditRecord, Session};
    pub use crate::settings::Settings;
    pub use crate::units::DistanceUnit;
}
