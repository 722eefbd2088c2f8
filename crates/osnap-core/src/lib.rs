//! OSNAP 对象捕捉引擎
//!
//! 为交互式2D绘图/CAD/GIS编辑提供实时对象捕捉：给定移动中的光标
//! 和一个动态的几何集合，在容差范围内找出最佳捕捉点（端点、中点、
//! 圆心、顶点、最近点、交点、网格点等）。
//!
//! # 架构设计
//!
//! 自底向上的四层结构：
//! - `geometry`: 逐图元的包围盒/距离/最近点闭式计算，无状态
//! - `spatial`: R-tree空间索引，亚线性的范围/半径/k近邻查询
//! - `snap`: 候选点枚举与（距离，优先级）决胜
//! - `engine`: 对外唯一入口，编排索引与计算器，提供事件和指标
//!
//! # 示例
//!
//! ```rust
//! use osnap_core::prelude::*;
//!
//! let mut engine = SnapEngine::default();
//! engine
//!     .add_geometry(Entity::new(Geometry::Line(Line::new(
//!         Point2::origin(),
//!         Point2::new(100.0, 0.0),
//!     ))))
//!     .unwrap();
//!
//! let result = engine.snap_to_point(Point2::new(0.3, 0.4));
//! assert!(result.snapped);
//! assert_eq!(result.snap_point, Point2::origin());
//! ```

pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod geometry;
pub mod interop;
pub mod math;
pub mod snap;
pub mod spatial;
pub mod transform;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::engine::{EngineMetrics, SnapEngine};
    pub use crate::entity::{Entity, EntityId};
    pub use crate::error::SnapError;
    pub use crate::event::{EngineEvent, EventKind, ListenerId};
    pub use crate::geometry::{Arc, Circle, Geometry, Line, Point, Polyline};
    pub use crate::interop::{CadGeometry, CadShape, OsmElement, OsmElementType, OsmNode};
    pub use crate::math::{BoundingBox2, Point2, Vector2};
    pub use crate::snap::{
        PerformanceLevel, SnapCalculator, SnapConfig, SnapMask, SnapPriorities, SnapResult,
        SnapTarget, SnapType,
    };
    pub use crate::spatial::{BatchInsertReport, IndexMetrics, SpatialIndex};
    pub use crate::transform::CoordinateContext;
}
