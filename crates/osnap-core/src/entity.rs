//! 实体标识和管理
//!
//! 实体由调用方逻辑持有，索引只在查询生命周期内持有副本；
//! 删除由调用方驱动，从不自动发生。

use crate::geometry::{Geometry, GeometryValidation};
use crate::math::{BoundingBox2, Point2};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 全局实体ID生成器
static ENTITY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// 实体唯一标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// 分配新的实体ID
    pub fn new() -> Self {
        Self(ENTITY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// 从指定值创建（用于外部数据导入）
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// 空ID（无效）
    pub const NULL: EntityId = EntityId(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// 可捕捉实体
///
/// 包围盒在构造和重新插入时计算并缓存。直接修改`geometry`而不重新
/// 插入索引会导致缓存失效，查询行为未定义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// 唯一标识符
    pub id: EntityId,

    /// 几何数据
    pub geometry: Geometry,

    /// 所属图层（可选）
    pub layer: Option<String>,

    /// 是否可见
    pub visible: bool,

    /// 是否可被捕捉选中
    pub selectable: bool,

    /// 缓存的包围盒
    bounds: BoundingBox2,
}

impl Entity {
    /// 创建新实体（自动分配ID）
    pub fn new(geometry: Geometry) -> Self {
        let bounds = geometry.bounding_box();
        Self {
            id: EntityId::new(),
            geometry,
            layer: None,
            visible: true,
            selectable: true,
            bounds,
        }
    }

    /// 使用指定ID创建
    pub fn with_id(id: EntityId, geometry: Geometry) -> Self {
        let bounds = geometry.bounding_box();
        Self {
            id,
            geometry,
            layer: None,
            visible: true,
            selectable: true,
            bounds,
        }
    }

    /// 使用指定的图层
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// 设置可见性
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// 设置可选中性
    pub fn with_selectable(mut self, selectable: bool) -> Self {
        self.selectable = selectable;
        self
    }

    /// 缓存的包围盒
    pub fn bounds(&self) -> BoundingBox2 {
        self.bounds
    }

    /// 重新计算缓存的包围盒（重新插入索引时调用）
    pub fn refresh_bounds(&mut self) {
        self.bounds = self.geometry.bounding_box();
    }

    /// 结构校验
    pub fn validate(&self) -> GeometryValidation {
        self.geometry.validate()
    }

    /// 捕捉预过滤：可见、可选中，且光标落在容差扩展后的包围盒内
    ///
    /// 恰好在容差边界上的光标视为命中。昂贵的逐类型计算只对
    /// 通过此检查的实体进行。
    pub fn should_snap(&self, cursor: &Point2, tolerance: f64) -> bool {
        if !self.visible || !self.selectable {
            return false;
        }
        self.bounds.expanded(tolerance).contains(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Circle, Line};

    #[test]
    fn test_entity_id_unique() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert!(!a.is_null());
        assert!(EntityId::NULL.is_null());
    }

    #[test]
    fn test_bounds_cached_and_refreshed() {
        let mut entity = Entity::new(Geometry::Line(Line::new(
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
        )));
        assert_eq!(entity.bounds().max, Point2::new(10.0, 0.0));

        entity.geometry = Geometry::Line(Line::new(Point2::new(0.0, 0.0), Point2::new(20.0, 5.0)));
        // 未刷新前保持旧缓存
        assert_eq!(entity.bounds().max, Point2::new(10.0, 0.0));
        entity.refresh_bounds();
        assert_eq!(entity.bounds().max, Point2::new(20.0, 5.0));
    }

    #[test]
    fn test_should_snap_boundary_inclusive() {
        let entity = Entity::new(Geometry::Line(Line::new(
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
        )));

        // 包围盒内
        assert!(entity.should_snap(&Point2::new(5.0, 0.5), 1.0));
        // 恰好在容差边界上：包含
        assert!(entity.should_snap(&Point2::new(11.0, 0.0), 1.0));
        assert!(entity.should_snap(&Point2::new(5.0, -1.0), 1.0));
        // 超出边界
        assert!(!entity.should_snap(&Point2::new(11.0 + 1e-9, 0.0), 1.0));
    }

    #[test]
    fn test_should_snap_respects_visibility() {
        let hidden = Entity::new(Geometry::Circle(Circle::new(Point2::origin(), 5.0)))
            .with_visible(false);
        assert!(!hidden.should_snap(&Point2::origin(), 1.0));

        let locked = Entity::new(Geometry::Circle(Circle::new(Point2::origin(), 5.0)))
            .with_selectable(false);
        assert!(!locked.should_snap(&Point2::origin(), 1.0));
    }
}
