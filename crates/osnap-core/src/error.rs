//! 错误定义

use crate::entity::EntityId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapError {
    /// 插入时发现畸形几何，实体被拒绝
    #[error("invalid geometry for entity {}: {}", .id.0, .errors.join("; "))]
    Validation { id: EntityId, errors: Vec<String> },

    /// 坐标变换钩子失败
    #[error("coordinate transform failed: {0}")]
    Transform(#[from] anyhow::Error),

    /// 查询路径上的内部失败（在引擎边界降级为未命中结果）
    #[error("query failed: {0}")]
    Query(String),

    /// 引擎已释放
    #[error("snap engine already disposed")]
    Disposed,
}
