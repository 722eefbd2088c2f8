//! 捕捉引擎
//!
//! 对外的唯一入口：持有一个空间索引和一个捕捉计算器，提供
//! 几何摄取、光标查询、配置、坐标变换、事件和指标。
//!
//! 查询路径从不崩溃：内部失败降级为安全的未命中结果并派发
//! `snap:error`事件，绘图会话保持响应。

use crate::entity::{Entity, EntityId};
use crate::error::SnapError;
use crate::event::{EngineEvent, EventHub, EventKind, ListenerId};
use crate::interop::{cad_to_entity, osm_to_entity, CadShape, OsmElement};
use crate::math::{point_is_finite, BoundingBox2, Point2};
use crate::snap::{SnapCalculator, SnapConfig, SnapResult};
use crate::spatial::{
    BatchInsertReport, IndexMetrics, IndexValidation, RebuildReport, SpatialIndex,
};
use crate::transform::CoordinateContext;
use std::time::{Duration, Instant};

/// 引擎运行指标
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics {
    /// 查询总数
    pub query_count: u64,
    /// 命中次数
    pub snap_hits: u64,
    /// 最近一次查询耗时
    pub last_query_time: Option<Duration>,
    /// 平均查询耗时
    pub average_query_time: Duration,
    /// 索引指标
    pub index: IndexMetrics,
}

/// 捕捉引擎
///
/// 面向单个逻辑调用方的单光标流设计：内部无锁，跨线程并发
/// 修改+查询需要调用方自行串行化。顺序调用按调用顺序完成。
pub struct SnapEngine {
    index: SpatialIndex,
    calculator: SnapCalculator,
    config: SnapConfig,
    context: Option<CoordinateContext>,
    hub: EventHub,
    enabled: bool,
    disposed: bool,
    /// 上一次查询是否命中，只用于决定snap:lost的派发
    last_hit: bool,
    /// 垂足/切点计算的参考点
    snap_from: Option<Point2>,
    query_count: u64,
    snap_hits: u64,
    total_query_time: Duration,
    last_query_time: Option<Duration>,
}

impl SnapEngine {
    pub fn new(config: SnapConfig) -> Self {
        Self {
            index: SpatialIndex::new(),
            calculator: SnapCalculator::new(),
            config: config.sanitized(),
            context: None,
            hub: EventHub::new(),
            enabled: true,
            disposed: false,
            last_hit: false,
            snap_from: None,
            query_count: 0,
            snap_hits: 0,
            total_query_time: Duration::ZERO,
            last_query_time: None,
        }
    }

    // ========== 查询 ==========

    /// 寻找光标附近的最佳捕捉点
    ///
    /// 禁用状态下直接返回未命中结果，不触碰索引。命中时派发
    /// `snap:found`；从命中转为未命中时派发一次`snap:lost`。
    pub fn snap_to_point(&mut self, cursor: Point2) -> SnapResult {
        if self.disposed {
            debug_assert!(false, "snap_to_point called on disposed engine");
            tracing::error!("snap_to_point called on disposed engine");
            return SnapResult::miss(cursor);
        }
        if !self.enabled {
            return SnapResult::miss(cursor);
        }

        let started = Instant::now();
        self.hub.emit(&EngineEvent::SnapStart { cursor });

        let result = match self.run_query(cursor) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "snap query failed");
                self.hub.emit(&EngineEvent::SnapError {
                    message: err.to_string(),
                });
                SnapResult::miss(cursor)
            }
        };

        let elapsed = started.elapsed();
        self.query_count += 1;
        self.total_query_time += elapsed;
        self.last_query_time = Some(elapsed);
        if result.snapped {
            self.snap_hits += 1;
        }

        // 命中时每次都通知（目标可能换了）；丢失只在转换时通知一次
        if result.snapped {
            self.hub.emit(&EngineEvent::SnapFound {
                result: result.clone(),
            });
        } else if self.last_hit {
            self.hub.emit(&EngineEvent::SnapLost {
                cursor: result.cursor,
            });
        }
        self.last_hit = result.snapped;

        result
    }

    fn run_query(&mut self, cursor: Point2) -> Result<SnapResult, SnapError> {
        if !point_is_finite(&cursor) {
            return Err(SnapError::Query(
                "cursor coordinates are not finite".to_string(),
            ));
        }

        let world_cursor = match &self.context {
            Some(ctx) => ctx.apply_forward(cursor)?,
            None => cursor,
        };

        let query_bounds =
            BoundingBox2::new(world_cursor, world_cursor).expanded(self.config.tolerance);
        let mut nearby = self.index.search_in_bounds(&query_bounds);
        nearby.retain(|e| e.should_snap(&world_cursor, self.config.tolerance));
        if nearby.len() > self.config.max_results {
            // 超出候选上限时保留最近、捕捉价值最高的实体
            nearby.sort_by(|a, b| {
                a.geometry
                    .distance_to_point(&world_cursor)
                    .total_cmp(&b.geometry.distance_to_point(&world_cursor))
                    .then_with(|| {
                        a.geometry
                            .base_snap_priority()
                            .cmp(&b.geometry.base_snap_priority())
                    })
                    .then_with(|| a.id.cmp(&b.id))
            });
            nearby.truncate(self.config.max_results);
        }

        let world_result =
            self.calculator
                .best_snap(world_cursor, &nearby, &self.config, self.snap_from);

        match &self.context {
            None => Ok(world_result),
            Some(ctx) => match world_result.target {
                // 结果变换回调用方坐标系，距离在输出空间重算
                Some(mut target) => {
                    target.point = ctx.apply_inverse(target.point)?;
                    Ok(SnapResult::hit(cursor, target))
                }
                None => Ok(SnapResult::miss(cursor)),
            },
        }
    }

    // ========== 几何摄取 ==========

    /// 插入单个几何
    pub fn add_geometry(&mut self, entity: Entity) -> Result<(), SnapError> {
        self.ensure_ready()?;
        self.index.insert(entity)?;
        self.maybe_rebuild();
        Ok(())
    }

    /// 批量插入（bulk-load）
    ///
    /// 无效条目被跳过并记入报告，其余条目继续装载。
    pub fn add_geometries(&mut self, entities: Vec<Entity>) -> BatchInsertReport {
        if self.ensure_ready().is_err() {
            return BatchInsertReport {
                index_time: Duration::ZERO,
                inserted: 0,
                rejected: Vec::new(),
            };
        }
        self.index.insert_batch(entities)
    }

    /// 摄取CAD图形
    pub fn add_cad_geometries(&mut self, shapes: &[CadShape]) -> BatchInsertReport {
        let entities = shapes.iter().map(cad_to_entity).collect();
        self.add_geometries(entities)
    }

    /// 摄取OSM要素（节点与路径；关系被跳过）
    pub fn add_osm_buildings(&mut self, elements: &[OsmElement]) -> BatchInsertReport {
        let entities = elements.iter().filter_map(osm_to_entity).collect();
        self.add_geometries(entities)
    }

    /// 按ID删除几何；ID不存在时返回false
    pub fn remove_geometry(&mut self, id: EntityId) -> bool {
        if self.ensure_ready().is_err() {
            return false;
        }
        let removed = self.index.remove(id);
        if removed {
            self.maybe_rebuild();
        }
        removed
    }

    /// 清空所有几何
    pub fn clear_geometries(&mut self) {
        if self.ensure_ready().is_ok() {
            self.index.clear();
        }
    }

    /// 按ID解析几何（捕捉目标的非拥有引用通过这里取回实体）
    pub fn get_geometry(&self, id: EntityId) -> Option<&Entity> {
        self.index.get(id)
    }

    pub fn geometry_count(&self) -> usize {
        self.index.len()
    }

    // ========== 索引维护 ==========

    /// 显式全量重建
    pub fn rebuild_index(&mut self) -> RebuildReport {
        let report = self.index.rebuild();
        self.emit_rebuilt(report);
        report
    }

    /// 索引完整性检查（调试/测试路径）
    pub fn validate_index(&self) -> IndexValidation {
        self.index.validate()
    }

    /// 变更计数越过阈值时重建；查询路径上从不隐式触发
    fn maybe_rebuild(&mut self) {
        if self.index.needs_rebuild() {
            let report = self.index.rebuild();
            if self.config.debug_mode {
                let check = self.index.validate();
                if !check.valid {
                    tracing::error!(errors = ?check.errors, "index integrity check failed");
                }
            }
            self.emit_rebuilt(report);
        }
    }

    fn emit_rebuilt(&self, report: RebuildReport) {
        self.hub.emit(&EngineEvent::IndexRebuilt {
            entity_count: report.entity_count,
            elapsed: report.elapsed,
        });
    }

    // ========== 配置 ==========

    /// 更新配置（非法值被夹紧到安全默认值）
    ///
    /// 只影响后续查询，对已完成的查询无追溯作用。
    pub fn update_config(&mut self, config: SnapConfig) {
        self.config = config.sanitized();
    }

    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    /// 全局开关：禁用后查询短路为未命中
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 设置垂足/切点计算的参考点（正在绘制的线的起点）
    pub fn set_snap_from(&mut self, reference: Option<Point2>) {
        self.snap_from = reference;
    }

    /// 设置坐标系上下文
    pub fn set_coordinate_context(&mut self, context: CoordinateContext) {
        self.context = Some(context);
    }

    pub fn clear_coordinate_context(&mut self) {
        self.context = None;
    }

    // ========== 事件与指标 ==========

    /// 注册事件监听器
    pub fn on(&mut self, kind: EventKind, listener: impl Fn(&EngineEvent) + 'static) -> ListenerId {
        self.hub.on(kind, listener)
    }

    /// 注销事件监听器
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.hub.off(id)
    }

    /// 运行指标快照
    pub fn metrics(&self) -> EngineMetrics {
        let average = if self.query_count > 0 {
            self.total_query_time / self.query_count as u32
        } else {
            Duration::ZERO
        };
        EngineMetrics {
            query_count: self.query_count,
            snap_hits: self.snap_hits,
            last_query_time: self.last_query_time,
            average_query_time: average,
            index: self.index.metrics(),
        }
    }

    // ========== 生命周期 ==========

    /// 释放索引和监听器
    ///
    /// 释放后的任何调用都是编程错误：查询在调试构建下断言失败，
    /// 修改操作返回[`SnapError::Disposed`]。
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.index.clear();
        self.hub.clear();
        tracing::debug!("snap engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_ready(&self) -> Result<(), SnapError> {
        if self.disposed {
            tracing::error!("operation on disposed snap engine");
            return Err(SnapError::Disposed);
        }
        Ok(())
    }
}

impl Default for SnapEngine {
    fn default() -> Self {
        Self::new(SnapConfig::default())
    }
}

impl std::fmt::Debug for SnapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapEngine")
            .field("entity_count", &self.index.len())
            .field("enabled", &self.enabled)
            .field("disposed", &self.disposed)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
