//! 空间索引
//!
//! R-tree索引，支撑交互会话中持续变化的工作集：
//! - O(log n) 插入/按ID删除
//! - 批量装载（bulk-load）
//! - 范围查询、半径查询、k近邻查询
//! - 按变更计数触发的重建
//!
//! 畸形几何在插入时被拒绝；空索引上的查询返回空集合，从不失败。

use crate::entity::{Entity, EntityId};
use crate::error::SnapError;
use crate::math::{BoundingBox2, Point2};
use rayon::prelude::*;
use rstar::{Envelope, PointDistance, RTree, RTreeObject, SelectionFunction, AABB};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 默认的重建触发阈值（自上次构建以来的变更次数）
const DEFAULT_REBUILD_THRESHOLD: usize = 512;

/// R-tree条目：实体及其包络
#[derive(Debug, Clone)]
struct IndexedEntity {
    entity: Entity,
    envelope: AABB<[f64; 2]>,
}

impl IndexedEntity {
    fn new(entity: Entity) -> Self {
        let envelope = envelope_of(&entity.bounds());
        Self { entity, envelope }
    }
}

fn envelope_of(bounds: &BoundingBox2) -> AABB<[f64; 2]> {
    AABB::from_corners([bounds.min.x, bounds.min.y], [bounds.max.x, bounds.max.y])
}

impl RTreeObject for IndexedEntity {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexedEntity {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        // 粗略的包络距离；精确的几何距离由捕捉计算负责
        self.envelope.distance_2(point)
    }
}

/// 按ID定位条目的选择函数，删除时走树的下降路径
struct SelectById {
    envelope: AABB<[f64; 2]>,
    id: EntityId,
}

impl SelectionFunction<IndexedEntity> for SelectById {
    fn should_unpack_parent(&self, parent: &AABB<[f64; 2]>) -> bool {
        parent.contains_envelope(&self.envelope)
    }

    fn should_unpack_leaf(&self, leaf: &IndexedEntity) -> bool {
        leaf.entity.id == self.id
    }
}

/// 批量插入报告
#[derive(Debug, Clone)]
pub struct BatchInsertReport {
    /// 构建索引耗时
    pub index_time: Duration,
    /// 成功插入的实体数量
    pub inserted: usize,
    /// 被拒绝的实体及原因
    pub rejected: Vec<(EntityId, Vec<String>)>,
}

/// 重建报告
#[derive(Debug, Clone, Copy)]
pub struct RebuildReport {
    pub elapsed: Duration,
    pub entity_count: usize,
}

/// 索引运行指标
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexMetrics {
    pub entity_count: usize,
    pub inserts: u64,
    pub removals: u64,
    pub rebuilds: u64,
    pub last_batch: Option<Duration>,
    pub last_rebuild: Option<Duration>,
}

/// 索引完整性检查结果
#[derive(Debug, Clone)]
pub struct IndexValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// R-tree空间索引
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<IndexedEntity>,
    /// 实体包络缓存：按ID删除时避免全树扫描
    envelopes: HashMap<EntityId, AABB<[f64; 2]>>,
    /// 自上次构建以来的变更次数
    mutations: usize,
    rebuild_threshold: usize,
    metrics: IndexMetrics,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::with_rebuild_threshold(DEFAULT_REBUILD_THRESHOLD)
    }

    /// 指定重建阈值创建
    pub fn with_rebuild_threshold(threshold: usize) -> Self {
        Self {
            tree: RTree::new(),
            envelopes: HashMap::new(),
            mutations: 0,
            rebuild_threshold: threshold.max(1),
            metrics: IndexMetrics::default(),
        }
    }

    /// 插入实体
    ///
    /// 畸形几何被拒绝并报告错误，不会进入索引。已存在的ID被替换：
    /// 替换后再删除，索引状态与从未插入过该ID一致。
    pub fn insert(&mut self, mut entity: Entity) -> Result<(), SnapError> {
        let report = entity.validate();
        if !report.valid {
            return Err(SnapError::Validation {
                id: entity.id,
                errors: report.errors,
            });
        }

        self.remove(entity.id);

        entity.refresh_bounds();
        let item = IndexedEntity::new(entity);
        self.envelopes.insert(item.entity.id, item.envelope);
        self.tree.insert(item);

        self.mutations += 1;
        self.metrics.inserts += 1;
        Ok(())
    }

    /// 批量插入
    ///
    /// 通过bulk-load整体重建树，而不是逐条插入。无效条目被跳过并
    /// 记入报告，其余条目继续装载。
    pub fn insert_batch(&mut self, entities: Vec<Entity>) -> BatchInsertReport {
        let started = Instant::now();

        let (valid, rejected): (Vec<_>, Vec<_>) = entities
            .into_par_iter()
            .map(|mut entity| {
                let report = entity.validate();
                if report.valid {
                    entity.refresh_bounds();
                    Ok(IndexedEntity::new(entity))
                } else {
                    Err((entity.id, report.errors))
                }
            })
            .partition_map(|r| match r {
                Ok(item) => rayon::iter::Either::Left(item),
                Err(e) => rayon::iter::Either::Right(e),
            });

        // 替换语义：新批次里的ID覆盖已有条目
        let incoming: std::collections::HashSet<EntityId> =
            valid.iter().map(|item| item.entity.id).collect();
        let mut all: Vec<IndexedEntity> = self
            .tree
            .iter()
            .filter(|existing| !incoming.contains(&existing.entity.id))
            .cloned()
            .collect();
        let inserted = valid.len();
        all.extend(valid);

        self.envelopes = all
            .iter()
            .map(|item| (item.entity.id, item.envelope))
            .collect();
        self.tree = RTree::bulk_load(all);
        self.mutations = 0;

        let index_time = started.elapsed();
        self.metrics.inserts += inserted as u64;
        self.metrics.last_batch = Some(index_time);
        tracing::debug!(
            inserted,
            rejected = rejected.len(),
            ?index_time,
            "bulk-loaded spatial index"
        );

        BatchInsertReport {
            index_time,
            inserted,
            rejected,
        }
    }

    /// 按ID删除实体
    ///
    /// ID不存在时返回false而不是错误——撤销/重做过程中这是常态。
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(envelope) = self.envelopes.remove(&id) else {
            return false;
        };
        let removed = self
            .tree
            .remove_with_selection_function(SelectById { envelope, id });
        if removed.is_some() {
            self.mutations += 1;
            self.metrics.removals += 1;
            true
        } else {
            false
        }
    }

    /// 按ID查找实体
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let envelope = self.envelopes.get(&id)?;
        self.tree
            .locate_in_envelope_intersecting(envelope)
            .find(|item| item.entity.id == id)
            .map(|item| &item.entity)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// 清空索引
    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.envelopes.clear();
        self.mutations = 0;
    }

    /// 范围查询：返回包围盒与指定范围相交的所有实体
    pub fn search_in_bounds(&self, bounds: &BoundingBox2) -> Vec<&Entity> {
        if bounds.is_empty() {
            return Vec::new();
        }
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(bounds))
            .map(|item| &item.entity)
            .collect()
    }

    /// 半径查询：容差扩展的包络查询，按真实几何距离升序排列，
    /// 截断到max_results
    pub fn search_near_point(
        &self,
        point: &Point2,
        tolerance: f64,
        max_results: usize,
    ) -> Vec<(&Entity, f64)> {
        let query = BoundingBox2::new(*point, *point).expanded(tolerance.max(0.0));
        let mut hits: Vec<(&Entity, f64)> = self
            .tree
            .locate_in_envelope_intersecting(&envelope_of(&query))
            .map(|item| (&item.entity, item.entity.geometry.distance_to_point(point)))
            .filter(|(_, dist)| *dist <= tolerance)
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
        hits.truncate(max_results);
        hits
    }

    /// k近邻查询
    ///
    /// 只按包络距离粗排；精确的逐几何重排属于捕捉计算，不在这里做。
    pub fn find_k_nearest(&self, point: &Point2, k: usize) -> Vec<&Entity> {
        self.tree
            .nearest_neighbor_iter(&[point.x, point.y])
            .take(k)
            .map(|item| &item.entity)
            .collect()
    }

    /// 是否已积累足够的变更、应当重建
    pub fn needs_rebuild(&self) -> bool {
        self.mutations >= self.rebuild_threshold
    }

    /// 全量重建
    ///
    /// O(n log n)，只在变更计数越过阈值或显式调用时执行，
    /// 从不在查询路径上隐式触发。
    pub fn rebuild(&mut self) -> RebuildReport {
        let started = Instant::now();
        let all: Vec<IndexedEntity> = self.tree.iter().cloned().collect();
        let entity_count = all.len();
        self.tree = RTree::bulk_load(all);
        self.mutations = 0;

        let elapsed = started.elapsed();
        self.metrics.rebuilds += 1;
        self.metrics.last_rebuild = Some(elapsed);
        tracing::debug!(entity_count, ?elapsed, "rebuilt spatial index");

        RebuildReport {
            elapsed,
            entity_count,
        }
    }

    /// 结构完整性检查（测试/调试路径，不在热路径上）
    pub fn validate(&self) -> IndexValidation {
        let mut errors = Vec::new();

        if self.tree.size() != self.envelopes.len() {
            errors.push(format!(
                "tree size {} does not match envelope cache size {}",
                self.tree.size(),
                self.envelopes.len()
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for item in self.tree.iter() {
            let id = item.entity.id;
            if !seen.insert(id) {
                errors.push(format!("duplicate entity id {}", id.0));
            }
            match self.envelopes.get(&id) {
                None => errors.push(format!("entity {} missing from envelope cache", id.0)),
                Some(cached) => {
                    if *cached != item.envelope {
                        errors.push(format!("entity {} envelope cache is stale", id.0));
                    }
                }
            }
            let bounds = item.entity.bounds();
            if !bounds.is_finite() || bounds.is_empty() {
                errors.push(format!("entity {} has degenerate bounds", id.0));
            }
            if envelope_of(&bounds) != item.envelope {
                errors.push(format!("entity {} envelope does not match bounds", id.0));
            }
        }

        IndexValidation {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// 运行指标快照
    pub fn metrics(&self) -> IndexMetrics {
        IndexMetrics {
            entity_count: self.tree.size(),
            ..self.metrics
        }
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
