//! 对象捕捉计算
//!
//! 参考 LibreCAD 的设计，实现 CAD 标准的对象捕捉：
//! - 端点 (Endpoint) / 顶点 (Vertex)
//! - 中点 (Midpoint)
//! - 圆心 (Center) / 象限点 (Quadrant)
//! - 交点 (Intersection)
//! - 垂足 (Perpendicular) / 切点 (Tangent)
//! - 最近点 (Nearest)
//! - 网格点 (Grid)
//!
//! 候选点按（距离升序，优先级升序）决出唯一胜者；相同输入产生
//! 完全一致的结果。

use crate::entity::{Entity, EntityId};
use crate::geometry::{Arc, Circle, Geometry, Line, Polyline};
use crate::math::{Point2, EPSILON};
use serde::{Deserialize, Serialize};

/// 距离差小于此值的候选视为并列，由优先级决胜
const TIE_EPSILON: f64 = 1e-6;

/// 均衡档位下交点扫描的实体对数上限
const MAX_INTERSECTION_PAIRS: usize = 64;

/// 捕捉类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapType {
    /// 端点捕捉
    Endpoint,
    /// 中点捕捉
    Midpoint,
    /// 圆心捕捉
    Center,
    /// 多段线顶点捕捉
    Vertex,
    /// 交点捕捉
    Intersection,
    /// 垂足捕捉
    Perpendicular,
    /// 切点捕捉
    Tangent,
    /// 最近点捕捉
    Nearest,
    /// 网格点捕捉
    Grid,
    /// 象限点（圆的0°, 90°, 180°, 270°位置）
    Quadrant,
}

impl SnapType {
    pub const ALL: [SnapType; 10] = [
        SnapType::Endpoint,
        SnapType::Midpoint,
        SnapType::Center,
        SnapType::Vertex,
        SnapType::Intersection,
        SnapType::Perpendicular,
        SnapType::Tangent,
        SnapType::Nearest,
        SnapType::Grid,
        SnapType::Quadrant,
    ];

    pub(crate) fn index(&self) -> usize {
        match self {
            SnapType::Endpoint => 0,
            SnapType::Midpoint => 1,
            SnapType::Center => 2,
            SnapType::Vertex => 3,
            SnapType::Intersection => 4,
            SnapType::Perpendicular => 5,
            SnapType::Tangent => 6,
            SnapType::Nearest => 7,
            SnapType::Grid => 8,
            SnapType::Quadrant => 9,
        }
    }

    /// 捕捉类型的名称
    pub fn name(&self) -> &'static str {
        match self {
            SnapType::Endpoint => "端点",
            SnapType::Midpoint => "中点",
            SnapType::Center => "圆心",
            SnapType::Vertex => "顶点",
            SnapType::Intersection => "交点",
            SnapType::Perpendicular => "垂足",
            SnapType::Tangent => "切点",
            SnapType::Nearest => "最近点",
            SnapType::Grid => "网格点",
            SnapType::Quadrant => "象限点",
        }
    }

    /// 捕捉类型的快捷键
    pub fn shortcut(&self) -> &'static str {
        match self {
            SnapType::Endpoint => "END",
            SnapType::Midpoint => "MID",
            SnapType::Center => "CEN",
            SnapType::Vertex => "VER",
            SnapType::Intersection => "INT",
            SnapType::Perpendicular => "PER",
            SnapType::Tangent => "TAN",
            SnapType::Nearest => "NEA",
            SnapType::Grid => "GRI",
            SnapType::Quadrant => "QUA",
        }
    }
}

/// 捕捉掩码（位域，用于快速启用/禁用捕捉类型）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapMask {
    bits: u16,
}

impl SnapMask {
    pub const NONE: SnapMask = SnapMask { bits: 0 };
    pub const ALL: SnapMask = SnapMask { bits: 0x03FF };

    pub fn new(bits: u16) -> Self {
        Self { bits }
    }

    /// 只启用给定的捕捉类型
    pub fn only(types: &[SnapType]) -> Self {
        let mut mask = Self::NONE;
        for t in types {
            mask.set(*t, true);
        }
        mask
    }

    fn bit(snap_type: SnapType) -> u16 {
        1 << snap_type.index()
    }

    pub fn is_enabled(&self, snap_type: SnapType) -> bool {
        self.bits & Self::bit(snap_type) != 0
    }

    pub fn set(&mut self, snap_type: SnapType, enabled: bool) {
        if enabled {
            self.bits |= Self::bit(snap_type);
        } else {
            self.bits &= !Self::bit(snap_type);
        }
    }

    pub fn toggle(&mut self, snap_type: SnapType) {
        self.bits ^= Self::bit(snap_type);
    }
}

impl Default for SnapMask {
    fn default() -> Self {
        // 默认启用常用的捕捉类型
        Self::only(&[
            SnapType::Endpoint,
            SnapType::Midpoint,
            SnapType::Center,
            SnapType::Vertex,
            SnapType::Intersection,
        ])
    }
}

/// 捕捉优先级表（值越小越优先，仅用于距离并列时决胜）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapPriorities {
    ranks: [u8; 10],
}

impl SnapPriorities {
    pub fn get(&self, snap_type: SnapType) -> u8 {
        self.ranks[snap_type.index()]
    }

    pub fn set(&mut self, snap_type: SnapType, rank: u8) {
        self.ranks[snap_type.index()] = rank;
    }
}

impl Default for SnapPriorities {
    fn default() -> Self {
        let mut p = Self { ranks: [100; 10] };
        // 端点/顶点优先于边上的点
        p.set(SnapType::Endpoint, 10);
        p.set(SnapType::Vertex, 15);
        p.set(SnapType::Midpoint, 20);
        p.set(SnapType::Center, 30);
        p.set(SnapType::Quadrant, 40);
        p.set(SnapType::Intersection, 50);
        p.set(SnapType::Perpendicular, 60);
        p.set(SnapType::Tangent, 70);
        p.set(SnapType::Grid, 80);
        p.set(SnapType::Nearest, 90);
        p
    }
}

/// 性能档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PerformanceLevel {
    /// 跳过O(k²)的交点扫描
    Fast,
    /// 交点扫描限制实体对数
    #[default]
    Balanced,
    /// 完整扫描
    Full,
}

/// 捕捉配置
///
/// 由引擎持有，只通过显式的更新调用修改；计算器以只读视图访问。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapConfig {
    /// 捕捉容差（世界单位）
    pub tolerance: f64,
    /// 启用的捕捉类型
    pub enabled_types: SnapMask,
    /// 优先级表
    pub priorities: SnapPriorities,
    /// 索引查询返回的最大候选实体数
    pub max_results: usize,
    /// 网格间距
    pub grid_spacing: f64,
    /// 性能档位
    pub performance_level: PerformanceLevel,
    /// 调试模式（附加校验与日志）
    pub debug_mode: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            tolerance: 10.0,
            enabled_types: SnapMask::default(),
            priorities: SnapPriorities::default(),
            max_results: 32,
            grid_spacing: 10.0,
            performance_level: PerformanceLevel::default(),
            debug_mode: false,
        }
    }
}

impl SnapConfig {
    /// 把非法值夹紧到安全默认值
    ///
    /// 配置是可实时调整的非关键路径，坏值降级为警告而不是错误。
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            tracing::warn!(
                tolerance = self.tolerance,
                "invalid snap tolerance, falling back to {}",
                defaults.tolerance
            );
            self.tolerance = defaults.tolerance;
        }
        if !self.grid_spacing.is_finite() || self.grid_spacing <= 0.0 {
            tracing::warn!(
                grid_spacing = self.grid_spacing,
                "invalid grid spacing, falling back to {}",
                defaults.grid_spacing
            );
            self.grid_spacing = defaults.grid_spacing;
        }
        if self.max_results == 0 {
            tracing::warn!("max_results must be at least 1");
            self.max_results = 1;
        }
        self
    }
}

/// 捕捉候选点
///
/// 每次查询重新生成，从不持久化。`entity_id`是到所属几何的
/// 非拥有引用，需要时通过索引按ID解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapTarget {
    /// 捕捉到的坐标
    pub point: Point2,
    /// 捕捉类型
    pub snap_type: SnapType,
    /// 所属实体ID（交点/网格点没有唯一归属）
    pub entity_id: Option<EntityId>,
    /// 并列决胜用的优先级（越小越优先）
    pub priority: u8,
    /// 覆盖全局容差（可选）
    pub tolerance_override: Option<f64>,
}

/// 捕捉结果（不可变值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapResult {
    /// 原始光标位置
    pub cursor: Point2,
    /// 捕捉点；未命中时等于光标位置
    pub snap_point: Point2,
    /// 是否捕捉成功
    pub snapped: bool,
    /// 光标到捕捉点的距离；未命中时为无穷大
    pub distance: f64,
    /// 命中的候选
    pub target: Option<SnapTarget>,
}

impl SnapResult {
    /// 未命中结果，携带原始光标
    pub fn miss(cursor: Point2) -> Self {
        Self {
            cursor,
            snap_point: cursor,
            snapped: false,
            distance: f64::INFINITY,
            target: None,
        }
    }

    pub fn hit(cursor: Point2, target: SnapTarget) -> Self {
        let distance = (cursor - target.point).norm();
        Self {
            cursor,
            snap_point: target.point,
            snapped: true,
            distance,
            target: Some(target),
        }
    }

    pub fn snap_type(&self) -> Option<SnapType> {
        self.target.as_ref().map(|t| t.snap_type)
    }
}

/// 捕捉计算器
///
/// 为过滤后的实体集枚举候选点并决出唯一胜者。配置由调用方
/// 显式传入，本身不持有可变状态（候选缓冲区除外）。
#[derive(Debug, Default)]
pub struct SnapCalculator {
    /// 复用的候选缓冲区
    candidates: Vec<SnapTarget>,
}

impl SnapCalculator {
    pub fn new() -> Self {
        Self {
            candidates: Vec::with_capacity(64),
        }
    }

    /// 寻找最佳捕捉点
    ///
    /// # 参数
    /// - `cursor`: 光标的世界坐标
    /// - `entities`: 预过滤后的候选实体
    /// - `config`: 只读配置视图
    /// - `snap_from`: 参考点（垂足、切点计算需要）
    pub fn best_snap(
        &mut self,
        cursor: Point2,
        entities: &[&Entity],
        config: &SnapConfig,
        snap_from: Option<Point2>,
    ) -> SnapResult {
        self.candidates.clear();
        let enabled = config.enabled_types;

        if enabled.is_enabled(SnapType::Grid) {
            self.collect_grid(cursor, config);
        }

        for entity in entities {
            self.collect_entity(cursor, entity, config, snap_from);
        }

        if enabled.is_enabled(SnapType::Intersection)
            && config.performance_level != PerformanceLevel::Fast
        {
            self.collect_intersections(entities, config);
        }

        match self.pick_winner(cursor, config) {
            Some(target) => SnapResult::hit(cursor, target),
            None => SnapResult::miss(cursor),
        }
    }

    fn push(
        &mut self,
        point: Point2,
        snap_type: SnapType,
        entity_id: Option<EntityId>,
        config: &SnapConfig,
    ) {
        self.candidates.push(SnapTarget {
            point,
            snap_type,
            entity_id,
            priority: config.priorities.get(snap_type),
            tolerance_override: None,
        });
    }

    /// 决出胜者：距离为主，优先级只在并列时介入；
    /// 再以实体ID和类型兜底，保证结果完全确定。
    fn pick_winner(&self, cursor: Point2, config: &SnapConfig) -> Option<SnapTarget> {
        let mut best: Option<(f64, &SnapTarget)> = None;

        for candidate in &self.candidates {
            let distance = (cursor - candidate.point).norm();
            let tolerance = candidate.tolerance_override.unwrap_or(config.tolerance);
            if distance > tolerance {
                continue;
            }

            best = match best {
                None => Some((distance, candidate)),
                Some((best_distance, current)) => {
                    if beats(distance, candidate, best_distance, current) {
                        Some((distance, candidate))
                    } else {
                        Some((best_distance, current))
                    }
                }
            };
        }

        best.map(|(_, t)| t.clone())
    }

    // ========== 按几何类型收集候选 ==========

    fn collect_entity(
        &mut self,
        cursor: Point2,
        entity: &Entity,
        config: &SnapConfig,
        snap_from: Option<Point2>,
    ) {
        let id = Some(entity.id);
        match &entity.geometry {
            Geometry::Point(p) => {
                if config.enabled_types.is_enabled(SnapType::Endpoint) {
                    self.push(p.position, SnapType::Endpoint, id, config);
                }
            }
            Geometry::Line(line) => self.collect_line(cursor, line, id, config, snap_from),
            Geometry::Circle(circle) => self.collect_circle(cursor, circle, id, config, snap_from),
            Geometry::Arc(arc) => self.collect_arc(cursor, arc, id, config),
            Geometry::Polyline(polyline) => {
                self.collect_polyline(cursor, polyline, id, config, snap_from)
            }
        }
    }

    fn collect_line(
        &mut self,
        cursor: Point2,
        line: &Line,
        id: Option<EntityId>,
        config: &SnapConfig,
        snap_from: Option<Point2>,
    ) {
        let enabled = config.enabled_types;

        if enabled.is_enabled(SnapType::Endpoint) {
            self.push(line.start, SnapType::Endpoint, id, config);
            self.push(line.end, SnapType::Endpoint, id, config);
        }
        if enabled.is_enabled(SnapType::Midpoint) {
            self.push(line.midpoint(), SnapType::Midpoint, id, config);
        }
        if enabled.is_enabled(SnapType::Perpendicular) {
            if let Some(reference) = snap_from {
                if let Some(foot) = line.perpendicular_foot(&reference) {
                    self.push(foot, SnapType::Perpendicular, id, config);
                }
            }
        }
        if enabled.is_enabled(SnapType::Nearest) {
            self.push(line.nearest_point(&cursor), SnapType::Nearest, id, config);
        }
    }

    fn collect_circle(
        &mut self,
        cursor: Point2,
        circle: &Circle,
        id: Option<EntityId>,
        config: &SnapConfig,
        snap_from: Option<Point2>,
    ) {
        let enabled = config.enabled_types;

        if enabled.is_enabled(SnapType::Center) {
            self.push(circle.center, SnapType::Center, id, config);
        }
        if enabled.is_enabled(SnapType::Quadrant) {
            let half_pi = std::f64::consts::FRAC_PI_2;
            for i in 0..4 {
                self.push(
                    circle.point_at_angle(i as f64 * half_pi),
                    SnapType::Quadrant,
                    id,
                    config,
                );
            }
        }
        if enabled.is_enabled(SnapType::Tangent) {
            if let Some(reference) = snap_from {
                if let Some((t1, t2)) = circle.tangent_points(&reference) {
                    self.push(t1, SnapType::Tangent, id, config);
                    self.push(t2, SnapType::Tangent, id, config);
                }
            }
        }
        if enabled.is_enabled(SnapType::Nearest) {
            self.push(circle.nearest_point(&cursor), SnapType::Nearest, id, config);
        }
    }

    fn collect_arc(&mut self, cursor: Point2, arc: &Arc, id: Option<EntityId>, config: &SnapConfig) {
        let enabled = config.enabled_types;

        if enabled.is_enabled(SnapType::Endpoint) {
            self.push(arc.start_point(), SnapType::Endpoint, id, config);
            self.push(arc.end_point(), SnapType::Endpoint, id, config);
        }
        if enabled.is_enabled(SnapType::Center) {
            self.push(arc.center, SnapType::Center, id, config);
        }
        if enabled.is_enabled(SnapType::Midpoint) {
            self.push(arc.midpoint(), SnapType::Midpoint, id, config);
        }
        if enabled.is_enabled(SnapType::Nearest) {
            self.push(arc.nearest_point(&cursor), SnapType::Nearest, id, config);
        }
    }

    fn collect_polyline(
        &mut self,
        cursor: Point2,
        polyline: &Polyline,
        id: Option<EntityId>,
        config: &SnapConfig,
        snap_from: Option<Point2>,
    ) {
        let enabled = config.enabled_types;

        if enabled.is_enabled(SnapType::Vertex) {
            for vertex in &polyline.vertices {
                self.push(*vertex, SnapType::Vertex, id, config);
            }
        }

        for segment in polyline.segments() {
            if enabled.is_enabled(SnapType::Midpoint) {
                self.push(segment.midpoint(), SnapType::Midpoint, id, config);
            }
            if enabled.is_enabled(SnapType::Nearest) {
                self.push(segment.nearest_point(&cursor), SnapType::Nearest, id, config);
            }
            if enabled.is_enabled(SnapType::Perpendicular) {
                if let Some(reference) = snap_from {
                    if let Some(foot) = segment.perpendicular_foot(&reference) {
                        self.push(foot, SnapType::Perpendicular, id, config);
                    }
                }
            }
        }
    }

    /// 交点收集（需要成对的实体）
    fn collect_intersections(&mut self, entities: &[&Entity], config: &SnapConfig) {
        let mut pairs = 0usize;
        'outer: for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                if config.performance_level == PerformanceLevel::Balanced
                    && pairs >= MAX_INTERSECTION_PAIRS
                {
                    break 'outer;
                }
                pairs += 1;

                for point in intersections_of(&entities[i].geometry, &entities[j].geometry) {
                    // 交点涉及两个实体，不设唯一归属
                    self.push(point, SnapType::Intersection, None, config);
                }
            }
        }
    }

    /// 网格捕捉
    fn collect_grid(&mut self, cursor: Point2, config: &SnapConfig) {
        let spacing = config.grid_spacing;
        let grid_point = Point2::new(
            (cursor.x / spacing).round() * spacing,
            (cursor.y / spacing).round() * spacing,
        );
        self.push(grid_point, SnapType::Grid, None, config);
    }
}

fn beats(dist_a: f64, a: &SnapTarget, dist_b: f64, b: &SnapTarget) -> bool {
    if (dist_a - dist_b).abs() > TIE_EPSILON {
        return dist_a < dist_b;
    }
    if a.priority != b.priority {
        return a.priority < b.priority;
    }
    let key = |t: &SnapTarget| (t.entity_id.map_or(u64::MAX, |id| id.0), t.snap_type.index());
    key(a) < key(b)
}

// ========== 交点计算 ==========

fn intersections_of(a: &Geometry, b: &Geometry) -> Vec<Point2> {
    match (a, b) {
        (Geometry::Line(l1), Geometry::Line(l2)) => {
            line_line_intersection(l1, l2).into_iter().collect()
        }
        (Geometry::Line(line), Geometry::Circle(circle))
        | (Geometry::Circle(circle), Geometry::Line(line)) => {
            line_circle_intersection(line, circle)
        }
        (Geometry::Circle(c1), Geometry::Circle(c2)) => circle_circle_intersection(c1, c2),
        (Geometry::Line(line), Geometry::Arc(arc)) | (Geometry::Arc(arc), Geometry::Line(line)) => {
            line_arc_intersection(line, arc)
        }
        (Geometry::Line(line), Geometry::Polyline(poly))
        | (Geometry::Polyline(poly), Geometry::Line(line)) => {
            line_polyline_intersection(line, poly)
        }
        (Geometry::Polyline(p1), Geometry::Polyline(p2)) => {
            polyline_polyline_intersection(p1, p2)
        }
        // 其他组合暂不处理
        _ => Vec::new(),
    }
}

/// 线段-线段交点
fn line_line_intersection(l1: &Line, l2: &Line) -> Option<Point2> {
    let d1 = l1.end - l1.start;
    let d2 = l2.end - l2.start;

    let cross = d1.x * d2.y - d1.y * d2.x;
    // 平行
    if cross.abs() < EPSILON {
        return None;
    }

    let offset = l2.start - l1.start;
    let t1 = (offset.x * d2.y - offset.y * d2.x) / cross;
    let t2 = (offset.x * d1.y - offset.y * d1.x) / cross;

    // 交点必须同时落在两条线段上
    if (0.0..=1.0).contains(&t1) && (0.0..=1.0).contains(&t2) {
        Some(l1.start + d1 * t1)
    } else {
        None
    }
}

/// 线段-圆交点
fn line_circle_intersection(line: &Line, circle: &Circle) -> Vec<Point2> {
    let d = line.end - line.start;
    let f = line.start - circle.center;

    let a = d.dot(&d);
    let b = 2.0 * f.dot(&d);
    let c = f.dot(&f) - circle.radius * circle.radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return Vec::new();
    }

    let mut points = Vec::new();
    if discriminant.abs() < EPSILON {
        // 相切，一个交点
        let t = -b / (2.0 * a);
        if (0.0..=1.0).contains(&t) {
            points.push(line.start + d * t);
        }
    } else {
        let sqrt_disc = discriminant.sqrt();
        for t in [(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)] {
            if (0.0..=1.0).contains(&t) {
                points.push(line.start + d * t);
            }
        }
    }
    points
}

/// 圆-圆交点
fn circle_circle_intersection(c1: &Circle, c2: &Circle) -> Vec<Point2> {
    let d = (c2.center - c1.center).norm();

    // 相离、内含或同心
    if d > c1.radius + c2.radius || d < (c1.radius - c2.radius).abs() || d < EPSILON {
        return Vec::new();
    }

    let a = (c1.radius * c1.radius - c2.radius * c2.radius + d * d) / (2.0 * d);
    let h2 = c1.radius * c1.radius - a * a;
    let h = h2.max(0.0).sqrt();

    let dir = (c2.center - c1.center) / d;
    let base = c1.center + dir * a;
    let perp = crate::geometry::perpendicular_unit(&dir);

    if h < EPSILON {
        // 相切，一个交点
        vec![base]
    } else {
        vec![base + perp * h, base - perp * h]
    }
}

/// 线段-圆弧交点：先求线段与完整圆的交点，再过滤弧范围
fn line_arc_intersection(line: &Line, arc: &Arc) -> Vec<Point2> {
    let circle = Circle::new(arc.center, arc.radius);
    line_circle_intersection(line, &circle)
        .into_iter()
        .filter(|p| {
            let angle = (p.y - arc.center.y).atan2(p.x - arc.center.x);
            arc.contains_angle(angle)
        })
        .collect()
}

/// 线段-多段线交点
fn line_polyline_intersection(line: &Line, polyline: &Polyline) -> Vec<Point2> {
    polyline
        .segments()
        .filter_map(|segment| line_line_intersection(line, &segment))
        .collect()
}

/// 多段线-多段线交点
fn polyline_polyline_intersection(p1: &Polyline, p2: &Polyline) -> Vec<Point2> {
    p1.segments()
        .flat_map(|segment| line_polyline_intersection(&segment, p2))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn line_entity(id: u64, x1: f64, y1: f64, x2: f64, y2: f64) -> Entity {
        Entity::with_id(
            EntityId::from_raw(id),
            Geometry::Line(Line::new(Point2::new(x1, y1), Point2::new(x2, y2))),
        )
    }

    fn config_with(tolerance: f64, mask: SnapMask) -> SnapConfig {
        SnapConfig {
            tolerance,
            enabled_types: mask,
            ..SnapConfig::default()
        }
    }

    #[test]
    fn test_snap_mask() {
        let mut mask = SnapMask::default();
        assert!(mask.is_enabled(SnapType::Endpoint));
        assert!(mask.is_enabled(SnapType::Midpoint));
        assert!(!mask.is_enabled(SnapType::Nearest));

        mask.set(SnapType::Nearest, true);
        assert!(mask.is_enabled(SnapType::Nearest));

        mask.toggle(SnapType::Endpoint);
        assert!(!mask.is_enabled(SnapType::Endpoint));
    }

    #[test]
    fn test_endpoint_snap_near_line_start() {
        let entity = line_entity(1, 0.0, 0.0, 10.0, 0.0);
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::default());

        let result = calc.best_snap(Point2::new(0.2, 0.3), &[&entity], &config, None);
        assert!(result.snapped);
        assert_eq!(result.snap_type(), Some(SnapType::Endpoint));
        assert_eq!(result.snap_point, Point2::new(0.0, 0.0));
        assert!((result.distance - 0.13f64.sqrt()).abs() < 1e-9);
        assert_eq!(result.target.as_ref().unwrap().entity_id, Some(EntityId::from_raw(1)));
    }

    #[test]
    fn test_midpoint_snap() {
        let entity = line_entity(1, 0.0, 0.0, 10.0, 0.0);
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::default());

        let result = calc.best_snap(Point2::new(5.0, 0.05), &[&entity], &config, None);
        assert!(result.snapped);
        assert_eq!(result.snap_type(), Some(SnapType::Midpoint));
        assert_eq!(result.snap_point, Point2::new(5.0, 0.0));
    }

    #[test]
    fn test_nearest_snap_on_circle_perimeter() {
        let entity = Entity::with_id(
            EntityId::from_raw(1),
            Geometry::Circle(Circle::new(Point2::origin(), 5.0)),
        );
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::only(&[SnapType::Nearest]));

        let result = calc.best_snap(Point2::new(5.2, 0.0), &[&entity], &config, None);
        assert!(result.snapped);
        assert_eq!(result.snap_type(), Some(SnapType::Nearest));
        assert!((result.snap_point.x - 5.0).abs() < 1e-9);
        assert!(result.snap_point.y.abs() < 1e-9);
        assert!((result.distance - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_no_candidates_returns_miss() {
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::default());

        let cursor = Point2::new(3.0, 4.0);
        let result = calc.best_snap(cursor, &[], &config, None);
        assert!(!result.snapped);
        assert!(result.target.is_none());
        assert_eq!(result.cursor, cursor);
        assert_eq!(result.snap_point, cursor);
    }

    #[test]
    fn test_out_of_tolerance_returns_miss() {
        let entity = line_entity(1, 0.0, 0.0, 10.0, 0.0);
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::default());

        let result = calc.best_snap(Point2::new(0.0, 5.0), &[&entity], &config, None);
        assert!(!result.snapped);
    }

    #[test]
    fn test_tie_breaks_by_priority() {
        // 光标正好在中点上：中点和最近点候选距离都为0，
        // 优先级更小的中点胜出
        let entity = line_entity(1, 0.0, 0.0, 10.0, 0.0);
        let mut calc = SnapCalculator::new();
        let mut mask = SnapMask::default();
        mask.set(SnapType::Nearest, true);
        let config = config_with(1.0, mask);

        let result = calc.best_snap(Point2::new(5.0, 0.0), &[&entity], &config, None);
        assert_eq!(result.snap_type(), Some(SnapType::Midpoint));
    }

    #[test]
    fn test_tie_breaks_by_entity_id_reproducibly() {
        // 两个端点候选到光标距离完全相等，较小的实体ID胜出
        let a = Entity::with_id(EntityId::from_raw(2), Geometry::Point(Point::new(1.0, 0.0)));
        let b = Entity::with_id(EntityId::from_raw(7), Geometry::Point(Point::new(-1.0, 0.0)));
        let mut calc = SnapCalculator::new();
        let config = config_with(2.0, SnapMask::default());

        for _ in 0..5 {
            let result = calc.best_snap(Point2::origin(), &[&b, &a], &config, None);
            assert_eq!(result.target.as_ref().unwrap().entity_id, Some(EntityId::from_raw(2)));
        }
    }

    #[test]
    fn test_deterministic_results() {
        let e1 = line_entity(1, 0.0, 0.0, 10.0, 0.0);
        let e2 = Entity::with_id(
            EntityId::from_raw(2),
            Geometry::Circle(Circle::new(Point2::new(5.0, 5.0), 3.0)),
        );
        let mut calc = SnapCalculator::new();
        let config = config_with(4.0, SnapMask::ALL);

        let first = calc.best_snap(Point2::new(4.8, 1.9), &[&e1, &e2], &config, None);
        let second = calc.best_snap(Point2::new(4.8, 1.9), &[&e1, &e2], &config, None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_intersection_snap() {
        let e1 = line_entity(1, 0.0, 0.0, 10.0, 10.0);
        let e2 = line_entity(2, 0.0, 10.0, 10.0, 0.0);
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::only(&[SnapType::Intersection]));

        let result = calc.best_snap(Point2::new(5.2, 4.9), &[&e1, &e2], &config, None);
        assert!(result.snapped);
        assert_eq!(result.snap_type(), Some(SnapType::Intersection));
        assert!((result.snap_point.x - 5.0).abs() < 1e-9);
        assert!((result.snap_point.y - 5.0).abs() < 1e-9);
        // 交点没有唯一归属实体
        assert_eq!(result.target.as_ref().unwrap().entity_id, None);
    }

    #[test]
    fn test_fast_level_skips_intersections() {
        let e1 = line_entity(1, 0.0, 0.0, 10.0, 10.0);
        let e2 = line_entity(2, 0.0, 10.0, 10.0, 0.0);
        let mut calc = SnapCalculator::new();
        let mut config = config_with(0.5, SnapMask::only(&[SnapType::Intersection]));
        config.performance_level = PerformanceLevel::Fast;

        let result = calc.best_snap(Point2::new(5.1, 5.0), &[&e1, &e2], &config, None);
        assert!(!result.snapped);
    }

    #[test]
    fn test_grid_snap() {
        let mut calc = SnapCalculator::new();
        let mut config = config_with(5.0, SnapMask::only(&[SnapType::Grid]));
        config.grid_spacing = 10.0;

        let result = calc.best_snap(Point2::new(12.0, 18.6), &[], &config, None);
        assert!(result.snapped);
        assert_eq!(result.snap_type(), Some(SnapType::Grid));
        assert_eq!(result.snap_point, Point2::new(10.0, 20.0));
    }

    #[test]
    fn test_perpendicular_snap_needs_reference() {
        let entity = line_entity(1, 0.0, 0.0, 10.0, 0.0);
        let mut calc = SnapCalculator::new();
        let config = config_with(2.0, SnapMask::only(&[SnapType::Perpendicular]));

        // 没有参考点：无候选
        let result = calc.best_snap(Point2::new(4.0, 1.0), &[&entity], &config, None);
        assert!(!result.snapped);

        // 有参考点：捕捉到垂足
        let result = calc.best_snap(
            Point2::new(4.0, 1.0),
            &[&entity],
            &config,
            Some(Point2::new(4.0, 7.0)),
        );
        assert!(result.snapped);
        assert_eq!(result.snap_type(), Some(SnapType::Perpendicular));
        assert_eq!(result.snap_point, Point2::new(4.0, 0.0));
    }

    #[test]
    fn test_tangent_snap_with_reference() {
        let entity = Entity::with_id(
            EntityId::from_raw(1),
            Geometry::Circle(Circle::new(Point2::origin(), 1.0)),
        );
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::only(&[SnapType::Tangent]));

        let result = calc.best_snap(
            Point2::new(0.5, 0.9),
            &[&entity],
            &config,
            Some(Point2::new(2.0, 0.0)),
        );
        assert!(result.snapped);
        assert_eq!(result.snap_type(), Some(SnapType::Tangent));
        // 切点 (0.5, ±sin60°)，离光标近的那个
        assert!((result.snap_point.x - 0.5).abs() < 1e-9);
        assert!((result.snap_point.y - 0.75f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_arc_candidates() {
        let entity = Entity::with_id(
            EntityId::from_raw(1),
            Geometry::Arc(Arc::new(Point2::origin(), 2.0, 0.0, std::f64::consts::PI)),
        );
        let mut calc = SnapCalculator::new();
        let config = config_with(0.5, SnapMask::default());

        // 弧中点 (0, 2)
        let result = calc.best_snap(Point2::new(0.1, 2.1), &[&entity], &config, None);
        assert_eq!(result.snap_type(), Some(SnapType::Midpoint));

        // 圆心
        let result = calc.best_snap(Point2::new(0.1, 0.0), &[&entity], &config, None);
        assert_eq!(result.snap_type(), Some(SnapType::Center));
    }

    #[test]
    fn test_polyline_vertex_and_segment_candidates() {
        let entity = Entity::with_id(
            EntityId::from_raw(1),
            Geometry::Polyline(Polyline::from_points(
                [
                    Point2::new(0.0, 0.0),
                    Point2::new(10.0, 0.0),
                    Point2::new(10.0, 10.0),
                ],
                false,
            )),
        );
        let mut calc = SnapCalculator::new();
        let config = config_with(1.0, SnapMask::default());

        let result = calc.best_snap(Point2::new(9.8, 0.3), &[&entity], &config, None);
        assert_eq!(result.snap_type(), Some(SnapType::Vertex));
        assert_eq!(result.snap_point, Point2::new(10.0, 0.0));

        let result = calc.best_snap(Point2::new(5.0, 0.4), &[&entity], &config, None);
        assert_eq!(result.snap_type(), Some(SnapType::Midpoint));
        assert_eq!(result.snap_point, Point2::new(5.0, 0.0));
    }

    #[test]
    fn test_line_line_intersection_math() {
        let l1 = Line::new(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0));
        let l2 = Line::new(Point2::new(0.0, 10.0), Point2::new(10.0, 0.0));
        let p = line_line_intersection(&l1, &l2).unwrap();
        assert!((p.x - 5.0).abs() < EPSILON);
        assert!((p.y - 5.0).abs() < EPSILON);

        // 平行线无交点
        let l3 = Line::new(Point2::new(0.0, 1.0), Point2::new(10.0, 11.0));
        assert!(line_line_intersection(&l1, &l3).is_none());

        // 延长线相交但线段不相交
        let l4 = Line::new(Point2::new(20.0, 0.0), Point2::new(30.0, 1.0));
        assert!(line_line_intersection(&l1, &l4).is_none());
    }

    #[test]
    fn test_line_circle_intersection_math() {
        let line = Line::new(Point2::new(-10.0, 0.0), Point2::new(10.0, 0.0));
        let circle = Circle::new(Point2::origin(), 5.0);
        let points = line_circle_intersection(&line, &circle);
        assert_eq!(points.len(), 2);
        for p in &points {
            assert!((p.x.abs() - 5.0).abs() < 1e-9);
            assert!(p.y.abs() < 1e-9);
        }

        // 相切
        let tangent_line = Line::new(Point2::new(-10.0, 5.0), Point2::new(10.0, 5.0));
        let points = line_circle_intersection(&tangent_line, &circle);
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_circle_circle_intersection_math() {
        let c1 = Circle::new(Point2::new(0.0, 0.0), 5.0);
        let c2 = Circle::new(Point2::new(8.0, 0.0), 5.0);
        let points = circle_circle_intersection(&c1, &c2);
        assert_eq!(points.len(), 2);
        for p in &points {
            assert!((p.x - 4.0).abs() < 1e-9);
            assert!((p.y.abs() - 3.0).abs() < 1e-9);
        }

        // 相离
        let far = Circle::new(Point2::new(100.0, 0.0), 5.0);
        assert!(circle_circle_intersection(&c1, &far).is_empty());
    }

    #[test]
    fn test_line_arc_intersection_filters_span() {
        // 上半圆弧
        let arc = Arc::new(Point2::origin(), 5.0, 0.0, std::f64::consts::PI);
        let vertical = Line::new(Point2::new(0.0, -10.0), Point2::new(0.0, 10.0));
        let points = line_arc_intersection(&vertical, &arc);
        // 只有上方的交点 (0, 5) 在弧范围内
        assert_eq!(points.len(), 1);
        assert!((points[0].y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_sanitized_clamps_bad_values() {
        let config = SnapConfig {
            tolerance: -3.0,
            grid_spacing: f64::NAN,
            max_results: 0,
            ..SnapConfig::default()
        }
        .sanitized();

        assert_eq!(config.tolerance, SnapConfig::default().tolerance);
        assert_eq!(config.grid_spacing, SnapConfig::default().grid_spacing);
        assert_eq!(config.max_results, 1);
    }

    #[test]
    fn test_tolerance_override_beats_global() {
        let mut calc = SnapCalculator::new();
        let config = config_with(0.1, SnapMask::default());

        // 全局容差内无候选
        let entity = line_entity(1, 0.0, 0.0, 10.0, 0.0);
        let result = calc.best_snap(Point2::new(0.0, 0.5), &[&entity], &config, None);
        assert!(!result.snapped);

        // 带覆盖容差的候选可以命中
        calc.candidates.clear();
        calc.candidates.push(SnapTarget {
            point: Point2::new(0.0, 0.0),
            snap_type: SnapType::Endpoint,
            entity_id: Some(EntityId::from_raw(1)),
            priority: 10,
            tolerance_override: Some(1.0),
        });
        let winner = calc.pick_winner(Point2::new(0.0, 0.5), &config);
        assert!(winner.is_some());
    }
}
