//! 几何图元定义
//!
//! 支持捕捉的基本图元：
//! - 点 (Point)
//! - 线段 (Line)
//! - 圆 (Circle)
//! - 圆弧 (Arc)
//! - 多段线 (Polyline)
//!
//! 每种图元提供包围盒、点距离和最近点的闭式计算。

use crate::math::{point_is_finite, BoundingBox2, Point2, Vector2, EPSILON};
use serde::{Deserialize, Serialize};

/// 几何类型枚举
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    Line(Line),
    Circle(Circle),
    Arc(Arc),
    Polyline(Polyline),
    // 未来扩展
    // Ellipse(Ellipse),
    // Spline(Spline),
}

impl Geometry {
    /// 获取几何的包围盒
    pub fn bounding_box(&self) -> BoundingBox2 {
        match self {
            Geometry::Point(p) => p.bounding_box(),
            Geometry::Line(l) => l.bounding_box(),
            Geometry::Circle(c) => c.bounding_box(),
            Geometry::Arc(a) => a.bounding_box(),
            Geometry::Polyline(pl) => pl.bounding_box(),
        }
    }

    /// 计算点到几何的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        match self {
            Geometry::Point(p) => (p.position - point).norm(),
            Geometry::Line(l) => l.distance_to_point(point),
            Geometry::Circle(c) => c.distance_to_point(point).abs(),
            Geometry::Arc(a) => a.distance_to_point(point),
            Geometry::Polyline(pl) => pl.distance_to_point(point),
        }
    }

    /// 计算几何上距离指定点最近的点
    pub fn nearest_point(&self, point: &Point2) -> Point2 {
        match self {
            Geometry::Point(p) => p.position,
            Geometry::Line(l) => l.nearest_point(point),
            Geometry::Circle(c) => c.nearest_point(point),
            Geometry::Arc(a) => a.nearest_point(point),
            Geometry::Polyline(pl) => pl.nearest_point(point),
        }
    }

    /// 结构校验
    ///
    /// 只做结构性检查，从不panic，批量校验可以跳过坏条目继续。
    pub fn validate(&self) -> GeometryValidation {
        let mut errors = Vec::new();
        match self {
            Geometry::Point(p) => {
                if !point_is_finite(&p.position) {
                    errors.push("point coordinates must be finite".to_string());
                }
            }
            Geometry::Line(l) => {
                if !point_is_finite(&l.start) || !point_is_finite(&l.end) {
                    errors.push("line endpoints must be finite".to_string());
                } else if (l.end - l.start).norm() < EPSILON {
                    errors.push("line endpoints must be distinct".to_string());
                }
            }
            Geometry::Circle(c) => {
                if !point_is_finite(&c.center) || !c.radius.is_finite() {
                    errors.push("circle center and radius must be finite".to_string());
                } else if c.radius <= 0.0 {
                    errors.push("circle radius must be positive".to_string());
                }
            }
            Geometry::Arc(a) => {
                if !point_is_finite(&a.center)
                    || !a.radius.is_finite()
                    || !a.start_angle.is_finite()
                    || !a.end_angle.is_finite()
                {
                    errors.push("arc parameters must be finite".to_string());
                } else if a.radius <= 0.0 {
                    errors.push("arc radius must be positive".to_string());
                }
            }
            Geometry::Polyline(pl) => {
                if pl.vertices.len() < 2 {
                    errors.push("polyline needs at least 2 vertices".to_string());
                }
                if pl.vertices.iter().any(|v| !point_is_finite(v)) {
                    errors.push("polyline vertices must be finite".to_string());
                }
            }
        }
        GeometryValidation {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// 静态捕捉优先级（值越小越优先）
    ///
    /// 顶点类几何优先于边类几何，符合常规对象捕捉习惯。
    pub fn base_snap_priority(&self) -> u8 {
        match self {
            Geometry::Point(_) => 1,
            Geometry::Line(_) => 2,
            Geometry::Polyline(_) => 3,
            Geometry::Arc(_) => 4,
            Geometry::Circle(_) => 5,
        }
    }

    /// 获取几何的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::Line(_) => "Line",
            Geometry::Circle(_) => "Circle",
            Geometry::Arc(_) => "Arc",
            Geometry::Polyline(_) => "Polyline",
        }
    }
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// 点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: Point2,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point2::new(x, y),
        }
    }

    pub fn from_point2(position: Point2) -> Self {
        Self { position }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::new(self.position, self.position)
    }
}

/// 线段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point2,
    pub end: Point2,
}

impl Line {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    /// 线段长度
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// 线段中点
    pub fn midpoint(&self) -> Point2 {
        Point2::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// 参数位置t处的点（t=0为起点，t=1为终点）
    pub fn point_at(&self, t: f64) -> Point2 {
        self.start + (self.end - self.start) * t
    }

    /// 点在线段上的投影参数，夹紧到[0,1]
    pub fn clamped_parameter(&self, point: &Point2) -> f64 {
        let v = self.end - self.start;
        let len2 = v.dot(&v);
        if len2 < EPSILON {
            return 0.0;
        }
        let t = (point - self.start).dot(&v) / len2;
        t.clamp(0.0, 1.0)
    }

    /// 线段上距离指定点最近的点
    ///
    /// 投影超出端点时返回对应端点本身。
    pub fn nearest_point(&self, point: &Point2) -> Point2 {
        let t = self.clamped_parameter(point);
        if t <= 0.0 {
            self.start
        } else if t >= 1.0 {
            self.end
        } else {
            self.point_at(t)
        }
    }

    /// 点到线段的距离（垂距夹紧到线段范围）
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        (point - self.nearest_point(point)).norm()
    }

    /// 从参考点到线段的垂足（垂足不在线段上时返回None）
    pub fn perpendicular_foot(&self, reference: &Point2) -> Option<Point2> {
        let v = self.end - self.start;
        let len2 = v.dot(&v);
        if len2 < EPSILON {
            return None;
        }
        let t = (reference - self.start).dot(&v) / len2;
        if (0.0..=1.0).contains(&t) {
            Some(self.point_at(t))
        } else {
            None
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::from_points([self.start, self.end])
    }
}

/// 圆
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// 点到圆周的有符号距离（负值表示在圆内）
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        (point - self.center).norm() - self.radius
    }

    /// 圆上指定角度的点
    pub fn point_at_angle(&self, angle: f64) -> Point2 {
        Point2::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
        )
    }

    /// 圆周上距离指定点最近的点
    ///
    /// 点与圆心重合时方向不定，约定返回0°方向的点。
    pub fn nearest_point(&self, point: &Point2) -> Point2 {
        let offset = point - self.center;
        let dist = offset.norm();
        if dist < EPSILON {
            return self.point_at_angle(0.0);
        }
        self.center + offset * (self.radius / dist)
    }

    /// 从外部参考点到圆的两个切点（参考点在圆内或圆上时无切点）
    pub fn tangent_points(&self, reference: &Point2) -> Option<(Point2, Point2)> {
        let d = (reference - self.center).norm();
        if d <= self.radius + EPSILON {
            return None;
        }

        let base_angle = (reference.y - self.center.y).atan2(reference.x - self.center.x);
        let half_angle = (self.radius / d).acos();

        Some((
            self.point_at_angle(base_angle + half_angle),
            self.point_at_angle(base_angle - half_angle),
        ))
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::new(
            Point2::new(self.center.x - self.radius, self.center.y - self.radius),
            Point2::new(self.center.x + self.radius, self.center.y + self.radius),
        )
    }
}

/// 圆弧
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point2,
    pub radius: f64,
    /// 起始角度（弧度）
    pub start_angle: f64,
    /// 终止角度（弧度）
    pub end_angle: f64,
}

impl Arc {
    pub fn new(center: Point2, radius: f64, start_angle: f64, end_angle: f64) -> Self {
        Self {
            center,
            radius,
            start_angle,
            end_angle,
        }
    }

    /// 扫过的角度，归一化到 [0, 2π)
    pub fn sweep_angle(&self) -> f64 {
        let two_pi = 2.0 * std::f64::consts::PI;
        let mut sweep = self.end_angle - self.start_angle;
        while sweep < 0.0 {
            sweep += two_pi;
        }
        while sweep > two_pi {
            sweep -= two_pi;
        }
        sweep
    }

    pub fn start_point(&self) -> Point2 {
        self.point_at_angle(self.start_angle)
    }

    pub fn end_point(&self) -> Point2 {
        self.point_at_angle(self.end_angle)
    }

    /// 弧中点（半扫掠角处）
    pub fn midpoint(&self) -> Point2 {
        self.point_at_angle(self.start_angle + self.sweep_angle() / 2.0)
    }

    fn point_at_angle(&self, angle: f64) -> Point2 {
        Point2::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
        )
    }

    /// 检查角度是否在弧的范围内
    pub fn contains_angle(&self, angle: f64) -> bool {
        let two_pi = 2.0 * std::f64::consts::PI;
        let normalize = |mut a: f64| {
            while a < 0.0 {
                a += two_pi;
            }
            a % two_pi
        };

        let a = normalize(angle);
        let start = normalize(self.start_angle);
        let end = normalize(self.end_angle);

        if start <= end {
            a >= start && a <= end
        } else {
            a >= start || a <= end
        }
    }

    /// 弧上距离指定点最近的点
    ///
    /// 方向角落在弧范围内时取径向投影，否则取较近的端点。
    pub fn nearest_point(&self, point: &Point2) -> Point2 {
        let offset = point - self.center;
        if offset.norm() < EPSILON {
            return self.start_point();
        }

        let angle = offset.y.atan2(offset.x);
        if self.contains_angle(angle) {
            return self.center + offset * (self.radius / offset.norm());
        }

        let start = self.start_point();
        let end = self.end_point();
        if (point - start).norm() <= (point - end).norm() {
            start
        } else {
            end
        }
    }

    /// 点到圆弧的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        (point - self.nearest_point(point)).norm()
    }

    /// 包围盒：取完整圆的包围盒作为安全的过估计
    ///
    /// 短弧会因此多收集一些候选，但随后的精确距离计算会过滤掉它们，
    /// 不会漏捕捉。
    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::new(
            Point2::new(self.center.x - self.radius, self.center.y - self.radius),
            Point2::new(self.center.x + self.radius, self.center.y + self.radius),
        )
    }
}

/// 多段线（直线段折线）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<Point2>,
    /// 是否闭合
    pub closed: bool,
}

impl Polyline {
    pub fn new(vertices: Vec<Point2>, closed: bool) -> Self {
        Self { vertices, closed }
    }

    pub fn from_points(points: impl IntoIterator<Item = Point2>, closed: bool) -> Self {
        Self {
            vertices: points.into_iter().collect(),
            closed,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// 线段数量
    pub fn segment_count(&self) -> usize {
        if self.vertices.len() < 2 {
            return 0;
        }
        if self.closed {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// 第i条线段
    pub fn segment(&self, i: usize) -> Line {
        let a = self.vertices[i];
        let b = self.vertices[(i + 1) % self.vertices.len()];
        Line::new(a, b)
    }

    /// 遍历所有线段
    pub fn segments(&self) -> impl Iterator<Item = Line> + '_ {
        (0..self.segment_count()).map(|i| self.segment(i))
    }

    /// 总长度
    pub fn length(&self) -> f64 {
        self.segments().map(|s| s.length()).sum()
    }

    /// 多段线上距离指定点最近的点
    pub fn nearest_point(&self, point: &Point2) -> Point2 {
        match self.vertices.len() {
            0 => *point,
            1 => self.vertices[0],
            _ => {
                let mut best = self.vertices[0];
                let mut best_dist = f64::INFINITY;
                for seg in self.segments() {
                    let candidate = seg.nearest_point(point);
                    let dist = (point - candidate).norm();
                    if dist < best_dist {
                        best_dist = dist;
                        best = candidate;
                    }
                }
                best
            }
        }
    }

    /// 点到多段线的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        if self.vertices.is_empty() {
            return f64::INFINITY;
        }
        (point - self.nearest_point(point)).norm()
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::from_points(self.vertices.iter().copied())
    }
}

/// 法向量（逆时针旋转90°的单位向量）
pub fn perpendicular_unit(v: &Vector2) -> Vector2 {
    let n = v.norm();
    if n < EPSILON {
        Vector2::new(0.0, 0.0)
    } else {
        Vector2::new(-v.y / n, v.x / n)
    }
}
