//! 外部格式适配
//!
//! CAD实体和OSM要素到内部实体的转换。格式特定的知识只存在于
//! 这一个模块；转换输入是纯值对象，不涉及文件或网络IO。

use crate::entity::{Entity, EntityId};
use crate::geometry::{Arc, Circle, Geometry, Line, Point, Polyline};
use crate::math::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CAD图形数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum CadGeometry {
    Point {
        position: Point2,
    },
    Line {
        start: Point2,
        end: Point2,
    },
    Circle {
        center: Point2,
        radius: f64,
    },
    Arc {
        center: Point2,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    Polyline {
        vertices: Vec<Point2>,
        closed: bool,
    },
    Rectangle {
        min: Point2,
        max: Point2,
    },
    Polygon {
        vertices: Vec<Point2>,
    },
}

/// CAD实体（外部值对象）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadShape {
    pub id: u64,
    /// 原始CAD类型名（如 "LWPOLYLINE"）
    #[serde(default)]
    pub cad_type: Option<String>,
    /// DXF句柄
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub layer_name: Option<String>,
    pub geometry: CadGeometry,
}

/// 将CAD图形转换为内部实体
///
/// 矩形和多边形降为闭合多段线；ID沿用外部ID，唯一性由调用方保证。
pub fn cad_to_entity(shape: &CadShape) -> Entity {
    let geometry = match &shape.geometry {
        CadGeometry::Point { position } => Geometry::Point(Point::from_point2(*position)),
        CadGeometry::Line { start, end } => Geometry::Line(Line::new(*start, *end)),
        CadGeometry::Circle { center, radius } => Geometry::Circle(Circle::new(*center, *radius)),
        CadGeometry::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        } => Geometry::Arc(Arc::new(*center, *radius, *start_angle, *end_angle)),
        CadGeometry::Polyline { vertices, closed } => {
            Geometry::Polyline(Polyline::new(vertices.clone(), *closed))
        }
        CadGeometry::Rectangle { min, max } => Geometry::Polyline(Polyline::from_points(
            [
                Point2::new(min.x, min.y),
                Point2::new(max.x, min.y),
                Point2::new(max.x, max.y),
                Point2::new(min.x, max.y),
            ],
            true,
        )),
        CadGeometry::Polygon { vertices } => {
            Geometry::Polyline(Polyline::new(vertices.clone(), true))
        }
    };

    let mut entity = Entity::with_id(EntityId::from_raw(shape.id), geometry);
    if let Some(layer) = &shape.layer_name {
        entity = entity.with_layer(layer.clone());
    }
    entity
}

/// OSM要素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmElementType {
    Node,
    Way,
    Relation,
}

/// OSM路径节点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OsmNode {
    pub lat: f64,
    pub lon: f64,
}

/// OSM要素（外部值对象，可直接从JSON反序列化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmElement {
    pub id: i64,
    #[serde(rename = "type")]
    pub element_type: OsmElementType,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<OsmNode>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl OsmElement {
    /// 是否是建筑物
    pub fn is_building(&self) -> bool {
        self.tags.contains_key("building")
    }
}

/// 将OSM要素转换为内部实体
///
/// 节点映射为点，路径映射为多段线（首尾重合或带building标签时
/// 视为闭合），关系暂不支持。坐标按 lon→x / lat→y 映射，投影
/// 交给引擎的坐标系上下文处理。
pub fn osm_to_entity(element: &OsmElement) -> Option<Entity> {
    let geometry = match element.element_type {
        OsmElementType::Node => {
            let (lat, lon) = (element.lat?, element.lon?);
            Geometry::Point(Point::new(lon, lat))
        }
        OsmElementType::Way => {
            if element.nodes.len() < 2 {
                return None;
            }
            let mut vertices: Vec<Point2> = element
                .nodes
                .iter()
                .map(|n| Point2::new(n.lon, n.lat))
                .collect();

            let ring = vertices.len() > 2 && vertices.first() == vertices.last();
            if ring {
                // 闭合环去掉重复的收尾顶点
                vertices.pop();
            }
            Geometry::Polyline(Polyline::new(vertices, ring || element.is_building()))
        }
        OsmElementType::Relation => return None,
    };

    let mut entity = Entity::with_id(EntityId::from_raw(element.id.unsigned_abs()), geometry);
    if let Some(layer) = element.tags.get("layer") {
        entity = entity.with_layer(layer.clone());
    }
    Some(entity)
}
