//! 坐标系上下文
//!
//! 可选的坐标变换对（屏幕像素 ↔ CAD单位 ↔ 地理坐标），
//! 查询入口对光标应用正向变换，出口对结果应用逆向变换。
//! 钩子由调用方提供，失败（返回错误或panic）被视为查询失败，
//! 绝不让绘图会话崩溃。

use crate::error::SnapError;
use crate::math::{point_is_finite, Point2};
use anyhow::anyhow;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// 坐标变换钩子
pub type TransformFn = Box<dyn Fn(Point2) -> anyhow::Result<Point2>>;

/// 坐标系上下文
pub struct CoordinateContext {
    forward: TransformFn,
    inverse: TransformFn,
    /// 输入坐标参考系标识
    pub source_srs: String,
    /// 引擎坐标参考系标识
    pub target_srs: String,
    /// 输出坐标保留的小数位数
    pub precision: Option<u32>,
}

impl std::fmt::Debug for CoordinateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateContext")
            .field("source_srs", &self.source_srs)
            .field("target_srs", &self.target_srs)
            .field("precision", &self.precision)
            .finish_non_exhaustive()
    }
}

impl CoordinateContext {
    pub fn new(
        source_srs: impl Into<String>,
        target_srs: impl Into<String>,
        forward: TransformFn,
        inverse: TransformFn,
    ) -> Self {
        Self {
            forward,
            inverse,
            source_srs: source_srs.into(),
            target_srs: target_srs.into(),
            precision: None,
        }
    }

    /// 设置输出精度（小数位）
    pub fn with_precision(mut self, digits: u32) -> Self {
        self.precision = Some(digits);
        self
    }

    /// 正向变换：输入坐标 → 引擎坐标
    pub fn apply_forward(&self, point: Point2) -> Result<Point2, SnapError> {
        Self::run_hook(&self.forward, point, "forward")
    }

    /// 逆向变换：引擎坐标 → 输出坐标（附加精度舍入）
    pub fn apply_inverse(&self, point: Point2) -> Result<Point2, SnapError> {
        let out = Self::run_hook(&self.inverse, point, "inverse")?;
        Ok(self.round(out))
    }

    fn run_hook(hook: &TransformFn, point: Point2, label: &str) -> Result<Point2, SnapError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| hook(point)))
            .map_err(|_| SnapError::Transform(anyhow!("{label} transform hook panicked")))?;

        let out = outcome.map_err(SnapError::Transform)?;
        if !point_is_finite(&out) {
            return Err(SnapError::Transform(anyhow!(
                "{label} transform produced non-finite coordinates"
            )));
        }
        Ok(out)
    }

    fn round(&self, point: Point2) -> Point2 {
        match self.precision {
            None => point,
            Some(digits) => {
                let factor = 10f64.powi(digits as i32);
                Point2::new(
                    (point.x * factor).round() / factor,
                    (point.y * factor).round() / factor,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_context() -> CoordinateContext {
        CoordinateContext::new(
            "screen",
            "world",
            Box::new(|p| Ok(Point2::new(p.x + 100.0, p.y + 100.0))),
            Box::new(|p| Ok(Point2::new(p.x - 100.0, p.y - 100.0))),
        )
    }

    #[test]
    fn test_forward_inverse_roundtrip() {
        let ctx = offset_context();
        let world = ctx.apply_forward(Point2::new(1.0, 2.0)).unwrap();
        assert_eq!(world, Point2::new(101.0, 102.0));
        let back = ctx.apply_inverse(world).unwrap();
        assert_eq!(back, Point2::new(1.0, 2.0));
    }

    #[test]
    fn test_precision_rounding() {
        let ctx = offset_context().with_precision(2);
        let out = ctx.apply_inverse(Point2::new(101.23456, 102.98765)).unwrap();
        assert_eq!(out, Point2::new(1.23, 2.99));
    }

    #[test]
    fn test_failing_hook_is_an_error() {
        let ctx = CoordinateContext::new(
            "a",
            "b",
            Box::new(|_| Err(anyhow!("projection not initialized"))),
            Box::new(|p| Ok(p)),
        );
        assert!(ctx.apply_forward(Point2::origin()).is_err());
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let ctx = CoordinateContext::new(
            "a",
            "b",
            Box::new(|_| panic!("boom")),
            Box::new(|p| Ok(p)),
        );
        let result = ctx.apply_forward(Point2::origin());
        assert!(matches!(result, Err(SnapError::Transform(_))));
    }

    #[test]
    fn test_non_finite_output_rejected() {
        let ctx = CoordinateContext::new(
            "a",
            "b",
            Box::new(|_| Ok(Point2::new(f64::NAN, 0.0))),
            Box::new(|p| Ok(p)),
        );
        assert!(ctx.apply_forward(Point2::origin()).is_err());
    }
}
