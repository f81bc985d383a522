// 该文件是 Xunjing （寻景） 项目的一部分。
// src/matching/homography.rs - 单应性矩阵
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::geometry::{Point, Quad};

// 最小与最大奇异值之比低于该值时视为退化
const RANK_EPSILON: f64 = 1e-9;
const SCALE_EPSILON: f64 = 1e-9;
const W_EPSILON: f64 = 1e-12;

/// 3x3 平面透视变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
  m: Matrix3<f64>,
}

impl Homography {
  /// 按行给出的 9 个元素
  pub fn from_matrix(m: [f64; 9]) -> Self {
    Self {
      m: Matrix3::from_row_slice(&m),
    }
  }

  pub fn identity() -> Self {
    Self {
      m: Matrix3::identity(),
    }
  }

  pub fn translation(dx: f64, dy: f64) -> Self {
    Self {
      m: Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0),
    }
  }

  /// 按行展开的矩阵元素
  pub fn matrix(&self) -> [f64; 9] {
    let mut out = [0.0; 9];
    for (i, v) in out.iter_mut().enumerate() {
      *v = self.m[(i / 3, i % 3)];
    }
    out
  }

  /// 变换一个点；点被映射到无穷远时返回 None
  pub fn project(&self, p: Point) -> Option<Point> {
    let v = self.m * Vector3::new(p.x as f64, p.y as f64, 1.0);
    if v.z.abs() < W_EPSILON {
      return None;
    }
    Some(Point::new((v.x / v.z) as f32, (v.y / v.z) as f32))
  }

  pub fn project_quad(&self, quad: &Quad) -> Option<Quad> {
    let c = &quad.corners;
    Some(Quad::new([
      self.project(c[0])?,
      self.project(c[1])?,
      self.project(c[2])?,
      self.project(c[3])?,
    ]))
  }

  /// 归一化 DLT 最小二乘拟合 `src -> dst`，至少需要 4 对点；退化时返回 None
  pub fn fit(src: &[Point], dst: &[Point]) -> Option<Self> {
    if src.len() != dst.len() || src.len() < 4 {
      return None;
    }

    let t_src = normalization(src)?;
    let t_dst = normalization(dst)?;
    let t_dst_inv = t_dst.try_inverse()?;

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 8);
    let mut b = DVector::<f64>::zeros(2 * n);
    for (i, (p, q)) in src.iter().zip(dst.iter()).enumerate() {
      let p = t_src * Vector3::new(p.x as f64, p.y as f64, 1.0);
      let q = t_dst * Vector3::new(q.x as f64, q.y as f64, 1.0);
      let (x, y, u, v) = (p.x, p.y, q.x, q.y);
      let rows = [
        [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y],
        [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y],
      ];
      for (k, row) in rows.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
          a[(2 * i + k, j)] = *value;
        }
      }
      b[2 * i] = u;
      b[2 * i + 1] = v;
    }

    let svd = a.svd(true, true);
    let largest = svd.singular_values.max();
    if largest <= 0.0 || svd.singular_values.min() / largest < RANK_EPSILON {
      return None;
    }
    let h = svd.solve(&b, f64::EPSILON).ok()?;

    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    let m = t_dst_inv * normalized * t_src;
    let scale = m[(2, 2)];
    if scale.abs() < W_EPSILON {
      return None;
    }
    Some(Self { m: m / scale })
  }
}

/// 平移到质心并缩放到平均距离 √2
fn normalization(points: &[Point]) -> Option<Matrix3<f64>> {
  let n = points.len() as f64;
  let cx = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
  let cy = points.iter().map(|p| p.y as f64).sum::<f64>() / n;
  let mean = points
    .iter()
    .map(|p| ((p.x as f64 - cx).powi(2) + (p.y as f64 - cy).powi(2)).sqrt())
    .sum::<f64>()
    / n;
  if mean < SCALE_EPSILON {
    return None;
  }
  let s = std::f64::consts::SQRT_2 / mean;
  Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: Point, b: Point) -> bool {
    a.distance(&b) < 1e-2
  }

  #[test]
  fn fit_recovers_translation() {
    let src = [
      Point::new(0.0, 0.0),
      Point::new(50.0, 0.0),
      Point::new(50.0, 30.0),
      Point::new(0.0, 30.0),
      Point::new(20.0, 10.0),
    ];
    let dst: Vec<_> = src.iter().map(|p| p.offset(100.0, 40.0)).collect();
    let h = Homography::fit(&src, &dst).unwrap();
    assert!(close(h.project(Point::new(7.0, 9.0)).unwrap(), Point::new(107.0, 49.0)));
  }

  #[test]
  fn fit_recovers_perspective() {
    let truth = Homography::from_matrix([1.1, 0.05, 12.0, -0.02, 0.95, 7.0, 0.0004, 0.0002, 1.0]);
    let src = [
      Point::new(0.0, 0.0),
      Point::new(120.0, 0.0),
      Point::new(120.0, 80.0),
      Point::new(0.0, 80.0),
    ];
    let dst: Vec<_> = src.iter().map(|p| truth.project(*p).unwrap()).collect();
    let h = Homography::fit(&src, &dst).unwrap();
    let inner = Point::new(60.0, 40.0);
    assert!(close(h.project(inner).unwrap(), truth.project(inner).unwrap()));
  }

  #[test]
  fn collinear_points_are_degenerate() {
    let src: Vec<_> = (0..5).map(|i| Point::new(i as f32 * 10.0, 0.0)).collect();
    let dst: Vec<_> = src.iter().map(|p| p.offset(3.0, 3.0)).collect();
    assert!(Homography::fit(&src, &dst).is_none());
  }

  #[test]
  fn matrix_is_row_major() {
    let h = Homography::translation(3.0, -4.0);
    assert_eq!(h.matrix(), [1.0, 0.0, 3.0, 0.0, 1.0, -4.0, 0.0, 0.0, 1.0]);
    assert_eq!(Homography::from_matrix(h.matrix()), h);
  }

  #[test]
  fn too_few_points() {
    let pts = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 0.0)];
    assert!(Homography::fit(&pts, &pts).is_none());
  }
}
