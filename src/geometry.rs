// 该文件是 Xunjing （寻景） 项目的一部分。
// src/geometry.rs - 点、矩形与四边形
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

/// 二维点（像素坐标）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  pub fn distance(&self, other: &Point) -> f32 {
    ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
  }

  pub fn offset(&self, dx: f32, dy: f32) -> Self {
    Self::new(self.x + dx, self.y + dy)
  }
}

/// 轴对齐矩形，整数像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl Rect {
  pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 覆盖整幅图像的矩形
  pub fn full(width: u32, height: u32) -> Self {
    Self::new(0, 0, width as i32, height as i32)
  }

  pub fn right(&self) -> i32 {
    self.x.saturating_add(self.width)
  }

  pub fn bottom(&self) -> i32 {
    self.y.saturating_add(self.height)
  }

  pub fn area(&self) -> i64 {
    self.width as i64 * self.height as i64
  }

  pub fn is_empty(&self) -> bool {
    self.width <= 0 || self.height <= 0
  }

  /// 矩形是否完整地位于 `width` x `height` 的图像内
  pub fn fits_within(&self, width: u32, height: u32) -> bool {
    !self.is_empty()
      && self.x >= 0
      && self.y >= 0
      && self.right() <= width as i32
      && self.bottom() <= height as i32
  }

  /// 裁剪到图像边界；裁剪后面积非正时返回 None
  pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
    let x0 = self.x.clamp(0, width as i32);
    let y0 = self.y.clamp(0, height as i32);
    let x1 = self.right().clamp(0, width as i32);
    let y1 = self.bottom().clamp(0, height as i32);
    let rect = Rect::new(x0, y0, x1 - x0, y1 - y0);
    if rect.is_empty() { None } else { Some(rect) }
  }

  /// 向四周各扩展 `dx` / `dy` 像素
  pub fn inflate(&self, dx: i32, dy: i32) -> Rect {
    Rect::new(
      self.x.saturating_sub(dx),
      self.y.saturating_sub(dy),
      self.width.saturating_add(dx.saturating_mul(2)),
      self.height.saturating_add(dy.saturating_mul(2)),
    )
  }

  pub fn contains(&self, p: &Point) -> bool {
    p.x >= self.x as f32
      && p.y >= self.y as f32
      && p.x < self.right() as f32
      && p.y < self.bottom() as f32
  }
}

/// 四边形，角点顺序为左上、右上、右下、左下（参考图像坐标系下）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
  pub corners: [Point; 4],
}

impl Quad {
  pub fn new(corners: [Point; 4]) -> Self {
    Self { corners }
  }

  /// 由宽高给出的参考图像四角
  pub fn from_size(width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    Self::new([
      Point::new(0.0, 0.0),
      Point::new(w, 0.0),
      Point::new(w, h),
      Point::new(0.0, h),
    ])
  }

  pub fn side_lengths(&self) -> [f32; 4] {
    let c = &self.corners;
    [
      c[0].distance(&c[1]),
      c[1].distance(&c[2]),
      c[2].distance(&c[3]),
      c[3].distance(&c[0]),
    ]
  }

  pub fn min_side(&self) -> f32 {
    self
      .side_lengths()
      .into_iter()
      .fold(f32::INFINITY, f32::min)
  }

  /// 外接矩形（向外取整），超出 i32 范围的坐标被截断
  pub fn bounding_rect(&self) -> Rect {
    let (mut x0, mut y0) = (f32::INFINITY, f32::INFINITY);
    let (mut x1, mut y1) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in &self.corners {
      x0 = x0.min(p.x);
      y0 = y0.min(p.y);
      x1 = x1.max(p.x);
      y1 = y1.max(p.y);
    }
    let (x0, y0) = (x0.floor() as i32, y0.floor() as i32);
    let (x1, y1) = (x1.ceil() as i32, y1.ceil() as i32);
    let span = |a: i32, b: i32| (b as i64 - a as i64).min(i32::MAX as i64) as i32;
    Rect::new(x0, y0, span(x0, x1), span(y0, y1))
  }

  /// 四个角点是否构成严格凸四边形（不自交、无共线角）
  pub fn is_convex(&self) -> bool {
    let c = &self.corners;
    let mut orientation = 0.0f32;
    for i in 0..4 {
      let (a, b, d) = (c[i], c[(i + 1) % 4], c[(i + 2) % 4]);
      let cross = (b.x - a.x) * (d.y - b.y) - (b.y - a.y) * (d.x - b.x);
      if cross == 0.0 || (orientation != 0.0 && cross.signum() != orientation) {
        return false;
      }
      orientation = cross.signum();
    }
    true
  }

  /// 按比例缩放全部角点
  pub fn scale(&self, sx: f32, sy: f32) -> Self {
    let mut corners = self.corners;
    for p in corners.iter_mut() {
      p.x *= sx;
      p.y *= sy;
    }
    Self::new(corners)
  }

  pub fn is_finite(&self) -> bool {
    self
      .corners
      .iter()
      .all(|p| p.x.is_finite() && p.y.is_finite())
  }
}
