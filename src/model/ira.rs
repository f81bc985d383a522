// 该文件是 Xunjing （寻景） 项目的一部分。
// src/model/ira.rs - 图像缩减区域（IRA）缓存
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

use crate::geometry::{Quad, Rect};

/// 上次找到目标的区域，用于缩小下一帧的搜索范围。
///
/// `Region` 中的矩形宽高恒为正，并且位于写入时给定的图像边界内。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ira {
  #[default]
  Unset,
  Region(Rect),
}

impl Ira {
  pub fn rect(&self) -> Option<Rect> {
    match self {
      Ira::Unset => None,
      Ira::Region(rect) => Some(*rect),
    }
  }

  pub fn is_set(&self) -> bool {
    matches!(self, Ira::Region(_))
  }

  pub fn clear(&mut self) {
    *self = Ira::Unset;
  }

  /// 裁剪到 `width` x `height` 后写入，面积非正时清空
  pub fn set(&mut self, rect: Rect, width: u32, height: u32) {
    *self = match rect.clamp_to(width, height) {
      Some(rect) => Ira::Region(rect),
      None => Ira::Unset,
    };
  }

  /// 以匹配四边形的外接矩形为基础，四周各留出半个宽/高的余量
  pub fn update_from_quad(&mut self, quad: &Quad, width: u32, height: u32) {
    let bbox = quad.bounding_rect();
    let grown = bbox.inflate(bbox.width / 2, bbox.height / 2);
    self.set(grown, width, height);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Point;

  fn square(x: f32, y: f32, side: f32) -> Quad {
    Quad::new([
      Point::new(x, y),
      Point::new(x + side, y),
      Point::new(x + side, y + side),
      Point::new(x, y + side),
    ])
  }

  #[test]
  fn update_adds_half_size_margin() {
    let mut ira = Ira::default();
    ira.update_from_quad(&square(100.0, 100.0, 40.0), 640, 480);
    assert_eq!(ira, Ira::Region(Rect::new(80, 80, 80, 80)));
  }

  #[test]
  fn update_is_clamped_to_image() {
    let mut ira = Ira::default();
    ira.update_from_quad(&square(5.0, 5.0, 40.0), 50, 50);
    let rect = ira.rect().unwrap();
    assert_eq!(rect, Rect::new(0, 0, 50, 50));
    assert!(rect.fits_within(50, 50));
  }

  #[test]
  fn degenerate_update_unsets() {
    let mut ira = Ira::Region(Rect::new(0, 0, 10, 10));
    ira.update_from_quad(&square(900.0, 900.0, 10.0), 100, 100);
    assert_eq!(ira, Ira::Unset);
  }

  #[test]
  fn clear_resets() {
    let mut ira = Ira::Region(Rect::new(1, 2, 3, 4));
    ira.clear();
    assert!(!ira.is_set());
    assert_eq!(ira.rect(), None);
  }
}
