// 该文件是 Xunjing （寻景） 项目的一部分。
// src/output/draw.rs - 识别结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};

use crate::frame::FrameBuffer;
use crate::recognition::RecognitionResult;

const PALETTE_SIZE: usize = 16;
const LINE_THICKNESS: u32 = 2;
// 在四边形的第一个角点（参考图像左上角）画一个方块，标出方向
const CORNER_MARKER_SIZE: u32 = 6;

pub struct Draw {
  thickness: u32,
  marker_size: u32,
  /// 按模型标识取色
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb(i as f32 / PALETTE_SIZE as f32 * 360.0, 0.8, 0.9))
      .collect();
    Self {
      thickness: LINE_THICKNESS,
      marker_size: CORNER_MARKER_SIZE,
      colors,
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h {
    h if h < 60.0 => (c, x, 0.0),
    h if h < 120.0 => (x, c, 0.0),
    h if h < 180.0 => (0.0, c, x),
    h if h < 240.0 => (0.0, x, c),
    h if h < 300.0 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn color_of(&self, model_id: i32) -> Rgb<u8> {
    self.colors[model_id.rem_euclid(self.colors.len() as i32) as usize]
  }

  pub fn draw_results(&self, image: &mut RgbImage, results: &[RecognitionResult]) {
    for result in results {
      let color = self.color_of(result.model_id);
      let corners = &result.quad.corners;
      for t in 0..self.thickness {
        let o = t as f32;
        for i in 0..4 {
          let (a, b) = (corners[i], corners[(i + 1) % 4]);
          draw_line_segment_mut(image, (a.x + o, a.y + o), (b.x + o, b.y + o), color);
        }
      }

      let half = (self.marker_size / 2) as i32;
      let marker = imageproc::rect::Rect::at(corners[0].x as i32 - half, corners[0].y as i32 - half)
        .of_size(self.marker_size, self.marker_size);
      draw_filled_rect_mut(image, marker, color);
    }
  }

  /// 在回调帧的 RGB 副本上绘制
  pub fn draw_on(&self, frame: &FrameBuffer, results: &[RecognitionResult]) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_results(&mut image, results);
    image
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ColorFormat;
  use crate::geometry::{Point, Quad};

  #[test]
  fn palette_wraps_negative_ids() {
    let draw = Draw::default();
    assert_eq!(draw.color_of(-1), draw.color_of(PALETTE_SIZE as i32 - 1));
    assert_ne!(draw.color_of(0), draw.color_of(1));
  }

  #[test]
  fn quad_edges_are_drawn() {
    let draw = Draw::default();
    let frame = FrameBuffer::convert(&RgbImage::new(64, 64), ColorFormat::Bgr);
    let result = RecognitionResult {
      score: 100,
      model_id: 3,
      quad: Quad::new([
        Point::new(10.0, 10.0),
        Point::new(50.0, 10.0),
        Point::new(50.0, 40.0),
        Point::new(10.0, 40.0),
      ]),
    };
    let image = draw.draw_on(&frame, &[result]);
    assert_eq!(*image.get_pixel(30, 10), draw.color_of(3));
    assert_eq!(*image.get_pixel(50, 25), draw.color_of(3));
    assert_eq!(*image.get_pixel(30, 25), Rgb([0, 0, 0]));
  }
}
