// 该文件是 Xunjing （寻景） 项目的一部分。
// src/frame.rs - 回调帧定义与颜色格式转换
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

use std::str::FromStr;

use image::{DynamicImage, RgbImage, imageops};

/// 回调帧的颜色格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFormat {
  #[default]
  Rgb,
  Bgr,
  Rgba,
  Gray,
}

impl ColorFormat {
  pub fn channels(&self) -> usize {
    match self {
      ColorFormat::Rgb | ColorFormat::Bgr => 3,
      ColorFormat::Rgba => 4,
      ColorFormat::Gray => 1,
    }
  }
}

impl FromStr for ColorFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb" => Ok(ColorFormat::Rgb),
      "bgr" => Ok(ColorFormat::Bgr),
      "rgba" => Ok(ColorFormat::Rgba),
      "gray" | "grey" => Ok(ColorFormat::Gray),
      other => Err(format!("不支持的颜色格式: {}", other)),
    }
  }
}

/// 交付给结果回调的帧，按 HWC 排列
#[derive(Debug, Clone)]
pub struct FrameBuffer {
  format: ColorFormat,
  image: DynamicImage,
}

/// 交换 R 与 B 通道，RGB 与 BGR 互转
fn swap_red_blue(image: &RgbImage) -> RgbImage {
  let mut swapped = image.clone();
  for pixel in swapped.pixels_mut() {
    pixel.0.swap(0, 2);
  }
  swapped
}

impl FrameBuffer {
  /// 把 RGB 图像转换成指定格式
  pub fn convert(image: &RgbImage, format: ColorFormat) -> Self {
    let image = match format {
      ColorFormat::Rgb => DynamicImage::ImageRgb8(image.clone()),
      ColorFormat::Bgr => DynamicImage::ImageRgb8(swap_red_blue(image)),
      ColorFormat::Rgba => DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(image.clone()).to_rgba8()),
      ColorFormat::Gray => DynamicImage::ImageLuma8(imageops::grayscale(image)),
    };
    Self { format, image }
  }

  pub fn format(&self) -> ColorFormat {
    self.format
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    self.format.channels()
  }

  /// 转回 RGB 图像，供绘制与保存使用
  pub fn to_rgb_image(&self) -> RgbImage {
    match (self.format, &self.image) {
      (ColorFormat::Bgr, DynamicImage::ImageRgb8(bgr)) => swap_red_blue(bgr),
      (_, image) => image.to_rgb8(),
    }
  }
}

impl AsRef<[u8]> for FrameBuffer {
  fn as_ref(&self) -> &[u8] {
    self.image.as_bytes()
  }
}
