// 该文件是 Xunjing （寻景） 项目的一部分。
// src/source.rs - 帧来源
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

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use image::RgbImage;
use parking_lot::Mutex;
use thiserror::Error;

use crate::FromUrl;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("设备错误: {0}")]
  DeviceError(String),
  #[error("无效的输入源: {0}")]
  InvalidSource(String),
}

/// 帧来源
///
/// 生产者线程调用 `obtain_image`，`finish` 可能来自任何线程，
/// 因此全部方法都以 `&self` 调用。
pub trait FrameSource: Send + Sync {
  /// 获取下一帧；`Ok(None)` 表示暂时没有帧
  fn obtain_image(&self) -> Result<Option<Frame>, SourceError>;

  fn is_finished(&self) -> bool;

  /// 要求来源结束，不会打断正在进行的 `obtain_image`
  fn finish(&self);
}

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::ImageFileSource;

#[cfg(feature = "read_image_file")]
mod directory;
#[cfg(feature = "read_image_file")]
pub use self::directory::DirectorySource;

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::V4lSource;

/// 内存中的图像序列，依次产出后结束
pub struct MemorySource {
  images: Mutex<VecDeque<RgbImage>>,
  index: AtomicU64,
  finished: AtomicBool,
  start: Instant,
}

impl MemorySource {
  pub fn new(images: impl IntoIterator<Item = RgbImage>) -> Self {
    let images: VecDeque<_> = images.into_iter().collect();
    let finished = images.is_empty();
    Self {
      images: Mutex::new(images),
      index: AtomicU64::new(0),
      finished: AtomicBool::new(finished),
      start: Instant::now(),
    }
  }
}

impl FrameSource for MemorySource {
  fn obtain_image(&self) -> Result<Option<Frame>, SourceError> {
    if self.is_finished() {
      return Ok(None);
    }

    let mut images = self.images.lock();
    let image = images.pop_front();
    if images.is_empty() {
      self.finished.store(true, Ordering::SeqCst);
    }

    Ok(image.map(|image| Frame {
      image,
      index: self.index.fetch_add(1, Ordering::SeqCst),
      timestamp_ms: self.start.elapsed().as_millis() as u64,
    }))
  }

  fn is_finished(&self) -> bool {
    self.finished.load(Ordering::SeqCst)
  }

  fn finish(&self) {
    self.finished.store(true, Ordering::SeqCst);
  }
}

pub enum SourceWrapper {
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileSource),
  #[cfg(feature = "read_image_file")]
  Directory(DirectorySource),
  #[cfg(feature = "v4l_input")]
  V4l(V4lSource),
  Memory(MemorySource),
}

impl FromUrl for SourceWrapper {
  type Error = SourceError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileSource::SCHEME {
        return Ok(SourceWrapper::ImageFile(ImageFileSource::from_url(url)?));
      }
      if url.scheme() == DirectorySource::SCHEME {
        return Ok(SourceWrapper::Directory(DirectorySource::from_url(url)?));
      }
    }
    #[cfg(feature = "v4l_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4lSource::SCHEME {
        return Ok(SourceWrapper::V4l(V4lSource::from_url(url)?));
      }
    }
    Err(SourceError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl FrameSource for SourceWrapper {
  fn obtain_image(&self) -> Result<Option<Frame>, SourceError> {
    match self {
      #[cfg(feature = "read_image_file")]
      SourceWrapper::ImageFile(source) => source.obtain_image(),
      #[cfg(feature = "read_image_file")]
      SourceWrapper::Directory(source) => source.obtain_image(),
      #[cfg(feature = "v4l_input")]
      SourceWrapper::V4l(source) => source.obtain_image(),
      SourceWrapper::Memory(source) => source.obtain_image(),
    }
  }

  fn is_finished(&self) -> bool {
    match self {
      #[cfg(feature = "read_image_file")]
      SourceWrapper::ImageFile(source) => source.is_finished(),
      #[cfg(feature = "read_image_file")]
      SourceWrapper::Directory(source) => source.is_finished(),
      #[cfg(feature = "v4l_input")]
      SourceWrapper::V4l(source) => source.is_finished(),
      SourceWrapper::Memory(source) => source.is_finished(),
    }
  }

  fn finish(&self) {
    match self {
      #[cfg(feature = "read_image_file")]
      SourceWrapper::ImageFile(source) => source.finish(),
      #[cfg(feature = "read_image_file")]
      SourceWrapper::Directory(source) => source.finish(),
      #[cfg(feature = "v4l_input")]
      SourceWrapper::V4l(source) => source.finish(),
      SourceWrapper::Memory(source) => source.finish(),
    }
  }
}
