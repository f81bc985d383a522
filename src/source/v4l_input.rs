// 该文件是 Xunjing （寻景） 项目的一部分。
// src/source/v4l_input.rs - V4L 摄像头输入
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

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use image::RgbImage;
use parking_lot::Mutex;
use tracing::{error, info};
use url::Url;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::{
  FromUrl, FromUrlWithScheme,
  source::{Frame, FrameSource, SourceError},
};

const DEFAULT_DEVICE: &str = "/dev/video0";
const CAPTURE_BUFFERS: u32 = 4;

/// V4L2 摄像头，采集 YUYV 并转换为 RGB
pub struct V4lSource {
  device: Mutex<Device>,
  width: u32,
  height: u32,
  index: AtomicU64,
  finished: AtomicBool,
  start: Instant,
}

impl FromUrlWithScheme for V4lSource {
  const SCHEME: &'static str = "v4l";
}

fn device_error(e: std::io::Error) -> SourceError {
  SourceError::DeviceError(e.to_string())
}

impl FromUrl for V4lSource {
  type Error = SourceError;

  // v4l:///dev/video0?width=640&height=480
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(SourceError::SchemeMismatch(url.scheme().to_string()));
    }

    let device_path = if url.path().is_empty() || url.path() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    let query = |key: &str, default: u32| -> Result<u32, SourceError> {
      match url.query_pairs().find(|(k, _)| k == key) {
        Some((_, v)) => v
          .parse()
          .map_err(|_| SourceError::InvalidSource(format!("{} 参数无效: {}", key, v))),
        None => Ok(default),
      }
    };
    let width = query("width", 640)?;
    let height = query("height", 480)?;

    let device = Device::with_path(&device_path).map_err(device_error)?;
    let mut format = device.format().map_err(device_error)?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).map_err(device_error)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(SourceError::DeviceError(format!(
        "设备不支持 YUYV 格式: {}",
        format.fourcc
      )));
    }

    info!(
      "打开摄像头 {}: {}x{}",
      device_path, format.width, format.height
    );

    Ok(Self {
      device: Mutex::new(device),
      width: format.width,
      height: format.height,
      index: AtomicU64::new(0),
      finished: AtomicBool::new(false),
      start: Instant::now(),
    })
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl FrameSource for V4lSource {
  fn obtain_image(&self) -> Result<Option<Frame>, SourceError> {
    if self.is_finished() {
      return Ok(None);
    }

    let data = {
      let device = self.device.lock();
      let mut stream =
        Stream::with_buffers(&device, Type::VideoCapture, CAPTURE_BUFFERS).map_err(device_error)?;
      let (buffer, _meta) = stream.next().map_err(device_error)?;
      yuyv_to_rgb(buffer, self.width, self.height)
    };

    let image = RgbImage::from_raw(self.width, self.height, data).ok_or_else(|| {
      SourceError::DeviceError("采集缓冲区大小与分辨率不匹配".to_string())
    })?;

    Ok(Some(Frame {
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
