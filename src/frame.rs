// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// 帧数据，任意分辨率的 RGB 图像
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> usize {
    self.image.width() as usize
  }

  pub fn height(&self) -> usize {
    self.image.height() as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 由 HWC 排列的 RGB 字节构建帧，长度不符时返回 None
  pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>, index: u64, timestamp_ms: u64) -> Option<Self> {
    RgbImage::from_raw(width, height, data).map(|image| Self::new(image, index, timestamp_ms))
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self::new(image, 0, 0)
  }
}

impl AsRef<RgbImage> for Frame {
  fn as_ref(&self) -> &RgbImage {
    &self.image
  }
}
