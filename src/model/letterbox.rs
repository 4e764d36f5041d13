// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/letterbox.rs - 信箱填充预处理
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

use std::borrow::Cow;

use image::{RgbImage, imageops};

/// 将图像填充为 `max(w, h)` 的正方形画布。
///
/// 原图位于左上角，右侧与下方以黑色填充，因此画布坐标与原图坐标一致。
/// 已经是正方形的图像原样返回。
pub fn letterbox(image: &RgbImage) -> Cow<'_, RgbImage> {
  let (col, row) = image.dimensions();
  if col == row {
    return Cow::Borrowed(image);
  }

  let side = col.max(row);
  let mut canvas = RgbImage::new(side, side);
  imageops::replace(&mut canvas, image, 0, 0);
  Cow::Owned(canvas)
}

/// 缩放到网络输入尺寸
pub fn to_network_input(image: &RgbImage, width: u32, height: u32) -> Cow<'_, RgbImage> {
  if image.dimensions() == (width, height) {
    return Cow::Borrowed(image);
  }

  Cow::Owned(imageops::resize(
    image,
    width,
    height,
    imageops::FilterType::Triangle,
  ))
}

/// 画布到网络输入的缩放系数 `(x_factor, y_factor)`
pub fn scale_factors(canvas: &RgbImage, width: u32, height: u32) -> (f32, f32) {
  (
    canvas.width() as f32 / width as f32,
    canvas.height() as f32 / height as f32,
  )
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  fn filled(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
  }

  #[test]
  fn square_image_is_unchanged() {
    let image = filled(32, 32, 200);
    let boxed = letterbox(&image);
    assert!(matches!(boxed, Cow::Borrowed(_)));
    assert_eq!(&*boxed, &image);
  }

  #[test]
  fn wide_image_is_padded_below() {
    let image = filled(40, 10, 255);
    let boxed = letterbox(&image);
    assert_eq!(boxed.dimensions(), (40, 40));
    assert_eq!(boxed.get_pixel(39, 9), &Rgb([255, 255, 255]));
    assert_eq!(boxed.get_pixel(0, 10), &Rgb([0, 0, 0]));
    assert_eq!(boxed.get_pixel(39, 39), &Rgb([0, 0, 0]));
  }

  #[test]
  fn tall_image_is_padded_right() {
    let mut image = filled(10, 30, 100);
    image.put_pixel(3, 7, Rgb([1, 2, 3]));
    let boxed = letterbox(&image);
    assert_eq!(boxed.dimensions(), (30, 30));
    // 原图保持在左上角，坐标不变
    assert_eq!(boxed.get_pixel(3, 7), &Rgb([1, 2, 3]));
    assert_eq!(boxed.get_pixel(9, 29), &Rgb([100, 100, 100]));
    assert_eq!(boxed.get_pixel(10, 0), &Rgb([0, 0, 0]));
  }

  #[test]
  fn network_input_resizes_only_when_needed() {
    let image = filled(64, 64, 10);
    assert!(matches!(to_network_input(&image, 64, 64), Cow::Borrowed(_)));
    let resized = to_network_input(&image, 16, 16);
    assert_eq!(resized.dimensions(), (16, 16));
  }

  #[test]
  fn scale_factors_follow_canvas() {
    let canvas = RgbImage::new(1280, 1280);
    assert_eq!(scale_factors(&canvas, 640, 640), (2.0, 2.0));
  }
}
