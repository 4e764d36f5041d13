// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;
use std::sync::Mutex;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use serde_json::json;
use tracing::{info, warn};

use crate::model::{Detection, DetectResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_BAR_HEIGHT: i32 = 20;
const LABEL_TEXT_OFFSET: i32 = 18;
const BOX_THICKNESS: i32 = 3;
const TEXT_COLOR: [u8; 3] = [0, 0, 0];

// 帧率文字，基线位于 (10, 25)
const FPS_FONT_SIZE: f32 = 24.0;
const FPS_TEXT_X: i32 = 10;
const FPS_TEXT_BASELINE: i32 = 25;
const FPS_COLOR: [u8; 3] = [255, 0, 0];

/// 默认标签字体 (DejaVu Sans)
static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

/// 按类别循环使用的边框颜色
pub const PALETTE: [[u8; 3]; 4] = [[0, 255, 255], [0, 255, 0], [255, 255, 0], [0, 0, 255]];

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  palette: Vec<[u8; 3]>,
  fps: Mutex<Option<f32>>,
}

fn default_font() -> Option<FontArc> {
  FontArc::try_from_slice(DEFAULT_FONT)
    .map_err(|e| warn!("无法加载内置字体: {}, 不绘制文字", e))
    .ok()
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: default_font(),
      font_size: LABEL_FONT_SIZE,
      palette: PALETTE.to_vec(),
      fps: Mutex::new(None),
    }
  }
}

/// 将一维区间限制在图像附近，避免极端坐标在绘制时溢出
fn clip_span(start: i32, len: i32, limit: u32) -> (i32, i32) {
  let margin = (LABEL_BAR_HEIGHT + BOX_THICKNESS) as i64;
  let (lo, hi) = (-margin, limit as i64 + margin);
  let a = (start as i64).clamp(lo, hi);
  let b = (start as i64 + len as i64).clamp(lo, hi);
  (a as i32, (b - a) as i32)
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  /// 从 TTF/OTF 文件加载标签字体，失败时保留内置字体
  pub fn with_font_file<P: AsRef<Path>>(self, path: P) -> Self {
    let path = path.as_ref();
    let font = std::fs::read(path)
      .map_err(|e| e.to_string())
      .and_then(|data| FontArc::try_from_vec(data).map_err(|e| e.to_string()));
    match font {
      Ok(font) => {
        info!("加载标签字体: {}", path.display());
        self.with_font(font)
      }
      Err(e) => {
        warn!("无法加载字体 {}: {}, 使用内置字体", path.display(), e);
        self
      }
    }
  }

  /// 由 URL 的 `font` 查询参数构建
  pub fn from_url(url: &url::Url) -> Self {
    match crate::url_query(url, "font") {
      Some(path) => Self::default().with_font_file(path),
      None => Self::default(),
    }
  }

  /// 更新叠加在画面左上角的帧率
  pub fn set_fps(&self, fps: f32) {
    if let Ok(mut current) = self.fps.lock() {
      *current = Some(fps);
    }
  }

  pub fn fps(&self) -> Option<f32> {
    self.fps.lock().ok().and_then(|fps| *fps)
  }

  pub fn color(&self, class_id: usize) -> Rgb<u8> {
    Rgb(self.palette[class_id % self.palette.len()])
  }

  fn draw_item(&self, image: &mut RgbImage, item: &Detection, label: &str) {
    if item.bbox.width <= 0 || item.bbox.height <= 0 {
      return;
    }
    let (x, width) = clip_span(item.bbox.x, item.bbox.width, image.width());
    let (y, height) = clip_span(item.bbox.y, item.bbox.height, image.height());
    if width <= 0 || height <= 0 {
      return;
    }
    let color = self.color(item.class_id);

    // 边框向内加粗
    for t in 0..BOX_THICKNESS {
      let (w, h) = (width - 2 * t, height - 2 * t);
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x + t, y + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 标签背景位于边框上方，超出图像的部分由 imageproc 裁剪
    let bar = Rect::at(x, y - LABEL_BAR_HEIGHT).of_size(width as u32, LABEL_BAR_HEIGHT as u32);
    draw_filled_rect_mut(image, bar, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        x,
        y - LABEL_TEXT_OFFSET,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
  }

  fn draw_fps(&self, image: &mut RgbImage) {
    if let (Some(font), Some(fps)) = (&self.font, self.fps()) {
      draw_text_mut(
        image,
        Rgb(FPS_COLOR),
        FPS_TEXT_X,
        FPS_TEXT_BASELINE - FPS_FONT_SIZE as i32,
        PxScale::from(FPS_FONT_SIZE),
        font,
        &format!("FPS: {:.2}", fps),
      );
    }
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_item(image, item, result.label(item));
    }
    self.draw_fps(image);
  }

  pub fn draw_detection(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut image = image.clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}

/// 按目标宽度等比缩放
pub fn resize_to_width(image: &RgbImage, width: u32) -> RgbImage {
  let height = (image.height() as f32 * width as f32 / image.width() as f32) as u32;
  imageops::resize(image, width, height.max(1), imageops::FilterType::Triangle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  Name,
  Id,
  Json,
}

/// 检测结果文本记录
pub struct Record {
  pub format: RecordFormat,
}

impl Record {
  pub fn render(&self, result: &DetectResult) -> String {
    match self.format {
      RecordFormat::Json => {
        let items: Vec<_> = result
          .items
          .iter()
          .map(|item| {
            json!({
              "class_id": item.class_id,
              "class_name": result.label(item),
              "confidence": item.confidence,
              "box": {
                "x": item.bbox.x,
                "y": item.bbox.y,
                "width": item.bbox.width,
                "height": item.bbox.height,
              },
            })
          })
          .collect();
        serde_json::Value::Array(items).to_string()
      }
      RecordFormat::Name | RecordFormat::Id => result
        .items
        .iter()
        .map(|item| {
          let name = if self.format == RecordFormat::Name {
            result.label(item).to_string()
          } else {
            item.class_id.to_string()
          };
          format!(
            "{}, {:.4}, {}, {}, {}, {}",
            name, item.confidence, item.bbox.x, item.bbox.y, item.bbox.width, item.bbox.height
          )
        })
        .collect::<Vec<_>>()
        .join("\n"),
    }
  }

  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    let extension = if self.format == RecordFormat::Json {
      "json"
    } else {
      "txt"
    };
    std::fs::write(path.with_extension(extension), self.render(result))
  }
}
