// 该文件是 Shanan （山南西风） 项目的一部分。
// src/letterbox.rs - Letterbox 几何参数
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

use crate::model::DetectItem;

/// 预处理时等比缩放 + 居中填充的几何参数
///
/// 解码流程本身不会调用 `unmap`，检测结果默认保持在模型输入坐标系。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub src_w: u32,
  pub src_h: u32,
  pub target: u32,
  pub scale: f32,
  pub resized_w: u32,
  pub resized_h: u32,
  pub pad_x: u32,
  pub pad_y: u32,
}

impl Letterbox {
  pub fn new(src_w: u32, src_h: u32, target: u32) -> Self {
    let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
    // 截断取整，与硬件缩放的目标尺寸一致
    let resized_w = ((src_w as f32 * scale) as u32).min(target);
    let resized_h = ((src_h as f32 * scale) as u32).min(target);

    Self {
      src_w,
      src_h,
      target,
      scale,
      resized_w,
      resized_h,
      pad_x: (target - resized_w) / 2,
      pad_y: (target - resized_h) / 2,
    }
  }

  /// 将模型输入坐标映射回原图坐标，并截断到原图范围
  pub fn unmap(&self, item: &DetectItem) -> DetectItem {
    let (pad_x, pad_y) = (self.pad_x as f32, self.pad_y as f32);
    let (w, h) = (self.src_w as f32, self.src_h as f32);
    let [x1, y1, x2, y2] = item.bbox;

    DetectItem {
      class_id: item.class_id,
      score: item.score,
      bbox: [
        ((x1 - pad_x) / self.scale).clamp(0.0, w),
        ((y1 - pad_y) / self.scale).clamp(0.0, h),
        ((x2 - pad_x) / self.scale).clamp(0.0, w),
        ((y2 - pad_y) / self.scale).clamp(0.0, h),
      ],
    }
  }
}
