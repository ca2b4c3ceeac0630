// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect/nms.rs - 类别感知的非极大值抑制
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

/// 计算两个边界框的 IoU
///
/// 并集面积不为正（退化框）时返回 0。
pub fn iou(a: &DetectItem, b: &DetectItem) -> f32 {
  let x1 = a.bbox[0].max(b.bbox[0]);
  let y1 = a.bbox[1].max(b.bbox[1]);
  let x2 = a.bbox[2].min(b.bbox[2]);
  let y2 = a.bbox[3].min(b.bbox[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 非极大值抑制
///
/// 按得分降序稳定排序（同分保持输入顺序），只在相同类别之间按
/// `IoU > iou_threshold` 抑制。输出保持降序，框本身不做任何修改。
pub fn nms(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  // sort_by 为稳定排序
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut suppressed = vec![false; items.len()];
  for i in 0..items.len() {
    if suppressed[i] {
      continue;
    }
    let best = &items[i];
    for j in (i + 1)..items.len() {
      if suppressed[j] || items[j].class_id != best.class_id {
        continue;
      }
      if iou(best, &items[j]) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  items
    .into_iter()
    .zip(suppressed)
    .filter_map(|(item, suppressed)| (!suppressed).then_some(item))
    .collect()
}
