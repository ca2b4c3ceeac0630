// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect/branch.rs - 单尺度检测分支解码
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

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
  detect::{DecodeConfig, DecodeError, dfl::dfl_distance},
  model::DetectItem,
  quant::QuantizedTensor,
};

/// 输出张量的内存排布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
  /// 通道优先，同一通道的所有网格单元连续存放（RKNN 默认输出）
  #[default]
  Nchw,
  /// 单元优先，同一网格单元的所有通道连续存放
  Nhwc,
}

impl TensorLayout {
  #[inline]
  pub fn index(self, cell: usize, channel: usize, cells: usize, channels: usize) -> usize {
    match self {
      TensorLayout::Nchw => channel * cells + cell,
      TensorLayout::Nhwc => cell * channels + channel,
    }
  }
}

/// 一个输出尺度的检测头
///
/// 回归张量每个单元 `4 * dfl_bins` 个值，分类张量每个单元 `num_classes` 个值，
/// 可选的门控张量每个单元一个值。三者共享同一种内存排布。
#[derive(Debug, Clone)]
pub struct DetectionBranch<'a> {
  pub grid_h: usize,
  pub grid_w: usize,
  pub stride: f32,
  pub layout: TensorLayout,
  pub box_tensor: QuantizedTensor<'a>,
  pub class_tensor: QuantizedTensor<'a>,
  pub gate_tensor: Option<QuantizedTensor<'a>>,
}

impl<'a> DetectionBranch<'a> {
  pub fn new(
    grid_h: usize,
    grid_w: usize,
    stride: f32,
    box_tensor: QuantizedTensor<'a>,
    class_tensor: QuantizedTensor<'a>,
  ) -> Self {
    Self {
      grid_h,
      grid_w,
      stride,
      layout: TensorLayout::default(),
      box_tensor,
      class_tensor,
      gate_tensor: None,
    }
  }

  pub fn with_gate(mut self, gate_tensor: QuantizedTensor<'a>) -> Self {
    self.gate_tensor = Some(gate_tensor);
    self
  }

  pub fn with_layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn cells(&self) -> usize {
    self.grid_h * self.grid_w
  }

  /// 每次推理对每个分支只校验一次尺寸
  pub fn validate(&self, branch: usize, config: &DecodeConfig) -> Result<(), DecodeError> {
    config.validate()?;

    let invalid_grid = || DecodeError::InvalidGrid {
      branch,
      grid_h: self.grid_h,
      grid_w: self.grid_w,
      stride: self.stride,
    };
    if self.grid_h == 0 || self.grid_w == 0 || !(self.stride.is_finite() && self.stride > 0.0) {
      return Err(invalid_grid());
    }
    let cells = self.grid_h.checked_mul(self.grid_w).ok_or_else(invalid_grid)?;

    // 期望长度溢出时不可能与实际长度相等
    let check = |tensor: &'static str, actual: usize, per_cell: usize| {
      let expected = cells.checked_mul(per_cell).unwrap_or(usize::MAX);
      if actual == expected {
        Ok(())
      } else {
        Err(DecodeError::TensorLength {
          branch,
          tensor,
          expected,
          actual,
        })
      }
    };

    check("回归", self.box_tensor.len(), config.box_channels())?;
    check("分类", self.class_tensor.len(), config.num_classes)?;
    if let Some(gate) = &self.gate_tensor {
      check("门控", gate.len(), 1)?;
    }

    Ok(())
  }
}

/// 单个分支的解码统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchStats {
  pub cells: usize,
  /// 被门控快速拒绝的单元数
  pub gated: usize,
  /// 执行了类别扫描的单元数
  pub class_scans: usize,
  pub candidates: usize,
}

/// 解码一个检测分支，候选框追加到 `out`
///
/// 按行优先顺序遍历网格单元。类别取最大值时直接比较原始 int8 值，
/// 只对胜出的值反量化。
pub fn decode_branch(
  branch_idx: usize,
  branch: &DetectionBranch<'_>,
  config: &DecodeConfig,
  out: &mut Vec<DetectItem>,
) -> Result<BranchStats, DecodeError> {
  branch.validate(branch_idx, config).inspect_err(|e| {
    error!("检测分支 {} 校验失败: {}", branch_idx, e);
  })?;

  let cells = branch.cells();
  let num_classes = config.num_classes;
  let bins = config.dfl_bins;
  let box_channels = config.box_channels();
  let layout = branch.layout;
  let stride = branch.stride;
  let threshold = config.conf_threshold;

  let box_raw = branch.box_tensor.raw();
  let class_raw = branch.class_tensor.raw();
  let class_params = branch.class_tensor.params();
  let box_params = branch.box_tensor.params();

  // 置信度阈值换算到门控张量的原始值域，每个分支只算一次
  let gate = branch
    .gate_tensor
    .as_ref()
    .filter(|_| config.use_gate)
    .map(|gate| (gate.raw(), gate.params().quantize(threshold)));

  debug!(
    "检测分支 {}: 网格 {}x{}, 步长 {}, 排布 {:?}, 门控 {:?}",
    branch_idx,
    branch.grid_h,
    branch.grid_w,
    stride,
    layout,
    gate.map(|(_, raw)| raw)
  );

  let mut stats = BranchStats {
    cells,
    ..Default::default()
  };
  let mut logits = Vec::with_capacity(bins);
  let mut scratch = Vec::with_capacity(bins);

  for row in 0..branch.grid_h {
    for col in 0..branch.grid_w {
      let cell = row * branch.grid_w + col;

      if let Some((gate_raw, gate_threshold)) = gate
        && (gate_raw[cell] as i32) < gate_threshold
      {
        stats.gated += 1;
        continue;
      }

      stats.class_scans += 1;
      let (max_raw, class_id) = {
        let mut max_raw = class_raw[layout.index(cell, 0, cells, num_classes)];
        let mut class_id = 0usize;
        for c in 1..num_classes {
          let raw = class_raw[layout.index(cell, c, cells, num_classes)];
          if raw > max_raw {
            max_raw = raw;
            class_id = c;
          }
        }
        (max_raw, class_id)
      };

      let score = class_params.dequantize(max_raw);
      if score < threshold {
        continue;
      }

      // 左、上、右、下
      let mut dist = [0.0f32; 4];
      for (side, d) in dist.iter_mut().enumerate() {
        logits.clear();
        logits.extend((0..bins).map(|j| {
          let raw = box_raw[layout.index(cell, side * bins + j, cells, box_channels)];
          box_params.dequantize(raw)
        }));
        *d = dfl_distance(&logits, &mut scratch);
      }

      let cx = (col as f32 + 0.5) * stride;
      let cy = (row as f32 + 0.5) * stride;

      out.push(DetectItem {
        class_id: class_id as u32,
        score,
        bbox: [
          cx - dist[0] * stride,
          cy - dist[1] * stride,
          cx + dist[2] * stride,
          cy + dist[3] * stride,
        ],
      });
      stats.candidates += 1;
    }
  }

  Ok(stats)
}
