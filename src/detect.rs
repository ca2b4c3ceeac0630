// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect.rs - 检测后处理：多尺度解码与汇总
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

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  model::{DetectItem, DetectResult},
  quant::QuantError,
};

mod branch;
mod dfl;
mod nms;

pub use self::branch::{BranchStats, DetectionBranch, TensorLayout, decode_branch};
pub use self::dfl::{SOFTMAX_EPSILON, dfl_distance, softmax};
pub use self::nms::{iou, nms};

pub const DEFAULT_NUM_CLASSES: usize = 80;
pub const DEFAULT_DFL_BINS: usize = 16;
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("量化张量错误: {0}")]
  Quant(#[from] QuantError),
  #[error("检测分支 {branch} 的 {tensor} 张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  TensorLength {
    branch: usize,
    tensor: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("检测分支 {branch} 的网格无效: {grid_h}x{grid_w}, 步长 {stride}")]
  InvalidGrid {
    branch: usize,
    grid_h: usize,
    grid_w: usize,
    stride: f32,
  },
  #[error("解码配置无效: {0}")]
  InvalidConfig(String),
  #[error("模型输出绑定失败: {0}")]
  Binding(String),
  #[error("检测分支 {0} 的工作线程异常退出")]
  WorkerPanicked(usize),
}

/// 解码配置
///
/// 类别数、DFL 分箱数与阈值都作为不可变配置传入解码器，
/// 测试可以使用任意的合成类别数。
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeConfig {
  pub num_classes: usize,
  pub dfl_bins: usize,
  /// 置信度阈值 T，得分 `>= T` 的候选框保留
  pub conf_threshold: f32,
  /// NMS IoU 阈值 N，同类 `IoU > N` 时抑制
  pub nms_threshold: f32,
  /// 存在门控张量时是否启用快速拒绝
  pub use_gate: bool,
  /// 每个检测分支一个工作线程
  pub parallel: bool,
}

impl Default for DecodeConfig {
  fn default() -> Self {
    Self {
      num_classes: DEFAULT_NUM_CLASSES,
      dfl_bins: DEFAULT_DFL_BINS,
      conf_threshold: DEFAULT_CONF_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      use_gate: true,
      parallel: false,
    }
  }
}

impl DecodeConfig {
  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn with_dfl_bins(mut self, dfl_bins: usize) -> Self {
    self.dfl_bins = dfl_bins;
    self
  }

  pub fn with_conf_threshold(mut self, threshold: f32) -> Self {
    self.conf_threshold = threshold;
    self
  }

  pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn with_gate(mut self, use_gate: bool) -> Self {
    self.use_gate = use_gate;
    self
  }

  pub fn with_parallel(mut self, parallel: bool) -> Self {
    self.parallel = parallel;
    self
  }

  /// 每个网格单元的回归值个数 (4 条边 × DFL 分箱)，调用前需先通过 `validate`
  pub fn box_channels(&self) -> usize {
    4 * self.dfl_bins
  }

  pub fn validate(&self) -> Result<(), DecodeError> {
    if self.num_classes == 0 {
      return Err(DecodeError::InvalidConfig("类别数必须大于 0".to_string()));
    }
    if self.dfl_bins == 0 {
      return Err(DecodeError::InvalidConfig(
        "DFL 分箱数必须大于 0".to_string(),
      ));
    }
    if self.dfl_bins.checked_mul(4).is_none() {
      return Err(DecodeError::InvalidConfig(format!(
        "DFL 分箱数过大: {}",
        self.dfl_bins
      )));
    }
    if !self.conf_threshold.is_finite() {
      return Err(DecodeError::InvalidConfig(format!(
        "置信度阈值无效: {}",
        self.conf_threshold
      )));
    }
    if !self.nms_threshold.is_finite() {
      return Err(DecodeError::InvalidConfig(format!(
        "NMS 阈值无效: {}",
        self.nms_threshold
      )));
    }
    Ok(())
  }
}

/// 对所有检测分支执行解码并拼接候选框
///
/// 任一分支配置错误都会使本次推理失败，不会用零值替代。
pub fn decode_branches(
  branches: &[DetectionBranch<'_>],
  config: &DecodeConfig,
) -> Result<Vec<DetectItem>, DecodeError> {
  config.validate()?;

  if config.parallel && branches.len() > 1 {
    return decode_branches_parallel(branches, config);
  }

  let mut candidates = Vec::new();
  for (idx, branch) in branches.iter().enumerate() {
    let stats = decode_branch(idx, branch, config, &mut candidates).inspect_err(|e| {
      error!("检测分支 {} 解码失败: {}", idx, e);
    })?;
    debug!("检测分支 {}: {:?}", idx, stats);
  }

  Ok(candidates)
}

fn decode_branches_parallel(
  branches: &[DetectionBranch<'_>],
  config: &DecodeConfig,
) -> Result<Vec<DetectItem>, DecodeError> {
  let results = std::thread::scope(|scope| {
    let handles = branches
      .iter()
      .enumerate()
      .map(|(idx, branch)| {
        scope.spawn(move || {
          let mut items = Vec::new();
          decode_branch(idx, branch, config, &mut items).map(|stats| (items, stats))
        })
      })
      .collect::<Vec<_>>();

    handles
      .into_iter()
      .enumerate()
      .map(|(idx, handle)| {
        handle
          .join()
          .unwrap_or(Err(DecodeError::WorkerPanicked(idx)))
      })
      .collect::<Vec<_>>()
  });

  let mut candidates = Vec::new();
  for (idx, result) in results.into_iter().enumerate() {
    let (items, stats) = result.inspect_err(|e| {
      error!("检测分支 {} 解码失败: {}", idx, e);
    })?;
    debug!("检测分支 {}: {:?}", idx, stats);
    candidates.extend(items);
  }

  Ok(candidates)
}

/// 完整后处理：多尺度解码 + 类别感知 NMS
pub fn postprocess(
  branches: &[DetectionBranch<'_>],
  config: &DecodeConfig,
) -> Result<DetectResult, DecodeError> {
  let candidates = decode_branches(branches, config)?;
  debug!("NMS 前候选框数量: {}", candidates.len());

  let items = nms(candidates, config.nms_threshold);
  debug!("检测到 {} 个物体", items.len());

  Ok(DetectResult {
    items: items.into_boxed_slice(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_matches_yolov8_coco() {
    let config = DecodeConfig::default();
    assert_eq!(config.num_classes, 80);
    assert_eq!(config.dfl_bins, 16);
    assert_eq!(config.box_channels(), 64);
    assert_eq!(config.conf_threshold, 0.25);
    assert_eq!(config.nms_threshold, 0.45);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn invalid_config_is_rejected() {
    let config = DecodeConfig::default().with_num_classes(0);
    assert!(matches!(
      config.validate(),
      Err(DecodeError::InvalidConfig(_))
    ));

    let config = DecodeConfig::default().with_dfl_bins(0);
    assert!(config.validate().is_err());

    let config = DecodeConfig::default().with_conf_threshold(f32::NAN);
    assert!(config.validate().is_err());

    let config = DecodeConfig::default().with_dfl_bins(usize::MAX / 4 + 1);
    assert!(matches!(
      config.validate(),
      Err(DecodeError::InvalidConfig(_))
    ));
    assert!(DecodeConfig::default().with_dfl_bins(usize::MAX / 4).validate().is_ok());

    assert!(matches!(
      decode_branches(&[], &DecodeConfig::default().with_nms_threshold(f32::INFINITY)),
      Err(DecodeError::InvalidConfig(_))
    ));
  }

  #[test]
  fn no_branches_is_an_empty_result() {
    let result = postprocess(&[], &DecodeConfig::default()).unwrap();
    assert!(result.is_empty());
  }
}
