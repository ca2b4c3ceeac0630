// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/outputs.rs - 推理运行时输出与检测分支绑定
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

use tracing::{debug, error, info, warn};

use crate::{
  detect::{DecodeConfig, DecodeError, DetectionBranch, TensorLayout},
  quant::{QuantParams, QuantizedTensor},
};

/// 推理运行时的一个输出张量（属性 + 数据）
#[derive(Debug, Clone, Copy)]
pub struct OutputTensor<'a> {
  pub index: usize,
  pub dims: &'a [usize],
  pub layout: TensorLayout,
  pub quant: QuantParams,
  pub data: &'a [i8],
}

impl OutputTensor<'_> {
  /// 解析 (通道数, 网格高, 网格宽)，批大小必须为 1
  pub fn grid(&self) -> Result<(usize, usize, usize), DecodeError> {
    let dims = match self.dims {
      [1, rest @ ..] if rest.len() == 3 => rest,
      rest if rest.len() == 3 => rest,
      _ => {
        return Err(DecodeError::Binding(format!(
          "输出 {} 的维度不受支持: {:?}",
          self.index, self.dims
        )));
      }
    };

    Ok(match self.layout {
      TensorLayout::Nchw => (dims[0], dims[1], dims[2]),
      TensorLayout::Nhwc => (dims[2], dims[0], dims[1]),
    })
  }
}

/// 推理运行时的输出集合
///
/// 运行时本身（模型加载、执行）不在本库中，这里只约定读取输出的方式。
pub trait ModelOutputs {
  fn num_outputs(&self) -> usize;
  fn output(&self, index: usize) -> Option<OutputTensor<'_>>;
}

#[derive(Default)]
struct HeadGroup<'a> {
  grid_h: usize,
  grid_w: usize,
  layout: TensorLayout,
  box_tensor: Option<OutputTensor<'a>>,
  class_tensor: Option<OutputTensor<'a>>,
  gate_tensor: Option<OutputTensor<'a>>,
}

fn to_tensor<'a>(output: &OutputTensor<'a>) -> Result<QuantizedTensor<'a>, DecodeError> {
  QuantizedTensor::new(output.data, output.quant, output.dims).map_err(DecodeError::from)
}

/// 逐个列出模型输出的维度、排布与量化参数
pub fn log_outputs<O: ModelOutputs + ?Sized>(outputs: &O) {
  info!("模型输出数量: {}", outputs.num_outputs());
  for index in 0..outputs.num_outputs() {
    match outputs.output(index) {
      Some(output) => info!(
        "  输出 {}: 维度 {:?}, 排布 {:?}, scale={}, zp={}",
        index, output.dims, output.layout, output.quant.scale, output.quant.zero_point
      ),
      None => warn!("  输出 {}: 无法获取", index),
    }
  }
}

/// 根据输出的形状和通道数组装检测分支
///
/// 按网格尺寸分组；组内按通道数分配角色：`4 * dfl_bins` 为回归，
/// `num_classes` 为分类，1 为门控。通道数同时满足多个角色时按输出索引顺序
/// 填入第一个空缺的角色。步长由 `input_size / grid_w` 推出，必须整除。
/// 返回的分支按步长升序排列。
pub fn bind_branches<'a, O: ModelOutputs + ?Sized>(
  outputs: &'a O,
  config: &DecodeConfig,
  input_size: usize,
) -> Result<Vec<DetectionBranch<'a>>, DecodeError> {
  config.validate()?;
  log_outputs(outputs);

  let box_channels = config.box_channels();
  let mut groups: Vec<HeadGroup<'a>> = Vec::new();

  for index in 0..outputs.num_outputs() {
    let output = outputs
      .output(index)
      .ok_or_else(|| DecodeError::Binding(format!("无法获取第 {} 个输出", index)))?;
    let (channels, grid_h, grid_w) = output.grid()?;

    let group = match groups
      .iter()
      .position(|g| g.grid_h == grid_h && g.grid_w == grid_w)
    {
      Some(pos) => &mut groups[pos],
      None => {
        groups.push(HeadGroup {
          grid_h,
          grid_w,
          layout: output.layout,
          ..Default::default()
        });
        let last = groups.len() - 1;
        &mut groups[last]
      }
    };

    if group.layout != output.layout {
      error!(
        "输出 {} 的排布 {:?} 与同尺度其他输出 {:?} 不一致",
        index, output.layout, group.layout
      );
      return Err(DecodeError::Binding(format!(
        "输出 {} 的排布与同尺度其他输出不一致",
        index
      )));
    }

    let slot = if channels == box_channels && group.box_tensor.is_none() {
      debug!("输出 {}: {}x{} 回归, 通道 {}", index, grid_h, grid_w, channels);
      &mut group.box_tensor
    } else if channels == config.num_classes && group.class_tensor.is_none() {
      debug!("输出 {}: {}x{} 分类, 通道 {}", index, grid_h, grid_w, channels);
      &mut group.class_tensor
    } else if channels == 1 && group.gate_tensor.is_none() {
      debug!("输出 {}: {}x{} 门控", index, grid_h, grid_w);
      &mut group.gate_tensor
    } else {
      error!(
        "输出 {} 无法分配角色: 网格 {}x{}, 通道 {}",
        index, grid_h, grid_w, channels
      );
      return Err(DecodeError::Binding(format!(
        "输出 {} 无法分配角色: 网格 {}x{}, 通道 {}",
        index, grid_h, grid_w, channels
      )));
    };
    *slot = Some(output);
  }

  let mut branches = Vec::with_capacity(groups.len());
  for group in groups {
    let (Some(box_output), Some(class_output)) = (&group.box_tensor, &group.class_tensor) else {
      return Err(DecodeError::Binding(format!(
        "尺度 {}x{} 缺少回归或分类输出",
        group.grid_h, group.grid_w
      )));
    };

    let stride = input_size / group.grid_w;
    let covers = |cells: usize| cells.checked_mul(stride) == Some(input_size);
    if stride == 0 || !covers(group.grid_w) || !covers(group.grid_h) {
      return Err(DecodeError::Binding(format!(
        "尺度 {}x{} 与输入尺寸 {} 不匹配",
        group.grid_h, group.grid_w, input_size
      )));
    }

    let mut branch = DetectionBranch::new(
      group.grid_h,
      group.grid_w,
      stride as f32,
      to_tensor(box_output)?,
      to_tensor(class_output)?,
    )
    .with_layout(group.layout);
    if let Some(gate_output) = &group.gate_tensor {
      branch = branch.with_gate(to_tensor(gate_output)?);
    }
    branches.push(branch);
  }

  branches.sort_by(|a, b| a.stride.total_cmp(&b.stride));
  debug!("绑定 {} 个检测分支", branches.len());

  Ok(branches)
}
