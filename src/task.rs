// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 后处理任务
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{model::PostProcess, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: PostProcess<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入数据"))?;
    info!("输入数据获取成功，开始后处理...");
    let now = Instant::now();
    let result = model.process(&frame)?;
    let elapsed = now.elapsed();
    info!("后处理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("输出完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 重复解码同一帧，统计平均耗时（跳过前两次预热）
pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times;
    self
  }
}

fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  const WARMUP: usize = 2;
  let measured = times.get(WARMUP..).filter(|t| !t.is_empty())?;
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: PostProcess<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    if self.repeat_times == 0 {
      anyhow::bail!("重复次数必须至少为 1");
    }

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入数据"))?;
    info!("输入数据获取成功，开始重复后处理 {} 次...", self.repeat_times);

    let mut times = Vec::with_capacity(self.repeat_times);
    let mut last = None;
    for i in 0..self.repeat_times {
      let now = Instant::now();
      let result = model.process(&frame)?;
      let elapsed = now.elapsed();
      info!("({})后处理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    match average_after_warmup(&times) {
      Some(avg) => warn!("平均后处理时间: {:.2?}", avg),
      None => warn!("重复次数不足，无法统计平均时间"),
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::{Cell, RefCell};
  use std::convert::Infallible;
  use std::rc::Rc;

  #[derive(Default, Clone)]
  struct CountingModel {
    calls: Rc<Cell<usize>>,
  }

  impl PostProcess for CountingModel {
    type Input = u32;
    type Output = u32;
    type Error = Infallible;

    fn process(&self, input: &u32) -> Result<u32, Infallible> {
      self.calls.set(self.calls.get() + 1);
      Ok(input * 2)
    }
  }

  #[derive(Default, Clone)]
  struct CollectOutput {
    seen: Rc<RefCell<Vec<(u32, u32)>>>,
  }

  impl Render<u32, u32> for CollectOutput {
    type Error = Infallible;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), Infallible> {
      self.seen.borrow_mut().push((*frame, *result));
      Ok(())
    }
  }

  #[test]
  fn oneshot_processes_first_frame_only() {
    let model = CountingModel::default();
    let output = CollectOutput::default();
    OneShotTask
      .run_task(vec![3u32, 4].into_iter(), model.clone(), output.clone())
      .unwrap();
    assert_eq!(model.calls.get(), 1);
    assert_eq!(*output.seen.borrow(), vec![(3, 6)]);
  }

  #[test]
  fn oneshot_without_input_fails() {
    let result = OneShotTask.run_task(
      Vec::<u32>::new().into_iter(),
      CountingModel::default(),
      CollectOutput::default(),
    );
    assert!(result.is_err());
  }

  #[test]
  fn repeatshot_renders_last_result_once() {
    let model = CountingModel::default();
    let output = CollectOutput::default();
    RepeatShotTask::default()
      .with_repeat_times(5)
      .run_task(vec![7u32].into_iter(), model.clone(), output.clone())
      .unwrap();
    assert_eq!(model.calls.get(), 5);
    assert_eq!(*output.seen.borrow(), vec![(7, 14)]);
  }

  #[test]
  fn repeatshot_rejects_zero_repeats() {
    let model = CountingModel::default();
    let output = CollectOutput::default();
    let result = RepeatShotTask::default().with_repeat_times(0).run_task(
      vec![7u32].into_iter(),
      model.clone(),
      output.clone(),
    );
    assert!(result.is_err());
    assert_eq!(model.calls.get(), 0);
    assert!(output.seen.borrow().is_empty());
  }

  #[test]
  fn average_skips_warmup() {
    let times = [
      Duration::from_millis(100),
      Duration::from_millis(50),
      Duration::from_millis(2),
      Duration::from_millis(4),
    ];
    assert_eq!(average_after_warmup(&times), Some(Duration::from_millis(3)));
    assert_eq!(average_after_warmup(&times[..2]), None);
  }
}
