// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务调度
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

use std::{
  sync::mpsc,
  thread,
  time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{model::Model, output::Render};

/// 预热轮次，不计入平均耗时
const WARMUP_RUNS: usize = 2;
/// 每隔多少帧输出一次帧率
const FPS_REPORT_INTERVAL: usize = 30;

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
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧重复推理，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  repeat: usize,
  render: bool,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      render: true,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }

  /// 关闭后只渲染最后一次结果
  pub fn with_render(mut self, render: bool) -> Self {
    self.render = render;
    self
  }
}

/// 跳过预热轮次后的平均耗时，样本不足时退化为全部样本
pub fn mean_after_warmup(times: &[Duration]) -> Option<Duration> {
  let samples = if times.len() > WARMUP_RUNS {
    &times[WARMUP_RUNS..]
  } else {
    times
  };
  if samples.is_empty() {
    return None;
  }
  Some(samples.iter().sum::<Duration>() / samples.len() as u32)
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理 {} 次...", self.repeat);
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      if self.render || i + 1 == self.repeat {
        output.render_result(&frame, &result)?;
        info!("({})渲染完成，耗时: {:.2?}", i, now.elapsed());
      }
      times.push(elapsed);
    }

    if let Some(mean) = mean_after_warmup(&times) {
      warn!("平均推理时间: {:.2?}", mean);
    }

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

/// 注册 Ctrl-C 处理；收到信号 30 秒后仍未退出则强制结束进程
fn interrupt_channel() -> mpsc::Receiver<()> {
  let (tx, rx) = mpsc::channel();

  let installed = ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  });
  if let Err(e) = installed {
    warn!("无法注册 Ctrl-C 处理: {}", e);
  }

  rx
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let rx = interrupt_channel();

    let mut frame_count: usize = 0;
    let mut window_start = Instant::now();
    for frame in input {
      frame_count += 1;
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();

      // 每 30 帧更新一次帧率，并叠加到之后的输出画面
      if frame_count % FPS_REPORT_INTERVAL == 0 {
        let secs = window_start.elapsed().as_secs_f64().max(f64::EPSILON);
        let fps = (FPS_REPORT_INTERVAL as f64 / secs) as f32;
        info!("FPS: {:.2}", fps);
        output.update_fps(fps);
        window_start = Instant::now();
      }

      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      info!(
        "第 {} 帧推理完成，耗时: {:.2?} / {:.2?}",
        frame_count, elapsed_a, elapsed_b
      );

      if self.frame_number.is_some_and(|n| frame_count >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_count);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧，退出", frame_count);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::{Cell, RefCell};
  use std::convert::Infallible;

  use super::*;

  /// 输出帧号的两倍
  struct Doubler;

  impl Model for Doubler {
    type Input = u32;
    type Output = u32;
    type Error = Infallible;

    fn infer(&mut self, input: &u32) -> Result<u32, Infallible> {
      Ok(input * 2)
    }
  }

  #[derive(Default)]
  struct Collect {
    seen: RefCell<Vec<(u32, u32)>>,
    /// 更新帧率时已渲染的帧数
    fps_updates: RefCell<Vec<usize>>,
  }

  impl Render<u32, u32> for &Collect {
    type Error = Infallible;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), Infallible> {
      self.seen.borrow_mut().push((*frame, *result));
      Ok(())
    }

    fn update_fps(&self, fps: f32) {
      assert!(fps > 0.0);
      self.fps_updates.borrow_mut().push(self.seen.borrow().len());
    }
  }

  #[derive(Debug, thiserror::Error)]
  #[error("failing")]
  struct Failing;

  struct FailingModel;

  impl Model for FailingModel {
    type Input = u32;
    type Output = u32;
    type Error = Failing;

    fn infer(&mut self, _: &u32) -> Result<u32, Failing> {
      Err(Failing)
    }
  }

  #[test]
  fn one_shot_uses_first_frame() {
    let output = Collect::default();
    OneShotTask
      .run_task(vec![3, 4].into_iter(), Doubler, &output)
      .unwrap();
    assert_eq!(*output.seen.borrow(), vec![(3, 6)]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let output = Collect::default();
    let result = OneShotTask.run_task(std::iter::empty(), Doubler, &output);
    assert!(result.is_err());
  }

  #[test]
  fn model_errors_propagate() {
    let output = Collect::default();
    let result = OneShotTask.run_task(vec![1].into_iter(), FailingModel, &output);
    assert_eq!(result.unwrap_err().to_string(), "failing");
  }

  #[test]
  fn repeat_shot_renders_each_run() {
    let output = Collect::default();
    RepeatShotTask::default()
      .with_repeat(5)
      .run_task(vec![1].into_iter(), Doubler, &output)
      .unwrap();
    assert_eq!(output.seen.borrow().len(), 5);

    let output = Collect::default();
    RepeatShotTask::default()
      .with_repeat(5)
      .with_render(false)
      .run_task(vec![2].into_iter(), Doubler, &output)
      .unwrap();
    assert_eq!(*output.seen.borrow(), vec![(2, 4)]);
  }

  #[test]
  fn warmup_runs_are_excluded_from_mean() {
    let times = [
      Duration::from_millis(100),
      Duration::from_millis(50),
      Duration::from_millis(10),
      Duration::from_millis(20),
    ];
    assert_eq!(mean_after_warmup(&times), Some(Duration::from_millis(15)));
    assert_eq!(
      mean_after_warmup(&times[..1]),
      Some(Duration::from_millis(100))
    );
    assert_eq!(mean_after_warmup(&[]), None);
  }

  #[test]
  fn continuous_processes_all_frames_or_stops_at_limit() {
    let output = Collect::default();
    let counter = Cell::new(0);
    let input = (0..10u32).inspect(|_| counter.set(counter.get() + 1));
    ContinuousTask::default()
      .with_frame_number(Some(4))
      .run_task(input, Doubler, &output)
      .unwrap();
    assert_eq!(output.seen.borrow().len(), 4);
    assert_eq!(counter.get(), 4);

    let output = Collect::default();
    ContinuousTask::default()
      .run_task(0..35u32, Doubler, &output)
      .unwrap();
    assert_eq!(output.seen.borrow().len(), 35);
    assert_eq!(output.seen.borrow()[34], (34, 68));
  }

  #[test]
  fn continuous_reports_fps_every_thirty_frames() {
    let output = Collect::default();
    ContinuousTask::default()
      .run_task(0..65u32, Doubler, &output)
      .unwrap();
    // 第 30、60 帧渲染之前更新
    assert_eq!(*output.fps_updates.borrow(), vec![29, 59]);

    let output = Collect::default();
    OneShotTask.run_task(0..65u32, Doubler, &output).unwrap();
    assert!(output.fps_updates.borrow().is_empty());
  }
}
