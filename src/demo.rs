//! 合成演示场景 (Demo Scene)
//!
//! 没有真实模型时用来驱动流水线的检测器: 画面里有几类目标
//! - 行人: 匀速直线运动, 碰到边界反弹
//! - 徘徊者: 原地小幅抖动
//! - 异常者: 每帧随机改变方向
//! - 车辆: 水平穿过画面
//!
//! 随机数只来自构造时传入的 `StdRng`, 同一种子产生同样的检测序列。

use image::DynamicImage;
use rand::rngs::StdRng;
use rand::Rng;

use crate::detection::types::{BBox, Detection};
use crate::error::Result;
use crate::pipeline::detector::{non_max_suppression, Detector};

/// 每帧漏检概率
const MISS_RATE: f64 = 0.05;
/// 每帧产生重复框的概率 (交给NMS去除)
const DUPLICATE_RATE: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Motion {
    Linear,
    Loiter,
    Erratic,
}

#[derive(Clone, Debug)]
struct Actor {
    class_name: &'static str,
    motion: Motion,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    w: f32,
    h: f32,
}

/// 合成场景检测器
pub struct DemoScene {
    rng: StdRng,
    actors: Vec<Actor>,
    width: f32,
    height: f32,
    iou_threshold: f32,
    frame: u64,
}

impl DemoScene {
    pub fn new(mut rng: StdRng, width: u32, height: u32, iou_threshold: f32) -> Self {
        let (width, height) = (width.max(160) as f32, height.max(160) as f32);

        let mut actors = Vec::new();
        for _ in 0..3 {
            let speed = rng.gen_range(2.0..8.0f32);
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            actors.push(Actor {
                class_name: "person",
                motion: Motion::Linear,
                x: rng.gen_range(0.0..width - 40.0),
                y: rng.gen_range(0.0..height - 90.0),
                vx: speed * angle.cos(),
                vy: speed * angle.sin(),
                w: 40.0,
                h: 90.0,
            });
        }
        actors.push(Actor {
            class_name: "person",
            motion: Motion::Loiter,
            x: width * 0.5,
            y: height * 0.5,
            vx: 0.0,
            vy: 0.0,
            w: 40.0,
            h: 90.0,
        });
        actors.push(Actor {
            class_name: "person",
            motion: Motion::Erratic,
            x: width * 0.25,
            y: height * 0.25,
            vx: 0.0,
            vy: 0.0,
            w: 40.0,
            h: 90.0,
        });
        actors.push(Actor {
            class_name: "car",
            motion: Motion::Linear,
            x: 0.0,
            y: height * 0.7,
            vx: 12.0,
            vy: 0.0,
            w: 120.0,
            h: 60.0,
        });

        Self {
            rng,
            actors,
            width,
            height,
            iou_threshold,
            frame: 0,
        }
    }

    /// 推进一帧并产生本帧检测
    pub fn next_frame(&mut self) -> Vec<Detection> {
        let (width, height) = (self.width, self.height);
        let mut detections = Vec::with_capacity(self.actors.len() + 2);

        for actor in &mut self.actors {
            match actor.motion {
                Motion::Linear => {}
                Motion::Loiter => {
                    actor.vx = self.rng.gen_range(-1.0..1.0);
                    actor.vy = self.rng.gen_range(-1.0..1.0);
                }
                Motion::Erratic => {
                    let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
                    let speed = self.rng.gen_range(10.0..25.0f32);
                    actor.vx = speed * angle.cos();
                    actor.vy = speed * angle.sin();
                }
            }
            actor.step(width, height);

            if self.rng.gen_bool(MISS_RATE) {
                continue;
            }
            let bbox = BBox::new(actor.x, actor.y, actor.x + actor.w, actor.y + actor.h);
            let confidence = self.rng.gen_range(0.5..0.95f32);
            detections.push(Detection::new(bbox, actor.class_name, confidence));

            if self.rng.gen_bool(DUPLICATE_RATE) {
                let jitter = self.rng.gen_range(-2.0..2.0f32);
                detections.push(Detection::new(
                    bbox.shifted(jitter, jitter),
                    actor.class_name,
                    confidence * 0.9,
                ));
            }
        }

        non_max_suppression(&mut detections, self.iou_threshold);
        self.frame += 1;
        detections
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame
    }
}

impl Actor {
    /// 移动一步, 碰到画面边界时反向
    fn step(&mut self, width: f32, height: f32) {
        self.x += self.vx;
        self.y += self.vy;

        if self.x < 0.0 || self.x + self.w > width {
            self.vx = -self.vx;
            self.x = self.x.clamp(0.0, (width - self.w).max(0.0));
        }
        if self.y < 0.0 || self.y + self.h > height {
            self.vy = -self.vy;
            self.y = self.y.clamp(0.0, (height - self.h).max(0.0));
        }
    }
}

impl Detector for DemoScene {
    fn detect(&mut self, _frame: &DynamicImage) -> Result<Vec<Detection>> {
        Ok(self.next_frame())
    }

    fn name(&self) -> &str {
        "demo"
    }
}
