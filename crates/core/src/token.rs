//! Token 流与坐标归一化
//!
//! 引擎原生输出形状各异（四角点多边形 vs 扁平矩形），在这里统一
//! 折算成整数像素矩形。归一化不改变 token 顺序，多 token 聚合
//! 检测依赖引擎自身的阅读顺序。

use serde::{Deserialize, Serialize};
use uidmask_ocr::{RawBox, RawToken};
use uidmask_render::MaskRect;

/// 轴对齐像素矩形，(x1, y1) 左上、(x2, y2) 右下
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    /// 与另一矩形的并集外接框
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// 裁剪到 [0, w] × [0, h]，宽高保持非负
    pub fn clip(&self, img_w: u32, img_h: u32) -> Rect {
        let x1 = self.x1.clamp(0, img_w as i32);
        let y1 = self.y1.clamp(0, img_h as i32);
        Rect {
            x1,
            y1,
            x2: self.x2.clamp(x1, img_w as i32),
            y2: self.y2.clamp(y1, img_h as i32),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// 转换为渲染层矩形
    pub fn to_mask_rect(&self) -> MaskRect {
        MaskRect {
            x: self.x1,
            y: self.y1,
            width: self.width() as u32,
            height: self.height() as u32,
        }
    }
}

/// 归一化后的识别单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub rect: Rect,
    /// 置信度 0-100，引擎未提供时为 None（视为可信）
    pub confidence: Option<u8>,
}

/// 将引擎原始输出归一化为统一 Token 流
pub fn normalize(raw: Vec<RawToken>) -> Vec<Token> {
    raw.into_iter()
        .map(|t| Token {
            rect: rect_from_shape(&t.shape),
            text: t.text,
            confidence: t.confidence,
        })
        .collect()
}

fn rect_from_shape(shape: &RawBox) -> Rect {
    match shape {
        // 四角点：取左上与右下两角，截断为整数像素
        RawBox::Quad(points) => Rect::new(
            points[0][0] as i32,
            points[0][1] as i32,
            points[2][0] as i32,
            points[2][1] as i32,
        ),
        RawBox::Rect {
            left,
            top,
            width,
            height,
        } => Rect::new(
            *left as i32,
            *top as i32,
            (left + width) as i32,
            (top + height) as i32,
        ),
    }
}
