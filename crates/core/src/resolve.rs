//! 遮盖区域求解
//!
//! 把一次号码命中转换为最终的像素遮盖矩形：
//! - 单 token 命中：按比例截短右边缘。token 宽度往往大于号码的
//!   实际数字宽度（尾随非敏感字符、抗锯齿毛边），宁可少遮一点
//!   也不误遮相邻文字。
//! - 聚合命中：span 内 token 外接框的并集，不截短。
//!
//! 所有矩形在交给渲染层之前裁剪到图像边界内。

use serde::{Deserialize, Serialize};

use crate::config::MaskConfig;
use crate::detect::{IdentifierMatch, MatchKind};
use crate::token::{Rect, Token};

/// 最终遮盖区域
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionRegion {
    pub rect: Rect,
    pub kind: MatchKind,
}

/// 求解单次命中对应的遮盖区域
///
/// span 引用失效（不应发生）时返回 None，求解永不报错。
pub fn resolve(
    m: &IdentifierMatch,
    tokens: &[Token],
    config: &MaskConfig,
    img_w: u32,
    img_h: u32,
) -> Option<RedactionRegion> {
    let rect = match m.kind {
        MatchKind::WholeToken => {
            let token = tokens.get(*m.span.first()?)?;
            truncate_width(token.rect, config.truncation_ratio)
        }
        MatchKind::GroupRun | MatchKind::Oracle => span_union(&m.span, tokens)?,
    };

    Some(RedactionRegion {
        rect: rect.clip(img_w, img_h),
        kind: m.kind,
    })
}

/// 右边缘截短到 `x1 + floor(ratio * 宽度)`，高度与左上角不变
fn truncate_width(rect: Rect, ratio: f32) -> Rect {
    let masked_width = (ratio * rect.width() as f32).floor() as i32;
    Rect::new(rect.x1, rect.y1, rect.x1 + masked_width, rect.y2)
}

fn span_union(span: &[usize], tokens: &[Token]) -> Option<Rect> {
    let mut rect: Option<Rect> = None;
    for idx in span {
        let token = tokens.get(*idx)?;
        rect = Some(match rect {
            Some(r) => r.union(&token.rect),
            None => token.rect,
        });
    }
    rect
}
