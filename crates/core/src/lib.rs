//! 身份号码定位与脱敏流水线
//!
//! 输入一张证件图片，输出涂黑了 12 位身份号码的副本：
//!
//! ```text
//! 字节 → 解码 → 引擎适配（主/回退） → token 归一化
//!      → 候选检测（两种策略） → 区域求解 → 遮盖渲染
//! ```
//!
//! 另有先知辅助路径：外部文字先知先给出号码内容，再回到 token
//! 流中找回像素位置，用于几何检测置信度不足的场景。
//!
//! 引擎与先知都以 trait 句柄注入，流水线自身不持有任何全局状态，
//! 一次调用内创建的 token / 命中 / 区域全部随调用结束丢弃。

pub mod adapter;
pub mod config;
pub mod detect;
pub mod pipeline;
pub mod resolve;
pub mod token;

pub use config::MaskConfig;
pub use detect::{detect, locate_value, IdentifierMatch, MatchKind};
pub use pipeline::{
    decode_image, mask_identifiers, mask_image_bytes, mask_with_oracle, MaskOutcome,
};
pub use resolve::{resolve, RedactionRegion};
pub use token::{normalize, Rect, Token};

/// 流水线错误
///
/// "未发现号码"不在此列，那是零区域的正常结果。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 字节流无法解码为图片
    #[error("无效的图片数据: {0}")]
    InvalidImage(String),

    /// 主引擎与回退引擎全部失败
    #[error("所有 OCR 引擎均失败: {0}")]
    OcrUnavailable(String),

    /// 先知确认号码存在，但在 token 流中找不到位置。
    /// 不得降级为"未发现号码"，调用方可能要换策略重试或转人工。
    #[error("号码已确认存在，但无法在图中定位")]
    LocalizationFailed,

    /// 先知调用失败
    #[error("识别先知调用失败: {0}")]
    Oracle(#[from] uidmask_oracle::OracleError),
}
