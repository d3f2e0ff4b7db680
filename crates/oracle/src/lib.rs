//! 文字识别先知
//!
//! 先知只回答"图里印的号码是什么"，不提供任何坐标。几何定位
//! 仍由 OCR token 流完成。先知的返回值属于不可信输入，必须先
//! 通过 12 位号码格式校验才能进入流水线。

use base64::Engine as _;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("先知请求失败: {0}")]
    Request(String),

    #[error("先知响应格式异常: {0}")]
    Response(String),

    #[error("图片编码失败: {0}")]
    Encode(String),
}

/// 识别先知能力接口
///
/// 读不出号码（或返回值不符合格式）是正常结果 `Ok(None)`，
/// 网络/服务故障才是错误。
pub trait RecognitionOracle {
    fn recognize(&self, img: &DynamicImage) -> Result<Option<String>, OracleError>;
}

/// 校验先知返回值：去掉空白后必须恰为 12 位 ASCII 数字。
/// 通过校验时返回原始（可能带分组空格的）形式。
pub fn validate_identifier(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() == 12 && compact.chars().all(|c| c.is_ascii_digit()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// 视觉大模型先知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionOracleConfig {
    /// Chat Completions 端点
    pub endpoint: String,
    /// 模型名
    pub model: String,
    /// API Key
    pub api_key: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl VisionOracleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key: api_key.into(),
            timeout_secs: 30,
        }
    }
}

const PROMPT: &str = "Please extract the 12-digit number from this image. \
Return ONLY the number with spaces as it appears in the image, nothing else.";

/// 基于视觉大模型的先知实现
pub struct VisionOracle {
    config: VisionOracleConfig,
    client: reqwest::blocking::Client,
}

impl VisionOracle {
    pub fn new(config: VisionOracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;
        Ok(Self { config, client })
    }
}

impl RecognitionOracle for VisionOracle {
    fn recognize(&self, img: &DynamicImage) -> Result<Option<String>, OracleError> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": PROMPT },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{}", encode_jpeg(img)?) }
                    }
                ]
            }],
            "max_tokens": 64,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .map_err(|e| OracleError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Response(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| OracleError::Response(e.to_string()))?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OracleError::Response("响应缺少 content 字段".to_string()))?;

        match validate_identifier(content) {
            Some(value) => {
                log::info!("[Oracle] 先知读出号码（{} 字符）", value.len());
                Ok(Some(value))
            }
            None => {
                log::warn!("[Oracle] 返回值不符合 12 位号码格式，按未读出处理");
                Ok(None)
            }
        }
    }
}

/// 图片编码为 JPEG 字节后做 base64
fn encode_jpeg(img: &DynamicImage) -> Result<String, OracleError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut bytes = Cursor::new(Vec::new());
    rgb.write_to(&mut bytes, image::ImageFormat::Jpeg)
        .map_err(|e| OracleError::Encode(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes.into_inner()))
}
