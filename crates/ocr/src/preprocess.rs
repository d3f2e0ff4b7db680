//! 图像预处理
//!
//! 检测与识别模型各自需要的输入格式转换。

use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{Array3, Array4};

/// 检测模型输入的最长边限制
pub const DET_MAX_SIDE: u32 = 960;
/// 检测模型输入的最短边下限
pub const DET_MIN_SIDE: u32 = 32;

/// 识别模型的固定输入高度与宽度
pub const REC_HEIGHT: u32 = 48;
pub const REC_WIDTH: u32 = 320;

/// 裁剪文字区域时的边距比例
const CROP_PAD_RATIO: f32 = 0.04;

// PaddleOCR 标准归一化: (x/255 - 0.5) / 0.5，通道为 BGR
const MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const STD: [f32; 3] = [0.5, 0.5, 0.5];

/// 为检测模型准备输入
///
/// 缩放到最长边不超过 [`DET_MAX_SIDE`]、最短边不低于 [`DET_MIN_SIDE`]，
/// 且两边均为 32 的倍数，然后归一化为 NCHW 批次。
/// 返回 (批次, 输入宽, 输入高)。
pub fn prepare_det_input(img: &DynamicImage) -> (Array4<f32>, u32, u32) {
    let rgb = img.to_rgb8();
    let (orig_w, orig_h) = (rgb.width(), rgb.height());

    let ratio = det_scale_ratio(orig_w, orig_h);
    let new_w = ((orig_w as f32 * ratio) as u32 / 32 * 32).max(DET_MIN_SIDE);
    let new_h = ((orig_h as f32 * ratio) as u32 / 32 * 32).max(DET_MIN_SIDE);

    let resized = image::imageops::resize(&rgb, new_w, new_h, image::imageops::FilterType::Lanczos3);
    let batch = to_chw_tensor(&resized).insert_axis(ndarray::Axis(0));

    (batch, new_w, new_h)
}

fn det_scale_ratio(w: u32, h: u32) -> f32 {
    let long_side = w.max(h) as f32;
    let short_side = w.min(h) as f32;

    let mut ratio = 1.0f32;
    if long_side > DET_MAX_SIDE as f32 {
        ratio = DET_MAX_SIDE as f32 / long_side;
    }
    if short_side * ratio < DET_MIN_SIDE as f32 {
        ratio = DET_MIN_SIDE as f32 / short_side;
    }
    ratio
}

/// 按四角点裁剪文字区域（带少量边距，钳制在图像内）
pub fn crop_quad(img: &DynamicImage, points: &[[f32; 2]; 4]) -> DynamicImage {
    let min_x = points.iter().map(|p| p[0]).fold(f32::INFINITY, f32::min).max(0.0) as i32;
    let min_y = points.iter().map(|p| p[1]).fold(f32::INFINITY, f32::min).max(0.0) as i32;
    let max_x = points.iter().map(|p| p[0]).fold(f32::NEG_INFINITY, f32::max) as i32;
    let max_y = points.iter().map(|p| p[1]).fold(f32::NEG_INFINITY, f32::max) as i32;

    let pad_x = ((max_x - min_x).max(1) as f32 * CROP_PAD_RATIO).round() as i32;
    let pad_y = ((max_y - min_y).max(1) as f32 * CROP_PAD_RATIO).round() as i32;

    let img_w = img.width() as i32;
    let img_h = img.height() as i32;

    let x0 = (min_x - pad_x).max(0);
    let y0 = (min_y - pad_y).max(0);
    let x1 = (max_x + pad_x).min(img_w.saturating_sub(1)).max(x0);
    let y1 = (max_y + pad_y).min(img_h.saturating_sub(1)).max(y0);

    img.crop_imm(x0 as u32, y0 as u32, (x1 - x0).max(1) as u32, (y1 - y0).max(1) as u32)
}

/// 批量准备识别输入
///
/// 每张裁剪图缩放到固定高度、按比例限宽，不足处用灰色填充，
/// 然后按 `batch_size` 切分为若干 NCHW 批次。
pub fn prepare_rec_batches(crops: &[DynamicImage], batch_size: usize) -> Vec<Array4<f32>> {
    let mut batches = Vec::new();

    for chunk in crops.chunks(batch_size.max(1)) {
        let mut batch = Array4::<f32>::zeros((
            chunk.len(),
            3,
            REC_HEIGHT as usize,
            REC_WIDTH as usize,
        ));

        for (i, crop) in chunk.iter().enumerate() {
            let rgb = crop.to_rgb8();
            let (w, h) = (rgb.width().max(1), rgb.height().max(1));

            let ratio = REC_HEIGHT as f32 / h as f32;
            let new_w = ((w as f32 * ratio) as u32).clamp(1, REC_WIDTH);

            let resized =
                image::imageops::resize(&rgb, new_w, REC_HEIGHT, image::imageops::FilterType::Lanczos3);

            let mut padded: RgbImage =
                ImageBuffer::from_pixel(REC_WIDTH, REC_HEIGHT, Rgb([127, 127, 127]));
            image::imageops::overlay(&mut padded, &resized, 0, 0);

            batch
                .slice_mut(ndarray::s![i, .., .., ..])
                .assign(&to_chw_tensor(&padded));
        }

        batches.push(batch);
    }

    batches
}

/// RGB 图像转 CHW tensor，通道按 BGR 排列并做均值方差归一化
fn to_chw_tensor(img: &RgbImage) -> Array3<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut tensor = Array3::<f32>::zeros((3, h, w));

    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, y, x]] = (pixel[2] as f32 / 255.0 - MEAN[0]) / STD[0];
        tensor[[1, y, x]] = (pixel[1] as f32 / 255.0 - MEAN[1]) / STD[1];
        tensor[[2, y, x]] = (pixel[0] as f32 / 255.0 - MEAN[2]) / STD[2];
    }

    tensor
}
