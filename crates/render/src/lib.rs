//! 遮盖渲染
//!
//! 在图片副本上用不透明黑色填充给定区域。输入图片从不被修改，
//! 重复渲染同一组区域是幂等的。

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

/// 待涂黑的像素矩形（调用方负责先裁剪到图像边界内）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// 涂黑给定区域，返回新图片
pub fn render(img: &DynamicImage, rects: &[MaskRect]) -> DynamicImage {
    let mut canvas: RgbaImage = img.to_rgba8();
    let black = Rgba([0u8, 0u8, 0u8, 255u8]);

    for r in rects {
        if r.width == 0 || r.height == 0 {
            continue;
        }
        draw_filled_rect_mut(&mut canvas, Rect::at(r.x, r.y).of_size(r.width, r.height), black);
        log::debug!("[Mask] 涂黑: ({}, {}) {}x{}", r.x, r.y, r.width, r.height);
    }

    DynamicImage::ImageRgba8(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn white_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, image::Rgb([255, 255, 255])))
    }

    #[test]
    fn test_input_is_untouched() {
        let img = white_image(20, 10);
        let rects = [MaskRect { x: 2, y: 2, width: 5, height: 5 }];
        let _ = render(&img, &rects);
        assert_eq!(img.to_rgb8().get_pixel(3, 3), &image::Rgb([255, 255, 255]));
    }

    #[test]
    fn test_region_painted_black() {
        let img = white_image(20, 10);
        let rects = [MaskRect { x: 2, y: 2, width: 5, height: 5 }];
        let out = render(&img, &rects).to_rgba8();
        assert_eq!(out.get_pixel(3, 3), &Rgba([0, 0, 0, 255]));
        // 区域外保持原样
        assert_eq!(out.get_pixel(10, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_render_is_idempotent() {
        let img = white_image(32, 16);
        let rects = [
            MaskRect { x: 1, y: 1, width: 8, height: 6 },
            MaskRect { x: 4, y: 3, width: 8, height: 6 },
        ];
        let once = render(&img, &rects);
        let twice = render(&once, &rects);
        assert!(once.to_rgba8().as_raw() == twice.to_rgba8().as_raw());
    }

    #[test]
    fn test_empty_rect_is_skipped() {
        let img = white_image(8, 8);
        let rects = [MaskRect { x: 3, y: 3, width: 0, height: 4 }];
        let out = render(&img, &rects);
        assert!(out.to_rgba8().as_raw() == img.to_rgba8().as_raw());
    }

    #[test]
    fn test_no_regions_returns_copy() {
        let img = white_image(8, 8);
        let out = render(&img, &[]);
        assert!(out.to_rgba8().as_raw() == img.to_rgba8().as_raw());
    }
}
