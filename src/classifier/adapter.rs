//! # 像素缓冲适配模块
//!
//! ## 设计思路
//!
//! 将任意格式、任意尺寸的平台像素缓冲裁剪并缩放到模型输入几何尺寸。
//! 源缓冲只读；输出是新分配的紧凑缓冲，像素格式与源一致（通道转换交给编码器）。
//!
//! ## 实现思路
//!
//! 1. 校验裁剪矩形完全落在源缓冲内，目标尺寸为正
//! 2. 整图裁剪且尺寸不变时直接复制
//! 3. 按行提取裁剪区域（跳过行填充）
//! 4. 使用 `fast_image_resize` 卷积缩放，失败时回退 `image::imageops::resize`
//!
//! 宽高比由调用方保证，不做 letterbox；比例不一致时输出被拉伸。

use fast_image_resize as fr;
use image::{Luma, Pixel, Rgb, Rgba};

use super::config::ResizeFilter;
use super::source::{CropRegion, ImageBuffer};
use super::ClassifierError;

/// 裁剪 `crop` 区域并缩放到 `target_width x target_height`。
///
/// # 示例
/// ```rust
/// use digit_classifier::classifier::{crop_and_resize, CropRegion, ImageBuffer, PixelFormat, ResizeFilter};
///
/// let buffer = ImageBuffer::new(56, 56, PixelFormat::Gray8, vec![255; 56 * 56])?;
/// let resized = crop_and_resize(&buffer, CropRegion::new(0, 0, 56, 56), 28, 28, ResizeFilter::Triangle)?;
/// assert_eq!((resized.width(), resized.height()), (28, 28));
/// # Ok::<(), digit_classifier::classifier::ClassifierError>(())
/// ```
pub fn crop_and_resize(
    buffer: &ImageBuffer,
    crop: CropRegion,
    target_width: u32,
    target_height: u32,
    filter: ResizeFilter,
) -> Result<ImageBuffer, ClassifierError> {
    validate_crop_region(buffer, &crop)?;
    if target_width == 0 || target_height == 0 {
        return Err(ClassifierError::Bounds(format!(
            "目标尺寸必须为正：{}x{}",
            target_width, target_height
        )));
    }

    let format = buffer.format();

    if crop == buffer.full_region() && target_width == buffer.width() && target_height == buffer.height() {
        log::debug!("裁剪区域即整图且尺寸一致，直接复制 {}x{}", target_width, target_height);
        return ImageBuffer::new(target_width, target_height, format, buffer.to_packed_vec()?);
    }

    let cropped = extract_region(buffer, &crop)?;

    let resized = match resize_with_fast_image_resize(
        &cropped,
        crop.width,
        crop.height,
        format.channels(),
        target_width,
        target_height,
        filter,
    ) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::imageops::resize：{}", err);
            resize_with_image_crate(
                &cropped,
                crop.width,
                crop.height,
                format.channels(),
                target_width,
                target_height,
                filter,
            )?
        }
    };

    log::debug!(
        "裁剪缩放完成：({}, {}) {}x{} -> {}x{}（{:?}, filter={:?}）",
        crop.x,
        crop.y,
        crop.width,
        crop.height,
        target_width,
        target_height,
        format,
        filter
    );

    ImageBuffer::new(target_width, target_height, format, resized)
}

/// 校验裁剪矩形非空且完全落在源缓冲内。
pub(crate) fn validate_crop_region(buffer: &ImageBuffer, crop: &CropRegion) -> Result<(), ClassifierError> {
    if crop.width == 0 || crop.height == 0 {
        return Err(ClassifierError::Bounds(format!(
            "裁剪区域为空：{}x{}",
            crop.width, crop.height
        )));
    }

    let right = crop.x.checked_add(crop.width);
    let bottom = crop.y.checked_add(crop.height);
    let inside = matches!(right, Some(r) if r <= buffer.width())
        && matches!(bottom, Some(b) if b <= buffer.height());

    if !inside {
        return Err(ClassifierError::Bounds(format!(
            "裁剪区域 ({}, {}) {}x{} 超出缓冲 {}x{}",
            crop.x,
            crop.y,
            crop.width,
            crop.height,
            buffer.width(),
            buffer.height()
        )));
    }

    Ok(())
}

/// 申请指定长度的零初始化字节缓冲，内存不足时返回 `Allocation`。
pub(crate) fn try_alloc_bytes(len: usize) -> Result<Vec<u8>, ClassifierError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|e| ClassifierError::Allocation(format!("无法分配 {} 字节：{}", len, e)))?;
    bytes.resize(len, 0);
    Ok(bytes)
}

fn packed_len(width: u32, height: u32, channels: usize) -> Result<usize, ClassifierError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| ClassifierError::Allocation("缓冲尺寸导致内存溢出风险".to_string()))
}

/// 按行复制裁剪区域为紧凑字节。
fn extract_region(buffer: &ImageBuffer, crop: &CropRegion) -> Result<Vec<u8>, ClassifierError> {
    let channels = buffer.format().channels();
    let row_len = crop.width as usize * channels;
    let mut out = Vec::new();
    out.try_reserve_exact(packed_len(crop.width, crop.height, channels)?)
        .map_err(|e| ClassifierError::Allocation(format!("无法分配裁剪缓冲：{}", e)))?;

    let start = crop.x as usize * channels;
    for y in crop.y..crop.y + crop.height {
        out.extend_from_slice(&buffer.row(y)[start..start + row_len]);
    }

    Ok(out)
}

fn fast_pixel_type(channels: usize) -> Result<fr::PixelType, ClassifierError> {
    match channels {
        1 => Ok(fr::PixelType::U8),
        3 => Ok(fr::PixelType::U8x3),
        4 => Ok(fr::PixelType::U8x4),
        other => Err(ClassifierError::UnsupportedFormat(format!("{} 通道无法缩放", other))),
    }
}

fn resize_with_fast_image_resize(
    cropped: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    target_width: u32,
    target_height: u32,
    filter: ResizeFilter,
) -> Result<Vec<u8>, ClassifierError> {
    let pixel_type = fast_pixel_type(channels)?;

    let src_image = fr::images::ImageRef::new(width, height, cropped, pixel_type)
        .map_err(|e| ClassifierError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let dst_bytes = try_alloc_bytes(packed_len(target_width, target_height, channels)?)?;
    let mut dst_image = fr::images::Image::from_vec_u8(target_width, target_height, dst_bytes, pixel_type)
        .map_err(|e| ClassifierError::Decode(format!("构建目标图像缓冲失败：{}", e)))?;

    // 四通道格式的 alpha 位置不固定（BGRA / ARGB），按独立通道处理
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(filter.to_fast_filter()))
        .use_alpha(false);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ClassifierError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    Ok(dst_image.into_vec())
}

fn resize_with_image_crate(
    cropped: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    target_width: u32,
    target_height: u32,
    filter: ResizeFilter,
) -> Result<Vec<u8>, ClassifierError> {
    match channels {
        1 => resize_raw::<Luma<u8>>(cropped, width, height, target_width, target_height, filter),
        3 => resize_raw::<Rgb<u8>>(cropped, width, height, target_width, target_height, filter),
        4 => resize_raw::<Rgba<u8>>(cropped, width, height, target_width, target_height, filter),
        other => Err(ClassifierError::UnsupportedFormat(format!("{} 通道无法缩放", other))),
    }
}

fn resize_raw<P>(
    cropped: &[u8],
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
    filter: ResizeFilter,
) -> Result<Vec<u8>, ClassifierError>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let src = image::ImageBuffer::<P, Vec<u8>>::from_raw(width, height, cropped.to_vec())
        .ok_or_else(|| ClassifierError::Decode("裁剪缓冲长度异常".to_string()))?;

    Ok(image::imageops::resize(&src, target_width, target_height, filter.to_image_filter()).into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::source::PixelFormat;

    fn gradient(width: u32, height: u32, format: PixelFormat) -> ImageBuffer {
        let channels = format.channels();
        let mut data = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data.push(((x * 7 + y * 3 + c as u32 * 11) % 256) as u8);
                }
            }
        }
        ImageBuffer::new(width, height, format, data).expect("gradient buffer")
    }

    #[test]
    fn full_crop_same_size_round_trips() {
        let buffer = gradient(40, 30, PixelFormat::Bgra8);
        let out = crop_and_resize(&buffer, buffer.full_region(), 40, 30, ResizeFilter::Triangle)
            .expect("identity resize");
        assert_eq!(out, buffer);
    }

    #[test]
    fn crop_outside_bounds_fails() {
        let buffer = gradient(28, 28, PixelFormat::Gray8);
        let result = crop_and_resize(&buffer, CropRegion::new(10, 10, 20, 10), 28, 28, ResizeFilter::Triangle);
        assert!(matches!(result, Err(ClassifierError::Bounds(_))));
    }

    #[test]
    fn crop_with_overflowing_origin_fails() {
        let buffer = gradient(28, 28, PixelFormat::Gray8);
        let result = crop_and_resize(&buffer, CropRegion::new(u32::MAX, 0, 2, 2), 28, 28, ResizeFilter::Triangle);
        assert!(matches!(result, Err(ClassifierError::Bounds(_))));
    }

    #[test]
    fn empty_crop_and_zero_target_fail() {
        let buffer = gradient(28, 28, PixelFormat::Rgb8);
        assert!(matches!(
            crop_and_resize(&buffer, CropRegion::new(0, 0, 0, 10), 28, 28, ResizeFilter::Triangle),
            Err(ClassifierError::Bounds(_))
        ));
        assert!(matches!(
            crop_and_resize(&buffer, buffer.full_region(), 0, 28, ResizeFilter::Triangle),
            Err(ClassifierError::Bounds(_))
        ));
    }

    #[test]
    fn uniform_image_stays_uniform_after_downscale() {
        let buffer = ImageBuffer::new(280, 280, PixelFormat::Gray8, vec![173; 280 * 280]).expect("buffer");
        let out = crop_and_resize(&buffer, buffer.full_region(), 28, 28, ResizeFilter::Triangle).expect("resize");
        assert_eq!(out.width(), 28);
        assert_eq!(out.height(), 28);
        assert!(out.to_packed_vec().expect("packed").iter().all(|&v| v.abs_diff(173) <= 1));
    }

    #[test]
    fn crop_selects_only_the_region() {
        // 左半黑、右半白；只裁右半部分，结果应全白
        let mut data = vec![0u8; 56 * 28];
        for y in 0..28 {
            for x in 28..56 {
                data[y * 56 + x] = 255;
            }
        }
        let buffer = ImageBuffer::new(56, 28, PixelFormat::Gray8, data).expect("buffer");
        let out = crop_and_resize(&buffer, CropRegion::new(28, 0, 28, 28), 14, 14, ResizeFilter::Triangle)
            .expect("resize");
        assert!(out.to_packed_vec().expect("packed").iter().all(|&v| v >= 254));
    }

    #[test]
    fn padded_source_matches_packed_source() {
        let packed = gradient(20, 20, PixelFormat::Rgb8);
        let mut padded = Vec::new();
        for y in 0..20 {
            padded.extend_from_slice(packed.row(y));
            padded.extend_from_slice(&[9, 9, 9, 9]);
        }
        let padded = ImageBuffer::with_row_bytes(20, 20, PixelFormat::Rgb8, 64, padded).expect("padded");

        let crop = CropRegion::new(2, 3, 12, 12);
        let a = crop_and_resize(&packed, crop, 6, 6, ResizeFilter::CatmullRom).expect("packed resize");
        let b = crop_and_resize(&padded, crop, 6, 6, ResizeFilter::CatmullRom).expect("padded resize");
        assert_eq!(a.to_packed_vec().expect("packed"), b.to_packed_vec().expect("packed"));
    }

    #[test]
    fn identity_copy_drops_row_padding() {
        let data = vec![10, 20, 30, 77, 40, 50, 60, 77];
        let padded = ImageBuffer::with_row_bytes(3, 2, PixelFormat::Gray8, 4, data).expect("padded");
        let out = crop_and_resize(&padded, padded.full_region(), 3, 2, ResizeFilter::Triangle).expect("copy");
        assert!(out.is_packed());
        assert_eq!(out.to_packed_vec().expect("packed"), vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn image_crate_fallback_produces_target_geometry() {
        let buffer = gradient(30, 30, PixelFormat::Argb8);
        let cropped = buffer.to_packed_vec().expect("packed");
        let out = resize_with_image_crate(&cropped, 30, 30, 4, 10, 10, ResizeFilter::Lanczos3).expect("fallback");
        assert_eq!(out.len(), 10 * 10 * 4);
    }
}
