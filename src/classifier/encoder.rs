//! # 张量编码模块
//!
//! ## 设计思路
//!
//! 把已缩放到模型尺寸的像素缓冲转换为模型输入张量的数值布局。
//! 纯函数：不修改输入缓冲。
//!
//! ## 实现思路
//!
//! 1. 通道转换：多通道 → 单通道按亮度加权 `R*0.30 + G*0.59 + B*0.11`；
//!    四通道 → 三通道直接剥离 alpha（统一为 RGB 顺序）；单通道 → 三通道复制灰度值。
//! 2. 数值策略：量化模型输出 u8 原值；否则输出 f32，`normalized` 时除以 255.0。
//! 3. 布局：行优先，多通道时按像素交错。

use super::adapter::try_alloc_bytes;
use super::config::ModelInputDescriptor;
use super::source::ImageBuffer;
use super::ClassifierError;

const LUMA_WEIGHTS: [f32; 3] = [0.30, 0.59, 0.11];

/// 张量样本存储。
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Float32(Vec<f32>),
    Uint8(Vec<u8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(values) => values.len(),
            Self::Uint8(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float32(_) => "float32",
            Self::Uint8(_) => "uint8",
        }
    }
}

/// 模型输入张量：形状 `[1, height, width, channels]` 与扁平样本。
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: TensorData,
}

impl InputTensor {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 以文本网格渲染第一个通道，用于调试查看模型实际“看到”的数字。
    pub fn render_ascii(&self) -> String {
        let [_, height, width, channels] = self.shape;
        let mut out = String::with_capacity(height * (width * 4 + 1));
        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) * channels;
                let level = match &self.data {
                    TensorData::Uint8(values) => values.get(index).map(|&v| v as f32 / 255.0),
                    TensorData::Float32(values) => values.get(index).map(|&v| if v > 1.0 { v / 255.0 } else { v }),
                };
                out.push(match level.unwrap_or(0.0) {
                    v if v >= 0.75 => '#',
                    v if v >= 0.5 => '+',
                    v if v >= 0.25 => '.',
                    _ => ' ',
                });
            }
            out.push('\n');
        }
        out
    }
}

/// 将缓冲编码为模型输入张量。
///
/// # 示例
/// ```rust
/// use digit_classifier::classifier::{encode, ImageBuffer, ModelInputDescriptor, PixelFormat, TensorData};
///
/// let descriptor = ModelInputDescriptor { width: 2, height: 1, ..ModelInputDescriptor::default() };
/// let buffer = ImageBuffer::new(2, 1, PixelFormat::Gray8, vec![0, 255])?;
/// let tensor = encode(&buffer, &descriptor)?;
/// assert_eq!(tensor.data, TensorData::Float32(vec![0.0, 1.0]));
/// # Ok::<(), digit_classifier::classifier::ClassifierError>(())
/// ```
pub fn encode(buffer: &ImageBuffer, descriptor: &ModelInputDescriptor) -> Result<InputTensor, ClassifierError> {
    if buffer.width() != descriptor.width || buffer.height() != descriptor.height {
        return Err(ClassifierError::ShapeMismatch(format!(
            "缓冲尺寸 {}x{} 与模型输入 {}x{} 不一致",
            buffer.width(),
            buffer.height(),
            descriptor.width,
            descriptor.height
        )));
    }

    let samples = reduce_channels(buffer, descriptor.channels)?;

    let data = if descriptor.quantized {
        TensorData::Uint8(samples)
    } else {
        let mut values = Vec::new();
        values
            .try_reserve_exact(samples.len())
            .map_err(|e| ClassifierError::Allocation(format!("无法分配 float32 张量：{}", e)))?;
        if descriptor.normalized {
            values.extend(samples.iter().map(|&v| v as f32 / 255.0));
        } else {
            values.extend(samples.iter().map(|&v| v as f32));
        }
        TensorData::Float32(values)
    };

    Ok(InputTensor {
        shape: descriptor.input_shape(),
        data,
    })
}

/// 通道转换，输出行优先、像素交错的字节序列。
fn reduce_channels(buffer: &ImageBuffer, target_channels: u32) -> Result<Vec<u8>, ClassifierError> {
    let format = buffer.format();
    let source_channels = format.channels();
    let target = target_channels as usize;

    if !matches!(target, 1 | 3) {
        return Err(ClassifierError::UnsupportedFormat(format!(
            "模型输入通道数只支持 1 或 3，当前：{}",
            target
        )));
    }

    let pixels = buffer.width() as usize * buffer.height() as usize;
    let len = pixels
        .checked_mul(target)
        .ok_or_else(|| ClassifierError::Allocation("张量长度溢出".to_string()))?;
    let mut out = try_alloc_bytes(len)?;
    let mut cursor = 0;

    for y in 0..buffer.height() {
        let row = buffer.row(y);
        for pixel in row.chunks_exact(source_channels) {
            match (format.rgb_offsets(), target) {
                (None, 1) => out[cursor] = pixel[0],
                (None, _) => out[cursor..cursor + 3].fill(pixel[0]),
                (Some([r, g, b]), 1) => out[cursor] = luminance(pixel[r], pixel[g], pixel[b]),
                (Some([r, g, b]), _) => {
                    out[cursor] = pixel[r];
                    out[cursor + 1] = pixel[g];
                    out[cursor + 2] = pixel[b];
                }
            }
            cursor += target;
        }
    }

    Ok(out)
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let value = r as f32 * LUMA_WEIGHTS[0] + g as f32 * LUMA_WEIGHTS[1] + b as f32 * LUMA_WEIGHTS[2];
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::source::PixelFormat;

    fn descriptor(width: u32, height: u32, channels: u32, normalized: bool, quantized: bool) -> ModelInputDescriptor {
        ModelInputDescriptor {
            width,
            height,
            channels,
            normalized,
            quantized,
        }
    }

    #[test]
    fn quantized_gray_is_byte_copy() {
        let data: Vec<u8> = (0..=255).cycle().take(28 * 28).collect();
        let buffer = ImageBuffer::new(28, 28, PixelFormat::Gray8, data.clone()).expect("buffer");
        let tensor = encode(&buffer, &descriptor(28, 28, 1, true, true)).expect("encode");
        assert_eq!(tensor.shape, [1, 28, 28, 1]);
        assert_eq!(tensor.data, TensorData::Uint8(data));
    }

    #[test]
    fn normalized_gray_is_divided_once() {
        let buffer = ImageBuffer::new(3, 1, PixelFormat::Gray8, vec![0, 51, 255]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(3, 1, 1, true, false)).expect("encode");
        assert_eq!(tensor.data, TensorData::Float32(vec![0.0, 51.0 / 255.0, 1.0]));
    }

    #[test]
    fn unnormalized_float_keeps_magnitude() {
        let buffer = ImageBuffer::new(2, 1, PixelFormat::Gray8, vec![7, 255]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(2, 1, 1, false, false)).expect("encode");
        assert_eq!(tensor.data, TensorData::Float32(vec![7.0, 255.0]));
    }

    #[test]
    fn bgra_reduces_with_luminance_weights() {
        // B=0, G=0, R=255 → 255 * 0.30 = 76.5 → 77
        let buffer = ImageBuffer::new(1, 1, PixelFormat::Bgra8, vec![0, 0, 255, 255]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(1, 1, 1, false, true)).expect("encode");
        assert_eq!(tensor.data, TensorData::Uint8(vec![77]));
    }

    #[test]
    fn argb_strips_alpha_into_rgb_order() {
        let buffer = ImageBuffer::new(1, 1, PixelFormat::Argb8, vec![9, 10, 20, 30]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(1, 1, 3, false, true)).expect("encode");
        assert_eq!(tensor.shape, [1, 1, 1, 3]);
        assert_eq!(tensor.data, TensorData::Uint8(vec![10, 20, 30]));
    }

    #[test]
    fn bgra_strips_alpha_into_rgb_order() {
        let buffer = ImageBuffer::new(2, 1, PixelFormat::Bgra8, vec![1, 2, 3, 255, 4, 5, 6, 255]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(2, 1, 3, false, true)).expect("encode");
        assert_eq!(tensor.data, TensorData::Uint8(vec![3, 2, 1, 6, 5, 4]));
    }

    #[test]
    fn gray_expands_to_three_channels() {
        let buffer = ImageBuffer::new(2, 1, PixelFormat::Gray8, vec![5, 250]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(2, 1, 3, false, true)).expect("encode");
        assert_eq!(tensor.data, TensorData::Uint8(vec![5, 5, 5, 250, 250, 250]));
    }

    #[test]
    fn white_rgb_stays_white() {
        let buffer = ImageBuffer::new(1, 1, PixelFormat::Rgb8, vec![255, 255, 255]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(1, 1, 1, true, false)).expect("encode");
        assert_eq!(tensor.data, TensorData::Float32(vec![1.0]));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let buffer = ImageBuffer::new(27, 28, PixelFormat::Gray8, vec![0; 27 * 28]).expect("buffer");
        let result = encode(&buffer, &ModelInputDescriptor::default());
        assert!(matches!(result, Err(ClassifierError::ShapeMismatch(_))));
    }

    #[test]
    fn unsupported_channel_count_is_rejected() {
        let buffer = ImageBuffer::new(1, 1, PixelFormat::Rgba8, vec![0; 4]).expect("buffer");
        let result = encode(&buffer, &descriptor(1, 1, 4, false, true));
        assert!(matches!(result, Err(ClassifierError::UnsupportedFormat(_))));
    }

    #[test]
    fn padded_rows_are_not_encoded() {
        let buffer = ImageBuffer::with_row_bytes(2, 2, PixelFormat::Gray8, 4, vec![1, 2, 99, 99, 3, 4, 99, 99])
            .expect("buffer");
        let tensor = encode(&buffer, &descriptor(2, 2, 1, false, true)).expect("encode");
        assert_eq!(tensor.data, TensorData::Uint8(vec![1, 2, 3, 4]));
    }

    #[test]
    fn ascii_preview_marks_strokes() {
        let buffer = ImageBuffer::new(3, 2, PixelFormat::Gray8, vec![0, 255, 0, 0, 128, 0]).expect("buffer");
        let tensor = encode(&buffer, &descriptor(3, 2, 1, true, false)).expect("encode");
        assert_eq!(tensor.render_ascii(), " # \n + \n");
    }
}
