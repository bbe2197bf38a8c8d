//! # 手写数字识别模块（classifier）
//!
//! ## 设计思路
//!
//! 该模块将“画布像素 → 裁剪缩放 → 张量编码 → 推理 → arg-max 解码”
//! 按职责拆分为多个子模块，推理运行时通过 `InferenceBackend` 注入，
//! 同一条流水线服务所有模型。
//!
//! - `handler`：编排整条处理流水线（`DigitClassifier`）
//! - `adapter`：裁剪 + 缩放到模型尺寸
//! - `encoder`：通道转换 + 数值策略，输出模型输入张量
//! - `invoker`：推理后端接缝 + 加载期形状校验
//! - `decoder`：arg-max 解码
//! - `loader`：文件 / Base64 / 内存字节的加载与校验
//! - `upload`：上传到识别服务
//! - `onnx`：ONNX Runtime 后端（feature = "onnx"）
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! ImageSource ──loader.rs──▶ ImageBuffer
//!                               │
//! ClassificationInput { VisionInput, CropArea, PostprocessOptions }
//!    ↓
//! handler.rs（配置快照 + 阶段耗时日志）
//!    ├─ adapter.rs（crop_and_resize）
//!    ├─ encoder.rs（encode）
//!    ├─ invoker.rs（ModelHandle::run → InferenceBackend）
//!    └─ decoder.rs（decode）
//!    ↓
//! ClassificationOutput { number, outputs }（输出张量保留以便重新解码）
//! ```
//!
//! 服务端识别不经过推理链路：`ImageBuffer ──upload.rs──▶ ServerPrediction`。

mod adapter;
mod config;
mod decoder;
mod encoder;
mod error;
mod handler;
mod invoker;
mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
mod source;
mod upload;

pub use adapter::crop_and_resize;
pub use config::{ClassifierConfig, ModelInputDescriptor, ResizeFilter, ResizeProfile};
pub use decoder::{decode, ClassificationOutput};
pub use encoder::{encode, InputTensor, TensorData};
pub use error::ClassifierError;
pub use handler::DigitClassifier;
pub use invoker::{InferenceBackend, ModelHandle, OutputTensor};
pub use loader::load_image;
#[cfg(feature = "onnx")]
pub use onnx::load_model;
pub use source::{
    ClassificationInput,
    CropArea,
    CropRegion,
    ImageBuffer,
    ImageSource,
    PixelFormat,
    PostprocessOptions,
    VisionInput,
};
pub use upload::{encode_jpeg, ServerPrediction, UploadClient};
