//! # 手写数字识别：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  命令行 (clap)                            │
//! │                                                          │
//! │  preview ── classify (onnx) ── upload                    │
//! │       │  (AppError 统一错误 + 非零退出码)                │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            库 (Rust)                             │
//! │                                                          │
//! │  ┌─ error ────── AppError (应用级错误类型)                │
//! │  │                                                       │
//! │  ├─ settings ─── ClassifierConfig 的 JSON 读写            │
//! │  │                                                       │
//! │  └─ classifier   裁剪缩放·张量编码·推理·解码              │
//! │      ├─ loader       文件 / Base64 / 字节加载             │
//! │      ├─ upload       上传识别服务                         │
//! │      └─ onnx         ONNX Runtime 后端 (feature)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 应用级错误类型 `AppError`，命令行入口的返回类型 |
//! | [`classifier`] | 像素缓冲到预测数字的完整流水线，推理后端可插拔 |
//! | [`settings`] | 配置文件的读取（缺失或损坏时回退默认值）与保存 |

pub mod classifier;
pub mod error;
pub mod settings;
