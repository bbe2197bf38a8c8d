//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `DigitClassifier` 只负责流程编排与配置管理，推理运行时通过 `InferenceBackend` 注入。
//! 同一条流水线服务所有后端（ONNX、远端、测试桩），不再为每种模型复制一份分类器。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 把输入变体归一化为 `ImageBuffer`
//! 3. 裁剪 + 缩放到模型尺寸
//! 4. 编码为输入张量
//! 5. 推理
//! 6. arg-max 解码，保留原始输出张量
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ClassifierConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 每次请求开始即清空上一次保留的输出；只有成功的请求才会写入新输出。
//! - 记录 `prepare/encode/infer/decode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use super::adapter::crop_and_resize;
use super::decoder::{decode_outputs, ClassificationOutput};
use super::encoder::{encode, InputTensor};
use super::invoker::{InferenceBackend, ModelHandle, OutputTensor};
use super::loader;
use super::source::{ClassificationInput, CropArea, ImageBuffer, ImageSource, PostprocessOptions};
use super::{ClassifierConfig, ClassifierError, ResizeProfile};

/// 手写数字分类器。
///
/// 封装了配置状态、模型句柄与最近一次推理输出。
pub struct DigitClassifier<B> {
    config: Arc<RwLock<ClassifierConfig>>,
    model: Mutex<ModelHandle<B>>,
    last_output: Mutex<Option<Vec<OutputTensor>>>,
}

impl<B: InferenceBackend> DigitClassifier<B> {
    /// 基于已通过形状校验的模型句柄创建分类器。
    pub fn new(model: ModelHandle<B>, config: ClassifierConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        if model.descriptor() != &config.input {
            log::warn!(
                "⚠️ 配置中的模型输入 {:?} 与模型句柄 {:?} 不一致，以模型句柄为准",
                config.input,
                model.descriptor()
            );
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            model: Mutex::new(model),
            last_output: Mutex::new(None),
        })
    }

    /// 获取配置快照。
    pub fn config_snapshot(&self) -> Result<ClassifierConfig, ClassifierError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ClassifierError::Config("配置读取锁已中毒".to_string()))
    }

    /// 设置缩放档位。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use digit_classifier::classifier::{DigitClassifier, ResizeProfile};
    ///
    /// classifier.set_resize_profile(ResizeProfile::Quality)?;
    /// # Ok::<(), digit_classifier::classifier::ClassifierError>(())
    /// ```
    pub fn set_resize_profile(&self, profile: ResizeProfile) -> Result<(), ClassifierError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ClassifierError::Config("配置写入锁已中毒".to_string()))?;
        config.apply_resize_profile(profile);

        log::info!("⚙️ 已切换缩放档位：{:?}（filter={:?}）", profile, config.resize_filter);
        Ok(())
    }

    pub fn get_resize_profile(&self) -> Result<ResizeProfile, ClassifierError> {
        let config = self
            .config
            .read()
            .map_err(|_| ClassifierError::Config("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_resize_profile())
    }

    /// 按当前配置加载并解码图片。
    pub fn load_image(&self, source: ImageSource) -> Result<ImageBuffer, ClassifierError> {
        let config = self.config_snapshot()?;
        loader::load_image(source, &config)
    }

    /// 只执行裁剪缩放与编码，不做推理。
    pub fn preprocess(&self, buffer: &ImageBuffer, crop_area: CropArea) -> Result<InputTensor, ClassifierError> {
        let config = self.config_snapshot()?;
        let descriptor = *self.lock_model()?.descriptor();

        let crop = crop_area.resolve(buffer);
        let resized = crop_and_resize(buffer, crop, descriptor.width, descriptor.height, config.resize_filter)?;
        let tensor = encode(&resized, &descriptor)?;

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("🔍 模型输入预览：\n{}", tensor.render_ascii());
        }

        Ok(tensor)
    }

    /// 处理主入口：裁剪、编码、推理、解码。
    pub fn classify(&self, input: ClassificationInput) -> Result<ClassificationOutput, ClassifierError> {
        self.store_last_output(None)?;

        let config = self.config_snapshot()?;
        let total_start = Instant::now();
        let ClassificationInput {
            source,
            crop_area,
            postprocess,
        } = input;

        let prepare_start = Instant::now();
        let buffer = source.into_buffer()?;
        let mut model = self.lock_model()?;
        let descriptor = *model.descriptor();
        let crop = crop_area.resolve(&buffer);
        let resized = crop_and_resize(&buffer, crop, descriptor.width, descriptor.height, config.resize_filter)?;
        let prepare_ms = prepare_start.elapsed().as_millis();

        let encode_start = Instant::now();
        let tensor = encode(&resized, &descriptor)?;
        let encode_ms = encode_start.elapsed().as_millis();

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("🔍 模型输入预览：\n{}", tensor.render_ascii());
        }

        let infer_start = Instant::now();
        let outputs = model.run(&tensor)?;
        drop(model);
        let infer_ms = infer_start.elapsed().as_millis();

        let decode_start = Instant::now();
        let postprocess = postprocess.unwrap_or(PostprocessOptions {
            num_categories: config.num_categories,
        });
        let result = decode_outputs(outputs, &postprocess)?;
        let decode_ms = decode_start.elapsed().as_millis();

        self.store_last_output(Some(result.outputs.clone()))?;

        log::info!(
            "✅ 识别完成：{}（prepare={}ms, encode={}ms, infer={}ms, decode={}ms, total={}ms）",
            result.number,
            prepare_ms,
            encode_ms,
            infer_ms,
            decode_ms,
            total_start.elapsed().as_millis()
        );

        Ok(result)
    }

    /// 以新的后处理参数重新解码最近一次输出，不重新推理。
    ///
    /// 没有保留输出（尚未成功识别过，或上一次请求失败）时返回 `Ok(None)`。
    pub fn postprocess_last_output(
        &self,
        options: &PostprocessOptions,
    ) -> Result<Option<ClassificationOutput>, ClassifierError> {
        let last = self
            .last_output
            .lock()
            .map_err(|_| ClassifierError::Inference("输出缓存锁已中毒".to_string()))?
            .clone();

        match last {
            Some(outputs) => decode_outputs(outputs, options).map(Some),
            None => Ok(None),
        }
    }

    fn lock_model(&self) -> Result<std::sync::MutexGuard<'_, ModelHandle<B>>, ClassifierError> {
        self.model
            .lock()
            .map_err(|_| ClassifierError::Inference("模型锁已中毒".to_string()))
    }

    fn store_last_output(&self, outputs: Option<Vec<OutputTensor>>) -> Result<(), ClassifierError> {
        let mut slot = self
            .last_output
            .lock()
            .map_err(|_| ClassifierError::Inference("输出缓存锁已中毒".to_string()))?;
        *slot = outputs;
        Ok(())
    }
}
