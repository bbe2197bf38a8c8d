//! # 推理调用模块
//!
//! ## 设计思路
//!
//! 推理运行时本身是外部协作者，这里只定义接缝：
//! - `InferenceBackend`：任何“张量进、张量出”的实现（ONNX Runtime、远端服务、测试桩）
//! - `ModelHandle`：加载期校验模型声明的输入形状必须为 `[1, height, width, channels]`，
//!   不符即为致命错误；运行期拒绝与形状约定不符的输入张量
//!
//! 推理失败是瞬时错误，由调用方呈现为“预测失败”，这里不做重试。

use super::config::ModelInputDescriptor;
use super::encoder::{InputTensor, TensorData};
use super::ClassifierError;

/// 模型输出张量（float32 分数）。
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// 一维输出（`[len]`）。
    pub fn from_values(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }
}

/// 推理后端：单输入、一个或多个输出的同步前向计算。
pub trait InferenceBackend {
    /// 模型文件声明的输入形状；动态维度以 `-1` 表示。
    fn declared_input_shape(&self) -> Vec<i64>;

    /// 执行一次前向计算。
    fn run(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, ClassifierError>;
}

/// 通过形状校验的模型句柄。
pub struct ModelHandle<B> {
    backend: B,
    descriptor: ModelInputDescriptor,
}

impl<B: InferenceBackend> ModelHandle<B> {
    /// 校验后端声明的输入形状并创建句柄。
    ///
    /// 批次维允许声明为动态（`-1`），其余维度必须完全一致。
    pub fn new(backend: B, descriptor: ModelInputDescriptor) -> Result<Self, ClassifierError> {
        let declared = backend.declared_input_shape();
        let expected = descriptor.input_shape();

        let matches = declared.len() == expected.len()
            && declared
                .iter()
                .zip(expected.iter())
                .enumerate()
                .all(|(axis, (&got, &want))| got == want as i64 || (axis == 0 && got == -1));

        if !matches {
            return Err(ClassifierError::ModelLoad(format!(
                "模型输入形状 {:?} != {:?}",
                declared, expected
            )));
        }

        log::info!("✅ 模型输入形状校验通过：{:?}", expected);
        Ok(Self { backend, descriptor })
    }

    pub fn descriptor(&self) -> &ModelInputDescriptor {
        &self.descriptor
    }

    /// 执行一次推理。
    pub fn run(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, ClassifierError> {
        let expected_shape = self.descriptor.input_shape();
        if input.shape != expected_shape {
            return Err(ClassifierError::Inference(format!(
                "输入张量形状 {:?} 与模型 {:?} 不一致",
                input.shape, expected_shape
            )));
        }

        let expected_len = self
            .descriptor
            .sample_count()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        if input.len() != expected_len {
            return Err(ClassifierError::Inference(format!(
                "输入张量长度 {} 与模型期望 {} 不一致",
                input.len(),
                expected_len
            )));
        }

        let type_matches = matches!(
            (&input.data, self.descriptor.quantized),
            (TensorData::Uint8(_), true) | (TensorData::Float32(_), false)
        );
        if !type_matches {
            return Err(ClassifierError::Inference(format!(
                "输入张量类型 {} 与模型量化设置（quantized={}）不一致",
                input.data.type_name(),
                self.descriptor.quantized
            )));
        }

        let outputs = self.backend.run(input)?;
        if outputs.is_empty() {
            return Err(ClassifierError::Inference("模型没有输出张量".to_string()));
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend {
        shape: Vec<i64>,
        calls: usize,
    }

    impl InferenceBackend for FixedBackend {
        fn declared_input_shape(&self) -> Vec<i64> {
            self.shape.clone()
        }

        fn run(&mut self, _input: &InputTensor) -> Result<Vec<OutputTensor>, ClassifierError> {
            self.calls += 1;
            Ok(vec![OutputTensor::from_values(vec![0.0; 10])])
        }
    }

    fn backend(shape: &[i64]) -> FixedBackend {
        FixedBackend {
            shape: shape.to_vec(),
            calls: 0,
        }
    }

    fn float_input(len: usize) -> InputTensor {
        InputTensor {
            shape: [1, 28, 28, 1],
            data: TensorData::Float32(vec![0.0; len]),
        }
    }

    #[test]
    fn matching_shape_loads() {
        let handle = ModelHandle::new(backend(&[1, 28, 28, 1]), ModelInputDescriptor::default());
        assert!(handle.is_ok());
    }

    #[test]
    fn dynamic_batch_is_accepted() {
        let handle = ModelHandle::new(backend(&[-1, 28, 28, 1]), ModelInputDescriptor::default());
        assert!(handle.is_ok());
    }

    #[test]
    fn mismatched_shape_is_fatal() {
        for shape in [&[1, 1, 28, 28][..], &[1, 28, 28, 3], &[1, 28, 28], &[1, -1, 28, 1]] {
            let err = ModelHandle::new(backend(shape), ModelInputDescriptor::default())
                .err()
                .expect("shape should be rejected");
            assert!(err.is_fatal(), "shape {:?} should be fatal", shape);
        }
    }

    #[test]
    fn wrong_input_length_never_reaches_backend() {
        let mut handle = ModelHandle::new(backend(&[1, 28, 28, 1]), ModelInputDescriptor::default())
            .expect("handle");
        let result = handle.run(&float_input(100));
        assert!(matches!(result, Err(ClassifierError::Inference(_))));
        assert_eq!(handle.backend.calls, 0);

        handle.run(&float_input(784)).expect("valid input should run");
        assert_eq!(handle.backend.calls, 1);
    }

    #[test]
    fn wrong_numeric_type_is_rejected() {
        let mut handle = ModelHandle::new(backend(&[1, 28, 28, 1]), ModelInputDescriptor::default())
            .expect("handle");
        let input = InputTensor {
            shape: [1, 28, 28, 1],
            data: TensorData::Uint8(vec![0; 784]),
        };
        assert!(matches!(handle.run(&input), Err(ClassifierError::Inference(_))));
    }
}
