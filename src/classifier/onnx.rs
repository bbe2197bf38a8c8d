//! ONNX Runtime 推理后端（feature = "onnx"）。

use std::path::Path;

use ort::session::{builder::SessionBuilder, Session};
use ort::value::Tensor;

use super::config::ModelInputDescriptor;
use super::encoder::{InputTensor, TensorData};
use super::invoker::{InferenceBackend, ModelHandle, OutputTensor};
use super::ClassifierError;

/// 基于 ONNX Runtime 会话的后端。
pub struct OnnxBackend {
    session: Session,
    input_shape: Vec<i64>,
    output_count: usize,
}

impl OnnxBackend {
    /// 从模型文件创建会话并读取输入声明。
    pub fn from_file(path: &Path, intra_threads: usize) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ModelLoad(format!("模型文件不存在：{}", path.display())));
        }

        // 全局环境只需初始化一次，重复初始化的返回值可忽略
        let _ = ort::init().with_name("digit-classifier").commit();

        let session = build_session(path, intra_threads)
            .map_err(|e| ClassifierError::ModelLoad(format!("无法创建推理会话：{}", e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| ClassifierError::ModelLoad("模型没有输入".to_string()))?;
        let input_shape: Vec<i64> = input
            .input_type
            .tensor_shape()
            .ok_or_else(|| ClassifierError::ModelLoad("模型输入不是张量".to_string()))?
            .iter()
            .copied()
            .collect();

        let output_count = session.outputs.len();
        if output_count == 0 {
            return Err(ClassifierError::ModelLoad("模型没有输出".to_string()));
        }

        log::info!(
            "📦 已加载模型：{}（输入 {:?}，输出 {} 个）",
            path.display(),
            input_shape,
            output_count
        );

        Ok(Self {
            session,
            input_shape,
            output_count,
        })
    }
}

fn build_session(path: &Path, intra_threads: usize) -> ort::Result<Session> {
    let session = SessionBuilder::new()?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)?;
    Ok(session)
}

impl InferenceBackend for OnnxBackend {
    fn declared_input_shape(&self) -> Vec<i64> {
        self.input_shape.clone()
    }

    fn run(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, ClassifierError> {
        let shape = input.shape.to_vec();
        let outputs = match &input.data {
            TensorData::Float32(values) => {
                let value = Tensor::from_array((shape, values.clone()))
                    .map_err(|e| ClassifierError::Inference(format!("构建输入张量失败：{}", e)))?;
                self.session.run(ort::inputs![value])
            }
            TensorData::Uint8(values) => {
                let value = Tensor::from_array((shape, values.clone()))
                    .map_err(|e| ClassifierError::Inference(format!("构建输入张量失败：{}", e)))?;
                self.session.run(ort::inputs![value])
            }
        }
        .map_err(|e| ClassifierError::Inference(format!("推理执行失败：{}", e)))?;

        let mut tensors = Vec::with_capacity(self.output_count);
        for index in 0..self.output_count {
            let (shape, values) = outputs[index]
                .try_extract_tensor::<f32>()
                .map_err(|e| ClassifierError::Inference(format!("读取输出张量失败：{}", e)))?;
            tensors.push(OutputTensor::new(
                shape.iter().map(|&dim| dim.max(0) as usize).collect(),
                values.to_vec(),
            ));
        }

        Ok(tensors)
    }
}

/// 加载模型文件并校验输入形状。
///
/// 形状不符为致命错误：预处理流水线围绕固定形状构建。
pub fn load_model(
    path: &Path,
    descriptor: ModelInputDescriptor,
    intra_threads: usize,
) -> Result<ModelHandle<OnnxBackend>, ClassifierError> {
    let backend = OnnxBackend::from_file(path, intra_threads)?;
    ModelHandle::new(backend, descriptor)
}
