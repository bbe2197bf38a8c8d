//! 结果解码：对输出向量做 arg-max。
//!
//! 不做 softmax，直接比较原始分数。运行最大值取自第一个有效元素而非固定哨兵 0，
//! 否则全负分数会被误判为下标 0。

use super::invoker::OutputTensor;
use super::source::PostprocessOptions;
use super::ClassifierError;

/// 分类结果：预测下标与保留的原始输出张量。
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutput {
    pub outputs: Vec<OutputTensor>,
    /// 0...num_categories-1
    pub number: usize,
}

/// 扫描前 `num_categories` 个分数，返回最大值下标。
///
/// 严格 `>` 比较，相等时先出现者胜出；NaN 永远不会被选中。
pub fn decode(output: &[f32], num_categories: usize) -> Result<usize, ClassifierError> {
    if num_categories == 0 {
        return Err(ClassifierError::ShapeMismatch("类别数不能为 0".to_string()));
    }
    if output.len() < num_categories {
        return Err(ClassifierError::ShapeMismatch(format!(
            "输出长度 {} 小于类别数 {}",
            output.len(),
            num_categories
        )));
    }

    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in output[..num_categories].iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, max)) if score <= max => {}
            _ => best = Some((index, score)),
        }
    }

    best.map(|(index, _)| index)
        .ok_or_else(|| ClassifierError::Inference("输出分数全部为 NaN".to_string()))
}

/// 以第一个输出张量构建分类结果。
pub(crate) fn decode_outputs(
    outputs: Vec<OutputTensor>,
    options: &PostprocessOptions,
) -> Result<ClassificationOutput, ClassifierError> {
    let first = outputs
        .first()
        .ok_or_else(|| ClassifierError::Inference("模型没有输出张量".to_string()))?;
    let number = decode(&first.values, options.num_categories)?;
    Ok(ClassificationOutput { outputs, number })
}
