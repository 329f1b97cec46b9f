use std::collections::HashMap;

use super::VariableId;
use crate::tensor::Tensor;

/// 反向传播过程中累积的变量梯度
#[derive(Debug, Default, Clone)]
pub struct Gradients {
    grads: HashMap<VariableId, Tensor>,
}

impl Gradients {
    pub fn new() -> Self {
        Self::default()
    }

    /// 累加梯度（同一变量被多次使用时梯度相加）
    pub fn accumulate(&mut self, id: &VariableId, grad: Tensor) {
        match self.grads.get_mut(id) {
            Some(existing) => *existing += &grad,
            None => {
                self.grads.insert(id.clone(), grad);
            }
        }
    }

    pub fn get(&self, id: &VariableId) -> Option<&Tensor> {
        self.grads.get(id)
    }

    /// 按`ids`的顺序取出梯度；未被触及的变量得到`shape_of`给出形状的零梯度
    pub fn ordered(
        &self,
        ids: &[VariableId],
        shape_of: impl Fn(&VariableId) -> Vec<usize>,
    ) -> Vec<Tensor> {
        ids.iter()
            .map(|id| {
                self.grads
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| Tensor::zeros(&shape_of(id)))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }
}
