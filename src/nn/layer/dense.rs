/*
 * @Author       : 老董
 * @Date         : 2026-01-28
 * @Description  : Dense (全连接) 层
 *
 * 输入/输出形状：
 * - 输入：[batch_size, in_features]
 * - 输出：[batch_size, units]
 *
 * 计算：output = activation(x @ kernel + bias)
 * 变量：`{层名}_dense_kernel` [in_features, units]，`{层名}_dense_bias` [units]
 */

use serde::{Deserialize, Serialize};

use super::{LayerOps, LayerTrace, rank_error, single};
use crate::nn::graph::{Gradients, Graph, VariableId};
use crate::nn::init::{Init, Regularizer};
use crate::nn::{Activation, NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

const KERNEL: &str = "dense_kernel";
const BIAS: &str = "dense_bias";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    units: usize,
    activation: Activation,
    kernel_initializer: Init,
    bias_initializer: Init,
    kernel_regularizer: Option<Regularizer>,
    bias_regularizer: Option<Regularizer>,
    use_bias: bool,
}

impl Dense {
    /// 默认：线性激活，GlorotUniform核，零偏置
    pub fn new(units: usize) -> Self {
        Self {
            units,
            activation: Activation::Linear,
            kernel_initializer: Init::GlorotUniform,
            bias_initializer: Init::Zeros,
            kernel_regularizer: None,
            bias_regularizer: None,
            use_bias: true,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_kernel_initializer(mut self, init: Init) -> Self {
        self.kernel_initializer = init;
        self
    }

    pub fn with_bias_initializer(mut self, init: Init) -> Self {
        self.bias_initializer = init;
        self
    }

    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = Some(regularizer);
        self
    }

    pub fn with_bias_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.bias_regularizer = Some(regularizer);
        self
    }

    pub fn without_bias(mut self) -> Self {
        self.use_bias = false;
        self
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl LayerOps for Dense {
    fn type_name(&self) -> &'static str {
        "Dense"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(self.type_name(), inputs)?;
        if input.rank() != 2 {
            return Err(rank_error(self.type_name(), 2, input));
        }
        if self.units == 0 {
            return Err(NnError::Configuration(
                "Dense层的units必须大于0".to_string(),
            ));
        }
        Ok(input.with_dim(1, Some(self.units)))
    }

    fn allocate_variables(
        &self,
        graph: &mut Graph,
        layer: &str,
        inputs: &[ShapeSpec],
        trainable: bool,
    ) -> NnResult<Vec<VariableId>> {
        let input = single(self.type_name(), inputs)?;
        let in_features = input.num_elements_per_sample();
        let mut ids = vec![graph.add_layer_variable(
            layer,
            KERNEL,
            &[in_features, self.units],
            self.kernel_initializer.clone(),
            trainable,
            self.kernel_regularizer,
        )?];
        if self.use_bias {
            ids.push(graph.add_layer_variable(
                layer,
                BIAS,
                &[self.units],
                self.bias_initializer.clone(),
                trainable,
                self.bias_regularizer,
            )?);
        }
        Ok(ids)
    }

    fn forward(
        &self,
        layer: &str,
        graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        let kernel = graph.value(&VariableId::layer(layer, KERNEL))?;
        let mut z = x.mat_mul(kernel)?;
        if self.use_bias {
            z += graph.value(&VariableId::layer(layer, BIAS))?;
        }
        let mut trace = LayerTrace::new(self.activation.apply(&z));
        trace.pre_activation = Some(z);
        Ok(trace)
    }

    fn backward(
        &self,
        layer: &str,
        graph: &Graph,
        inputs: &[&Tensor],
        trace: &LayerTrace,
        grad: &Tensor,
        grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>> {
        let x = single(self.type_name(), inputs)?;
        let pre = trace.pre_activation.as_ref().unwrap_or(&trace.output);
        let dz = self.activation.backward(pre, &trace.output, grad)?;

        let kernel_id = VariableId::layer(layer, KERNEL);
        grads.accumulate(&kernel_id, x.transpose().mat_mul(&dz)?);
        if self.use_bias {
            grads.accumulate(
                &VariableId::layer(layer, BIAS),
                dz.sum_to_shape(&[self.units])?,
            );
        }
        let dx = dz.mat_mul(&graph.value(&kernel_id)?.transpose())?;
        Ok(vec![dx])
    }
}
