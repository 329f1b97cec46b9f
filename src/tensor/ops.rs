/*
 * @Author       : 老董
 * @Date         : 2023-08-17 17:24:24
 * @Description  : 张量的运算：
 *                 1. 四则运算（逐元素，支持NumPy风格广播，支持与纯数运算）；
 *                 2. 矩阵乘法、转置、重塑、拼接等形状相关运算；
 *                 3. 求和、逐元素映射等归约/变换运算。
 */

use crate::errors::{Operator, TensorError};
use crate::tensor::Tensor;
use ndarray::{Axis, Ix2, Slice, Zip};

/// 为`Tensor`批量实现二元运算符：
/// 张量与张量（含引用组合）、张量与f32、f32与张量
macro_rules! impl_binary_op {
    ($trait:ident, $op:tt, $operator:expr) => {
        paste::paste! {
            fn [<$trait:snake _within_tensors>](tensor_1: &Tensor, tensor_2: &Tensor) -> Tensor {
                assert!(
                    tensor_1.can_broadcast_with(tensor_2),
                    "{}",
                    TensorError::OperatorError {
                        operator: $operator,
                        tensor1_shape: tensor_1.shape().to_vec(),
                        tensor2_shape: tensor_2.shape().to_vec(),
                    }
                );
                Tensor {
                    data: &tensor_1.data $op &tensor_2.data,
                }
            }

            impl std::ops::$trait for Tensor {
                type Output = Tensor;
                fn [<$trait:snake>](self, other: Tensor) -> Tensor {
                    [<$trait:snake _within_tensors>](&self, &other)
                }
            }
            impl<'a> std::ops::$trait<&'a Tensor> for Tensor {
                type Output = Tensor;
                fn [<$trait:snake>](self, other: &'a Tensor) -> Tensor {
                    [<$trait:snake _within_tensors>](&self, other)
                }
            }
            impl std::ops::$trait<Tensor> for &Tensor {
                type Output = Tensor;
                fn [<$trait:snake>](self, other: Tensor) -> Tensor {
                    [<$trait:snake _within_tensors>](self, &other)
                }
            }
            impl<'b> std::ops::$trait<&'b Tensor> for &Tensor {
                type Output = Tensor;
                fn [<$trait:snake>](self, other: &'b Tensor) -> Tensor {
                    [<$trait:snake _within_tensors>](self, other)
                }
            }

            impl std::ops::$trait<f32> for Tensor {
                type Output = Tensor;
                fn [<$trait:snake>](self, scalar: f32) -> Tensor {
                    Tensor { data: self.data $op scalar }
                }
            }
            impl std::ops::$trait<f32> for &Tensor {
                type Output = Tensor;
                fn [<$trait:snake>](self, scalar: f32) -> Tensor {
                    Tensor { data: &self.data $op scalar }
                }
            }
            impl std::ops::$trait<Tensor> for f32 {
                type Output = Tensor;
                fn [<$trait:snake>](self, tensor: Tensor) -> Tensor {
                    Tensor { data: self $op &tensor.data }
                }
            }
            impl<'a> std::ops::$trait<&'a Tensor> for f32 {
                type Output = Tensor;
                fn [<$trait:snake>](self, tensor: &'a Tensor) -> Tensor {
                    Tensor { data: self $op &tensor.data }
                }
            }
        }
    };
}

/// 原地运算：右侧张量须能广播到左侧张量的形状
macro_rules! impl_assign_op {
    ($trait:ident, $op:tt) => {
        paste::paste! {
            impl<'a> std::ops::$trait<&'a Tensor> for Tensor {
                fn [<$trait:snake>](&mut self, other: &'a Tensor) {
                    self.data $op &other.data;
                }
            }
            impl std::ops::$trait<f32> for Tensor {
                fn [<$trait:snake>](&mut self, scalar: f32) {
                    self.data $op scalar;
                }
            }
        }
    };
}

impl_binary_op!(Add, +, Operator::Add);
impl_binary_op!(Sub, -, Operator::Sub);
impl_binary_op!(Mul, *, Operator::Mul);
impl_binary_op!(Div, /, Operator::Div);

impl_assign_op!(AddAssign, +=);
impl_assign_op!(SubAssign, -=);
impl_assign_op!(MulAssign, *=);
impl_assign_op!(DivAssign, /=);

impl std::ops::Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        Tensor {
            data: -&self.data,
        }
    }
}

impl std::ops::Neg for Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        Tensor { data: -self.data }
    }
}

// ========== 形状相关 ==========

impl Tensor {
    /// 矩阵乘法。只接受2阶张量，且前者列数须等于后者行数
    pub fn mat_mul(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        let error = || TensorError::OperatorError {
            operator: Operator::MatMul,
            tensor1_shape: self.shape().to_vec(),
            tensor2_shape: other.shape().to_vec(),
        };
        let lhs = self
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| error())?;
        let rhs = other
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| error())?;
        if lhs.ncols() != rhs.nrows() {
            return Err(error());
        }
        Ok(Tensor {
            data: lhs.dot(&rhs).into_dyn(),
        })
    }

    /// 二阶张量转置（更高阶时反转所有维度）
    pub fn transpose(&self) -> Tensor {
        Tensor {
            data: self.data.t().to_owned(),
        }
    }

    /// 按逻辑顺序重塑为新形状，元素个数须一致
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor, TensorError> {
        if shape.iter().product::<usize>() != self.size() {
            return Err(TensorError::ReshapeError {
                from: self.shape().to_vec(),
                to: shape.to_vec(),
            });
        }
        Tensor::try_new(&self.to_vec(), shape)
    }

    /// 沿第一维按下标取样本
    pub fn select_rows(&self, indices: &[usize]) -> Tensor {
        Tensor {
            data: self.data.select(Axis(0), indices),
        }
    }

    /// 沿第一维取[start, end)区间
    pub fn slice_rows(&self, start: usize, end: usize) -> Tensor {
        Tensor {
            data: self
                .data
                .slice_axis(Axis(0), Slice::from(start..end))
                .to_owned(),
        }
    }

    /// 沿`axis`拼接多个张量
    pub fn concat(tensors: &[&Tensor], axis: usize) -> Result<Tensor, TensorError> {
        let first = tensors.first().ok_or(TensorError::EmptyList)?;
        if axis >= first.dimension() {
            return Err(TensorError::AxisOutOfRange {
                axis,
                rank: first.dimension(),
            });
        }
        let views = tensors.iter().map(|t| t.data.view()).collect::<Vec<_>>();
        let data = ndarray::concatenate(Axis(axis), &views).map_err(|_| {
            TensorError::OperatorError {
                operator: Operator::Concat,
                tensor1_shape: first.shape().to_vec(),
                tensor2_shape: tensors
                    .iter()
                    .map(|t| t.shape().to_vec())
                    .find(|s| s != first.shape())
                    .unwrap_or_default(),
            }
        })?;
        Ok(Tensor { data })
    }

    /// 沿`axis`按各段长度切分，是`concat`的逆运算
    pub fn split(&self, axis: usize, sizes: &[usize]) -> Result<Vec<Tensor>, TensorError> {
        if axis >= self.dimension() {
            return Err(TensorError::AxisOutOfRange {
                axis,
                rank: self.dimension(),
            });
        }
        if sizes.iter().sum::<usize>() != self.shape()[axis] {
            let mut to = self.shape().to_vec();
            to[axis] = sizes.iter().sum();
            return Err(TensorError::ReshapeError {
                from: self.shape().to_vec(),
                to,
            });
        }
        let mut start = 0;
        Ok(sizes
            .iter()
            .map(|&len| {
                let part = self
                    .data
                    .slice_axis(Axis(axis), Slice::from(start..start + len))
                    .to_owned();
                start += len;
                Tensor { data: part }
            })
            .collect())
    }
}

// ========== 归约与逐元素变换 ==========

impl Tensor {
    pub fn sum(&self) -> f32 {
        self.data.sum()
    }

    /// 所有元素的平均值；空张量返回0
    pub fn mean(&self) -> f32 {
        if self.size() == 0 {
            0.0
        } else {
            self.sum() / self.size() as f32
        }
    }

    /// 沿`axis`求和并保留该维（长度变为1），便于随后广播
    pub fn sum_axis_keepdims(&self, axis: usize) -> Tensor {
        Tensor {
            data: self.data.sum_axis(Axis(axis)).insert_axis(Axis(axis)),
        }
    }

    /// 把广播后的梯度累加回原形状`shape`（用于偏置等被广播的参数）
    pub fn sum_to_shape(&self, shape: &[usize]) -> Result<Tensor, TensorError> {
        let mut data = self.data.clone();
        // 先去掉多出来的前导维度
        while data.ndim() > shape.len() {
            data = data.sum_axis(Axis(0));
        }
        for (axis, &len) in shape.iter().enumerate() {
            if len == 1 && data.shape()[axis] != 1 {
                data = data.sum_axis(Axis(axis)).insert_axis(Axis(axis));
            }
        }
        if data.shape() != shape {
            return Err(TensorError::ReshapeError {
                from: self.shape().to_vec(),
                to: shape.to_vec(),
            });
        }
        Ok(Tensor { data })
    }

    /// 逐元素映射
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.mapv(f),
        }
    }

    /// 两个同形状张量逐元素组合
    pub fn zip_map(
        &self,
        other: &Tensor,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Tensor, TensorError> {
        if !self.is_same_shape(other) {
            return Err(TensorError::OperatorError {
                operator: Operator::Mul,
                tensor1_shape: self.shape().to_vec(),
                tensor2_shape: other.shape().to_vec(),
            });
        }
        let mut data = self.data.clone();
        Zip::from(&mut data)
            .and(&other.data)
            .for_each(|a, &b| *a = f(*a, b));
        Ok(Tensor { data })
    }

    pub fn sqrt(&self) -> Tensor {
        self.map(f32::sqrt)
    }

    pub fn square(&self) -> Tensor {
        self.map(|x| x * x)
    }

    pub fn abs(&self) -> Tensor {
        self.map(f32::abs)
    }

    /// 逐元素取两者较大值
    pub fn maximum(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        self.zip_map(other, f32::max)
    }

    /// 沿最后一维做数值稳定的softmax
    pub fn softmax_last_axis(&self) -> Tensor {
        let last = Axis(self.dimension().saturating_sub(1));
        let mut data = self.data.clone();
        for mut lane in data.lanes_mut(last) {
            let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            lane.mapv_inplace(|v| (v - max).exp());
            let sum = lane.sum();
            lane.mapv_inplace(|v| v / sum);
        }
        Tensor { data }
    }

    /// 将首维之外的维度展平成二阶张量[batch, features]
    pub fn flatten_batch(&self) -> Result<Tensor, TensorError> {
        let batch = self.batch_size();
        let features = if batch == 0 { 0 } else { self.size() / batch };
        self.reshape(&[batch, features])
    }
}
