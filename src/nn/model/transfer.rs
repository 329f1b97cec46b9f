/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 模型复制与权重迁移
 *
 * 复制、快照、加载共用同一个过滤规则（通过 `Graph::freeze` 表达）：
 * - 不要求优化器状态时，跳过全部优化器变量；
 * - 冻结层的优化器槽总是跳过。
 */

use serde::{Deserialize, Serialize};

use super::{Model, not_compiled};
use crate::nn::graph::{Graph, VariableId};
use crate::nn::{NnError, NnResult};
use crate::tensor::Tensor;

/// 按注册表顺序排列的（变量名, 值）
///
/// ```
/// use only_keras::nn::model::WeightSnapshot;
/// use only_keras::tensor::Tensor;
///
/// let mut snapshot = WeightSnapshot::new();
/// snapshot.push("dense_1_dense_bias", Tensor::zeros(&[3]));
/// let bytes = snapshot.to_bytes().unwrap();
/// assert_eq!(WeightSnapshot::from_bytes(&bytes).unwrap(), snapshot);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    entries: Vec<(String, Tensor)>,
}

impl WeightSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: Tensor) {
        self.entries.push((name.to_string(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn to_bytes(&self) -> NnResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> NnResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn to_json(&self) -> NnResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> NnResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 是否跳过该变量
fn skipped(graph: &Graph, id: &VariableId, with_optimizer_state: bool) -> bool {
    id.is_optimizer_variable() && (!with_optimizer_state || graph.is_frozen_variable(id))
}

/// 需要迁移的变量（按注册表顺序）
fn transferable(graph: &Graph, with_optimizer_state: bool) -> Vec<VariableId> {
    graph.freeze(|id| skipped(graph, id, with_optimizer_state))
}

impl Model {
    /// 得到一个独立的模型：相同的层（克隆）、克隆的优化器/损失/指标，以及新的注册表
    ///
    /// `copy_weights`为true时按过滤规则迁移变量值；可迁移的变量为0个时报错
    pub fn copy(&self, copy_weights: bool, save_optimizer_state: bool) -> NnResult<Model> {
        let compiled = self.compiled_state()?;

        let mut copy = Model {
            name: format!("{}_copy", self.name),
            topology: self.topology,
            layers: self.layers.clone(),
            seed: self.seed,
            compiled: None,
            is_initialized: false,
            is_optimizer_initialized: false,
            callbacks: Vec::new(),
        };
        copy.compile(
            compiled.optimizer.clone(),
            compiled.loss,
            &compiled.metrics,
        )?;
        if !copy_weights {
            return Ok(copy);
        }

        if !self.is_initialized {
            return Err(NnError::UninitializedModel(format!(
                "模型`{}`尚未初始化，没有可复制的权重",
                self.name
            )));
        }
        let with_optimizer_state = save_optimizer_state && self.is_optimizer_initialized;
        let ids = transferable(&compiled.graph, with_optimizer_state);
        if ids.is_empty() {
            return Err(NnError::Configuration(format!(
                "模型`{}`中没有可复制的变量",
                self.name
            )));
        }

        let target = copy.compiled.as_mut().ok_or_else(not_compiled)?;
        for id in &ids {
            if !target.graph.contains(id) {
                return Err(NnError::MissingVariable(id.encode()));
            }
            target.graph.assign(id, compiled.graph.value(id)?.clone())?;
        }
        // 未迁移的优化器变量（如冻结层解冻后的槽）用初始化器补齐
        if with_optimizer_state {
            target.graph.initialize_missing_optimizer_variables();
        }
        copy.is_initialized = true;
        copy.is_optimizer_initialized = with_optimizer_state;

        log::debug!(
            "模型`{}`复制为`{}`，迁移了{}个变量",
            self.name,
            copy.name,
            ids.len()
        );
        Ok(copy)
    }

    /// 当前变量值的快照（按注册表顺序）
    pub fn weights_snapshot(&self, include_optimizer: bool) -> NnResult<WeightSnapshot> {
        let compiled = self.compiled_state()?;
        if !self.is_initialized {
            return Err(NnError::UninitializedModel(format!(
                "模型`{}`尚未初始化，无法生成权重快照",
                self.name
            )));
        }
        let with_optimizer_state = include_optimizer && self.is_optimizer_initialized;

        let mut snapshot = WeightSnapshot::new();
        for id in transferable(&compiled.graph, with_optimizer_state) {
            snapshot.push(&id.encode(), compiled.graph.value(&id)?.clone());
        }
        Ok(snapshot)
    }

    /// 从快照加载变量值，只能在已编译、尚未初始化的模型上调用
    ///
    /// 快照中的名称在本模型中不存在时返回`MissingVariable`；
    /// 快照没有覆盖的层变量用初始化器补齐
    pub fn load_weights(
        &mut self,
        snapshot: &WeightSnapshot,
        load_optimizer_state: bool,
    ) -> NnResult<()> {
        let compiled = self.compiled.as_mut().ok_or_else(not_compiled)?;
        if self.is_initialized {
            return Err(NnError::Configuration(format!(
                "模型`{}`已初始化，只能在初始化之前加载权重",
                self.name
            )));
        }

        // 1. 先全部校验，避免加载到一半失败
        let mut pending = Vec::with_capacity(snapshot.len());
        for (name, value) in snapshot.iter() {
            let id = compiled
                .graph
                .id_by_name(name)
                .ok_or_else(|| NnError::MissingVariable(name.to_string()))?;
            if skipped(&compiled.graph, id, load_optimizer_state) {
                log::debug!("跳过变量`{name}`");
                continue;
            }
            let expected = compiled.graph.variable(id)?.shape();
            if value.shape() != expected {
                return Err(NnError::Shape {
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", value.shape()),
                    message: format!("快照中变量`{name}`的形状与模型不一致"),
                });
            }
            pending.push((id.clone(), value.clone()));
        }

        // 2. 赋值
        for (id, value) in pending {
            compiled.graph.assign(&id, value)?;
        }
        let missing = compiled.graph.initialize_missing_layer_variables();
        if missing > 0 {
            log::warn!("快照没有覆盖{missing}个层变量，已用初始化器补齐");
        }
        if load_optimizer_state {
            compiled.graph.initialize_missing_optimizer_variables();
            self.is_optimizer_initialized = true;
        }
        self.is_initialized = true;
        Ok(())
    }
}
