/*
 * @Author       : 老董
 * @Date         : 2026-01-27
 * @Description  : Graph —— 变量注册表
 *
 * 持有一个模型的全部层变量、优化器槽与优化器标量，以及它们的初始化器和随机数发生器。
 * 每次 compile 都新建一个 Graph；模型独占它，并以 `&Graph`/`&mut Graph` 显式传给层和优化器。
 */

mod gradients;
mod variable;

pub use gradients::Gradients;
pub use variable::{OPTIMIZER_PREFIX, Variable, VariableId, VariableUpdate};

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeSet, HashMap};

use crate::nn::init::{Init, Regularizer};
use crate::nn::{NnError, NnResult};
use crate::tensor::Tensor;

/// 变量注册表（即模型的执行上下文）
///
/// - 变量按分配顺序保存，`variable_names()`的顺序即分配顺序，跨运行可复现
/// - 冻结层以显式集合记录，而不是靠变量名的字符串匹配
/// - `copy()`得到存储完全独立的副本
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    variables: Vec<Variable>,
    index: HashMap<VariableId, usize>,
    names: HashMap<String, usize>,
    frozen_layers: BTreeSet<String>,
    rng: StdRng,
    seed: Option<u64>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    // ========== 创建 ==========

    pub fn new() -> Self {
        Self::build("default_graph", StdRng::from_entropy(), None)
    }

    /// 创建带种子的注册表（初始化、Dropout掩码均可复现）
    pub fn new_with_seed(seed: u64) -> Self {
        Self::build("default_graph", StdRng::seed_from_u64(seed), Some(seed))
    }

    fn build(name: &str, rng: StdRng, seed: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            variables: Vec::new(),
            index: HashMap::new(),
            names: HashMap::new(),
            frozen_layers: BTreeSet::new(),
            rng,
            seed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// 深拷贝：拓扑、变量名、形状与取值全部相同，但存储互不共享
    pub fn copy(&self) -> Graph {
        self.clone()
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    // ========== 分配变量 ==========

    /// 为层分配一个变量；同名变量已存在时返回`NameCollision`
    pub fn add_layer_variable(
        &mut self,
        layer: &str,
        purpose: &str,
        shape: &[usize],
        initializer: Init,
        trainable: bool,
        regularizer: Option<Regularizer>,
    ) -> NnResult<VariableId> {
        initializer.validate()?;
        let id = VariableId::layer(layer, purpose);
        self.insert(Variable {
            name: id.encode(),
            id: id.clone(),
            shape: shape.to_vec(),
            initializer,
            regularizer,
            trainable,
            value: None,
        })?;
        Ok(id)
    }

    /// 为层变量`primary`分配一个同形状的优化器槽
    pub fn add_slot(
        &mut self,
        primary: &VariableId,
        slot: &str,
        initializer: Init,
    ) -> NnResult<VariableId> {
        initializer.validate()?;
        let shape = self.variable(primary)?.shape.clone();
        let id = primary.slot(slot).ok_or_else(|| {
            NnError::Configuration(format!("只能为层变量创建优化器槽，而`{primary}`不是层变量"))
        })?;
        self.insert(Variable {
            name: id.encode(),
            id: id.clone(),
            shape,
            initializer,
            regularizer: None,
            trainable: false,
            value: None,
        })?;
        Ok(id)
    }

    /// 分配一个优化器标量（如`beta1_power`）
    pub fn add_optimizer_scalar(&mut self, name: &str, initial_value: f32) -> NnResult<VariableId> {
        let initializer = Init::Constant(initial_value);
        initializer.validate()?;
        let id = VariableId::scalar(name);
        self.insert(Variable {
            name: id.encode(),
            id: id.clone(),
            shape: vec![],
            initializer,
            regularizer: None,
            trainable: false,
            value: None,
        })?;
        Ok(id)
    }

    fn insert(&mut self, variable: Variable) -> NnResult<()> {
        if self.index.contains_key(&variable.id) || self.names.contains_key(&variable.name) {
            return Err(NnError::NameCollision(variable.name));
        }
        let position = self.variables.len();
        self.index.insert(variable.id.clone(), position);
        self.names.insert(variable.name.clone(), position);
        self.variables.push(variable);
        Ok(())
    }

    // ========== 查询 ==========

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn contains(&self, id: &VariableId) -> bool {
        self.index.contains_key(id)
    }

    pub fn variable(&self, id: &VariableId) -> NnResult<&Variable> {
        self.index
            .get(id)
            .map(|&i| &self.variables[i])
            .ok_or_else(|| NnError::MissingVariable(id.encode()))
    }

    fn variable_mut(&mut self, id: &VariableId) -> NnResult<&mut Variable> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.variables[i]),
            None => Err(NnError::MissingVariable(id.encode())),
        }
    }

    /// 按外部字符串名查找标识
    pub fn id_by_name(&self, name: &str) -> Option<&VariableId> {
        self.names.get(name).map(|&i| &self.variables[i].id)
    }

    /// 所有变量名，顺序即分配顺序
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    /// 所有变量，顺序即分配顺序
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    fn collect_ids(&self, predicate: impl Fn(&Variable) -> bool) -> Vec<VariableId> {
        self.variables
            .iter()
            .filter(|v| predicate(v))
            .map(|v| v.id.clone())
            .collect()
    }

    /// 所有层变量（含冻结的）
    pub fn layer_variables(&self) -> Vec<VariableId> {
        self.collect_ids(|v| !v.id.is_optimizer_variable())
    }

    /// 可训练的层变量：变量本身可训练，且所属层未被冻结
    pub fn trainable_variables(&self) -> Vec<VariableId> {
        self.collect_ids(|v| {
            !v.id.is_optimizer_variable() && v.trainable && !self.is_frozen_variable(&v.id)
        })
    }

    /// 不参与训练的层变量
    pub fn frozen_variables(&self) -> Vec<VariableId> {
        self.collect_ids(|v| {
            !v.id.is_optimizer_variable() && (!v.trainable || self.is_frozen_variable(&v.id))
        })
    }

    /// 优化器槽与优化器标量
    pub fn optimizer_variables(&self) -> Vec<VariableId> {
        self.collect_ids(|v| v.id.is_optimizer_variable())
    }

    /// 属于某层的层变量
    pub fn variables_of_layer(&self, layer: &str) -> Vec<VariableId> {
        self.collect_ids(|v| {
            matches!(&v.id, VariableId::Layer { layer: owner, .. } if owner == layer)
        })
    }

    /// 排除掉谓词命中的变量，返回剩余变量（按分配顺序）
    ///
    /// 权重迁移用它分别跳过优化器状态和冻结层的状态，例如：
    /// ```ignore
    /// let to_copy = graph.freeze(|id| id.is_optimizer_variable() && graph.is_frozen_variable(id));
    /// ```
    pub fn freeze<P: Fn(&VariableId) -> bool>(&self, predicate: P) -> Vec<VariableId> {
        self.collect_ids(|v| !predicate(&v.id))
    }

    // ========== 冻结层 ==========

    pub fn freeze_layer(&mut self, layer: &str) {
        self.frozen_layers.insert(layer.to_string());
    }

    pub fn unfreeze_layer(&mut self, layer: &str) {
        self.frozen_layers.remove(layer);
    }

    pub fn is_layer_frozen(&self, layer: &str) -> bool {
        self.frozen_layers.contains(layer)
    }

    pub fn frozen_layers(&self) -> impl Iterator<Item = &str> {
        self.frozen_layers.iter().map(String::as_str)
    }

    /// 变量（层变量或其槽）是否属于冻结层
    pub fn is_frozen_variable(&self, id: &VariableId) -> bool {
        id.owner_layer().is_some_and(|layer| self.is_layer_frozen(layer))
    }

    // ========== 取值与赋值 ==========

    pub fn value(&self, id: &VariableId) -> NnResult<&Tensor> {
        self.variable(id)?.value.as_ref().ok_or_else(|| {
            NnError::UninitializedModel(format!("变量`{id}`尚未初始化，请先init()、fit()或加载权重"))
        })
    }

    pub fn value_by_name(&self, name: &str) -> NnResult<&Tensor> {
        let id = self
            .id_by_name(name)
            .ok_or_else(|| NnError::MissingVariable(name.to_string()))?
            .clone();
        self.value(&id)
    }

    /// 标量变量的值
    pub fn scalar_value(&self, id: &VariableId) -> NnResult<f32> {
        let value = self.value(id)?;
        value.number().ok_or_else(|| NnError::Shape {
            expected: "[]".to_string(),
            actual: format!("{:?}", value.shape()),
            message: format!("变量`{id}`不是标量"),
        })
    }

    /// 赋值，形状须与变量声明的形状一致
    pub fn assign(&mut self, id: &VariableId, value: Tensor) -> NnResult<()> {
        self.check_assignable(id, &value)?;
        self.variable_mut(id)?.value = Some(value);
        Ok(())
    }

    fn check_assignable(&self, id: &VariableId, value: &Tensor) -> NnResult<()> {
        let variable = self.variable(id)?;
        if value.shape() != variable.shape.as_slice() {
            return Err(NnError::Shape {
                expected: format!("{:?}", variable.shape),
                actual: format!("{:?}", value.shape()),
                message: format!("无法给变量`{}`赋值", variable.name),
            });
        }
        Ok(())
    }

    pub fn assign_by_name(&mut self, name: &str, value: Tensor) -> NnResult<()> {
        let id = self
            .id_by_name(name)
            .ok_or_else(|| NnError::MissingVariable(name.to_string()))?
            .clone();
        self.assign(&id, value)
    }

    /// 在一次“运行”中执行所有更新：先全部校验，再写入；任何一个不合法则一个都不写
    pub fn run_updates(&mut self, updates: Vec<VariableUpdate>) -> NnResult<()> {
        for update in &updates {
            self.check_assignable(&update.id, &update.value)?;
        }
        for update in updates {
            self.assign(&update.id, update.value)?;
        }
        Ok(())
    }

    // ========== 初始化 ==========

    /// 用初始化器（重新）生成所有层变量的值
    pub fn initialize_layer_variables(&mut self) {
        self.initialize_where(|v| !v.id.is_optimizer_variable(), false);
    }

    /// 只初始化尚无值的层变量，返回被初始化的个数
    pub fn initialize_missing_layer_variables(&mut self) -> usize {
        self.initialize_where(|v| !v.id.is_optimizer_variable(), true)
    }

    /// 用初始化器（重新）生成所有优化器变量的值
    pub fn initialize_optimizer_variables(&mut self) {
        self.initialize_where(|v| v.id.is_optimizer_variable(), false);
    }

    /// 只初始化尚无值的优化器变量，返回被初始化的个数
    pub fn initialize_missing_optimizer_variables(&mut self) -> usize {
        self.initialize_where(|v| v.id.is_optimizer_variable(), true)
    }

    fn initialize_where(&mut self, predicate: impl Fn(&Variable) -> bool, only_missing: bool) -> usize {
        let mut count = 0;
        for variable in self.variables.iter_mut() {
            if !predicate(&*variable) || (only_missing && variable.value.is_some()) {
                continue;
            }
            variable.value = Some(
                variable
                    .initializer
                    .generate_with_rng(&variable.shape, &mut self.rng),
            );
            count += 1;
        }
        count
    }

    // ========== 正则化 ==========

    /// 所有带正则化项的层变量的正则化损失之和
    pub fn regularization_loss(&self) -> NnResult<f32> {
        let mut total = 0.0;
        for variable in &self.variables {
            if let Some(regularizer) = &variable.regularizer {
                total += regularizer.loss(self.value(&variable.id)?);
            }
        }
        Ok(total)
    }

    /// 把正则化项的梯度累加进`gradients`
    pub fn accumulate_regularization_gradients(&self, gradients: &mut Gradients) -> NnResult<()> {
        for variable in &self.variables {
            if let Some(regularizer) = &variable.regularizer {
                let grad = regularizer.gradient(self.value(&variable.id)?);
                gradients.accumulate(&variable.id, grad);
            }
        }
        Ok(())
    }
}
