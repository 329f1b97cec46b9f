/*
 * @Author       : 老董
 * @Date         : 2026-02-04
 * @Description  : Model —— 可训练模型
 *
 * 状态机：未编译 → 已编译 → 已初始化（训练/init/加载权重）。
 * - 编译：命名层、拓扑排序、逐层推导形状并在新的 Graph 中分配变量，再为可训练变量分配优化器槽；
 * - 训练与推理见 `training.rs`；
 * - 复制与权重迁移见 `transfer.rs`。
 */

mod callback;
mod history;
mod training;
mod transfer;

pub use callback::{Callback, EarlyStopping, EarlyStoppingMode, Monitor, TrainingControl};
pub use history::{
    BatchTrainingEvent, EpochTrainingEvent, EvaluationResult, TrainingHistory, metric_value,
};
pub use transfer::WeightSnapshot;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::nn::graph::{Graph, VariableId};
use crate::nn::layer::{Layer, LayerKind, LayerOps};
use crate::nn::optimizer::{Optimizer, OptimizerOps};
use crate::nn::{Loss, Metric, NnError, NnResult, ShapeSpec};

/// 层与层的连接方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// 按声明顺序串联，第一层必须是Input
    Sequential,
    /// 由每层的`inbound`构成有向无环图
    Functional,
}

/// 编译后才有的状态
#[derive(Debug, Clone)]
struct Compiled {
    graph: Graph,
    /// 拓扑序（层下标）
    order: Vec<usize>,
    /// 每层的输入来自哪些层（层下标）
    inbound: Vec<Vec<usize>>,
    output_shapes: Vec<ShapeSpec>,
    input_layer: usize,
    output_layer: usize,
    /// 编译时确定的可训练变量，梯度与更新都按此顺序
    trainable: Vec<VariableId>,
    optimizer: Optimizer,
    loss: Loss,
    metrics: Vec<Metric>,
}

/// 可训练模型
///
/// ```
/// use only_keras::nn::layer::{Dense, Input, Layer};
/// use only_keras::nn::optimizer::SGD;
/// use only_keras::nn::{Activation, Loss, Metric, Model};
///
/// let mut model = Model::sequential(vec![
///     Layer::new(Input::new(&[4])),
///     Layer::new(Dense::new(8).with_activation(Activation::Relu)),
///     Layer::new(Dense::new(3)),
/// ]);
/// model
///     .compile(SGD::default(), Loss::SoftmaxCrossEntropyWithLogits, &[Metric::Accuracy])
///     .unwrap();
/// assert_eq!(model.number_of_classes(), Some(3));
/// assert_eq!(model.layers()[1].name(), "dense_1");
/// ```
#[derive(Debug)]
pub struct Model {
    name: String,
    topology: Topology,
    layers: Vec<Layer>,
    seed: Option<u64>,
    compiled: Option<Compiled>,
    is_initialized: bool,
    is_optimizer_initialized: bool,
    callbacks: Vec<Box<dyn Callback>>,
}

impl Model {
    // ========== 创建 ==========

    pub fn sequential(layers: Vec<Layer>) -> Self {
        Self::build("sequential", Topology::Sequential, layers)
    }

    pub fn functional(layers: Vec<Layer>) -> Self {
        Self::build("functional", Topology::Functional, layers)
    }

    fn build(name: &str, topology: Topology, mut layers: Vec<Layer>) -> Self {
        assign_default_names(&mut layers);
        Self {
            name: name.to_string(),
            topology,
            layers,
            seed: None,
            compiled: None,
            is_initialized: false,
            is_optimizer_initialized: false,
            callbacks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// 固定随机种子：变量初始化与Dropout掩码均可复现
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn add_callback(&mut self, callback: impl Callback + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    // ========== 编译 ==========

    /// 编译模型：每个模型只能编译一次
    pub fn compile(
        &mut self,
        optimizer: impl Into<Optimizer>,
        loss: Loss,
        metrics: &[Metric],
    ) -> NnResult<()> {
        if self.compiled.is_some() {
            return Err(NnError::Configuration(format!(
                "模型`{}`已经编译过，不能重复编译",
                self.name
            )));
        }

        // 1. 层名唯一
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.name()) {
                return Err(NnError::NameCollision(layer.name().to_string()));
            }
        }

        // 2. 拓扑
        let plan = match self.topology {
            Topology::Sequential => sequential_plan(&self.layers)?,
            Topology::Functional => functional_plan(&self.layers)?,
        };

        // 3. 逐层推导形状并分配变量
        let mut graph = match self.seed {
            Some(seed) => Graph::new_with_seed(seed),
            None => Graph::new(),
        };
        for layer in self.layers.iter().filter(|l| !l.is_trainable()) {
            graph.freeze_layer(layer.name());
        }

        let mut output_shapes: Vec<Option<ShapeSpec>> = vec![None; self.layers.len()];
        for &idx in &plan.order {
            let layer = &self.layers[idx];
            let input_shapes = plan.inbound[idx]
                .iter()
                .map(|&i| {
                    output_shapes[i].clone().ok_or_else(|| {
                        NnError::Configuration(format!("层`{}`的输入尚未确定形状", layer.name()))
                    })
                })
                .collect::<NnResult<Vec<_>>>()?;

            let shape = layer.kind().compute_output_shape(&input_shapes)?;
            if !shape.has_positive_tail() {
                return Err(NnError::Configuration(format!(
                    "层`{}`的输出形状{shape}含有非正的维度",
                    layer.name()
                )));
            }
            layer.kind().allocate_variables(
                &mut graph,
                layer.name(),
                &input_shapes,
                layer.is_trainable(),
            )?;
            log::debug!("层`{}`（{}）输出形状：{shape}", layer.name(), layer.kind().type_name());
            output_shapes[idx] = Some(shape);
        }
        let output_shapes = output_shapes
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| NnError::Configuration("存在未参与计算的层".to_string()))?;

        // 4. 优化器槽
        let optimizer = optimizer.into();
        let trainable = graph.trainable_variables();
        optimizer.allocate_slots(&mut graph, &trainable)?;

        log::debug!(
            "模型`{}`编译完成：{}个变量，其中{}个可训练，优化器{}",
            self.name,
            graph.len(),
            trainable.len(),
            optimizer.name()
        );

        self.compiled = Some(Compiled {
            graph,
            order: plan.order,
            inbound: plan.inbound,
            output_shapes,
            input_layer: plan.input_layer,
            output_layer: plan.output_layer,
            trainable,
            optimizer,
            loss,
            metrics: metrics.to_vec(),
        });
        Ok(())
    }

    fn compiled_state(&self) -> NnResult<&Compiled> {
        self.compiled.as_ref().ok_or_else(not_compiled)
    }

    // ========== 查询 ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn is_optimizer_initialized(&self) -> bool {
        self.is_optimizer_initialized
    }

    /// 编译后的变量注册表
    pub fn graph(&self) -> Option<&Graph> {
        self.compiled.as_ref().map(|c| &c.graph)
    }

    pub fn optimizer(&self) -> Option<&Optimizer> {
        self.compiled.as_ref().map(|c| &c.optimizer)
    }

    pub fn loss(&self) -> Option<Loss> {
        self.compiled.as_ref().map(|c| c.loss)
    }

    pub fn metrics(&self) -> &[Metric] {
        self.compiled.as_ref().map_or(&[], |c| c.metrics.as_slice())
    }

    pub fn input_shape(&self) -> Option<&ShapeSpec> {
        self.compiled
            .as_ref()
            .map(|c| &c.output_shapes[c.input_layer])
    }

    pub fn output_shape(&self) -> Option<&ShapeSpec> {
        self.compiled
            .as_ref()
            .map(|c| &c.output_shapes[c.output_layer])
    }

    /// 最后一层输出的宽度
    pub fn number_of_classes(&self) -> Option<usize> {
        self.output_shape().and_then(ShapeSpec::last)
    }

    /// 编译时确定的可训练变量
    pub fn trainable_variables(&self) -> &[VariableId] {
        self.compiled.as_ref().map_or(&[], |c| c.trainable.as_slice())
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.graph().map(Graph::variable_names).unwrap_or_default()
    }

    // ========== 冻结 ==========

    /// 修改层的可训练标志
    ///
    /// 已编译的模型中，冻结关系立即作用于权重迁移与BatchNorm的模式，
    /// 但本模型的可训练变量列表在编译时已确定，不再变化
    pub fn set_layer_trainable(&mut self, name: &str, trainable: bool) -> NnResult<()> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.name() == name)
            .ok_or_else(|| NnError::Configuration(format!("模型中不存在名为`{name}`的层")))?;
        layer.set_trainable(trainable);

        if let Some(compiled) = self.compiled.as_mut() {
            if trainable {
                compiled.graph.unfreeze_layer(name);
            } else {
                compiled.graph.freeze_layer(name);
            }
        }
        Ok(())
    }

    // ========== 层配置的序列化 ==========

    pub fn layers_to_json(&self) -> NnResult<String> {
        Ok(serde_json::to_string_pretty(&self.layers)?)
    }

    pub fn sequential_from_json(json: &str) -> NnResult<Self> {
        Ok(Self::sequential(serde_json::from_str(json)?))
    }

    pub fn functional_from_json(json: &str) -> NnResult<Self> {
        Ok(Self::functional(serde_json::from_str(json)?))
    }
}

fn not_compiled() -> NnError {
    NnError::Configuration("模型尚未编译，请先调用compile()".to_string())
}

/// 空层名改为`{类型名小写}_{同类序号}`，如`dense_1`
fn assign_default_names(layers: &mut [Layer]) {
    let mut counters: HashMap<&'static str, usize> = HashMap::new();
    for layer in layers.iter_mut() {
        let type_name = layer.kind().type_name();
        let count = counters.entry(type_name).or_insert(0);
        *count += 1;
        if layer.name().is_empty() {
            layer.set_name(format!("{}_{}", type_name.to_lowercase(), count));
        }
    }
}

fn is_input(layer: &Layer) -> bool {
    matches!(layer.kind(), LayerKind::Input(_))
}

/// 编译计划：执行顺序与连接关系
struct Plan {
    order: Vec<usize>,
    inbound: Vec<Vec<usize>>,
    input_layer: usize,
    output_layer: usize,
}

fn sequential_plan(layers: &[Layer]) -> NnResult<Plan> {
    let Some(first) = layers.first() else {
        return Err(NnError::Configuration("模型中没有任何层".to_string()));
    };
    if !is_input(first) {
        return Err(NnError::Configuration(format!(
            "顺序模型的第一层必须是Input，实际为{}",
            first.kind().type_name()
        )));
    }
    if let Some(extra) = layers.iter().skip(1).find(|l| is_input(l)) {
        return Err(NnError::Configuration(format!(
            "顺序模型只能有一个Input层，`{}`多余",
            extra.name()
        )));
    }

    let n = layers.len();
    Ok(Plan {
        order: (0..n).collect(),
        inbound: (0..n)
            .map(|i| if i == 0 { vec![] } else { vec![i - 1] })
            .collect(),
        input_layer: 0,
        output_layer: n - 1,
    })
}

/// Kahn拓扑排序；同时可执行的层按声明顺序排列
fn functional_plan(layers: &[Layer]) -> NnResult<Plan> {
    let n = layers.len();
    if n == 0 {
        return Err(NnError::Configuration("模型中没有任何层".to_string()));
    }
    let index: HashMap<&str, usize> = layers
        .iter()
        .enumerate()
        .map(|(i, l)| (l.name(), i))
        .collect();

    // 1. 解析入边
    let mut inbound = Vec::with_capacity(n);
    for layer in layers {
        let sources = layer
            .inbound()
            .iter()
            .map(|name| {
                index.get(name.as_str()).copied().ok_or_else(|| {
                    NnError::Configuration(format!(
                        "层`{}`的输入`{name}`不存在",
                        layer.name()
                    ))
                })
            })
            .collect::<NnResult<Vec<_>>>()?;
        if is_input(layer) != sources.is_empty() {
            return Err(NnError::Configuration(format!(
                "层`{}`：Input层不能有输入，其他层必须至少有一个输入",
                layer.name()
            )));
        }
        inbound.push(sources);
    }

    // 2. 恰好一个Input
    let inputs: Vec<usize> = (0..n).filter(|&i| is_input(&layers[i])).collect();
    let &[input_layer] = inputs.as_slice() else {
        return Err(NnError::Configuration(format!(
            "函数式模型必须恰好有一个Input层，实际为{}个",
            inputs.len()
        )));
    };

    // 3. 拓扑排序
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, sources) in inbound.iter().enumerate() {
        for &s in sources {
            consumers[s].push(i);
        }
    }
    let mut in_degree: Vec<usize> = inbound.iter().map(Vec::len).collect();
    let mut done = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while let Some(next) = (0..n).find(|&i| !done[i] && in_degree[i] == 0) {
        done[next] = true;
        order.push(next);
        for &c in &consumers[next] {
            in_degree[c] -= 1;
        }
    }
    if order.len() != n {
        let cyclic: Vec<&str> = (0..n)
            .filter(|&i| !done[i])
            .map(|i| layers[i].name())
            .collect();
        return Err(NnError::Configuration(format!(
            "函数式模型中存在环，涉及层：{cyclic:?}"
        )));
    }

    // 4. 恰好一个输出
    let sinks: Vec<usize> = (0..n).filter(|&i| consumers[i].is_empty()).collect();
    let &[output_layer] = sinks.as_slice() else {
        let names: Vec<&str> = sinks.iter().map(|&i| layers[i].name()).collect();
        return Err(NnError::Configuration(format!(
            "函数式模型必须恰好有一个输出层，实际为：{names:?}"
        )));
    };

    Ok(Plan {
        order,
        inbound,
        input_layer,
        output_layer,
    })
}
