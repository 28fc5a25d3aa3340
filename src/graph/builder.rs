use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::graph::engine::CompiledGraph;
use crate::graph::node::Node;
use crate::graph::nodes::{
    BackgroundInvestigatorNode, CoderNode, CoordinatorNode, HumanFeedbackNode, PlannerNode,
    ReporterNode, ResearchTeamNode, ResearcherNode,
};
use crate::graph::router::route;
use crate::graph::types::StageName;
use crate::types::RunState;

/// 条件路由函数：只依据状态选择下一个阶段
pub type Router = fn(&RunState) -> StageName;

/// 边的终点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTarget {
    Stage(StageName),
    End,
}

impl From<StageName> for EdgeTarget {
    fn from(stage: StageName) -> Self {
        EdgeTarget::Stage(stage)
    }
}

/// 阶段完成且未显式给出路由时使用的出边
#[derive(Clone, Copy)]
pub enum Edge {
    Direct(EdgeTarget),
    Conditional(Router),
}

/// 图的构建器
#[derive(Default)]
pub struct StateGraph {
    nodes: BTreeMap<StageName, Arc<dyn Node>>,
    edges: BTreeMap<StageName, Edge>,
    entry: Option<StageName>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> &mut Self {
        self.nodes.insert(node.name(), Arc::new(node));
        self
    }

    pub fn add_edge(&mut self, from: StageName, to: impl Into<EdgeTarget>) -> &mut Self {
        self.edges.insert(from, Edge::Direct(to.into()));
        self
    }

    pub fn add_conditional_edges(&mut self, from: StageName, router: Router) -> &mut Self {
        self.edges.insert(from, Edge::Conditional(router));
        self
    }

    pub fn set_entry_point(&mut self, stage: StageName) -> &mut Self {
        self.entry = Some(stage);
        self
    }

    /// 校验入口与所有边的端点都已注册
    pub fn compile(&self) -> Result<CompiledGraph, WorkflowError> {
        let entry = self.entry.ok_or_else(|| {
            WorkflowError::Configuration("graph has no entry point".to_string())
        })?;
        self.ensure_registered(entry)?;

        for (from, edge) in &self.edges {
            self.ensure_registered(*from)?;
            if let Edge::Direct(EdgeTarget::Stage(to)) = edge {
                self.ensure_registered(*to)?;
            }
        }

        Ok(CompiledGraph::new(
            self.nodes.clone(),
            self.edges.clone(),
            entry,
        ))
    }

    fn ensure_registered(&self, stage: StageName) -> Result<(), WorkflowError> {
        if self.nodes.contains_key(&stage) {
            Ok(())
        } else {
            Err(WorkflowError::Configuration(format!(
                "stage '{}' is referenced but not registered",
                stage
            )))
        }
    }
}

/// 构建 plan → execute → report 工作流
pub fn build_graph() -> Result<CompiledGraph, WorkflowError> {
    let mut graph = StateGraph::new();
    graph
        .add_node(CoordinatorNode)
        .add_node(BackgroundInvestigatorNode)
        .add_node(PlannerNode)
        .add_node(HumanFeedbackNode)
        .add_node(ResearchTeamNode)
        .add_node(ResearcherNode)
        .add_node(CoderNode)
        .add_node(ReporterNode)
        .set_entry_point(StageName::Coordinator)
        .add_edge(StageName::BackgroundInvestigator, StageName::Planner)
        .add_conditional_edges(StageName::ResearchTeam, route)
        .add_edge(StageName::Reporter, EdgeTarget::End);
    graph.compile()
}
