//! Linear pipeline graph of a workflow: the input feeding step 1, each step
//! feeding the next.

use crate::models::{AssetFile, Workflow};

pub const INPUT_NODE_ID: &str = "input";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl PipelineGraph {
    /// One-line rendering, e.g. `Input: a.csv -> Step 1 Wheel: w Model: None`.
    pub fn chain_label(&self) -> String {
        self.nodes
            .iter()
            .map(|node| node.label.replace('\n', " "))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

fn asset_label(file: &AssetFile) -> String {
    file.name
        .clone()
        .or_else(|| file.description.clone())
        .unwrap_or_else(|| file.id.to_string())
}

pub fn pipeline_graph(workflow: &Workflow) -> PipelineGraph {
    let input = workflow
        .input
        .as_ref()
        .and_then(|input| input.name.as_deref().or(input.path.as_deref()))
        .unwrap_or("N/A");

    let mut graph = PipelineGraph::default();
    graph.nodes.push(GraphNode {
        id: INPUT_NODE_ID.to_string(),
        label: format!("Input:\n{}", input),
    });

    let mut previous = INPUT_NODE_ID.to_string();
    for (i, step) in workflow.steps.iter().enumerate() {
        let id = format!("step-{}", i + 1);
        let wheel = step
            .wheel_file
            .as_ref()
            .map(asset_label)
            .unwrap_or_else(|| "N/A".to_string());
        let model = step
            .model_file
            .as_ref()
            .map(asset_label)
            .unwrap_or_else(|| "None".to_string());

        graph.nodes.push(GraphNode {
            id: id.clone(),
            label: format!("Step {}\nWheel: {}\nModel: {}", i + 1, wheel, model),
        });
        graph.edges.push(GraphEdge {
            id: format!("e-{}", id),
            source: previous,
            target: id.clone(),
        });
        previous = id;
    }

    graph
}
