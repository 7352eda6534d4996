use flowrun::flowchart::{Connection, Flowchart, IncomingParam, Node, RawFlowchart};
use serde_json::{Map, Value};

/// Builder for `Flowchart` to simplify test setup.
pub struct FlowchartBuilder {
    raw: RawFlowchart,
}

impl FlowchartBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawFlowchart::default(),
        }
    }

    pub fn node(mut self, node: NodeBuilder) -> Self {
        self.raw.nodes.push(node.build());
        self
    }

    /// Unconditional connection.
    pub fn connect(mut self, from: &str, to: &str) -> Self {
        self.raw.connections.push(Connection {
            from: from.to_string(),
            to: to.to_string(),
            condition: None,
            condition_param: None,
        });
        self
    }

    /// Connection guarded by `condition` with `param`.
    pub fn connect_if(mut self, from: &str, to: &str, condition: &str, param: Value) -> Self {
        self.raw.connections.push(Connection {
            from: from.to_string(),
            to: to.to_string(),
            condition: Some(condition.to_string()),
            condition_param: Some(param),
        });
        self
    }

    pub fn declare_loop(mut self, nodes: &[&str]) -> Self {
        self.raw
            .loops
            .push(nodes.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> Flowchart {
        Flowchart::try_from(self.raw).expect("Failed to build valid flowchart from builder")
    }
}

impl Default for FlowchartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Node`.
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(id: &str, task_type: &str) -> Self {
        Self {
            node: Node {
                id: id.to_string(),
                label: None,
                task_type: task_type.to_string(),
                parameters: Value::Object(Map::new()),
                incoming_params: Vec::new(),
                allow_partial_dependencies: false,
                expected_deps: 0,
            },
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.node.label = Some(label.to_string());
        self
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.node.parameters = parameters;
        self
    }

    /// Declare `source` as a dependency and pull `keys` from its output.
    pub fn needs(mut self, source: &str, keys: &[&str]) -> Self {
        self.node.incoming_params.push(IncomingParam {
            source: source.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        });
        self
    }

    /// Any-of semantics over the declared sources.
    pub fn partial(mut self) -> Self {
        self.node.allow_partial_dependencies = true;
        self
    }

    pub fn expected_deps(mut self, n: usize) -> Self {
        self.node.expected_deps = n;
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}
