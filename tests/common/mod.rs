use graph_fusion::graph::{Graph, Op, OpId, TensorId};
use graph_fusion::pattern::{in_edge, PatternGraph};

/// Add a single-output op and return its id and output tensor.
#[allow(dead_code)]
pub fn add_op(graph: &mut Graph, kind: &str, inputs: &[TensorId]) -> (OpId, TensorId) {
    let name = format!("{}_out{}", kind, graph.tensor_count());
    let out = graph.add_tensor(name);
    let id = graph
        .add_op(Op::new(kind).with_inputs(inputs.iter().copied()).with_outputs([out]))
        .expect("op references known tensors");
    (id, out)
}

/// source -> reorder -> relu, with the relu output observed outside.
///
/// Returns the graph, `[source, reorder, relu]` and `[src_out, reorder_out, relu_out]`.
#[allow(dead_code)]
pub fn reorder_relu_fixture(relu_kind: &str) -> (Graph, [OpId; 3], [TensorId; 3]) {
    let mut graph = Graph::new();
    let (source, s) = add_op(&mut graph, "source", &[]);
    let (reorder, r) = add_op(&mut graph, "reorder", &[s]);
    let (relu, y) = add_op(&mut graph, relu_kind, &[r]);
    graph.mark_output(y).expect("known tensor");
    (graph, [source, reorder, relu], [s, r, y])
}

/// [any producer] -> reorder -> relu, fusing only reorder and relu.
///
/// The reorder input and relu output are the external ports.
#[allow(dead_code)]
pub fn reorder_relu_pattern(pg: &mut PatternGraph) {
    let producer = pg.append_any(&[]);
    pg.set_context(producer);
    let reorder = pg.append_op("reorder", &[in_edge(0, producer, 0)]);
    pg.add_predicate(reorder, |op| op.kind == "reorder");
    let relu = pg.append_op("relu", &[in_edge(0, reorder, 0)]);
    pg.add_predicate(relu, |op| op.kind == "relu");
    pg.create_input_port(0, reorder, 0)
        .create_output_port(0, relu, 0);
}

/// Chain of single-input ops of the given kinds fed by one graph input.
#[allow(dead_code)]
pub fn chain_graph(kinds: &[&str]) -> Graph {
    let mut graph = Graph::new();
    let mut t = graph.add_input("x");
    for kind in kinds {
        t = add_op(&mut graph, kind, &[t]).1;
    }
    graph.mark_output(t).expect("known tensor");
    graph
}
