use std::io::Write;

use cogflow_core::error::CogflowError;
use cogflow_engine::{ExecutionMode, FlowGraph};

const RESEARCH_FLOW: &str = r#"{
  "nodes": [
    {"id": "topic", "label": "Topic", "prompt": "Pick a topic in distributed systems.",
     "position": {"x": 0, "y": 0}},
    {"id": "route", "label": "Route", "prompt": "Is it about storage or networking?",
     "executionMode": "choose", "conditionPrompt": "Follow the area the topic belongs to."},
    {"id": "storage", "label": "Storage", "prompt": "Explain the storage trade-offs."},
    {"id": "network", "label": "Networking", "prompt": "Explain the networking trade-offs."},
    {"id": "wrap", "label": "Wrap up", "prompt": "Summarize."}
  ],
  "edges": [
    {"id": "e1", "source": "topic", "target": "route", "sourceHandle": "bottom"},
    {"source": "route", "target": "storage"},
    {"source": "route", "target": "network"},
    {"source": "storage", "target": "wrap"},
    {"source": "network", "target": "wrap"}
  ]
}"#;

fn write_flow(text: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(text.as_bytes()).expect("write flow");
    tmp
}

#[test]
fn test_load_editor_flow() {
    let tmp = write_flow(RESEARCH_FLOW);
    let graph = FlowGraph::load(tmp.path()).expect("load flow");

    assert_eq!(graph.nodes().len(), 5);
    let route = graph.node("route").expect("route node");
    assert_eq!(route.execution_mode, ExecutionMode::Choose);
    assert!(graph.branches_at("route"));
    assert_eq!(graph.edges()[0].id, "e1");
    assert_eq!(graph.edges()[1].id, "route->storage");
    assert_eq!(graph.node("topic").unwrap().extra["position"]["y"], 0);

    let order = graph.validate().expect("valid flow");
    assert_eq!(order.first().map(String::as_str), Some("topic"));
    assert_eq!(order.last().map(String::as_str), Some("wrap"));
}

#[test]
fn test_cyclic_flow_rejected() {
    let tmp = write_flow(
        r#"{"nodes": [{"id": "a"}, {"id": "b"}],
            "edges": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]}"#,
    );
    let graph = FlowGraph::load(tmp.path()).expect("load flow");
    assert!(matches!(
        graph.validate(),
        Err(CogflowError::CycleDetected { .. })
    ));
}

#[test]
fn test_malformed_flow_is_json_error() {
    let tmp = write_flow(r#"{"nodes": [{"label": "no id"}]}"#);
    assert!(matches!(
        FlowGraph::load(tmp.path()),
        Err(CogflowError::Json(_))
    ));
}
