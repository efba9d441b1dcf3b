use super::*;
use crate::model::{CreationMode, ResourcesSpec};

const PIPELINE: &str = r#"
module: "module-1"
id: "pipeline-1"
name: "Ingest"
topics:
  - name: "input-topic"
    creation-mode: create-if-not-exists
    schema:
      type: avro
      schema: '{"type":"record","name":"Doc","fields":[]}'
  - name: "output-topic"
    creation-mode: none
pipeline:
  - name: "read"
    type: "source"
    configuration:
      connector.class: "FileSource"
  - type: "drop-fields"
    configuration:
      fields: ["a", "b"]
  - type: "sink"
    output: "output-topic"
    resources:
      parallelism: 3
      size: 2
"#;

fn build(documents: &[(&str, &str)]) -> Result<Application> {
    ModelBuilder::build(documents.iter().copied())
}

#[test]
fn test_pipeline_document_builds_module_and_topics() {
    let app = build(&[("pipeline.yaml", PIPELINE)]).unwrap();

    let module = app.module("module-1").unwrap();
    assert_eq!(module.topics.len(), 2);
    let input = module.resolve_topic("input-topic").unwrap();
    assert_eq!(input.creation_mode, CreationMode::CreateIfNotExists);
    assert_eq!(input.schema.as_ref().unwrap().schema_type, "avro");

    let pipeline = module.pipelines.get("pipeline-1").unwrap();
    assert_eq!(pipeline.name.as_deref(), Some("Ingest"));
    assert_eq!(pipeline.agents.len(), 3);
}

#[test]
fn test_auto_ids_follow_declaration_order() {
    let doc = r#"
pipeline:
  - type: "sink"
  - id: "explicit"
    type: "sink"
  - type: "sink"
"#;
    let app = build(&[("p.yaml", doc)]).unwrap();
    let pipeline = &app.module(DEFAULT_MODULE).unwrap().pipelines["p"];
    let ids: Vec<_> = pipeline.agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["sink_1", "explicit", "sink_2"]);
}

#[test]
fn test_auto_id_counter_is_per_document() {
    let a = "id: a\npipeline:\n  - type: source\n";
    let b = "id: b\npipeline:\n  - type: sink\n";
    let app = build(&[("a.yaml", a), ("b.yaml", b)]).unwrap();
    let module = app.module(DEFAULT_MODULE).unwrap();
    assert_eq!(module.pipelines["a"].agents[0].id, "source_1");
    assert_eq!(module.pipelines["b"].agents[0].id, "sink_1");
}

#[test]
fn test_chaining_wires_previous_agent_output() {
    let doc = r#"
pipeline:
  - id: a
    type: source
  - id: b
    type: drop-fields
  - id: c
    type: sink
"#;
    let app = build(&[("chain.yaml", doc)]).unwrap();
    let pipeline = &app.module(DEFAULT_MODULE).unwrap().pipelines["chain"];

    assert_eq!(pipeline.agents[0].output, Some(Connection::Agent("b".into())));
    assert_eq!(pipeline.agents[1].output, Some(Connection::Agent("c".into())));
    assert_eq!(pipeline.agents[2].output, None);
}

#[test]
fn test_explicit_output_is_not_overridden_by_chaining() {
    let app = build(&[("pipeline.yaml", PIPELINE)]).unwrap();
    let pipeline = &app.module("module-1").unwrap().pipelines["pipeline-1"];

    assert_eq!(
        pipeline.agents[0].output,
        Some(Connection::Agent("drop-fields_1".into()))
    );
    assert_eq!(
        pipeline.agents[1].output,
        Some(Connection::Agent("sink_1".into()))
    );
    assert_eq!(
        pipeline.agents[2].output,
        Some(Connection::Topic("output-topic".into()))
    );
}

#[test]
fn test_resources_default_and_explicit() {
    let app = build(&[("pipeline.yaml", PIPELINE)]).unwrap();
    let pipeline = &app.module("module-1").unwrap().pipelines["pipeline-1"];
    assert_eq!(pipeline.agents[0].resources, ResourcesSpec::default());
    assert_eq!(
        pipeline.agents[2].resources,
        ResourcesSpec {
            parallelism: 3,
            size: 2
        }
    );
}

#[test]
fn test_unresolved_input_fails() {
    let doc = r#"
pipeline:
  - type: sink
    input: unknown-topic
"#;
    let err = build(&[("p.yaml", doc)]).unwrap_err();
    match err {
        ParseError::UnresolvedReference { topic, agent, .. } => {
            assert_eq!(topic, "unknown-topic");
            assert_eq!(agent, "sink_1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_topic_from_earlier_document_resolves() {
    let topics = "id: topics\ntopics:\n  - name: shared\n";
    let consumer = "id: consumer\npipeline:\n  - type: sink\n    input: shared\n";
    let app = build(&[("a.yaml", topics), ("b.yaml", consumer)]).unwrap();
    let agent = &app.module(DEFAULT_MODULE).unwrap().pipelines["consumer"].agents[0];
    assert_eq!(agent.input, Some(Connection::Topic("shared".into())));
}

#[test]
fn test_conflicting_topic_definition_fails() {
    let a = "id: a\ntopics:\n  - name: t\n    creation-mode: none\n";
    let b = "id: b\ntopics:\n  - name: t\n    creation-mode: create-if-not-exists\n";
    let err = build(&[("a.yaml", a), ("b.yaml", b)]).unwrap_err();
    assert!(matches!(err, ParseError::ConflictingTopic { .. }));
}

#[test]
fn test_duplicate_agent_id_fails() {
    let doc = "pipeline:\n  - id: x\n    type: sink\n  - id: x\n    type: source\n";
    let err = build(&[("p.yaml", doc)]).unwrap_err();
    assert!(matches!(err, ParseError::DuplicateAgent { .. }));
}

#[test]
fn test_duplicate_pipeline_fails() {
    let doc = "id: same\npipeline: []\n";
    let err = build(&[("a.yaml", doc), ("b.yaml", doc)]).unwrap_err();
    assert!(matches!(err, ParseError::DuplicatePipeline { .. }));
}

#[test]
fn test_missing_agent_type_fails() {
    let doc = "pipeline:\n  - id: x\n";
    let err = build(&[("p.yaml", doc)]).unwrap_err();
    assert!(matches!(err, ParseError::MissingField { field: "type", .. }));
}

#[test]
fn test_malformed_document_fails() {
    let err = build(&[("p.yaml", "pipeline: [unterminated")]).unwrap_err();
    assert!(matches!(err, ParseError::Malformed { .. }));
}

#[test]
fn test_reserved_documents_merge_by_id() {
    let config_a = r#"
configuration:
  resources:
    - id: db
      type: datasource
      configuration:
        url: "jdbc:a"
"#;
    let config_b = r#"
configuration:
  resources:
    - id: db
      type: datasource
      configuration:
        url: "jdbc:b"
    - id: llm
      type: open-ai-configuration
"#;
    let secrets_a = "secrets:\n  - id: token\n    data:\n      value: one\n";
    let secrets_b = "secrets:\n  - id: other\n    data:\n      value: two\n";
    let instance = r#"
instance:
  streamingCluster:
    type: pulsar
    configuration:
      defaultTenant: public
  computeCluster:
    type: kubernetes
"#;
    let app = build(&[
        ("configuration.yaml", config_a),
        ("secrets.yaml", secrets_a),
        ("more/configuration.yaml", config_b),
        ("more/secrets.yaml", secrets_b),
        ("instance.yaml", instance),
    ])
    .unwrap();

    assert_eq!(app.resources.len(), 2);
    assert_eq!(
        app.resources["db"].configuration["url"],
        serde_json::json!("jdbc:b")
    );
    assert!(app.secrets.get("token").is_some());
    assert!(app.secrets.get("other").is_some());
    let instance = app.instance.unwrap();
    assert_eq!(instance.streaming_cluster.cluster_type, "pulsar");
    assert_eq!(
        instance.streaming_cluster.config_str("defaultTenant"),
        Some("public")
    );
}

#[test]
fn test_non_declarative_documents_are_ignored() {
    let app = build(&[("script.py", "print('x')"), ("README.md", "# hi")]).unwrap();
    assert_eq!(app, Application::default());
}

#[test]
fn test_build_is_deterministic() {
    let docs = [
        ("pipeline.yaml", PIPELINE),
        ("other.yaml", "pipeline:\n  - type: sink\n  - type: sink\n"),
    ];
    let first = build(&docs).unwrap();
    let second = build(&docs).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn test_build_from_directories_reads_sorted_files() {
    let app_dir = tempfile::tempdir().unwrap();
    let instance_dir = tempfile::tempdir().unwrap();

    std::fs::write(
        app_dir.path().join("a-topics.yaml"),
        "id: topics\ntopics:\n  - name: shared\n",
    )
    .unwrap();
    std::fs::write(
        app_dir.path().join("b-consumer.yaml"),
        "id: consumer\npipeline:\n  - type: sink\n    input: shared\n",
    )
    .unwrap();
    std::fs::write(app_dir.path().join("notes.txt"), "ignored").unwrap();
    std::fs::write(
        instance_dir.path().join("instance.yaml"),
        "instance:\n  streamingCluster:\n    type: kafka\n",
    )
    .unwrap();

    let app =
        ModelBuilder::build_from_directories(&[app_dir.path(), instance_dir.path()]).unwrap();
    let module = app.module(DEFAULT_MODULE).unwrap();
    assert!(module.pipelines.contains_key("consumer"));
    assert_eq!(
        app.instance.unwrap().streaming_cluster.cluster_type,
        "kafka"
    );
}

#[test]
fn test_build_from_missing_directory_fails() {
    let err = ModelBuilder::build_from_directories(&["/definitely/not/here"]).unwrap_err();
    assert!(matches!(err, ParseError::Io { .. }));
}
