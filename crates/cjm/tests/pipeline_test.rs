use cjm::layout::LayoutPlan;
use cjm::pipeline;
use cjm::ports::{
    DirectoryRepository, GridLayout, InMemoryRepository, MarkupRepository, SceneSerializer,
};
use cjm::render::{Excalidraw, SceneFormat, Unidraw};
use cjm::{CjmConfig, Converter, Error, GraphModel, MergeSelection, ModelOptions, parse_markup};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
}

fn read_fixture(name: &str) -> String {
    let path = fixtures_root().join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
}

fn roles(document: &Value, role: &str) -> usize {
    document["elements"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|el| {
            let meta = el.get("customData").map_or(&el["cjm"], |c| &c["cjm"]);
            meta["role"] == role
        })
        .count()
}

#[test]
fn intake_fixture_survives_the_round_trip() {
    let text = read_fixture("intake.json");
    let original = parse_markup(&text).unwrap();

    for converter in [
        Converter::default(),
        Converter::default().with_format(&Unidraw),
    ] {
        let scene = converter.convert_str(&text).unwrap();
        assert_eq!(scene["type"], converter.format.name());
        let imported = converter.import(&scene).unwrap();
        assert!(imported.report.is_clean(), "{:?}", imported.report);
        assert_eq!(imported.markup.normalized(), original.normalized());
    }
}

#[test]
fn directory_documents_merge_into_one_scene() {
    let repository = DirectoryRepository::new(fixtures_root().join("merge"));
    assert_eq!(repository.keys().unwrap(), vec!["team-a", "team-b"]);

    let merged = Converter::default()
        .merge(&repository, &MergeSelection::all())
        .unwrap();

    let chains: Vec<&[String]> = merged
        .outcome
        .merge_nodes
        .iter()
        .map(|n| n.procedure_ids.as_slice())
        .collect();
    assert_eq!(chains, vec![["p1", "p2", "p3"]]);
    assert_eq!(
        merged.outcome.merge_nodes[0].services,
        vec!["Team A::svc-a", "Team B::svc-b"]
    );
    assert_eq!(merged.outcome.markup.markup_type, "procedure_graph");

    let metrics = merged.metrics_json();
    for key in ["metrics", "merge_nodes", "elided"] {
        assert!(metrics.get(key).is_some(), "missing `{key}`");
    }
    assert_eq!(metrics["metrics"]["merge_node_count"], 1);
    assert!(roles(&merged.document, "frame") >= 1);
}

#[test]
fn service_level_merge_draws_one_frame_per_service_graph() {
    let config = CjmConfig::from_value(json!({"merge": {"graph_level": "service"}}));
    let converter = Converter::from_config(&config).unwrap();
    let repository = DirectoryRepository::new(fixtures_root().join("merge"));
    let merged = converter
        .merge(&repository, &MergeSelection::all())
        .unwrap();

    let markup = &merged.outcome.markup;
    assert_eq!(markup.markup_type, "service_graph");
    assert_eq!(
        markup.procedure_ids(),
        vec![
            "service::team_a::svc_a::graph::p1_p2_p3",
            "service::team_b::svc_b::graph::p1_p2_p3",
            "service::team_b::svc_b::graph::p4",
        ]
    );
    assert_eq!(roles(&merged.document, "frame"), 3);
    assert_eq!(roles(&merged.document, "block"), 0);
    assert_eq!(merged.metrics_json()["metrics"]["merge_node_count"], 1);
}

#[test]
fn selection_limits_the_merged_documents() {
    let a = parse_markup(&read_fixture("merge/team-a.json")).unwrap();
    let b = parse_markup(&read_fixture("merge/team-b.json")).unwrap();
    let repository = InMemoryRepository::from_markups([a, b]);
    assert_eq!(repository.len(), 2);

    let merged = Converter::default()
        .merge(&repository, &MergeSelection::only(["Team A::svc-a"]))
        .unwrap();
    // One selected service shares nothing with itself.
    assert!(merged.outcome.merge_nodes.is_empty());
    assert!(merged.outcome.markup.procedure("p4").is_none());
}

#[test]
fn config_picks_the_scene_format() {
    let config = CjmConfig::from_value(json!({
        "render": {"format": "Unidraw", "title": false},
        "model": {"implicit_turn_out": false}
    }));
    let converter = Converter::from_config(&config).unwrap();
    assert_eq!(converter.format.name(), "unidraw");
    assert!(!converter.render.title);
    assert!(!converter.model.implicit_turn_out);

    let scene = converter.convert_str(&read_fixture("intake.json")).unwrap();
    assert_eq!(scene["type"], "unidraw");
    assert_eq!(roles(&scene, "diagram_title"), 0);
}

#[test]
fn bad_config_fails_before_conversion() {
    let unknown = CjmConfig::from_value(json!({"render": {"format": "svg"}}));
    assert!(matches!(
        Converter::from_config(&unknown),
        Err(Error::Render(_))
    ));

    let negative = CjmConfig::from_value(json!({"layout": {"gap_x": -5}}));
    assert!(matches!(
        Converter::from_config(&negative),
        Err(Error::Core(_))
    ));
}

#[test]
fn invalid_markup_produces_no_scene() {
    let result = Converter::default().convert_str(
        r#"{"markup_type": "service", "procedures": [{"proc_id": "p"}, {"proc_id": "p"}]}"#,
    );
    assert!(matches!(result, Err(Error::Core(_))));
}

#[test]
fn missing_documents_are_reported_by_key() {
    let repository = InMemoryRepository::new();
    assert!(repository.is_empty());
    assert!(matches!(
        repository.load("nobody::nothing"),
        Err(Error::MissingMarkup { key }) if key == "nobody::nothing"
    ));

    let directory = DirectoryRepository::new(fixtures_root().join("merge"));
    assert!(matches!(
        directory.load("team-z"),
        Err(Error::MissingMarkup { .. })
    ));

    let absent = DirectoryRepository::new(fixtures_root().join("no-such-dir"));
    assert!(matches!(absent.keys(), Err(Error::Io { .. })));
}

/// Counts what it was asked to serialize instead of drawing it.
struct Census;

impl SceneSerializer for Census {
    fn format_name(&self) -> &str {
        "census"
    }

    fn serialize(&self, model: &GraphModel, plan: &LayoutPlan) -> Value {
        json!({
            "type": self.format_name(),
            "procedures": model.procedures.len(),
            "frames": plan.frames.len(),
        })
    }
}

#[test]
fn pipelines_accept_custom_ports() {
    let markup = parse_markup(&read_fixture("intake.json")).unwrap();
    let document = pipeline::forward(
        &markup,
        &ModelOptions::default(),
        &GridLayout::default(),
        &Census,
    )
    .unwrap();
    assert_eq!(document, json!({"type": "census", "procedures": 2, "frames": 2}));
}

#[test]
fn excalidraw_is_the_default_format() {
    let converter = Converter::new();
    assert_eq!(converter.format.name(), Excalidraw.name());
    assert_eq!(converter.serializer().format_name(), "excalidraw");
}
