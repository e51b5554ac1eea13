use cjm_core::markup::markup_from_value;
use cjm_core::{GraphModel, Markup, ModelOptions};
use cjm_layout::{LayoutConfig, layout};
use cjm_render::import::import_elements;
use cjm_render::{
    Excalidraw, RawElement, RawKind, RenderOptions, SceneFormat, Unidraw, WarningKind,
    build_scene, import_document,
};
use serde_json::{Value, json};

fn render(markup: &Markup, format: &dyn SceneFormat, options: &ModelOptions) -> Value {
    render_laid_out(markup, format, options, &LayoutConfig::default())
}

fn render_laid_out(
    markup: &Markup,
    format: &dyn SceneFormat,
    options: &ModelOptions,
    config: &LayoutConfig,
) -> Value {
    let model = GraphModel::build(markup, options).unwrap();
    let plan = layout(&model, config);
    format.encode(&build_scene(&model, &plan, &RenderOptions::default()))
}

fn assert_round_trip(value: Value) {
    let markup = markup_from_value(value).unwrap();
    for format in [&Excalidraw as &dyn SceneFormat, &Unidraw] {
        let doc = render(&markup, format, &ModelOptions::default());
        let imported = import_document(&doc).unwrap();
        assert!(
            imported.report.is_clean(),
            "{}: {:?}",
            format.name(),
            imported.report
        );
        assert_eq!(
            imported.markup.normalized(),
            markup.normalized(),
            "{} round trip",
            format.name()
        );
    }
}

fn rich() -> Value {
    json!({
        "markup_type": "service",
        "finedog_unit_id": 42,
        "finedog_unit_meta": {"team_id": "t-1", "note": "imported from registry"},
        "service_name": "Loans",
        "team_id": 7,
        "team_name": "Credit",
        "procedure_graph": {"p1": ["p2"], "p2": ["p1"]},
        "procedure_meta": {"p1": {"team_name": "Credit", "color": "#ffeeaa"}},
        "procedures": [
            {
                "proc_id": "p1",
                "proc_name": "Intake",
                "start_block_ids": ["a", "z"],
                "end_block_ids": ["c::exit", "c", "d::postpone", "e::intermediate"],
                "branches": {"a": ["b", "c"], "b": ["d", "e"], "e": ["a"], "z": ["a"]},
                "block_id_to_block_name": {"a": "Apply", "c": "Close <now> & \"then\""}
            },
            {
                "proc_id": "p2",
                "start_block_ids": ["x"],
                "end_block_ids": ["y::turn_out"],
                "branches": {"x": ["w"]},
                "block_graph": {"x": ["y"], "y": ["c"]}
            },
            {"proc_id": "p3"}
        ]
    })
}

#[test]
fn intake_round_trips() {
    assert_round_trip(json!({
        "markup_type": "service",
        "procedures": [{
            "proc_id": "intake",
            "start_block_ids": ["a"],
            "end_block_ids": ["b::exit"],
            "branches": {"a": ["b"]}
        }]
    }));
}

#[test]
fn rich_document_round_trips() {
    assert_round_trip(rich());
}

#[test]
fn cycles_round_trip_as_plain_edges() {
    assert_round_trip(json!({
        "markup_type": "service",
        "procedures": [{
            "proc_id": "loop",
            "start_block_ids": ["a"],
            "branches": {"a": ["b"], "b": ["a", "b"]}
        }]
    }));
}

#[test]
fn implicit_procedure_links_stay_out_of_the_markup() {
    let sequential = json!({
        "markup_type": "service",
        "procedures": [
            {"proc_id": "p1", "start_block_ids": ["a"], "branches": {"a": ["b"]}},
            {"proc_id": "p2", "start_block_ids": ["c"]}
        ]
    });
    let derived = json!({
        "markup_type": "service",
        "procedures": [
            {"proc_id": "p1", "start_block_ids": ["a"], "block_graph": {"a": ["c"]}},
            {"proc_id": "p2", "start_block_ids": ["c"]}
        ]
    });
    for value in [sequential, derived] {
        let markup = markup_from_value(value).unwrap();
        let doc = render(&markup, &Excalidraw, &ModelOptions::default());
        let drawn = doc["elements"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["customData"]["cjm"]["edge_type"] == "procedure_graph")
            .count();
        assert_eq!(drawn, 1);

        let imported = import_document(&doc).unwrap();
        assert!(imported.report.is_clean(), "{:?}", imported.report);
        assert_eq!(imported.markup.procedure_graph, None);
        assert_eq!(imported.markup.normalized(), markup.normalized());
    }
}

#[test]
fn document_fields_come_back() {
    let markup = markup_from_value(rich()).unwrap();
    let doc = render(&markup, &Excalidraw, &ModelOptions::default());
    let imported = import_document(&doc).unwrap().markup;

    assert_eq!(imported.finedog_unit_id, markup.finedog_unit_id);
    assert_eq!(imported.team_id, markup.team_id);
    assert_eq!(imported.team_name.as_deref(), Some("Credit"));
    assert_eq!(imported.finedog_unit_meta, markup.finedog_unit_meta);
    assert_eq!(imported.procedure_ids(), vec!["p1", "p2", "p3"]);

    let p1 = imported.procedure("p1").unwrap();
    assert_eq!(p1.name.as_deref(), Some("Intake"));
    assert_eq!(p1.block_name("c"), Some("Close <now> & \"then\""));

    let p2 = imported.procedure("p2").unwrap();
    assert_eq!(
        p2.block_graph.as_ref().unwrap().get("y"),
        Some(&vec!["c".to_string()])
    );
    // Superseded branches travel on the frame.
    assert_eq!(p2.branches.get("x"), Some(&vec!["w".to_string()]));
}

#[test]
fn import_without_metadata_uses_geometry() {
    let markup = markup_from_value(json!({
        "markup_type": "service",
        "service_name": "Loans",
        "procedures": [{
            "proc_id": "intake",
            "proc_name": "Intake",
            "start_block_ids": ["a"],
            "end_block_ids": ["b::exit"],
            "branches": {"a": ["b"]}
        }]
    }))
    .unwrap();
    // Without metadata synthesized connectors and summary panels cannot be told apart, so
    // keep the scene free of them.
    let options = ModelOptions {
        implicit_turn_out: false,
    };
    let config = LayoutConfig {
        scenarios: false,
        separators: false,
        ..LayoutConfig::default()
    };
    for format in [&Excalidraw as &dyn SceneFormat, &Unidraw] {
        let mut doc = render_laid_out(&markup, format, &options, &config);
        for el in doc["elements"].as_array_mut().unwrap() {
            let obj = el.as_object_mut().unwrap();
            obj.remove("customData");
            obj.remove("cjm");
        }
        let imported = import_document(&doc).unwrap();
        assert!(imported.report.is_clean(), "{:?}", imported.report);
        assert_eq!(imported.markup.normalized(), markup.normalized());
    }
}

#[test]
fn legacy_procedure_edge_names_are_accepted() {
    let markup = markup_from_value(json!({
        "markup_type": "service",
        "procedure_graph": {"p1": ["p2"], "p2": ["p1"]},
        "procedures": [
            {"proc_id": "p1", "start_block_ids": ["a"]},
            {"proc_id": "p2", "start_block_ids": ["b"]}
        ]
    }))
    .unwrap();
    let mut doc = render(&markup, &Excalidraw, &ModelOptions::default());
    for el in doc["elements"].as_array_mut().unwrap() {
        let meta = &mut el["customData"]["cjm"];
        let legacy = match meta["edge_type"].as_str() {
            Some("procedure_graph") => "procedure_flow",
            Some("procedure_graph_cycle") => "procedure_cycle",
            _ => continue,
        };
        meta["edge_type"] = json!(legacy);
    }
    let imported = import_document(&doc).unwrap();
    assert!(imported.report.is_clean());
    assert_eq!(imported.markup.normalized(), markup.normalized());
}

#[test]
fn foreign_schema_versions_warn_once() {
    let markup = markup_from_value(json!({
        "markup_type": "service",
        "procedures": [{"proc_id": "p", "start_block_ids": ["a"], "branches": {"a": ["b"]}}]
    }))
    .unwrap();
    let mut doc = render(&markup, &Unidraw, &ModelOptions::default());
    for el in doc["elements"].as_array_mut().unwrap() {
        el["cjm"]["schema_version"] = json!("0.9");
        el["cjm"]["legacy_field"] = json!(true);
    }
    let imported = import_document(&doc).unwrap();
    assert_eq!(imported.report.count(WarningKind::SchemaVersion), 1);
    assert_eq!(imported.report.warnings.len(), 1);
    assert_eq!(imported.markup.normalized(), markup.normalized());
}

#[test]
fn unreadable_metadata_falls_back_to_geometry() {
    let markup = markup_from_value(json!({
        "markup_type": "service",
        "procedures": [{"proc_id": "p", "start_block_ids": ["a"]}]
    }))
    .unwrap();
    let mut doc = render(&markup, &Excalidraw, &ModelOptions::default());
    let block_id = cjm_render::build::block_id("p", "a").to_string();
    for el in doc["elements"].as_array_mut().unwrap() {
        if el["id"] == block_id.as_str() {
            el["customData"]["cjm"] = json!({"role": 12});
        }
    }
    let imported = import_document(&doc).unwrap();
    assert_eq!(imported.report.count(WarningKind::UnreadableMetadata), 1);
    assert_eq!(imported.markup.normalized(), markup.normalized());
}

#[test]
fn hand_drawn_elements_are_resolved_by_containment() {
    let frame = RawElement {
        name: Some("Intake (p1)".to_string()),
        ..RawElement::new("f1", RawKind::Frame)
    };
    let block = |id: &str| RawElement {
        frame_id: Some("f1".to_string()),
        ..RawElement::new(id, RawKind::Rectangle)
    };
    let label = |id: &str, container: &str, text: &str| RawElement {
        frame_id: Some("f1".to_string()),
        container_id: Some(container.to_string()),
        text: Some(text.to_string()),
        ..RawElement::new(id, RawKind::Text)
    };
    let free_text = RawElement {
        frame_id: Some("f1".to_string()),
        text: Some("Archive".to_string()),
        ..RawElement::new("t3", RawKind::Text)
    };
    let arrow = |id: &str, from: Option<&str>, to: Option<&str>| RawElement {
        start_binding: from.map(str::to_string),
        end_binding: to.map(str::to_string),
        ..RawElement::new(id, RawKind::Arrow)
    };

    let elements = vec![
        frame,
        block("r1"),
        label("t1", "r1", "Apply"),
        block("r2"),
        label("t2", "r2", "Check"),
        free_text,
        arrow("e1", Some("r1"), Some("r2")),
        arrow("e2", Some("r2"), Some("t3")),
        arrow("e3", None, Some("r2")),
        RawElement::new("d1", RawKind::Other("freedraw".to_string())),
    ];
    let imported = import_elements(&elements);

    let p1 = imported.markup.procedure("p1").unwrap();
    assert_eq!(p1.name.as_deref(), Some("Intake"));
    assert_eq!(p1.branches.get("Apply"), Some(&vec!["Check".to_string()]));
    assert_eq!(p1.branches.get("Check"), Some(&vec!["Archive".to_string()]));

    let report = &imported.report;
    assert_eq!(report.count(WarningKind::UnboundConnector), 1);
    assert_eq!(report.count(WarningKind::UnresolvedElement), 1);
    assert_eq!(report.warnings.len(), 2);
    assert_eq!(report.warnings[0].element_id, "d1");
}

#[test]
fn documents_without_elements_are_rejected() {
    assert!(import_document(&json!({"type": "excalidraw"})).is_err());
    assert!(import_document(&json!({"type": "svg", "elements": []})).is_err());
}

#[test]
fn untyped_documents_are_detected_by_shape() {
    let markup = markup_from_value(json!({
        "markup_type": "service",
        "procedures": [{"proc_id": "p", "start_block_ids": ["a"]}]
    }))
    .unwrap();
    let mut doc = render(&markup, &Unidraw, &ModelOptions::default());
    doc.as_object_mut().unwrap().remove("type");
    let imported = import_document(&doc).unwrap();
    assert_eq!(imported.markup.normalized(), markup.normalized());
}

#[test]
fn summary_panels_and_separators_are_not_markup() {
    let value = json!({
        "markup_type": "service",
        "procedure_graph": {"p1": ["p2"], "p3": ["p4"]},
        "procedures": [
            {"proc_id": "p1", "start_block_ids": ["a"], "branches": {"a": ["b"]}},
            {"proc_id": "p2", "start_block_ids": ["c"]},
            {"proc_id": "p3", "start_block_ids": ["d"]},
            {"proc_id": "p4", "start_block_ids": ["e"], "end_block_ids": ["e"]}
        ]
    });
    let markup = markup_from_value(value.clone()).unwrap();
    let doc = render(&markup, &Excalidraw, &ModelOptions::default());
    let decorations = doc["elements"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| {
            matches!(
                e["customData"]["cjm"]["role"].as_str(),
                Some(role) if role == "separator" || role.starts_with("scenario_")
            )
        })
        .count();
    assert_eq!(decorations, 11);
    assert_round_trip(value);
}
