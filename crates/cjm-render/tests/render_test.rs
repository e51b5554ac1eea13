use cjm_core::markup::markup_from_value;
use cjm_core::{CjmConfig, EndType, GraphModel, ModelOptions};
use cjm_layout::{LayoutConfig, layout};
use cjm_render::build::{block_id, end_marker_id, frame_id, start_marker_id};
use cjm_render::{
    Excalidraw, LinkTemplates, RenderOptions, SceneFormat, Unidraw, build_scene, format_named,
};
use serde_json::{Value, json};

fn render_with(value: Value, format: &dyn SceneFormat, options: &RenderOptions) -> Value {
    let markup = markup_from_value(value).unwrap();
    let model = GraphModel::build(&markup, &ModelOptions::default()).unwrap();
    let plan = layout(&model, &LayoutConfig::default());
    format.encode(&build_scene(&model, &plan, options))
}

fn render(value: Value, format: &dyn SceneFormat) -> Value {
    render_with(value, format, &RenderOptions::default())
}

fn intake() -> Value {
    json!({
        "markup_type": "service",
        "service_name": "Loans",
        "procedures": [{
            "proc_id": "intake",
            "start_block_ids": ["a"],
            "end_block_ids": ["b::exit"],
            "branches": {"a": ["b"]}
        }]
    })
}

fn elements(doc: &Value) -> &Vec<Value> {
    doc["elements"].as_array().unwrap()
}

fn by_id<'a>(doc: &'a Value, id: &str) -> &'a Value {
    elements(doc)
        .iter()
        .find(|e| e["id"] == id)
        .unwrap_or_else(|| panic!("no element {id}"))
}

fn meta(el: &Value) -> &Value {
    if el.get("customData").is_some() {
        &el["customData"]["cjm"]
    } else {
        &el["cjm"]
    }
}

fn with_role<'a>(doc: &'a Value, role: &str) -> Vec<&'a Value> {
    elements(doc)
        .iter()
        .filter(|e| meta(e)["role"] == role)
        .collect()
}

#[test]
fn intake_scene_has_every_element() {
    let doc = render(intake(), &Excalidraw);
    assert_eq!(doc["type"], "excalidraw");
    assert_eq!(doc["version"], 2);
    assert_eq!(doc["source"], "cjm-ui-convertor");
    assert!(doc["files"].is_object());

    assert_eq!(with_role(&doc, "frame").len(), 1);
    assert_eq!(with_role(&doc, "block").len(), 2);
    assert_eq!(with_role(&doc, "block_label").len(), 2);
    assert_eq!(with_role(&doc, "start_marker").len(), 1);
    // EXIT for `b`, implicit TURN OUT for the branch key `a`.
    assert_eq!(with_role(&doc, "end_marker").len(), 2);
    assert_eq!(with_role(&doc, "marker_label").len(), 3);
    assert_eq!(with_role(&doc, "edge").len(), 4);
    assert_eq!(with_role(&doc, "diagram_title").len(), 2);
    // One component: a summary panel with title, body and procedure list, no separator.
    for role in [
        "scenario_panel",
        "scenario_title",
        "scenario_body",
        "scenario_procedures_panel",
        "scenario_procedures",
    ] {
        assert_eq!(with_role(&doc, role).len(), 1, "{role}");
    }
    assert!(with_role(&doc, "scenario_cycle").is_empty());
    assert!(with_role(&doc, "separator").is_empty());
    assert_eq!(elements(&doc).len(), 22);

    let frame = by_id(&doc, &frame_id("intake").to_string());
    assert_eq!(frame["type"], "frame");
    assert_eq!(frame["name"], "intake");

    let title = elements(&doc)
        .iter()
        .find(|e| e["type"] == "text" && meta(e)["role"] == "diagram_title")
        .unwrap();
    assert_eq!(title["text"], "[service] Loans");
    assert_eq!(title["fontSize"], 36.0);
}

#[test]
fn excalidraw_puts_connectors_first() {
    let doc = render(intake(), &Excalidraw);
    let types: Vec<&str> = elements(&doc)
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert!(types[..4].iter().all(|t| *t == "arrow"));
    assert!(types[4..].iter().all(|t| *t != "arrow"));
}

#[test]
fn elements_carry_metadata() {
    let doc = render(intake(), &Excalidraw);
    let block = by_id(&doc, &block_id("intake", "b").to_string());
    let m = meta(block);
    assert_eq!(m["schema_version"], "1.0");
    assert_eq!(m["markup_type"], "service");
    assert_eq!(m["service_name"], "Loans");
    assert_eq!(m["procedure_id"], "intake");
    assert_eq!(m["block_id"], "b");
    assert_eq!(m["end_block_type"], "exit");
    assert_eq!(block["frameId"], frame_id("intake").to_string());

    let arrows: Vec<&Value> = elements(&doc).iter().filter(|e| e["type"] == "arrow").collect();
    let implicit: Vec<&Value> = arrows
        .iter()
        .copied()
        .filter(|a| meta(a)["implicit"] == true)
        .collect();
    assert_eq!(implicit.len(), 1);
    assert_eq!(meta(implicit[0])["end_type"], "turn_out");
    assert_eq!(meta(implicit[0])["source_block_id"], "a");

    let branch = arrows
        .iter()
        .find(|a| meta(a)["edge_type"] == "branch")
        .unwrap();
    assert_eq!(meta(branch)["source_block_id"], "a");
    assert_eq!(meta(branch)["target_block_id"], "b");
    assert_eq!(meta(branch)["target_procedure_id"], "intake");
    assert_eq!(branch["text"], "branch");
    assert!(meta(branch).get("implicit").is_none());
}

#[test]
fn connectors_bind_both_ends_and_shapes_link_back() {
    let doc = render(intake(), &Excalidraw);
    let a = block_id("intake", "a").to_string();
    let start = start_marker_id("intake", "a").to_string();

    let start_edge = elements(&doc)
        .iter()
        .find(|e| meta(e)["edge_type"] == "start")
        .unwrap();
    assert_eq!(start_edge["startBinding"]["elementId"], start.as_str());
    assert_eq!(start_edge["endBinding"]["elementId"], a.as_str());
    assert_eq!(start_edge["text"], "");
    assert_eq!(start_edge["label"], "start");

    let block = by_id(&doc, &a);
    let bound = block["boundElements"].as_array().unwrap();
    let bound_ids: Vec<&str> = bound.iter().map(|b| b["id"].as_str().unwrap()).collect();
    assert!(bound_ids.contains(&start_edge["id"].as_str().unwrap()));
    assert!(bound.iter().any(|b| b["type"] == "text"));
    // start in, branch out, implicit turn-out out.
    assert_eq!(bound.iter().filter(|b| b["type"] == "arrow").count(), 3);

    let exit = by_id(&doc, &end_marker_id("intake", EndType::Exit).to_string());
    assert_eq!(exit["type"], "ellipse");
    assert_eq!(exit["backgroundColor"], "#ffd8a8");
    assert_eq!(exit["strokeStyle"], "solid");
}

#[test]
fn cycles_are_dashed_red_and_labelled() {
    let doc = render(
        json!({
            "markup_type": "service",
            "procedures": [{
                "proc_id": "loop",
                "start_block_ids": ["a"],
                "branches": {"a": ["b"], "b": ["a"]}
            }]
        }),
        &Excalidraw,
    );
    let cycle = elements(&doc)
        .iter()
        .find(|e| meta(e)["edge_type"] == "branch_cycle")
        .unwrap();
    assert_eq!(meta(cycle)["source_block_id"], "b");
    assert_eq!(meta(cycle)["target_block_id"], "a");
    assert_eq!(cycle["strokeColor"], "#d32f2f");
    assert_eq!(cycle["strokeStyle"], "dashed");
    assert_eq!(cycle["text"], "branch_cycle");
    // Elbow route over the top of both blocks.
    assert_eq!(cycle["points"].as_array().unwrap().len(), 4);

    let forward = elements(&doc)
        .iter()
        .find(|e| meta(e)["edge_type"] == "branch")
        .unwrap();
    assert_eq!(forward["strokeStyle"], "solid");
    assert_eq!(forward["points"].as_array().unwrap().len(), 2);
}

#[test]
fn intermediate_end_markers_are_dashed() {
    let doc = render(
        json!({
            "markup_type": "service",
            "procedures": [{
                "proc_id": "p",
                "start_block_ids": ["a"],
                "end_block_ids": ["a::intermediate", "b"],
                "branches": {"a": ["b"]}
            }]
        }),
        &Excalidraw,
    );
    let marker = by_id(&doc, &end_marker_id("p", EndType::Intermediate).to_string());
    assert_eq!(marker["strokeStyle"], "dashed");
    let label = elements(&doc)
        .iter()
        .find(|e| e["containerId"] == marker["id"])
        .unwrap();
    assert_eq!(label["text"], "END & EXIT");

    // The intermediate block keeps its outgoing branch as well as its end connector.
    let from_a: Vec<&Value> = elements(&doc)
        .iter()
        .filter(|e| e["type"] == "arrow" && meta(e)["source_block_id"] == "a")
        .collect();
    assert!(from_a.iter().any(|e| meta(e)["edge_type"] == "branch"));
    assert!(
        from_a
            .iter()
            .any(|e| meta(e)["edge_type"] == "end" && meta(e)["end_type"] == "intermediate")
    );
}

#[test]
fn explicit_procedure_links_are_drawn() {
    let doc = render(
        json!({
            "markup_type": "service",
            "procedure_graph": {"p1": ["p2"], "p2": ["p1"]},
            "procedures": [
                {"proc_id": "p1", "proc_name": "First", "start_block_ids": ["a"]},
                {"proc_id": "p2", "start_block_ids": ["b"]}
            ]
        }),
        &Excalidraw,
    );
    let links: Vec<&Value> = elements(&doc)
        .iter()
        .filter(|e| {
            matches!(
                meta(e)["edge_type"].as_str(),
                Some("procedure_graph" | "procedure_graph_cycle")
            )
        })
        .collect();
    assert_eq!(links.len(), 2);
    let cycle = links
        .iter()
        .find(|l| meta(l)["edge_type"] == "procedure_graph_cycle")
        .unwrap();
    assert_eq!(meta(cycle)["procedure_id"], "p2");
    assert_eq!(meta(cycle)["target_procedure_id"], "p1");
    assert_eq!(cycle["strokeWidth"], 2.0);
    assert_eq!(cycle["startBinding"]["elementId"], frame_id("p2").to_string());

    let first = by_id(&doc, &frame_id("p1").to_string());
    assert_eq!(first["name"], "First (p1)");
    assert_eq!(meta(first)["procedure_name"], "First");
}

#[test]
fn sequential_procedure_order_is_drawn_as_implicit_links() {
    let doc = render(
        json!({
            "markup_type": "service",
            "procedures": [
                {"proc_id": "p1", "start_block_ids": ["a"]},
                {"proc_id": "p2", "start_block_ids": ["b"]}
            ]
        }),
        &Excalidraw,
    );
    let links: Vec<&Value> = elements(&doc)
        .iter()
        .filter(|e| meta(e)["edge_type"] == "procedure_graph")
        .collect();
    assert_eq!(links.len(), 1);
    assert_eq!(meta(links[0])["procedure_id"], "p1");
    assert_eq!(meta(links[0])["target_procedure_id"], "p2");
    assert_eq!(meta(links[0])["implicit"], true);
    assert_eq!(links[0]["startBinding"]["elementId"], frame_id("p1").to_string());
    assert_eq!(links[0]["endBinding"]["elementId"], frame_id("p2").to_string());

    let starts = with_role(&doc, "marker_label");
    let captions: Vec<&str> = starts
        .iter()
        .filter(|e| meta(e).get("block_id").is_some())
        .map(|e| e["text"].as_str().unwrap())
        .collect();
    assert_eq!(captions, vec!["START #1", "START #2"]);
}

#[test]
fn cross_procedure_branches_link_their_frames() {
    let doc = render(
        json!({
            "markup_type": "service",
            "procedures": [
                {"proc_id": "p1", "start_block_ids": ["a"], "branches": {"a": ["b"]}},
                {"proc_id": "p2", "start_block_ids": ["b"], "block_graph": {"b": ["c"]}},
                {"proc_id": "p3", "start_block_ids": ["c"]}
            ]
        }),
        &Excalidraw,
    );
    let links: Vec<(&Value, &Value)> = elements(&doc)
        .iter()
        .filter(|e| meta(e)["edge_type"] == "procedure_graph")
        .map(|e| (&meta(e)["procedure_id"], &meta(e)["target_procedure_id"]))
        .collect();
    assert_eq!(links, vec![(&json!("p2"), &json!("p3"))]);
    assert!(
        elements(&doc)
            .iter()
            .filter(|e| meta(e)["edge_type"] == "procedure_graph")
            .all(|e| meta(e)["implicit"] == true)
    );
}

#[test]
fn scene_is_centred_on_the_first_frame() {
    let doc = render(intake(), &Excalidraw);
    let frame = by_id(&doc, &frame_id("intake").to_string());
    let cx = frame["x"].as_f64().unwrap() + frame["width"].as_f64().unwrap() / 2.0;
    let cy = frame["y"].as_f64().unwrap() + frame["height"].as_f64().unwrap() / 2.0;
    assert_eq!((cx, cy), (0.0, 0.0));
}

#[test]
fn output_is_byte_identical_across_runs() {
    for format in [&Excalidraw as &dyn SceneFormat, &Unidraw] {
        let first = serde_json::to_string(&render(intake(), format)).unwrap();
        let second = serde_json::to_string(&render(intake(), format)).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn seeds_come_from_element_ids() {
    let doc = render(intake(), &Excalidraw);
    let id = block_id("intake", "a");
    let block = by_id(&doc, &id.to_string());
    assert_eq!(block["seed"], id.seed());
    assert_eq!(block["versionNonce"], id.version_nonce());
    assert_ne!(block["seed"], 0);
}

#[test]
fn unidraw_uses_its_own_shape_vocabulary() {
    let doc = render(intake(), &Unidraw);
    assert_eq!(doc["type"], "unidraw");
    assert_eq!(doc["version"], 1);

    let a = block_id("intake", "a").to_string();
    let block = by_id(&doc, &a);
    assert_eq!(block["type"], "shape");
    assert_eq!(block["shape"], "rectangle");
    assert!(block["position"]["x"].is_number());
    assert_eq!(block["size"]["width"], 260.0);
    assert_eq!(block["style"]["fc"], "#d3f9d8");
    assert_eq!(meta(block)["block_id"], "a");

    let marker = by_id(&doc, &start_marker_id("intake", "a").to_string());
    assert_eq!(marker["shape"], "ellipse");

    let label = elements(&doc)
        .iter()
        .find(|e| e["type"] == "text" && e["containerId"] == a.as_str())
        .unwrap();
    assert_eq!(label["text"], "<p>a</p>");
    assert_eq!(label["style"]["tff"], "Virgil");

    let z: Vec<u64> = elements(&doc)
        .iter()
        .map(|e| e["zIndex"].as_u64().unwrap())
        .collect();
    assert_eq!(z, (1..=z.len() as u64).collect::<Vec<_>>());
}

#[test]
fn unidraw_connectors_bind_through_tip_points() {
    let doc = render(intake(), &Unidraw);
    let branch = elements(&doc)
        .iter()
        .find(|e| meta(e)["edge_type"] == "branch")
        .unwrap();
    assert_eq!(branch["type"], "line");
    assert_eq!(branch["lineType"], "arrow");
    assert_eq!(branch["text"], "<p>branch</p>");
    let tips = branch["tipPoints"].as_array().unwrap();
    assert_eq!(tips.len(), 2);
    assert_eq!(
        tips[0]["binding"]["elementId"],
        block_id("intake", "a").to_string()
    );
    assert_eq!(
        tips[1]["binding"]["elementId"],
        block_id("intake", "b").to_string()
    );
    // Straight, left to right.
    assert_eq!(tips[1]["normal"]["x"], 1.0);
    assert_eq!(tips[0]["normal"]["x"], -1.0);
}

#[test]
fn long_names_shrink_and_wrap() {
    let name = "Collect every document the applicant uploaded and check signatures";
    let doc = render(
        json!({
            "markup_type": "service",
            "procedures": [{
                "proc_id": "p",
                "start_block_ids": ["a"],
                "block_id_to_block_name": {"a": name}
            }]
        }),
        &Excalidraw,
    );
    let label = with_role(&doc, "block_label")[0];
    let text = label["text"].as_str().unwrap();
    assert!(text.contains('\n'));
    assert_eq!(text.replace('\n', " "), name);
    let size = label["fontSize"].as_f64().unwrap();
    assert!((11.0..=20.0).contains(&size));
    assert_eq!(label["originalText"], label["text"]);
}

#[test]
fn merged_frames_use_the_procedure_colour() {
    let doc = render(
        json!({
            "markup_type": "procedure_graph",
            "procedure_meta": {"p": {"team_name": "Credit", "color": "#ffeeaa", "is_intersection": true}},
            "procedures": [{"proc_id": "p", "start_block_ids": ["a"]}]
        }),
        &Excalidraw,
    );
    let frame = by_id(&doc, &frame_id("p").to_string());
    assert_eq!(frame["backgroundColor"], "#ffeeaa");
    assert_eq!(meta(frame)["procedure_meta"]["team_name"], "Credit");
    assert_eq!(meta(frame)["procedure_meta"]["is_intersection"], true);
}

#[test]
fn render_options_follow_config() {
    let mut config = CjmConfig::default();
    config.set_value("render.title", json!(false));
    config.set_value("render.block_font_size", json!(16));
    let options = RenderOptions::from_config(&config).unwrap();
    assert!(!options.title);
    assert_eq!(options.block_font_size, 16.0);
    assert_eq!(options.marker_font_size, 20.0);

    let doc = render_with(intake(), &Excalidraw, &options);
    assert!(with_role(&doc, "diagram_title").is_empty());
    assert_eq!(with_role(&doc, "block_label")[0]["fontSize"], 16.0);

    config.set_value("render.min_font_size", json!(18));
    assert!(RenderOptions::from_config(&config).is_err());

    let mut bad = CjmConfig::default();
    bad.set_value("render.marker_font_size", json!("big"));
    assert!(RenderOptions::from_config(&bad).is_err());
}

#[test]
fn formats_are_found_by_name() {
    assert_eq!(format_named("Excalidraw").unwrap().name(), "excalidraw");
    assert_eq!(format_named(" unidraw ").unwrap().name(), "unidraw");
    assert!(matches!(
        format_named("svg"),
        Err(cjm_render::Error::UnsupportedFormat { .. })
    ));
}

fn two_components() -> Value {
    json!({
        "markup_type": "service",
        "procedure_graph": {"p1": ["p2"], "p3": ["p4"]},
        "procedures": [
            {"proc_id": "p1", "start_block_ids": ["a"], "branches": {"a": ["b"]}},
            {"proc_id": "p2", "start_block_ids": ["c"]},
            {"proc_id": "p3", "start_block_ids": ["d"]},
            {"proc_id": "p4", "start_block_ids": ["e"], "end_block_ids": ["e"]}
        ]
    })
}

#[test]
fn components_get_separators_and_summary_panels() {
    let doc = render(two_components(), &Excalidraw);
    let separators = with_role(&doc, "separator");
    assert_eq!(separators.len(), 1);
    let separator = separators[0];
    assert_eq!(separator["type"], "line");
    assert_eq!(separator["strokeStyle"], "dashed");
    assert_eq!(separator["strokeColor"], "#9e9e9e");
    assert_eq!(separator["points"].as_array().unwrap().len(), 2);
    assert_eq!(meta(separator)["separator_index"], 0);
    assert!(separator["startBinding"].is_null());

    let titles = with_role(&doc, "scenario_title");
    let numbered: Vec<(&Value, &Value)> = titles
        .iter()
        .map(|t| (&t["text"], &meta(t)["scenario_index"]))
        .collect();
    assert_eq!(
        numbered,
        vec![(&json!("Graph 1"), &json!(1)), (&json!("Graph 2"), &json!(2))]
    );
    for title in &titles {
        assert_eq!(title["textAlign"], "left");
        assert!(title["containerId"].is_null());
        assert!(title["frameId"].is_null());
    }

    let lists: Vec<&str> = with_role(&doc, "scenario_procedures")
        .iter()
        .map(|e| e["text"].as_str().unwrap())
        .collect();
    assert_eq!(lists, vec!["Procedures:\n- p1\n- p2", "Procedures:\n- p3\n- p4"]);

    // Panel, title, body, procedure panel and procedure list share one group per component.
    let first: Vec<&Value> = elements(&doc)
        .iter()
        .filter(|e| meta(e)["scenario_index"] == 1)
        .collect();
    assert_eq!(first.len(), 5);
    let group = &first[0]["groupIds"];
    assert!(first.iter().all(|e| &e["groupIds"] == group));

    // Panels sit left of the procedures they describe.
    let panel = with_role(&doc, "scenario_panel")[0];
    let frame = by_id(&doc, &frame_id("p1").to_string());
    let panel_right = panel["x"].as_f64().unwrap() + panel["width"].as_f64().unwrap();
    assert!(panel_right < frame["x"].as_f64().unwrap());
}

#[test]
fn unidraw_draws_separators_as_plain_lines() {
    let doc = render(two_components(), &Unidraw);
    let separator = with_role(&doc, "separator")[0];
    assert_eq!(separator["type"], "line");
    assert_eq!(separator["lineType"], "line");
    assert!(separator.get("tipPoints").is_none());
    assert_eq!(separator["style"]["ss"], "dashed");

    let body = with_role(&doc, "scenario_body")[0];
    assert_eq!(body["style"]["ta"], "left");
    assert!(body["text"].as_str().unwrap().starts_with("<p>"));
}

#[test]
fn cyclic_components_get_a_cycle_line() {
    let doc = render(
        json!({
            "markup_type": "service",
            "procedure_graph": {"p1": ["p2"], "p2": ["p1"]},
            "procedures": [
                {"proc_id": "p1", "start_block_ids": ["a"]},
                {"proc_id": "p2", "start_block_ids": ["b"]}
            ]
        }),
        &Excalidraw,
    );
    let cycles = with_role(&doc, "scenario_cycle");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0]["text"], "- cyclic, cycles: 1");
    assert_eq!(cycles[0]["strokeColor"], "#d32f2f");
}

#[test]
fn link_templates_reach_frames_and_blocks() {
    let options = RenderOptions {
        links: LinkTemplates {
            procedure: Some("https://wiki.local/proc/%7Bprocedure_id%7D".to_string()),
            block: Some("https://wiki.local/{procedure_id}/{block_id}?v={{1}}".to_string()),
        },
        ..RenderOptions::default()
    };
    for format in [&Excalidraw as &dyn SceneFormat, &Unidraw] {
        let doc = render_with(intake(), format, &options);
        let frame = by_id(&doc, &frame_id("intake").to_string());
        assert_eq!(frame["link"], "https://wiki.local/proc/intake");
        let block = by_id(&doc, &block_id("intake", "a").to_string());
        assert_eq!(block["link"], "https://wiki.local/intake/a?v={1}");
        for label in with_role(&doc, "block_label") {
            assert!(label["link"].as_str().unwrap().starts_with("https://wiki.local/intake/"));
        }
        let marker = by_id(&doc, &start_marker_id("intake", "a").to_string());
        assert!(marker.get("link").is_none_or(Value::is_null));
    }
}

#[test]
fn link_templates_come_from_config() {
    let mut config = CjmConfig::default();
    config.set_value("render.links.block", json!("https://wiki.local/{block_id}"));
    let options = RenderOptions::from_config(&config).unwrap();
    assert_eq!(options.links.procedure, None);

    let doc = render_with(intake(), &Excalidraw, &options);
    let frame = by_id(&doc, &frame_id("intake").to_string());
    assert!(frame["link"].is_null());
    let block = by_id(&doc, &block_id("intake", "b").to_string());
    assert_eq!(block["link"], "https://wiki.local/b");
}
