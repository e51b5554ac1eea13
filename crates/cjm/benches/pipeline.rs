use cjm::ports::InMemoryRepository;
use cjm::render::Unidraw;
use cjm::{Converter, Markup, MergeSelection, parse_markup};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use serde_json::{Map, json};
use std::hint::black_box;

const INTAKE: &str = include_str!("../../../fixtures/intake.json");
const TEAM_A: &str = include_str!("../../../fixtures/merge/team-a.json");
const TEAM_B: &str = include_str!("../../../fixtures/merge/team-b.json");

/// One procedure of `blocks` blocks in a line, every fifth one branching back.
fn chain(blocks: usize) -> Markup {
    let ids: Vec<String> = (0..blocks).map(|i| format!("b{i}")).collect();
    let mut branches = Map::new();
    for (i, pair) in ids.windows(2).enumerate() {
        let mut targets = vec![pair[1].clone()];
        if i > 0 && i % 5 == 0 {
            targets.push(ids[i - 1].clone());
        }
        branches.insert(pair[0].clone(), json!(targets));
    }
    cjm::markup::markup_from_value(json!({
        "markup_type": "service",
        "service_name": "bench",
        "procedures": [{
            "proc_id": "chain",
            "start_block_ids": [ids[0]],
            "end_block_ids": [ids[blocks - 1]],
            "branches": branches
        }]
    }))
    .expect("chain markup")
}

fn bench_forward(c: &mut Criterion) {
    let excalidraw = Converter::default();
    let unidraw = Converter::default().with_format(&Unidraw);
    let intake = parse_markup(INTAKE).expect("intake fixture");
    let long = chain(200);

    let mut group = c.benchmark_group("forward");
    group.bench_function("intake_excalidraw", |b| {
        b.iter(|| excalidraw.convert(black_box(&intake)).expect("convert"));
    });
    group.bench_function("intake_unidraw", |b| {
        b.iter(|| unidraw.convert(black_box(&intake)).expect("convert"));
    });
    group.bench_function("parse_and_convert", |b| {
        b.iter(|| excalidraw.convert_str(black_box(INTAKE)).expect("convert"));
    });
    group.sample_size(30);
    group.bench_function("chain_200", |b| {
        b.iter(|| excalidraw.convert(black_box(&long)).expect("convert"));
    });
    group.finish();
}

fn bench_import(c: &mut Criterion) {
    let converter = Converter::default();
    let scene = converter
        .convert(&chain(200))
        .expect("convert chain");

    let mut group = c.benchmark_group("import");
    group.sample_size(30);
    group.bench_function("chain_200", |b| {
        b.iter(|| converter.import(black_box(&scene)).expect("import"));
    });
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let converter = Converter::default();
    let documents = vec![
        parse_markup(TEAM_A).expect("team a"),
        parse_markup(TEAM_B).expect("team b"),
    ];

    let mut group = c.benchmark_group("merge");
    group.bench_function("two_teams", |b| {
        b.iter_batched(
            || InMemoryRepository::from_markups(documents.clone()),
            |repository| {
                converter
                    .merge(&repository, &MergeSelection::all())
                    .expect("merge")
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_forward, bench_import, bench_merge);
criterion_main!(benches);
