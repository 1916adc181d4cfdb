//! Performance benchmarks for the hierarchy engine
//!
//! Run with: `cargo bench -p nodespace-hierarchy`
//!
//! These benchmarks measure critical path performance:
//! - Tree reconstruction from flat nodes and edges (`build_tree`)
//! - Child creation throughput under one root
//! - Indent/outdent round trips on a loaded document
//! - Bulk reads of a 1000-node document

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nodespace_hierarchy::models::{Edge, Node, NodeKind};
use nodespace_hierarchy::services::build_tree;
use nodespace_hierarchy::{CreateNodeParams, EngineConfig, MemoryStore, OperationEngine};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn text(id: String, content: &str) -> Node {
    Node::new_with_id(id, NodeKind::Text, content.to_string(), Default::default())
}

/// Flat records for a document of `sections` top-level nodes with
/// `per_section` children each
fn generate_document(sections: usize, per_section: usize) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = vec![text("root".to_string(), "2025-01-03")];
    let mut edges = Vec::new();
    let mut previous_section: Option<String> = None;

    for s in 0..sections {
        let section = format!("s{}", s);
        nodes.push(text(section.clone(), "Section"));
        edges.push(Edge::new(
            "root".to_string(),
            section.clone(),
            previous_section.replace(section.clone()),
        ));

        let mut previous_child: Option<String> = None;
        for c in 0..per_section {
            let child = format!("s{}c{}", s, c);
            nodes.push(text(child.clone(), "Paragraph"));
            edges.push(Edge::new(
                section.clone(),
                child.clone(),
                previous_child.replace(child),
            ));
        }
    }

    // Store order is arbitrary
    edges.reverse();
    (nodes, edges)
}

async fn seeded_engine(sections: usize, per_section: usize) -> OperationEngine {
    let engine = OperationEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
    engine
        .create_node(CreateNodeParams::new(NodeKind::Date, "2025-01-03").with_id("root"))
        .await
        .unwrap();
    for s in 0..sections {
        let section = format!("s{}", s);
        engine
            .create_node(
                CreateNodeParams::new(NodeKind::Text, "Section")
                    .with_id(section.clone())
                    .under("root"),
            )
            .await
            .unwrap();
        for _ in 0..per_section {
            engine
                .create_node(CreateNodeParams::new(NodeKind::Text, "Paragraph").under(&section))
                .await
                .unwrap();
        }
    }
    engine
}

/// Benchmark tree reconstruction of a 1000-node document
fn bench_build_tree(c: &mut Criterion) {
    let (nodes, edges) = generate_document(100, 9);

    c.bench_function("build_tree_1000_nodes", |b| {
        b.iter(|| {
            let tree = build_tree("root", black_box(nodes.clone()), black_box(&edges)).unwrap();
            black_box(tree.to_tree());
        });
    });
}

/// Benchmark child creation under one root
///
/// Each create resolves the root, plans one node insert and one edge write,
/// and commits them in a single transaction.
fn bench_create_children(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("create_child_node", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let engine = seeded_engine(0, 0).await;

                let start = std::time::Instant::now();
                for i in 0..iters {
                    engine
                        .create_node(
                            CreateNodeParams::new(NodeKind::Text, format!("Child{}", i))
                                .under("root"),
                        )
                        .await
                        .unwrap();
                }
                start.elapsed()
            })
        });
    });
}

/// Benchmark an indent/outdent round trip in a 100-node document
fn bench_indent_outdent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(seeded_engine(10, 9));

    c.bench_function("indent_outdent_cycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.indent("s5").await.unwrap();
                engine.outdent("s5").await.unwrap();
            })
        });
    });
}

/// Benchmark the bulk read of a 1000-node document
fn bench_bulk_read(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("bulk_read");
    group.sample_size(20);

    let engine = rt.block_on(seeded_engine(100, 9));
    group.bench_function("1000_nodes", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(engine.get_all_nodes_for_root("root").await.unwrap());
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_build_tree,
    bench_create_children,
    bench_indent_outdent,
    bench_bulk_read
);
criterion_main!(benches);
