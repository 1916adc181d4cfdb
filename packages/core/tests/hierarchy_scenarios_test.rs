//! Hierarchy Scenario Tests
//!
//! End-to-end structural editing against the in-memory store: every scenario
//! drives the public `OperationEngine` API and checks the reconstructed tree.

#[cfg(test)]
mod hierarchy_scenario_tests {
    use anyhow::Result;
    use nodespace_hierarchy::models::{Edge, NodeKind, ValidationError};
    use nodespace_hierarchy::{
        CreateNodeParams, DeletePolicy, EngineConfig, MemoryStore, MergeOutcome,
        OperationEngine, OperationError,
    };
    use std::sync::Arc;

    fn setup() -> (OperationEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = OperationEngine::new(store.clone(), EngineConfig::default());
        (engine, store)
    }

    /// Create root `R` (a date document) with the given top-level text nodes
    async fn document(engine: &OperationEngine, children: &[&str]) -> Result<()> {
        engine
            .create_node(CreateNodeParams::new(NodeKind::Date, "2025-01-03").with_id("R"))
            .await?;
        for id in children {
            add(engine, id, "R", NodeKind::Text, id).await?;
        }
        Ok(())
    }

    async fn add(
        engine: &OperationEngine,
        id: &str,
        parent: &str,
        kind: NodeKind,
        content: &str,
    ) -> Result<()> {
        engine
            .create_node(CreateNodeParams::new(kind, content).with_id(id).under(parent))
            .await?;
        Ok(())
    }

    async fn outline(engine: &OperationEngine) -> Result<String> {
        Ok(engine.get_all_nodes_for_root("R").await?.outline())
    }

    fn sorted_edges(store: &MemoryStore) -> Vec<Edge> {
        let mut edges = store.all_edges();
        edges.sort_by(|a, b| (&a.parent_id, &a.child_id).cmp(&(&b.parent_id, &b.child_id)));
        edges
    }

    #[tokio::test]
    async fn test_outdent_top_level_adopts_following_siblings() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A", "B", "C"]).await?;

        engine.outdent("B").await?;
        assert_eq!(outline(&engine).await?, "A, B{C}");
        assert_eq!(engine.index().get_depth("C").await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_outdent_last_top_level_node_changes_nothing() -> Result<()> {
        let (engine, store) = setup();
        document(&engine, &["A", "B"]).await?;
        let before = sorted_edges(&store);
        let writes = store.stats().writes;

        engine.outdent("B").await?;
        assert_eq!(sorted_edges(&store), before);
        assert_eq!(store.stats().writes, writes);
        assert_eq!(outline(&engine).await?, "A, B");
        Ok(())
    }

    #[tokio::test]
    async fn test_indent_then_outdent_adopts_following_siblings() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A", "B", "C"]).await?;

        engine.indent("B").await?;
        assert_eq!(outline(&engine).await?, "A{B}, C");

        engine.indent("C").await?;
        assert_eq!(outline(&engine).await?, "A{B, C}");

        engine.outdent("B").await?;
        assert_eq!(outline(&engine).await?, "A, B{C}");
        Ok(())
    }

    #[tokio::test]
    async fn test_indent_carries_subtree() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A", "B"]).await?;
        add(&engine, "B1", "B", NodeKind::Text, "B1").await?;

        engine.indent("B").await?;
        assert_eq!(outline(&engine).await?, "A{B{B1}}");
        assert_eq!(engine.index().get_depth("B1").await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_outdent_keeps_existing_children_first() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["P"]).await?;
        for id in ["X", "Y", "Z"] {
            add(&engine, id, "P", NodeKind::Text, id).await?;
        }
        add(&engine, "X1", "X", NodeKind::Text, "X1").await?;

        engine.outdent("X").await?;
        assert_eq!(outline(&engine).await?, "P, X{X1, Y, Z}");

        // A last child adopts nothing
        engine.outdent("Z").await?;
        assert_eq!(outline(&engine).await?, "P, X{X1, Y}, Z");
        Ok(())
    }

    #[tokio::test]
    async fn test_refused_operations_leave_tree_unchanged() -> Result<()> {
        let (engine, store) = setup();
        document(&engine, &["A", "B"]).await?;
        let before = sorted_edges(&store);

        let err = engine.indent("A").await.unwrap_err();
        assert_eq!(err, OperationError::no_preceding_sibling("A"));
        assert!(err.is_policy_violation());

        let err = engine.outdent("R").await.unwrap_err();
        assert_eq!(err, OperationError::no_parent("R"));
        assert!(err.is_policy_violation());

        assert_eq!(sorted_edges(&store), before);
        assert_eq!(outline(&engine).await?, "A, B");
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_into_code_block_is_skipped() -> Result<()> {
        let (engine, store) = setup();
        document(&engine, &[]).await?;
        add(&engine, "CODE", "R", NodeKind::CodeBlock, "```rust\nfn a() {}\n```").await?;
        add(&engine, "T", "R", NodeKind::Text, "tail").await?;

        let code_before = engine.get_node("CODE").await?;
        let text_before = engine.get_node("T").await?;
        let edges_before = sorted_edges(&store);

        assert_eq!(engine.merge_with_previous("T").await?, MergeOutcome::Skipped);

        assert_eq!(engine.get_node("CODE").await?, code_before);
        assert_eq!(engine.get_node("T").await?, text_before);
        assert_eq!(sorted_edges(&store), edges_before);
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_moves_content_and_children() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A", "B"]).await?;
        add(&engine, "A1", "A", NodeKind::Text, "A1").await?;
        add(&engine, "B1", "B", NodeKind::Text, "B1").await?;
        engine.update_content("A", "Hello").await?;
        engine.update_content("B", "World").await?;

        assert_eq!(engine.merge_with_previous("B").await?, MergeOutcome::Merged);

        assert_eq!(outline(&engine).await?, "HelloWorld{A1, B1}");
        assert!(engine.get_node("B").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_strips_syntax_across_kinds() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &[]).await?;
        add(&engine, "A", "R", NodeKind::Text, "Groceries: ").await?;
        add(&engine, "T", "R", NodeKind::Task, "- [ ] buy milk").await?;

        engine.merge_with_previous("T").await?;
        let merged = engine.get_node("A").await?.expect("merge target survives");
        assert_eq!(merged.content, "Groceries: buy milk");
        assert_eq!(merged.node_type, NodeKind::Text);
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_first_child_into_parent() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["P"]).await?;
        add(&engine, "X", "P", NodeKind::Text, "x").await?;
        add(&engine, "Y", "P", NodeKind::Text, "Y").await?;
        add(&engine, "X1", "X", NodeKind::Text, "X1").await?;

        assert_eq!(engine.merge_with_previous("X").await?, MergeOutcome::Merged);
        assert_eq!(outline(&engine).await?, "Px{X1, Y}");

        // First top-level node: the root never receives merges
        assert_eq!(engine.merge_with_previous("P").await?, MergeOutcome::Skipped);
        Ok(())
    }

    #[tokio::test]
    async fn test_split_then_merge_restores_content() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A", "B"]).await?;
        engine.update_content("A", "HelloWorld").await?;

        let tail = engine.split_at("A", 5).await?;
        assert_eq!(outline(&engine).await?, "Hello, World, B");
        let created = engine.get_node(&tail).await?.expect("split creates a node");
        assert_eq!(created.node_type, NodeKind::Text);

        engine.merge_with_previous(&tail).await?;
        assert_eq!(outline(&engine).await?, "HelloWorld, B");
        Ok(())
    }

    #[tokio::test]
    async fn test_split_counts_characters() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A"]).await?;
        engine.update_content("A", "héllo").await?;

        engine.split_at("A", 2).await?;
        assert_eq!(outline(&engine).await?, "hé, llo");

        let err = engine.split_at("A", 3).await.unwrap_err();
        assert_eq!(
            err,
            OperationError::Validation(ValidationError::InvalidOffset {
                node_id: "A".to_string(),
                offset: 3,
                length: 2,
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_split_at_end_creates_empty_sibling() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A"]).await?;
        add(&engine, "A1", "A", NodeKind::Text, "A1").await?;

        let tail = engine.split_at("A", 1).await?;
        let tree = engine.get_all_nodes_for_root("R").await?;
        let created = tree.find(&tail).expect("new sibling is in the tree");
        assert!(created.node.content.is_empty());
        assert!(created.children.is_empty());
        assert_eq!(tree.top_level()[0].children.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_cascade_delete_removes_subtree() -> Result<()> {
        let (engine, store) = setup();
        document(&engine, &["A", "B"]).await?;
        add(&engine, "A1", "A", NodeKind::Text, "A1").await?;
        add(&engine, "A2", "A1", NodeKind::Text, "A2").await?;

        engine.delete_node("A", DeletePolicy::Cascade).await?;

        assert_eq!(outline(&engine).await?, "B");
        for id in ["A", "A1", "A2"] {
            assert!(engine.get_node(id).await?.is_none());
        }
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.all_edges().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_promote_children_keeps_position() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A", "B", "C"]).await?;
        add(&engine, "B1", "B", NodeKind::Text, "B1").await?;
        add(&engine, "B2", "B", NodeKind::Text, "B2").await?;

        engine.delete_node("B", DeletePolicy::PromoteChildren).await?;
        assert_eq!(outline(&engine).await?, "A, B1, B2, C");
        Ok(())
    }

    #[tokio::test]
    async fn test_root_deletes() -> Result<()> {
        let (engine, store) = setup();
        document(&engine, &["A"]).await?;
        add(&engine, "A1", "A", NodeKind::Text, "A1").await?;

        let err = engine
            .delete_node("R", DeletePolicy::PromoteChildren)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Validation(ValidationError::InvalidDelete { .. })
        ));
        assert_eq!(store.node_count(), 3);

        engine.delete_node("R", DeletePolicy::Cascade).await?;
        assert_eq!(store.node_count(), 0);
        assert!(store.all_edges().is_empty());
        let err = engine.get_all_nodes_for_root("R").await.unwrap_err();
        assert_eq!(err, OperationError::node_not_found("R"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_parent_rejected_without_writes() -> Result<()> {
        let (engine, store) = setup();
        document(&engine, &["A"]).await?;

        let err = engine
            .create_node(
                CreateNodeParams::new(NodeKind::Text, "orphan")
                    .with_id("X")
                    .under("missing"),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::Validation(ValidationError::UnknownParent {
                parent_id: "missing".to_string()
            })
        );
        assert!(engine.get_node("X").await?.is_none());
        assert_eq!(store.node_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_child_id_rejected() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A"]).await?;

        let err = engine
            .create_node(CreateNodeParams::new(NodeKind::Text, "again").with_id("A").under("R"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::Validation(ValidationError::DuplicateId {
                id: "A".to_string()
            })
        );
        assert_eq!(outline(&engine).await?, "A");
        Ok(())
    }

    #[tokio::test]
    async fn test_documents_are_independent() -> Result<()> {
        let (engine, _store) = setup();
        document(&engine, &["A", "B"]).await?;
        engine
            .create_node(CreateNodeParams::new(NodeKind::Date, "2025-01-04").with_id("S"))
            .await?;
        add(&engine, "S1", "S", NodeKind::Text, "S1").await?;
        add(&engine, "S2", "S", NodeKind::Text, "S2").await?;

        engine.indent("S2").await?;
        assert_eq!(outline(&engine).await?, "A, B");
        assert_eq!(engine.get_all_nodes_for_root("S").await?.outline(), "S1{S2}");
        Ok(())
    }
}
