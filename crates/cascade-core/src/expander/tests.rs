
    use super::*;
    use crate::types::{QueryContext, QueryMode};
    use serde_json::json;

    fn response_for(query: &str, payload: serde_json::Value) -> AgentResponse {
        AgentResponse::new(query, "content").with_payload(payload)
    }

    fn mock_proposing(proposals: Vec<&'static str>) -> Arc<dyn FollowUpDetector> {
        let mut detector = MockFollowUpDetector::new();
        detector
            .expect_analyze()
            .returning(move |_| proposals.iter().map(|s| s.to_string()).collect());
        Arc::new(detector)
    }

    #[test]
    fn test_marker_detector_next_page() {
        let detector = MarkerDetector;
        let response = response_for("sales report", json!({"pagination": {"next_page": 2}}));
        assert_eq!(detector.analyze(&response), vec!["sales report page 2"]);

        let flat = response_for("sales report", json!({"next_page": 3}));
        assert_eq!(detector.analyze(&flat), vec!["sales report page 3"]);
    }

    #[test]
    fn test_marker_detector_replaces_page_suffix() {
        let detector = MarkerDetector;
        let response = response_for(
            "sales report page 2",
            json!({"pagination": {"page": 2, "has_more": true}}),
        );
        assert_eq!(detector.analyze(&response), vec!["sales report page 3"]);

        let last = response_for(
            "sales report page 3",
            json!({"pagination": {"page": 3, "has_more": false}}),
        );
        assert!(detector.analyze(&last).is_empty());
    }

    #[test]
    fn test_marker_detector_follow_ups() {
        let detector = MarkerDetector;
        let response = response_for(
            "sales report",
            json!({"follow_ups": ["revenue by region", 42, "top customers"]}),
        );
        assert_eq!(
            detector.analyze(&response),
            vec!["revenue by region", "top customers"]
        );
        assert!(detector.analyze(&AgentResponse::new("q", "plain")).is_empty());
        assert!(NoFollowUps.analyze(&response).is_empty());
    }

    #[test]
    fn test_expand_pushes_children_onto_stack() {
        let expander = FollowUpExpander::new(mock_proposing(vec!["d1", "d2"]), None);
        let mut scheduler = Scheduler::new(3);
        let root = QueryRequest::batch("root", QueryContext::new().with_conversation("c1"));
        expander.track_root(root.root_id);
        scheduler.enqueue_batch(QueryRequest::batch("b1", QueryContext::new()));

        let outcome = expander.expand(&root, &AgentResponse::new("root", "x"), &mut scheduler);

        assert_eq!(outcome.scheduled.len(), 2);
        assert!(outcome.rejected.is_empty());
        assert_eq!(scheduler.stacked_len(), 2);
        assert_eq!(expander.derived_count(root.root_id), 2);

        let d2 = scheduler.next().unwrap();
        assert_eq!(d2.text, "d2");
        assert_eq!(d2.mode, QueryMode::Recursive);
        assert_eq!(d2.depth, 1);
        assert_eq!(d2.parent_id, Some(root.id));
        assert_eq!(d2.root_id, root.id);
        assert_eq!(d2.context.conversation_id.as_deref(), Some("c1"));
        assert_eq!(scheduler.next().unwrap().text, "d1");
        assert_eq!(scheduler.next().unwrap().text, "b1");
    }

    #[test]
    fn test_expand_drops_self_and_duplicate_proposals() {
        let expander = FollowUpExpander::new(
            mock_proposing(vec!["Root", "", "d1", "D1 ", "d2"]),
            None,
        );
        let mut scheduler = Scheduler::new(3);
        let root = QueryRequest::batch("root", QueryContext::new());

        let outcome = expander.expand(&root, &AgentResponse::new("root", "x"), &mut scheduler);

        assert_eq!(outcome.scheduled.len(), 2);
        assert_eq!(scheduler.next().unwrap().text, "d2");
        assert_eq!(scheduler.next().unwrap().text, "d1");
    }

    #[test]
    fn test_expand_respects_depth_guard() {
        let expander = FollowUpExpander::new(mock_proposing(vec!["deeper"]), None);
        let mut scheduler = Scheduler::new(1);
        let root = QueryRequest::batch("root", QueryContext::new());
        let child = root.derive("child");

        let outcome = expander.expand(&child, &AgentResponse::new("child", "x"), &mut scheduler);

        assert!(outcome.scheduled.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        let (rejected, err) = &outcome.rejected[0];
        assert_eq!(rejected.depth, 2);
        assert_eq!(
            *err,
            QueryError::DepthExceeded {
                depth: 2,
                max_depth: 1
            }
        );
        assert_eq!(scheduler.stacked_len(), 0);
    }

    #[test]
    fn test_expand_respects_root_budget() {
        let expander = FollowUpExpander::new(mock_proposing(vec!["a", "b", "c"]), Some(2));
        let mut scheduler = Scheduler::new(5);
        let root = QueryRequest::batch("root", QueryContext::new());
        expander.track_root(root.root_id);

        let outcome = expander.expand(&root, &AgentResponse::new("root", "x"), &mut scheduler);

        assert_eq!(outcome.scheduled.len(), 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(matches!(
            outcome.rejected[0].1,
            QueryError::ExpansionLimitExceeded { limit: 2, .. }
        ));

        // The budget is per root: grandchild proposals are suppressed too
        let child = scheduler.next().unwrap();
        assert_eq!(child.text, "b");
        let outcome = expander.expand(&child, &AgentResponse::new("b", "x"), &mut scheduler);
        assert!(outcome.scheduled.is_empty());
        // "b" is the child's own query and is dropped before the budget check
        assert_eq!(outcome.rejected.len(), 2);
    }

    #[test]
    fn test_settle_forgets_finished_roots() {
        let expander = FollowUpExpander::new(mock_proposing(vec!["d1"]), None);
        let mut scheduler = Scheduler::new(3);
        let root = QueryRequest::batch("root", QueryContext::new());
        expander.track_root(root.root_id);

        expander.expand(&root, &AgentResponse::new("root", "x"), &mut scheduler);
        expander.settle(&root);
        assert_eq!(expander.tracked_roots(), 1);

        let child = scheduler.next().unwrap();
        expander.settle(&child);
        assert_eq!(expander.tracked_roots(), 0);
        assert_eq!(expander.derived_count(root.root_id), 0);
    }

    #[test]
    fn test_no_proposals_is_a_no_op() {
        let mut detector = MockFollowUpDetector::new();
        detector.expect_analyze().times(1).returning(|_| Vec::new());
        let expander = FollowUpExpander::new(Arc::new(detector), Some(1));
        let mut scheduler = Scheduler::new(3);
        let root = QueryRequest::batch("root", QueryContext::new());

        let outcome = expander.expand(&root, &AgentResponse::new("root", "x"), &mut scheduler);

        assert!(outcome.scheduled.is_empty());
        assert!(outcome.rejected.is_empty());
        assert!(scheduler.is_idle());
    }
