
    use super::*;
    use crate::types::QueryContext;

    fn batch(text: &str) -> QueryRequest {
        QueryRequest::batch(text, QueryContext::new())
    }

    fn texts(scheduler: &mut Scheduler) -> Vec<String> {
        std::iter::from_fn(|| scheduler.next()).map(|r| r.text).collect()
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut scheduler = Scheduler::new(3);
        scheduler.enqueue_batch(batch("b1"));
        scheduler.enqueue_batch(batch("b2"));
        scheduler.enqueue_batch(batch("b3"));

        assert_eq!(texts(&mut scheduler), vec!["b1", "b2", "b3"]);
    }

    #[test]
    fn test_stack_has_priority_and_is_lifo() {
        let mut scheduler = Scheduler::new(3);
        let root = batch("root");
        scheduler.enqueue_batch(batch("b1"));
        scheduler.push_recursive(root.derive("d1")).unwrap();
        scheduler.push_recursive(root.derive("d2")).unwrap();

        assert_eq!(texts(&mut scheduler), vec!["d2", "d1", "b1"]);
    }

    #[test]
    fn test_stack_pushed_mid_drain_runs_before_queue() {
        let mut scheduler = Scheduler::new(3);
        scheduler.enqueue_batch(batch("b1"));
        scheduler.enqueue_batch(batch("b2"));

        let first = scheduler.next().unwrap();
        assert_eq!(first.text, "b1");
        scheduler.push_recursive(first.derive("b1 follow-up")).unwrap();
        scheduler.complete();

        assert_eq!(scheduler.next().unwrap().text, "b1 follow-up");
        assert_eq!(scheduler.next().unwrap().text, "b2");
    }

    #[test]
    fn test_depth_guard() {
        let mut scheduler = Scheduler::new(2);
        let root = batch("root");
        let d1 = root.derive("d1");
        let d2 = d1.derive("d2");
        let d3 = d2.derive("d3");

        assert!(scheduler.push_recursive(d1).is_ok());
        assert!(scheduler.push_recursive(d2).is_ok());
        let err = scheduler.push_recursive(d3).unwrap_err();
        assert_eq!(
            err,
            QueryError::DepthExceeded {
                depth: 3,
                max_depth: 2
            }
        );
        assert_eq!(scheduler.stacked_len(), 2);
    }

    #[test]
    fn test_idle_tracks_in_flight() {
        let mut scheduler = Scheduler::new(3);
        assert!(scheduler.is_idle());

        scheduler.enqueue_batch(batch("b1"));
        assert!(!scheduler.is_idle());
        assert!(scheduler.has_pending());

        let _request = scheduler.next().unwrap();
        assert!(!scheduler.has_pending());
        assert!(!scheduler.is_idle());
        assert_eq!(scheduler.in_flight(), 1);

        scheduler.complete();
        assert!(scheduler.is_idle());

        // Completing more than was started never underflows
        scheduler.complete();
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_next_on_empty() {
        let mut scheduler = Scheduler::new(3);
        assert!(scheduler.next().is_none());
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_remove_pending() {
        let mut scheduler = Scheduler::new(3);
        let b1 = batch("b1");
        let b2 = batch("b2");
        let d1 = b1.derive("d1");
        let (b2_id, d1_id) = (b2.id, d1.id);

        scheduler.enqueue_batch(b1);
        scheduler.enqueue_batch(b2);
        scheduler.push_recursive(d1).unwrap();

        assert!(scheduler.contains(b2_id));
        assert_eq!(scheduler.remove(b2_id).unwrap().text, "b2");
        assert!(!scheduler.contains(b2_id));
        assert_eq!(scheduler.remove(d1_id).unwrap().text, "d1");
        assert!(scheduler.remove(d1_id).is_none());

        assert_eq!(texts(&mut scheduler), vec!["b1"]);
    }

    #[test]
    fn test_drain_pending_orders_stack_first() {
        let mut scheduler = Scheduler::new(3);
        let root = batch("root");
        scheduler.enqueue_batch(batch("b1"));
        scheduler.push_recursive(root.derive("d1")).unwrap();
        scheduler.push_recursive(root.derive("d2")).unwrap();

        let pending: Vec<_> = scheduler
            .drain_pending()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(pending, vec!["d2", "d1", "b1"]);
        assert!(scheduler.is_idle());
    }
