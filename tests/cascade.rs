//! Dispatch mechanics: fan-out, batching, dedupe, async handlers, failure
//! isolation.

use formwork::{
    handler_async, handler_fn, FormEngine, HandlerError, RawNode, SubscribeEntry, SubscribeSpec,
    Subscribes, Value,
};
use std::cell::Cell;
use std::rc::Rc;

fn counting_schema(once_per_batch: bool, calls: Rc<Cell<usize>>) -> RawNode {
    let mut counter = RawNode::field();
    counter.subscribes = Subscribes::List(vec![SubscribeEntry {
        target: "rows.*.v".to_string(),
        handler: handler_fn(move |_ctx| {
            calls.set(calls.get() + 1);
            Ok(())
        }),
        once_per_batch,
    }]);
    RawNode::form([
        ("rows", RawNode::list([("v", RawNode::field())])),
        ("counter", counter),
    ])
}

fn two_row_model() -> Value {
    Value::object([(
        "rows",
        Value::list([
            Value::object([("v", Value::int(0))]),
            Value::object([("v", Value::int(0))]),
        ]),
    )])
}

#[tokio::test]
async fn wildcard_matches_fire_once_per_trigger() {
    let calls = Rc::new(Cell::new(0));
    let mut engine =
        FormEngine::new(counting_schema(false, calls.clone()), Some(two_row_model())).unwrap();

    engine.update_value("rows.0.v", Value::int(1)).unwrap();
    engine.update_value("rows.1.v", Value::int(2)).unwrap();
    engine.wait_flush().await.unwrap();

    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn once_per_batch_dedupes_within_one_flush() {
    let calls = Rc::new(Cell::new(0));
    let mut engine =
        FormEngine::new(counting_schema(true, calls.clone()), Some(two_row_model())).unwrap();

    engine.update_value("rows.0.v", Value::int(1)).unwrap();
    engine.update_value("rows.1.v", Value::int(2)).unwrap();
    engine.wait_flush().await.unwrap();
    assert_eq!(calls.get(), 1);

    // A later batch gets a fresh dedupe scope.
    engine.update_value("rows.0.v", Value::int(3)).unwrap();
    engine.wait_flush().await.unwrap();
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn updates_coalesce_per_path_before_the_flush() {
    let calls = Rc::new(Cell::new(0));
    let mut engine =
        FormEngine::new(counting_schema(false, calls.clone()), Some(two_row_model())).unwrap();

    // Last writer wins; one write, one dispatch.
    engine.update_value("rows.0.v", Value::int(1)).unwrap();
    engine.update_value("rows.0.v", Value::int(2)).unwrap();
    engine.update_value("rows.0.v", Value::int(3)).unwrap();
    engine.wait_flush().await.unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(engine.get_value("rows.0.v").unwrap(), Value::int(3));
}

#[tokio::test]
async fn wildcard_update_expands_against_current_rows() {
    let mut engine =
        FormEngine::new(counting_schema(false, Rc::new(Cell::new(0))), Some(two_row_model()))
            .unwrap();

    engine.update_value("rows.*.v", Value::int(9)).unwrap();
    engine.wait_flush().await.unwrap();

    assert_eq!(engine.get_value("rows.0.v").unwrap(), Value::int(9));
    assert_eq!(engine.get_value("rows.1.v").unwrap(), Value::int(9));
}

#[tokio::test]
async fn async_handlers_are_awaited() {
    let mut mirror = RawNode::field();
    mirror.subscribes = Subscribes::Map(vec![(
        "source".to_string(),
        SubscribeSpec::Handler(handler_async(|mut ctx| async move {
            // Yield once before writing, as a real async handler would.
            tokio::task::yield_now().await;
            let source = ctx.get_value("source");
            ctx.update_self(source);
            Ok(())
        })),
    )]);
    let schema = RawNode::form([("source", RawNode::field()), ("mirror", mirror)]);

    let mut engine = FormEngine::new(schema, None).unwrap();
    engine.update_value("source", Value::text("hello")).unwrap();
    engine.wait_flush().await.unwrap();

    assert_eq!(engine.get_value("mirror").unwrap(), Value::text("hello"));
}

#[tokio::test]
async fn a_failing_handler_does_not_stop_its_siblings() {
    let mut broken = RawNode::field();
    broken.subscribes = Subscribes::Map(vec![(
        "source".to_string(),
        SubscribeSpec::Handler(handler_fn(|_ctx| {
            Err(HandlerError::new("deliberately broken"))
        })),
    )]);
    let mut mirror = RawNode::field();
    mirror.subscribes = Subscribes::Map(vec![(
        "source".to_string(),
        SubscribeSpec::Handler(handler_fn(|ctx| {
            let source = ctx.get_value("source");
            ctx.update_self(source);
            Ok(())
        })),
    )]);
    let schema = RawNode::form([
        ("source", RawNode::field()),
        ("broken", broken),
        ("mirror", mirror),
    ]);

    let mut engine = FormEngine::new(schema, None).unwrap();
    engine.update_value("source", Value::int(7)).unwrap();
    engine.wait_flush().await.unwrap();

    assert_eq!(engine.get_value("mirror").unwrap(), Value::int(7));
}

#[tokio::test]
async fn handler_context_reports_trigger_and_stars() {
    let seen = Rc::new(Cell::new((usize::MAX, false)));
    let seen_in_handler = seen.clone();

    let mut watcher = RawNode::field();
    watcher.subscribes = Subscribes::List(vec![SubscribeEntry {
        target: "rows.*.v".to_string(),
        handler: handler_fn(move |ctx| {
            let star = ctx.stars.first().copied().unwrap_or(usize::MAX);
            let trigger_matches = ctx.path.to_string() == format!("rows.{star}.v");
            seen_in_handler.set((star, trigger_matches));
            Ok(())
        }),
        once_per_batch: false,
    }]);
    let schema = RawNode::form([
        ("rows", RawNode::list([("v", RawNode::field())])),
        ("watcher", watcher),
    ]);

    let mut engine = FormEngine::new(schema, Some(two_row_model())).unwrap();
    engine.update_value("rows.1.v", Value::int(5)).unwrap();
    engine.wait_flush().await.unwrap();

    assert_eq!(seen.get(), (1, true));
}
