//! Public surface: lifecycle, reset, schema swaps, listeners, defaults.

use formwork::{
    handler_fn, ControlAttr, EngineError, EventKind, FormEngine, RawNode, ResetTarget,
    SubscribeSpec, Subscribes, Value, ValueChangeFilter,
};
use std::cell::RefCell;
use std::rc::Rc;

fn plain_schema() -> RawNode {
    RawNode::form([("a", RawNode::field()), ("b", RawNode::field())])
}

#[tokio::test]
async fn destroy_is_idempotent_and_poisons_the_engine() {
    let mut engine = FormEngine::new(plain_schema(), None).unwrap();
    engine.destroy();
    engine.destroy();
    assert!(engine.is_destroyed());

    assert!(matches!(
        engine.get_value("a"),
        Err(EngineError::Lifecycle(_))
    ));
    assert!(matches!(
        engine.update_value("a", Value::int(1)),
        Err(EngineError::Lifecycle(_))
    ));
    assert!(matches!(
        engine.wait_flush().await,
        Err(EngineError::Lifecycle(_))
    ));
    assert!(matches!(
        engine.validate(None).await,
        Err(EngineError::Lifecycle(_))
    ));
}

#[tokio::test]
async fn reset_restores_the_construction_snapshot() {
    let model = Value::object([("a", Value::int(1)), ("b", Value::int(2))]);
    let mut engine = FormEngine::new(plain_schema(), Some(model.clone())).unwrap();

    engine.update_value("a", Value::int(99)).unwrap();
    engine.wait_flush().await.unwrap();
    assert_eq!(engine.get_value("a").unwrap(), Value::int(99));

    engine.reset(ResetTarget::Initial).unwrap();
    assert_eq!(engine.get_value("").unwrap(), model);
}

#[tokio::test]
async fn reset_with_a_value_adopts_it_as_the_new_initial() {
    let mut engine = FormEngine::new(plain_schema(), None).unwrap();
    let adopted = Value::object([("a", Value::int(5))]);
    engine.reset(ResetTarget::Value(adopted.clone())).unwrap();

    engine.update_value("a", Value::int(6)).unwrap();
    engine.wait_flush().await.unwrap();

    engine.reset(ResetTarget::Initial).unwrap();
    assert_eq!(engine.get_value("").unwrap(), adopted);
}

#[tokio::test]
async fn reset_to_defaults_applies_schema_declared_values() {
    let mut a = RawNode::field();
    a.default_value = Some(Value::int(7));
    let schema = RawNode::form([("a", a), ("b", RawNode::field())]);
    let mut engine = FormEngine::new(
        schema,
        Some(Value::object([("a", Value::int(1)), ("b", Value::int(2))])),
    )
    .unwrap();

    engine.reset(ResetTarget::Defaults).unwrap();
    assert_eq!(engine.get_value("a").unwrap(), Value::int(7));
    assert_eq!(engine.get_value("b").unwrap(), Value::Null);
}

#[tokio::test]
async fn construction_seeds_defaults_but_model_wins() {
    let mut a = RawNode::field();
    a.default_value = Some(Value::int(7));
    let mut b = RawNode::field();
    b.default_value = Some(Value::int(8));
    let schema = RawNode::form([("a", a), ("b", b)]);

    let engine =
        FormEngine::new(schema, Some(Value::object([("a", Value::int(1))]))).unwrap();
    assert_eq!(engine.get_value("a").unwrap(), Value::int(1));
    assert_eq!(engine.get_value("b").unwrap(), Value::int(8));
}

#[tokio::test]
async fn set_form_schema_preserves_data_and_rewires_subscriptions() {
    let mut engine = FormEngine::new(plain_schema(), None).unwrap();
    engine.update_value("a", Value::int(3)).unwrap();
    engine.wait_flush().await.unwrap();

    // The new schema adds `double`, driven off `a`.
    let mut double = RawNode::field();
    double.subscribes = Subscribes::Map(vec![(
        "a".to_string(),
        SubscribeSpec::Handler(handler_fn(|ctx| {
            let a = ctx.get_value("a").as_number().unwrap_or(0.0);
            ctx.update_self(Value::number(a * 2.0));
            Ok(())
        })),
    )]);
    let next = RawNode::form([
        ("a", RawNode::field()),
        ("b", RawNode::field()),
        ("double", double),
    ]);
    engine.set_form_schema(next).unwrap();

    // Data survived the swap.
    assert_eq!(engine.get_value("a").unwrap(), Value::int(3));

    engine.update_value("a", Value::number(4.0)).unwrap();
    engine.wait_flush().await.unwrap();
    assert_eq!(engine.get_value("double").unwrap(), Value::number(8.0));
}

#[tokio::test]
async fn listeners_filter_by_kind_and_pattern_and_unsubscribe() {
    let schema = RawNode::form([
        ("rows", RawNode::list([("v", RawNode::field())])),
        ("other", RawNode::field()),
    ]);
    let mut engine = FormEngine::new(schema, None).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let id = engine
        .on_value_change(
            move |notification| {
                sink.borrow_mut()
                    .push((notification.path.to_string(), notification.event.kind()));
            },
            ValueChangeFilter {
                pattern: Some("rows.*.v".to_string()),
                kinds: Some(vec![EventKind::Value]),
            },
        )
        .unwrap();

    engine.list_append("rows", Value::object([("v", Value::int(0))])).unwrap();
    engine.wait_flush().await.unwrap();
    // Structural event filtered out by kind; no row value was written.
    assert!(seen.borrow().is_empty());

    engine.update_value("rows.0.v", Value::int(1)).unwrap();
    engine.update_value("other", Value::int(2)).unwrap();
    engine.wait_flush().await.unwrap();
    assert_eq!(
        seen.borrow().as_slice(),
        &[("rows.0.v".to_string(), EventKind::Value)]
    );

    engine.off_value_change(id).unwrap();
    engine.update_value("rows.0.v", Value::int(3)).unwrap();
    engine.wait_flush().await.unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[tokio::test]
async fn relative_listener_patterns_are_rejected() {
    let mut engine = FormEngine::new(plain_schema(), None).unwrap();
    let result = engine.on_value_change(
        |_| {},
        ValueChangeFilter {
            pattern: Some(".price".to_string()),
            kinds: None,
        },
    );
    assert!(matches!(result, Err(EngineError::Schema(_))));
}

#[tokio::test]
async fn notifications_arrive_in_write_order_with_computed_current() {
    // `b` mirrors `a`; the listener must see `a` before `b`, and by the
    // time it fires, computed attributes already reflect the write.
    let mut b = RawNode::field();
    b.subscribes = Subscribes::Map(vec![(
        "a".to_string(),
        SubscribeSpec::Handler(handler_fn(|ctx| {
            let a = ctx.get_value("a");
            ctx.update_self(a);
            Ok(())
        })),
    )]);
    let mut c = RawNode::field();
    c.disabled = ControlAttr::func(|scope| Ok(scope.get_value("a").as_number() == Some(1.0)));
    let schema = RawNode::form([("a", RawNode::field()), ("b", b), ("c", c)]);
    let mut engine = FormEngine::new(schema, None).unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    let sink = order.clone();
    engine
        .on_value_change(
            move |notification| sink.borrow_mut().push(notification.path.to_string()),
            ValueChangeFilter::default(),
        )
        .unwrap();

    engine.update_value("a", Value::number(1.0)).unwrap();
    engine.wait_flush().await.unwrap();

    assert_eq!(order.borrow().as_slice(), &["a".to_string(), "b".to_string()]);

    // Computed caught up within the same flush.
    let root = engine.render_root().unwrap();
    let c_node = root
        .children
        .iter()
        .find(|n| n.name() == "c")
        .unwrap()
        .clone();
    assert!(c_node.computed.as_ref().unwrap().disabled);
}

#[tokio::test]
async fn get_value_of_untouched_sibling_keeps_identity() {
    let model = Value::object([
        ("a", Value::object([("x", Value::int(1))])),
        ("b", Value::object([("y", Value::int(2))])),
    ]);
    let mut engine = FormEngine::new(plain_schema(), Some(model)).unwrap();
    let b_before = engine.get_value("b").unwrap();

    engine.update_value("a", Value::object([("x", Value::int(9))])).unwrap();
    engine.wait_flush().await.unwrap();

    let b_after = engine.get_value("b").unwrap();
    assert!(b_after.same_identity(&b_before));
    assert_eq!(engine.get_value("a.x").unwrap(), Value::int(9));
}

#[tokio::test]
async fn get_schema_resolves_render_paths() {
    let schema = RawNode::form([(
        "rows",
        RawNode::list([("price", RawNode::field())]),
    )]);
    let engine = FormEngine::new(schema, None).unwrap();

    let node = engine.get_schema("rows.2.price").unwrap().unwrap();
    assert_eq!(node.schema_path.to_string(), "rows.items.price");
    assert!(engine.get_schema("nope").unwrap().is_none());
    assert_eq!(
        engine.get_schema("").unwrap().unwrap().kind,
        formwork::NodeKind::Form
    );
}
