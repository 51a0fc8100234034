//! Validator behavior: required semantics, visibility filtering, custom
//! validators, dynamic required flags.

use formwork::{
    validator_fn, ControlAttr, FieldErrorKind, FormEngine, HandlerError, RawNode, Value,
    ValidatorVerdict,
};

fn required_field() -> RawNode {
    let mut field = RawNode::field();
    field.required = ControlAttr::literal(true);
    field
}

#[tokio::test]
async fn required_fails_on_blank_values_only() {
    let schema = RawNode::form([
        ("name", required_field()),
        ("count", required_field()),
        ("flag", required_field()),
        ("meta", required_field()),
    ]);
    let model = Value::object([
        ("name", Value::text("")),
        ("count", Value::int(0)),
        ("flag", Value::bool(false)),
        ("meta", Value::empty_object()),
    ]);
    let mut engine = FormEngine::new(schema, Some(model)).unwrap();

    let outcome = engine.validate(None).await.unwrap();
    let errors = outcome.errors();
    // Only the empty string fails; 0, false and {} are not blank.
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path.to_string(), "name");
    assert_eq!(errors[0].kind, FieldErrorKind::Required);
}

#[tokio::test]
async fn hidden_and_disabled_fields_are_exempt() {
    let mut hidden = required_field();
    hidden.if_show = ControlAttr::literal(false);
    let mut disabled = required_field();
    disabled.disabled = ControlAttr::literal(true);
    let schema = RawNode::form([("hidden", hidden), ("disabled", disabled)]);

    let mut engine = FormEngine::new(schema, None).unwrap();
    assert!(engine.validate(None).await.unwrap().is_valid());
}

#[tokio::test]
async fn custom_validators_run_in_order_and_short_circuit() {
    let mut field = RawNode::field();
    field.validators = vec![
        validator_fn(|ctx| {
            if ctx.value.as_number().unwrap_or(0.0) < 10.0 {
                Ok(ValidatorVerdict::Fail("too small".to_string()))
            } else {
                Ok(ValidatorVerdict::Pass)
            }
        }),
        validator_fn(|_ctx| Ok(ValidatorVerdict::Fail("never reached".to_string()))),
    ];
    let schema = RawNode::form([("amount", field)]);
    let mut engine =
        FormEngine::new(schema, Some(Value::object([("amount", Value::int(5))]))).unwrap();

    let outcome = engine.validate(None).await.unwrap();
    let errors = outcome.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, FieldErrorKind::Custom);
    assert_eq!(errors[0].message, "too small");
}

#[tokio::test]
async fn throwing_validator_is_reported_as_exception() {
    let mut field = RawNode::field();
    field.validators = vec![validator_fn(|_ctx| Err(HandlerError::new("backend down")))];
    let schema = RawNode::form([("remote", field)]);
    let mut engine = FormEngine::new(schema, None).unwrap();

    let outcome = engine.validate(None).await.unwrap();
    let errors = outcome.errors();
    assert_eq!(errors[0].kind, FieldErrorKind::Exception);
    assert_eq!(errors[0].message, "backend down");
}

#[tokio::test]
async fn dynamic_required_follows_a_sibling_field() {
    // `tax_id` is required only for business accounts.
    let mut tax_id = RawNode::field();
    tax_id.required = ControlAttr::func(|scope| {
        Ok(scope.get_value("kind").as_str() == Some("business"))
    });
    let schema = RawNode::form([("kind", RawNode::field()), ("tax_id", tax_id)]);
    let mut engine = FormEngine::new(
        schema,
        Some(Value::object([("kind", Value::text("personal"))])),
    )
    .unwrap();

    assert!(engine.validate(None).await.unwrap().is_valid());

    engine.update_value("kind", Value::text("business")).unwrap();
    let outcome = engine.validate(None).await.unwrap();
    assert_eq!(outcome.errors().len(), 1);
    assert_eq!(outcome.errors()[0].path.to_string(), "tax_id");

    engine.update_value("kind", Value::text("personal")).unwrap();
    assert!(engine.validate(None).await.unwrap().is_valid());
}

#[tokio::test]
async fn target_paths_narrow_the_validated_set() {
    let schema = RawNode::form([("a", required_field()), ("b", required_field())]);
    let mut engine = FormEngine::new(schema, None).unwrap();

    let outcome = engine.validate(Some(&["a"])).await.unwrap();
    assert_eq!(outcome.errors().len(), 1);
    assert_eq!(outcome.errors()[0].path.to_string(), "a");

    let outcome = engine.validate(None).await.unwrap();
    assert_eq!(outcome.errors().len(), 2);
}

#[tokio::test]
async fn list_rows_validate_per_row_and_sort_by_path() {
    let schema = RawNode::form([(
        "rows",
        RawNode::list([("name", required_field())]),
    )]);
    let model = Value::object([(
        "rows",
        Value::list([
            Value::object([("name", Value::text(""))]),
            Value::object([("name", Value::text("ok"))]),
            Value::object([("name", Value::Null)]),
        ]),
    )]);
    let mut engine = FormEngine::new(schema, Some(model)).unwrap();

    let outcome = engine.validate(None).await.unwrap();
    let paths: Vec<String> = outcome
        .errors()
        .iter()
        .map(|e| e.path.to_string())
        .collect();
    assert_eq!(paths, vec!["rows.0.name", "rows.2.name"]);

    match outcome {
        formwork::ValidateOutcome::Invalid(report) => {
            assert_eq!(report.by_path.len(), 2);
            assert!(report.by_path.contains_key("rows.0.name"));
        }
        formwork::ValidateOutcome::Valid => panic!("expected errors"),
    }
}

#[tokio::test]
async fn validation_waits_for_pending_cascades() {
    // `amount` must stay under a limit that a subscription keeps in sync.
    let mut amount = RawNode::field();
    amount.validators = vec![validator_fn(|ctx| {
        let limit = ctx.get_value("limit").as_number().unwrap_or(f64::MAX);
        if ctx.value.as_number().unwrap_or(0.0) > limit {
            Ok(ValidatorVerdict::Fail("over limit".to_string()))
        } else {
            Ok(ValidatorVerdict::Pass)
        }
    })];
    let schema = RawNode::form([("limit", RawNode::field()), ("amount", amount)]);
    let mut engine = FormEngine::new(
        schema,
        Some(Value::object([
            ("limit", Value::number(100.0)),
            ("amount", Value::number(50.0)),
        ])),
    )
    .unwrap();

    // Queue without flushing; validate() must flush first and see 10.
    engine.update_value("limit", Value::number(10.0)).unwrap();
    let outcome = engine.validate(None).await.unwrap();
    assert_eq!(outcome.errors().len(), 1);
    assert_eq!(outcome.errors()[0].message, "over limit");
}
