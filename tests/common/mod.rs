//! Shared fixtures for the integration tests.

use formwork::{
    handler_fn, RawNode, SubscribeEntry, SubscribeSpec, Subscribes, Value,
};

/// Cart form: `rows` is a list of `{price, count, subtotal}` where
/// `subtotal` recomputes from its own row, and a top-level `total` sums
/// every row's subtotal.
pub fn cart_schema() -> RawNode {
    let mut subtotal = RawNode::field();
    subtotal.subscribes = Subscribes::Map(vec![(
        ".price, .count".to_string(),
        SubscribeSpec::Handler(handler_fn(|ctx| {
            let row = ctx.cur_row_value();
            let price = row.get("price").and_then(Value::as_number).unwrap_or(0.0);
            let count = row.get("count").and_then(Value::as_number).unwrap_or(0.0);
            ctx.update_self(Value::number(price * count));
            Ok(())
        })),
    )]);

    let mut total = RawNode::field();
    total.subscribes = Subscribes::List(vec![SubscribeEntry {
        target: "rows.*.subtotal".to_string(),
        handler: handler_fn(|ctx| {
            let sum = ctx
                .get_value("rows")
                .as_list()
                .map(|rows| {
                    rows.iter()
                        .map(|row| {
                            row.get("subtotal")
                                .and_then(Value::as_number)
                                .unwrap_or(0.0)
                        })
                        .sum()
                })
                .unwrap_or(0.0);
            ctx.update_self(Value::number(sum));
            Ok(())
        }),
        once_per_batch: false,
    }]);

    RawNode::form([
        (
            "rows",
            RawNode::list([
                ("price", RawNode::field()),
                ("count", RawNode::field()),
                ("subtotal", subtotal),
            ]),
        ),
        ("total", total),
    ])
}

pub fn row(price: f64, count: f64) -> Value {
    Value::object([
        ("price", Value::number(price)),
        ("count", Value::number(count)),
    ])
}
