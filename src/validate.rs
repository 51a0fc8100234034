//! Field validation.
//!
//! Runs against the latest render tree (the engine awaits flush completion
//! first), skips fields that are hidden or disabled, and validates the rest
//! concurrently. Per field: the required check, then the custom validators
//! in declared order, short-circuiting on the first failure. Failures are
//! data, not errors.

use crate::context::ReadScope;
use crate::error::HandlerError;
use crate::path::Path;
use crate::render::{collect_fields, RenderNode};
use crate::schema::{ParsedSchema, SchemaNode};
use crate::store::read_path;
use crate::value::Value;
use futures_util::future::{join_all, LocalBoxFuture};
use indexmap::IndexMap;
use std::sync::Arc;

/// A custom validator. `Ok(Pass)` passes; `Ok(Fail)`/`Ok(FailWith)` fail the
/// field; `Err` is caught and reported as `FieldErrorKind::Exception`.
pub type FieldValidator =
    Arc<dyn Fn(ValidatorCtx) -> LocalBoxFuture<'static, Result<ValidatorVerdict, HandlerError>>>;

/// Wrap a synchronous closure as a validator.
pub fn validator_fn(
    f: impl Fn(&ValidatorCtx) -> Result<ValidatorVerdict, HandlerError> + 'static,
) -> FieldValidator {
    Arc::new(
        move |ctx| -> LocalBoxFuture<'static, Result<ValidatorVerdict, HandlerError>> {
            let verdict = f(&ctx);
            Box::pin(futures_util::future::ready(verdict))
        },
    )
}

/// Wrap an async closure as a validator.
pub fn validator_async<F, Fut>(f: F) -> FieldValidator
where
    F: Fn(ValidatorCtx) -> Fut + 'static,
    Fut: Future<Output = Result<ValidatorVerdict, HandlerError>> + 'static,
{
    Arc::new(
        move |ctx| -> LocalBoxFuture<'static, Result<ValidatorVerdict, HandlerError>> {
            Box::pin(f(ctx))
        },
    )
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValidatorVerdict {
    Pass,
    /// Error message; the engine fills in path and kind.
    Fail(String),
    /// Full error record, adopted as-is.
    FailWith(FieldError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldErrorKind {
    Required,
    Custom,
    Exception,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    pub path: Path,
    pub kind: FieldErrorKind,
    pub message: String,
}

/// `Valid` when zero errors, otherwise the structured report.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidateOutcome {
    Valid,
    Invalid(ValidationReport),
}

impl ValidateOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidateOutcome::Valid)
    }

    pub fn errors(&self) -> &[FieldError] {
        match self {
            ValidateOutcome::Valid => &[],
            ValidateOutcome::Invalid(report) => &report.errors,
        }
    }
}

/// Error list sorted by path, plus the per-path grouping.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
    pub by_path: IndexMap<String, Vec<FieldError>>,
}

/// What a custom validator sees: the field's position and current value,
/// plus the usual read scope.
pub struct ValidatorCtx {
    pub path: Path,
    pub value: Value,
    scope: ReadScope,
}

impl ValidatorCtx {
    pub fn get_value(&self, path: &str) -> Value {
        self.scope.get_value(path)
    }

    pub fn get_schema(&self, path: &str) -> Option<Arc<SchemaNode>> {
        self.scope.get_schema(path)
    }

    pub fn cur_row_value(&self) -> Value {
        self.scope.cur_row_value()
    }

    pub fn cur_row_index(&self) -> Option<usize> {
        self.scope.cur_row_index()
    }

    pub fn scope(&self) -> &ReadScope {
        &self.scope
    }
}

pub(crate) async fn run_validation(
    root: &Arc<RenderNode>,
    store_root: &Value,
    schema: &Arc<ParsedSchema>,
    targets: Option<&[Path]>,
) -> ValidateOutcome {
    let mut fields = Vec::new();
    collect_fields(root, &mut fields);

    let candidates: Vec<Arc<RenderNode>> = fields
        .into_iter()
        .filter(|field| match targets {
            Some(targets) => targets
                .iter()
                .any(|t| field.render_path == *t || field.render_path.starts_with(t)),
            None => true,
        })
        .filter(|field| match &field.computed {
            // Hidden or disabled fields are exempt.
            Some(computed) => computed.if_show && !computed.disabled,
            None => true,
        })
        .collect();

    let checks = candidates.into_iter().map(|field| {
        let store_root = store_root.clone();
        let schema = schema.clone();
        async move { validate_field(field, store_root, schema).await }
    });
    let mut errors: Vec<FieldError> = join_all(checks).await.into_iter().flatten().collect();

    if errors.is_empty() {
        return ValidateOutcome::Valid;
    }
    errors.sort_by(|a, b| a.path.to_string().cmp(&b.path.to_string()));
    let mut by_path: IndexMap<String, Vec<FieldError>> = IndexMap::new();
    for error in &errors {
        by_path
            .entry(error.path.to_string())
            .or_default()
            .push(error.clone());
    }
    ValidateOutcome::Invalid(ValidationReport { errors, by_path })
}

async fn validate_field(
    field: Arc<RenderNode>,
    store_root: Value,
    schema: Arc<ParsedSchema>,
) -> Option<FieldError> {
    let path = field.render_path.clone();
    let value = read_path(&store_root, &path).cloned().unwrap_or(Value::Null);

    let required = field
        .computed
        .as_ref()
        .map(|computed| computed.required)
        .unwrap_or(false);
    if required && value.is_blank() {
        return Some(FieldError {
            path,
            kind: FieldErrorKind::Required,
            message: format!("`{}` is required", field.name()),
        });
    }

    for validator in &field.schema.validators {
        let ctx = ValidatorCtx {
            path: path.clone(),
            value: value.clone(),
            scope: ReadScope::new(store_root.clone(), schema.clone(), path.clone()),
        };
        match validator(ctx).await {
            Ok(ValidatorVerdict::Pass) => continue,
            Ok(ValidatorVerdict::Fail(message)) => {
                return Some(FieldError {
                    path,
                    kind: FieldErrorKind::Custom,
                    message,
                });
            }
            Ok(ValidatorVerdict::FailWith(error)) => return Some(error),
            Err(err) => {
                log::warn!("validator at `{path}` threw: {err}");
                return Some(FieldError {
                    path,
                    kind: FieldErrorKind::Exception,
                    message: err.to_string(),
                });
            }
        }
    }
    None
}
