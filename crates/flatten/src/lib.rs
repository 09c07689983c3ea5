//! Statline response flattener.
//!
//! Turns the payload under a response shape's root path into uniformly shaped rows.
//! Per element: immediate scalars, then object rules, then non-explode array rules,
//! then the Cartesian product of exploded arrays. Rename and exclude run on the final
//! column names. A malformed element is reported as a warning and skipped.

#![forbid(unsafe_code)]

pub mod path;

use serde_json::{Map, Value};
use statline_core::{
    default_sub_prefix, ArrayRule, ArrayStrategy, Cell, FlattenSpec, ObjectRule, ObjectStrategy, ResponseShape, Row,
    ShapeKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use path::{lookup, lookup_u64, Lookup};

/// The response as a whole cannot be flattened.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FlattenError {
    #[error("response has no `{path}` field")]
    MissingRoot { path: String },
}

/// One element was skipped.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("element {index} skipped: {reason}")]
pub struct FlattenWarning {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flattened {
    pub rows: Vec<Row>,
    pub warnings: Vec<FlattenWarning>,
    /// Set when cancellation stopped the walk early; `rows` holds what was produced.
    pub cancelled: bool,
}

pub fn flatten(shape: &ResponseShape, payload: &Value) -> Result<Flattened, FlattenError> {
    flatten_with_cancel(shape, payload, &CancellationToken::new())
}

/// Like [`flatten`], checking `cancel` between elements.
pub fn flatten_with_cancel(
    shape: &ResponseShape,
    payload: &Value,
    cancel: &CancellationToken,
) -> Result<Flattened, FlattenError> {
    let root = match lookup(payload, &shape.root_path) {
        Lookup::Found(v) => v,
        Lookup::Null => return Ok(Flattened::default()),
        Lookup::Absent => return Err(FlattenError::MissingRoot { path: shape.root_path.clone() }),
    };
    let elements: Vec<&Value> = match root {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    if (shape.kind == ShapeKind::Object) == root.is_array() {
        debug!(declared = ?shape.kind, "response root does not match the declared shape");
    }

    let plan = Plan::new(&shape.flatten);
    let mut out = Flattened::default();
    for (index, element) in elements.into_iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(index, rows = out.rows.len(), "flatten cancelled");
            out.cancelled = true;
            break;
        }
        match plan.element(element) {
            Ok(rows) => out.rows.extend(rows),
            Err(reason) => {
                warn!(index, reason = %reason, "skipping malformed response element");
                metrics::counter!("statline_flatten_skipped_total", 1u64);
                out.warnings.push(FlattenWarning { index, reason });
            }
        }
    }

    conform_rows(&mut out.rows);
    metrics::counter!("statline_flatten_rows_total", out.rows.len() as u64);
    Ok(out)
}

/// Give every row the union of columns, in first-appearance order.
pub fn conform_rows(rows: &mut [Row]) {
    let mut columns: Vec<String> = Vec::new();
    for row in rows.iter() {
        for c in row.columns() {
            if !columns.iter().any(|k| k == c) {
                columns.push(c.to_string());
            }
        }
    }
    for row in rows.iter_mut() {
        row.conform(&columns);
    }
}

struct Exploded<'a> {
    rule: &'a ArrayRule,
    sub_prefix: String,
    objects: Vec<(String, &'a ObjectRule)>,
    arrays: Vec<(String, &'a ArrayRule)>,
}

/// Rules sorted once per response: top-level rules vs rules scoped under an exploded array.
struct Plan<'a> {
    spec: &'a FlattenSpec,
    objects: Vec<&'a ObjectRule>,
    arrays: Vec<&'a ArrayRule>,
    explode: Vec<Exploded<'a>>,
}

type Partial = Vec<(String, Cell)>;

impl<'a> Plan<'a> {
    fn new(spec: &'a FlattenSpec) -> Self {
        let candidates: Vec<&'a ArrayRule> =
            spec.array_rules.iter().filter(|r| matches!(r.strategy, ArrayStrategy::Explode { .. })).collect();
        let mut explode: Vec<Exploded<'a>> = Vec::new();
        for rule in candidates.iter().copied() {
            // nested explodes are handled as scoped rules of the outer one
            if candidates.iter().any(|outer| scoped(&outer.path, &rule.path).is_some()) {
                continue;
            }
            explode.push(Exploded { rule, sub_prefix: rule.sub_prefix(), objects: Vec::new(), arrays: Vec::new() });
        }

        let mut objects = Vec::new();
        for rule in spec.object_rules.iter() {
            match explode.iter_mut().find_map(|e| scoped(&e.rule.path, &rule.path).map(|rel| (e, rel))) {
                Some((e, rel)) => e.objects.push((rel.to_string(), rule)),
                None => objects.push(rule),
            }
        }
        let mut arrays = Vec::new();
        for rule in spec.array_rules.iter() {
            if explode.iter().any(|e| std::ptr::eq(e.rule, rule)) {
                continue;
            }
            match explode.iter_mut().find_map(|e| scoped(&e.rule.path, &rule.path).map(|rel| (e, rel))) {
                Some((e, rel)) => e.arrays.push((rel.to_string(), rule)),
                None => arrays.push(rule),
            }
        }
        Self { spec, objects, arrays, explode }
    }

    fn element(&self, element: &Value) -> Result<Vec<Row>, String> {
        let prefix = self.spec.prefix.as_str();
        let obj = match element {
            Value::Object(m) => m,
            Value::Null => return Err("element is null".to_string()),
            Value::Array(_) => return Err("element is an array, expected an object".to_string()),
            scalar => {
                let mut row = Row::new();
                row.insert(format!("{prefix}value"), Cell::from_scalar(scalar).unwrap_or(Cell::Missing));
                return Ok(vec![self.finish(row)]);
            }
        };

        let mut base = Row::new();
        push_scalars(&mut base, obj, prefix);
        let objects = self.objects.iter().map(|r| (r.path.as_str(), *r));
        apply_object_rules(&mut base, element, prefix, "", objects)?;
        let arrays = self.arrays.iter().map(|r| (r.path.as_str(), *r));
        apply_array_rules(&mut base, element, prefix, "", arrays)?;

        let mut rows = vec![base];
        for e in self.explode.iter() {
            let members = match lookup(element, &e.rule.path) {
                Lookup::Found(Value::Array(items)) => {
                    if matches!(e.rule.strategy, ArrayStrategy::Explode { spread: true, .. }) {
                        let mut flat = Vec::new();
                        spread(items, &mut flat);
                        flat
                    } else {
                        items.iter().collect()
                    }
                }
                Lookup::Found(_) => return Err(format!("`{}` is not an array", e.rule.path)),
                Lookup::Null | Lookup::Absent => Vec::new(),
            };
            let mut partials: Vec<Partial> = Vec::with_capacity(members.len());
            for m in members {
                partials.push(self.member(e, m)?);
            }
            if partials.is_empty() {
                continue;
            }
            rows = rows
                .into_iter()
                .flat_map(|row| {
                    partials.iter().map(move |p| {
                        let mut r = row.clone();
                        for (k, c) in p.iter() {
                            r.insert(k.clone(), c.clone());
                        }
                        r
                    })
                })
                .collect();
        }
        Ok(rows.into_iter().map(|r| self.finish(r)).collect())
    }

    /// Columns contributed by one exploded array member.
    fn member(&self, e: &Exploded<'_>, member: &Value) -> Result<Partial, String> {
        let prefix = format!("{}{}", self.spec.prefix, e.sub_prefix);
        let mut row = Row::new();
        match member {
            Value::Object(m) => {
                push_scalars(&mut row, m, &prefix);
                let objects = e.objects.iter().map(|(rel, r)| (rel.as_str(), *r));
                apply_object_rules(&mut row, member, &prefix, &e.rule.path, objects)?;
                let arrays = e.arrays.iter().map(|(rel, r)| (rel.as_str(), *r));
                apply_array_rules(&mut row, member, &prefix, &e.rule.path, arrays)?;
            }
            // a null member still counts as a row; its columns come out missing
            Value::Null => {}
            Value::Array(_) => {
                row.insert(format!("{prefix}value"), json_text(member));
            }
            scalar => {
                row.insert(format!("{prefix}value"), Cell::from_scalar(scalar).unwrap_or(Cell::Missing));
            }
        }
        Ok(row.iter().map(|(k, c)| (k.to_string(), c.clone())).collect())
    }

    fn finish(&self, mut row: Row) -> Row {
        for (from, to) in self.spec.rename.iter() {
            row.rename(from, to);
        }
        for col in self.spec.exclude.iter() {
            row.remove(col);
        }
        row
    }
}

/// `child` relative to `parent` when `child` lies strictly below it.
fn scoped<'p>(parent: &str, child: &'p str) -> Option<&'p str> {
    child.strip_prefix(parent).and_then(|rest| rest.strip_prefix('.')).filter(|rel| !rel.is_empty())
}

/// Array members, with nested arrays opened in place.
fn spread<'a>(items: &'a [Value], out: &mut Vec<&'a Value>) {
    for item in items {
        match item {
            Value::Array(inner) => spread(inner, out),
            other => out.push(other),
        }
    }
}

fn push_scalars(row: &mut Row, obj: &Map<String, Value>, prefix: &str) {
    for (k, v) in obj.iter() {
        if let Some(cell) = Cell::from_scalar(v) {
            row.insert(format!("{prefix}{k}"), cell);
        }
    }
}

fn json_text(v: &Value) -> Cell {
    serde_json::to_string(v).map(Cell::String).unwrap_or(Cell::Missing)
}

fn rule_sub_prefix(rel: &str, explicit: Option<&String>) -> String {
    explicit.cloned().unwrap_or_else(|| default_sub_prefix(rel))
}

/// `rel` is the rule path relative to `scope`; `scope` is only used for messages.
fn apply_object_rules<'r>(
    row: &mut Row,
    node: &Value,
    prefix: &str,
    scope: &str,
    rules: impl Iterator<Item = (&'r str, &'r ObjectRule)>,
) -> Result<(), String> {
    for (rel, rule) in rules {
        let found = lookup(node, rel);
        if let Lookup::Found(v) = found {
            if !v.is_object() {
                return Err(format!("`{}` is not an object", full_path(scope, rel)));
            }
        }
        match &rule.strategy {
            ObjectStrategy::Flatten { prefix: sub } => {
                if let Lookup::Found(Value::Object(m)) = found {
                    push_scalars(row, m, &format!("{prefix}{}", rule_sub_prefix(rel, sub.as_ref())));
                }
            }
            ObjectStrategy::Stringify => {
                let cell = found.value().map(json_text).unwrap_or(Cell::Missing);
                row.insert(format!("{prefix}{}", rel.replace('.', "_")), cell);
            }
        }
    }
    Ok(())
}

fn apply_array_rules<'r>(
    row: &mut Row,
    node: &Value,
    prefix: &str,
    scope: &str,
    rules: impl Iterator<Item = (&'r str, &'r ArrayRule)>,
) -> Result<(), String> {
    for (rel, rule) in rules {
        let found = lookup(node, rel);
        if let Lookup::Found(v) = found {
            if !v.is_array() {
                return Err(format!("`{}` is not an array", full_path(scope, rel)));
            }
        }
        match &rule.strategy {
            ArrayStrategy::Ignore => {}
            // an explode nested inside another explode degrades to stringify
            ArrayStrategy::Stringify | ArrayStrategy::Explode { .. } => {
                let cell = found.value().map(json_text).unwrap_or(Cell::Missing);
                row.insert(format!("{prefix}{}", rel.replace('.', "_")), cell);
            }
        }
    }
    Ok(())
}

fn full_path(scope: &str, rel: &str) -> String {
    if scope.is_empty() { rel.to_string() } else { format!("{scope}.{rel}") }
}
