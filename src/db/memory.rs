//! In-memory platform store
//!
//! Holds a fixed set of documents and evaluates the subset of the MongoDB
//! query language the services use: equality and `$exists`/comparison
//! filters on dotted paths, inclusion/exclusion projections, and the
//! `$match`, `$group`, `$count`, `$project` and `$facet` aggregation stages
//! with `$sum`, `$cond`, `$and`, `$or`, `$isArray`, `$size` and comparison
//! expressions. Anything else is rejected with a database error.
//!
//! Used for offline development (`FIXTURES`) and for exercising the
//! services without a running MongoDB.

use bson::{oid::ObjectId, Bson, Document};
use std::cmp::Ordering;
use std::path::Path;
use tracing::info;

use crate::db::store::{DatabaseInfo, PlatformStore};
use crate::types::{ChastorError, Result};

/// Store over a fixed document set
#[derive(Debug, Clone, Default)]
pub struct MemoryPlatformStore {
    documents: Vec<Document>,
}

impl MemoryPlatformStore {
    /// Documents without an `_id` get a fresh ObjectId, as an insert would.
    pub fn new(documents: Vec<Document>) -> Self {
        let documents = documents
            .into_iter()
            .map(|mut doc| {
                if !doc.contains_key("_id") {
                    doc.insert("_id", ObjectId::new());
                }
                doc
            })
            .collect();
        Self { documents }
    }

    /// Parse a JSON array of documents
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let items = value
            .as_array()
            .ok_or_else(|| ChastorError::BadRequest("fixtures must be a JSON array".into()))?;

        let mut documents = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let doc = bson::to_document(item).map_err(|e| {
                ChastorError::BadRequest(format!("fixture #{index} is not an object: {e}"))
            })?;
            documents.push(doc);
        }

        Ok(Self::new(documents))
    }

    /// Load fixtures from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let store = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            documents = store.len(),
            "Loaded platform fixtures"
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn matching<'a>(&'a self, filter: &'a Document) -> impl Iterator<Item = Result<&'a Document>> + 'a {
        self.documents.iter().filter_map(move |doc| match matches(doc, filter) {
            Ok(true) => Some(Ok(doc)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        })
    }
}

#[async_trait::async_trait]
impl PlatformStore for MemoryPlatformStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn count_documents(&self, filter: Document) -> Result<u64> {
        let mut count = 0u64;
        for doc in self.matching(&filter) {
            doc?;
            count += 1;
        }
        Ok(count)
    }

    async fn find_one(&self, filter: Document, projection: Document) -> Result<Option<Document>> {
        match self.matching(&filter).next() {
            Some(doc) => Ok(Some(project(doc?, &projection))),
            None => Ok(None),
        }
    }

    async fn find(&self, filter: Document, projection: Document) -> Result<Vec<Document>> {
        self.matching(&filter)
            .map(|doc| doc.map(|d| project(d, &projection)))
            .collect()
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        run_pipeline(self.documents.clone(), &pipeline)
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let size_on_disk = self
            .documents
            .iter()
            .map(|doc| bson::to_vec(doc).map(|b| b.len() as u64).unwrap_or(0))
            .sum();

        Ok(vec![DatabaseInfo {
            name: "memory".to_string(),
            size_on_disk,
            empty: self.documents.is_empty(),
        }])
    }
}

// ============================================================================
// Query evaluation
// ============================================================================

/// Resolve a dotted path (`operational.status`)
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_doc(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => true,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn compare(left: &Bson, right: &Bson) -> Option<Ordering> {
    match (as_f64(left), as_f64(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (left, right) {
            (Bson::String(l), Bson::String(r)) => Some(l.cmp(r)),
            _ => None,
        },
    }
}

fn equal(left: &Bson, right: &Bson) -> bool {
    compare(left, right).map_or(left == right, |o| o == Ordering::Equal)
}

/// Missing fields compare equal to `null`, as in MongoDB
fn field_equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match (value, expected) {
        (None, Bson::Null) => true,
        (None, _) => false,
        (Some(v), e) => equal(v, e),
    }
}

fn apply_query_operator(value: Option<&Bson>, op: &str, arg: &Bson) -> Result<bool> {
    let ordered = |wanted: &[Ordering]| {
        value
            .and_then(|v| compare(v, arg))
            .is_some_and(|o| wanted.contains(&o))
    };

    Ok(match op {
        "$exists" => truthy(arg) == value.is_some(),
        "$eq" => field_equals(value, arg),
        "$ne" => !field_equals(value, arg),
        "$gt" => ordered(&[Ordering::Greater]),
        "$gte" => ordered(&[Ordering::Greater, Ordering::Equal]),
        "$lt" => ordered(&[Ordering::Less]),
        "$lte" => ordered(&[Ordering::Less, Ordering::Equal]),
        "$in" => match arg {
            Bson::Array(options) => options.iter().any(|o| field_equals(value, o)),
            _ => return Err(ChastorError::Database("$in needs an array".into())),
        },
        other => {
            return Err(ChastorError::Database(format!(
                "unsupported query operator {other}"
            )))
        }
    })
}

/// Evaluate a query filter against one document
fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (path, condition) in filter {
        let value = lookup(doc, path);
        let ok = match condition {
            Bson::Document(ops) if is_operator_doc(ops) => {
                let mut all = true;
                for (op, arg) in ops {
                    if !apply_query_operator(value, op, arg)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            expected => field_equals(value, expected),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn insert_path(target: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            target.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(target.get(head), Some(Bson::Document(_))) {
                target.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = target.get_mut(head) {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn remove_path(target: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            target.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = target.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Apply an inclusion or exclusion projection
fn project(doc: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }

    let inclusion = projection
        .iter()
        .any(|(path, flag)| path != "_id" && truthy(flag));

    if inclusion {
        let mut out = Document::new();
        let keep_id = projection.get("_id").map_or(true, truthy);
        if keep_id {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (path, flag) in projection {
            if path == "_id" || !truthy(flag) {
                continue;
            }
            if let Some(value) = lookup(doc, path) {
                insert_path(&mut out, path, value.clone());
            }
        }
        out
    } else {
        let mut out = doc.clone();
        for (path, flag) in projection {
            if !truthy(flag) {
                remove_path(&mut out, path);
            }
        }
        out
    }
}

// ============================================================================
// Aggregation
// ============================================================================

fn single_entry(doc: &Document) -> Result<(&str, &Bson)> {
    let mut iter = doc.iter();
    match (iter.next(), iter.next()) {
        (Some((key, value)), None) => Ok((key.as_str(), value)),
        _ => Err(ChastorError::Database(format!(
            "expected a single-key document, got {doc}"
        ))),
    }
}

fn as_document<'a>(value: &'a Bson, context: &str) -> Result<&'a Document> {
    match value {
        Bson::Document(doc) => Ok(doc),
        other => Err(ChastorError::Database(format!(
            "{context} expects a document, got {other}"
        ))),
    }
}

fn as_array<'a>(value: &'a Bson, context: &str) -> Result<&'a [Bson]> {
    match value {
        Bson::Array(items) => Ok(items),
        other => Err(ChastorError::Database(format!(
            "{context} expects an array, got {other}"
        ))),
    }
}

/// Unary operators accept both `{ $op: expr }` and `{ $op: [expr] }`
fn unary_arg(arg: &Bson) -> &Bson {
    match arg {
        Bson::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn binary_args<'a>(doc: &'a Document, arg: &'a Bson, op: &str) -> Result<(Bson, Bson)> {
    let items = as_array(arg, op)?;
    if items.len() != 2 {
        return Err(ChastorError::Database(format!("{op} takes two arguments")));
    }
    Ok((evaluate(doc, &items[0])?, evaluate(doc, &items[1])?))
}

/// Evaluate an aggregation expression against one document.
/// Missing fields evaluate to `null`.
fn evaluate(doc: &Document, expr: &Bson) -> Result<Bson> {
    match expr {
        Bson::String(path) if path.starts_with('$') => {
            Ok(lookup(doc, &path[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(spec) if is_operator_doc(spec) => {
            let (op, arg) = single_entry(spec)?;
            evaluate_operator(doc, op, arg)
        }
        Bson::Document(spec) => {
            let mut out = Document::new();
            for (key, value) in spec {
                out.insert(key, evaluate(doc, value)?);
            }
            Ok(Bson::Document(out))
        }
        Bson::Array(items) => Ok(Bson::Array(
            items
                .iter()
                .map(|item| evaluate(doc, item))
                .collect::<Result<Vec<_>>>()?,
        )),
        literal => Ok(literal.clone()),
    }
}

fn cond_branch<'a>(branches: &'a Document, key: &str) -> Result<&'a Bson> {
    branches
        .get(key)
        .ok_or_else(|| ChastorError::Database(format!("$cond is missing '{key}'")))
}

fn evaluate_operator(doc: &Document, op: &str, arg: &Bson) -> Result<Bson> {
    let ordered = |wanted: &[Ordering]| -> Result<Bson> {
        let (left, right) = binary_args(doc, arg, op)?;
        Ok(Bson::Boolean(
            compare(&left, &right).is_some_and(|o| wanted.contains(&o)),
        ))
    };

    match op {
        "$cond" => {
            let (test, then, otherwise) = match arg {
                Bson::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
                Bson::Document(branches) => (
                    cond_branch(branches, "if")?,
                    cond_branch(branches, "then")?,
                    cond_branch(branches, "else")?,
                ),
                _ => return Err(ChastorError::Database("malformed $cond".into())),
            };
            if truthy(&evaluate(doc, test)?) {
                evaluate(doc, then)
            } else {
                evaluate(doc, otherwise)
            }
        }
        "$and" => {
            for item in as_array(arg, op)? {
                if !truthy(&evaluate(doc, item)?) {
                    return Ok(Bson::Boolean(false));
                }
            }
            Ok(Bson::Boolean(true))
        }
        "$or" => {
            for item in as_array(arg, op)? {
                if truthy(&evaluate(doc, item)?) {
                    return Ok(Bson::Boolean(true));
                }
            }
            Ok(Bson::Boolean(false))
        }
        "$isArray" => Ok(Bson::Boolean(matches!(
            evaluate(doc, unary_arg(arg))?,
            Bson::Array(_)
        ))),
        "$size" => match evaluate(doc, unary_arg(arg))? {
            Bson::Array(items) => Ok(Bson::Int64(items.len() as i64)),
            other => Err(ChastorError::Database(format!(
                "$size requires an array, got {other}"
            ))),
        },
        "$eq" => {
            let (left, right) = binary_args(doc, arg, op)?;
            Ok(Bson::Boolean(equal(&left, &right)))
        }
        "$ne" => {
            let (left, right) = binary_args(doc, arg, op)?;
            Ok(Bson::Boolean(!equal(&left, &right)))
        }
        "$gt" => ordered(&[Ordering::Greater]),
        "$gte" => ordered(&[Ordering::Greater, Ordering::Equal]),
        "$lt" => ordered(&[Ordering::Less]),
        "$lte" => ordered(&[Ordering::Less, Ordering::Equal]),
        other => Err(ChastorError::Database(format!(
            "unsupported expression operator {other}"
        ))),
    }
}

/// `$sum` semantics: non-numeric values contribute nothing
fn add(total: &Bson, value: &Bson) -> Bson {
    match (total, value) {
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (t, v) => match (as_f64(t), as_f64(v)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => t.clone(),
        },
    }
}

fn group(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>> {
    let key_expr = spec.get("_id").cloned().unwrap_or(Bson::Null);

    let mut accumulators = Vec::new();
    for (field, acc) in spec {
        if field == "_id" {
            continue;
        }
        let (op, arg) = single_entry(as_document(acc, "$group accumulator")?)?;
        if op != "$sum" {
            return Err(ChastorError::Database(format!(
                "unsupported accumulator {op}"
            )));
        }
        accumulators.push((field.clone(), arg.clone()));
    }

    // First-seen order, like a stable hash group
    let mut groups: Vec<(Bson, Vec<Bson>)> = Vec::new();
    for doc in &docs {
        let key = evaluate(doc, &key_expr)?;
        let index = match groups.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                groups.push((key, vec![Bson::Int64(0); accumulators.len()]));
                groups.len() - 1
            }
        };
        for (slot, (_, arg)) in accumulators.iter().enumerate() {
            let value = evaluate(doc, arg)?;
            let totals = &mut groups[index].1;
            totals[slot] = add(&totals[slot], &value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, totals)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for ((field, _), total) in accumulators.iter().zip(totals) {
                out.insert(field.clone(), total);
            }
            out
        })
        .collect())
}

fn facet(docs: &[Document], spec: &Document) -> Result<Document> {
    let mut out = Document::new();
    for (name, stages) in spec {
        let stages = as_array(stages, "$facet branch")?
            .iter()
            .map(|stage| as_document(stage, "$facet stage").cloned())
            .collect::<Result<Vec<_>>>()?;
        let results = run_pipeline(docs.to_vec(), &stages)?;
        out.insert(
            name.clone(),
            results.into_iter().map(Bson::Document).collect::<Vec<_>>(),
        );
    }
    Ok(out)
}

/// Run an aggregation pipeline over a document set
fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = single_entry(stage)?;
        docs = match name {
            "$match" => {
                let filter = as_document(spec, name)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$group" => group(docs, as_document(spec, name)?)?,
            "$count" => {
                let field = spec
                    .as_str()
                    .ok_or_else(|| ChastorError::Database("$count expects a field name".into()))?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field, Bson::Int64(docs.len() as i64));
                    vec![out]
                }
            }
            "$project" => {
                let projection = as_document(spec, name)?;
                docs.iter().map(|doc| project(doc, projection)).collect()
            }
            "$facet" => vec![facet(&docs, as_document(spec, name)?)?],
            other => {
                return Err(ChastorError::Database(format!(
                    "unsupported pipeline stage {other}"
                )))
            }
        };
    }
    Ok(docs)
}
