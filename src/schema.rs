//! Schema composition
//!
//! Alert schemas are split into fragments (`cutout.avsc`, `candidate.avsc`,
//! `alert.avsc`) where later fragments refer to named types defined by
//! earlier ones. [`SchemaComposer`] walks the fragments in the order given,
//! registering named types in its own [`Namespace`] and checking that every
//! reference is already known. The last fragment is then expanded into one
//! self-contained Avro schema.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use apache_avro::schema::{EnumSchema, FixedSchema, RecordSchema, Schema};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use include_dir::{include_dir, Dir};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{AlertError, Result};

/// Fragments shipped with the crate, lowest-level dependency first
pub static EMBEDDED_SCHEMAS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/schema");

/// Load order of [`EMBEDDED_SCHEMAS`]
pub const EMBEDDED_ORDER: [&str; 3] = ["cutout.avsc", "candidate.avsc", "alert.avsc"];

const PRIMITIVES: [&str; 8] = ["null", "boolean", "int", "long", "float", "double", "bytes", "string"];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid name pattern"))
}

fn is_primitive(name: &str) -> bool {
    PRIMITIVES.contains(&name)
}

/// One schema definition document
#[derive(Debug, Clone)]
pub struct SchemaFragment {
    origin: String,
    definition: Value,
}

/// Borrowed view of one field declared by a record fragment
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef<'a> {
    pub name: &'a str,
    pub type_ref: &'a Value,
    pub default: Option<&'a Value>,
    pub doc: Option<&'a str>,
}

impl SchemaFragment {
    pub fn new(origin: impl Into<String>, definition: Value) -> Self {
        Self {
            origin: origin.into(),
            definition,
        }
    }

    /// Parse fragment text; `origin` labels error messages
    pub fn from_str(origin: impl Into<String>, text: &str) -> Result<Self> {
        let origin = origin.into();
        let definition = serde_json::from_str(text).map_err(|e| AlertError::SchemaLoad {
            origin: origin.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { origin, definition })
    }

    /// Read and parse a fragment file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| AlertError::SchemaLoad {
            origin: origin.clone(),
            reason: e.to_string(),
        })?;
        Self::from_str(origin, &text)
    }

    /// Fragment bundled with the crate (see [`EMBEDDED_ORDER`])
    pub fn embedded(file_name: &str) -> Result<Self> {
        let text = EMBEDDED_SCHEMAS
            .get_file(file_name)
            .and_then(|f| f.contents_utf8())
            .ok_or_else(|| AlertError::SchemaLoad {
                origin: file_name.to_string(),
                reason: "no such embedded schema".to_string(),
            })?;
        Self::from_str(file_name, text)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// Declared type name, as written (not namespace-qualified)
    pub fn type_name(&self) -> Option<&str> {
        self.definition.get("name").and_then(Value::as_str)
    }

    /// Declared fields; empty for anything but records
    pub fn fields(&self) -> Vec<FieldDef<'_>> {
        self.definition
            .get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| {
                        Some(FieldDef {
                            name: f.get("name")?.as_str()?,
                            type_ref: f.get("type")?,
                            default: f.get("default"),
                            doc: f.get("doc").and_then(Value::as_str),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Named types registered so far during one composition.
///
/// Definitions are stored normalized: nested named types are replaced by
/// their full name and every reference is fully qualified.
#[derive(Debug, Default)]
struct Namespace {
    definitions: HashMap<String, Value>,
}

impl Namespace {
    fn contains(&self, fullname: &str) -> bool {
        self.definitions.contains_key(fullname)
    }

    fn suggest(&self, missing: &str) -> Option<&str> {
        let matcher = SkimMatcherV2::default();
        let short = missing.rsplit('.').next().unwrap_or(missing);
        self.definitions
            .keys()
            .filter_map(|known| matcher.fuzzy_match(known, short).map(|score| (score, known)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, known)| known.as_str())
    }

    fn resolve_reference(&self, name: &str, enclosing: Option<&str>, origin: &str) -> Result<String> {
        if !name.contains('.') {
            if let Some(ns) = enclosing {
                let qualified = format!("{ns}.{name}");
                if self.contains(&qualified) {
                    return Ok(qualified);
                }
            }
        }
        if self.contains(name) {
            return Ok(name.to_string());
        }

        let mut reason = format!("undefined type name '{name}'");
        if let Some(candidate) = self.suggest(name) {
            reason.push_str(&format!(" (did you mean '{candidate}'?)"));
        }
        Err(AlertError::resolution(origin, reason))
    }

    /// Normalize one schema node, registering the named types it defines
    fn normalize(&mut self, node: &Value, enclosing: Option<&str>, origin: &str) -> Result<Value> {
        match node {
            Value::String(name) if is_primitive(name) => Ok(node.clone()),
            Value::String(name) => Ok(Value::String(self.resolve_reference(name, enclosing, origin)?)),
            Value::Array(branches) => branches
                .iter()
                .map(|b| self.normalize(b, enclosing, origin))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(obj) => self.normalize_object(obj, enclosing, origin),
            other => Err(AlertError::resolution(
                origin,
                format!("expected a type name, union or type object, found {other}"),
            )),
        }
    }

    fn normalize_object(&mut self, obj: &Map<String, Value>, enclosing: Option<&str>, origin: &str) -> Result<Value> {
        let kind = obj
            .get("type")
            .ok_or_else(|| AlertError::resolution(origin, "type object without a 'type' attribute"))?;

        let kind = match kind {
            Value::String(kind) => kind.as_str(),
            // {"type": {...}} or {"type": [...]} wraps another schema
            nested => return self.normalize(nested, enclosing, origin),
        };

        match kind {
            "record" | "error" | "enum" | "fixed" => self.register_named(kind, obj, enclosing, origin),
            "array" => {
                let items = obj
                    .get("items")
                    .ok_or_else(|| AlertError::resolution(origin, "array without 'items'"))?;
                let mut out = obj.clone();
                out.insert("items".to_string(), self.normalize(items, enclosing, origin)?);
                Ok(Value::Object(out))
            }
            "map" => {
                let values = obj
                    .get("values")
                    .ok_or_else(|| AlertError::resolution(origin, "map without 'values'"))?;
                let mut out = obj.clone();
                out.insert("values".to_string(), self.normalize(values, enclosing, origin)?);
                Ok(Value::Object(out))
            }
            // primitive with attributes, e.g. a logical type
            p if is_primitive(p) => Ok(Value::Object(obj.clone())),
            reference => Ok(Value::String(self.resolve_reference(reference, enclosing, origin)?)),
        }
    }

    fn register_named(
        &mut self,
        kind: &str,
        obj: &Map<String, Value>,
        enclosing: Option<&str>,
        origin: &str,
    ) -> Result<Value> {
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AlertError::resolution(origin, format!("{kind} without a 'name'")))?;

        let namespace = if name.contains('.') {
            None
        } else {
            match obj.get("namespace").and_then(Value::as_str) {
                Some("") => None,
                Some(ns) => Some(ns),
                None => enclosing,
            }
        };
        let fullname = match namespace {
            Some(ns) => format!("{ns}.{name}"),
            None => name.to_string(),
        };

        if let Some(bad) = fullname.split('.').find(|part| !name_pattern().is_match(part)) {
            return Err(AlertError::resolution(origin, format!("invalid name segment '{bad}' in '{fullname}'")));
        }
        if is_primitive(&fullname) {
            return Err(AlertError::resolution(origin, format!("'{fullname}' shadows a primitive type")));
        }
        if self.contains(&fullname) {
            return Err(AlertError::resolution(origin, format!("type '{fullname}' is already defined")));
        }

        // Registered before the body is walked so records can refer to themselves
        self.definitions.insert(fullname.clone(), Value::Null);
        debug!(fragment = origin, name = %fullname, kind, "registered named type");

        let own_namespace = fullname.rsplit_once('.').map(|(ns, _)| ns.to_string());
        let mut body = obj.clone();
        body.remove("namespace");
        body.insert("name".to_string(), Value::String(fullname.clone()));

        match kind {
            "record" | "error" => {
                let fields = obj
                    .get("fields")
                    .and_then(Value::as_array)
                    .ok_or_else(|| AlertError::resolution(origin, format!("record '{fullname}' without 'fields' list")))?;
                let mut seen = HashSet::new();
                let mut normalized = Vec::with_capacity(fields.len());
                for field in fields {
                    let mut field = field
                        .as_object()
                        .cloned()
                        .ok_or_else(|| AlertError::resolution(origin, format!("field of '{fullname}' is not an object")))?;
                    let field_name = field
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| AlertError::resolution(origin, format!("field of '{fullname}' without a 'name'")))?
                        .to_string();
                    if !name_pattern().is_match(&field_name) {
                        return Err(AlertError::resolution(origin, format!("invalid field name '{field_name}' in '{fullname}'")));
                    }
                    if !seen.insert(field_name.clone()) {
                        return Err(AlertError::resolution(origin, format!("duplicate field '{field_name}' in '{fullname}'")));
                    }
                    let field_type = field
                        .get("type")
                        .ok_or_else(|| AlertError::resolution(origin, format!("field '{fullname}.{field_name}' without a 'type'")))?;
                    let field_type = self.normalize(field_type, own_namespace.as_deref(), origin)?;
                    field.insert("type".to_string(), field_type);
                    normalized.push(Value::Object(field));
                }
                body.insert("fields".to_string(), Value::Array(normalized));
            }
            "enum" => {
                let symbols = obj
                    .get("symbols")
                    .and_then(Value::as_array)
                    .ok_or_else(|| AlertError::resolution(origin, format!("enum '{fullname}' without 'symbols'")))?;
                if symbols.iter().any(|s| !s.as_str().map(|s| name_pattern().is_match(s)).unwrap_or(false)) {
                    return Err(AlertError::resolution(origin, format!("enum '{fullname}' has an invalid symbol")));
                }
            }
            _ => {
                if obj.get("size").and_then(Value::as_u64).is_none() {
                    return Err(AlertError::resolution(origin, format!("fixed '{fullname}' without a 'size'")));
                }
            }
        }

        self.definitions.insert(fullname.clone(), Value::Object(body));
        Ok(Value::String(fullname))
    }

    /// Inline definitions at first use; later uses stay as names
    fn expand(&self, node: &Value, emitted: &mut HashSet<String>) -> Value {
        match node {
            Value::String(name) if is_primitive(name) => node.clone(),
            Value::String(name) => {
                if !emitted.insert(name.clone()) {
                    return node.clone();
                }
                match self.definitions.get(name) {
                    Some(definition) => self.expand(definition, emitted),
                    None => node.clone(),
                }
            }
            Value::Array(branches) => Value::Array(branches.iter().map(|b| self.expand(b, emitted)).collect()),
            Value::Object(obj) => {
                let mut out = obj.clone();
                if let Some(fields) = obj.get("fields").and_then(Value::as_array) {
                    let fields = fields
                        .iter()
                        .map(|field| {
                            let mut field = field.clone();
                            if let Some(t) = field.get("type").cloned() {
                                field["type"] = self.expand(&t, emitted);
                            }
                            field
                        })
                        .collect();
                    out.insert("fields".to_string(), Value::Array(fields));
                }
                for key in ["items", "values"] {
                    if let Some(inner) = obj.get(key) {
                        out.insert(key.to_string(), self.expand(inner, emitted));
                    }
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }
}

/// Builds one [`ResolvedSchema`] from fragments added in dependency order
#[derive(Debug, Default)]
pub struct SchemaComposer {
    namespace: Namespace,
    last: Option<(String, Value)>,
    loaded: Vec<String>,
}

impl SchemaComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment. Every name it references must already be known.
    pub fn add(&mut self, fragment: &SchemaFragment) -> Result<&mut Self> {
        let root = self
            .namespace
            .normalize(&fragment.definition, None, &fragment.origin)?;
        info!(fragment = %fragment.origin, "loaded schema fragment");
        self.loaded.push(fragment.origin.clone());
        self.last = Some((fragment.origin.clone(), root));
        Ok(self)
    }

    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let fragment = SchemaFragment::from_path(path)?;
        self.add(&fragment)
    }

    /// Origins of the fragments added so far, in order
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    /// Expand the last fragment added into a self-contained schema
    pub fn finish(self) -> Result<ResolvedSchema> {
        let (origin, root) = self
            .last
            .ok_or_else(|| AlertError::resolution("<none>", "no schema fragments supplied"))?;
        let mut emitted = HashSet::new();
        let expanded = self.namespace.expand(&root, &mut emitted);
        ResolvedSchema::parse(&origin, expanded)
    }
}

/// Compose fragment files given lowest-level dependency first
pub fn compose<P: AsRef<Path>>(paths: &[P]) -> Result<ResolvedSchema> {
    let mut composer = SchemaComposer::new();
    for path in paths {
        composer.add_path(path)?;
    }
    composer.finish()
}

/// Compose already-loaded fragments in the order given
pub fn compose_fragments<'a>(fragments: impl IntoIterator<Item = &'a SchemaFragment>) -> Result<ResolvedSchema> {
    let mut composer = SchemaComposer::new();
    for fragment in fragments {
        composer.add(fragment)?;
    }
    composer.finish()
}

/// Compose the fragments bundled with the crate
pub fn compose_embedded() -> Result<ResolvedSchema> {
    let fragments = EMBEDDED_ORDER
        .iter()
        .map(|name| SchemaFragment::embedded(name))
        .collect::<Result<Vec<_>>>()?;
    compose_fragments(&fragments)
}

/// A fully resolved, immutable schema ready for encoding and decoding
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    schema: Schema,
    json: Value,
    named: HashMap<String, Schema>,
}

impl ResolvedSchema {
    /// Parse a self-contained schema document
    pub fn parse(origin: &str, json: Value) -> Result<Self> {
        let schema = Schema::parse(&json).map_err(|e| AlertError::resolution(origin, e.to_string()))?;
        Ok(Self::from_avro(schema, json))
    }

    pub(crate) fn from_avro(schema: Schema, json: Value) -> Self {
        let named = index_named(&schema);
        Self { schema, json, named }
    }

    pub fn avro(&self) -> &Schema {
        &self.schema
    }

    /// The expanded JSON document this schema was parsed from
    pub fn json(&self) -> &Value {
        &self.json
    }

    pub fn canonical_form(&self) -> String {
        self.schema.canonical_form()
    }

    /// Full name of the root type, if it is a named type
    pub fn name(&self) -> Option<String> {
        match &self.schema {
            Schema::Record(RecordSchema { name, .. })
            | Schema::Enum(EnumSchema { name, .. })
            | Schema::Fixed(FixedSchema { name, .. }) => Some(name.fullname(None)),
            _ => None,
        }
    }

    /// Look up a named type by full name
    pub fn lookup(&self, fullname: &str) -> Option<&Schema> {
        self.named.get(fullname)
    }

    pub(crate) fn named(&self) -> &HashMap<String, Schema> {
        &self.named
    }
}

/// Collect every named type defined inside a parsed schema
pub(crate) fn index_named(schema: &Schema) -> HashMap<String, Schema> {
    fn walk(schema: &Schema, named: &mut HashMap<String, Schema>) {
        match schema {
            Schema::Record(RecordSchema { name, fields, .. }) => {
                if named.insert(name.fullname(None), schema.clone()).is_none() {
                    for field in fields {
                        walk(&field.schema, named);
                    }
                }
            }
            Schema::Enum(EnumSchema { name, .. }) | Schema::Fixed(FixedSchema { name, .. }) => {
                named.insert(name.fullname(None), schema.clone());
            }
            Schema::Union(union) => {
                for variant in union.variants() {
                    walk(variant, named);
                }
            }
            Schema::Array(inner) | Schema::Map(inner) => walk(inner, named),
            _ => {}
        }
    }

    let mut named = HashMap::new();
    walk(schema, &mut named);
    named
}
