//! A single drop spec as submitted in a physical graph.

use super::relation::{DropRel, LinkType};
use crate::error::{DropflowError, Result};
use crate::types::{ExecutionMode, Oid, Uid};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Broad category of a drop, from the spec's `categoryType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropCategory {
    /// Holds bytes.
    Data,
    /// Runs code over its inputs and writes its outputs.
    Application,
    /// Groups other drops; completes once its children do.
    Container,
}

impl DropCategory {
    /// Name used in the `categoryType` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "Data",
            Self::Application => "Application",
            Self::Container => "Container",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "Data" | "data" => Some(Self::Data),
            "Application" | "application" => Some(Self::Application),
            "Container" | "container" => Some(Self::Container),
            _ => None,
        }
    }

    /// Category implied by the legacy `type` field (`plain`, `app`, `container`).
    fn parse_legacy(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(Self::Data),
            "app" => Some(Self::Application),
            "container" => Some(Self::Container),
            _ => None,
        }
    }
}

impl fmt::Display for DropCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One drop spec.
///
/// The submitted JSON object is kept verbatim and is what
/// serialization returns, so `getGraph` hands back exactly what was
/// appended, including pass-through keys such as `reprodata`. The typed
/// fields are parsed from it once.
#[derive(Debug, Clone, PartialEq)]
pub struct DropSpec {
    raw: Map<String, Value>,
    oid: Oid,
    uid: Uid,
    category: DropCategory,
    dropclass: String,
    node: Option<String>,
    island: Option<String>,
    consumers: Vec<Oid>,
    streaming_consumers: Vec<Oid>,
    producers: Vec<Oid>,
    inputs: Vec<Oid>,
    streaming_inputs: Vec<Oid>,
    outputs: Vec<Oid>,
    parent: Option<Oid>,
    children: Vec<Oid>,
    expected_size: Option<u64>,
    execution_mode: ExecutionMode,
}

impl DropSpec {
    /// Parse a spec object. `index` is the spec's position in its list and
    /// only used in error messages.
    pub fn from_map(index: usize, raw: Map<String, Value>) -> Result<Self> {
        let oid = match raw.get("oid") {
            Some(Value::String(s)) if !s.is_empty() => Oid::new(s.as_str()),
            Some(_) => return Err(invalid(index, "'oid' must be a non-empty string")),
            None => {
                return Err(DropflowError::MissingField {
                    oid: format!("#{index}"),
                    field: "oid",
                });
            }
        };

        let (category, legacy) = match (raw.get("categoryType"), raw.get("type")) {
            (Some(Value::String(s)), _) => (
                DropCategory::parse(s)
                    .ok_or_else(|| invalid(index, format!("unknown categoryType '{s}'")))?,
                false,
            ),
            (None, Some(Value::String(s))) => (
                DropCategory::parse_legacy(s)
                    .ok_or_else(|| invalid(index, format!("unknown type '{s}'")))?,
                true,
            ),
            (Some(_), _) | (None, Some(_)) => {
                return Err(invalid(index, "'categoryType' must be a string"));
            }
            (None, None) => {
                return Err(DropflowError::MissingField {
                    oid: oid.to_string(),
                    field: "categoryType",
                });
            }
        };

        // Legacy specs name their implementation under `storage` or `app`.
        let dropclass = match raw.get("dropclass") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(invalid(index, "'dropclass' must be a string")),
            None if legacy => {
                let fallback = match category {
                    DropCategory::Data => opt_str(&raw, "storage", index)?,
                    DropCategory::Application => opt_str(&raw, "app", index)?,
                    DropCategory::Container => Some("container".to_string()),
                };
                fallback.ok_or_else(|| DropflowError::MissingField {
                    oid: oid.to_string(),
                    field: "dropclass",
                })?
            }
            None => {
                return Err(DropflowError::MissingField {
                    oid: oid.to_string(),
                    field: "dropclass",
                });
            }
        };

        let uid = opt_str(&raw, "uid", index)?
            .map(Uid::new)
            .unwrap_or_else(|| Uid::from(&oid));

        let expected_size = match raw.get("expectedSize") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| invalid(index, "'expectedSize' must be a non-negative integer"))?,
            ),
        };

        let execution_mode = match raw.get("executionMode") {
            None | Some(Value::Null) => ExecutionMode::default(),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| invalid(index, format!("invalid executionMode: {e}")))?,
        };

        Ok(Self {
            uid,
            category,
            dropclass,
            node: opt_str(&raw, "node", index)?,
            island: opt_str(&raw, "island", index)?,
            consumers: oid_list(&raw, LinkType::Consumer, index)?,
            streaming_consumers: oid_list(&raw, LinkType::StreamingConsumer, index)?,
            producers: oid_list(&raw, LinkType::Producer, index)?,
            inputs: oid_list(&raw, LinkType::Input, index)?,
            streaming_inputs: oid_list(&raw, LinkType::StreamingInput, index)?,
            outputs: oid_list(&raw, LinkType::Output, index)?,
            parent: opt_str(&raw, "parent", index)?.map(Oid::new),
            children: oid_list(&raw, LinkType::Child, index)?,
            expected_size,
            execution_mode,
            oid,
            raw,
        })
    }

    /// Parse a spec from any JSON value.
    pub fn from_value(index: usize, value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_map(index, map),
            other => Err(invalid(
                index,
                format!("expected an object, found {}", json_type(&other)),
            )),
        }
    }

    /// Start a data drop spec.
    pub fn data(oid: impl Into<String>, dropclass: impl Into<String>) -> Self {
        Self::build(oid.into(), DropCategory::Data, dropclass.into())
    }

    /// Start an application drop spec.
    pub fn app(oid: impl Into<String>, dropclass: impl Into<String>) -> Self {
        Self::build(oid.into(), DropCategory::Application, dropclass.into())
    }

    /// Start a container drop spec.
    pub fn container(oid: impl Into<String>) -> Self {
        Self::build(oid.into(), DropCategory::Container, "container".to_string())
    }

    fn build(oid: String, category: DropCategory, dropclass: String) -> Self {
        let mut raw = Map::new();
        raw.insert("oid".into(), Value::String(oid.clone()));
        raw.insert("categoryType".into(), Value::String(category.as_str().into()));
        raw.insert("dropclass".into(), Value::String(dropclass.clone()));
        let oid = Oid::new(oid);
        Self {
            raw,
            uid: Uid::from(&oid),
            oid,
            category,
            dropclass,
            node: None,
            island: None,
            consumers: Vec::new(),
            streaming_consumers: Vec::new(),
            producers: Vec::new(),
            inputs: Vec::new(),
            streaming_inputs: Vec::new(),
            outputs: Vec::new(),
            parent: None,
            children: Vec::new(),
            expected_size: None,
            execution_mode: ExecutionMode::Drop,
        }
    }

    /// Set the target node.
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        let node = node.into();
        self.raw.insert("node".into(), Value::String(node.clone()));
        self.node = Some(node);
        self
    }

    /// Set the target island.
    pub fn with_island(mut self, island: impl Into<String>) -> Self {
        let island = island.into();
        self.raw.insert("island".into(), Value::String(island.clone()));
        self.island = Some(island);
        self
    }

    /// Declare relations of type `rel` to the given drops.
    ///
    /// `Parent` takes the last oid given.
    pub fn with_links<I, S>(mut self, rel: LinkType, oids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let oids: Vec<Oid> = oids.into_iter().map(|s| Oid::new(s.into())).collect();
        let list = match rel {
            LinkType::Parent => {
                if let Some(parent) = oids.last() {
                    self.raw
                        .insert("parent".into(), Value::String(parent.to_string()));
                    self.parent = Some(parent.clone());
                }
                return self;
            }
            LinkType::Consumer => &mut self.consumers,
            LinkType::StreamingConsumer => &mut self.streaming_consumers,
            LinkType::Producer => &mut self.producers,
            LinkType::Input => &mut self.inputs,
            LinkType::StreamingInput => &mut self.streaming_inputs,
            LinkType::Output => &mut self.outputs,
            LinkType::Child => &mut self.children,
        };
        for oid in oids {
            if !list.contains(&oid) {
                list.push(oid);
            }
        }
        let json = list.iter().map(|o| Value::String(o.to_string())).collect();
        self.raw.insert(rel.spec_key().into(), Value::Array(json));
        self
    }

    /// Shorthand for `with_links(LinkType::Consumer, ..)`.
    pub fn with_consumers<I, S>(self, oids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_links(LinkType::Consumer, oids)
    }

    /// Shorthand for `with_links(LinkType::Output, ..)`.
    pub fn with_outputs<I, S>(self, oids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_links(LinkType::Output, oids)
    }

    /// Set the number of bytes after which the drop completes itself.
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.raw.insert("expectedSize".into(), Value::from(size));
        self.expected_size = Some(size);
        self
    }

    /// Set the execution mode.
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        let value = match mode {
            ExecutionMode::Drop => "DROP",
            ExecutionMode::External => "EXTERNAL",
        };
        self.raw
            .insert("executionMode".into(), Value::String(value.into()));
        self.execution_mode = mode;
        self
    }

    /// Set an application or storage parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    /// Object id.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Instance id (the oid unless the spec names one).
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Category.
    pub fn category(&self) -> DropCategory {
        self.category
    }

    /// Implementation selector.
    pub fn dropclass(&self) -> &str {
        &self.dropclass
    }

    /// Target node, if any.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Target island, if any.
    pub fn island(&self) -> Option<&str> {
        self.island.as_deref()
    }

    /// Expected number of bytes, if declared.
    pub fn expected_size(&self) -> Option<u64> {
        self.expected_size
    }

    /// Execution mode.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    /// Container this drop belongs to.
    pub fn parent(&self) -> Option<&Oid> {
        self.parent.as_ref()
    }

    /// Oids declared under the given relation.
    pub fn links(&self, rel: LinkType) -> &[Oid] {
        match rel {
            LinkType::Consumer => &self.consumers,
            LinkType::StreamingConsumer => &self.streaming_consumers,
            LinkType::Producer => &self.producers,
            LinkType::Input => &self.inputs,
            LinkType::StreamingInput => &self.streaming_inputs,
            LinkType::Output => &self.outputs,
            LinkType::Child => &self.children,
            LinkType::Parent => self.parent.as_slice(),
        }
    }

    /// Every relation this spec declares, as "`other` is `rel` of this drop".
    pub fn relations(&self) -> Vec<DropRel> {
        const ALL: [LinkType; 8] = [
            LinkType::Consumer,
            LinkType::StreamingConsumer,
            LinkType::Producer,
            LinkType::Input,
            LinkType::StreamingInput,
            LinkType::Output,
            LinkType::Parent,
            LinkType::Child,
        ];
        ALL.iter()
            .flat_map(|&rel| {
                self.links(rel)
                    .iter()
                    .map(move |other| DropRel::new(other.clone(), rel, self.oid.clone()))
            })
            .collect()
    }

    /// Look up a parameter, first at the top level and then under
    /// `applicationArgs` (where values may be wrapped as `{"value": ..}`).
    pub fn param(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.raw.get(key) {
            return Some(v);
        }
        let arg = self.raw.get("applicationArgs")?.get(key)?;
        match arg {
            Value::Object(m) if m.contains_key("value") => m.get("value"),
            other => Some(other),
        }
    }

    /// Numeric parameter.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.param(key).and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            other => other.as_f64(),
        })
    }

    /// The spec exactly as submitted.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Consume the spec, returning the submitted object.
    pub fn into_raw(self) -> Map<String, Value> {
        self.raw
    }
}

impl Serialize for DropSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DropSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Map::deserialize(deserializer)?;
        Self::from_map(0, raw).map_err(serde::de::Error::custom)
    }
}

fn invalid(index: usize, cause: impl Into<String>) -> DropflowError {
    DropflowError::InvalidDropSpec {
        index,
        cause: cause.into(),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn opt_str(raw: &Map<String, Value>, key: &str, index: usize) -> Result<Option<String>> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(
            index,
            format!("'{key}' must be a string, found {}", json_type(other)),
        )),
    }
}

/// Relation lists hold plain oids or single-entry `{oid: port}` objects.
fn oid_list(raw: &Map<String, Value>, rel: LinkType, index: usize) -> Result<Vec<Oid>> {
    let key = rel.spec_key();
    let items = match raw.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(invalid(
                index,
                format!("'{key}' must be a list, found {}", json_type(other)),
            ));
        }
    };
    let mut oids: Vec<Oid> = Vec::with_capacity(items.len());
    for item in items {
        let oid = match item {
            Value::String(s) => Oid::new(s.as_str()),
            Value::Object(m) if m.len() == 1 => match m.keys().next() {
                Some(k) => Oid::new(k.as_str()),
                None => continue,
            },
            other => {
                return Err(invalid(
                    index,
                    format!("'{key}' entries must be oids, found {}", json_type(other)),
                ));
            }
        };
        if !oids.contains(&oid) {
            oids.push(oid);
        }
    }
    Ok(oids)
}
