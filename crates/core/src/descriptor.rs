//! Endpoint descriptors: immutable value objects describing one remote endpoint.
//!
//! Descriptors are built once by `statline-schema` from a descriptor source and
//! shared behind `Arc` afterwards. Nothing here mutates after construction.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    String,
    Boolean,
    Date,
    Enum,
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamType::Integer => "integer",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Date => "date (YYYY-MM-DD)",
            ParamType::Enum => "enum",
        };
        f.write_str(s)
    }
}

/// Compiled string pattern; serializes as its source text.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    re: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self { source: source.to_string(), re: Regex::new(source)? })
    }

    pub fn as_str(&self) -> &str { &self.source }

    /// Whole-value match: the first match must cover the entire input.
    pub fn matches(&self, value: &str) -> bool {
        self.re.find(value).map(|m| m.start() == 0 && m.end() == value.len()).unwrap_or(false)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.source)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnumValue {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub pattern: Option<Pattern>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<EnumValue>,
    pub default_value: Option<String>,
}

impl ParameterDescriptor {
    /// Bare parameter of the given type with no constraints.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            description: String::new(),
            min: None,
            max: None,
            pattern: None,
            min_length: None,
            max_length: None,
            values: Vec::new(),
            default_value: None,
        }
    }

    pub fn is_enum_member(&self, value: &str) -> bool {
        self.values.iter().any(|v| v.value == value)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationRules {
    pub required_params: Vec<String>,
    /// Each group is satisfied when at least one member is present.
    pub at_least_one_of: Vec<Vec<String>>,
    /// Each group fails when more than one member is present.
    pub mutually_exclusive: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PagingPolicy {
    #[default]
    None,
    Page {
        param: String,
        max_pages: u32,
        /// Dotted path inside the envelope holding the total page count.
        total_path: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheClass {
    Static,
    Reference,
    Hourly,
    Live,
    #[default]
    None,
}

impl CacheClass {
    pub fn ttl(&self) -> Duration {
        match self {
            CacheClass::Static => Duration::from_secs(30 * 24 * 3600),
            CacheClass::Reference => Duration::from_secs(24 * 3600),
            CacheClass::Hourly => Duration::from_secs(3600),
            CacheClass::Live => Duration::from_secs(300),
            CacheClass::None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CachingPolicy {
    pub class: CacheClass,
    pub ttl_override: Option<Duration>,
}

impl CachingPolicy {
    pub fn class(class: CacheClass) -> Self { Self { class, ttl_override: None } }

    pub fn explicit(ttl: Duration) -> Self { Self { class: CacheClass::None, ttl_override: Some(ttl) } }

    /// Explicit TTL wins over the class mapping. Zero means "never cache".
    pub fn effective_ttl(&self) -> Duration {
        self.ttl_override.unwrap_or_else(|| self.class.ttl())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum ObjectStrategy {
    Flatten { prefix: Option<String> },
    Stringify,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum ArrayStrategy {
    Stringify,
    /// One row per member. With `spread`, members that are themselves arrays
    /// are opened up so their members become rows too (grouped tables).
    Explode {
        prefix: Option<String>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        spread: bool,
    },
    Ignore,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ObjectRule {
    pub path: String,
    #[serde(flatten)]
    pub strategy: ObjectStrategy,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArrayRule {
    pub path: String,
    #[serde(flatten)]
    pub strategy: ArrayStrategy,
}

/// Default sub-prefix for a rule path: `teams.home` -> `teams_home_`.
pub fn default_sub_prefix(path: &str) -> String {
    let mut s = path.replace('.', "_");
    s.push('_');
    s
}

impl ObjectRule {
    pub fn sub_prefix(&self) -> String {
        match &self.strategy {
            ObjectStrategy::Flatten { prefix: Some(p) } => p.clone(),
            _ => default_sub_prefix(&self.path),
        }
    }
}

impl ArrayRule {
    pub fn sub_prefix(&self) -> String {
        match &self.strategy {
            ArrayStrategy::Explode { prefix: Some(p), .. } => p.clone(),
            _ => default_sub_prefix(&self.path),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FlattenSpec {
    pub prefix: String,
    pub object_rules: Vec<ObjectRule>,
    pub array_rules: Vec<ArrayRule>,
    /// `(source column, target column)`, applied to final column names.
    pub rename: Vec<(String, String)>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResponseShape {
    pub root_path: String,
    pub kind: ShapeKind,
    pub flatten: FlattenSpec,
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self { root_path: "response".to_string(), kind: ShapeKind::Array, flatten: FlattenSpec::default() }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EndpointMeta {
    /// Budget units one call consumes in the admission controller.
    pub quota_weight: u32,
    pub tier: String,
}

impl Default for EndpointMeta {
    fn default() -> Self { Self { quota_weight: 1, tier: "free".to_string() } }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointDescriptor {
    pub id: String,
    pub namespace: String,
    pub path: String,
    pub method: HttpMethod,
    pub category: String,
    pub subcategory: Option<String>,
    pub description: String,
    pub keywords: Vec<String>,
    pub params: Vec<ParameterDescriptor>,
    pub validation: ValidationRules,
    pub paging: PagingPolicy,
    pub caching: CachingPolicy,
    pub response: ResponseShape,
    pub meta: EndpointMeta,
}

impl EndpointDescriptor {
    pub fn param(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Names that must be present: `requiredParams` plus parameters flagged `required`,
    /// in declaration order without duplicates.
    pub fn required_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for n in self.validation.required_params.iter() {
            if !out.contains(&n.as_str()) { out.push(n); }
        }
        for p in self.params.iter().filter(|p| p.required) {
            if !out.contains(&p.name.as_str()) { out.push(&p.name); }
        }
        out
    }
}
