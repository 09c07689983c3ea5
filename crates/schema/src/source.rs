//! Descriptor source format (YAML) -> validated `EndpointDescriptor`s.
//!
//! The raw structs mirror the document field-for-field; every string-valued enum is
//! parsed into its closed Rust type here, once, so nothing downstream matches on text.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::{Mapping, Value as Yaml};
use statline_core::{
    ArrayRule, ArrayStrategy, CacheClass, CachingPolicy, DescriptorError, EndpointDescriptor, EndpointMeta, EnumValue,
    FlattenSpec, HttpMethod, ObjectRule, ObjectStrategy, PagingPolicy, ParamType, ParameterDescriptor, Pattern,
    ResponseShape, ShapeKind, ValidationRules,
};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    #[serde(default)]
    namespace: Option<String>,
    endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawEndpoint {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    method: Option<HttpMethod>,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    parameters: Vec<RawParam>,
    #[serde(default)]
    validation: Option<RawValidation>,
    #[serde(default)]
    paging: Option<RawPaging>,
    #[serde(default)]
    caching: Option<RawCaching>,
    #[serde(default)]
    response: Option<RawResponse>,
    #[serde(default)]
    metadata: Option<RawMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    ty: ParamType,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: String,
    #[serde(default)]
    min: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    min_length: Option<usize>,
    #[serde(default)]
    max_length: Option<usize>,
    #[serde(default)]
    values: Option<RawEnumValues>,
    #[serde(default)]
    default: Option<Yaml>,
}

/// `values: [a, b]` or `values: {a: "Label A", b: "Label B"}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnumValues {
    List(Vec<Yaml>),
    Labeled(Mapping),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawValidation {
    #[serde(default)]
    required_params: Vec<String>,
    #[serde(default)]
    requires_at_least_one_of: Option<RawGroups>,
    #[serde(default)]
    mutually_exclusive: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawGroups {
    Single(Vec<String>),
    Many(Vec<Vec<String>>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
enum RawPaging {
    None,
    Page {
        #[serde(default)]
        param: Option<String>,
        #[serde(default, rename = "maxPages")]
        max_pages: Option<u32>,
        #[serde(default, rename = "totalPath")]
        total_path: Option<String>,
    },
}

/// `caching: hourly`, `caching: 600`, or `caching: {policy: live, ttlSeconds: 30}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCaching {
    Class(CacheClass),
    Seconds(u64),
    Full(RawCachingFull),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawCachingFull {
    #[serde(default)]
    policy: Option<CacheClass>,
    #[serde(default)]
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawResponse {
    #[serde(default)]
    root_path: Option<String>,
    #[serde(default, rename = "type")]
    kind: ShapeKind,
    #[serde(default)]
    flatten: Option<RawFlatten>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawFlatten {
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    nested_objects: Mapping,
    #[serde(default)]
    nested_arrays: Mapping,
    #[serde(default)]
    rename: Mapping,
    #[serde(default)]
    exclude: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ObjectKind {
    Flatten,
    Stringify,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ArrayKind {
    Stringify,
    Explode,
    Ignore,
}

/// Rule value: bare strategy name or `{strategy, prefix, spread}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRule<K> {
    Short(K),
    Full {
        strategy: K,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        spread: bool,
    },
}

impl<K> RawRule<K> {
    fn into_parts(self) -> (K, Option<String>, bool) {
        match self {
            RawRule::Short(k) => (k, None, false),
            RawRule::Full { strategy, prefix, spread } => (strategy, prefix, spread),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawMeta {
    #[serde(default)]
    quota_weight: Option<u32>,
    #[serde(default)]
    tier: Option<String>,
}

/// Parse a whole descriptor document. Any malformed endpoint fails the entire parse.
pub fn parse_source(text: &str) -> Result<Vec<EndpointDescriptor>, DescriptorError> {
    let raw: RawSource = serde_yaml::from_str(text).map_err(|e| DescriptorError::Parse(e.to_string()))?;
    let mut out = Vec::with_capacity(raw.endpoints.len());
    let mut seen: HashSet<String> = HashSet::new();
    for (index, ep) in raw.endpoints.into_iter().enumerate() {
        let d = convert_endpoint(index, ep, raw.namespace.as_deref())?;
        if !seen.insert(d.id.clone()) {
            return Err(DescriptorError::DuplicateId { id: d.id });
        }
        out.push(d);
    }
    debug!(endpoints = out.len(), "descriptor source parsed");
    Ok(out)
}

pub fn read_source(path: &Path) -> Result<Vec<EndpointDescriptor>, DescriptorError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| DescriptorError::Io { path: path.display().to_string(), reason: e.to_string() })?;
    parse_source(&text)
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn convert_endpoint(index: usize, ep: RawEndpoint, default_ns: Option<&str>) -> Result<EndpointDescriptor, DescriptorError> {
    let id = non_empty(ep.id).ok_or(DescriptorError::MissingField { index, field: "id" })?;
    let path = non_empty(ep.path).ok_or(DescriptorError::MissingField { index, field: "path" })?;
    let category = non_empty(ep.category).ok_or(DescriptorError::MissingField { index, field: "category" })?;
    let invalid = |reason: String| DescriptorError::Invalid { id: id.clone(), reason };

    if !path.starts_with('/') {
        return Err(invalid(format!("path `{}` must start with '/'", path)));
    }
    let namespace = non_empty(ep.namespace)
        .or_else(|| default_ns.map(|s| s.to_string()))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("no namespace (set it on the endpoint or at the top level)".to_string()))?;

    let mut params: Vec<ParameterDescriptor> = Vec::with_capacity(ep.parameters.len());
    for rp in ep.parameters {
        let p = convert_param(&id, rp)?;
        if params.iter().any(|q| q.name == p.name) {
            return Err(DescriptorError::DuplicateParam { id: id.clone(), param: p.name });
        }
        params.push(p);
    }

    let validation = convert_validation(ep.validation.unwrap_or_default());
    let declared = |n: &str| params.iter().any(|p| p.name == n);
    let referenced = validation
        .required_params
        .iter()
        .chain(validation.at_least_one_of.iter().flatten())
        .chain(validation.mutually_exclusive.iter().flatten());
    for name in referenced {
        if !declared(name) {
            return Err(invalid(format!("validation rules reference undeclared parameter `{}`", name)));
        }
    }
    if validation.at_least_one_of.iter().chain(validation.mutually_exclusive.iter()).any(|g| g.is_empty()) {
        return Err(invalid("empty parameter group in validation rules".to_string()));
    }

    let paging = match ep.paging {
        None | Some(RawPaging::None) => PagingPolicy::None,
        Some(RawPaging::Page { param, max_pages, total_path }) => {
            let max_pages = max_pages.unwrap_or(10);
            if max_pages == 0 {
                return Err(invalid("paging.maxPages must be at least 1".to_string()));
            }
            PagingPolicy::Page {
                param: non_empty(param).unwrap_or_else(|| "page".to_string()),
                max_pages,
                total_path: non_empty(total_path).unwrap_or_else(|| "paging.total".to_string()),
            }
        }
    };

    let caching = match ep.caching {
        None => CachingPolicy::default(),
        Some(RawCaching::Class(c)) => CachingPolicy::class(c),
        Some(RawCaching::Seconds(s)) => CachingPolicy::explicit(Duration::from_secs(s)),
        Some(RawCaching::Full(f)) => CachingPolicy {
            class: f.policy.unwrap_or_default(),
            ttl_override: f.ttl_seconds.map(Duration::from_secs),
        },
    };

    let response = match ep.response {
        None => ResponseShape::default(),
        Some(r) => ResponseShape {
            root_path: r.root_path.map(|s| s.trim().to_string()).unwrap_or_else(|| "response".to_string()),
            kind: r.kind,
            flatten: convert_flatten(&id, r.flatten.unwrap_or_default())?,
        },
    };

    let meta = match ep.metadata {
        None => EndpointMeta::default(),
        Some(m) => {
            let d = EndpointMeta::default();
            EndpointMeta { quota_weight: m.quota_weight.unwrap_or(d.quota_weight), tier: m.tier.unwrap_or(d.tier) }
        }
    };

    Ok(EndpointDescriptor {
        id,
        namespace,
        path,
        method: ep.method.unwrap_or_default(),
        category,
        subcategory: non_empty(ep.subcategory),
        description: ep.description.trim().to_string(),
        keywords: ep.keywords,
        params,
        validation,
        paging,
        caching,
        response,
        meta,
    })
}

fn scalar_text(v: &Yaml) -> Option<String> {
    match v {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn convert_param(id: &str, rp: RawParam) -> Result<ParameterDescriptor, DescriptorError> {
    let name = rp.name.trim().to_string();
    let bad = |reason: String| DescriptorError::InvalidParam { id: id.to_string(), param: name.clone(), reason };
    if name.is_empty() {
        return Err(DescriptorError::Invalid { id: id.to_string(), reason: "parameter without a name".to_string() });
    }
    if let (Some(a), Some(b)) = (rp.min, rp.max) {
        if a > b { return Err(bad(format!("min {} > max {}", a, b))); }
    }
    if let (Some(a), Some(b)) = (rp.min_length, rp.max_length) {
        if a > b { return Err(bad(format!("minLength {} > maxLength {}", a, b))); }
    }
    let pattern = match rp.pattern.as_deref() {
        Some(src) => Some(Pattern::new(src).map_err(|e| bad(format!("invalid pattern: {}", e)))?),
        None => None,
    };
    let mut values: Vec<EnumValue> = Vec::new();
    match rp.values {
        None => {}
        Some(RawEnumValues::List(list)) => {
            for v in list.iter() {
                let value = scalar_text(v).ok_or_else(|| bad("enum values must be scalars".to_string()))?;
                values.push(EnumValue { label: value.clone(), value });
            }
        }
        Some(RawEnumValues::Labeled(map)) => {
            for (k, v) in map.iter() {
                let value = scalar_text(k).ok_or_else(|| bad("enum keys must be scalars".to_string()))?;
                let label = scalar_text(v).unwrap_or_else(|| value.clone());
                values.push(EnumValue { value, label });
            }
        }
    }
    if rp.ty == ParamType::Enum && values.is_empty() {
        return Err(bad("enum parameter declares no values".to_string()));
    }
    let default_value = match rp.default.as_ref() {
        None | Some(Yaml::Null) => None,
        Some(v) => Some(scalar_text(v).ok_or_else(|| bad("default must be a scalar".to_string()))?),
    };

    let p = ParameterDescriptor {
        name: name.clone(),
        ty: rp.ty,
        required: rp.required,
        description: rp.description.trim().to_string(),
        min: rp.min,
        max: rp.max,
        pattern,
        min_length: rp.min_length,
        max_length: rp.max_length,
        values,
        default_value,
    };
    if let Some(def) = p.default_value.as_deref() {
        crate::validate::check_value(&p, def).map_err(|e| bad(format!("default value rejected: {}", e)))?;
    }
    Ok(p)
}

fn convert_validation(rv: RawValidation) -> ValidationRules {
    let at_least_one_of = match rv.requires_at_least_one_of {
        None => Vec::new(),
        Some(RawGroups::Single(g)) => vec![g],
        Some(RawGroups::Many(gs)) => gs,
    };
    ValidationRules { required_params: rv.required_params, at_least_one_of, mutually_exclusive: rv.mutually_exclusive }
}

fn rule_path(id: &str, key: &Yaml) -> Result<String, DescriptorError> {
    key.as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DescriptorError::Invalid { id: id.to_string(), reason: "flatten rule path must be a non-empty string".to_string() })
}

fn convert_flatten(id: &str, rf: RawFlatten) -> Result<FlattenSpec, DescriptorError> {
    let invalid = |reason: String| DescriptorError::Invalid { id: id.to_string(), reason };
    let mut object_rules = Vec::with_capacity(rf.nested_objects.len());
    for (k, v) in rf.nested_objects.into_iter() {
        let path = rule_path(id, &k)?;
        let rule: RawRule<ObjectKind> = serde_yaml::from_value(v)
            .map_err(|e| invalid(format!("nestedObjects.{}: {}", path, e)))?;
        let strategy = match rule.into_parts() {
            (_, _, true) => return Err(invalid(format!("nestedObjects.{path}: spread only applies to explode"))),
            (ObjectKind::Flatten, prefix, _) => ObjectStrategy::Flatten { prefix },
            (ObjectKind::Stringify, _, _) => ObjectStrategy::Stringify,
        };
        object_rules.push(ObjectRule { path, strategy });
    }
    let mut array_rules = Vec::with_capacity(rf.nested_arrays.len());
    for (k, v) in rf.nested_arrays.into_iter() {
        let path = rule_path(id, &k)?;
        let rule: RawRule<ArrayKind> = serde_yaml::from_value(v)
            .map_err(|e| invalid(format!("nestedArrays.{}: {}", path, e)))?;
        let strategy = match rule.into_parts() {
            (ArrayKind::Explode, prefix, spread) => ArrayStrategy::Explode { prefix, spread },
            (_, _, true) => return Err(invalid(format!("nestedArrays.{path}: spread only applies to explode"))),
            (ArrayKind::Stringify, _, _) => ArrayStrategy::Stringify,
            (ArrayKind::Ignore, _, _) => ArrayStrategy::Ignore,
        };
        array_rules.push(ArrayRule { path, strategy });
    }
    let mut rename = Vec::with_capacity(rf.rename.len());
    for (k, v) in rf.rename.iter() {
        match (k.as_str(), v.as_str()) {
            (Some(from), Some(to)) if !from.is_empty() && !to.is_empty() => rename.push((from.to_string(), to.to_string())),
            _ => return Err(invalid("rename entries must map a column name to a column name".to_string())),
        }
    }
    Ok(FlattenSpec { prefix: rf.prefix, object_rules, array_rules, rename, exclude: rf.exclude })
}
