//! Human-readable output for `describe` and `fetch`.

use std::fmt::Write as _;

use statline_core::{ArrayStrategy, EndpointDescriptor, ObjectStrategy, PagingPolicy, Row};

const MAX_CELL_WIDTH: usize = 40;

/// Column-aligned table; every row is expected to share the first row's columns.
pub fn table(rows: &[Row]) -> String {
    let Some(first) = rows.first() else { return "(no rows)\n".to_string() };
    let headers: Vec<&str> = first.columns().collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| headers.iter().map(|h| clip(&r.get(h).map(|c| c.to_string()).unwrap_or_default())).collect())
        .collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| cells.iter().map(|r| r[i].chars().count()).chain([h.chars().count()]).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    let line = |vals: Vec<&str>| {
        let padded: Vec<String> = vals.iter().zip(widths.iter()).map(|(v, w)| format!("{:<w$}", v, w = *w)).collect();
        format!("{}\n", padded.join("  ").trim_end())
    };
    out.push_str(&line(headers.clone()));
    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(dashes.iter().map(String::as_str).collect()));
    for r in cells.iter() {
        out.push_str(&line(r.iter().map(|s| s.as_str()).collect()));
    }
    let _ = writeln!(out, "({} row{})", rows.len(), if rows.len() == 1 { "" } else { "s" });
    out
}

fn clip(s: &str) -> String {
    if s.chars().count() <= MAX_CELL_WIDTH {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(MAX_CELL_WIDTH - 1).collect();
    cut.push('…');
    cut
}

pub fn describe(d: &EndpointDescriptor) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  {} {}{}", d.id, d.method.as_str(), d.namespace, d.path);
    if !d.description.is_empty() {
        let _ = writeln!(out, "  {}", d.description);
    }
    let category = match d.subcategory.as_deref() {
        Some(sub) => format!("{} / {}", d.category, sub),
        None => d.category.clone(),
    };
    let _ = writeln!(out, "  category: {category}");
    if !d.keywords.is_empty() {
        let _ = writeln!(out, "  keywords: {}", d.keywords.join(", "));
    }
    let _ = writeln!(out, "  cache ttl: {}s", d.caching.effective_ttl().as_secs());
    if let PagingPolicy::Page { param, max_pages, total_path } = &d.paging {
        let _ = writeln!(out, "  paging: {param} up to {max_pages} pages (total at {total_path})");
    }
    let _ = writeln!(out, "  quota weight: {}, tier: {}", d.meta.quota_weight, d.meta.tier);

    if !d.params.is_empty() {
        let _ = writeln!(out, "parameters:");
        let required = d.required_names();
        for p in d.params.iter() {
            let mut notes: Vec<String> = Vec::new();
            if required.contains(&p.name.as_str()) {
                notes.push("required".into());
            }
            match (p.min, p.max) {
                (Some(lo), Some(hi)) => notes.push(format!("{lo}..={hi}")),
                (Some(lo), None) => notes.push(format!(">= {lo}")),
                (None, Some(hi)) => notes.push(format!("<= {hi}")),
                (None, None) => {}
            }
            if let Some(pat) = p.pattern.as_ref() {
                notes.push(format!("pattern {}", pat.as_str()));
            }
            if p.min_length.is_some() || p.max_length.is_some() {
                let lo = p.min_length.map(|n| n.to_string()).unwrap_or_default();
                let hi = p.max_length.map(|n| n.to_string()).unwrap_or_default();
                notes.push(format!("length {lo}..{hi}"));
            }
            if !p.values.is_empty() {
                notes.push(format!("one of {}", p.values.iter().map(|v| v.value.as_str()).collect::<Vec<_>>().join("|")));
            }
            if let Some(def) = p.default_value.as_deref() {
                notes.push(format!("default {def}"));
            }
            let _ = writeln!(out, "  {:<12} {:<18} {}", p.name, p.ty.to_string(), notes.join("; "));
        }
    }
    for g in d.validation.at_least_one_of.iter() {
        let _ = writeln!(out, "  at least one of: {}", g.join(", "));
    }
    for g in d.validation.mutually_exclusive.iter() {
        let _ = writeln!(out, "  at most one of: {}", g.join(", "));
    }

    let f = &d.response.flatten;
    let _ = writeln!(out, "response: {} ({:?})", d.response.root_path, d.response.kind);
    if !f.prefix.is_empty() {
        let _ = writeln!(out, "  prefix: {}", f.prefix);
    }
    for r in f.object_rules.iter() {
        let how = match &r.strategy {
            ObjectStrategy::Flatten { .. } => format!("flatten as {}{}*", f.prefix, r.sub_prefix()),
            ObjectStrategy::Stringify => "stringify".to_string(),
        };
        let _ = writeln!(out, "  {} -> {}", r.path, how);
    }
    for r in f.array_rules.iter() {
        let how = match &r.strategy {
            ArrayStrategy::Explode { spread, .. } => {
                format!("explode{} as {}{}*", if *spread { " (spread groups)" } else { "" }, f.prefix, r.sub_prefix())
            }
            ArrayStrategy::Stringify => "stringify".to_string(),
            ArrayStrategy::Ignore => "ignore".to_string(),
        };
        let _ = writeln!(out, "  {}[] -> {}", r.path, how);
    }
    for (from, to) in f.rename.iter() {
        let _ = writeln!(out, "  rename {from} -> {to}");
    }
    if !f.exclude.is_empty() {
        let _ = writeln!(out, "  exclude: {}", f.exclude.join(", "));
    }
    out
}
