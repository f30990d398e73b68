// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::Path;

use crate::{
    de::{Declarations, Document},
    error::{Context as _, Error, Result},
    matrix::EvalContext,
    normalize::merge_first_wins,
    Config, ResolveContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

fn format(name: &str) -> Option<Format> {
    match Path::new(name).extension()?.to_str()? {
        "toml" => Some(Format::Toml),
        "json" => Some(Format::Json),
        _ => None,
    }
}

fn decode(format: Format, data: &[u8]) -> Result<Declarations> {
    match format {
        Format::Toml => {
            let s = core::str::from_utf8(data).map_err(Error::new)?;
            toml::from_str(s).map_err(Error::new)
        }
        Format::Json => serde_json::from_slice(data).map_err(Error::new),
    }
}

/// Decodes a document.
///
/// Documents named `*.toml` or `*.json` are decoded in that format. Any other
/// document is tried as JSON, then as TOML.
pub fn parse(doc: &Document) -> Result<Declarations> {
    if let Some(format) = format(&doc.name) {
        return decode(format, &doc.data).with_context(|| format!("failed to parse {}", doc.name));
    }
    let json = match decode(Format::Json, &doc.data) {
        Ok(decls) => return Ok(decls),
        Err(e) => e,
    };
    let toml = match decode(Format::Toml, &doc.data) {
        Ok(decls) => return Ok(decls),
        Err(e) => e,
    };
    bail!(
        ParseConflict;
        "failed to parse {}: not a JSON document ({json}) nor a TOML document ({toml})",
        doc.name
    )
}

impl Config {
    /// Decodes, evaluates and merges documents in order, then deduplicates
    /// the result.
    ///
    /// Variables are bound from, in order of precedence, the bindings in
    /// `cx`, environment variables named like a declared variable, and the
    /// first declared default.
    pub fn load(documents: &[Document], cx: &ResolveContext) -> Result<Config> {
        let decls = documents.iter().map(parse).collect::<Result<Vec<_>>>()?;
        let eval = eval_context(&decls, cx);
        let mut config = Config::default();
        for (doc, decls) in documents.iter().zip(decls) {
            tracing::debug!(document = %doc.name, "loading document");
            let c = decls.evaluate(&eval).with_context(|| format!("failed to load {}", doc.name))?;
            config.merge(c);
        }
        Ok(config.dedupe())
    }
}

fn eval_context(decls: &[Declarations], cx: &ResolveContext) -> EvalContext {
    let declared = decls.iter().flat_map(|d| d.variable.iter());
    let caller: Vec<_> = cx.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let env: Vec<_> = declared
        .clone()
        .filter_map(|(k, _)| Some((k.clone(), cx.env(k)?.into())))
        .collect();
    let defaults: Vec<_> = declared
        .map(|(k, v)| (k.clone(), v.default.clone().unwrap_or_else(|| "".into())))
        .collect();
    EvalContext::new(merge_first_wins([caller, env, defaults]))
}
