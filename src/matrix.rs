// SPDX-License-Identifier: Apache-2.0 OR MIT

// Evaluation of declarations into groups and targets: `${...}` interpolation
// of string fields and `matrix` expansion of target blocks.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    de::{Declarations, Target},
    error::Result,
    Config, Group,
};

/// Variables visible while evaluating a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalContext {
    vars: IndexMap<String, Value>,
}

impl EvalContext {
    pub fn new(vars: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self { vars: vars.into_iter().collect() }
    }

    /// Looks up a variable, following `.field` accessors into objects.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut v = self.vars.get(segments.next()?.trim())?;
        for segment in segments {
            v = v.get(segment.trim())?;
        }
        Some(v)
    }

    fn child(&self, bindings: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut vars = self.vars.clone();
        vars.extend(bindings);
        Self { vars }
    }
}

/// Returns one evaluation context per combination of matrix values.
///
/// Without a matrix, returns `cx` unchanged. The matrix must be a table of
/// lists; an empty list yields no combinations.
pub fn expand_matrix(matrix: Option<&Value>, cx: &EvalContext) -> Result<Vec<EvalContext>> {
    let Some(matrix) = matrix else {
        return Ok(vec![cx.clone()]);
    };
    let Value::Object(matrix) = matrix else {
        bail!(InvalidMatrix; "matrix must be a table of lists, found {matrix}");
    };
    let mut combinations: Vec<Vec<(String, Value)>> = vec![vec![]];
    for (name, values) in matrix {
        let Value::Array(values) = values else {
            bail!(InvalidMatrix; "matrix variable {name} must be a list, found {values}");
        };
        combinations = combinations
            .into_iter()
            .flat_map(|c| {
                values.iter().map(move |v| {
                    let mut c = c.clone();
                    c.push((name.clone(), v.clone()));
                    c
                })
            })
            .collect();
    }
    Ok(combinations.into_iter().map(|c| cx.child(c)).collect())
}

/// Replaces `${var}` and `${var.field}` in `s`. `$${` is a literal `${`.
pub(crate) fn interpolate(s: &str, cx: &EvalContext) -> Result<String> {
    let mut res = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        if rest[..start].ends_with('$') {
            res.push_str(&rest[..start - 1]);
            res.push_str("${");
            rest = &rest[start + 2..];
            continue;
        }
        res.push_str(&rest[..start]);
        let expr = &rest[start + 2..];
        let Some(end) = expr.find('}') else {
            bail!(InvalidExpression; "unterminated interpolation in \"{s}\"");
        };
        let name = expr[..end].trim();
        if name.is_empty() {
            bail!(InvalidExpression; "empty interpolation in \"{s}\"");
        }
        match cx.get(name) {
            Some(Value::String(v)) => res.push_str(v),
            Some(Value::Null) => {}
            Some(v) => res.push_str(&v.to_string()),
            None => bail!(UnknownVariable; "unknown variable {name} in \"{s}\""),
        }
        rest = &expr[end + 1..];
    }
    res.push_str(rest);
    Ok(res)
}

pub(crate) trait Interpolate {
    fn interpolate(&mut self, cx: &EvalContext) -> Result<()>;
}
impl Interpolate for String {
    fn interpolate(&mut self, cx: &EvalContext) -> Result<()> {
        if self.contains("${") {
            *self = interpolate(self, cx)?;
        }
        Ok(())
    }
}
impl<T: Interpolate> Interpolate for Option<T> {
    fn interpolate(&mut self, cx: &EvalContext) -> Result<()> {
        if let Some(v) = self {
            v.interpolate(cx)?;
        }
        Ok(())
    }
}
impl<T: Interpolate> Interpolate for Vec<T> {
    fn interpolate(&mut self, cx: &EvalContext) -> Result<()> {
        for v in self {
            v.interpolate(cx)?;
        }
        Ok(())
    }
}
impl<T: Interpolate> Interpolate for BTreeMap<String, T> {
    fn interpolate(&mut self, cx: &EvalContext) -> Result<()> {
        for v in self.values_mut() {
            v.interpolate(cx)?;
        }
        Ok(())
    }
}
impl Interpolate for Target {
    fn interpolate(&mut self, cx: &EvalContext) -> Result<()> {
        let Target {
            name: _,
            description,
            context,
            contexts,
            dockerfile,
            dockerfile_inline,
            args,
            labels,
            tags,
            platforms,
            target,
            cache_from,
            cache_to,
            outputs,
            secrets,
            ssh,
            annotations,
            attest,
            no_cache: _,
            no_cache_filter,
            pull: _,
            network_mode,
            inherits,
            linked: _,
        } = self;
        description.interpolate(cx)?;
        context.interpolate(cx)?;
        contexts.interpolate(cx)?;
        dockerfile.interpolate(cx)?;
        dockerfile_inline.interpolate(cx)?;
        args.interpolate(cx)?;
        labels.interpolate(cx)?;
        tags.interpolate(cx)?;
        platforms.interpolate(cx)?;
        target.interpolate(cx)?;
        cache_from.interpolate(cx)?;
        cache_to.interpolate(cx)?;
        outputs.interpolate(cx)?;
        secrets.interpolate(cx)?;
        ssh.interpolate(cx)?;
        annotations.interpolate(cx)?;
        attest.interpolate(cx)?;
        no_cache_filter.interpolate(cx)?;
        network_mode.interpolate(cx)?;
        inherits.interpolate(cx)?;
        Ok(())
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        bail!(
            InvalidName;
            "invalid name {name:?}: only alphanumeric characters, dashes and underscores are \
             allowed"
        );
    }
    Ok(())
}

impl Declarations {
    /// Evaluates these declarations into groups and targets.
    pub fn evaluate(self, cx: &EvalContext) -> Result<Config> {
        let Declarations { variable: _, group, target } = self;
        let mut config = Config::default();
        for (name, mut block) in group {
            if block.matrix.is_some() {
                bail!(InvalidMatrix; "group {name} cannot declare a matrix");
            }
            validate_name(&name)?;
            block.targets.interpolate(cx)?;
            config.groups.push(Group { name, targets: block.targets });
        }
        for (label, block) in target {
            if block.name.is_some() && block.matrix.is_none() {
                bail!(InvalidMatrix; "target {label} requires a matrix to set its name");
            }
            let contexts = expand_matrix(block.matrix.as_ref(), cx)?;
            if block.matrix.is_some() {
                tracing::debug!(block = %label, combinations = contexts.len(), "expanded matrix");
            }
            for cx in &contexts {
                let name = match &block.name {
                    Some(expr) => interpolate(expr, cx)?,
                    None => label.clone(),
                };
                validate_name(&name)?;
                let mut t = block.target.clone();
                t.interpolate(cx)?;
                t.name = name;
                config.targets.push(t);
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Kind;

    fn cx(v: Value) -> EvalContext {
        let Value::Object(m) = v else { unreachable!() };
        EvalContext::new(m)
    }

    #[test]
    fn interpolation() {
        let cx = cx(json!({ "v": "1.0", "n": 3, "item": { "tgt": "app" } }));
        assert_eq!(interpolate("app-${v}", &cx).unwrap(), "app-1.0");
        assert_eq!(interpolate("${ n }x${item.tgt}", &cx).unwrap(), "3xapp");
        assert_eq!(interpolate("$${v}", &cx).unwrap(), "${v}");
        assert_eq!(interpolate("plain $v", &cx).unwrap(), "plain $v");
        assert_eq!(interpolate("${x}", &cx).unwrap_err().kind(), Kind::UnknownVariable);
        assert_eq!(interpolate("${v", &cx).unwrap_err().kind(), Kind::InvalidExpression);
        assert_eq!(interpolate("${}", &cx).unwrap_err().kind(), Kind::InvalidExpression);
    }

    #[test]
    fn cartesian_product() {
        let base = cx(json!({ "base": "b" }));
        let matrix = json!({ "os": ["linux", "windows"], "ver": ["1", "2", "3"] });
        let res = expand_matrix(Some(&matrix), &base).unwrap();
        assert_eq!(res.len(), 6);
        assert_eq!(res[0].get("os"), Some(&json!("linux")));
        assert_eq!(res[0].get("ver"), Some(&json!("1")));
        assert_eq!(res[5].get("os"), Some(&json!("windows")));
        assert_eq!(res[5].get("ver"), Some(&json!("3")));
        assert!(res.iter().all(|c| c.get("base") == Some(&json!("b"))));

        assert_eq!(expand_matrix(None, &base).unwrap(), [base.clone()]);
        assert!(expand_matrix(Some(&json!({ "x": [] })), &base).unwrap().is_empty());
        for bad in [json!(["a"]), json!({ "x": "a" })] {
            assert_eq!(expand_matrix(Some(&bad), &base).unwrap_err().kind(), Kind::InvalidMatrix);
        }
    }

    fn decls(s: &str) -> Declarations {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn evaluate_named_matrix() {
        let config = decls(
            r#"
            [target.app]
            name = "app-${tgt}"
            matrix = { tgt = ["foo", "bar"] }
            args = { TARGET = "${tgt}" }
            "#,
        )
        .evaluate(&EvalContext::default())
        .unwrap();
        let names: Vec<_> = config.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["app-foo", "app-bar"]);
        assert_eq!(config.targets[1].args["TARGET"].as_deref(), Some("bar"));
    }

    #[test]
    fn evaluate_unnamed_matrix() {
        // Combinations without a name share the block label; they are
        // folded into one target when the config is deduplicated.
        let config = decls(
            r#"
            [target.app]
            matrix = { v = ["1", "2"] }
            tags = ["app:${v}"]
            secret = ["id=${v}"]
            "#,
        )
        .evaluate(&EvalContext::default())
        .unwrap();
        assert_eq!(config.targets.len(), 2);
        let config = config.dedupe();
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].tags, Some(vec!["app:2".to_owned()]));
        assert_eq!(config.targets[0].secrets, ["id=1", "id=2"]);
    }

    #[test]
    fn evaluate_errors() {
        let e = decls("[group.g]\nmatrix = { v = [\"1\"] }").evaluate(&EvalContext::default());
        assert_eq!(e.unwrap_err().kind(), Kind::InvalidMatrix);
        let e = decls("[target.t]\nname = \"x\"").evaluate(&EvalContext::default());
        assert_eq!(e.unwrap_err().kind(), Kind::InvalidMatrix);
        let e = decls("[target.t]\nname = \"a/${v}\"\nmatrix = { v = [\"1\"] }")
            .evaluate(&EvalContext::default());
        assert_eq!(e.unwrap_err().kind(), Kind::InvalidName);
    }
}
