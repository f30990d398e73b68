// SPDX-License-Identifier: Apache-2.0 OR MIT

// Overrides take the form `<pattern>.<field>[.<name>]=<value>`, where
// `<pattern>` is a target name, a group name, or a glob matched against
// target names.

use core::{fmt, slice};
use std::collections::BTreeMap;

use globset::GlobBuilder;
use indexmap::IndexMap;

use crate::{
    error::{Context as _, Result},
    normalize::csv_field,
    Config, ResolveContext, Target,
};

/// A pending value for one target field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Override {
    Value(String),
    /// Values of a list field, accumulated across repeated overrides.
    Array(Vec<String>),
}

impl Override {
    /// Returns the scalar value, or the last element of an array.
    pub fn value(&self) -> &str {
        match self {
            Self::Value(v) => v,
            Self::Array(v) => v.last().map_or("", String::as_str),
        }
    }
    pub fn values(&self) -> &[String] {
        match self {
            Self::Value(v) => slice::from_ref(v),
            Self::Array(v) => v,
        }
    }
}

/// A target field that can be overridden.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum OverrideKey {
    Context,
    Dockerfile,
    DockerfileInline,
    Description,
    Target,
    Network,
    Args(String),
    Contexts(String),
    Labels(String),
    Tags,
    Platform,
    CacheFrom,
    CacheTo,
    Output,
    Secrets,
    Ssh,
    Attest,
    Annotations,
    NoCacheFilter,
    NoCache,
    Pull,
    Push,
    Load,
}

impl OverrideKey {
    fn parse(field: &str, name: Option<&str>, key: &str) -> Result<Self> {
        let named = |f: fn(String) -> Self| match name {
            Some(name) if !name.is_empty() => Ok(f(name.to_owned())),
            _ => {
                Err(format_err!(InvalidOverrideSyntax; "invalid key {key}, {field} requires name"))
            }
        };
        let k = match field {
            "args" => return named(Self::Args),
            "contexts" => return named(Self::Contexts),
            "labels" => return named(Self::Labels),
            "context" => Self::Context,
            "dockerfile" => Self::Dockerfile,
            "dockerfile-inline" => Self::DockerfileInline,
            "description" => Self::Description,
            "target" => Self::Target,
            "network" => Self::Network,
            "tags" => Self::Tags,
            "platform" => Self::Platform,
            "cache-from" => Self::CacheFrom,
            "cache-to" => Self::CacheTo,
            "output" => Self::Output,
            "secrets" => Self::Secrets,
            "ssh" => Self::Ssh,
            "attest" => Self::Attest,
            "annotations" => Self::Annotations,
            "no-cache-filter" => Self::NoCacheFilter,
            "no-cache" => Self::NoCache,
            "pull" => Self::Pull,
            "push" => Self::Push,
            "load" => Self::Load,
            _ => bail!(UnknownOverrideKey; "unknown key: {field}"),
        };
        if name.is_some() {
            bail!(InvalidOverrideSyntax; "invalid key {key}, {field} does not take a name");
        }
        Ok(k)
    }

    /// Returns `true` if repeated overrides of this key accumulate values.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Self::Tags
                | Self::Platform
                | Self::CacheFrom
                | Self::CacheTo
                | Self::Output
                | Self::Secrets
                | Self::Ssh
                | Self::Attest
                | Self::Annotations
                | Self::NoCacheFilter
        )
    }
}

impl fmt::Display for OverrideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Args(name) => return write!(f, "args.{name}"),
            Self::Contexts(name) => return write!(f, "contexts.{name}"),
            Self::Labels(name) => return write!(f, "labels.{name}"),
            Self::Context => "context",
            Self::Dockerfile => "dockerfile",
            Self::DockerfileInline => "dockerfile-inline",
            Self::Description => "description",
            Self::Target => "target",
            Self::Network => "network",
            Self::Tags => "tags",
            Self::Platform => "platform",
            Self::CacheFrom => "cache-from",
            Self::CacheTo => "cache-to",
            Self::Output => "output",
            Self::Secrets => "secrets",
            Self::Ssh => "ssh",
            Self::Attest => "attest",
            Self::Annotations => "annotations",
            Self::NoCacheFilter => "no-cache-filter",
            Self::NoCache => "no-cache",
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Load => "load",
        };
        f.write_str(s)
    }
}

/// Parsed overrides, keyed by target name, then by field in the order they
/// were first given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides(BTreeMap<String, IndexMap<OverrideKey, Override>>);

impl Overrides {
    /// Returns the overrides for the given target.
    pub fn get(&self, target: &str) -> Option<&IndexMap<OverrideKey, Override>> {
        self.0.get(target)
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexMap<OverrideKey, Override>)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Config {
    /// Parses `<pattern>.<field>[.<name>]=<value>` strings.
    ///
    /// `args.<NAME>` without `=<value>` takes its value from the environment
    /// variable `NAME` and is ignored if that variable is not set.
    pub fn parse_overrides<S: AsRef<str>>(
        &self,
        values: &[S],
        cx: &ResolveContext,
    ) -> Result<Overrides> {
        let mut res = Overrides::default();
        for raw in values {
            let raw = raw.as_ref();
            let (key, value) = match raw.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (raw, None),
            };
            let mut keys = key.splitn(3, '.');
            let (Some(pattern), Some(field)) = (keys.next(), keys.next()) else {
                bail!(InvalidOverrideSyntax; "invalid override key {key}, expected target.name");
            };
            let okey = OverrideKey::parse(field, keys.next(), key)?;
            let value = match (value, &okey) {
                (Some(v), _) => v.to_owned(),
                (None, OverrideKey::Args(name)) => match cx.env(name) {
                    Some(v) => v.to_owned(),
                    None => {
                        tracing::debug!(key, "environment variable not set, ignoring override");
                        continue;
                    }
                },
                (None, _) => {
                    bail!(
                        InvalidOverrideSyntax;
                        "invalid override {raw}, expected target.name=value"
                    )
                }
            };

            for name in self.target_names(pattern)? {
                let fields = res.0.entry(name).or_default();
                if okey.is_array() {
                    match fields.entry(okey.clone()).or_insert_with(|| Override::Array(vec![])) {
                        Override::Array(v) => v.push(value.clone()),
                        o @ Override::Value(_) => *o = Override::Array(vec![value.clone()]),
                    }
                } else {
                    // Replacing an existing entry keeps its position.
                    fields.insert(okey.clone(), Override::Value(value.clone()));
                }
            }
        }
        Ok(res)
    }

    /// Returns the names of the targets matched by an override pattern.
    fn target_names(&self, pattern: &str) -> Result<Vec<String>> {
        if self.targets.iter().any(|t| t.name == pattern) {
            return Ok(vec![pattern.to_owned()]);
        }
        if self.groups.iter().any(|g| g.name == pattern) {
            return Ok(self.resolve_group(pattern).0);
        }
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("could not match targets with '{pattern}'"))?
            .compile_matcher();
        let names: Vec<String> = self
            .targets
            .iter()
            .filter(|t| glob.is_match(&t.name))
            .map(|t| t.name.clone())
            .collect();
        if names.is_empty() {
            bail!(NoTargetMatch; "could not find any target matching '{pattern}'");
        }
        Ok(names)
    }
}

fn parse_bool(key: &OverrideKey, value: &str) -> Result<bool> {
    value.parse().with_context(|| format!("invalid value {value} for boolean key {key}"))
}

impl Target {
    /// Applies overrides to this target. Lists are replaced, except
    /// `annotations` and `attest` which are appended to.
    pub(crate) fn add_overrides(
        &mut self,
        overrides: &IndexMap<OverrideKey, Override>,
    ) -> Result<()> {
        for (key, o) in overrides {
            let value = o.value();
            match key {
                OverrideKey::Context => self.context = Some(value.to_owned()),
                OverrideKey::Dockerfile => self.dockerfile = Some(value.to_owned()),
                OverrideKey::DockerfileInline => self.dockerfile_inline = Some(value.to_owned()),
                OverrideKey::Description => self.description = Some(value.to_owned()),
                OverrideKey::Target => self.target = Some(value.to_owned()),
                OverrideKey::Network => self.network_mode = Some(value.to_owned()),
                OverrideKey::Args(name) => {
                    self.args.insert(name.clone(), Some(value.to_owned()));
                }
                OverrideKey::Contexts(name) => {
                    self.contexts.insert(name.clone(), value.to_owned());
                }
                OverrideKey::Labels(name) => {
                    self.labels.insert(name.clone(), Some(value.to_owned()));
                }
                OverrideKey::Tags => self.tags = Some(o.values().to_vec()),
                OverrideKey::Platform => self.platforms = Some(o.values().to_vec()),
                OverrideKey::CacheFrom => self.cache_from = o.values().to_vec(),
                OverrideKey::CacheTo => self.cache_to = Some(o.values().to_vec()),
                OverrideKey::Output => self.outputs = Some(o.values().to_vec()),
                OverrideKey::Secrets => self.secrets = o.values().to_vec(),
                OverrideKey::Ssh => self.ssh = o.values().to_vec(),
                OverrideKey::NoCacheFilter => self.no_cache_filter = o.values().to_vec(),
                OverrideKey::Annotations => self.annotations.extend_from_slice(o.values()),
                OverrideKey::Attest => self.attest.extend_from_slice(o.values()),
                OverrideKey::NoCache => self.no_cache = Some(parse_bool(key, value)?),
                OverrideKey::Pull => self.pull = Some(parse_bool(key, value)?),
                OverrideKey::Push => set_push_override(&mut self.outputs, parse_bool(key, value)?),
                OverrideKey::Load => set_load_override(&mut self.outputs, parse_bool(key, value)?),
            }
        }
        Ok(())
    }
}

// Without outputs, an image output is pushed whatever the value; the value
// only sets the `push=` field of existing image outputs.
fn set_push_override(outputs: &mut Option<Vec<String>>, push: bool) {
    match outputs {
        Some(outputs) if !outputs.is_empty() => {
            for output in outputs {
                if matches!(csv_field(output, "type"), Some("image" | "registry")) {
                    output.push_str(if push { ",push=true" } else { ",push=false" });
                }
            }
        }
        _ => *outputs = Some(vec!["type=image,push=true".to_owned()]),
    }
}

fn set_load_override(outputs: &mut Option<Vec<String>>, load: bool) {
    if !load {
        return;
    }
    let outputs = outputs.get_or_insert_with(Vec::new);
    if !outputs.iter().any(|o| csv_field(o, "type") == Some("docker")) {
        outputs.push("type=docker".to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Group, Kind, ResolveOptions};

    fn config() -> Config {
        let mut c = Config::default();
        for name in ["app", "app-debug", "db"] {
            c.targets.push(Target::new(name));
        }
        c.groups.push(Group::new("backend", ["db"]));
        c
    }

    fn cx() -> ResolveContext {
        ResolveOptions::default().env([("TOKEN", "from-env")]).into_context()
    }

    #[test]
    fn parse() {
        let o = config()
            .parse_overrides(
                &[
                    "app.tags=a:1",
                    "app.tags=a:2",
                    "app.dockerfile=Dockerfile.1",
                    "app.dockerfile=Dockerfile.2",
                    "app.args.TOKEN",
                    "app.args.MISSING",
                    "app.args.VERSION=1.0",
                ],
                &cx(),
            )
            .unwrap();
        let app = o.get("app").unwrap();
        assert_eq!(app[&OverrideKey::Tags], Override::Array(vec!["a:1".into(), "a:2".into()]));
        assert_eq!(app[&OverrideKey::Dockerfile], Override::Value("Dockerfile.2".into()));
        assert_eq!(app[&OverrideKey::Args("TOKEN".into())].value(), "from-env");
        assert_eq!(app[&OverrideKey::Args("VERSION".into())].value(), "1.0");
        assert!(!app.contains_key(&OverrideKey::Args("MISSING".into())));
        assert!(o.get("db").is_none());
    }

    #[test]
    fn patterns() {
        let c = config();
        let o = c.parse_overrides(&["app*.target=dev"], &cx()).unwrap();
        assert_eq!(o.iter().map(|(k, _)| k).collect::<Vec<_>>(), ["app", "app-debug"]);
        let o = c.parse_overrides(&["app.target=dev"], &cx()).unwrap();
        assert_eq!(o.iter().map(|(k, _)| k).collect::<Vec<_>>(), ["app"]);
        let o = c.parse_overrides(&["backend.pull=true"], &cx()).unwrap();
        assert_eq!(o.iter().map(|(k, _)| k).collect::<Vec<_>>(), ["db"]);
        let o = c.parse_overrides(&["d?.pull=true"], &cx()).unwrap();
        assert_eq!(o.iter().map(|(k, _)| k).collect::<Vec<_>>(), ["db"]);

        let e = c.parse_overrides(&["web*.target=dev"], &cx()).unwrap_err();
        assert_eq!(e.kind(), Kind::NoTargetMatch);
        let e = c.parse_overrides(&["[.target=dev"], &cx()).unwrap_err();
        assert_eq!(e.kind(), Kind::InvalidPattern);
    }

    #[test]
    fn syntax_errors() {
        let c = config();
        for (raw, kind) in [
            ("app=1", Kind::InvalidOverrideSyntax),
            ("app.dockerfile", Kind::InvalidOverrideSyntax),
            ("app.args=1", Kind::InvalidOverrideSyntax),
            ("app.contexts=1", Kind::InvalidOverrideSyntax),
            ("app.tags.x=1", Kind::InvalidOverrideSyntax),
            ("app.foo=1", Kind::UnknownOverrideKey),
        ] {
            assert_eq!(c.parse_overrides(&[raw], &cx()).unwrap_err().kind(), kind, "{raw}");
        }
    }

    #[test]
    fn apply() {
        let c = config();
        let o = c
            .parse_overrides(
                &[
                    "app.context=./c",
                    "app.contexts.base=target:db",
                    "app.labels.team=core",
                    "app.platform=linux/amd64",
                    "app.platform=linux/arm64",
                    "app.annotations=a=b",
                    "app.attest=type=sbom",
                    "app.no-cache=true",
                ],
                &cx(),
            )
            .unwrap();
        let mut t = Target::new("app");
        t.annotations = vec!["x=y".into()];
        t.platforms = Some(vec!["linux/s390x".into()]);
        t.add_overrides(o.get("app").unwrap()).unwrap();
        assert_eq!(t.context.as_deref(), Some("./c"));
        assert_eq!(t.contexts["base"], "target:db");
        assert_eq!(t.labels["team"].as_deref(), Some("core"));
        assert_eq!(t.platforms, Some(vec!["linux/amd64".into(), "linux/arm64".into()]));
        assert_eq!(t.annotations, ["x=y", "a=b"]);
        assert_eq!(t.attest, ["type=sbom"]);
        assert_eq!(t.no_cache, Some(true));
    }

    #[test]
    fn invalid_bool() {
        let o = config().parse_overrides(&["app.pull=yes"], &cx()).unwrap();
        let e = Target::new("app").add_overrides(o.get("app").unwrap()).unwrap_err();
        assert_eq!(e.kind(), Kind::InvalidBooleanValue);
        assert_eq!(e.to_string(), "invalid value yes for boolean key pull");
    }

    #[test]
    fn push() {
        let mut outputs = None;
        set_push_override(&mut outputs, true);
        assert_eq!(outputs, Some(vec!["type=image,push=true".to_owned()]));

        let mut outputs = Some(vec![]);
        set_push_override(&mut outputs, false);
        assert_eq!(outputs, Some(vec!["type=image,push=true".to_owned()]));

        let mut outputs =
            Some(vec!["type=image,name=x".to_owned(), "type=local,dest=out".to_owned()]);
        set_push_override(&mut outputs, false);
        assert_eq!(
            outputs,
            Some(vec!["type=image,name=x,push=false".to_owned(), "type=local,dest=out".to_owned()])
        );
    }

    #[test]
    fn load() {
        let mut outputs = None;
        set_load_override(&mut outputs, true);
        assert_eq!(outputs, Some(vec!["type=docker".to_owned()]));
        set_load_override(&mut outputs, true);
        assert_eq!(outputs, Some(vec!["type=docker".to_owned()]));

        let mut outputs = Some(vec!["type=registry".to_owned()]);
        set_load_override(&mut outputs, false);
        assert_eq!(outputs, Some(vec!["type=registry".to_owned()]));
        set_load_override(&mut outputs, true);
        assert_eq!(outputs, Some(vec!["type=registry".to_owned(), "type=docker".to_owned()]));
    }
}
