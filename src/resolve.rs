// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsString,
};

use indexmap::IndexMap;
use serde_derive::Serialize;
use serde_json::Value;

use crate::{
    error::Result,
    merge::Merge as _,
    normalize::dedupe_slice,
    Config, Document, Group, Overrides, Target,
};

const DEFAULT_GROUP: &str = "default";

/// Options for [`read_targets`] and [`Config::load`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct ResolveOptions {
    env: Option<HashMap<String, String>>,
    vars: IndexMap<String, Value>,
    overrides: Vec<String>,
}

impl ResolveOptions {
    /// Sets the specified key-values as environment variables to be read during
    /// resolution.
    ///
    /// Environment variables provide values for declared variables and for
    /// `args.<NAME>` overrides given without a value. Entries that are not
    /// valid UTF-8 are ignored.
    ///
    /// # Default value
    ///
    /// [`std::env::vars_os`]
    pub fn env(
        mut self,
        vars: impl IntoIterator<Item = (impl Into<OsString>, impl Into<OsString>)>,
    ) -> Self {
        let mut env = HashMap::default();
        for (k, v) in vars {
            if let (Ok(k), Ok(v)) = (k.into().into_string(), v.into().into_string()) {
                env.insert(k, v);
            }
        }
        self.env = Some(env);
        self
    }
    /// Binds a variable. Bindings take precedence over environment variables
    /// and declared defaults.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
    /// Binds several variables. See [`Self::var`].
    pub fn vars(
        mut self,
        vars: impl IntoIterator<Item = (impl Into<String>, impl Into<Value>)>,
    ) -> Self {
        self.vars.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
    /// Adds `<pattern>.<field>[.<name>]=<value>` overrides, applied in the
    /// order they were given.
    pub fn overrides(mut self, overrides: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.overrides.extend(overrides.into_iter().map(Into::into));
        self
    }

    pub fn into_context(mut self) -> ResolveContext {
        if self.env.is_none() {
            self = self.env(std::env::vars_os());
        }
        let env = self.env.unwrap_or_default();
        ResolveContext { env, vars: self.vars, overrides: self.overrides }
    }
}

/// The inputs of one resolution, snapshotted from [`ResolveOptions`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ResolveContext {
    env: HashMap<String, String>,
    pub(crate) vars: IndexMap<String, Value>,
    overrides: Vec<String>,
}

impl ResolveContext {
    /// Returns the value of an environment variable in this context.
    pub fn env(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
    pub fn overrides(&self) -> &[String] {
        &self.overrides
    }
}

/// Fully resolved targets and the groups reachable from the requested names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Resolved {
    #[serde(rename = "group")]
    pub groups: BTreeMap<String, Group>,
    #[serde(rename = "target")]
    pub targets: BTreeMap<String, Target>,
}

impl Config {
    pub(crate) fn find_target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Resolves a target: merges the targets it inherits from, applies the
    /// overrides for it, and fills in the default context and dockerfile.
    ///
    /// Inheritance is depth-first. Later ancestors take precedence over earlier
    /// ones, and the target's own fields take precedence over all of them. An
    /// ancestor that inherits, directly or not, from the target being resolved
    /// contributes nothing on the repeated visit.
    pub fn resolve_target(&self, name: &str, overrides: &Overrides) -> Result<Target> {
        let mut t = self.build_target(name, overrides, &mut HashMap::new())?;
        t.fill_defaults();
        Ok(t)
    }

    // `None` in `visited` marks a target that is still being resolved.
    fn target(
        &self,
        name: &str,
        overrides: &Overrides,
        visited: &mut HashMap<String, Option<Target>>,
    ) -> Result<Option<Target>> {
        match visited.get(name) {
            Some(Some(t)) => {
                tracing::trace!(name, "target already resolved");
                Ok(Some(t.clone()))
            }
            Some(None) => {
                tracing::debug!(name, "target inherits from itself, skipping repeated visit");
                Ok(None)
            }
            None => self.build_target(name, overrides, visited).map(Some),
        }
    }

    fn build_target(
        &self,
        name: &str,
        overrides: &Overrides,
        visited: &mut HashMap<String, Option<Target>>,
    ) -> Result<Target> {
        let Some(decl) = self.find_target(name) else {
            bail!(TargetNotFound; "failed to find target {name}");
        };
        tracing::debug!(name, inherits = ?decl.inherits, "resolving target");
        visited.insert(name.to_owned(), None);

        let mut ancestors = Target::default();
        for parent in &decl.inherits {
            if let Some(t) = self.target(parent, overrides, visited)? {
                ancestors.merge(t);
            }
        }
        let mut t = Target::default();
        t.merge(ancestors);
        t.merge(decl.clone());
        t.name = name.to_owned();
        if let Some(o) = overrides.get(name) {
            t.add_overrides(o)?;
        }
        t.normalize();

        visited.insert(name.to_owned(), Some(t.clone()));
        Ok(t)
    }

    /// Resolves the requested target and group names.
    ///
    /// The result holds every leaf target of the requested names and every
    /// target they link to, and every group visited on the way. Target names
    /// requested directly are also listed in a `default` group.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        names: &[S],
        overrides: &Overrides,
    ) -> Result<Resolved> {
        let mut res = Resolved::default();
        for name in names {
            let (targets, groups) = self.resolve_group(name.as_ref());
            for t in targets {
                if !res.targets.contains_key(&t) {
                    let resolved = self.resolve_target(&t, overrides)?;
                    res.targets.insert(t, resolved);
                }
            }
            for g in groups {
                if let Some(group) = self.find_group(&g) {
                    res.groups.insert(g, group.clone());
                }
            }
        }

        for name in names {
            let name = name.as_ref();
            if name == DEFAULT_GROUP || self.find_group(name).is_some() {
                continue;
            }
            res.groups
                .entry(DEFAULT_GROUP.to_owned())
                .or_insert_with(|| Group::new(DEFAULT_GROUP, Vec::<String>::new()))
                .targets
                .push(name.to_owned());
        }
        if let Some(g) = res.groups.get_mut(DEFAULT_GROUP) {
            dedupe_slice(&mut g.targets);
        }

        let requested: Vec<String> = res.targets.keys().cloned().collect();
        for name in requested {
            let t = res.targets[&name].clone();
            self.load_links(&name, &t, &mut res.targets, overrides, &[])?;
        }
        Ok(res)
    }
}

/// Loads `documents`, parses the overrides in `options`, and resolves `names`.
///
/// This is a shorthand for [`Config::load`], [`Config::parse_overrides`] and
/// [`Config::resolve_all`].
pub fn read_targets<S: AsRef<str>>(
    documents: &[Document],
    names: &[S],
    options: ResolveOptions,
) -> Result<Resolved> {
    let cx = options.into_context();
    let config = Config::load(documents, &cx)?;
    let overrides = config.parse_overrides(cx.overrides(), &cx)?;
    config.resolve_all(names, &overrides)
}
