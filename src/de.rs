// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bake definitions as declared in documents and as resolved by this crate.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

/// The dockerfile used when a resolved target does not declare one.
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
/// The build context used when a resolved target does not declare one.
pub const DEFAULT_CONTEXT: &str = ".";

const LINK_PREFIX: &str = "target:";
const LOCAL_CONTEXT_PREFIX: &str = "cwd://";

/// A named source document whose bytes are decoded by [`Config::load`](crate::Config::load).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Document {
    /// The file name. The extension (`.toml` or `.json`) selects the decoder.
    pub name: String,
    pub data: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), data: data.into() }
    }
}

/// Groups and targets merged from one or more documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Config {
    #[serde(default)]
    #[serde(rename = "group")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    #[serde(default)]
    #[serde(rename = "target")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
}

/// A named collection of target and group names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self { name: name.into(), targets: targets.into_iter().map(Into::into).collect() }
    }
}

/// A single build unit.
///
/// Optional scalar fields distinguish "not declared" (`None`) from an empty
/// value. `tags`, `platforms`, `cache_to` and `outputs` are replaced as a
/// whole when a later source declares them, so they are optional as well;
/// the remaining lists accumulate across sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Target {
    #[serde(skip_deserializing)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Named build contexts. A value of the form `target:<name>` links to
    /// another target.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub contexts: BTreeMap<String, String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile_inline: Option<String>,

    /// Build arguments. A `None` value never overrides an inherited value.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Option<String>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, Option<String>>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
    /// The build stage.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cache_from: Vec<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_to: Option<Vec<String>>,
    #[serde(default)]
    #[serde(rename = "output")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
    #[serde(default)]
    #[serde(rename = "secret")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh: Vec<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
    /// Attestations. At most one entry per `type=` survives resolution.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attest: Vec<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_cache: Option<bool>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub no_cache_filter: Vec<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<bool>,
    #[serde(default)]
    #[serde(rename = "network")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    /// Targets whose fields are merged in before this target's own fields.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<String>,

    // Set on targets that were only pulled in through another target's
    // context link. Never serialized.
    #[serde(skip)]
    pub(crate) linked: bool,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Returns `true` if this target was resolved only because another
    /// target links to it.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Returns the names of targets referenced as `target:<name>` contexts.
    pub fn linked_targets(&self) -> impl Iterator<Item = &str> + '_ {
        self.contexts.values().filter_map(|v| v.strip_prefix(LINK_PREFIX))
    }

    /// Returns `true` if the build context is forced to the local working
    /// directory with a `cwd://` prefix.
    pub fn is_local_context(&self) -> bool {
        self.context.as_deref().is_some_and(|c| c.starts_with(LOCAL_CONTEXT_PREFIX))
    }

    pub(crate) fn fill_defaults(&mut self) {
        self.inherits.clear();
        if self.context.is_none() {
            self.context = Some(DEFAULT_CONTEXT.to_owned());
        }
        if self.dockerfile.is_none() {
            self.dockerfile = Some(DEFAULT_DOCKERFILE.to_owned());
        }
    }
}

/// The raw contents of one document, before evaluation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Declarations {
    #[serde(default)]
    pub variable: IndexMap<String, VariableBlock>,
    #[serde(default)]
    pub group: IndexMap<String, GroupBlock>,
    #[serde(default)]
    pub target: IndexMap<String, TargetBlock>,
}

/// A `variable.<NAME>` declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct VariableBlock {
    pub default: Option<Value>,
}

/// A `group.<name>` declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct GroupBlock {
    #[serde(default)]
    pub targets: Vec<String>,
    /// Always rejected: only targets can be multiplied by a matrix.
    pub matrix: Option<Value>,
}

/// A `target.<label>` declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct TargetBlock {
    /// A mapping from variable name to the list of values it takes.
    pub matrix: Option<Value>,
    /// Per-combination name template. Requires `matrix`.
    pub name: Option<String>,
    #[serde(flatten)]
    pub target: Target,
}
