// SPDX-License-Identifier: Apache-2.0 OR MIT

/*!
Load and resolve multi-target [bake](https://docs.docker.com/build/bake/) build definitions.

This library resolves the targets and groups declared in one or more TOML or
JSON documents into a flat set of fully materialized targets, for example, this
supports the following behaviors:

- Merging of several documents in order, later documents taking precedence.
- `inherits` chains, `matrix` multiplication, and `${VAR}` interpolation.
- `<pattern>.<field>=<value>` overrides, including `push` and `load` outputs.
- Targets used as build contexts of other targets through `target:<name>` contexts.

## Examples

```
# fn main() -> anyhow::Result<()> {
use bake_config::{read_targets, Document, ResolveOptions};

let doc = Document::new(
    "docker-bake.toml",
    r#"
    [target.db]
    [target.webapp]
    dockerfile = "Dockerfile.webapp"
    inherits = ["db"]
    "#,
);
let resolved = read_targets(
    &[doc],
    &["webapp"],
    ResolveOptions::default().env(Vec::<(String, String)>::new()),
)?;
let webapp = &resolved.targets["webapp"];
assert_eq!(webapp.dockerfile.as_deref(), Some("Dockerfile.webapp"));
assert_eq!(webapp.context.as_deref(), Some("."));
assert!(!resolved.targets.contains_key("db"));
# Ok(()) }
```

See also the `resolve` example in the `demos` directory that prints the resolved
definitions as JSON.
*/

#![doc(test(
    no_crate_inject,
    attr(
        deny(warnings, rust_2018_idioms, single_use_lifetimes),
        allow(dead_code, unused_variables)
    )
))]
#![forbid(unsafe_code)]
#![warn(
    // Lints that may help when writing public library.
    missing_debug_implementations,
    // missing_docs,
    clippy::alloc_instead_of_core,
    clippy::exhaustive_enums,
    clippy::exhaustive_structs,
    clippy::impl_trait_in_params,
    // clippy::missing_inline_in_public_items,
    // clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
mod error;

mod de;
mod document;
mod group;
mod link;
mod matrix;
mod merge;
mod normalize;
mod overrides;
mod resolve;

pub use crate::{
    de::{
        Config, Declarations, Document, Group, GroupBlock, Target, TargetBlock, VariableBlock,
        DEFAULT_CONTEXT, DEFAULT_DOCKERFILE,
    },
    document::parse as parse_document,
    error::{Error, Kind},
    matrix::{expand_matrix, EvalContext},
    overrides::{Override, OverrideKey, Overrides},
    resolve::{read_targets, ResolveContext, ResolveOptions, Resolved},
};
