// SPDX-License-Identifier: Apache-2.0 OR MIT

// Field-level merge rules applied between documents and along `inherits`
// chains. `a.merge(b)` gives `b` precedence:
//
// - scalars and replace-type lists (`tags`, `platforms`, `cache-to`,
//   `output`) are replaced when `b` declares them;
// - `cache-from`, `secret`, `ssh`, `annotations`, `no-cache-filter` and
//   `inherits` accumulate;
// - `attest` accumulates with one entry per `type=`;
// - `args`/`labels` entries are set when `b` has a value for them;
// - `contexts` entries are overwritten.

use std::collections::BTreeMap;

use crate::{
    normalize::{dedupe_slice, remove_dupes_by_type},
    Config, Group, Target,
};

pub(crate) trait Merge {
    /// Merges given value into this value.
    fn merge(&mut self, from: Self);
}

macro_rules! merge_non_container {
    ($($ty:tt)*) => {
        impl Merge for $($ty)* {
            fn merge(&mut self, from: Self) {
                *self = from;
            }
        }
    };
}
merge_non_container!(bool);
merge_non_container!(String);
// Replace-type lists only: accumulating lists are extended in `Target::merge`.
merge_non_container!(Vec<String>);

impl<T: Merge> Merge for Option<T> {
    fn merge(&mut self, from: Self) {
        match (self, from) {
            (_, None) => {}
            (this @ None, from) => *this = from,
            (Some(this), Some(from)) => this.merge(from),
        }
    }
}
impl Merge for BTreeMap<String, Option<String>> {
    fn merge(&mut self, from: Self) {
        for (key, value) in from {
            if value.is_some() {
                self.insert(key, value);
            }
        }
    }
}
impl Merge for BTreeMap<String, String> {
    fn merge(&mut self, from: Self) {
        self.extend(from);
    }
}

impl Merge for Group {
    fn merge(&mut self, from: Self) {
        for t in from.targets {
            if !self.targets.contains(&t) {
                self.targets.push(t);
            }
        }
    }
}

impl Merge for Target {
    fn merge(&mut self, from: Self) {
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
            mut cache_from,
            cache_to,
            outputs,
            mut secrets,
            mut ssh,
            mut annotations,
            mut attest,
            no_cache,
            mut no_cache_filter,
            pull,
            network_mode,
            mut inherits,
            linked: _,
        } = from;
        self.description.merge(description);
        self.context.merge(context);
        self.contexts.merge(contexts);
        self.dockerfile.merge(dockerfile);
        self.dockerfile_inline.merge(dockerfile_inline);
        self.args.merge(args);
        self.labels.merge(labels);
        self.tags.merge(tags);
        self.platforms.merge(platforms);
        self.target.merge(target);
        self.cache_from.append(&mut cache_from);
        self.cache_to.merge(cache_to);
        self.outputs.merge(outputs);
        self.secrets.append(&mut secrets);
        self.ssh.append(&mut ssh);
        self.annotations.append(&mut annotations);
        if !attest.is_empty() {
            self.attest.append(&mut attest);
            self.attest = remove_dupes_by_type(core::mem::take(&mut self.attest));
        }
        self.no_cache.merge(no_cache);
        self.no_cache_filter.append(&mut no_cache_filter);
        self.pull.merge(pull);
        self.network_mode.merge(network_mode);
        self.inherits.append(&mut inherits);
    }
}

impl Config {
    /// Merges another document's groups and targets into this config.
    ///
    /// Groups with the same name are unioned, keeping this config's member
    /// order. Targets with the same name are merged field by field, with
    /// `from` taking precedence. Everything else is appended in order.
    pub fn merge(&mut self, from: Config) {
        let Config { groups, targets } = from;
        for group in groups {
            match self.groups.iter_mut().find(|g| g.name == group.name) {
                Some(this) => this.merge(group),
                None => self.groups.push(group),
            }
        }
        for target in targets {
            match self.targets.iter_mut().find(|t| t.name == target.name) {
                Some(this) => this.merge(target),
                None => self.targets.push(target),
            }
        }
    }

    /// Removes duplicate group members and duplicate list entries, and
    /// folds targets that share a name into their first occurrence.
    ///
    /// `dedupe` is idempotent.
    pub fn dedupe(self) -> Config {
        let Config { groups, targets } = self;
        let mut res = Config {
            groups: Vec::with_capacity(groups.len()),
            targets: Vec::with_capacity(targets.len()),
        };
        for mut group in groups {
            match res.groups.iter_mut().find(|g| g.name == group.name) {
                Some(this) => this.merge(group),
                None => {
                    dedupe_slice(&mut group.targets);
                    res.groups.push(group);
                }
            }
        }
        for target in targets {
            match res.targets.iter_mut().find(|t| t.name == target.name) {
                Some(this) => this.merge(target),
                None => res.targets.push(target),
            }
        }
        for target in &mut res.targets {
            target.dedupe_lists();
        }
        res
    }
}
