// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;

use crate::{normalize::dedupe_slice, Config, Group};

#[derive(Debug, Clone, Default)]
struct Visit {
    targets: Vec<String>,
    groups: Vec<String>,
}

impl Config {
    pub(crate) fn find_group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Expands `name` into the target names it refers to and the names of
    /// all groups visited on the way, both deduplicated in visit order.
    ///
    /// A name that is not a group is returned as the only target. A member
    /// whose expansion yields no targets, such as an empty group or a group
    /// revisited through a cycle, is kept as a target name itself.
    pub fn resolve_group(&self, name: &str) -> (Vec<String>, Vec<String>) {
        let mut visited = HashMap::new();
        let Visit { mut targets, mut groups } = self.group(name, &mut visited);
        dedupe_slice(&mut targets);
        dedupe_slice(&mut groups);
        (targets, groups)
    }

    // `None` in `visited` marks a group that is still being expanded.
    fn group(&self, name: &str, visited: &mut HashMap<String, Option<Visit>>) -> Visit {
        match visited.get(name) {
            Some(Some(v)) => {
                tracing::trace!(group = name, "group already resolved");
                return v.clone();
            }
            Some(None) => {
                tracing::debug!(group = name, "group contains itself, skipping repeated visit");
                return Visit::default();
            }
            None => {}
        }
        let Some(group) = self.find_group(name) else {
            return Visit { targets: vec![name.to_owned()], groups: vec![] };
        };
        visited.insert(name.to_owned(), None);

        let mut v = Visit { targets: Vec::with_capacity(group.targets.len()), groups: vec![] };
        v.groups.push(name.to_owned());
        for member in &group.targets {
            let Visit { targets, groups } = self.group(member, visited);
            if targets.is_empty() {
                v.targets.push(member.clone());
            } else {
                v.targets.extend(targets);
            }
            v.groups.extend(groups);
        }
        visited.insert(name.to_owned(), Some(v.clone()));
        v
    }
}
