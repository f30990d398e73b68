// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;

use crate::{error::Result, Config, Overrides, Target};

fn same_platforms(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

impl Config {
    /// Resolves the targets that `target` links to through `target:<name>`
    /// contexts, inserting them into `resolved` if they are not already
    /// there.
    ///
    /// `path` holds the targets on the current link chain; reaching one of
    /// them again is a cycle. Targets shared by several chains are fine.
    pub(crate) fn load_links(
        &self,
        name: &str,
        target: &Target,
        resolved: &mut BTreeMap<String, Target>,
        overrides: &Overrides,
        path: &[String],
    ) -> Result<()> {
        let mut path = path.to_vec();
        path.push(name.to_owned());
        for linked in target.linked_targets() {
            if linked == name {
                bail!(SelfLink; "target {name} cannot link to itself");
            }
            if path.iter().any(|p| p == linked) {
                bail!(LinkCycle; "infinite loop from {name} to {linked}");
            }
            if !resolved.contains_key(linked) {
                let mut t = self.resolve_target(linked, overrides)?;
                // Linked targets are consumed as build contexts, never exported.
                t.outputs = None;
                t.linked = true;
                tracing::debug!(linked, from = name, "resolved linked target");
                resolved.insert(linked.to_owned(), t);
            }
            let t2 = resolved[linked].clone();
            self.load_links(linked, &t2, resolved, overrides, &path)?;

            if let (Some(p1), Some(p2)) = (&target.platforms, &t2.platforms) {
                if p1.len() > 1 && p2.len() > 1 && !same_platforms(p1, p2) {
                    bail!(
                        PlatformMismatch;
                        "target {linked} can't be used by {name} because it is defined for \
                         different platforms {p2:?} and {p1:?}"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kind;

    fn target(name: &str, links: &[&str], platforms: &[&str]) -> Target {
        let mut t = Target::new(name);
        for (i, l) in links.iter().enumerate() {
            t.contexts.insert(format!("ctx{i}"), format!("target:{l}"));
        }
        if !platforms.is_empty() {
            t.platforms = Some(platforms.iter().map(|&p| p.to_owned()).collect());
        }
        t.outputs = Some(vec!["type=registry".to_owned()]);
        t
    }

    fn load(config: &Config, name: &str) -> Result<BTreeMap<String, Target>> {
        let overrides = Overrides::default();
        let mut resolved = BTreeMap::new();
        let t = config.resolve_target(name, &overrides)?;
        resolved.insert(name.to_owned(), t.clone());
        config.load_links(name, &t, &mut resolved, &overrides, &[])?;
        Ok(resolved)
    }

    fn config(targets: Vec<Target>) -> Config {
        let mut c = Config::default();
        c.targets = targets;
        c
    }

    #[test]
    fn transitive() {
        let c = config(vec![target("app", &["mid"], &[]), target("mid", &["base"], &[]), target(
            "base",
            &[],
            &[],
        )]);
        let resolved = load(&c, "app").unwrap();
        assert_eq!(resolved.keys().collect::<Vec<_>>(), ["app", "base", "mid"]);
        assert!(!resolved["app"].is_linked());
        assert!(resolved["mid"].is_linked());
        assert_eq!(resolved["mid"].outputs, None);
        assert_eq!(resolved["app"].outputs, Some(vec!["type=registry".to_owned()]));
    }

    #[test]
    fn diamond() {
        let c = config(vec![
            target("app", &["a", "b"], &[]),
            target("a", &["base"], &[]),
            target("b", &["base"], &[]),
            target("base", &[], &[]),
        ]);
        assert_eq!(load(&c, "app").unwrap().len(), 4);
    }

    #[test]
    fn self_link() {
        let c = config(vec![target("app", &["app"], &[])]);
        assert_eq!(load(&c, "app").unwrap_err().kind(), Kind::SelfLink);
    }

    #[test]
    fn cycle() {
        let c = config(vec![target("a", &["b"], &[]), target("b", &["c"], &[]), target(
            "c",
            &["a"],
            &[],
        )]);
        assert_eq!(load(&c, "a").unwrap_err().kind(), Kind::LinkCycle);
    }

    #[test]
    fn missing() {
        let c = config(vec![target("app", &["nope"], &[])]);
        assert_eq!(load(&c, "app").unwrap_err().kind(), Kind::TargetNotFound);
    }

    #[test]
    fn platforms() {
        let c = config(vec![
            target("app", &["base"], &["linux/arm64", "linux/amd64"]),
            target("base", &[], &["linux/amd64", "linux/arm64"]),
        ]);
        load(&c, "app").unwrap();

        // A single platform on either side is always compatible.
        let c = config(vec![
            target("app", &["base"], &["linux/amd64"]),
            target("base", &[], &["linux/arm64", "linux/amd64"]),
        ]);
        load(&c, "app").unwrap();

        let c = config(vec![
            target("app", &["base"], &["linux/amd64", "linux/arm64"]),
            target("base", &[], &["linux/amd64", "linux/riscv64"]),
        ]);
        assert_eq!(load(&c, "app").unwrap_err().kind(), Kind::PlatformMismatch);
    }
}
