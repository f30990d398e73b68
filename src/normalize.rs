// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::Target;

/// Removes duplicate entries, keeping the first occurrence of each.
pub(crate) fn dedupe_slice(s: &mut Vec<String>) {
    let mut seen = HashSet::with_capacity(s.len());
    s.retain(|v| seen.insert(v.clone()));
}

fn dedupe_non_empty(s: &mut Vec<String>) {
    s.retain(|v| !v.is_empty());
    dedupe_slice(s);
}

/// Returns the value of `key` in a comma-separated `key=value` list such as
/// `type=image,push=true`.
pub(crate) fn csv_field<'a>(s: &'a str, key: &str) -> Option<&'a str> {
    s.split(',').find_map(|field| {
        let (k, v) = field.split_once('=')?;
        (k.trim() == key).then_some(v.trim())
    })
}

/// Keeps one attestation per `type=`: the position of the first occurrence
/// with the value of the last one. Entries without a type are kept as is.
pub(crate) fn remove_dupes_by_type(attest: Vec<String>) -> Vec<String> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(attest.len());
    let mut res: Vec<String> = Vec::with_capacity(attest.len());
    for a in attest {
        let Some(ty) = csv_field(&a, "type").map(str::to_owned) else {
            res.push(a);
            continue;
        };
        match positions.get(&ty) {
            Some(&i) => res[i] = a,
            None => {
                positions.insert(ty, res.len());
                res.push(a);
            }
        }
    }
    res
}

/// Merges maps from several sources. For each key, the first source that
/// defines it wins.
pub(crate) fn merge_first_wins<K, V, I>(sources: impl IntoIterator<Item = I>) -> IndexMap<K, V>
where
    K: core::hash::Hash + Eq,
    I: IntoIterator<Item = (K, V)>,
{
    let mut res = IndexMap::new();
    for source in sources {
        for (k, v) in source {
            res.entry(k).or_insert(v);
        }
    }
    res
}

impl Target {
    /// Removes exact duplicates from every list field, keeping order.
    pub(crate) fn dedupe_lists(&mut self) {
        for list in [&mut self.tags, &mut self.platforms, &mut self.cache_to, &mut self.outputs]
            .into_iter()
            .flatten()
        {
            dedupe_slice(list);
        }
        for list in [
            &mut self.cache_from,
            &mut self.secrets,
            &mut self.ssh,
            &mut self.annotations,
            &mut self.attest,
            &mut self.no_cache_filter,
            &mut self.inherits,
        ] {
            dedupe_slice(list);
        }
    }

    /// Drops empty and duplicate list entries, keeps one attestation per
    /// type, and drops named contexts with empty values and maps entries
    /// without a value.
    pub(crate) fn normalize(&mut self) {
        for list in [&mut self.tags, &mut self.platforms, &mut self.cache_to, &mut self.outputs]
            .into_iter()
            .flatten()
        {
            dedupe_non_empty(list);
        }
        for list in [
            &mut self.cache_from,
            &mut self.secrets,
            &mut self.ssh,
            &mut self.annotations,
            &mut self.no_cache_filter,
        ] {
            dedupe_non_empty(list);
        }
        self.attest.retain(|v| !v.is_empty());
        self.attest = remove_dupes_by_type(core::mem::take(&mut self.attest));
        self.contexts.retain(|_, v| !v.is_empty());
        self.args.retain(|_, v| v.is_some());
        self.labels.retain(|_, v| v.is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn dedupe() {
        let mut v = strings(&["b", "a", "b", "c", "a"]);
        dedupe_slice(&mut v);
        assert_eq!(v, ["b", "a", "c"]);
        dedupe_slice(&mut v);
        assert_eq!(v, ["b", "a", "c"]);
    }

    #[test]
    fn attest_dupes() {
        let res = remove_dupes_by_type(strings(&[
            "type=sbom",
            "type=provenance,mode=min",
            "opaque",
            "type=sbom,generator=custom",
            "type=provenance,mode=max",
        ]));
        assert_eq!(res, [
            "type=sbom,generator=custom",
            "type=provenance,mode=max",
            "opaque"
        ]);
    }

    #[test]
    fn csv() {
        assert_eq!(csv_field("type=image,push=true", "type"), Some("image"));
        assert_eq!(csv_field("name=x, type = registry", "type"), Some("registry"));
        assert_eq!(csv_field("dest=out", "type"), None);
    }

    #[test]
    fn first_wins() {
        let m = merge_first_wins([vec![("a", 1)], vec![("a", 2), ("b", 3)]]);
        assert_eq!(m["a"], 1);
        assert_eq!(m["b"], 3);
        assert_eq!(m.keys().copied().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn normalize_target() {
        let mut t = Target::new("t");
        t.tags = Some(strings(&["a", "", "a", "b"]));
        t.secrets = strings(&["", "id=x", "id=x"]);
        t.attest = strings(&["type=sbom", "", "type=sbom,disabled=true"]);
        t.contexts.insert("a".into(), String::new());
        t.contexts.insert("b".into(), "./b".into());
        t.args.insert("A".into(), None);
        t.args.insert("B".into(), Some("1".into()));
        t.normalize();
        assert_eq!(t.tags, Some(strings(&["a", "b"])));
        assert_eq!(t.secrets, ["id=x"]);
        assert_eq!(t.attest, ["type=sbom,disabled=true"]);
        assert_eq!(t.contexts.keys().collect::<Vec<_>>(), ["b"]);
        assert_eq!(t.args.keys().collect::<Vec<_>>(), ["B"]);
    }
}
