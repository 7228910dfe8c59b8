use std::collections::BTreeMap;

use super::ResourceKey;

/// Non-fatal problems found while compiling, grouped by the resource they belong to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Warnings {
    inner: BTreeMap<ResourceKey, Vec<String>>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, owner: &ResourceKey, message: impl Into<String>) {
        self.inner.entry(owner.clone()).or_default().push(message.into());
    }

    pub fn add_all(&mut self, owner: &ResourceKey, messages: impl IntoIterator<Item = String>) {
        let entry = self.inner.entry(owner.clone()).or_default();
        entry.extend(messages);
    }

    pub fn merge(&mut self, other: Warnings) {
        for (owner, messages) in other.inner {
            self.inner.entry(owner).or_default().extend(messages);
        }
    }

    pub fn get(&self, owner: &ResourceKey) -> Option<&Vec<String>> {
        self.inner.get(owner)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &Vec<String>)> {
        self.inner.iter()
    }

    pub fn contains(&self, owner: &ResourceKey, message: &str) -> bool {
        self.inner.get(owner).is_some_and(|messages| messages.iter().any(|m| m == message))
    }
}

impl IntoIterator for Warnings {
    type Item = (ResourceKey, Vec<String>);
    type IntoIter = std::collections::btree_map::IntoIter<ResourceKey, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}
