use std::collections::HashSet;

/// Plugins still waiting for a terminal result.
///
/// Built once from the queued plugin names; afterwards names can only be
/// removed, so the set shrinks monotonically over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSet {
    names: HashSet<String>,
}

impl PendingSet {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Returns true if `name` was still pending.
    pub fn remove(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Pending names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}

impl<S: Into<String>> FromIterator<S> for PendingSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
