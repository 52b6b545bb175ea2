//! Ordered groups of named actions: column definitions and cuts.
//!
//! A group behaves like an insertion-ordered map from action name to
//! expression text. Re-adding an existing name replaces the expression
//! but keeps the original position.

/// An ordered group of named column definitions.
#[derive(Debug, Clone, Default)]
pub struct VarGroup {
    name: String,
    items: Vec<(String, String)>,
}

/// An ordered group of named cuts.
#[derive(Debug, Clone, Default)]
pub struct CutGroup {
    name: String,
    items: Vec<(String, String)>,
}

/// Borrowed reference to either kind of group, for mixed application.
#[derive(Debug, Clone, Copy)]
pub enum GroupRef<'a> {
    /// Column definitions.
    Vars(&'a VarGroup),
    /// Cuts.
    Cuts(&'a CutGroup),
}

fn upsert(items: &mut Vec<(String, String)>, key: &str, value: &str) {
    if let Some(slot) = items.iter_mut().find(|(k, _)| k == key) {
        slot.1 = value.to_string();
    } else {
        items.push((key.to_string(), value.to_string()));
    }
}

impl VarGroup {
    /// New empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a definition, or replace it in place if the name exists.
    pub fn add(&mut self, column: &str, expr: &str) -> &mut Self {
        upsert(&mut self.items, column, expr);
        self
    }

    /// Remove a definition. Returns whether it was present.
    pub fn remove(&mut self, column: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|(k, _)| k != column);
        self.items.len() != before
    }

    /// Expression for a column, if present.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate `(column, expression)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow as a [`GroupRef`] for [`crate::CutGraph::apply`].
    pub fn as_group(&self) -> GroupRef<'_> {
        GroupRef::Vars(self)
    }
}

impl CutGroup {
    /// New empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a cut, or replace it in place if the name exists.
    pub fn add(&mut self, cut: &str, predicate: &str) -> &mut Self {
        upsert(&mut self.items, cut, predicate);
        self
    }

    /// Remove a cut. Returns whether it was present.
    pub fn remove(&mut self, cut: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|(k, _)| k != cut);
        self.items.len() != before
    }

    /// Predicate for a cut, if present.
    pub fn get(&self, cut: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == cut)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate `(cut, predicate)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of cuts.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow as a [`GroupRef`] for [`crate::CutGraph::apply`].
    pub fn as_group(&self) -> GroupRef<'_> {
        GroupRef::Cuts(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_stable() {
        let mut g = CutGroup::new("preselection");
        g.add("pt", "jet_pt[0] > 400");
        g.add("eta", "abs(jet_eta[0]) < 2.4");
        g.add("msd", "jet_msd[0] > 50");
        let names: Vec<_> = g.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["pt", "eta", "msd"]);
    }

    #[test]
    fn re_add_replaces_in_place() {
        let mut g = CutGroup::new("sel");
        g.add("pt", "jet_pt[0] > 400");
        g.add("eta", "abs(jet_eta[0]) < 2.4");
        g.add("pt", "jet_pt[0] > 500");
        assert_eq!(g.len(), 2);
        assert_eq!(g.get("pt"), Some("jet_pt[0] > 500"));
        let names: Vec<_> = g.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["pt", "eta"]);
    }

    #[test]
    fn remove_reports_presence() {
        let mut g = VarGroup::new("vars");
        g.add("ht", "jet_pt[0] + jet_pt[1]");
        assert!(g.remove("ht"));
        assert!(!g.remove("ht"));
        assert!(g.is_empty());
    }
}
