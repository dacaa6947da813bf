use crate::types::RowValues;

use super::parameter::Parameter;

/// Ordered, name-addressable parameter collection.
///
/// Insertion order is kept because positional dialects bind by it. Name lookups ignore the
/// binder prefix and ASCII case, so `@id`, `:id` and `ID` all address the same entry.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    items: Vec<Parameter>,
}

impl ParameterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter. Duplicate names are allowed; lookups return the first match.
    pub fn add(&mut self, parameter: Parameter) {
        self.items.push(parameter);
    }

    pub fn add_range<I: IntoIterator<Item = Parameter>>(&mut self, parameters: I) {
        self.items.extend(parameters);
    }

    /// Replace the parameter with the same name in place, or append it.
    pub fn add_or_replace(&mut self, parameter: Parameter) {
        match self.index_of(&parameter.name) {
            Some(i) => self.items[i] = parameter,
            None => self.items.push(parameter),
        }
    }

    /// Replace the named parameter, returning the old one. Nothing happens when the name is
    /// unknown.
    pub fn replace(&mut self, name: &str, parameter: Parameter) -> Option<Parameter> {
        let i = self.index_of(name)?;
        Some(std::mem::replace(&mut self.items[i], parameter))
    }

    pub fn replace_at(&mut self, index: usize, parameter: Parameter) -> Option<Parameter> {
        let slot = self.items.get_mut(index)?;
        Some(std::mem::replace(slot, parameter))
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let i = self.index_of(name)?;
        Some(self.items.remove(i))
    }

    pub fn remove_at(&mut self, index: usize) -> Option<Parameter> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Remove every parameter whose name appears in `names`; returns how many were removed.
    pub fn remove_range(&mut self, names: &[&str]) -> usize {
        let before = self.items.len();
        self.items
            .retain(|p| !names.iter().any(|name| p.name_matches(name)));
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.items.iter().find(|p| p.name_matches(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.items.iter_mut().find(|p| p.name_matches(name))
    }

    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<&Parameter> {
        self.items.get(index)
    }

    /// Value of the named parameter, typically read back after execution for output
    /// parameters.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&RowValues> {
        self.get(name).map(|p| &p.value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|p| p.name_matches(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.items.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Parameter] {
        &self.items
    }

    /// Overwrite the whole collection with the parameters of the command that just ran.
    pub(crate) fn capture(&mut self, executed: Vec<Parameter>) {
        self.items = executed;
    }
}

impl<'a> IntoIterator for &'a ParameterStore {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Parameter> for ParameterStore {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
