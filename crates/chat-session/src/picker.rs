//! Typeahead filter state for pickers.
//!
//! The filter text and the open flag belong to one widget instance; nothing
//! here looks at shared state.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Typeahead {
    filter: String,
    open: bool,
}

impl Typeahead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Typing opens the suggestion list.
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
        self.open = true;
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    /// Close the list and forget the filter, e.g. after a selection.
    pub fn close(&mut self) {
        self.open = false;
        self.filter.clear();
    }

    /// Items whose label contains the filter, case-insensitively, in their
    /// original order.
    pub fn matches<'a, T, F>(&self, items: &'a [T], label: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> String,
    {
        let needle = self.filter.trim().to_lowercase();
        items
            .iter()
            .filter(|item| needle.is_empty() || label(*item).to_lowercase().contains(&needle))
            .collect()
    }
}
