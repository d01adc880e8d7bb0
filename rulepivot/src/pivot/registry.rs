use indexmap::IndexMap;

/// Insertion-ordered set of net-class names.
///
/// Lookups are case-insensitive and ignore surrounding whitespace; the
/// spelling seen first is kept for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetClassRegistry {
    names: IndexMap<String, String>,
}

impl NetClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key used for matching class names.
    pub fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Register a class and return its index. Registering a known class
    /// returns the existing index and keeps the first spelling.
    pub fn register(&mut self, name: &str) -> usize {
        let key = Self::normalize(name);
        if let Some(index) = self.names.get_index_of(&key) {
            return index;
        }
        let (index, _) = self.names.insert_full(key, name.trim().to_string());
        index
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get_index_of(&Self::normalize(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Display spelling of the class at `index`.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get_index(index).map(|(_, display)| display.as_str())
    }

    pub fn display_name(&self, name: &str) -> Option<&str> {
        self.names.get(&Self::normalize(name)).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
