use std::collections::HashSet;

/// Closed set of Discord user ids permitted to hold a session
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    ids: HashSet<String>,
}

impl Allowlist {
    /// Parse a comma-separated list, dropping blanks
    pub fn from_csv(raw: &str) -> Self {
        raw.split(',').collect()
    }

    pub fn is_allowed(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for Allowlist {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self {
            ids: iter
                .into_iter()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}
