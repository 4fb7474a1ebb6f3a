//! Relevant-file selection results.

/// Ordered set of repo-relative paths exposed to the model in one attempt.
///
/// Insertion order is preserved and duplicates are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevantFileSet {
    paths: Vec<String>,
}

impl RelevantFileSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path. Returns false if it was already present.
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if self.contains(&path) {
            false
        } else {
            self.paths.push(path);
            true
        }
    }

    /// Remove a path. Returns false if it was absent.
    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.paths.len();
        self.paths.retain(|p| p != path);
        self.paths.len() != before
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.paths
    }
}

impl<S: Into<String>> FromIterator<S> for RelevantFileSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for path in iter {
            set.insert(path);
        }
        set
    }
}

/// Bullets (`-`, `*`) and enumerators (`1.`, `2)`) standing on their own.
fn is_list_marker(token: &str) -> bool {
    if token.chars().all(|c| matches!(c, '-' | '*' | '+' | '•')) {
        return true;
    }
    match token.strip_suffix(['.', ')']) {
        Some(number) => !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Normalise one whitespace-separated token into a path, if it is one.
fn clean_token(token: &str) -> Option<String> {
    if is_list_marker(token) {
        return None;
    }
    let trimmed = token.trim_matches(|c| matches!(c, '"' | '\'' | '`' | ','));
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a path listing: split on whitespace, clean each token, deduplicate.
#[must_use]
pub fn parse_paths(text: &str) -> RelevantFileSet {
    text.split_whitespace().filter_map(clean_token).collect()
}
