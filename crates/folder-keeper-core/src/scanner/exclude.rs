use glob::{MatchOptions, Pattern};
use tracing::error;

/// `*` and `?` stop at `/`, and wildcards do not match a leading dot.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Compiled exclusion patterns, matched against forward-slash relative routes.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// Invalid globs are logged and dropped; the remaining patterns still apply.
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob.as_ref()) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob.as_ref(), e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_excluded(&self, relative_route: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(relative_route, MATCH_OPTIONS))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern_matches_only_that_route() {
        let set = ExcludeSet::new(&[".git"]);
        assert!(set.is_excluded(".git"));
        assert!(!set.is_excluded("sub/.git"));
        assert!(!set.is_excluded(".gitignore"));
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let set = ExcludeSet::new(&["*.log"]);
        assert!(set.is_excluded("debug.log"));
        assert!(!set.is_excluded("logs/debug.log"));
    }

    #[test]
    fn test_double_star_matches_any_depth() {
        let set = ExcludeSet::new(&["**/node_modules"]);
        assert!(set.is_excluded("node_modules"));
        assert!(set.is_excluded("web/app/node_modules"));
    }

    #[test]
    fn test_invalid_pattern_is_dropped() {
        let set = ExcludeSet::new(&["[bad", "*.tmp"]);
        assert_eq!(set.len(), 1);
        assert!(set.is_excluded("x.tmp"));
    }
}
