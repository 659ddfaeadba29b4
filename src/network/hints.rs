use regex_lite::Regex;

/// Hostname globs naming hosts that never belong to the fabric, even when they run LLDP.
#[derive(Debug, Clone, Default)]
pub struct EndpointHints {
    patterns: Vec<Regex>,
}

impl EndpointHints {
    /// Compiles `*`-wildcard globs. Everything else in a glob matches literally.
    pub fn new<I>(globs: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for glob in globs {
            let glob = glob.as_ref().trim();
            if glob.is_empty() {
                continue;
            }
            let pattern = format!(
                "^{}$",
                glob.split('*').map(regex_lite::escape).collect::<Vec<_>>().join(".*")
            );
            match Regex::new(&pattern) {
                Ok(regex) => patterns.push(regex),
                Err(e) => tracing::warn!("Ignoring endpoint hint '{}': {}", glob, e),
            }
        }
        Self { patterns }
    }

    pub fn matches(&self, hostname: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(hostname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matching() {
        let hints = EndpointHints::new(["server-*", "db.prod.01"]);
        assert!(hints.matches("server-12"));
        assert!(hints.matches("db.prod.01"));
        assert!(!hints.matches("dbxprodx01"));
        assert!(!hints.matches("leaf-server-1"));
    }

    #[test]
    fn test_empty_globs_are_skipped() {
        let hints = EndpointHints::new(["", "  "]);
        assert!(hints.patterns.is_empty());
        assert!(!hints.matches(""));
    }
}
