use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

/// Maps short Istio version labels (e.g. `1.10`) to the proxy-version
/// patterns EnvoyFilters match on.
///
/// The catalog is the universe of names a config could ever have generated,
/// so that filters for deselected versions can be found without listing the
/// cluster. It is built once at startup and shared read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionCatalog {
    patterns: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("proxy version {0} is already in the catalog")]
    Duplicate(String),

    #[error("invalid proxy version pattern for {label}: {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },
}

const WELL_KNOWN: &[(&str, &str)] = &[
    ("1.4", r"^1\.4.*"),
    ("1.5", r"^1\.5.*"),
    ("1.6", r"^1\.6.*"),
    ("1.7", r"^1\.7.*"),
    ("1.8", r"^1\.8.*"),
    ("1.9", r"^1\.9.*"),
    ("1.10", r"^1\.10.*"),
    ("1.11", r"^1\.11.*"),
    ("1.12", r"^1\.12.*"),
    ("1.13", r"^1\.13.*"),
    ("1.14", r"^1\.14.*"),
    ("1.15", r"^1\.15.*"),
];

/// Returns the generated object name for a config and version label.
pub fn filter_name(base: &str, label: &str) -> String {
    format!("{base}-{label}")
}

// === impl VersionCatalog ===

impl Default for VersionCatalog {
    fn default() -> Self {
        Self::well_known()
    }
}

impl VersionCatalog {
    /// The Istio releases known at build time.
    pub fn well_known() -> Self {
        let patterns = WELL_KNOWN
            .iter()
            .map(|(label, pattern)| (label.to_string(), pattern.to_string()))
            .collect();
        Self { patterns }
    }

    /// Adds versions to the catalog.
    ///
    /// Each pattern must be a valid regular expression and no label may
    /// already be present.
    pub fn extend<I, L, P>(mut self, versions: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: Into<String>,
    {
        for (label, pattern) in versions {
            let (label, pattern) = (label.into(), pattern.into());
            if let Err(source) = regex::Regex::new(&pattern) {
                return Err(CatalogError::InvalidPattern { label, source });
            }
            match self.patterns.entry(label) {
                Entry::Occupied(entry) => return Err(CatalogError::Duplicate(entry.key().clone())),
                Entry::Vacant(entry) => {
                    entry.insert(pattern);
                }
            }
        }
        Ok(self)
    }

    pub fn pattern(&self, label: &str) -> Option<&str> {
        self.patterns.get(label).map(String::as_str)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Every name `base` could have generated, one per cataloged version.
    pub fn all_names(&self, base: &str) -> BTreeSet<String> {
        self.labels().map(|label| filter_name(base, label)).collect()
    }

    /// The names `base` generates for the given labels.
    ///
    /// Labels need not be cataloged.
    pub fn selected_names<'l>(
        &self,
        base: &str,
        labels: impl IntoIterator<Item = &'l str>,
    ) -> BTreeSet<String> {
        labels
            .into_iter()
            .map(|label| filter_name(base, label))
            .collect()
    }

    /// Cataloged names that are not generated for the given labels.
    pub fn stale_names<'l>(
        &self,
        base: &str,
        labels: impl IntoIterator<Item = &'l str>,
    ) -> BTreeSet<String> {
        let selected = self.selected_names(base, labels);
        self.all_names(base)
            .into_iter()
            .filter(|name| !selected.contains(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn all_names_cover_every_well_known_version() {
        let catalog = VersionCatalog::well_known();
        let names = catalog.all_names("public");
        assert_eq!(names.len(), 12);
        assert!(names.contains("public-1.4"));
        assert!(names.contains("public-1.15"));
    }

    #[test]
    fn selected_names_include_uncataloged_labels() {
        let catalog = VersionCatalog::well_known();
        let names = catalog.selected_names("public", ["1.10", "1.99"]);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["public-1.10".to_string(), "public-1.99".to_string()]
        );
    }

    #[test]
    fn stale_names_exclude_selected_versions() {
        let catalog = VersionCatalog::well_known();
        let stale = catalog.stale_names("x", ["1.10", "1.11"]);
        assert_eq!(stale.len(), 10);
        assert!(!stale.contains("x-1.10"));
        assert!(!stale.contains("x-1.11"));
        assert!(stale.contains("x-1.4"));
        assert!(stale.contains("x-1.15"));
    }

    #[test]
    fn extend_adds_versions() {
        let catalog = VersionCatalog::well_known()
            .extend([("1.16", r"^1\.16.*")])
            .expect("catalog must extend");
        assert_eq!(catalog.len(), 13);
        assert_eq!(catalog.pattern("1.16"), Some(r"^1\.16.*"));
        assert!(catalog.all_names("x").contains("x-1.16"));
    }

    #[test]
    fn extend_rejects_duplicates() {
        let err = VersionCatalog::well_known()
            .extend([("1.10", r"^1\.10\.2.*")])
            .expect_err("duplicate label must be rejected");
        assert!(matches!(err, CatalogError::Duplicate(label) if label == "1.10"));
    }

    #[test]
    fn extend_rejects_invalid_patterns() {
        let err = VersionCatalog::well_known()
            .extend([("1.16", r"^1\.16(")])
            .expect_err("invalid pattern must be rejected");
        assert!(matches!(err, CatalogError::InvalidPattern { label, .. } if label == "1.16"));
    }
}
