use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{FormatError, FormatErrorKind};

/// The Source Link JSON document.
///
/// See https://github.com/dotnet/designs/blob/main/accepted/2020/diagnostics/source-link.md#source-link-json-schema
#[derive(Debug, Deserialize)]
struct SourceLinkJson {
    documents: BTreeMap<String, String>,
}

/// Maps document paths to URLs according to a set of Source Link documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLinkMappings {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    pattern: Pattern,
    url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    Prefix(String),
}

impl SourceLinkMappings {
    /// Creates mappings from a list of Source Link JSON documents.
    pub fn new<'a, I>(documents: I) -> Result<Self, FormatError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut mappings = Self::default();
        for json in documents {
            mappings.add_mappings(json)?;
        }
        mappings.sort();
        Ok(mappings)
    }

    fn add_mappings(&mut self, json: &str) -> Result<(), FormatError> {
        let json: SourceLinkJson = serde_json::from_str(json)
            .map_err(|e| FormatError::new(FormatErrorKind::InvalidSourceLinkJson, e))?;

        self.rules.reserve(json.documents.len());
        for (key, url) in json.documents {
            /*
            Each document is defined by a file path and a URL. Original source file paths are compared
            case-insensitively to documents and the resulting URL is used to download source. The document
            may contain an asterisk to represent a wildcard in order to match anything in the asterisk's
            location. The rules for the asterisk are as follows:
                1. The only acceptable wildcard is one and only one '*', which if present will be replaced by a relative path.
                2. If the file path does not contain a *, the URL cannot contain a * and if the file path contains a * the URL must contain a *.
                3. If the file path contains a *, it must be the final character.
                4. If the URL contains a *, it may be anywhere in the URL.
            */
            let pattern = match key.strip_suffix('*') {
                Some(prefix) => Pattern::Prefix(prefix.to_lowercase()),
                None => Pattern::Exact(key.to_lowercase()),
            };
            self.rules.push(Rule { pattern, url })
        }
        Ok(())
    }

    fn sort(&mut self) {
        // Put Exact matches first, then sort by the Prefix length, longest to shortest.
        self.rules.sort_by(|a, b| match (&a.pattern, &b.pattern) {
            (Pattern::Exact(_), Pattern::Exact(_)) => Ordering::Equal,
            (Pattern::Exact(_), Pattern::Prefix(_)) => Ordering::Less,
            (Pattern::Prefix(_), Pattern::Exact(_)) => Ordering::Greater,
            (Pattern::Prefix(a), Pattern::Prefix(b)) => b.len().cmp(&a.len()),
        });
    }

    /// Returns true if there are no mappings.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolves the path to a URL.
    ///
    /// The most specific rule wins. A wildcard in the URL is replaced by the rest of the path,
    /// with `\` separators turned into `/`.
    pub fn resolve(&self, path: &str) -> Option<String> {
        let path_lower = path.to_lowercase();
        for rule in &self.rules {
            match &rule.pattern {
                Pattern::Exact(value) => {
                    if *value == path_lower {
                        return Some(rule.url.clone());
                    }
                }
                Pattern::Prefix(value) => {
                    if path_lower.starts_with(value.as_str()) {
                        let rest = path.get(value.len()..).unwrap_or_default();
                        return Some(rule.url.replace('*', &rest.replace('\\', "/")));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let mappings = SourceLinkMappings::new([
            r#"{"documents": {
                "C:\\src\\*": "https://example.com/repo/*",
                "C:\\src\\vendor\\*": "https://example.com/vendor/*",
                "C:\\src\\generated.cs": "https://example.com/generated.cs"
            }}"#,
        ])
        .unwrap();

        assert_eq!(
            mappings.resolve("C:\\src\\lib\\Program.cs").as_deref(),
            Some("https://example.com/repo/lib/Program.cs")
        );
        assert_eq!(
            mappings.resolve("c:\\SRC\\vendor\\dep.cs").as_deref(),
            Some("https://example.com/vendor/dep.cs")
        );
        assert_eq!(
            mappings.resolve("C:\\src\\generated.cs").as_deref(),
            Some("https://example.com/generated.cs")
        );
        assert_eq!(mappings.resolve("D:\\other.cs"), None);
    }

    #[test]
    fn test_invalid_json() {
        let err = SourceLinkMappings::new(["{\"documents\": 1}"]).unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidSourceLinkJson);
        assert!(SourceLinkMappings::new([]).unwrap().is_empty());
    }
}
