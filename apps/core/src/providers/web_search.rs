use crate::config::WebSearchAlias;
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};

pub fn builtin_aliases() -> Vec<WebSearchAlias> {
    [
        ("g", "google", "Google", "https://www.google.com/search?q={query}"),
        ("gh", "github", "GitHub", "https://github.com/search?q={query}"),
        ("yt", "youtube", "YouTube", "https://www.youtube.com/results?search_query={query}"),
    ]
    .into_iter()
    .map(|(prefix, key, label, url)| WebSearchAlias {
        prefix: prefix.to_string(),
        key: key.to_string(),
        label: label.to_string(),
        url: url.to_string(),
    })
    .collect()
}

/// One search engine reachable through its own prefix.
pub struct WebSearch {
    key: String,
    label: String,
    template: String,
}

impl WebSearch {
    pub fn new(key: &str, label: &str, template: &str) -> Self {
        Self {
            key: key.trim().to_ascii_lowercase(),
            label: label.to_string(),
            template: template.to_string(),
        }
    }

    pub fn from_alias(alias: &WebSearchAlias) -> Self {
        Self::new(&alias.key, &alias.label, &alias.url)
    }

    pub fn url_for(&self, query: &str) -> String {
        let encoded = url_encode_component(query.trim());
        if self.template.contains("{query}") {
            self.template.replace("{query}", &encoded)
        } else {
            format!("{}{encoded}", self.template)
        }
    }
}

impl Provider for WebSearch {
    fn id(&self) -> ProviderId {
        ProviderId::WebSearch(self.key.clone())
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let trimmed = query.residual.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Candidate::new(
            format!("web:{}:{trimmed}", self.key),
            format!("Search {}: {trimmed}", self.label),
            Action::OpenUrl {
                target: self.url_for(trimmed),
            },
        )
        .with_subtitle("Open in default browser")
        .with_icon("web-browser")
        .pinned()])
    }
}

fn url_encode_component(input: &str) -> String {
    let mut out = String::new();
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else if byte == b' ' {
            out.push('+');
        } else {
            out.push('%');
            out.push_str(&format!("{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{builtin_aliases, url_encode_component, WebSearch};
    use crate::model::{Action, ProviderId};
    use crate::registry::{Provider, QueryContext};

    #[test]
    fn encodes_reserved_bytes() {
        assert_eq!(url_encode_component("rust & c++"), "rust+%26+c%2B%2B");
        assert_eq!(url_encode_component("é"), "%C3%A9");
    }

    #[test]
    fn builds_open_url_candidate() {
        let google = WebSearch::from_alias(&builtin_aliases()[0]);
        assert_eq!(google.id(), ProviderId::WebSearch("google".to_string()));

        let candidates = google.search(&QueryContext::new("rust lang")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Search Google: rust lang");
        assert_eq!(
            candidates[0].action,
            Action::OpenUrl {
                target: "https://www.google.com/search?q=rust+lang".to_string()
            }
        );
    }

    #[test]
    fn empty_residual_yields_nothing() {
        let github = WebSearch::from_alias(&builtin_aliases()[1]);
        assert!(github.search(&QueryContext::new("   ")).unwrap().is_empty());
    }

    #[test]
    fn template_without_placeholder_appends_query() {
        let wiki = WebSearch::new("wiki", "Wikipedia", "https://en.wikipedia.org/w/index.php?search=");
        assert_eq!(
            wiki.url_for("rust"),
            "https://en.wikipedia.org/w/index.php?search=rust"
        );
    }
}
