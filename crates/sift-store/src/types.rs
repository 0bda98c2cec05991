use serde::{Deserialize, Serialize};

/// Visibility of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Private,
    Public,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// One embeddable unit of text. Superseded, never mutated, by a later re-index
/// of the same source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub text: String,
    pub mode: Mode,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub source: String,
    /// ISO-8601 timestamp.
    pub date: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    /// Backend-native similarity, or the fused RRF score once combined.
    pub score: f64,
    pub mode: Mode,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub source: String,
    pub date: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Name of the store that produced this copy.
    #[serde(rename = "_source_store", skip_serializing_if = "Option::is_none")]
    pub source_store: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Exact, case-sensitive member of `tags`.
    pub tag: Option<String>,
    pub session: Option<String>,
}

impl SearchFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tag.is_none() && self.session.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Public).unwrap(), "\"public\"");
        let m: Mode = serde_json::from_str("\"private\"").unwrap();
        assert_eq!(m, Mode::Private);
    }

    #[test]
    fn mode_from_str_rejects_unknown() {
        assert_eq!("public".parse::<Mode>().unwrap(), Mode::Public);
        assert!("shared".parse::<Mode>().is_err());
    }

    #[test]
    fn search_result_provenance_field_name() {
        let r = SearchResult {
            id: "1".into(),
            text: "t".into(),
            score: 0.5,
            mode: Mode::Private,
            tags: vec![],
            session_id: None,
            source: "a.ts".into(),
            date: "2026-01-01T00:00:00Z".into(),
            metadata: serde_json::Map::new(),
            source_store: Some("ollama".into()),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["_source_store"], "ollama");
    }

    #[test]
    fn empty_filter() {
        assert!(SearchFilter::default().is_empty());
        let f = SearchFilter {
            tag: Some("x".into()),
            session: None,
        };
        assert!(!f.is_empty());
    }
}
