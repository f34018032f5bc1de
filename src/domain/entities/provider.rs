use serde::{Deserialize, Serialize};

/// Brokerages the journal can ingest history from.
///
/// Adding a provider means adding a variant here plus an adapter in
/// `infrastructure`; call sites never branch on payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Bingx,
    Bitunix,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Bingx => "bingx",
            Provider::Bitunix => "bitunix",
        }
    }

    /// Parse a configured provider name. Unknown names are a configuration
    /// error for the caller, never a silent fallback.
    pub fn from_name(name: &str) -> Option<Provider> {
        match name.to_lowercase().as_str() {
            "bingx" => Some(Provider::Bingx),
            "bitunix" => Some(Provider::Bitunix),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
