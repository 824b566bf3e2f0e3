use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};

/// Static source-symbol to destination-denom table. Keys are case-folded;
/// symbols without an entry translate to themselves.
#[derive(Debug, Clone, Default)]
pub struct SymbolTranslator {
    source_to_destination: HashMap<String, String>,
}

impl SymbolTranslator {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self {
            source_to_destination: entries
                .into_iter()
                .map(|(source, destination)| (source.to_lowercase(), destination))
                .collect(),
        }
    }

    /// Loads a JSON object of `{"<source symbol>": "<destination denom>"}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read symbol translator file {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_str(&contents)
            .context(format!("Invalid symbol translator file {}", path.display()))?;
        Ok(Self::new(entries))
    }

    pub fn source_to_destination(&self, symbol: &str) -> String {
        self.source_to_destination
            .get(&symbol.to_lowercase())
            .cloned()
            .unwrap_or_else(|| symbol.to_string())
    }

    pub fn len(&self) -> usize {
        self.source_to_destination.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_to_destination.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn translates_known_symbols_case_insensitively() {
        let translator = SymbolTranslator::new(HashMap::from([(
            "ERowan".to_string(),
            "rowan".to_string(),
        )]));

        assert_eq!(translator.source_to_destination("erowan"), "rowan");
        assert_eq!(translator.source_to_destination("EROWAN"), "rowan");
        assert_eq!(translator.source_to_destination("usdc"), "usdc");
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"erowan": "rowan", "eatom": "ibc/atom"}}"#).unwrap();

        let translator = SymbolTranslator::from_file(file.path()).unwrap();
        assert_eq!(translator.len(), 2);
        assert_eq!(translator.source_to_destination("eatom"), "ibc/atom");
    }

    #[test]
    fn rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(SymbolTranslator::from_file(file.path()).is_err());
    }
}
