use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Represents ways to locate an element on the portal page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select with an XPath expression (the portal's native addressing)
    XPath(String),
    /// Select with a CSS selector
    Css(String),
    /// Select by DOM id
    Id(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Selector::Invalid(_))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::XPath(path) if path.starts_with('/') || path.starts_with('(') => {
                write!(f, "{path}")
            }
            Selector::XPath(path) => write!(f, "xpath:{path}"),
            Selector::Css(css) => write!(f, "css:{css}"),
            Selector::Id(id) => write!(f, "id:{id}"),
            Selector::Invalid(reason) => write!(f, "invalid:{reason}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        match s {
            "" => Selector::Invalid("Empty selector".to_string()),
            _ if s.starts_with("xpath:") => Selector::XPath(s["xpath:".len()..].trim().to_string()),
            _ if s.starts_with("css:") => Selector::Css(s["css:".len()..].trim().to_string()),
            _ if s.starts_with("id:") => Selector::Id(s["id:".len()..].trim().to_string()),
            _ if s.starts_with('/') || s.starts_with('(') => Selector::XPath(s.to_string()),
            _ if s.starts_with('#') => Selector::Id(s[1..].to_string()),
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use an XPath starting with '/' or the prefixes 'xpath:', 'css:', 'id:' or '#'."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match Selector::from(raw.as_str()) {
            Selector::Invalid(reason) => Err(serde::de::Error::custom(reason)),
            selector => Ok(selector),
        }
    }
}

/// Quote `value` as an XPath string literal.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{value}\"")
    } else if !value.contains('\'') {
        format!("'{value}'")
    } else {
        let parts: Vec<String> = value.split('"').map(|p| format!("\"{p}\"")).collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_paths_parse_as_xpath() {
        let sel = Selector::from(r#"//*[@id="menuPrincipal"]/div[1]/div[4]"#);
        assert_eq!(
            sel,
            Selector::XPath(r#"//*[@id="menuPrincipal"]/div[1]/div[4]"#.to_string())
        );
        assert!(matches!(
            Selector::from("(//table)[2]//td"),
            Selector::XPath(_)
        ));
    }

    #[test]
    fn prefixes_select_kind() {
        assert_eq!(Selector::from("#logo"), Selector::Id("logo".to_string()));
        assert_eq!(Selector::from("id: logo"), Selector::Id("logo".to_string()));
        assert_eq!(
            Selector::from("css:#tbodyrow tr"),
            Selector::Css("#tbodyrow tr".to_string())
        );
        assert!(!Selector::from("button").is_valid());
        assert!(!Selector::from("   ").is_valid());
    }

    #[test]
    fn display_parses_back() {
        for raw in [
            r#"//*[@id="form_submit"]"#,
            "xpath:.//td",
            "css:div.menu > a",
            "id:consultarNumeroConvenio",
        ] {
            let sel = Selector::from(raw);
            assert_eq!(Selector::from(sel.to_string().as_str()), sel);
        }
    }

    #[test]
    fn deserialize_rejects_unknown_format() {
        let ok: Selector = serde_yaml::from_str("'//*[@id=\"logo\"]/a'").unwrap();
        assert!(matches!(ok, Selector::XPath(_)));
        assert!(serde_yaml::from_str::<Selector>("menu").is_err());
    }

    #[test]
    fn xpath_literal_handles_quotes() {
        assert_eq!(xpath_literal("Presidente"), "\"Presidente\"");
        assert_eq!(xpath_literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(
            xpath_literal("a\"b'c"),
            "concat(\"a\", '\"', \"b'c\")"
        );
    }
}
