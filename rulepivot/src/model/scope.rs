//! Rule scope expressions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Query selecting which nets a rule side applies to.
///
/// Only the net-class forms are interpreted. Any other query is kept as
/// [`Scope::Query`] with its text untouched so it is written back exactly
/// as it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scope {
    #[default]
    All,
    NetClass(String),
    NetClasses(Vec<String>),
    Query(String),
}

impl Scope {
    pub fn net_class(name: impl Into<String>) -> Self {
        Scope::NetClass(name.into())
    }

    /// Parse the right-hand side of a `SourceScope`/`TargetScope`/`Scope`
    /// attribute.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "All" {
            return Scope::All;
        }
        if let Some(inner) = Self::call_argument(raw, "InNetClasses") {
            let items: Vec<String> = inner.split(';').map(str::to_string).collect();
            if items.iter().all(|i| Self::is_valid_class_name(i)) {
                return Scope::NetClasses(items);
            }
        } else if let Some(inner) = Self::call_argument(raw, "InNetClass") {
            if Self::is_valid_class_name(inner) {
                return Scope::NetClass(inner.to_string());
            }
        }
        Scope::Query(raw.to_string())
    }

    /// Extract `X` from `func('X')`. Returns None for anything else,
    /// including nested quotes.
    fn call_argument<'a>(raw: &'a str, func: &str) -> Option<&'a str> {
        let inner = raw
            .strip_prefix(func)?
            .strip_prefix("('")?
            .strip_suffix("')")?;
        if inner.contains('\'') {
            None
        } else {
            Some(inner)
        }
    }

    /// A class name that renders inside `InNetClass('…')` and parses back
    /// to itself.
    pub fn is_valid_class_name(name: &str) -> bool {
        !name.is_empty() && !name.chars().any(|c| c == '\'' || c == ';' || c.is_control())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Scope::All)
    }

    /// Net classes named by this scope. Empty for `All` and raw queries.
    pub fn classes(&self) -> Vec<&str> {
        match self {
            Scope::NetClass(name) => vec![name.as_str()],
            Scope::NetClasses(names) => names.iter().map(String::as_str).collect(),
            Scope::All | Scope::Query(_) => Vec::new(),
        }
    }

    /// The single class of a `NetClass` scope.
    pub fn single_class(&self) -> Option<&str> {
        match self {
            Scope::NetClass(name) => Some(name),
            _ => None,
        }
    }

    pub fn to_rul_format(&self) -> String {
        match self {
            Scope::All => "All".to_string(),
            Scope::NetClass(name) => format!("InNetClass('{}')", name),
            Scope::NetClasses(names) => format!("InNetClasses('{}')", names.join(";")),
            Scope::Query(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rul_format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_net_class_forms() {
        assert_eq!(Scope::parse("All"), Scope::All);
        assert_eq!(Scope::parse("InNetClass('PWR')"), Scope::net_class("PWR"));
        assert_eq!(
            Scope::parse("InNetClasses('HV;LV')"),
            Scope::NetClasses(vec!["HV".to_string(), "LV".to_string()])
        );
    }

    #[test]
    fn test_unknown_query_kept_verbatim() {
        let raw = "InNet('GND') Or IsVia";
        let scope = Scope::parse(raw);
        assert_eq!(scope, Scope::Query(raw.to_string()));
        assert_eq!(scope.to_rul_format(), raw);
        assert!(scope.classes().is_empty());
    }

    #[test]
    fn test_lookalikes_are_queries() {
        assert!(matches!(Scope::parse("all"), Scope::Query(_)));
        assert!(matches!(Scope::parse("InNetClass(\"PWR\")"), Scope::Query(_)));
        assert!(matches!(Scope::parse("InNetClass('')"), Scope::Query(_)));
        assert!(matches!(Scope::parse("InNetClasses('A;;B')"), Scope::Query(_)));
    }

    #[test]
    fn test_render_parse_agree() {
        for scope in [
            Scope::All,
            Scope::net_class("High Voltage"),
            Scope::NetClasses(vec!["A".into(), "B".into()]),
        ] {
            assert_eq!(Scope::parse(&scope.to_rul_format()), scope);
        }
    }

    #[test]
    fn test_valid_class_names() {
        assert!(Scope::is_valid_class_name("High Voltage"));
        assert!(Scope::is_valid_class_name("5V-Rail"));
        assert!(!Scope::is_valid_class_name(""));
        assert!(!Scope::is_valid_class_name("Bob's"));
        assert!(!Scope::is_valid_class_name("A;B"));
        assert!(!Scope::is_valid_class_name("line\nbreak"));
    }
}
