//! Portable identifier naming.
//!
//! Different products quote and case the same logical identifier
//! differently (`"Authors"`, `` `authors` ``, `[AUTHORS]`). Portable
//! naming strips enclosing quotes and lower-cases, so reports of the same
//! schema taken from two products compare equal.

use std::borrow::Cow;

use crate::models::{ObjectName, TableName};

const QUOTE_PAIRS: [(char, char); 3] = [('"', '"'), ('`', '`'), ('[', ']')];

/// Normalizes one identifier to its portable form.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(identifier: &str) -> String {
    let mut current = identifier.trim();
    while let Some(inner) = strip_quotes(current) {
        current = inner.trim();
    }
    current.to_lowercase()
}

fn strip_quotes(identifier: &str) -> Option<&str> {
    QUOTE_PAIRS.iter().find_map(|(open, close)| {
        identifier
            .strip_prefix(*open)
            .and_then(|rest| rest.strip_suffix(*close))
    })
}

/// Formats model names, normalizing them when portable naming is on.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Namer {
    portable: bool,
}

impl Namer {
    pub(crate) fn new(portable: bool) -> Self {
        Self { portable }
    }

    pub(crate) fn is_portable(&self) -> bool {
        self.portable
    }

    pub(crate) fn ident<'a>(&self, identifier: &'a str) -> Cow<'a, str> {
        if self.portable {
            Cow::Owned(normalize(identifier))
        } else {
            Cow::Borrowed(identifier)
        }
    }

    /// Declared types are case-folded but never unquoted.
    pub(crate) fn data_type<'a>(&self, data_type: &'a str) -> Cow<'a, str> {
        if self.portable {
            Cow::Owned(data_type.trim().to_lowercase())
        } else {
            Cow::Borrowed(data_type)
        }
    }

    pub(crate) fn table(&self, name: &TableName) -> String {
        format!("{}.{}", self.ident(&name.schema), self.ident(&name.table))
    }

    /// Normalizes each dot-separated part of an already qualified name.
    pub(crate) fn qualified<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.portable {
            Cow::Owned(name.split('.').map(normalize).collect::<Vec<_>>().join("."))
        } else {
            Cow::Borrowed(name)
        }
    }

    pub(crate) fn object(&self, name: &ObjectName) -> String {
        format!("{}.{}", self.ident(&name.schema), self.ident(&name.name))
    }

    /// Reorders `items` by their formatted key. Only portable naming can
    /// change the canonical order the model already has.
    pub(crate) fn sort_by_key<T>(&self, items: &mut [T], key: impl Fn(&T) -> String) {
        if self.portable {
            items.sort_by_cached_key(|item| key(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_quotes_and_case() {
        assert_eq!(normalize("\"Authors\""), "authors");
        assert_eq!(normalize("`BOOKS`"), "books");
        assert_eq!(normalize("[Order Details]"), "order details");
        assert_eq!(normalize("  \"[Nested]\" "), "nested");
        assert_eq!(normalize("plain"), "plain");
    }

    #[test]
    fn test_normalize_keeps_unbalanced_quotes() {
        assert_eq!(normalize("\"half"), "\"half");
        assert_eq!(normalize("[mixed\""), "[mixed\"");
    }

    #[test]
    fn test_namer_passthrough_when_not_portable() {
        let namer = Namer::new(false);
        assert_eq!(namer.table(&TableName::new("Books", "\"Authors\"")), "Books.\"Authors\"");
        assert_eq!(namer.data_type("VARCHAR(20)"), "VARCHAR(20)");
        assert_eq!(namer.qualified("Books.Authors"), "Books.Authors");
    }

    #[test]
    fn test_namer_portable() {
        let namer = Namer::new(true);
        assert_eq!(namer.table(&TableName::new("Books", "\"Authors\"")), "books.authors");
        assert_eq!(namer.qualified("BOOKS.\"Authors\".[Id]"), "books.authors.id");
        assert_eq!(namer.data_type(" VARCHAR(20) "), "varchar(20)");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(identifier in "[ \"`\\[\\]A-Za-z0-9_.]{0,24}") {
            let once = normalize(&identifier);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
