//! Statement text rendering.

use crate::diff::AttributeDifference;
use crate::error::{TableError, TableResult};
use crate::item::{CompositePrimaryKey, PARTITION_KEY, ROW_VERSION, SORT_KEY};
use tabula_codec::{AttributeValue, Attributes};

/// Renders attribute values as statement literals.
///
/// Strings are single-quoted. With `escape_single_quote` set, embedded
/// single quotes are doubled; the setting applies to every string rendered,
/// including those nested in lists, maps and sets. Binary values have no
/// literal form.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralRenderer {
    escape_single_quote: bool,
}

impl LiteralRenderer {
    /// Creates a renderer.
    pub fn new(escape_single_quote: bool) -> Self {
        Self {
            escape_single_quote,
        }
    }

    /// Renders a string literal.
    pub fn string(&self, value: &str) -> String {
        if self.escape_single_quote {
            format!("'{}'", value.replace('\'', "''"))
        } else {
            format!("'{value}'")
        }
    }

    /// Renders any value as a literal.
    pub fn render(&self, value: &AttributeValue) -> TableResult<String> {
        let mut out = String::new();
        self.write(value, &mut out)?;
        Ok(out)
    }

    fn write(&self, value: &AttributeValue, out: &mut String) -> TableResult<()> {
        match value {
            AttributeValue::S(s) => out.push_str(&self.string(s)),
            AttributeValue::N(n) => out.push_str(n),
            AttributeValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            AttributeValue::Null => out.push_str("NULL"),
            AttributeValue::L(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write(item, out)?;
                }
                out.push(']');
            }
            AttributeValue::M(fields) => self.write_map(fields, out)?,
            AttributeValue::SS(items) => {
                let rendered: Vec<String> = items.iter().map(|s| self.string(s)).collect();
                push_set(&rendered, out)?;
            }
            AttributeValue::NS(items) => push_set(items, out)?,
            AttributeValue::B(_) | AttributeValue::BS(_) => {
                return Err(TableError::invalid_statement(
                    "binary values have no statement literal form",
                ))
            }
        }
        Ok(())
    }

    fn write_map(&self, fields: &Attributes, out: &mut String) -> TableResult<()> {
        out.push('{');
        for (i, (name, value)) in fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&self.string(name));
            out.push_str(": ");
            self.write(value, out)?;
        }
        out.push('}');
        Ok(())
    }
}

fn push_set(items: &[String], out: &mut String) -> TableResult<()> {
    if items.is_empty() {
        return Err(TableError::invalid_statement("sets cannot be empty"));
    }
    out.push_str("<<");
    out.push_str(&items.join(", "));
    out.push_str(">>");
    Ok(())
}

/// Builds statement text for one table.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    table: String,
    literals: LiteralRenderer,
}

impl StatementBuilder {
    /// Creates a builder for a table.
    pub fn new(table_name: &str, escape_single_quote: bool) -> Self {
        Self {
            table: format!("\"{}\"", table_name.replace('"', "\"\"")),
            literals: LiteralRenderer::new(escape_single_quote),
        }
    }

    /// Returns the literal renderer.
    pub fn literals(&self) -> &LiteralRenderer {
        &self.literals
    }

    /// `UPDATE "<t>" SET <path>=<literal> ... REMOVE <path> ... WHERE <key> AND RowVersion=<n>`
    pub fn update(
        &self,
        key: &CompositePrimaryKey,
        existing_version: u64,
        differences: &[AttributeDifference],
    ) -> TableResult<String> {
        let mut statement = format!("UPDATE {}", self.table);
        for difference in differences {
            if let AttributeDifference::Update { path, value } = difference {
                statement.push_str(&format!(" SET {path}={}", self.literals.render(value)?));
            }
        }
        for difference in differences {
            if let AttributeDifference::Remove { path } = difference {
                statement.push_str(&format!(" REMOVE {path}"));
            }
        }
        statement.push_str(&self.where_key(key, Some(existing_version)));
        Ok(statement)
    }

    /// `DELETE FROM "<t>" WHERE <key> [AND RowVersion=<n>]`
    pub fn delete(&self, key: &CompositePrimaryKey, existing_version: Option<u64>) -> String {
        format!(
            "DELETE FROM {}{}",
            self.table,
            self.where_key(key, existing_version)
        )
    }

    /// `INSERT INTO "<t>" VALUE {<item>}`
    pub fn insert(&self, item: &Attributes) -> TableResult<String> {
        let mut statement = format!("INSERT INTO {} VALUE ", self.table);
        self.literals.write_map(item, &mut statement)?;
        Ok(statement)
    }

    /// `EXISTS(SELECT * FROM "<t>" WHERE <key> AND RowVersion=<n>)`
    pub fn exists(&self, key: &CompositePrimaryKey, existing_version: u64) -> String {
        format!(
            "EXISTS(SELECT * FROM {}{})",
            self.table,
            self.where_key(key, Some(existing_version))
        )
    }

    /// `SELECT <cols> FROM "<t>" WHERE PK IN (<keys>) [AND <clause>]`
    ///
    /// An empty column list selects every attribute. `additional_where` is
    /// appended verbatim.
    pub fn select(
        &self,
        columns: &[&str],
        partition_keys: &[String],
        additional_where: Option<&str>,
    ) -> String {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| format!("\"{}\"", c.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let keys = partition_keys
            .iter()
            .map(|k| self.literals.string(k))
            .collect::<Vec<_>>()
            .join(", ");
        let mut statement = format!(
            "SELECT {projection} FROM {} WHERE {PARTITION_KEY} IN ({keys})",
            self.table
        );
        if let Some(clause) = additional_where {
            statement.push_str(" AND ");
            statement.push_str(clause);
        }
        statement
    }

    fn where_key(&self, key: &CompositePrimaryKey, version: Option<u64>) -> String {
        let mut clause = format!(
            " WHERE {PARTITION_KEY}={} AND {SORT_KEY}={}",
            self.literals.string(&key.partition_key),
            self.literals.string(&key.sort_key)
        );
        if let Some(version) = version {
            clause.push_str(&format!(" AND {ROW_VERSION}={version}"));
        }
        clause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_codec::AttributePath;

    fn key() -> CompositePrimaryKey {
        CompositePrimaryKey::new("p1", "s1")
    }

    #[test]
    fn literal_forms() {
        let r = LiteralRenderer::new(false);
        assert_eq!(r.render(&"x".into()).unwrap(), "'x'");
        assert_eq!(r.render(&AttributeValue::from(12i64)).unwrap(), "12");
        assert_eq!(r.render(&true.into()).unwrap(), "true");
        assert_eq!(r.render(&AttributeValue::Null).unwrap(), "NULL");
        assert_eq!(
            r.render(&AttributeValue::L(vec!["a".into(), 1i64.into()]))
                .unwrap(),
            "['a', 1]"
        );
        assert_eq!(
            r.render(&AttributeValue::map([("k", "v".into())])).unwrap(),
            "{'k': 'v'}"
        );
        assert_eq!(
            r.render(&AttributeValue::SS(vec!["a".into(), "b".into()]))
                .unwrap(),
            "<<'a', 'b'>>"
        );
        assert!(r.render(&AttributeValue::B(vec![1])).is_err());
    }

    #[test]
    fn quote_escaping_reaches_nested_values() {
        let value = AttributeValue::map([(
            "it's",
            AttributeValue::L(vec!["o'clock".into()]),
        )]);
        assert_eq!(
            LiteralRenderer::new(true).render(&value).unwrap(),
            "{'it''s': ['o''clock']}"
        );
        assert_eq!(
            LiteralRenderer::new(false).render(&value).unwrap(),
            "{'it's': ['o'clock']}"
        );
    }

    #[test]
    fn update_statement() {
        let builder = StatementBuilder::new("table", false);
        let differences = vec![
            AttributeDifference::Update {
                path: AttributePath::attribute("a"),
                value: "y".into(),
            },
            AttributeDifference::Remove {
                path: AttributePath::attribute("b").index(2),
            },
            AttributeDifference::Update {
                path: AttributePath::attribute(ROW_VERSION),
                value: AttributeValue::from(2u64),
            },
        ];
        assert_eq!(
            builder.update(&key(), 1, &differences).unwrap(),
            "UPDATE \"table\" SET \"a\"='y' SET \"RowVersion\"=2 REMOVE \"b\"[2] \
             WHERE PK='p1' AND SK='s1' AND RowVersion=1"
        );
    }

    #[test]
    fn delete_statements() {
        let builder = StatementBuilder::new("table", false);
        assert_eq!(
            builder.delete(&key(), Some(3)),
            "DELETE FROM \"table\" WHERE PK='p1' AND SK='s1' AND RowVersion=3"
        );
        assert_eq!(
            builder.delete(&key(), None),
            "DELETE FROM \"table\" WHERE PK='p1' AND SK='s1'"
        );
    }

    #[test]
    fn insert_and_exists() {
        let builder = StatementBuilder::new("table", false);
        let item = key().to_attributes();
        assert_eq!(
            builder.insert(&item).unwrap(),
            "INSERT INTO \"table\" VALUE {'PK': 'p1', 'SK': 's1'}"
        );
        assert_eq!(
            builder.exists(&key(), 4),
            "EXISTS(SELECT * FROM \"table\" WHERE PK='p1' AND SK='s1' AND RowVersion=4)"
        );
    }

    #[test]
    fn select_statement() {
        let builder = StatementBuilder::new("table", false);
        assert_eq!(
            builder.select(&[], &["a".into(), "b".into()], Some("RowType='Order'")),
            "SELECT * FROM \"table\" WHERE PK IN ('a', 'b') AND RowType='Order'"
        );
        assert_eq!(
            builder.select(&["PK", "total"], &["a".into()], None),
            "SELECT \"PK\", \"total\" FROM \"table\" WHERE PK IN ('a')"
        );
    }
}
