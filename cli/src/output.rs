//! Plain-text rendering of query results.

use rtq_query::{resolve_field, FieldLookup, Item, Node, Query, Result};
use tabular::{Row, Table};

/// The item's values for `fields`, tab-separated.
pub fn format_row<S: AsRef<str>>(item: &dyn Item, fields: &[S]) -> Result<String> {
    let values = fields
        .iter()
        .map(|name| item.attribute(name.as_ref()).map(|value| value.to_string()))
        .collect::<Result<Vec<_>>>()?;
    Ok(values.join("\t"))
}

/// Field names a parsed filter reads, in order of first use.
///
/// Bare values are matched against `name`, which leads the list when the
/// filter has any and does not name it explicitly.
pub fn referenced_fields(query: &Query) -> Vec<String> {
    let mut names = query.key_names();
    if has_bare_value(&query.root) && !names.iter().any(|name| name == "name") {
        names.insert(0, "name".to_string());
    }
    names
}

fn has_bare_value(node: &Node) -> bool {
    match node {
        Node::Conds(children) | Node::OrStmt(children) => children.iter().any(has_bare_value),
        Node::Group { stmt, .. } => has_bare_value(stmt),
        Node::NamedCond { .. } => false,
        Node::UnnamedCond(_) => true,
    }
}

/// Table of fields with their value type and the daemon calls they need.
pub fn keys_table<S: AsRef<str>>(names: &[S], fields: &dyn FieldLookup) -> Result<Table> {
    #[allow(clippy::literal_string_with_formatting_args)]
    let mut table = Table::new("{:<}  {:<}  {:<}")
        .with_row(Row::from_cells(["Field", "Type", "Requires"].iter().cloned()));

    for name in names {
        let field = resolve_field(fields, name.as_ref())?;
        let requires = if field.requires.is_empty() {
            "-".to_string()
        } else {
            field.requires.join(" ")
        };
        table.add_row(
            Row::new()
                .with_cell(&field.name)
                .with_cell(format!("{:?}", field.value_type))
                .with_cell(requires),
        );
    }
    Ok(table)
}
