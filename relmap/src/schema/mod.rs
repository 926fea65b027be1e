use crate::error::{RelmapError, Result};
use crate::field::FieldDescriptor;
use indexmap::IndexMap;

/// Quote an identifier as an ANSI column/table reference.
pub(crate) fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

/// `?, ?, ?` for the given placeholder count.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// The compiled mapping for one record type: field descriptors keyed by
/// field identifier, the primary-key partition, and the four SQL templates.
///
/// Compiled once at declaration time via [`Schema::compile`], then shared
/// read-only (behind an `Arc`) by every instance of the record type. All
/// variable data in the templates travels as `?` bind placeholders; the
/// driver adapter translates those to its own bind syntax, never by
/// interpolating values into the SQL text.
#[derive(Debug)]
pub struct Schema {
    model: String,
    table: String,
    mappings: IndexMap<String, FieldDescriptor>,
    primary_key: String,
    fields: Vec<String>,
    select_sql: String,
    insert_sql: String,
    update_sql: String,
    delete_sql: String,
}

impl Schema {
    /// Compile a record type declaration into an immutable schema.
    ///
    /// `fields` lists (field identifier, descriptor) pairs in declaration
    /// order; `table` overrides the table name, which otherwise defaults to
    /// the model name. Fails if the declaration does not contain exactly one
    /// primary-key field.
    pub fn compile(
        model: &str,
        table: Option<&str>,
        fields: Vec<(&str, FieldDescriptor)>,
    ) -> Result<Schema> {
        let table = table.unwrap_or(model).to_string();
        log::debug!("compiling model {model} (table: {table})");

        let mut mappings: IndexMap<String, FieldDescriptor> = IndexMap::new();
        let mut primary_key: Option<String> = None;
        let mut ordinary: Vec<String> = Vec::new();

        for (name, descriptor) in fields {
            log::debug!("  field {name} => {descriptor}");
            if descriptor.is_primary_key() {
                if primary_key.is_some() {
                    return Err(RelmapError::DuplicatePrimaryKey(name.to_string()));
                }
                primary_key = Some(name.to_string());
            } else {
                ordinary.push(name.to_string());
            }
            if mappings.insert(name.to_string(), descriptor).is_some() {
                return Err(RelmapError::DuplicateField(name.to_string()));
            }
        }

        let primary_key = primary_key.ok_or_else(|| RelmapError::MissingPrimaryKey(model.to_string()))?;

        let column_of = |field: &String| {
            let descriptor = &mappings[field.as_str()];
            descriptor.column_name().unwrap_or(field).to_string()
        };
        let key_column = quote(&column_of(&primary_key));
        let ordinary_columns: Vec<String> = ordinary.iter().map(|f| quote(&column_of(f))).collect();

        let mut select_columns = vec![key_column.clone()];
        select_columns.extend(ordinary_columns.iter().cloned());
        let select_sql = format!(
            "select {} from {}",
            select_columns.join(", "),
            quote(&table)
        );

        let mut insert_columns = ordinary_columns.clone();
        insert_columns.push(key_column.clone());
        let insert_sql = format!(
            "insert into {} ({}) values ({})",
            quote(&table),
            insert_columns.join(", "),
            placeholders(ordinary.len() + 1)
        );

        let assignments: Vec<String> = ordinary_columns.iter().map(|c| format!("{c}=?")).collect();
        let update_sql = format!(
            "update {} set {} where {}=?",
            quote(&table),
            assignments.join(", "),
            key_column
        );

        let delete_sql = format!("delete from {} where {}=?", quote(&table), key_column);

        Ok(Schema {
            model: model.to_string(),
            table,
            mappings,
            primary_key,
            fields: ordinary,
            select_sql,
            insert_sql,
            update_sql,
            delete_sql,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Field identifier → descriptor, in declaration order.
    pub fn mappings(&self) -> &IndexMap<String, FieldDescriptor> {
        &self.mappings
    }

    pub fn descriptor(&self, field: &str) -> Option<&FieldDescriptor> {
        self.mappings.get(field)
    }

    /// The primary-key field identifier.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Non-key field identifiers, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The resolved column name for a field identifier.
    pub fn column<'a>(&'a self, field: &'a str) -> &'a str {
        match self.mappings.get(field) {
            Some(descriptor) => descriptor.column_name().unwrap_or(field),
            None => field,
        }
    }

    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    pub fn update_sql(&self) -> &str {
        &self.update_sql
    }

    pub fn delete_sql(&self) -> &str {
        &self.delete_sql
    }
}
