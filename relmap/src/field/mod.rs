use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// The five column kinds a record field can map to.
/// Each kind pins a canonical SQL column type and a built-in default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Boolean,
    Integer,
    Float,
    Text,
}

impl FieldKind {
    /// Whether a column of this kind may serve as a table's primary key.
    pub fn keyable(self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Integer | FieldKind::Float)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "String",
            FieldKind::Boolean => "Boolean",
            FieldKind::Integer => "Integer",
            FieldKind::Float => "Float",
            FieldKind::Text => "Text",
        };
        f.write_str(name)
    }
}

/// A field's default: either a fixed value or a producer invoked each time
/// the default is resolved.
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Computed(producer) => producer(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Mapping metadata for one column: kind, optional column-name override,
/// SQL column type, primary-key flag, and default value.
/// Created at declaration time and immutable once the schema is compiled.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    kind: FieldKind,
    column: Option<String>,
    column_type: String,
    primary_key: bool,
    default: Option<DefaultValue>,
}

impl FieldDescriptor {
    fn new(kind: FieldKind, column_type: &str, default: Option<DefaultValue>) -> Self {
        FieldDescriptor {
            kind,
            column: None,
            column_type: column_type.to_string(),
            primary_key: false,
            default,
        }
    }

    /// A `varchar(100)` column with no default. The DDL type can be
    /// overridden with [`ddl`](Self::ddl).
    pub fn string() -> Self {
        Self::new(FieldKind::String, "varchar(100)", None)
    }

    /// A `boolean` column defaulting to `false`. Never a primary key.
    pub fn boolean() -> Self {
        Self::new(
            FieldKind::Boolean,
            "boolean",
            Some(DefaultValue::Static(json!(false))),
        )
    }

    /// A `bigint` column defaulting to `0`.
    pub fn integer() -> Self {
        Self::new(
            FieldKind::Integer,
            "bigint",
            Some(DefaultValue::Static(json!(0))),
        )
    }

    /// A `real` column defaulting to `0.0`.
    pub fn float() -> Self {
        Self::new(
            FieldKind::Float,
            "real",
            Some(DefaultValue::Static(json!(0.0))),
        )
    }

    /// A `text` column with no default. Never a primary key.
    pub fn text() -> Self {
        Self::new(FieldKind::Text, "text", None)
    }

    /// Override the column name. Without this, the declaring field
    /// identifier is used as the column name.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    /// Override the DDL column type. Only string columns accept this.
    pub fn ddl(mut self, ddl: impl Into<String>) -> Self {
        debug_assert!(
            self.kind == FieldKind::String,
            "ddl override only applies to string columns"
        );
        if self.kind == FieldKind::String {
            self.column_type = ddl.into();
        }
        self
    }

    /// Mark this field as the primary key. Boolean and text columns cannot
    /// key a table and keep the flag unset.
    pub fn primary_key(mut self) -> Self {
        debug_assert!(
            self.kind.keyable(),
            "{} columns cannot be a primary key",
            self.kind
        );
        self.primary_key = self.kind.keyable();
        self
    }

    /// Replace the built-in default with a fixed value.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Static(value));
        self
    }

    /// Replace the built-in default with a producer invoked at resolve time.
    pub fn default_with(mut self, producer: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Computed(Arc::new(producer)));
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// The column-name override, if any.
    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn column_type(&self) -> &str {
        &self.column_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Resolve the default value, invoking a producer if one was declared.
    /// Returns `None` when the field has no default.
    pub fn resolve_default(&self) -> Option<Value> {
        self.default.as_ref().map(DefaultValue::resolve)
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}, {}:{}>",
            self.kind,
            self.column_type,
            self.column.as_deref().unwrap_or("-")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_column_types() {
        assert_eq!(FieldDescriptor::string().column_type(), "varchar(100)");
        assert_eq!(FieldDescriptor::boolean().column_type(), "boolean");
        assert_eq!(FieldDescriptor::integer().column_type(), "bigint");
        assert_eq!(FieldDescriptor::float().column_type(), "real");
        assert_eq!(FieldDescriptor::text().column_type(), "text");
    }

    #[test]
    fn test_builtin_defaults() {
        assert_eq!(FieldDescriptor::string().resolve_default(), None);
        assert_eq!(
            FieldDescriptor::boolean().resolve_default(),
            Some(json!(false))
        );
        assert_eq!(FieldDescriptor::integer().resolve_default(), Some(json!(0)));
        assert_eq!(FieldDescriptor::float().resolve_default(), Some(json!(0.0)));
        assert_eq!(FieldDescriptor::text().resolve_default(), None);
    }

    #[test]
    fn test_ddl_override() {
        let field = FieldDescriptor::string().ddl("varchar(50)");
        assert_eq!(field.column_type(), "varchar(50)");
    }

    #[test]
    fn test_computed_default_invoked_per_resolve() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let counter = Arc::new(AtomicI64::new(0));
        let handle = counter.clone();
        let field = FieldDescriptor::integer()
            .default_with(move || json!(handle.fetch_add(1, Ordering::SeqCst)));

        assert_eq!(field.resolve_default(), Some(json!(0)));
        assert_eq!(field.resolve_default(), Some(json!(1)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_describe() {
        let field = FieldDescriptor::string().column("email");
        assert_eq!(field.to_string(), "<String, varchar(100):email>");

        let field = FieldDescriptor::integer();
        assert_eq!(field.to_string(), "<Integer, bigint:->");
    }

    #[test]
    fn test_primary_key_flag() {
        assert!(FieldDescriptor::integer().primary_key().is_primary_key());
        assert!(FieldDescriptor::string().primary_key().is_primary_key());
        assert!(!FieldDescriptor::string().is_primary_key());
    }
}
