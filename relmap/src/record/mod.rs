use crate::driver::Row;
use crate::error::{RelmapError, Result};
use crate::executor::Executor;
use crate::schema::{quote, Schema};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Row-count bound for [`Model::find_all`]: either a plain count or an
/// (offset, count) pair. Both bind as placeholders, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(i64),
    OffsetCount(i64, i64),
}

impl From<i64> for Limit {
    fn from(count: i64) -> Limit {
        Limit::Count(count)
    }
}

impl From<(i64, i64)> for Limit {
    fn from((offset, count): (i64, i64)) -> Limit {
        Limit::OffsetCount(offset, count)
    }
}

/// Options for [`Model::find_all`]: an optional raw `where` fragment with
/// bound arguments, an optional raw `order by` fragment, and a limit.
///
/// The `where` and `order by` fragments are appended to the select template
/// as-is; keeping untrusted input out of them is the caller's
/// responsibility. Everything else travels as bound arguments.
#[derive(Debug, Clone, Default)]
pub struct Query {
    where_clause: Option<String>,
    args: Vec<Value>,
    order_by: Option<String>,
    limit: Option<Limit>,
}

impl Query {
    pub fn new() -> Query {
        Query::default()
    }

    /// Raw `where` fragment, without the `where` keyword.
    pub fn filter(mut self, clause: impl Into<String>) -> Query {
        self.where_clause = Some(clause.into());
        self
    }

    /// Bind an argument for a `?` placeholder in the `where` fragment.
    pub fn bind(mut self, value: Value) -> Query {
        self.args.push(value);
        self
    }

    /// Raw `order by` fragment, without the `order by` keywords.
    pub fn order_by(mut self, clause: impl Into<String>) -> Query {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<Limit>) -> Query {
        self.limit = Some(limit.into());
        self
    }
}

/// Append a query's optional clauses to the schema's select template,
/// returning the final SQL and the full argument list.
fn build_select(schema: &Schema, query: &Query) -> Result<(String, Vec<Value>)> {
    let mut sql = schema.select_sql().to_string();
    let mut args = query.args.clone();

    if let Some(clause) = &query.where_clause {
        sql.push_str(" where ");
        sql.push_str(clause);
    }
    if let Some(clause) = &query.order_by {
        sql.push_str(" order by ");
        sql.push_str(clause);
    }
    match query.limit {
        Some(Limit::Count(count)) => {
            if count < 0 {
                return Err(RelmapError::InvalidLimit(count.to_string()));
            }
            sql.push_str(" limit ?");
            args.push(count.into());
        }
        Some(Limit::OffsetCount(offset, count)) => {
            if offset < 0 || count < 0 {
                return Err(RelmapError::InvalidLimit(format!("({offset}, {count})")));
            }
            sql.push_str(" limit ?, ?");
            args.push(offset.into());
            args.push(count.into());
        }
        None => {}
    }

    Ok((sql, args))
}

/// The handle for one declared record type: its compiled schema plus the
/// executor to run the templates with. Cheap to clone.
#[derive(Clone)]
pub struct Model {
    schema: Arc<Schema>,
    executor: Executor,
}

impl Model {
    pub fn new(schema: Schema, executor: Executor) -> Model {
        Model {
            schema: Arc::new(schema),
            executor,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// A new, empty record of this type.
    pub fn record(&self) -> Record {
        Record {
            schema: self.schema.clone(),
            values: Map::new(),
        }
    }

    /// Fetch one record by primary-key value.
    pub async fn find(&self, pk: Value) -> Result<Option<Record>> {
        let sql = format!(
            "{} where {}=?",
            self.schema.select_sql(),
            quote(self.schema.column(self.schema.primary_key()))
        );
        let rows = self
            .executor
            .query(&sql, std::slice::from_ref(&pk), Some(1))
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| Record::from_row(self.schema.clone(), &row)))
    }

    /// Fetch all records matching the query options.
    pub async fn find_all(&self, query: Query) -> Result<Vec<Record>> {
        let (sql, args) = build_select(&self.schema, &query)?;
        let rows = self.executor.query(&sql, &args, None).await?;
        Ok(rows
            .iter()
            .map(|row| Record::from_row(self.schema.clone(), row))
            .collect())
    }

    /// Evaluate an aggregate expression over this model's table, with an
    /// optional raw `where` fragment. Returns `None` when no row comes back.
    pub async fn find_number(
        &self,
        select_expr: &str,
        where_clause: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let mut sql = format!(
            "select {select_expr} as \"_num_\" from {}",
            quote(self.schema.table())
        );
        if let Some(clause) = where_clause {
            sql.push_str(" where ");
            sql.push_str(clause);
        }
        let rows = self.executor.query(&sql, args, Some(1)).await?;
        Ok(rows.into_iter().next().and_then(|row| row.get("_num_").cloned()))
    }
}

/// A runtime instance of a declared record type: the shared compiled schema
/// plus the instance's current field values. Unset fields are absent from
/// the map rather than null.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Map<String, Value>,
}

impl Record {
    /// Hydrate a record from a result row, translating column names back to
    /// field identifiers.
    fn from_row(schema: Arc<Schema>, row: &Row) -> Record {
        let mut values = Map::new();
        for field in schema.mappings().keys() {
            if let Some(value) = row.get(schema.column(field)) {
                values.insert(field.clone(), value.clone());
            }
        }
        Record { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The current value of a field, without default resolution.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set a field's value. Fails for fields the schema does not declare.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        if self.schema.descriptor(field).is_none() {
            return Err(RelmapError::UnknownField {
                model: self.schema.model().to_string(),
                field: field.to_string(),
            });
        }
        self.values.insert(field.to_string(), value);
        Ok(())
    }

    /// The current value of a field, resolving the descriptor's default when
    /// unset. A resolved non-null default is cached onto the instance, so a
    /// computed default is produced at most once per record.
    pub fn value_or_default(&mut self, field: &str) -> Result<Value> {
        if let Some(value) = self.values.get(field) {
            return Ok(value.clone());
        }
        let descriptor =
            self.schema
                .descriptor(field)
                .ok_or_else(|| RelmapError::UnknownField {
                    model: self.schema.model().to_string(),
                    field: field.to_string(),
                })?;
        let value = descriptor.resolve_default().unwrap_or(Value::Null);
        if !value.is_null() {
            log::debug!("using default value for {field}: {value}");
            self.values.insert(field.to_string(), value.clone());
        }
        Ok(value)
    }

    /// All currently-set field values.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The record as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Insert this record, resolving defaults for unset fields. An
    /// affected-row count other than 1 is logged, not an error.
    pub async fn save(&mut self, executor: &Executor) -> Result<()> {
        let schema = self.schema.clone();
        let mut args = Vec::with_capacity(schema.fields().len() + 1);
        for field in schema.fields() {
            args.push(self.value_or_default(field)?);
        }
        args.push(self.value_or_default(schema.primary_key())?);

        let affected = executor.execute(schema.insert_sql(), &args, true).await?;
        if affected != 1 {
            log::warn!(
                "insert into {} affected {affected} rows, expected 1",
                schema.table()
            );
        }
        Ok(())
    }

    /// Update this record's non-key columns by its current primary-key
    /// value. Unset fields are written as null; defaults are not resolved
    /// here, only at insert time. An affected-row count other than 1 is
    /// logged, not an error.
    pub async fn update(&self, executor: &Executor) -> Result<()> {
        let schema = self.schema.clone();
        let mut args = Vec::with_capacity(schema.fields().len() + 1);
        for field in schema.fields() {
            args.push(self.get(field).cloned().unwrap_or(Value::Null));
        }
        args.push(
            self.get(schema.primary_key())
                .cloned()
                .unwrap_or(Value::Null),
        );

        let affected = executor.execute(schema.update_sql(), &args, true).await?;
        if affected != 1 {
            log::warn!(
                "update of {} affected {affected} rows, expected 1",
                schema.table()
            );
        }
        Ok(())
    }

    /// Delete this record by its current primary-key value. An affected-row
    /// count other than 1 is logged, not an error.
    pub async fn remove(&self, executor: &Executor) -> Result<()> {
        let pk = self
            .get(self.schema.primary_key())
            .cloned()
            .unwrap_or(Value::Null);
        let affected = executor
            .execute(self.schema.delete_sql(), &[pk], true)
            .await?;
        if affected != 1 {
            log::warn!(
                "delete from {} affected {affected} rows, expected 1",
                self.schema.table()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{sqlite::Sqlite, Pool};
    use crate::field::FieldDescriptor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn user_schema() -> Schema {
        Schema::compile(
            "User",
            Some("users"),
            vec![
                ("id", FieldDescriptor::integer().primary_key()),
                ("name", FieldDescriptor::string()),
                ("email", FieldDescriptor::string()),
                ("admin", FieldDescriptor::boolean()),
            ],
        )
        .unwrap()
    }

    async fn users_model() -> Model {
        let executor = Executor::new(Pool::new(Sqlite::in_memory()).unwrap());
        executor
            .execute(
                r#"create table "users" ("id" bigint primary key, "name" varchar(100), "email" varchar(100), "admin" boolean)"#,
                &[],
                true,
            )
            .await
            .unwrap();
        Model::new(user_schema(), executor.clone())
    }

    async fn seed(model: &Model, executor: &Executor, count: i64) {
        for i in 1..=count {
            let mut user = model.record();
            user.set("id", json!(i)).unwrap();
            user.set("name", json!(format!("user{i}"))).unwrap();
            user.set("email", json!(format!("user{i}@test.com"))).unwrap();
            user.save(executor).await.unwrap();
        }
    }

    fn executor_of(model: &Model) -> Executor {
        // the test model shares its executor with the seeded pool
        model.executor.clone()
    }

    #[tokio::test]
    async fn test_save_find_round_trip() {
        let model = users_model().await;
        let executor = executor_of(&model);

        let mut user = model.record();
        user.set("id", json!(1)).unwrap();
        user.set("name", json!("Alice")).unwrap();
        user.set("email", json!("alice@test.com")).unwrap();
        user.save(&executor).await.unwrap();

        let found = model.find(json!(1)).await.unwrap().unwrap();
        assert_eq!(found.get("id"), Some(&json!(1)));
        assert_eq!(found.get("name"), Some(&json!("Alice")));
        assert_eq!(found.get("email"), Some(&json!("alice@test.com")));
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let model = users_model().await;
        assert!(model.find(json!(404)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_applies_defaults() {
        let model = users_model().await;
        let executor = executor_of(&model);

        let mut user = model.record();
        user.set("id", json!(1)).unwrap();
        user.save(&executor).await.unwrap();

        // boolean default false is stored as 0 under SQLite's numeric affinity
        let found = model.find(json!(1)).await.unwrap().unwrap();
        assert_eq!(found.get("admin"), Some(&json!(0)));
        assert_eq!(found.get("name"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_duplicate_save_propagates_constraint_error() {
        let model = users_model().await;
        let executor = executor_of(&model);

        let mut user = model.record();
        user.set("id", json!(1)).unwrap();
        user.save(&executor).await.unwrap();

        let mut duplicate = model.record();
        duplicate.set("id", json!(1)).unwrap();
        assert!(duplicate.save(&executor).await.is_err());
    }

    #[tokio::test]
    async fn test_update() {
        let model = users_model().await;
        let executor = executor_of(&model);
        seed(&model, &executor, 1).await;

        let mut user = model.find(json!(1)).await.unwrap().unwrap();
        user.set("name", json!("renamed")).unwrap();
        user.update(&executor).await.unwrap();

        let found = model.find(json!(1)).await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&json!("renamed")));
        assert_eq!(found.get("email"), Some(&json!("user1@test.com")));
    }

    #[tokio::test]
    async fn test_remove() {
        let model = users_model().await;
        let executor = executor_of(&model);
        seed(&model, &executor, 2).await;

        let user = model.find(json!(1)).await.unwrap().unwrap();
        user.remove(&executor).await.unwrap();

        assert!(model.find(json!(1)).await.unwrap().is_none());
        assert!(model.find(json!(2)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_all_with_filter_and_order() {
        let model = users_model().await;
        let executor = executor_of(&model);
        seed(&model, &executor, 5).await;

        let records = model
            .find_all(
                Query::new()
                    .filter(r#""id" > ?"#)
                    .bind(json!(2))
                    .order_by(r#""id" desc"#),
            )
            .await
            .unwrap();

        let ids: Vec<&Value> = records.iter().filter_map(|r| r.get("id")).collect();
        assert_eq!(ids, [&json!(5), &json!(4), &json!(3)]);
    }

    #[tokio::test]
    async fn test_find_all_limit_and_offset() {
        let model = users_model().await;
        let executor = executor_of(&model);
        seed(&model, &executor, 5).await;

        let records = model
            .find_all(Query::new().order_by(r#""id""#).limit(2))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&json!(1)));

        let records = model
            .find_all(Query::new().order_by(r#""id""#).limit((2, 2)))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_find_number() {
        let model = users_model().await;
        let executor = executor_of(&model);
        seed(&model, &executor, 3).await;

        let count = model.find_number("count(*)", None, &[]).await.unwrap();
        assert_eq!(count, Some(json!(3)));

        let count = model
            .find_number("count(*)", Some(r#""id" > ?"#), &[json!(2)])
            .await
            .unwrap();
        assert_eq!(count, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_value_or_default_caches_static_default() {
        let model = users_model().await;
        let mut user = model.record();

        assert_eq!(user.get("admin"), None);
        assert_eq!(user.value_or_default("admin").unwrap(), json!(false));
        assert_eq!(user.get("admin"), Some(&json!(false)));
        assert_eq!(user.value_or_default("admin").unwrap(), json!(false));
    }

    #[tokio::test]
    async fn test_value_or_default_invokes_computed_once() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let counter = Arc::new(AtomicI64::new(0));
        let handle = counter.clone();
        let schema = Schema::compile(
            "Ticket",
            None,
            vec![(
                "id",
                FieldDescriptor::integer()
                    .primary_key()
                    .default_with(move || json!(handle.fetch_add(1, Ordering::SeqCst) + 100)),
            )],
        )
        .unwrap();
        let executor = Executor::new(Pool::new(Sqlite::in_memory()).unwrap());
        let model = Model::new(schema, executor);

        let mut ticket = model.record();
        assert_eq!(ticket.value_or_default("id").unwrap(), json!(100));
        assert_eq!(ticket.value_or_default("id").unwrap(), json!(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_value_without_default_is_null_and_uncached() {
        let model = users_model().await;
        let mut user = model.record();

        assert_eq!(user.value_or_default("name").unwrap(), Value::Null);
        assert_eq!(user.get("name"), None);
    }

    #[tokio::test]
    async fn test_set_unknown_field() {
        let model = users_model().await;
        let mut user = model.record();
        let result = user.set("nope", json!(1));
        assert!(matches!(
            result,
            Err(RelmapError::UnknownField { field, .. }) if field == "nope"
        ));
    }

    #[test]
    fn test_build_select_limit_bindings() {
        let schema = user_schema();

        let (sql, args) = build_select(&schema, &Query::new().limit(5)).unwrap();
        assert!(sql.ends_with(" limit ?"));
        assert_eq!(args, vec![json!(5)]);

        let (sql, args) = build_select(&schema, &Query::new().limit((10, 5))).unwrap();
        assert!(sql.ends_with(" limit ?, ?"));
        assert_eq!(args, vec![json!(10), json!(5)]);

        let (sql, args) = build_select(&schema, &Query::new()).unwrap();
        assert_eq!(sql, schema.select_sql());
        assert!(args.is_empty());
    }

    #[test]
    fn test_build_select_invalid_limit() {
        let schema = user_schema();
        assert!(matches!(
            build_select(&schema, &Query::new().limit(-1)),
            Err(RelmapError::InvalidLimit(_))
        ));
        assert!(matches!(
            build_select(&schema, &Query::new().limit((-1, 5))),
            Err(RelmapError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_build_select_clause_order() {
        let schema = user_schema();
        let query = Query::new()
            .filter(r#""email" = ?"#)
            .bind(json!("a@test.com"))
            .order_by(r#""id""#)
            .limit(1);
        let (sql, args) = build_select(&schema, &query).unwrap();
        assert_eq!(
            sql,
            format!(
                r#"{} where "email" = ? order by "id" limit ?"#,
                schema.select_sql()
            )
        );
        assert_eq!(args, vec![json!("a@test.com"), json!(1)]);
    }

    #[tokio::test]
    async fn test_hydration_with_column_override() {
        let executor = Executor::new(Pool::new(Sqlite::in_memory()).unwrap());
        executor
            .execute(
                r#"create table "posts" ("post_id" varchar(50) primary key, "title" varchar(100))"#,
                &[],
                true,
            )
            .await
            .unwrap();

        let schema = Schema::compile(
            "Post",
            Some("posts"),
            vec![
                (
                    "id",
                    FieldDescriptor::string().primary_key().column("post_id"),
                ),
                ("title", FieldDescriptor::string()),
            ],
        )
        .unwrap();
        let model = Model::new(schema, executor.clone());

        let mut post = model.record();
        post.set("id", json!("p-1")).unwrap();
        post.set("title", json!("hello")).unwrap();
        post.save(&executor).await.unwrap();

        let found = model.find(json!("p-1")).await.unwrap().unwrap();
        assert_eq!(found.get("id"), Some(&json!("p-1")));
        assert_eq!(found.get("title"), Some(&json!("hello")));
    }
}
