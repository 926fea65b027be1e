use relmap::driver::sqlite::Sqlite;
use relmap::{Executor, FieldDescriptor, Model, Pool, Query, Schema};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Time-prefixed unique id, sortable by creation time.
fn next_id() -> Value {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    json!(format!("{millis:015}{}", Uuid::new_v4().simple()))
}

fn now() -> Value {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    json!(secs)
}

fn id_field() -> FieldDescriptor {
    FieldDescriptor::string()
        .primary_key()
        .ddl("varchar(50)")
        .default_with(next_id)
}

fn user_schema() -> relmap::Result<Schema> {
    Schema::compile(
        "User",
        Some("users"),
        vec![
            ("id", id_field()),
            ("email", FieldDescriptor::string().ddl("varchar(50)")),
            ("passwd", FieldDescriptor::string().ddl("varchar(50)")),
            ("admin", FieldDescriptor::boolean()),
            ("name", FieldDescriptor::string().ddl("varchar(50)")),
            ("image", FieldDescriptor::string().ddl("varchar(500)")),
            ("created_at", FieldDescriptor::float().default_with(now)),
        ],
    )
}

fn blog_schema() -> relmap::Result<Schema> {
    Schema::compile(
        "Blog",
        Some("blogs"),
        vec![
            ("id", id_field()),
            ("user_id", FieldDescriptor::string().ddl("varchar(50)")),
            ("user_name", FieldDescriptor::string().ddl("varchar(50)")),
            ("user_image", FieldDescriptor::string().ddl("varchar(500)")),
            ("name", FieldDescriptor::string().ddl("varchar(50)")),
            ("summary", FieldDescriptor::string().ddl("varchar(200)")),
            ("content", FieldDescriptor::text()),
            ("created_at", FieldDescriptor::float().default_with(now)),
        ],
    )
}

fn comment_schema() -> relmap::Result<Schema> {
    Schema::compile(
        "Comment",
        Some("comments"),
        vec![
            ("id", id_field()),
            ("blog_id", FieldDescriptor::string().ddl("varchar(50)")),
            ("user_id", FieldDescriptor::string().ddl("varchar(50)")),
            ("user_name", FieldDescriptor::string().ddl("varchar(50)")),
            ("user_image", FieldDescriptor::string().ddl("varchar(500)")),
            ("content", FieldDescriptor::text()),
            ("created_at", FieldDescriptor::float().default_with(now)),
        ],
    )
}

/// Issue `create table` DDL derived from a compiled schema. Table layout is
/// the application's responsibility; relmap only derives the CRUD SQL.
async fn create_table(executor: &Executor, schema: &Schema) -> relmap::Result<()> {
    let columns: Vec<String> = schema
        .mappings()
        .iter()
        .map(|(field, descriptor)| {
            let mut def = format!("\"{}\" {}", schema.column(field), descriptor.column_type());
            if descriptor.is_primary_key() {
                def.push_str(" primary key");
            }
            def
        })
        .collect();
    let sql = format!(
        "create table if not exists \"{}\" ({})",
        schema.table(),
        columns.join(", ")
    );
    executor.execute(&sql, &[], true).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> relmap::Result<()> {
    env_logger::init();

    let driver = match std::env::var("RELMAP_DB") {
        Ok(path) => {
            log::info!("opening database at {path}");
            Sqlite::open(path)
        }
        Err(_) => {
            log::info!("using in-memory database");
            Sqlite::in_memory()
        }
    };
    let executor = Executor::new(Pool::new(driver)?);

    let users = Model::new(user_schema()?, executor.clone());
    let blogs = Model::new(blog_schema()?, executor.clone());
    let comments = Model::new(comment_schema()?, executor.clone());

    for model in [&users, &blogs, &comments] {
        create_table(&executor, model.schema()).await?;
    }

    // a user signs up
    let mut alice = users.record();
    alice.set("email", json!("alice@example.com"))?;
    alice.set("passwd", json!("secret"))?;
    alice.set("name", json!("Alice"))?;
    alice.set("image", json!("about:blank"))?;
    alice.save(&executor).await?;
    let alice_id = alice.value_or_default("id")?;
    println!("saved user: {}", alice.to_json());

    // she writes two blog posts
    for (title, body) in [
        ("Hello, world", "First post."),
        ("Second thoughts", "More to say."),
    ] {
        let mut blog = blogs.record();
        blog.set("user_id", alice_id.clone())?;
        blog.set("user_name", json!("Alice"))?;
        blog.set("user_image", json!("about:blank"))?;
        blog.set("name", json!(title))?;
        blog.set("summary", json!(&body[..body.len().min(40)]))?;
        blog.set("content", json!(body))?;
        blog.save(&executor).await?;
    }

    // and someone comments on the latest one
    let latest = blogs
        .find_all(Query::new().order_by(r#""created_at" desc"#).limit(1))
        .await?;
    if let Some(blog) = latest.first() {
        let mut comment = comments.record();
        comment.set("blog_id", blog.get("id").cloned().unwrap_or(Value::Null))?;
        comment.set("user_id", alice_id.clone())?;
        comment.set("user_name", json!("Alice"))?;
        comment.set("user_image", json!("about:blank"))?;
        comment.set("content", json!("Replying to myself."))?;
        comment.save(&executor).await?;
    }

    let found = users.find(alice_id.clone()).await?;
    match found {
        Some(user) => println!("found user by id: {}", user.to_json()),
        None => println!("user not found"),
    }

    let posts = blogs
        .find_all(
            Query::new()
                .filter(r#""user_id" = ?"#)
                .bind(alice_id.clone())
                .order_by(r#""created_at" desc"#),
        )
        .await?;
    println!("alice has {} posts", posts.len());

    let comment_count = comments.find_number("count(*)", None, &[]).await?;
    println!("total comments: {}", comment_count.unwrap_or(Value::Null));

    Ok(())
}
