use pretty_assertions::assert_eq;
use serde::Deserialize;
use sqlweave::prelude::*;

const SCHEMA: &str = r#"
CREATE TABLE "Genres" ("GenreId" INTEGER PRIMARY KEY, "Name" TEXT NOT NULL);
INSERT INTO "Genres" ("Name") VALUES ('Rock'), ('Jazz'), ('Metal'), ('Alternative & Punk'), ('Blues');
"#;

const GET: &str = r#"SELECT "GenreId", "Name" FROM "Genres" {0} {1} {2};"#;
const INSERT: &str = r#"INSERT INTO "Genres" {0} VALUES {1};"#;
const UPDATE: &str = r#"UPDATE "Genres" {0} {1};"#;
const DELETE: &str = r#"DELETE FROM "Genres" {0};"#;

#[derive(Debug, Deserialize, PartialEq)]
struct Genre {
    #[serde(rename = "GenreId")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
}

fn genre(id: i64, name: &str) -> Genre {
    Genre {
        id,
        name: name.to_string(),
    }
}

fn genres() -> OperationTable {
    OperationTable::new("Genres")
        .with(Operation::filter(
            "NameEquals",
            r#""Name" = {0}"#,
            vec![ParameterMetadata::of::<String>("name")],
        ))
        .and_then(|t| {
            t.with(Operation::filter(
                "IdAbove",
                r#""GenreId" > {0}"#,
                vec![ParameterMetadata::of::<i64>("id").with_default(0)],
            ))
        })
        .and_then(|t| t.with(Operation::order("ByName", r#""Name" {0}"#, vec![])))
        .and_then(|t| {
            t.with(Operation::merge(
                "Name",
                "{0}",
                vec![ParameterMetadata::of::<String>("value")],
                "Name",
                true,
            ))
        })
        .unwrap()
}

fn base(source: &str) -> Template {
    Template::parse(source).unwrap()
}

async fn seeded(connection: SqliteConnection) -> QueryContext<SqliteConnection> {
    let mut ctx = QueryContext::new(connection);
    ctx.connection_mut().execute_script(SCHEMA).await.unwrap();
    ctx
}

fn composer() -> Composer {
    Composer::new(Dialect::Sqlite)
}

async fn find(ctx: &mut QueryContext<SqliteConnection>, name: &str) -> Vec<Genre> {
    let sql = composer()
        .get_query(
            ctx,
            &genres(),
            &base(GET),
            &[QueryOperation::new("NameEquals").with("name", name)],
            &[],
            None,
        )
        .unwrap();
    ctx.add_statement(sql).unwrap();
    ctx.execute_next_query().await.unwrap()
}

#[tokio::test]
async fn test_no_queries_on_fresh_context() {
    let mut ctx = QueryContext::new(SqliteConnection::memory());
    let err = ctx.execute_next_query::<Genre>().await.unwrap_err();
    assert_eq!(err.to_string(), "no queries to execute against the database.");
    assert!(!ctx.connection().is_open());
}

#[tokio::test]
async fn test_insert_batch_runs_once() {
    let mut ctx = seeded(SqliteConnection::memory()).await;
    let table = genres();

    for name in ["Disco", "Funk"] {
        let sql = composer()
            .insert_query(
                &mut ctx,
                &table,
                &base(INSERT),
                &[vec![QueryOperation::new("Name").with("value", name)]],
            )
            .unwrap();
        ctx.add_statement(sql).unwrap();
    }
    assert_eq!(
        ctx.pending_statements(),
        &[
            r#"INSERT INTO "Genres" ("Name") VALUES (@value_1);"#.to_string(),
            r#"INSERT INTO "Genres" ("Name") VALUES (@value_2);"#.to_string(),
        ]
    );

    assert_eq!(ctx.execute_commands().await.unwrap(), 2);

    let err = ctx.execute_commands().await.unwrap_err();
    assert_eq!(err.to_string(), "no commands to execute against the database.");
    assert!(err.is_invalid_operation());

    assert_eq!(find(&mut ctx, "Funk").await, vec![genre(7, "Funk")]);
}

#[tokio::test]
async fn test_multi_row_insert() {
    let mut ctx = seeded(SqliteConnection::memory()).await;
    let rows = vec![
        vec![QueryOperation::new("Name").with("value", "Soul")],
        vec![QueryOperation::new("Name").with("value", "Reggae")],
    ];
    let sql = composer()
        .insert_query(&mut ctx, &genres(), &base(INSERT), &rows)
        .unwrap();
    assert_eq!(
        sql,
        r#"INSERT INTO "Genres" ("Name") VALUES (@value_1), (@value_2);"#
    );
    ctx.add_statement(sql).unwrap();
    assert_eq!(ctx.execute_commands().await.unwrap(), 2);
    assert_eq!(find(&mut ctx, "Reggae").await, vec![genre(7, "Reggae")]);
}

#[tokio::test]
async fn test_filtered_ordered_page() {
    let mut ctx = seeded(SqliteConnection::memory()).await;
    let sql = composer()
        .get_query(
            &mut ctx,
            &genres(),
            &base(GET),
            &[QueryOperation::new("IdAbove").with("id", 1)],
            &[QueryOperation::new("ByName")],
            Some(Page { skip: 1, take: 2 }),
        )
        .unwrap();
    ctx.add_statement(sql).unwrap();

    let page: Vec<Genre> = ctx.execute_next_query().await.unwrap();
    assert_eq!(page, vec![genre(5, "Blues"), genre(2, "Jazz")]);
    assert_eq!(ctx.state(), ContextState::Idle);
}

#[tokio::test]
async fn test_one_round_trip_many_result_sets() {
    let mut ctx = seeded(SqliteConnection::memory()).await;
    let table = genres();

    for name in ["Rock", "Jazz"] {
        let sql = composer()
            .get_query(
                &mut ctx,
                &table,
                &base(GET),
                &[QueryOperation::new("NameEquals").with("name", name)],
                &[],
                None,
            )
            .unwrap();
        ctx.add_statement(sql).unwrap();
    }

    let first: Vec<Genre> = ctx.execute_next_query().await.unwrap();
    assert_eq!(first, vec![genre(1, "Rock")]);
    assert_eq!(ctx.state(), ContextState::Reading);
    assert!(ctx.in_transaction());

    let second: Vec<Genre> = ctx.execute_next_query().await.unwrap();
    assert_eq!(second, vec![genre(2, "Jazz")]);
    assert_eq!(ctx.state(), ContextState::Idle);
    assert!(!ctx.in_transaction());
    assert_eq!(ctx.parameters().next_suffix(), 1);

    let err = ctx.execute_next_query::<Genre>().await.unwrap_err();
    assert!(matches!(err, WeaveError::NoQueries));
}

#[tokio::test]
async fn test_update_then_delete() {
    let mut ctx = seeded(SqliteConnection::memory()).await;
    let table = genres();

    let sql = composer()
        .update_query(
            &mut ctx,
            &table,
            &base(UPDATE),
            &[QueryOperation::new("Name").with("value", "Heavy Metal")],
            &[QueryOperation::new("NameEquals").with("name", "Metal")],
        )
        .unwrap();
    assert_eq!(
        sql,
        r#"UPDATE "Genres" SET "Name" = @value_1 WHERE "Name" = @name_2;"#
    );
    ctx.add_statement(sql).unwrap();
    assert_eq!(ctx.execute_commands().await.unwrap(), 1);

    let sql = composer()
        .delete_query(
            &mut ctx,
            &table,
            &base(DELETE),
            &[QueryOperation::new("IdAbove").with("id", 3)],
        )
        .unwrap();
    ctx.add_statement(sql).unwrap();
    assert_eq!(ctx.execute_commands().await.unwrap(), 2);

    assert_eq!(find(&mut ctx, "Heavy Metal").await, vec![genre(3, "Heavy Metal")]);
}

#[tokio::test]
async fn test_failed_composition_binds_nothing() {
    let mut ctx = seeded(SqliteConnection::memory()).await;
    let err = composer()
        .filters(
            &mut ctx,
            &genres(),
            &[
                QueryOperation::new("IdAbove"),
                QueryOperation::new("NameEquals"),
            ],
        )
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Parameter 'name' is required by operation 'NameEquals'"
    );
    assert!(ctx.parameters().is_empty());
}

#[tokio::test]
async fn test_dropped_reader_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chinook.db");

    {
        let mut ctx = seeded(SqliteConnection::new(SqliteConfig::file(&path))).await;
        ctx.add_statement(r#"DELETE FROM "Genres";"#).unwrap();
        ctx.add_statement(r#"SELECT COUNT(*) AS n FROM "Genres";"#).unwrap();
        ctx.add_statement(r#"SELECT 1 AS n;"#).unwrap();
        let first = ctx.execute_next_result_set().await.unwrap();
        assert_eq!(first.rows, vec![vec![Value::Int(0)]]);
        assert!(ctx.in_transaction());
    }

    let mut ctx = QueryContext::new(SqliteConnection::new(SqliteConfig::file(&path)));
    ctx.add_statement(r#"SELECT COUNT(*) AS n FROM "Genres";"#).unwrap();
    let count = ctx.execute_next_result_set().await.unwrap();
    assert_eq!(count.rows, vec![vec![Value::Int(5)]]);
}

#[tokio::test]
async fn test_committed_batch_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("chinook.db");

    {
        let mut ctx = seeded(SqliteConnection::new(SqliteConfig::file(&path))).await;
        let sql = composer()
            .insert_query(
                &mut ctx,
                &genres(),
                &base(INSERT),
                &[vec![QueryOperation::new("Name").with("value", "Bossa Nova")]],
            )
            .unwrap();
        ctx.add_statement(sql).unwrap();
        ctx.execute_commands().await.unwrap();
    }

    let mut ctx = QueryContext::new(SqliteConnection::new(SqliteConfig::file(&path)));
    assert_eq!(find(&mut ctx, "Bossa Nova").await, vec![genre(6, "Bossa Nova")]);
}
