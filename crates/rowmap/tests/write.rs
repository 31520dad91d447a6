use rowmap::testing::{CallKind, MemoryExecutor};
use rowmap::{args, Arg, Db, DbConfig, ExecOutcome, OrmError, Placeholder, Record, Value};

#[derive(Debug, Clone, Default, Record)]
struct Member {
    #[orm(db = "name")]
    name: String,
    #[orm(db = "age")]
    age: i64,
    note: String,
}

impl Member {
    fn new(name: &str, age: i64) -> Self {
        Self {
            name: name.to_string(),
            age,
            note: String::new(),
        }
    }
}

fn numbered() -> Db<MemoryExecutor> {
    Db::new(MemoryExecutor::new())
}

fn question() -> Db<MemoryExecutor> {
    Db::with_config(MemoryExecutor::new(), DbConfig::for_driver("mysql"))
}

#[tokio::test]
async fn insert_synthesizes_columns_and_placeholders() {
    let db = numbered();
    let result = db.insert("users", &[Member::new("a", 3)]).await.unwrap();
    assert_eq!(result.sql(), "insert into users(name,age) values($1,$2)");
    assert_eq!(result.args(), &[Value::from("a"), Value::from(3)]);

    let db = question();
    let result = db.insert_one("users", &Member::new("a", 3)).await.unwrap();
    assert_eq!(result.sql(), "insert into users(name,age) values(?,?)");
    assert_eq!(result.args(), &[Value::from("a"), Value::from(3)]);

    let last = db.executor().last().unwrap();
    assert_eq!(last.kind, CallKind::Execute);
    assert_eq!(last.sql, "insert into users(name,age) values(?,?)");
}

#[tokio::test]
async fn insert_many_records_in_one_statement() {
    let db = numbered();
    db.executor()
        .push_outcome(ExecOutcome::new(2).with_last_insert_id(11));

    let members = [Member::new("a", 1), Member::new("b", 2)];
    let result = db.insert("users", &members).await.unwrap();
    assert_eq!(
        result.sql(),
        "insert into users(name,age) values($1,$2),($3,$4)"
    );
    assert_eq!(result.args(), &args!["a", 1, "b", 2][..]);
    assert_eq!(result.rows_affected(), 2);
    assert_eq!(result.last_insert_id(), 11);
    assert_eq!(db.mapping_cache().len(), 1);
}

#[tokio::test]
async fn insert_with_explicit_columns_binds_only_those() {
    let db = numbered();
    let result = db
        .insert("insert into users(age) values", &[Member::new("a", 3)])
        .await
        .unwrap();
    assert_eq!(result.sql(), "insert into users(age) values($1)");
    assert_eq!(result.args(), &[Value::from(3)]);

    let err = db
        .insert("users(name,email)", &[Member::new("a", 3)])
        .await
        .unwrap_err();
    assert!(err.is_invalid_destination());
}

#[tokio::test]
async fn insert_values_groups_by_column_count() {
    let db = numbered();
    let result = db
        .insert_values("users(name,age)", args!["a", 1, "b", 2])
        .await
        .unwrap();
    assert_eq!(
        result.sql(),
        "insert into users(name,age) values($1,$2),($3,$4)"
    );

    let err = db
        .insert_values("users(name,age)", args!["a", 1, "b"])
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));

    let err = db.insert_values("users", args!["a"]).await.unwrap_err();
    assert!(err.is_malformed_head());

    let result = db
        .insert_values("users(name) values ('x')", args![])
        .await
        .unwrap();
    assert_eq!(result.sql(), "insert into users(name) values ('x')");
}

#[tokio::test]
async fn insert_args_accepts_leading_records_only() {
    let db = numbered();
    let members = [Member::new("a", 3)];
    let result = db
        .insert_args("users", vec![Arg::records(&members)])
        .await
        .unwrap();
    assert_eq!(result.sql(), "insert into users(name,age) values($1,$2)");

    let err = db
        .insert_args("users", vec![Arg::records(&members), Arg::value(1)])
        .await
        .unwrap_err();
    assert!(err.is_invalid_destination());

    let err = db
        .insert_args("users", vec![Arg::value(1), Arg::record(&members[0])])
        .await
        .unwrap_err();
    assert!(err.is_invalid_destination());
}

#[tokio::test]
async fn update_binds_record_fields_then_trailing_args() {
    let db = question();
    let result = db
        .update_from_record(
            "users set name=?,age=? where id=?",
            &Member::new("a", 3),
            args![7],
        )
        .await
        .unwrap();
    assert_eq!(result.sql(), "update users set name=?,age=? where id=?");
    assert_eq!(result.args(), &args!["a", 3, 7][..]);
}

#[tokio::test]
async fn update_with_empty_assignments_is_completed() {
    let db = numbered();
    let member = Member::new("a", 3);
    let result = db
        .update(
            "users set where id=$3",
            vec![Arg::record(&member), Arg::value(7)],
        )
        .await
        .unwrap();
    assert_eq!(result.sql(), "update users set name=$1,age=$2 where id=$3");
    assert_eq!(result.args(), &args!["a", 3, 7][..]);
}

#[tokio::test]
async fn update_with_plain_values_runs_as_written() {
    let db = numbered();
    let result = db
        .update("update users set age = age + 1 where id = $1", vec![Arg::value(4)])
        .await
        .unwrap();
    assert_eq!(result.sql(), "update users set age = age + 1 where id = $1");
    assert_eq!(result.args(), &[Value::Int(4)]);
}

#[tokio::test]
async fn update_errors() {
    let db = question();
    let member = Member::new("a", 3);

    let err = db
        .update_from_record("users where id=?", &member, args![1])
        .await
        .unwrap_err();
    assert!(err.is_malformed_head());

    let err = db
        .update_from_record("users set email=? where id=?", &member, args![1])
        .await
        .unwrap_err();
    assert!(err.is_invalid_destination());

    let members = [member.clone(), member];
    let err = db
        .update("users set name=?", vec![Arg::records(&members)])
        .await
        .unwrap_err();
    assert!(err.is_invalid_destination());

    assert!(db.executor().executed().is_empty());
}

#[tokio::test]
async fn delete_and_exec_report_rows_affected() {
    let db = numbered();
    db.executor()
        .push_outcome(ExecOutcome::new(3))
        .push_outcome(ExecOutcome::new(0));

    let result = db.delete("delete from users where age > $1", args![30]).await.unwrap();
    assert_eq!(result.rows_affected(), 3);
    assert_eq!(result.last_insert_id(), 0);

    let result = db.exec("vacuum", args![]).await.unwrap();
    assert_eq!(result.rows_affected(), 0);
    assert_eq!(result.statement(), "[vacuum], []");
}

#[tokio::test]
async fn prepared_inserts_bind_every_record() {
    let mut db = numbered();
    db.set_placeholder(Placeholder::Numbered);

    let stmt = db
        .prepare("insert into users(name,age) values($1,$2)")
        .await
        .unwrap();
    let result = stmt.insert_one(&Member::new("a", 3)).await.unwrap();
    assert_eq!(result.sql(), "insert into users(name,age) values($1,$2)");
    assert_eq!(result.args(), &args!["a", 3][..]);

    let last = db.executor().last().unwrap();
    assert_eq!(last.kind, CallKind::Execute);
    assert!(last.prepared);
}

#[tokio::test]
async fn prepared_updates_append_trailing_args() {
    let db = question();
    let stmt = db.prepare("update users set age=? where name=?").await.unwrap();
    let result = stmt
        .update(vec![Arg::record(&Member::new("a", 5)), Arg::value("a")])
        .await
        .unwrap();
    assert_eq!(result.args(), &args![5, "a"][..]);
}
