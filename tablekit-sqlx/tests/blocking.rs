use serde::{Deserialize, Serialize};
use serde_json::json;
use tablekit::blocking::BlockingDatabase;
use tablekit::prelude::*;
use tablekit::Caches;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Todo {
    id: i64,
    title: String,
    done: bool,
}

fn open() -> BlockingDatabase {
    let options = DatabaseOptions::default().with_url("sqlite::memory:");
    let db = BlockingDatabase::open(|| async move {
        let db = tablekit_sqlx::sqlite::open(options).await?;
        Ok(db.with_caches(Caches::new()))
    })
    .unwrap();
    db.execute(
        "CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT NOT NULL, done BOOLEAN NOT NULL)",
        Params::new(),
    )
    .unwrap();
    db
}

#[test]
fn blocking_crud_and_paging() {
    let db = open();
    let todos = db.table::<Todo>("todos");

    for title in ["write", "review", "ship"] {
        todos
            .insert(json!({ "title": title, "done": false }))
            .unwrap();
    }
    assert_eq!(todos.update(2, json!({ "done": true })).unwrap(), 1);

    let review = todos.get(2).unwrap().unwrap();
    assert_eq!(
        review,
        Todo {
            id: 2,
            title: "review".into(),
            done: true
        }
    );

    let page = todos.page_where(json!({ "done": false }), 1, None).unwrap();
    assert_eq!(page.total_items, 2);
    assert_eq!(page.items_per_page, 10);

    let raw: Page<Todo> = db
        .paginate("SELECT * FROM todos ORDER BY id DESC", 1, 2, Params::new())
        .unwrap();
    assert_eq!(raw.items[0].title, "ship");
    assert!(raw.has_next);
}

#[test]
fn blocking_transactions_and_dispose() {
    let db = open();
    let todos = db.table::<Todo>("todos");

    db.begin_transaction().unwrap();
    todos.insert(json!({ "title": "draft", "done": false })).unwrap();
    db.rollback().unwrap();
    assert!(todos.all().unwrap().is_empty());

    db.dispose();
    assert!(db.is_disposed());
    assert!(matches!(todos.first(), Err(DataError::Closed)));
}
