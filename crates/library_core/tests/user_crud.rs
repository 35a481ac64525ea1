use library_core::db::migrations::latest_version;
use library_core::db::{open_db, open_db_in_memory};
use chrono::{SubsecRound, Utc};
use library_core::{EntityId, RepoError, SqliteUserRepository, User, UserRepository, UserService};
use rusqlite::{params, Connection};

const U1: &str = "00000000-0000-4000-8000-000000000001";
const U2: &str = "00000000-0000-4000-8000-000000000002";
const U3: &str = "00000000-0000-4000-8000-000000000003";
const BK1: &str = "00000000-0000-4000-8000-0000000000b1";
const BK2: &str = "00000000-0000-4000-8000-0000000000b2";
const BK3: &str = "00000000-0000-4000-8000-0000000000b3";

#[test]
fn create_and_get_roundtrip_has_no_books() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut user = user_with_id(U1, "a@x.com", "A", "B");
    user.books.push(id(BK1));
    let created = repo.create(&user).unwrap();
    assert_eq!(created, user.id);

    let loaded = repo.get(user.id).unwrap();
    assert_eq!(loaded.id, user.id);
    assert_eq!(loaded.email, "a@x.com");
    assert_eq!(loaded.password, "secret");
    assert_eq!(loaded.first_name, "A");
    assert_eq!(loaded.last_name, "B");
    assert!(loaded.updated_at.is_none());
    assert!(loaded.books.is_empty());
}

#[test]
fn create_with_existing_id_is_storage_error() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let user = user_with_id(U1, "a@x.com", "A", "B");
    repo.create(&user).unwrap();

    let err = repo.create(&user).unwrap_err();
    assert!(matches!(err, RepoError::Db(_)), "unexpected error: {err}");
}

#[test]
fn create_stores_text_attributes_as_given() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let odd = User {
        id: id(U1),
        email: "not-an-address".to_string(),
        password: String::new(),
        first_name: String::new(),
        last_name: "  ".to_string(),
        created_at: Utc::now().trunc_subsecs(3),
        updated_at: None,
        books: Vec::new(),
    };
    repo.create(&odd).unwrap();

    let loaded = repo.get(odd.id).unwrap();
    assert_eq!(loaded, odd);
}

#[test]
fn create_keeps_the_aggregate_creation_time() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let user = user_with_id(U1, "a@x.com", "A", "B");
    repo.create(&user).unwrap();

    assert_eq!(repo.get(user.id).unwrap().created_at, user.created_at);
}

#[test]
fn scenario_with_blank_password_replaces_books_across_updates() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1, BK2]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut user = User {
        id: id(U1),
        email: "a@x.com".to_string(),
        password: String::new(),
        first_name: "A".to_string(),
        last_name: "B".to_string(),
        created_at: Utc::now().trunc_subsecs(3),
        updated_at: None,
        books: Vec::new(),
    };
    assert_eq!(repo.create(&user).unwrap(), id(U1));

    user.books = vec![id(BK1), id(BK2)];
    repo.update(&mut user).unwrap();
    let loaded = repo.get(id(U1)).unwrap();
    assert_eq!(loaded.books, vec![id(BK1), id(BK2)]);
    assert_eq!(loaded.password, "");

    user.books = vec![id(BK2)];
    repo.update(&mut user).unwrap();
    assert_eq!(repo.get(id(U1)).unwrap().books, vec![id(BK2)]);
}

#[test]
fn get_missing_user_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let err = repo.get(id(U1)).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(missing) if missing == id(U1)));
    assert!(err.is_not_found());
}

#[test]
fn update_replaces_book_links_exactly() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1, BK2]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut user = user_with_id(U1, "a@x.com", "A", "B");
    repo.create(&user).unwrap();

    user.books = vec![id(BK1), id(BK2)];
    repo.update(&mut user).unwrap();
    assert_eq!(repo.get(user.id).unwrap().books, vec![id(BK1), id(BK2)]);

    user.books = vec![id(BK2)];
    repo.update(&mut user).unwrap();
    assert_eq!(repo.get(user.id).unwrap().books, vec![id(BK2)]);

    user.books.clear();
    repo.update(&mut user).unwrap();
    assert!(repo.get(user.id).unwrap().books.is_empty());
}

#[test]
fn repeated_update_with_same_books_keeps_the_set() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1, BK2]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut user = user_with_id(U1, "a@x.com", "A", "B");
    repo.create(&user).unwrap();

    user.books = vec![id(BK2), id(BK1), id(BK2)];
    repo.update(&mut user).unwrap();
    let first = repo.get(user.id).unwrap().books;
    repo.update(&mut user).unwrap();
    let second = repo.get(user.id).unwrap().books;

    assert_eq!(first, vec![id(BK1), id(BK2)]);
    assert_eq!(first, second);
    drop(repo);
    assert_eq!(link_count(&conn, U1), 2);
}

#[test]
fn update_overwrites_attributes_and_stamps_updated_at() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut user = user_with_id(U1, "a@x.com", "A", "B");
    repo.create(&user).unwrap();
    let created_at = repo.get(user.id).unwrap().created_at;

    user.email = "new@x.com".to_string();
    user.first_name = "Ann".to_string();
    user.password = "rotated".to_string();
    repo.update(&mut user).unwrap();

    let loaded = repo.get(user.id).unwrap();
    assert_eq!(loaded.email, "new@x.com");
    assert_eq!(loaded.first_name, "Ann");
    assert_eq!(loaded.password, "rotated");
    assert_eq!(loaded.created_at, created_at);
    assert!(user.updated_at.is_some());
    assert_eq!(loaded.updated_at, user.updated_at);
}

#[test]
fn update_missing_user_is_not_found_and_writes_no_links() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut ghost = user_with_id(U1, "a@x.com", "A", "B");
    ghost.books = vec![id(BK1)];
    let err = repo.update(&mut ghost).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(missing) if missing == id(U1)));
    assert!(ghost.updated_at.is_none());

    drop(repo);
    assert_eq!(link_count(&conn, U1), 0);
}

#[test]
fn failed_link_insert_rolls_back_whole_update() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut user = user_with_id(U1, "a@x.com", "A", "B");
    repo.create(&user).unwrap();
    user.books = vec![id(BK1)];
    repo.update(&mut user).unwrap();

    let mut changed = user.clone();
    changed.email = "changed@x.com".to_string();
    changed.books = vec![id(BK1), id(BK3)];
    let err = repo.update(&mut changed).unwrap_err();
    assert!(matches!(err, RepoError::Db(_)), "unexpected error: {err}");

    let loaded = repo.get(user.id).unwrap();
    assert_eq!(loaded.email, "a@x.com");
    assert_eq!(loaded.books, vec![id(BK1)]);
    assert_eq!(loaded.updated_at, user.updated_at);
}

#[test]
fn search_matches_name_substring_case_insensitively() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut ada = user_with_id(U1, "ada@x.com", "Ada", "Lovelace");
    let grace = user_with_id(U2, "grace@x.com", "Grace", "Hopper");
    let alan = user_with_id(U3, "alan@x.com", "Alan", "Turing");
    for user in [&ada, &grace, &alan] {
        repo.create(user).unwrap();
    }
    ada.books = vec![id(BK1)];
    repo.update(&mut ada).unwrap();

    let found = repo.search("LOVE").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ada.id);
    assert_eq!(found[0].books, vec![id(BK1)]);

    let spanning = repo.search("ada love").unwrap();
    assert_eq!(spanning.len(), 1);

    let ids: Vec<EntityId> = repo.search("a").unwrap().iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![ada.id, grace.id, alan.id]);
}

#[test]
fn search_treats_wildcards_literally() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();
    repo.create(&user_with_id(U1, "a@x.com", "Ada", "Lovelace"))
        .unwrap();

    assert!(matches!(repo.search("%"), Err(RepoError::NoMatches)));
    assert!(matches!(repo.search("A_a"), Err(RepoError::NoMatches)));
}

#[test]
fn empty_results_return_no_matches_sentinel() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let list_err = repo.list().unwrap_err();
    assert!(matches!(list_err, RepoError::NoMatches));

    repo.create(&user_with_id(U1, "a@x.com", "A", "B")).unwrap();
    let search_err = repo.search("nonexistent-pattern").unwrap_err();
    assert!(matches!(search_err, RepoError::NoMatches));
    assert!(search_err.is_not_found());
}

#[test]
fn list_returns_all_users_with_books() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1, BK2]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut first = user_with_id(U1, "a@x.com", "A", "B");
    let second = user_with_id(U2, "c@x.com", "C", "D");
    repo.create(&first).unwrap();
    repo.create(&second).unwrap();
    first.books = vec![id(BK2), id(BK1)];
    repo.update(&mut first).unwrap();

    let all = repo.list().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, first.id);
    assert_eq!(all[0].books, vec![id(BK1), id(BK2)]);
    assert_eq!(all[1].id, second.id);
    assert!(all[1].books.is_empty());
}

#[test]
fn delete_removes_user_and_its_links() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1, BK2]);
    let mut repo = SqliteUserRepository::try_new(&mut conn).unwrap();

    let mut user = user_with_id(U1, "a@x.com", "A", "B");
    repo.create(&user).unwrap();
    user.books = vec![id(BK1), id(BK2)];
    repo.update(&mut user).unwrap();

    repo.delete(user.id).unwrap();
    assert!(matches!(repo.get(user.id), Err(RepoError::NotFound(_))));

    let again = repo.delete(user.id).unwrap_err();
    assert!(matches!(again, RepoError::NotFound(missing) if missing == user.id));

    drop(repo);
    assert_eq!(link_count(&conn, U1), 0);
}

#[test]
fn service_borrow_and_return_persist_through_sqlite() {
    let mut conn = open_db_in_memory().unwrap();
    seed_books(&conn, &[BK1]);
    let repo = SqliteUserRepository::try_new(&mut conn).unwrap();
    let mut service = UserService::new(repo);

    let user_id = service
        .register("ada@x.com", "hash", "Ada", "Lovelace")
        .unwrap();
    service.borrow_book(user_id, id(BK1)).unwrap();
    assert_eq!(service.get_user(user_id).unwrap().books, vec![id(BK1)]);

    service.return_book(user_id, id(BK1)).unwrap();
    assert!(service.get_user(user_id).unwrap().books.is_empty());
}

#[test]
fn separate_connections_share_one_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");

    let mut writer_conn = open_db(&path).unwrap();
    seed_books(&writer_conn, &[BK1]);
    let mut reader_conn = open_db(&path).unwrap();

    let mut writer = SqliteUserRepository::try_new(&mut writer_conn).unwrap();
    let reader = SqliteUserRepository::try_new(&mut reader_conn).unwrap();

    let mut user = user_with_id(U1, "a@x.com", "A", "B");
    writer.create(&user).unwrap();
    user.books = vec![id(BK1)];
    writer.update(&mut user).unwrap();

    let seen = reader.get(user.id).unwrap();
    assert_eq!(seen.books, vec![id(BK1)]);
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let mut conn = Connection::open_in_memory().unwrap();

    let result = SqliteUserRepository::try_new(&mut conn);
    match result {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_junction_table() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE user (
            id TEXT PRIMARY KEY NOT NULL,
            email TEXT NOT NULL,
            password TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteUserRepository::try_new(&mut conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("book_user"))
    ));
}

#[test]
fn repository_rejects_user_table_missing_column() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE user (
            id TEXT PRIMARY KEY NOT NULL,
            email TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteUserRepository::try_new(&mut conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredColumn {
            table: "user",
            column: "password"
        })
    ));
}

fn id(value: &str) -> EntityId {
    value.parse().unwrap()
}

fn user_with_id(user_id: &str, email: &str, first: &str, last: &str) -> User {
    User::with_id(id(user_id), email, "secret", first, last).unwrap()
}

fn seed_books(conn: &Connection, ids: &[&str]) {
    for book_id in ids {
        conn.execute(
            "INSERT INTO book (id, title, author, pages, quantity) VALUES (?1, ?2, 'anon', 100, 1);",
            params![book_id, format!("title {book_id}")],
        )
        .unwrap();
    }
}

fn link_count(conn: &Connection, user_id: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM book_user WHERE user_id = ?1;",
        [user_id],
        |row| row.get(0),
    )
    .unwrap()
}
