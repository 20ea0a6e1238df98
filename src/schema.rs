use rusqlite_migration::{M, Migrations};
use std::sync::LazyLock;

pub static MIGRATIONS: LazyLock<Migrations<'static>> = LazyLock::new(|| {
    Migrations::new(vec![M::up(
        "
CREATE TABLE user_models (
    user_id     TEXT PRIMARY KEY,
    model       TEXT NOT NULL,
    updated_at  INTEGER NOT NULL
);
",
    )])
});
