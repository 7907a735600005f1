#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use sqlparser::ast::Statement;
use sqlwarden::config::Config;
use sqlwarden::executor::sqlite::SqliteEngine;
use sqlwarden::parser::sql_parser::SqlParser;
use sqlwarden::pipeline::authorize::AuthorizationPipeline;
use sqlwarden::rbac::engine::DecisionEngine;
use sqlwarden::store::memory::MemoryStore;

pub(crate) fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(name)
}

pub(crate) fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("fixture should be readable")
}

pub(crate) fn store_with_users(users: &[&str]) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for user in users {
        store
            .add_user(user, &format!("{user}-token"))
            .expect("user should be added");
    }
    Arc::new(store)
}

pub(crate) fn engine_with_users(users: &[&str]) -> DecisionEngine<MemoryStore> {
    DecisionEngine::new(store_with_users(users))
}

pub(crate) fn pipeline_for(store: &Arc<MemoryStore>) -> AuthorizationPipeline<MemoryStore> {
    AuthorizationPipeline::from_config(Arc::clone(store), &Config::default())
        .expect("default pipeline should build")
}

pub(crate) fn policy_store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::from_path(&fixture_path("policy.json")).expect("policy fixture should load"),
    )
}

pub(crate) fn parse(sql: &str) -> Statement {
    SqlParser::default()
        .parse(sql)
        .expect("statement should parse")
}

/// Assert two SQL texts parse to the same statement.
pub(crate) fn assert_same_statement(actual: &str, expected: &str) {
    assert_eq!(
        parse(actual),
        parse(expected),
        "statements differ:\n  actual:   {actual}\n  expected: {expected}"
    );
}

pub(crate) fn orders_database() -> SqliteEngine {
    let engine = SqliteEngine::in_memory().expect("in-memory database should open");
    engine
        .execute_batch(&read_fixture("orders.sql"))
        .expect("orders fixture should load");
    engine
}
