mod support;

use std::sync::Arc;

use sqlwarden::config::Config;
use sqlwarden::error::{AuthzError, StoreError};
use sqlwarden::model::permission::{Action, Scope};
use sqlwarden::pipeline::authorize::AuthorizationPipeline;
use sqlwarden::pipeline::stage::PipelineStage;
use sqlwarden::store::sqlite::SqliteStore;

use support::{assert_same_statement, parse, pipeline_for, policy_store, store_with_users};

fn denial_scope(err: &AuthzError) -> Option<Scope> {
    match err {
        AuthzError::PermissionDenied { scope, .. } => *scope,
        other => panic!("expected a denial, got {other:?}"),
    }
}

#[test]
fn alice_orders_scenario_rewrites_then_denies_after_revoke() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("table grant should succeed");
    engine
        .grant_row_permission("alice", "orders", "user_id = 42", Action::Select)
        .expect("row grant should succeed");

    let authorized = pipeline
        .authorize("alice", "SELECT * FROM orders")
        .expect("select should be authorized");
    assert!(authorized.rewritten);
    assert_same_statement(&authorized.sql, "SELECT * FROM orders WHERE user_id = 42");

    engine
        .revoke_row_permission("alice", "orders", None, Action::Select)
        .expect("row revoke should succeed");
    let err = pipeline
        .authorize("alice", "SELECT * FROM orders")
        .expect_err("table grant alone should no longer suffice");
    assert_eq!(denial_scope(&err), Some(Scope::Row));
}

#[test]
fn table_grant_without_row_records_passes_unmodified() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    pipeline
        .engine()
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("grant should succeed");

    let authorized = pipeline
        .authorize("alice", "SELECT id FROM orders WHERE id = 1")
        .expect("select should be authorized");
    assert!(!authorized.rewritten);
    assert_eq!(authorized.statement, parse("SELECT id FROM orders WHERE id = 1"));
    assert!(!authorized.stages.contains(&PipelineStage::Rewritten));
}

#[test]
fn every_joined_table_needs_a_table_grant() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    pipeline
        .engine()
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("grant should succeed");

    let err = pipeline
        .authorize(
            "alice",
            "SELECT o.id FROM orders o JOIN users u ON o.user_id = u.id",
        )
        .expect_err("users is not granted");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied { ref object, scope: Some(Scope::Table) } if object == "users"
    ));
}

#[test]
fn column_grants_restrict_projections_once_present() {
    let pipeline = pipeline_for(&policy_store());

    pipeline
        .authorize("alice", "SELECT id, name FROM users")
        .expect("granted columns should pass");
    pipeline
        .authorize("alice", "SELECT * FROM users")
        .expect("wildcard defers to the table grant");

    let err = pipeline
        .authorize("alice", "SELECT email FROM users")
        .expect_err("email is not granted");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied { ref object, scope: Some(Scope::Column) }
            if object == "users.email"
    ));
}

#[test]
fn insert_and_update_check_target_columns() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    for action in [Action::Insert, Action::Update] {
        engine
            .grant_table_permission("alice", "orders", action)
            .expect("grant should succeed");
        engine
            .grant_column_permission("alice", "orders", "status", action)
            .expect("grant should succeed");
    }

    pipeline
        .authorize("alice", "UPDATE orders SET status = 'closed'")
        .expect("status update should pass");
    let err = pipeline
        .authorize("alice", "UPDATE orders SET total = 0")
        .expect_err("total update should be denied");
    assert_eq!(denial_scope(&err), Some(Scope::Column));

    pipeline
        .authorize("alice", "INSERT INTO orders (status) VALUES ('new')")
        .expect("status insert should pass");
    pipeline
        .authorize("alice", "INSERT INTO orders VALUES (9, 42, 1.0, 'new')")
        .expect("insert without column list skips column checks");
    let err = pipeline
        .authorize("alice", "INSERT INTO orders (total) VALUES (1)")
        .expect_err("total insert should be denied");
    assert_eq!(denial_scope(&err), Some(Scope::Column));
}

#[test]
fn delete_and_ddl_skip_column_checks() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "orders", Action::Delete)
        .expect("grant should succeed");
    engine
        .grant_column_permission("alice", "orders", "status", Action::Delete)
        .expect("grant should succeed");
    engine
        .grant_table_permission("alice", "audit", Action::Create)
        .expect("grant should succeed");

    pipeline
        .authorize("alice", "DELETE FROM orders WHERE total = 0")
        .expect("delete should pass");
    let created = pipeline
        .authorize("alice", "CREATE TABLE audit (id INTEGER, actor TEXT)")
        .expect("create should pass");
    assert!(!created.rewritten);

    let err = pipeline
        .authorize("alice", "DROP TABLE audit")
        .expect_err("drop is not granted");
    assert_eq!(denial_scope(&err), Some(Scope::Table));
}

#[test]
fn update_and_delete_get_row_conditions_for_their_action() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "orders", Action::Delete)
        .expect("grant should succeed");
    engine
        .grant_row_permission("alice", "orders", "status = 'draft'", Action::Delete)
        .expect("grant should succeed");

    let authorized = pipeline
        .authorize("alice", "DELETE FROM orders WHERE id = 4")
        .expect("delete should be authorized");
    assert_same_statement(
        &authorized.sql,
        "DELETE FROM orders WHERE (id = 4) AND (status = 'draft')",
    );
}

#[test]
fn wildcard_grant_covers_every_table() {
    let pipeline = pipeline_for(&policy_store());
    let authorized = pipeline
        .authorize("bob", "SELECT * FROM orders JOIN users ON orders.user_id = users.id")
        .expect("bob holds a wildcard grant");
    assert!(!authorized.rewritten);
}

#[test]
fn non_denial_errors_surface_unchanged() {
    let pipeline = pipeline_for(&policy_store());
    assert!(matches!(
        pipeline.authorize("mallory", "SELECT * FROM orders"),
        Err(AuthzError::Store(StoreError::UnknownUser(_)))
    ));
    assert!(matches!(
        pipeline.authorize("alice", "SELEKT * FROM orders"),
        Err(AuthzError::Parse(_))
    ));
    assert!(matches!(
        pipeline.authorize("alice", "SELECT 1; SELECT 2"),
        Err(AuthzError::UnsupportedStatement(_))
    ));
    assert!(matches!(
        pipeline.authorize("alice", "  "),
        Err(AuthzError::Parse(_))
    ));
}

#[test]
fn corrupt_stored_condition_is_a_parse_error_not_a_bypass() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_row_permission("alice", "orders", "user_id = 42; DROP TABLE orders", Action::Select)
        .expect("grant stores the text as-is");
    assert!(matches!(
        pipeline.authorize("alice", "SELECT * FROM orders"),
        Err(AuthzError::Parse(_))
    ));
}

#[test]
fn authorize_statement_leaves_the_input_untouched() {
    let pipeline = pipeline_for(&policy_store());
    let statement = parse("SELECT id FROM orders");
    let before = statement.clone();
    let authorized = pipeline
        .authorize_statement("alice", &statement)
        .expect("select should be authorized");
    assert_eq!(statement, before);
    assert!(authorized.rewritten);
    assert_eq!(authorized.stages.first(), Some(&PipelineStage::Parsed));
}

#[test]
fn redacted_denials_hide_scope() {
    let config = Config {
        detailed_denials: false,
        ..Config::default()
    };
    let pipeline = AuthorizationPipeline::from_config(policy_store(), &config)
        .expect("pipeline should build");
    let err = pipeline
        .authorize("alice", "SELECT email FROM users")
        .expect_err("email is not granted");
    assert_eq!(denial_scope(&err), None);
    assert_eq!(err.to_string(), "permission denied: users.email");
}

#[test]
fn sqlite_store_backs_the_same_pipeline() {
    let store = Arc::new(SqliteStore::in_memory().expect("sqlite store should open"));
    store
        .add_user("alice", "alice-token")
        .expect("user should be added");
    let pipeline = AuthorizationPipeline::from_config(Arc::clone(&store), &Config::default())
        .expect("pipeline should build");
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_row_permission("alice", "orders", "user_id = 42", Action::Select)
        .expect("grant should succeed");

    let authorized = pipeline
        .authorize("alice", "SELECT o.id FROM orders AS o")
        .expect("select should be authorized");
    assert_same_statement(
        &authorized.sql,
        "SELECT o.id FROM orders AS o WHERE o.user_id = 42",
    );
}

#[test]
fn role_grants_flow_through_the_pipeline() {
    let store = store_with_users(&["alice", "bob"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    let analyst = engine.create_role("analyst").expect("role should be created");
    engine
        .assign_role_to_user("bob", "analyst")
        .expect("assign should succeed");
    engine
        .grant_table_permission_to_role(analyst, "reports", Action::Select)
        .expect("role grant should succeed");

    pipeline
        .authorize("bob", "SELECT * FROM reports")
        .expect("bob holds the role grant");
    let err = pipeline
        .authorize("alice", "SELECT * FROM reports")
        .expect_err("alice does not hold the role");
    assert_eq!(denial_scope(&err), Some(Scope::Table));
}

#[test]
fn cte_named_like_a_table_inside_a_subquery_does_not_skip_checks() {
    let store = store_with_users(&["mallory"]);
    let pipeline = pipeline_for(&store);
    let sql = "SELECT * FROM orders WHERE id IN \
               (WITH orders AS (SELECT 1 AS id) SELECT id FROM orders)";

    let err = pipeline
        .authorize("mallory", sql)
        .expect_err("the outer orders is a real table");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied { ref object, scope: Some(Scope::Table) } if object == "orders"
    ));

    let engine = pipeline.engine();
    engine
        .grant_table_permission("mallory", "orders", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_row_permission("mallory", "orders", "user_id = 7", Action::Select)
        .expect("grant should succeed");
    let authorized = pipeline
        .authorize("mallory", sql)
        .expect("granted select should be authorized");
    assert_same_statement(
        &authorized.sql,
        "SELECT * FROM orders WHERE \
         (id IN (WITH orders AS (SELECT 1 AS id) SELECT id FROM orders)) AND (user_id = 7)",
    );
}

#[test]
fn unqualified_column_needs_every_joined_table_to_allow_it() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_table_permission("alice", "users", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_column_permission("alice", "orders", "total", Action::Select)
        .expect("grant should succeed");

    let err = pipeline
        .authorize("alice", "SELECT secret FROM orders JOIN users ON 1 = 1")
        .expect_err("orders does not grant secret");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied { ref object, scope: Some(Scope::Column) }
            if object == "orders.secret"
    ));

    pipeline
        .authorize("alice", "SELECT users.secret FROM orders JOIN users ON 1 = 1")
        .expect("qualified column is checked against users only");
    pipeline
        .authorize("alice", "SELECT total FROM orders JOIN users ON 1 = 1")
        .expect("total is allowed by both tables");
}

#[test]
fn insert_select_reads_its_source_with_select_rules() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "*", Action::Insert)
        .expect("grant should succeed");

    let err = pipeline
        .authorize("alice", "INSERT INTO archive SELECT * FROM orders")
        .expect_err("orders is read without a select grant");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied { ref object, scope: Some(Scope::Table) } if object == "orders"
    ));

    engine
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_row_permission("alice", "orders", "user_id = 42", Action::Select)
        .expect("grant should succeed");
    let authorized = pipeline
        .authorize("alice", "INSERT INTO archive SELECT * FROM orders")
        .expect("insert should be authorized");
    assert!(authorized.rewritten);
    assert_same_statement(
        &authorized.sql,
        "INSERT INTO archive SELECT * FROM orders WHERE user_id = 42",
    );

    engine
        .grant_column_permission("alice", "orders", "id", Action::Select)
        .expect("grant should succeed");
    let err = pipeline
        .authorize("alice", "INSERT INTO archive (id) SELECT total FROM orders")
        .expect_err("total is not readable");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied { ref object, scope: Some(Scope::Column) }
            if object == "orders.total"
    ));
}

#[test]
fn create_table_as_needs_select_on_its_source() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "*", Action::Create)
        .expect("grant should succeed");

    let err = pipeline
        .authorize("alice", "CREATE TABLE leak AS SELECT * FROM orders")
        .expect_err("a create grant does not allow reading orders");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied { ref object, scope: Some(Scope::Table) } if object == "orders"
    ));

    engine
        .grant_table_permission("alice", "orders", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_row_permission("alice", "orders", "user_id = 42", Action::Select)
        .expect("grant should succeed");
    let authorized = pipeline
        .authorize("alice", "CREATE TABLE leak AS SELECT * FROM orders")
        .expect("create should be authorized");
    assert_same_statement(
        &authorized.sql,
        "CREATE TABLE leak AS SELECT * FROM orders WHERE user_id = 42",
    );
}

#[test]
fn update_from_applies_the_joined_tables_select_conditions() {
    let store = store_with_users(&["alice"]);
    let pipeline = pipeline_for(&store);
    let engine = pipeline.engine();
    engine
        .grant_table_permission("alice", "orders", Action::Update)
        .expect("grant should succeed");
    engine
        .grant_table_permission("alice", "users", Action::Select)
        .expect("grant should succeed");
    engine
        .grant_row_permission("alice", "users", "region = 'eu'", Action::Select)
        .expect("grant should succeed");

    let authorized = pipeline
        .authorize(
            "alice",
            "UPDATE orders SET status = 'held' FROM users WHERE users.id = orders.user_id",
        )
        .expect("update should be authorized");
    assert_same_statement(
        &authorized.sql,
        "UPDATE orders SET status = 'held' FROM users \
         WHERE (users.id = orders.user_id) AND (region = 'eu')",
    );
}
