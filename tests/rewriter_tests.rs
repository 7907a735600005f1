mod support;

use sqlwarden::error::AuthzError;
use sqlwarden::model::permission::{Action, Scope};
use sqlwarden::parser::sql_parser::SqlParser;
use sqlwarden::rewriter::security::{SecurityRewriter, TableCondition};

use support::{assert_same_statement, engine_with_users, parse};

fn orders_condition() -> Vec<TableCondition> {
    vec![TableCondition::new("orders", "user_id = 42")]
}

fn rewrite(sql: &str, conditions: &[TableCondition]) -> String {
    SecurityRewriter::default()
        .rewrite_sql(sql, conditions)
        .expect("rewrite should succeed")
}

#[test]
fn existing_filter_is_kept_as_a_necessary_condition() {
    let rewritten = rewrite(
        "SELECT * FROM orders WHERE id = 1",
        &[TableCondition::new("orders", "user_id = 1")],
    );
    assert_same_statement(
        &rewritten,
        "SELECT * FROM orders WHERE (id = 1) AND (user_id = 1)",
    );
}

#[test]
fn single_condition_becomes_the_whole_filter() {
    let rewritten = rewrite("select * from orders", &orders_condition());
    insta::assert_snapshot!(rewritten, @"SELECT * FROM orders WHERE user_id = 42");
}

#[test]
fn disjunctive_filter_is_parenthesized_before_conjoining() {
    let rewritten = rewrite(
        "SELECT * FROM orders WHERE status = 'open' OR total > 10",
        &orders_condition(),
    );
    insta::assert_snapshot!(
        rewritten,
        @"SELECT * FROM orders WHERE (status = 'open' OR total > 10) AND (user_id = 42)"
    );
}

#[test]
fn aliased_table_gets_alias_qualified_identity_column() {
    let rewritten = rewrite(
        "SELECT o.id, u.name FROM orders AS o JOIN users AS u ON o.user_id = u.id",
        &orders_condition(),
    );
    assert_same_statement(
        &rewritten,
        "SELECT o.id, u.name FROM orders AS o JOIN users AS u ON o.user_id = u.id WHERE o.user_id = 42",
    );
}

#[test]
fn unaliased_table_condition_passes_through_unqualified() {
    let rewritten = rewrite("SELECT id FROM orders", &orders_condition());
    insta::assert_snapshot!(rewritten, @"SELECT id FROM orders WHERE user_id = 42");
}

#[test]
fn non_identity_columns_stay_unqualified_under_alias() {
    let rewritten = rewrite(
        "SELECT o.id FROM orders AS o",
        &[TableCondition::new("orders", "status = 'open' AND user_id = 42")],
    );
    assert_same_statement(
        &rewritten,
        "SELECT o.id FROM orders AS o WHERE status = 'open' AND o.user_id = 42",
    );
}

#[test]
fn conditions_for_several_tables_are_anded_in_table_order() {
    let rewritten = rewrite(
        "SELECT * FROM orders AS o JOIN users AS u ON o.user_id = u.id",
        &[
            TableCondition::new("users", "region = 'eu'"),
            TableCondition::new("orders", "user_id = 42"),
        ],
    );
    assert_same_statement(
        &rewritten,
        "SELECT * FROM orders AS o JOIN users AS u ON o.user_id = u.id \
         WHERE (o.user_id = 42) AND (region = 'eu')",
    );
}

#[test]
fn self_join_conditions_each_alias() {
    let rewritten = rewrite(
        "SELECT a.id FROM orders AS a JOIN orders AS b ON a.id = b.id",
        &orders_condition(),
    );
    assert_same_statement(
        &rewritten,
        "SELECT a.id FROM orders AS a JOIN orders AS b ON a.id = b.id \
         WHERE (a.user_id = 42) AND (b.user_id = 42)",
    );
}

#[test]
fn rewriting_twice_does_not_duplicate_conditions() {
    let once = rewrite("SELECT * FROM orders WHERE id = 1", &orders_condition());
    let twice = rewrite(&once, &orders_condition());
    assert_eq!(once, twice);

    let aliased_once = rewrite("SELECT o.id FROM orders AS o", &orders_condition());
    let aliased_twice = rewrite(&aliased_once, &orders_condition());
    assert_eq!(aliased_once, aliased_twice);
}

#[test]
fn union_branches_are_rewritten_independently() {
    let rewritten = rewrite(
        "SELECT id FROM orders UNION SELECT id FROM archived_orders",
        &orders_condition(),
    );
    insta::assert_snapshot!(
        rewritten,
        @"SELECT id FROM orders WHERE user_id = 42 UNION SELECT id FROM archived_orders"
    );
}

#[test]
fn subqueries_receive_their_own_conditions() {
    let rewritten = rewrite(
        "SELECT name FROM users WHERE id IN (SELECT user_id FROM orders WHERE total > 10)",
        &orders_condition(),
    );
    assert_same_statement(
        &rewritten,
        "SELECT name FROM users WHERE id IN \
         (SELECT user_id FROM orders WHERE (total > 10) AND (user_id = 42))",
    );

    let derived = rewrite(
        "SELECT t.id FROM (SELECT id, user_id FROM orders) AS t",
        &orders_condition(),
    );
    assert_same_statement(
        &derived,
        "SELECT t.id FROM (SELECT id, user_id FROM orders WHERE user_id = 42) AS t",
    );
}

#[test]
fn update_and_delete_filters_are_rewritten() {
    let update = rewrite("UPDATE orders SET total = 0 WHERE id = 3", &orders_condition());
    insta::assert_snapshot!(
        update,
        @"UPDATE orders SET total = 0 WHERE (id = 3) AND (user_id = 42)"
    );

    let delete = rewrite("DELETE FROM orders", &orders_condition());
    insta::assert_snapshot!(delete, @"DELETE FROM orders WHERE user_id = 42");
}

#[test]
fn custom_identity_columns_are_qualified() {
    let rewriter = SecurityRewriter::new(SqlParser::default(), vec!["owner_id".to_string()]);
    let rewritten = rewriter
        .rewrite_sql(
            "SELECT d.title FROM documents AS d",
            &[TableCondition::new("documents", "owner_id = 7 AND user_id = 1")],
        )
        .expect("rewrite should succeed");
    assert_same_statement(
        &rewritten,
        "SELECT d.title FROM documents AS d WHERE d.owner_id = 7 AND user_id = 1",
    );
}

#[test]
fn rewrite_for_user_reads_row_rules_from_the_engine() {
    let engine = engine_with_users(&["alice"]);
    engine
        .grant_row_permission("alice", "orders", "user_id = 42", Action::Select)
        .expect("grant should succeed");
    let rewriter = SecurityRewriter::default();
    let statement = parse("SELECT * FROM orders");

    let rewritten = rewriter
        .rewrite_for_user(&engine, &statement, "alice")
        .expect("rewrite should succeed");
    assert_eq!(rewritten, parse("SELECT * FROM orders WHERE user_id = 42"));

    let delete = parse("DELETE FROM orders");
    let untouched = rewriter
        .rewrite_for_user(&engine, &delete, "alice")
        .expect("no delete rules means no rewrite");
    assert_eq!(untouched, delete);

    engine
        .revoke_row_permission("alice", "orders", None, Action::Select)
        .expect("revoke should succeed");
    let err = rewriter
        .rewrite_for_user(&engine, &statement, "alice")
        .expect_err("revoked row rule should deny");
    assert!(matches!(
        err,
        AuthzError::PermissionDenied {
            scope: Some(Scope::Row),
            ..
        }
    ));
}

#[test]
fn update_from_and_delete_using_tables_get_their_conditions() {
    let conditions = [TableCondition::new("users", "region = 'eu'")];
    let update = rewrite(
        "UPDATE orders SET total = 0 FROM users WHERE users.id = orders.user_id",
        &conditions,
    );
    assert_same_statement(
        &update,
        "UPDATE orders SET total = 0 FROM users \
         WHERE (users.id = orders.user_id) AND (region = 'eu')",
    );

    let delete = rewrite(
        "DELETE FROM orders USING users WHERE users.id = orders.user_id",
        &conditions,
    );
    assert_same_statement(
        &delete,
        "DELETE FROM orders USING users \
         WHERE (users.id = orders.user_id) AND (region = 'eu')",
    );
}

#[test]
fn read_and_write_conditions_on_one_table_stay_apart() {
    let rewritten = rewrite(
        "UPDATE orders SET total = 0 WHERE id IN (SELECT id FROM orders)",
        &[
            TableCondition::write("orders", "user_id = 42"),
            TableCondition::read("orders", "status = 'open'"),
        ],
    );
    assert_same_statement(
        &rewritten,
        "UPDATE orders SET total = 0 \
         WHERE (id IN (SELECT id FROM orders WHERE status = 'open')) AND (user_id = 42)",
    );
}

#[test]
fn insert_select_and_create_as_filter_their_source_query() {
    let insert = rewrite("INSERT INTO archive SELECT * FROM orders", &orders_condition());
    assert_same_statement(
        &insert,
        "INSERT INTO archive SELECT * FROM orders WHERE user_id = 42",
    );

    let create = rewrite("CREATE TABLE leak AS SELECT * FROM orders", &orders_condition());
    assert_same_statement(
        &create,
        "CREATE TABLE leak AS SELECT * FROM orders WHERE user_id = 42",
    );
}

#[test]
fn cte_named_like_a_table_is_not_filtered_as_that_table() {
    let rewritten = rewrite(
        "SELECT * FROM orders WHERE id IN (WITH orders AS (SELECT 1 AS id) SELECT id FROM orders)",
        &orders_condition(),
    );
    assert_same_statement(
        &rewritten,
        "SELECT * FROM orders \
         WHERE (id IN (WITH orders AS (SELECT 1 AS id) SELECT id FROM orders)) AND (user_id = 42)",
    );
}
