mod common;

use std::fs;

use assert_cmd::Command;
use common::{TestWorkspace, fixture_path};
use predicates::{prelude::*, str::contains};
use tablescope::schema::{ColumnType, DataSchema};

fn tablescope() -> Command {
    Command::cargo_bin("tablescope").expect("binary exists")
}

#[test]
fn inspect_prints_inferred_schema_and_saves_yaml() {
    let workspace = TestWorkspace::new();
    let schema_path = workspace.path().join("orders.schema.yaml");
    let orders = fixture_path("orders.csv");

    tablescope()
        .args([
            "inspect",
            "-i",
            orders.to_str().unwrap(),
            "--schema-out",
            schema_path.to_str().unwrap(),
            "--preview",
            "2",
        ])
        .assert()
        .success()
        .stdout(contains("contact_email").and(contains("email")))
        .stdout(contains("BRL"))
        .stdout(contains("Alice Martins"));

    let schema = DataSchema::load(&schema_path).expect("load schema");
    assert_eq!(schema.columns.len(), 10);
    assert_eq!(
        schema.column("discount").map(|c| c.column_type()),
        Some(ColumnType::Percentage)
    );
}

#[test]
fn query_filters_sorts_and_pages() {
    let orders = fixture_path("orders.csv");
    tablescope()
        .args([
            "query",
            "-i",
            orders.to_str().unwrap(),
            "--filter",
            "paid = true",
            "--sort",
            "total:desc",
            "--page-size",
            "2",
        ])
        .assert()
        .success()
        .stdout(contains("Order Id").and(contains("Contact Email")))
        .stdout(contains("Diego Alves").and(contains("Alice Martins")))
        .stdout(contains("Carla Souza").not())
        .stdout(contains("Page 1 of 2 (4 matching row(s) of 6)"));
}

#[test]
fn query_clamps_out_of_range_pages() {
    let orders = fixture_path("orders.csv");
    tablescope()
        .args([
            "query",
            "-i",
            orders.to_str().unwrap(),
            "--search",
            "ROCHA",
            "--page",
            "9",
        ])
        .assert()
        .success()
        .stdout(contains("Elisa Rocha"))
        .stdout(contains("Page 1 of 1 (1 matching row(s) of 6)"));
}

#[test]
fn query_rejects_unknown_filter_columns() {
    let orders = fixture_path("orders.csv");
    tablescope()
        .args(["query", "-i", orders.to_str().unwrap(), "--filter", "region = south"])
        .assert()
        .failure()
        .stderr(contains("Column 'region' not found for filter"));
}

#[test]
fn export_writes_json_keyed_by_label() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("shipped.json");
    let orders = fixture_path("orders.csv");

    tablescope()
        .args([
            "export",
            "-i",
            orders.to_str().unwrap(),
            "--filter",
            "status = shipped",
            "--format",
            "json",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let records: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(&output).expect("read export")).expect("json");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["Customer"], "Alice Martins");
    assert_eq!(records[0]["Total"], serde_json::json!(120.5));
    assert_eq!(records[2]["Total"], serde_json::Value::Null);
}

#[test]
fn export_csv_to_stdout_uses_semicolon_input() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("scores.csv", "player;points\nana;12\nbia;7\n");
    tablescope()
        .args(["export", "-i", input.to_str().unwrap(), "--sort", "points"])
        .assert()
        .success()
        .stdout("Player,Points\nbia,7\nana,12\n");
}

#[test]
fn spreadsheet_export_is_reported_as_unsupported() {
    let orders = fixture_path("orders.csv");
    tablescope()
        .args(["export", "-i", orders.to_str().unwrap(), "--format", "spreadsheet"])
        .assert()
        .failure()
        .stderr(contains("not supported"));
}

#[test]
fn unsupported_extensions_fail_fast() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("notes.md", "# not a table\n");
    tablescope()
        .args(["inspect", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("Unsupported input 'notes.md'"));
}

#[test]
fn external_schema_overrides_inference() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("codes.csv", "code,qty\n007,3\n010,5\n");
    let schema = workspace.write(
        "codes.yaml",
        "id: codes\nname: Codes\ncolumns:\n  - key: code\n    label: Product Code\n    format:\n      type: string\n    searchable: true\n  - key: qty\n    label: Quantity\n    format:\n      type: number\n    align: right\n",
    );
    tablescope()
        .args([
            "query",
            "-i",
            input.to_str().unwrap(),
            "--schema",
            schema.to_str().unwrap(),
            "--search",
            "10",
        ])
        .assert()
        .success()
        .stdout(contains("Product Code").and(contains("Quantity")))
        .stdout(contains("Page 1 of 1 (1 matching row(s) of 2)"));
}
