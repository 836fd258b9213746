mod common;

use std::{path::Path, str::FromStr};

use chrono::NaiveDateTime;
use report_recon::{
    FieldSpec, FieldType, FromValues, KeyRule, MappedRecord, RawRow, Reconciler, Record,
    RecordSchema, RowMapper, Value,
    mapper::CoercionError,
    source::{self, SourceOptions},
};
use rust_decimal::Decimal;

use common::{TestWorkspace, fixture_path, work_order_schema};

/// Hand-written record type wired to the work-order schema.
#[derive(Debug, Clone, PartialEq, Default)]
struct WorkOrder {
    id: String,
    site: String,
    amount: Option<Decimal>,
    quantity: i32,
    completed: Option<bool>,
    updated_at: Option<NaiveDateTime>,
    sync_token: String,
}

impl FromValues for WorkOrder {
    fn from_values(values: Vec<Value>) -> Self {
        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();
        Self {
            id: next().as_display(),
            site: next().as_display(),
            amount: next().as_decimal(),
            quantity: next().as_i64().unwrap_or_default() as i32,
            completed: next().as_bool(),
            updated_at: next().as_timestamp(),
            sync_token: next().as_display(),
        }
    }
}

impl Record for WorkOrder {
    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.id.as_str().into(),
            1 => self.site.as_str().into(),
            2 => self.amount.into(),
            3 => self.quantity.into(),
            4 => self.completed.into(),
            5 => self.updated_at.into(),
            6 => self.sync_token.as_str().into(),
            _ => Value::Null,
        }
    }
}

fn row(id: &str, amount: &str, quantity: &str) -> RawRow {
    RawRow::new()
        .with("WO_ID", id)
        .with("SITE", "NORTH")
        .with("amount", amount)
        .with("quantity", quantity)
}

#[test]
fn typed_records_map_and_reconcile() {
    let schema = work_order_schema();
    let mapper = RowMapper::new(&schema);
    let left: WorkOrder = mapper.map_row(
        &row("WO-1", "1,250.50", "3")
            .with("completed", "yes")
            .with("updated_at", "2024-05-01T08:00:00"),
    );
    assert_eq!(left.id, "WO-1");
    assert_eq!(left.amount, Some(Decimal::from_str("1250.50").unwrap()));
    assert_eq!(left.quantity, 3);
    assert_eq!(left.completed, Some(true));
    assert!(left.updated_at.is_some());

    let mut right = left.clone();
    right.quantity = 4;
    right.sync_token = "changed".to_string();

    let result = Reconciler::new(&schema).reconcile(&[left.clone()], &[right]);
    assert_eq!(result.changed.len(), 1);
    assert_eq!(result.changed[0].key, "WO-1_NORTH");
    assert_eq!(result.changed[0].differing_fields, vec!["quantity"]);
    assert_eq!(result.changed[0].left, left);
}

#[test]
fn unparseable_values_fall_back_to_zero_and_mapping_continues() {
    let schema = work_order_schema();
    let mapper = RowMapper::new(&schema);
    let rows = vec![
        row("WO-1", "abc", "3"),
        row("WO-2", "4.00", "many"),
        row("WO-3", "5.00", "99999999999"),
    ];

    let batch = mapper.map_rows::<MappedRecord>(&rows);

    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.records[0].value(2), Value::Null);
    assert_eq!(batch.records[0].value(3), Value::Integer(3));
    assert_eq!(batch.records[1].value(3), Value::Integer(0));
    assert_eq!(batch.records[2].value(3), Value::Integer(0));

    let failed = batch
        .failures
        .iter()
        .map(|f| (f.row, f.field.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(failed, vec![(0, "amount"), (1, "quantity"), (2, "quantity")]);
    assert!(matches!(batch.failures[1].error, CoercionError::Parse { .. }));
}

#[test]
fn missing_columns_keep_zero_values() {
    let schema = work_order_schema();
    let record = RowMapper::new(&schema).map_record(&RawRow::new().with("wo_id", "WO-9"));
    assert_eq!(record.value(0), Value::from("WO-9"));
    assert_eq!(record.value(1), Value::from(""));
    assert_eq!(record.value(2), Value::Null);
    assert_eq!(record.value(3), Value::Integer(0));
    assert_eq!(record.value(5), Value::Null);
}

#[test]
fn csv_fixture_maps_every_row() {
    let schema = work_order_schema();
    let rows = source::load_raw_rows(
        &fixture_path("db1_work_orders.csv"),
        &SourceOptions::default(),
    )
    .expect("load fixture");
    let batch = RowMapper::new(&schema).map_rows::<MappedRecord>(&rows);
    assert_eq!(batch.records.len(), 4);
    assert!(batch.failures.is_empty());
    assert_eq!(batch.records[2].value(4), Value::Null);
    assert_eq!(
        batch.records[3].get_by_name(&schema, "completed"),
        Some(&Value::Boolean(true))
    );
    assert_eq!(batch.records[3].get_by_name(&schema, "missing"), None);
}

#[test]
fn decimal_keys_match_across_csv_and_json_exports() {
    let workspace = TestWorkspace::new();
    let csv_path = workspace.write("left.csv", "id,label\n10.00,ten\n2.50,half\n");
    let json_path = workspace.write(
        "right.json",
        "[{\"id\": 10, \"label\": \"ten\"}, {\"id\": 2.5, \"label\": \"half\"}]",
    );
    let schema = RecordSchema::new(
        "accounts",
        vec![
            FieldSpec::new("id", FieldType::Decimal),
            FieldSpec::new("label", FieldType::String),
        ],
        KeyRule::new(["id"]),
    )
    .expect("accounts schema");
    let mapper = RowMapper::new(&schema);
    let load = |path: &Path| {
        let rows = source::load_raw_rows(path, &SourceOptions::default()).expect("load rows");
        mapper.map_rows::<MappedRecord>(&rows).records
    };
    let left = load(&csv_path);
    let right = load(&json_path);

    let result = Reconciler::new(&schema).reconcile(&left, &right);

    assert_eq!(result.matched.len(), 2);
    assert!(result.left_only.is_empty());
    assert!(result.right_only.is_empty());
    assert!(result.changed.is_empty());
}

#[test]
fn json_lines_keep_native_types() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "left.jsonl",
        concat!(
            r#"{"WO_ID": "WO-1", "site": "N", "amount": 2.5, "quantity": 7, "completed": false}"#,
            "\n\n",
            r#"{"WO_ID": "WO-2", "site": "N", "amount": null, "quantity": "8", "tags": [1]}"#,
            "\n",
        ),
    );
    let rows = source::load_raw_rows(&path, &SourceOptions::default()).expect("load jsonl");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("tags"), Some(&Value::Null));

    let schema = work_order_schema();
    let batch = RowMapper::new(&schema).map_rows::<MappedRecord>(&rows);
    assert!(batch.failures.is_empty());
    assert_eq!(
        batch.records[0].value(2),
        Value::Decimal(Decimal::from_str("2.5").unwrap())
    );
    assert_eq!(batch.records[0].value(4), Value::Boolean(false));
    assert_eq!(batch.records[1].value(3), Value::Integer(8));
}

#[test]
fn windows_1252_input_is_decoded() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("latin.csv");
    let mut bytes = b"WO_ID,site\nWO-1,Montr".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"al\n");
    std::fs::write(&path, bytes).expect("write latin csv");

    let options = SourceOptions {
        delimiter: None,
        encoding: encoding_rs::WINDOWS_1252,
    };
    let rows = source::load_raw_rows(&path, &options).expect("load latin csv");
    assert_eq!(rows[0].get("site"), Some(&Value::from("Montréal")));
}
