use rowmap::{Destination, FieldSlot, Record, ShapeKind, Timestamp, Value};
use std::sync::Arc;

#[derive(Debug, Default, Record)]
struct Account {
    #[orm(db = "id")]
    id: i64,
    #[orm(db = "user_name", json = "name")]
    name: String,
    #[orm(skip)]
    cache: Vec<String>,
    nickname: Option<String>,
    #[orm(db = "created_at")]
    created_at: Timestamp,
}

#[test]
fn descriptor_lists_fields_in_order_without_skipped_ones() {
    let descriptor = Account::descriptor();
    assert_eq!(descriptor.type_name, "Account");
    let names: Vec<_> = descriptor.fields.iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["id", "name", "nickname", "created_at"]);

    assert_eq!(descriptor.fields[1].tag("db"), Some("user_name"));
    assert_eq!(descriptor.fields[1].tag("json"), Some("name"));
    assert_eq!(descriptor.fields[2].tag("db"), None);
}

#[test]
fn field_values_follow_the_descriptor() {
    let account = Account {
        id: 4,
        name: "alice".into(),
        cache: vec!["x".into()],
        nickname: None,
        created_at: Timestamp::default(),
    };
    assert_eq!(account.field_value(0), Some(Value::Int(4)));
    assert_eq!(account.field_value(1), Some(Value::Text("alice".into())));
    assert_eq!(account.field_value(2), Some(Value::Null));
    assert_eq!(account.field_value(4), None);
    assert_eq!(account.cache.len(), 1);
}

#[test]
fn field_slots_write_through_to_the_struct() {
    let mut account = Account::default();
    {
        let mut slots = account.field_slots();
        assert_eq!(slots.len(), 4);
        if let Some(Some(slot)) = slots.get_mut(0) {
            slot.scan_raw(Value::Int(9)).unwrap();
        }
        if let Some(Some(slot)) = slots.get_mut(2) {
            slot.scan_raw(Value::Text("al".into())).unwrap();
        }
    }
    assert_eq!(account.id, 9);
    assert_eq!(account.nickname.as_deref(), Some("al"));
}

#[test]
fn derived_records_are_single_destinations() {
    let shape = <Account as Destination>::shape();
    assert_eq!(shape.kind, ShapeKind::Single);
    assert_eq!(shape.record.type_name, "Account");

    let shape = <Vec<Arc<Account>> as Destination>::shape();
    assert_eq!(shape.kind, ShapeKind::Collection);
    assert!(shape.element_is_reference);
}

#[test]
fn slot_type_names_are_reported() {
    let mut id = 0_i64;
    let slot: &mut dyn FieldSlot = &mut id;
    assert_eq!(slot.type_name(), "i64");
}
