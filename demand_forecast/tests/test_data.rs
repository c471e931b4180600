use demand_forecast::aggregate::aggregate_weekly;
use demand_forecast::{DataLoader, EntityKey, ForecastError};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn csv_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

fn full_events() -> NamedTempFile {
    csv_file(&[
        "Date,Product_ID,Store_ID,Sales_Quantity,Inventory_Level,Category,Region,Price,Cost",
        "2023-01-02,P001,S01,5,40,Food,North,10.0,6.0",
        "2023-01-03,P001,S01,7,35,Food,North,10.0,6.0",
        "2023-01-09,P001,S01,4,30,Food,North,10.0,6.0",
        "2023-01-02,P002,S01,1,10,Toys,North,20.0,12.0",
    ])
}

#[test]
fn test_load_full_event_table() {
    let file = full_events();
    let events = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(events.len(), 4);
    assert_eq!(events[0].entity(), EntityKey::new("P001", "S01"));
    assert_eq!(events[0].demand, 5.0);
    assert_eq!(events[3].category, "Toys");
    assert_eq!(events[3].price, 20.0);

    let weekly = aggregate_weekly(&events).unwrap();
    assert_eq!(weekly.len(), 3);
    assert_eq!(weekly[0].demand, 12.0);
    assert_eq!(weekly[0].inventory_level, 37.5);
}

#[test]
fn test_bad_timestamp_names_the_record() {
    let file = csv_file(&[
        "Date,Product_ID,Store_ID,Sales_Quantity,Inventory_Level,Category,Region,Price,Cost",
        "2023-01-02,P001,S01,5,40,Food,North,10.0,6.0",
        "not-a-date,P001,S01,7,35,Food,North,10.0,6.0",
    ]);

    match DataLoader::from_csv(file.path()) {
        Err(ForecastError::DataFormat(message)) => {
            assert!(message.contains("record 2"), "{}", message);
            assert!(message.contains("P001"), "{}", message);
        }
        other => panic!("expected a data format error, got {:?}", other),
    }
}

#[test]
fn test_missing_column_is_reported() {
    let file = csv_file(&[
        "Date,Product_ID,Store_ID,Inventory_Level,Category,Region,Price,Cost",
        "2023-01-02,P001,S01,40,Food,North,10.0,6.0",
    ]);

    match DataLoader::from_csv(file.path()) {
        Err(ForecastError::MissingColumn { column, .. }) => assert_eq!(column, "Sales_Quantity"),
        other => panic!("expected a missing column error, got {:?}", other),
    }
}

#[test]
fn test_catalog_join() {
    let sales = csv_file(&[
        "Date,Product_ID,Store_ID,Sales_Quantity,Inventory_Level",
        "2023-01-02,P001,S01,5,40",
        "2023-01-02,P001,S02,3,20",
    ]);
    let products = csv_file(&[
        "Product_ID,Product_Name,Category,Price,Cost,Weight_kg",
        "P001,Product 1,Clothing,15.5,9.3,0.6",
    ]);
    let stores = csv_file(&[
        "Store_ID,Store_Name,Region,Size,Opening_Date",
        "S01,Store 1,North,Medium,2020-03-01",
        "S02,Store 2,South,Large,2020-05-01",
    ]);

    let events =
        DataLoader::from_csv_with_catalogs(sales.path(), products.path(), stores.path()).unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].category, "Clothing");
    assert_eq!(events[0].price, 15.5);
    assert_eq!(events[1].region, "South");
}

#[test]
fn test_unknown_catalog_entry() {
    let sales = csv_file(&[
        "Date,Product_ID,Store_ID,Sales_Quantity,Inventory_Level",
        "2023-01-02,P009,S01,5,40",
    ]);
    let products = csv_file(&["Product_ID,Category,Price,Cost", "P001,Food,10.0,6.0"]);
    let stores = csv_file(&["Store_ID,Region", "S01,North"]);

    let result = DataLoader::from_csv_with_catalogs(sales.path(), products.path(), stores.path());
    assert!(matches!(result, Err(ForecastError::DataFormat(_))));
}
