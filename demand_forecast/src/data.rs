//! Sales event ingestion
//!
//! Raw tables are read with polars and converted into typed [`Event`] records.
//! A sales table either carries every attribute itself, or is joined against a
//! product catalog (category, price, cost) and a store catalog (region).

use crate::error::{ForecastError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

pub const COL_DATE: &str = "Date";
pub const COL_PRODUCT: &str = "Product_ID";
pub const COL_STORE: &str = "Store_ID";
pub const COL_DEMAND: &str = "Sales_Quantity";
pub const COL_INVENTORY: &str = "Inventory_Level";
pub const COL_CATEGORY: &str = "Category";
pub const COL_REGION: &str = "Region";
pub const COL_PRICE: &str = "Price";
pub const COL_COST: &str = "Cost";

/// A (product, store) pair, the grain at which forecasting happens
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub product_id: String,
    pub store_id: String,
}

impl EntityKey {
    pub fn new(product_id: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            store_id: store_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.product_id, self.store_id)
    }
}

/// One raw daily observation for an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub date: NaiveDate,
    pub product_id: String,
    pub store_id: String,
    /// Units sold
    pub demand: f64,
    /// Units on hand
    pub inventory_level: f64,
    pub category: String,
    pub region: String,
    pub price: f64,
    pub cost: f64,
}

impl Event {
    pub fn entity(&self) -> EntityKey {
        EntityKey::new(self.product_id.clone(), self.store_id.clone())
    }
}

/// Product attributes joined onto sales records
#[derive(Debug, Clone, PartialEq)]
pub struct ProductInfo {
    pub category: String,
    pub price: f64,
    pub cost: f64,
}

/// Store attributes joined onto sales records
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInfo {
    pub region: String,
}

/// Data loader for sales event tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load events from a CSV file that carries every event column
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
        let df = Self::read_frame(path.as_ref())?;
        Self::from_dataframe(&df)
    }

    /// Load a sales CSV and fill product/store attributes from catalog CSVs
    pub fn from_csv_with_catalogs<P: AsRef<Path>>(
        sales: P,
        products: P,
        stores: P,
    ) -> Result<Vec<Event>> {
        let products = Self::load_product_catalog(products)?;
        let stores = Self::load_store_catalog(stores)?;
        let df = Self::read_frame(sales.as_ref())?;
        Self::from_sales_frame(&df, &products, &stores)
    }

    /// Convert a DataFrame holding every event column into events
    pub fn from_dataframe(df: &DataFrame) -> Result<Vec<Event>> {
        let table = "events";
        let base = SalesColumns::extract(df, table)?;
        let categories = column_as_str(df, table, COL_CATEGORY)?;
        let regions = column_as_str(df, table, COL_REGION)?;
        let prices = column_as_f64(df, table, COL_PRICE)?;
        let costs = column_as_f64(df, table, COL_COST)?;

        let mut events = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let (date, product_id, store_id, demand, inventory_level) = base.row(i)?;
            let context = RowContext::new(i, &product_id, &store_id);
            events.push(Event {
                date,
                demand,
                inventory_level,
                category: context.require(categories[i].clone(), COL_CATEGORY)?,
                region: context.require(regions[i].clone(), COL_REGION)?,
                price: context.require_number(prices[i], COL_PRICE)?,
                cost: context.require_number(costs[i], COL_COST)?,
                product_id,
                store_id,
            });
        }

        info!("Loaded {} events", events.len());
        Ok(events)
    }

    /// Convert a sales-only DataFrame into events using catalog lookups
    pub fn from_sales_frame(
        df: &DataFrame,
        products: &HashMap<String, ProductInfo>,
        stores: &HashMap<String, StoreInfo>,
    ) -> Result<Vec<Event>> {
        let base = SalesColumns::extract(df, "sales")?;

        let mut events = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let (date, product_id, store_id, demand, inventory_level) = base.row(i)?;
            let context = RowContext::new(i, &product_id, &store_id);
            let product = products
                .get(&product_id)
                .ok_or_else(|| context.error(format!("product '{}' not in catalog", product_id)))?;
            let store = stores
                .get(&store_id)
                .ok_or_else(|| context.error(format!("store '{}' not in catalog", store_id)))?;

            events.push(Event {
                date,
                demand,
                inventory_level,
                category: product.category.clone(),
                region: store.region.clone(),
                price: product.price,
                cost: product.cost,
                product_id,
                store_id,
            });
        }

        info!(
            "Loaded {} sales events joined with {} products and {} stores",
            events.len(),
            products.len(),
            stores.len()
        );
        Ok(events)
    }

    /// Load `Product_ID, Category, Price, Cost` rows keyed by product id
    pub fn load_product_catalog<P: AsRef<Path>>(path: P) -> Result<HashMap<String, ProductInfo>> {
        let table = "products";
        let df = Self::read_frame(path.as_ref())?;
        let ids = column_as_str(&df, table, COL_PRODUCT)?;
        let categories = column_as_str(&df, table, COL_CATEGORY)?;
        let prices = column_as_f64(&df, table, COL_PRICE)?;
        let costs = column_as_f64(&df, table, COL_COST)?;

        let mut catalog = HashMap::with_capacity(df.height());
        for i in 0..df.height() {
            let id = ids[i].clone().ok_or_else(|| {
                ForecastError::DataFormat(format!("{} record {}: missing {}", table, i + 1, COL_PRODUCT))
            })?;
            let context = RowContext::new(i, &id, "-");
            catalog.insert(
                id.clone(),
                ProductInfo {
                    category: context.require(categories[i].clone(), COL_CATEGORY)?,
                    price: context.require_number(prices[i], COL_PRICE)?,
                    cost: context.require_number(costs[i], COL_COST)?,
                },
            );
        }

        debug!("Loaded {} catalog products", catalog.len());
        Ok(catalog)
    }

    /// Load `Store_ID, Region` rows keyed by store id
    pub fn load_store_catalog<P: AsRef<Path>>(path: P) -> Result<HashMap<String, StoreInfo>> {
        let table = "stores";
        let df = Self::read_frame(path.as_ref())?;
        let ids = column_as_str(&df, table, COL_STORE)?;
        let regions = column_as_str(&df, table, COL_REGION)?;

        let mut catalog = HashMap::with_capacity(df.height());
        for i in 0..df.height() {
            let id = ids[i].clone().ok_or_else(|| {
                ForecastError::DataFormat(format!("{} record {}: missing {}", table, i + 1, COL_STORE))
            })?;
            let context = RowContext::new(i, "-", &id);
            catalog.insert(
                id.clone(),
                StoreInfo {
                    region: context.require(regions[i].clone(), COL_REGION)?,
                },
            );
        }

        debug!("Loaded {} catalog stores", catalog.len());
        Ok(catalog)
    }

    fn read_frame(path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        debug!("Read {} rows from {}", df.height(), path.display());
        Ok(df)
    }
}

/// Parse a timestamp cell; accepts dates, date-times and RFC 3339 stamps
pub fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(stamp.date());
        }
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|stamp| stamp.date_naive())
}

/// The columns shared by every sales table
struct SalesColumns {
    dates: Vec<Option<String>>,
    products: Vec<Option<String>>,
    stores: Vec<Option<String>>,
    demand: Vec<Option<f64>>,
    inventory: Vec<Option<f64>>,
}

impl SalesColumns {
    fn extract(df: &DataFrame, table: &str) -> Result<Self> {
        Ok(Self {
            dates: column_as_str(df, table, COL_DATE)?,
            products: column_as_str(df, table, COL_PRODUCT)?,
            stores: column_as_str(df, table, COL_STORE)?,
            demand: column_as_f64(df, table, COL_DEMAND)?,
            inventory: column_as_f64(df, table, COL_INVENTORY)?,
        })
    }

    fn row(&self, i: usize) -> Result<(NaiveDate, String, String, f64, f64)> {
        let product_id = self.products[i].clone().unwrap_or_default();
        let store_id = self.stores[i].clone().unwrap_or_default();
        let context = RowContext::new(i, &product_id, &store_id);

        if product_id.is_empty() {
            return Err(context.error(format!("missing {}", COL_PRODUCT)));
        }
        if store_id.is_empty() {
            return Err(context.error(format!("missing {}", COL_STORE)));
        }

        let raw_date = context.require(self.dates[i].clone(), COL_DATE)?;
        let date = parse_timestamp(&raw_date)
            .ok_or_else(|| context.error(format!("unparseable timestamp '{}'", raw_date)))?;
        let demand = context.require_number(self.demand[i], COL_DEMAND)?;
        let inventory = context.require_number(self.inventory[i], COL_INVENTORY)?;

        Ok((date, product_id, store_id, demand, inventory))
    }
}

/// Location of a record, used to build error messages
struct RowContext<'a> {
    index: usize,
    product_id: &'a str,
    store_id: &'a str,
}

impl<'a> RowContext<'a> {
    fn new(index: usize, product_id: &'a str, store_id: &'a str) -> Self {
        Self {
            index,
            product_id,
            store_id,
        }
    }

    fn error(&self, message: String) -> ForecastError {
        ForecastError::DataFormat(format!(
            "record {} (product {}, store {}): {}",
            self.index + 1,
            self.product_id,
            self.store_id,
            message
        ))
    }

    fn require(&self, value: Option<String>, column: &str) -> Result<String> {
        value.ok_or_else(|| self.error(format!("missing {}", column)))
    }

    fn require_number(&self, value: Option<f64>, column: &str) -> Result<f64> {
        match value {
            Some(v) if v.is_finite() => Ok(v),
            Some(v) => Err(self.error(format!("{} is not finite ({})", column, v))),
            None => Err(self.error(format!("missing or non-numeric {}", column))),
        }
    }
}

/// Resolve a column name case-insensitively
fn find_column(df: &DataFrame, table: &str, name: &str) -> Result<String> {
    df.get_column_names()
        .into_iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(name))
        .map(|candidate| candidate.to_string())
        .ok_or_else(|| ForecastError::missing_column(table, name))
}

/// Get a column as optional f64 values; unparseable cells become `None`
fn column_as_f64(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<f64>>> {
    let column = find_column(df, table, name)?;
    let series = df.column(&column)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Get a column as optional strings, whatever its inferred type
fn column_as_str(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<String>>> {
    let column = find_column(df, table, name)?;
    let series = df.column(&column)?.cast(&DataType::Utf8)?;
    let values = series
        .utf8()?
        .into_iter()
        .map(|value| value.map(|s| s.trim().to_string()))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(parse_timestamp("2023-01-05"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-05 13:45:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-05T13:45:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-05T13:45:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("05/01/2023"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_entity_key_display_and_order() {
        let a = EntityKey::new("P001", "S02");
        let b = EntityKey::new("P002", "S01");
        assert_eq!(a.to_string(), "P001@S02");
        assert!(a < b);
    }
}
