//! Seeded synthetic sales, product and store tables
//!
//! Daily demand follows a yearly sine season scaled by product and store
//! factors, with weekend and holiday uplifts and Gaussian noise.

use crate::data::{Event, ProductInfo, StoreInfo};
use crate::error::{ForecastError, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SALES_FILE: &str = "sales_inventory_data.csv";
pub const PRODUCTS_FILE: &str = "product_data.csv";
pub const STORES_FILE: &str = "store_data.csv";

const CATEGORIES: [&str; 5] = ["Electronics", "Clothing", "Home Goods", "Food", "Toys"];
const REGIONS: [&str; 5] = ["North", "South", "East", "West", "Central"];
const SIZES: [&str; 3] = ["Small", "Medium", "Large"];

/// Shape of the generated data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub products: u32,
    pub stores: u32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
            products: 10,
            stores: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Product_ID")]
    pub product_id: String,
    #[serde(rename = "Store_ID")]
    pub store_id: String,
    #[serde(rename = "Sales_Quantity")]
    pub sales_quantity: u64,
    #[serde(rename = "Inventory_Level")]
    pub inventory_level: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "Product_ID")]
    pub product_id: String,
    #[serde(rename = "Product_Name")]
    pub name: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Price")]
    pub price: f64,
    #[serde(rename = "Cost")]
    pub cost: f64,
    #[serde(rename = "Weight_kg")]
    pub weight_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    #[serde(rename = "Store_ID")]
    pub store_id: String,
    #[serde(rename = "Store_Name")]
    pub name: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Size")]
    pub size: String,
    #[serde(rename = "Opening_Date")]
    pub opening_date: String,
}

/// Generated sales table with its catalogs
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticData {
    pub sales: Vec<SalesRecord>,
    pub products: Vec<ProductRecord>,
    pub stores: Vec<StoreRecord>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn holiday_factor(date: NaiveDate) -> f64 {
    let holiday = (date.month() == 12 && date.day() >= 15) || (date.month() == 11 && date.day() >= 25);
    if holiday {
        1.5
    } else {
        1.0
    }
}

/// Expected daily demand before noise
pub fn seasonal_demand(date: NaiveDate, product: u32, store: u32) -> f64 {
    let base = 50.0 + 30.0 * (2.0 * PI * date.ordinal() as f64 / 365.0).sin();
    let weekend = if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        1.2
    } else {
        1.0
    };
    base * (product as f64 / 10.0) * (store as f64 / 5.0) * weekend * holiday_factor(date)
}

fn normal(std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, std_dev).map_err(|e| ForecastError::InvalidParameter(e.to_string()))
}

/// Generate the three tables from one seeded random stream
pub fn generate(config: &SyntheticConfig) -> Result<SyntheticData> {
    if config.end < config.start {
        return Err(ForecastError::InvalidParameter(format!(
            "End date {} precedes start date {}",
            config.end, config.start
        )));
    }
    if config.products == 0 || config.stores == 0 {
        return Err(ForecastError::InvalidParameter(
            "At least one product and one store are required".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let demand_noise = normal(10.0)?;
    let inventory_noise = normal(20.0)?;
    let price_noise = normal(5.0)?;

    let mut sales = Vec::new();
    let mut date = config.start;
    while date <= config.end {
        for product in 1..=config.products {
            for store in 1..=config.stores {
                let expected = seasonal_demand(date, product, store);
                let quantity = (expected + demand_noise.sample(&mut rng)).trunc().max(0.0);
                let inventory =
                    (quantity * 1.5 + inventory_noise.sample(&mut rng)).trunc().max(0.0);
                sales.push(SalesRecord {
                    date,
                    product_id: format!("P{:03}", product),
                    store_id: format!("S{:02}", store),
                    sales_quantity: quantity as u64,
                    inventory_level: inventory as u64,
                });
            }
        }
        date += Duration::days(1);
    }

    let products = (1..=config.products)
        .map(|n| {
            let price = 10.0 + n as f64 * 5.0 + price_noise.sample(&mut rng);
            ProductRecord {
                product_id: format!("P{:03}", n),
                name: format!("Product {}", n),
                category: CATEGORIES[n as usize % CATEGORIES.len()].to_string(),
                price: round2(price.max(5.0)),
                cost: round2((price * 0.6).max(3.0)),
                weight_kg: round2(0.5 + n as f64 / 10.0),
            }
        })
        .collect();

    let stores = (1..=config.stores)
        .map(|n| StoreRecord {
            store_id: format!("S{:02}", n),
            name: format!("Store {}", n),
            region: REGIONS[(n as usize - 1) % REGIONS.len()].to_string(),
            size: SIZES[n as usize % SIZES.len()].to_string(),
            opening_date: format!("2020-{:02}-01", (n * 2) % 12 + 1),
        })
        .collect();

    info!(
        "Generated {} sales records for {} products and {} stores",
        sales.len(),
        config.products,
        config.stores
    );
    Ok(SyntheticData {
        sales,
        products,
        stores,
    })
}

impl SyntheticData {
    /// Join sales with the catalogs into pipeline events
    pub fn events(&self) -> Result<Vec<Event>> {
        let products: HashMap<&str, ProductInfo> = self
            .products
            .iter()
            .map(|p| {
                (
                    p.product_id.as_str(),
                    ProductInfo {
                        category: p.category.clone(),
                        price: p.price,
                        cost: p.cost,
                    },
                )
            })
            .collect();
        let stores: HashMap<&str, StoreInfo> = self
            .stores
            .iter()
            .map(|s| (s.store_id.as_str(), StoreInfo { region: s.region.clone() }))
            .collect();

        self.sales
            .iter()
            .map(|record| {
                let product = products.get(record.product_id.as_str()).ok_or_else(|| {
                    ForecastError::DataFormat(format!("Unknown product {}", record.product_id))
                })?;
                let store = stores.get(record.store_id.as_str()).ok_or_else(|| {
                    ForecastError::DataFormat(format!("Unknown store {}", record.store_id))
                })?;
                Ok(Event {
                    date: record.date,
                    product_id: record.product_id.clone(),
                    store_id: record.store_id.clone(),
                    demand: record.sales_quantity as f64,
                    inventory_level: record.inventory_level as f64,
                    category: product.category.clone(),
                    region: store.region.clone(),
                    price: product.price,
                    cost: product.cost,
                })
            })
            .collect()
    }

    /// Write sales, product and store CSVs into `dir`
    pub fn write_csv<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let sales = dir.join(SALES_FILE);
        write_records(&sales, &self.sales)?;
        let products = dir.join(PRODUCTS_FILE);
        write_records(&products, &self.products)?;
        let stores = dir.join(STORES_FILE);
        write_records(&stores, &self.stores)?;

        info!("Wrote synthetic tables to {}", dir.display());
        Ok(vec![sales, products, stores])
    }
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
