//! Temporal aggregation of daily events into weekly rows
//!
//! Events are bucketed by entity and ISO week. Demand is summed; inventory,
//! price and cost are averaged over the events in the bucket. Weeks without
//! events produce no row: gaps are kept as gaps.

use crate::data::{EntityKey, Event};
use crate::error::Result;
use chrono::NaiveDate;
use demand_math::WeekKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// One entity's totals for one week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub entity: EntityKey,
    pub period: WeekKey,
    /// Monday opening the week
    pub period_start: NaiveDate,
    pub category: String,
    pub region: String,
    /// Summed demand
    pub demand: f64,
    /// Mean on-hand inventory
    pub inventory_level: f64,
    /// Mean unit price
    pub price: f64,
    /// Mean unit cost
    pub cost: f64,
    /// Number of events folded into the row
    pub observations: usize,
}

#[derive(Debug)]
struct Accumulator {
    category: String,
    region: String,
    demand: f64,
    inventory: f64,
    price: f64,
    cost: f64,
    count: usize,
}

impl Accumulator {
    fn new(event: &Event) -> Self {
        Self {
            category: event.category.clone(),
            region: event.region.clone(),
            demand: 0.0,
            inventory: 0.0,
            price: 0.0,
            cost: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, event: &Event) {
        self.demand += event.demand;
        self.inventory += event.inventory_level;
        self.price += event.price;
        self.cost += event.cost;
        self.count += 1;
    }
}

/// Collapse events into weekly rows, ordered by entity then period start
///
/// Category and region are taken from the first event seen for the bucket.
pub fn aggregate_weekly(events: &[Event]) -> Result<Vec<AggregatedRow>> {
    let mut buckets: BTreeMap<(EntityKey, WeekKey), Accumulator> = BTreeMap::new();

    for event in events {
        let key = (event.entity(), WeekKey::from_date(event.date));
        buckets
            .entry(key)
            .or_insert_with(|| Accumulator::new(event))
            .add(event);
    }

    let mut rows = Vec::with_capacity(buckets.len());
    for ((entity, period), acc) in buckets {
        let n = acc.count as f64;
        rows.push(AggregatedRow {
            entity,
            period,
            period_start: period.start()?,
            category: acc.category,
            region: acc.region,
            demand: acc.demand,
            inventory_level: acc.inventory / n,
            price: acc.price / n,
            cost: acc.cost / n,
            observations: acc.count,
        });
    }

    info!(
        "Aggregated {} events into {} weekly rows",
        events.len(),
        rows.len()
    );
    Ok(rows)
}

/// Split rows into per-entity series, each sorted by period start
pub fn by_entity(rows: &[AggregatedRow]) -> BTreeMap<EntityKey, Vec<AggregatedRow>> {
    let mut grouped: BTreeMap<EntityKey, Vec<AggregatedRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.entity.clone()).or_default().push(row.clone());
    }
    for series in grouped.values_mut() {
        series.sort_by_key(|row| row.period_start);
    }
    grouped
}
