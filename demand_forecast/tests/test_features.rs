use chrono::NaiveDate;
use demand_forecast::aggregate::{aggregate_weekly, AggregatedRow};
use demand_forecast::config::FeatureConfig;
use demand_forecast::features::{build_feature_table, FeatureRow};
use demand_forecast::split::split_by_cutoff;
use demand_forecast::{EntityKey, Event};
use demand_math::calendar::add_weeks;
use rstest::rstest;

fn weekly_events(product: &str, demands: &[f64]) -> Vec<Event> {
    let first = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    demands
        .iter()
        .enumerate()
        .map(|(w, &demand)| Event {
            date: add_weeks(first, w as i64).unwrap(),
            product_id: product.to_string(),
            store_id: "S01".to_string(),
            demand,
            inventory_level: 30.0,
            category: "Food".to_string(),
            region: "East".to_string(),
            price: 4.0,
            cost: 2.5,
        })
        .collect()
}

fn features_for(rows: &[AggregatedRow], config: &FeatureConfig, entity: &EntityKey) -> Vec<FeatureRow> {
    build_feature_table(rows, config)
        .unwrap()
        .rows
        .into_iter()
        .filter(|row| &row.entity == entity)
        .collect()
}

#[rstest]
#[case(4)]
#[case(7)]
#[case(10)]
fn test_features_never_see_current_or_future_demand(#[case] changed: usize) {
    let demands: Vec<f64> = (0..14).map(|i| 10.0 + i as f64).collect();
    let mut altered = demands.clone();
    altered[changed] = 1.0e6;

    let config = FeatureConfig::default();
    let entity = EntityKey::new("P001", "S01");
    let base = features_for(&aggregate_weekly(&weekly_events("P001", &demands)).unwrap(), &config, &entity);
    let sentinel =
        features_for(&aggregate_weekly(&weekly_events("P001", &altered)).unwrap(), &config, &entity);

    let changed_start =
        add_weeks(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), changed as i64).unwrap();
    for (a, b) in base.iter().zip(&sentinel) {
        if a.period_start <= changed_start {
            assert_eq!(a.model_inputs(), b.model_inputs(), "row {}", a.period_start);
        }
    }
    // The row after the change does see it
    let next = base
        .iter()
        .position(|row| row.period_start > changed_start)
        .unwrap();
    assert_ne!(base[next].lags, sentinel[next].lags);
}

#[test]
fn test_other_entities_do_not_leak_in() {
    let config = FeatureConfig::default();
    let entity = EntityKey::new("P001", "S01");
    let own: Vec<f64> = (0..10).map(|i| (i * 3) as f64).collect();

    let alone = features_for(&aggregate_weekly(&weekly_events("P001", &own)).unwrap(), &config, &entity);

    let mut mixed_events = weekly_events("P001", &own);
    mixed_events.extend(weekly_events("P002", &[500.0; 10]));
    let mixed = features_for(&aggregate_weekly(&mixed_events).unwrap(), &config, &entity);

    assert_eq!(alone, mixed);
}

#[test]
fn test_identical_sequences_keep_their_own_lags() {
    let demands: Vec<f64> = (0..12).map(|i| (i * i) as f64).collect();
    let mut events = weekly_events("P001", &demands);
    events.extend(weekly_events("P002", &demands));
    // A third entity with a different sequence sorts between the identical pair
    events.extend(weekly_events("P0015", &[999.0; 12]));

    let config = FeatureConfig::default();
    let table = build_feature_table(&aggregate_weekly(&events).unwrap(), &config).unwrap();
    let first = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();

    for product in ["P001", "P002"] {
        let entity = EntityKey::new(product, "S01");
        let rows: Vec<&FeatureRow> = table.rows.iter().filter(|row| row.entity == entity).collect();
        assert_eq!(rows.len(), 8);

        for row in rows {
            let index = ((row.period_start - first).num_days() / 7) as usize;
            assert_eq!(row.demand, demands[index]);
            for (&k, &lag) in config.lags.iter().zip(&row.lags) {
                assert_eq!(lag, demands[index - k], "{} lag {} at {}", entity, k, row.period_start);
            }
        }
    }
}

#[test]
fn test_entity_with_four_periods_is_skipped() {
    let mut events = weekly_events("P001", &[5.0; 10]);
    events.extend(weekly_events("P002", &[5.0; 4]));

    let table = build_feature_table(&aggregate_weekly(&events).unwrap(), &FeatureConfig::default())
        .unwrap();

    assert!(table.rows.iter().all(|row| row.entity.product_id == "P001"));
    assert_eq!(table.skipped.len(), 1);
    assert_eq!(table.skipped[0].entity, EntityKey::new("P002", "S01"));
}

#[test]
fn test_split_is_disjoint_and_covers_every_row() {
    let mut events = weekly_events("P001", &[5.0; 20]);
    events.extend(weekly_events("P002", &[8.0; 12]));
    let table = build_feature_table(&aggregate_weekly(&events).unwrap(), &FeatureConfig::default())
        .unwrap();

    let split = split_by_cutoff(&table.rows, 8).unwrap();

    assert_eq!(split.train.len() + split.test.len(), table.rows.len());
    let latest_train = split.train.iter().map(|r| r.period_start).max().unwrap();
    let earliest_test = split.test.iter().map(|r| r.period_start).min().unwrap();
    assert!(latest_train < earliest_test);
    assert!(latest_train <= split.cutoff);
}
