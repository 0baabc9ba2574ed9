use breathbuddy_core::engine::progress::{
    count_before_hour, count_from_hour, current_daily_streak, distinct_day_parts,
    distinct_weekend_dates, good_result_count, longest_good_run, max_records_per_day,
    milestone_count, validate_history,
};
use breathbuddy_core::{
    evaluate_progress, evaluate_records, AchievementDefinition, Catalog, EvaluationContext,
    FrequencyCondition, MeasurementRecord, PerformanceCondition, RawMeasurement, Rarity, RuleKind,
    TimeCondition,
};
use chrono::{FixedOffset, TimeZone, Utc};

#[test]
fn milestone_counts_every_valid_record() {
    let records = vec![
        record("2024-06-10T09:00:00Z", 120.0),
        record("2024-06-11T09:00:00Z", 80.0),
        record("2024-06-11T10:00:00Z", 300.0),
    ];
    assert_eq!(milestone_count(&records), 3);
    assert_eq!(milestone_count(&[]), 0);
}

#[test]
fn streak_counts_today_and_yesterday() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        record("2024-06-15T08:00:00Z", 90.0),
        record("2024-06-14T20:00:00Z", 90.0),
        record("2024-06-12T20:00:00Z", 90.0),
    ];
    assert_eq!(current_daily_streak(&records, &ctx), 2);
}

#[test]
fn streak_breaks_on_missing_yesterday() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        record("2024-06-15T08:00:00Z", 90.0),
        record("2024-06-13T08:00:00Z", 90.0),
        record("2024-06-12T08:00:00Z", 90.0),
    ];
    assert_eq!(current_daily_streak(&records, &ctx), 1);
}

#[test]
fn streak_is_zero_without_a_record_today() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        record("2024-06-14T08:00:00Z", 90.0),
        record("2024-06-13T08:00:00Z", 90.0),
    ];
    assert_eq!(current_daily_streak(&records, &ctx), 0);
    assert_eq!(current_daily_streak(&[], &ctx), 0);
}

#[test]
fn streak_ignores_insertion_order_and_duplicates() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        record("2024-06-13T08:00:00Z", 90.0),
        record("2024-06-15T08:00:00Z", 90.0),
        record("2024-06-14T08:00:00Z", 90.0),
        record("2024-06-15T21:00:00Z", 90.0),
        record("2024-06-16T08:00:00Z", 90.0),
    ];
    assert_eq!(current_daily_streak(&records, &ctx), 3);
}

#[test]
fn streak_uses_local_calendar_days() {
    // 23:30 UTC on the 14th is already the 15th at UTC+2.
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
    let ctx = EvaluationContext::new(now, FixedOffset::east_opt(2 * 3600).unwrap());
    let records = vec![record("2024-06-14T23:30:00Z", 90.0)];
    assert_eq!(current_daily_streak(&records, &ctx), 1);
    assert_eq!(current_daily_streak(&records, &EvaluationContext::utc(now)), 0);
}

#[test]
fn good_results_use_strict_threshold() {
    let records = vec![
        record("2024-06-10T09:00:00Z", 99.9),
        record("2024-06-10T10:00:00Z", 100.0),
        record("2024-06-10T11:00:00Z", 42.0),
    ];
    assert_eq!(good_result_count(&records), 2);
}

#[test]
fn consecutive_good_returns_longest_run() {
    let records: Vec<MeasurementRecord> = [80.0, 90.0, 200.0, 60.0, 70.0, 65.0]
        .iter()
        .enumerate()
        .map(|(index, gas)| record(&format!("2024-06-10T0{index}:00:00Z"), *gas))
        .collect();
    assert_eq!(longest_good_run(&records), 3);
}

#[test]
fn consecutive_good_follows_history_order_not_timestamps() {
    let records = vec![
        record("2024-06-10T03:00:00Z", 50.0),
        record("2024-06-10T01:00:00Z", 150.0),
        record("2024-06-10T02:00:00Z", 50.0),
    ];
    assert_eq!(longest_good_run(&records), 1);
}

#[test]
fn time_windows_use_local_hours() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        record("2024-06-10T07:59:00Z", 90.0),
        record("2024-06-10T08:00:00Z", 90.0),
        record("2024-06-10T21:59:00Z", 90.0),
        record("2024-06-10T22:00:00Z", 90.0),
        record("2024-06-10T23:30:00Z", 90.0),
    ];
    assert_eq!(count_before_hour(&records, &ctx, 8), 1);
    assert_eq!(count_from_hour(&records, &ctx, 22), 2);

    let shifted = EvaluationContext::new(
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
        FixedOffset::west_opt(3 * 3600).unwrap(),
    );
    // 08:00Z is 05:00 at UTC-3; 22:00Z and 23:30Z fall before 22:00 local.
    assert_eq!(count_before_hour(&records, &shifted, 8), 2);
    assert_eq!(count_from_hour(&records, &shifted, 22), 0);
}

#[test]
fn different_times_counts_distinct_day_parts() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let morning_only = vec![
        record("2024-06-10T06:00:00Z", 90.0),
        record("2024-06-11T11:59:00Z", 90.0),
    ];
    assert_eq!(distinct_day_parts(&morning_only, &ctx), 1);

    let all_parts = vec![
        record("2024-06-10T06:00:00Z", 90.0),
        record("2024-06-10T12:00:00Z", 90.0),
        record("2024-06-10T17:59:00Z", 90.0),
        record("2024-06-10T18:00:00Z", 90.0),
        record("2024-06-10T23:00:00Z", 90.0),
    ];
    assert_eq!(distinct_day_parts(&all_parts, &ctx), 3);
}

#[test]
fn same_day_reports_busiest_date() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        record("2024-01-01T08:00:00Z", 90.0),
        record("2024-01-01T12:00:00Z", 90.0),
        record("2024-01-02T09:00:00Z", 90.0),
        record("2024-01-01T20:00:00Z", 90.0),
    ];
    assert_eq!(max_records_per_day(&records, &ctx), 3);
    assert_eq!(max_records_per_day(&[], &ctx), 0);
}

#[test]
fn weekend_counts_distinct_weekend_dates() {
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        // Saturday twice, Sunday, a second Saturday, and a Monday.
        record("2024-06-01T08:00:00Z", 90.0),
        record("2024-06-01T18:00:00Z", 90.0),
        record("2024-06-02T08:00:00Z", 90.0),
        record("2024-06-08T08:00:00Z", 90.0),
        record("2024-06-03T08:00:00Z", 90.0),
    ];
    assert_eq!(distinct_weekend_dates(&records, &ctx), 3);
}

#[test]
fn progress_is_clamped_to_target() {
    let catalog = Catalog::new(vec![rule("five_tests", RuleKind::Milestone, 5)]);
    let ctx = ctx_at(2024, 6, 15, 12);
    let records: Vec<MeasurementRecord> = (0..8)
        .map(|hour| record(&format!("2024-06-10T0{hour}:00:00Z"), 90.0))
        .collect();

    let snapshot = evaluate_records(&records, &catalog, &[], &ctx);
    assert_eq!(snapshot.get("five_tests"), Some(5));
    assert!(snapshot.rules[0].is_complete());
}

#[test]
fn unlocked_rules_report_target_regardless_of_history() {
    let catalog = Catalog::new(vec![
        rule("streak_3", RuleKind::Streak, 3),
        rule("tests_10", RuleKind::Milestone, 10),
    ]);
    let ctx = ctx_at(2024, 6, 15, 12);
    let snapshot = evaluate_records(&[], &catalog, &["streak_3".to_string()], &ctx);
    assert_eq!(snapshot.get("streak_3"), Some(3));
    assert_eq!(snapshot.get("tests_10"), Some(0));
}

#[test]
fn every_rule_family_is_evaluated_in_catalog_order() {
    let catalog = Catalog::new(vec![
        rule("m", RuleKind::Milestone, 100),
        rule("s", RuleKind::Streak, 100),
        rule("g", RuleKind::Performance(PerformanceCondition::GoodResult), 100),
        rule("c", RuleKind::Performance(PerformanceCondition::ConsecutiveGood), 100),
        rule("e", RuleKind::TimeWindow(TimeCondition::Before8am), 100),
        rule("n", RuleKind::TimeWindow(TimeCondition::After10pm), 100),
        rule("d", RuleKind::TimeWindow(TimeCondition::DifferentTimes), 100),
        rule("f", RuleKind::Frequency(FrequencyCondition::SameDay), 100),
        rule("w", RuleKind::Frequency(FrequencyCondition::Weekend), 100),
    ]);
    let ctx = ctx_at(2024, 6, 15, 12);
    let records = vec![
        record("2024-06-14T07:00:00Z", 80.0),
        record("2024-06-15T13:00:00Z", 120.0),
        record("2024-06-15T22:30:00Z", 70.0),
    ];

    let snapshot = evaluate_records(&records, &catalog, &[], &ctx);
    let values: Vec<(&str, u32)> = snapshot
        .rules
        .iter()
        .map(|rule| (rule.id.as_str(), rule.value))
        .collect();
    assert_eq!(
        values,
        vec![
            ("m", 3),
            ("s", 2),
            ("g", 2),
            ("c", 1),
            ("e", 1),
            ("n", 1),
            ("d", 3),
            ("f", 2),
            ("w", 1),
        ]
    );
}

#[test]
fn malformed_entries_are_skipped_and_counted() {
    let catalog = Catalog::new(vec![
        rule("tests", RuleKind::Milestone, 10),
        rule("good", RuleKind::Performance(PerformanceCondition::GoodResult), 10),
    ]);
    let ctx = ctx_at(2024, 6, 15, 12);

    let mut missing_gas = raw("2024-06-10T09:00:00Z", 50.0);
    missing_gas.gas_kohm = None;
    let history = vec![
        raw("2024-06-10T08:00:00Z", 50.0),
        missing_gas,
        raw("not a timestamp", 50.0),
        RawMeasurement::default(),
        raw("2024-06-10T10:00:00Z", 150.0),
    ];

    let snapshot = evaluate_progress(&history, &catalog, &[], &ctx);
    assert_eq!(snapshot.skipped_records, 3);
    assert_eq!(snapshot.get("tests"), Some(2));
    assert_eq!(snapshot.get("good"), Some(1));

    let (records, skipped) = validate_history(&history, &ctx);
    assert_eq!(records.len(), 2);
    assert_eq!(skipped, 3);
}

#[test]
fn unsupported_rules_report_zero() {
    let json = r#"[
        {"id":"share","title":"Share","description":"","icon":"x","type":"social","rarity":"gold","criteria":{"target":1}},
        {"id":"noon","title":"Noon","description":"","icon":"x","type":"time","rarity":"gold","criteria":{"target":1,"condition":"at_noon"}},
        {"id":"first","title":"First","description":"","icon":"x","type":"milestone","rarity":"bronze","criteria":{"target":1}}
    ]"#;
    let catalog = Catalog::from_json(json).unwrap();
    let ctx = ctx_at(2024, 6, 15, 12);
    let history = vec![raw("2024-06-15T12:00:00Z", 50.0)];

    let snapshot = evaluate_progress(&history, &catalog, &[], &ctx);
    assert_eq!(snapshot.get("share"), Some(0));
    assert_eq!(snapshot.get("noon"), Some(0));
    assert_eq!(snapshot.get("first"), Some(1));
}

#[test]
fn naive_timestamps_are_local_wall_clock() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let ctx = EvaluationContext::new(now, FixedOffset::east_opt(2 * 3600).unwrap());
    let history = vec![
        raw("2024-06-15T07:30:00", 50.0),
        raw("2024-06-14 23:15:00", 50.0),
    ];

    let snapshot = evaluate_progress(&history, breathbuddy_core::default_catalog(), &[], &ctx);
    assert_eq!(snapshot.skipped_records, 0);
    assert_eq!(snapshot.get("early_bird"), Some(1));
    assert_eq!(snapshot.get("night_owl"), Some(1));
    assert_eq!(snapshot.get("streak_3"), Some(2));

    let (records, _) = validate_history(&history, &ctx);
    assert_eq!(
        records[0].recorded_at,
        Utc.with_ymd_and_hms(2024, 6, 15, 5, 30, 0).unwrap()
    );
}

#[test]
fn evaluation_is_repeatable() {
    let catalog = breathbuddy_core::default_catalog();
    let ctx = ctx_at(2024, 6, 15, 12);
    let history = vec![
        raw("2024-06-14T06:00:00Z", 50.0),
        raw("2024-06-15T23:00:00Z", 250.0),
    ];

    let first = evaluate_progress(&history, catalog, &[], &ctx);
    let second = evaluate_progress(&history, catalog, &[], &ctx);
    assert_eq!(first, second);
    assert_eq!(first.rules.len(), catalog.len());
    for (rule, definition) in first.rules.iter().zip(catalog.iter()) {
        assert_eq!(rule.id, definition.id);
        assert!(rule.value <= definition.target);
    }
}

fn ctx_at(year: i32, month: u32, day: u32, hour: u32) -> EvaluationContext {
    EvaluationContext::utc(Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap())
}

fn raw(timestamp: &str, gas: f64) -> RawMeasurement {
    RawMeasurement {
        iaq: Some(40.0),
        co2_eq: Some(550.0),
        voc_eq: Some(0.6),
        temp: Some(22.0),
        hum: Some(45.0),
        pres: Some(1012.0),
        gas_kohm: Some(gas),
        timestamp: Some(timestamp.to_string()),
    }
}

fn record(timestamp: &str, gas: f64) -> MeasurementRecord {
    MeasurementRecord::try_from_raw(&raw(timestamp, gas)).unwrap()
}

fn rule(id: &str, kind: RuleKind, target: u32) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_string(),
        title: id.to_string(),
        description: String::new(),
        icon: String::new(),
        rarity: Rarity::Bronze,
        kind,
        target,
    }
}
