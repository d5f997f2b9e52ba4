use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shapdash::data::Dataset;
use shapdash::forest::{ForestParams, RandomForestRegressor};
use shapdash::interaction::approximate_interactions;
use shapdash::median::compute_median;
use shapdash::pipeline::{calculate_shap, feature_columns, load_target, predict, train_model};
use std::collections::HashSet;
use std::time::Duration;

pub fn dashboard_benchmarks(c: &mut Criterion) {
    let train_x = Dataset::from_csv_path("resources/train_x.csv").unwrap();
    let train_y = load_target("resources/train_y.csv").unwrap();
    let context: HashSet<String> = ["region".to_string()].into_iter().collect();
    let features = train_x.select(&feature_columns(&train_x, &context)).unwrap();
    let numeric_cols: HashSet<String> = ["income".to_string()].into_iter().collect();

    let mut forest_train = c.benchmark_group("train_forest");
    forest_train.warm_up_time(Duration::from_secs(5));
    forest_train.sample_size(20);
    forest_train.bench_function("train_forest_default", |b| {
        b.iter(|| train_model(black_box(&features), black_box(&train_y), &ForestParams::default()).unwrap())
    });
    forest_train.finish();

    let model: RandomForestRegressor = train_model(&features, &train_y, &ForestParams::default()).unwrap();
    c.bench_function("Predict Forest", |b| b.iter(|| predict(&model, black_box(&train_x)).unwrap()));
    c.bench_function("Shap Values", |b| {
        b.iter(|| calculate_shap(&model, black_box(&train_x), &context).unwrap())
    });

    let shap = calculate_shap(&model, &train_x, &context).unwrap();
    c.bench_function("Median", |b| {
        b.iter(|| compute_median(black_box("age"), &train_x, &shap, None, &numeric_cols).unwrap())
    });
    c.bench_function("Median by segment", |b| {
        b.iter(|| compute_median(black_box("age"), &train_x, &shap, Some("income"), &numeric_cols).unwrap())
    });
    c.bench_function("Approximate interactions", |b| {
        b.iter(|| approximate_interactions(black_box("age"), &train_x, &shap).unwrap())
    });
}

criterion_group!(benches, dashboard_benchmarks);
criterion_main!(benches);
