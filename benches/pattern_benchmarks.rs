use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use autoplan_core::pattern::{expand, Pattern, WeekdayMask};
use autoplan_core::time::{CalendarDate, DateWindow};

fn window(days: i64) -> DateWindow {
    let from = CalendarDate::parse("2024-01-01").unwrap();
    DateWindow::new(from, from.add_days(days)).unwrap()
}

fn bench_every_n_days(c: &mut Criterion) {
    let seed = CalendarDate::parse("2024-01-01").unwrap();
    let mut group = c.benchmark_group("every_n_days_expansion");
    for days in [30, 365, 3650].iter() {
        group.bench_with_input(BenchmarkId::new("window_days", days), days, |b, &days| {
            b.iter(|| expand(black_box(&Pattern::EveryNDays(3)), black_box(window(days)), black_box(Some(seed))).unwrap())
        });
    }
    group.finish();
}

fn bench_nth_weekday_of_month(c: &mut Criterion) {
    let pattern = Pattern::NthWeekdayOfMonth {
        n: 3,
        weekday: autoplan_core::time::Weekday::Friday,
    };
    c.bench_function("nth_weekday_of_month_10_years", |b| {
        b.iter(|| expand(black_box(&pattern), black_box(window(3650)), black_box(None)).unwrap())
    });
}

fn bench_union_and_except(c: &mut Criterion) {
    let union = Pattern::Union(vec![
        Pattern::Weekdays(WeekdayMask::weekdays_mon_fri()),
        Pattern::Monthly(1),
    ]);
    let except = Pattern::Except {
        base: Box::new(union.clone()),
        exclusion: Box::new(Pattern::WeekendsOnly),
    };
    let seed = CalendarDate::parse("2024-01-01").unwrap();

    let mut group = c.benchmark_group("compound_patterns");
    group.bench_function("union_one_year", |b| {
        b.iter(|| expand(black_box(&union), black_box(window(365)), black_box(Some(seed))).unwrap())
    });
    group.bench_function("except_one_year", |b| {
        b.iter(|| expand(black_box(&except), black_box(window(365)), black_box(Some(seed))).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_every_n_days,
    bench_nth_weekday_of_month,
    bench_union_and_except
);
criterion_main!(benches);
