use super::stats::pearson;
use crate::reading::{Metric, Reading, ReadingWindow};
use chrono::{NaiveDate, Timelike};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub first: Metric,
    pub second: Metric,
    pub coefficient: Option<f64>,
}

impl Correlation {
    pub fn key(&self) -> String {
        format!("{}_{}", self.first, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Patterns {
    /// Mean per UTC hour of day; hours without readings are absent.
    pub hourly: BTreeMap<Metric, BTreeMap<u32, f64>>,
    /// Mean per UTC calendar date.
    pub daily: BTreeMap<Metric, BTreeMap<NaiveDate, f64>>,
    pub correlations: Vec<Correlation>,
}

pub fn detect_patterns(window: &ReadingWindow) -> Patterns {
    Patterns {
        hourly: group_means(window, |reading| reading.timestamp.hour()),
        daily: group_means(window, |reading| reading.timestamp.date_naive()),
        correlations: correlations(window),
    }
}

fn group_means<K, F>(window: &ReadingWindow, key_of: F) -> BTreeMap<Metric, BTreeMap<K, f64>>
where
    K: Ord + Copy,
    F: Fn(&Reading) -> K,
{
    let mut groups: BTreeMap<K, Vec<&Reading>> = BTreeMap::new();
    for reading in window.readings() {
        groups.entry(key_of(reading)).or_default().push(reading);
    }

    Metric::ALL
        .iter()
        .map(|metric| {
            let means = groups
                .iter()
                .map(|(key, members)| {
                    let mean = Statistics::mean(members.iter().map(|r| r.value(*metric)));
                    (*key, mean)
                })
                .collect();
            (*metric, means)
        })
        .collect()
}

/// One entry per unordered metric pair, in `Metric::ALL` order.
fn correlations(window: &ReadingWindow) -> Vec<Correlation> {
    let series: Vec<Vec<f64>> = Metric::ALL.iter().map(|m| window.values(*m)).collect();
    let mut out = Vec::with_capacity(6);
    for (i, first) in Metric::ALL.iter().enumerate() {
        for (j, second) in Metric::ALL.iter().enumerate().skip(i + 1) {
            out.push(Correlation {
                first: *first,
                second: *second,
                coefficient: pearson(&series[i], &series[j]),
            });
        }
    }
    out
}
