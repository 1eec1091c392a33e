//! TRL news overlay on the price series
//!
//! Each scored news item is pinned to the candle whose `open_time` is
//! closest to the item's date.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::types::{parse_timestamp, PriceCandle, Record, TrlEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedCandle {
    #[serde(flatten)]
    pub candle: PriceCandle,
    pub news: Option<TrlEvent>,
}

impl AnnotatedCandle {
    pub fn trl_scores(&self) -> Option<[Option<f64>; 3]> {
        self.news.as_ref().map(|n| [n.trl_1, n.trl_2, n.trl_3])
    }
}

/// Index of the candle closest in time to `at`; ties keep the earlier one
fn closest(times: &[DateTime<Utc>], at: DateTime<Utc>) -> Option<usize> {
    times
        .iter()
        .enumerate()
        .min_by_key(|(i, t)| ((**t - at).num_milliseconds().abs(), *i))
        .map(|(i, _)| i)
}

/// Attach TRL events to candles.
///
/// Candles without a parseable `open_time` are dropped, as are events
/// without a parseable date. When several events land on one candle the
/// later event in `events` wins.
pub fn attach_trl(candles: &[PriceCandle], events: &[TrlEvent]) -> Vec<AnnotatedCandle> {
    let (times, mut annotated): (Vec<DateTime<Utc>>, Vec<AnnotatedCandle>) = candles
        .iter()
        .filter_map(|c| {
            c.timestamp().map(|t| {
                (
                    t,
                    AnnotatedCandle {
                        candle: c.clone(),
                        news: None,
                    },
                )
            })
        })
        .unzip();

    let mut attached = 0usize;
    for event in events {
        let Some(at) = parse_timestamp(&event.date) else {
            continue;
        };
        if let Some(i) = closest(&times, at) {
            annotated[i].news = Some(event.clone());
            attached += 1;
        }
    }

    debug!(
        candles = annotated.len(),
        events = events.len(),
        attached,
        "TRL overlay built"
    );
    annotated
}
