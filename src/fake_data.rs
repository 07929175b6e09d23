//! Fabricated request data.
//!
//! Every tick renders its body from a fresh [`FabricatedRecord`]. The source
//! is a trait so workers can be driven by a deterministic stub in tests.

use chrono::{DateTime, Duration, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use rand::Rng;
use serde::Serialize;

/// Earliest move-in date offset, exclusive.
pub const MOVE_IN_MIN_DAYS: i64 = 1;

/// Latest move-in date offset, exclusive.
pub const MOVE_IN_MAX_DAYS: i64 = 180;

/// One set of synthetic values exposed to body templates as
/// `FirstName`, `LastName`, `Email` and `MoveInDate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FabricatedRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub move_in_date: DateTime<Utc>,
}

/// Supplies a new fabricated record on every call.
///
/// Implementations must be usable from many workers at once.
pub trait FakeDataSource: Send + Sync {
    fn next_record(&self) -> FabricatedRecord;
}

/// Unseeded source backed by the `fake` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakerSource;

impl FakerSource {
    pub fn new() -> Self {
        Self
    }
}

impl FakeDataSource for FakerSource {
    fn next_record(&self) -> FabricatedRecord {
        FabricatedRecord {
            first_name: FirstName().fake(),
            last_name: LastName().fake(),
            email: SafeEmail().fake(),
            move_in_date: move_in_date_from(Utc::now()),
        }
    }
}

/// Picks a date strictly inside `(now + 1 day, now + 180 days)`.
pub fn move_in_date_from(now: DateTime<Utc>) -> DateTime<Utc> {
    let lower_ms = Duration::days(MOVE_IN_MIN_DAYS).num_milliseconds();
    let upper_ms = Duration::days(MOVE_IN_MAX_DAYS).num_milliseconds();
    let offset_ms = rand::thread_rng().gen_range(lower_ms + 1..upper_ms);
    now + Duration::milliseconds(offset_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_in_date_stays_inside_window() {
        for _ in 0..1_000 {
            let now = Utc::now();
            let date = move_in_date_from(now);
            assert!(date > now + Duration::days(MOVE_IN_MIN_DAYS), "{date} too early");
            assert!(date < now + Duration::days(MOVE_IN_MAX_DAYS), "{date} too late");
        }
    }

    #[test]
    fn faker_source_fills_every_field() {
        let source = FakerSource::new();
        let before = Utc::now();
        let record = source.next_record();

        assert!(!record.first_name.is_empty());
        assert!(!record.last_name.is_empty());
        assert!(record.email.contains('@'), "email was {}", record.email);
        assert!(record.move_in_date > before + Duration::days(MOVE_IN_MIN_DAYS));
    }

    #[test]
    fn record_serializes_with_template_field_names() {
        let record = FabricatedRecord {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "john.doe@example.com".to_string(),
            move_in_date: Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 4);
        for key in ["FirstName", "LastName", "Email", "MoveInDate"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn source_is_shareable_across_threads() {
        let source: std::sync::Arc<dyn FakeDataSource> = std::sync::Arc::new(FakerSource);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                std::thread::spawn(move || source.next_record())
            })
            .collect();
        for handle in handles {
            assert!(!handle.join().unwrap().email.is_empty());
        }
    }
}
