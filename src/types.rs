//! Timestamps and identifiers shared by every persisted record
use std::cmp::Ordering;
use std::fmt;

use bech32::{Bech32m, Hrp};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use uuid7::uuid7;

use crate::error::StoreError;

pub const LOAN_PREFIX: &str = "loan_";
pub const INVESTMENT_PREFIX: &str = "inv_";
pub const DOCUMENT_PREFIX: &str = "doc_";
pub const EMPLOYEE_PREFIX: &str = "emp_";
pub const LENDER_PREFIX: &str = "lender_";
pub const BORROWER_PREFIX: &str = "borrower_";

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    /// `None` when the components do not name a single instant.
    pub fn from_ymd_hms(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// `Utc` is not `Ord`, so these cannot be derived
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

// nanoseconds since the epoch, so ordering survives a round trip through the store
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "timestamp is outside the nanosecond-representable range",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Mint a fresh identifier: a uuid7 encoded as bech32m under the given prefix.
pub fn new_id(prefix: &str) -> Result<String, StoreError> {
    let hrp = Hrp::parse(prefix)?;
    Ok(bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_survives_cbor() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decoded: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = TimeStamp::from_ymd_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let later = TimeStamp::from_ymd_hms(2025, 1, 2, 3, 4, 6).unwrap();

        assert!(earlier < later);
        assert_eq!(earlier.cmp(&earlier.clone()), Ordering::Equal);

        let mut stamps = vec![later.clone(), earlier.clone()];
        stamps.sort();
        assert_eq!(stamps, vec![earlier, later]);
    }

    #[test]
    fn ambiguous_components_yield_none() {
        assert!(TimeStamp::from_ymd_hms(2024, 2, 30, 0, 0, 0).is_none());
        assert!(TimeStamp::from_ymd_hms(2024, 2, 29, 12, 0, 0).is_some());
    }

    #[test]
    fn ids_carry_their_prefix_and_are_unique() {
        let a = new_id(LOAN_PREFIX).unwrap();
        let b = new_id(LOAN_PREFIX).unwrap();

        assert!(a.starts_with("loan_1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(matches!(new_id(""), Err(StoreError::Prefix(_))));
    }
}
