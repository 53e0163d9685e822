//! Swap records and the acceptance strategies that govern them
use chrono::{DateTime, TimeZone, Utc};

/// Lifecycle state of a swap. Only `Available` swaps (or auction swaps still
/// inside their bidding window) admit new targeting edges.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub enum SwapState {
    #[n(0)]
    Available,
    #[n(1)]
    Pending,
    #[n(2)]
    Accepted,
    #[n(3)]
    Cancelled,
    #[n(4)]
    Expired,
}

impl SwapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// How a swap admits incoming proposals: exclusively (one live proposal at a
/// time) or competitively (many live proposals until a deadline).
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub enum AcceptanceStrategy {
    #[n(0)]
    FirstMatch,
    #[n(1)]
    Auction {
        #[n(0)]
        end_date: TimeStamp<Utc>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Swap {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with the "swap" hrp
    #[n(1)]
    pub owner_id: String,
    #[n(2)]
    pub owner_name: String,
    #[n(3)]
    pub summary: String, // booking presentation line, denormalized into views
    #[n(4)]
    pub state: SwapState,
    #[n(5)]
    pub strategy: AcceptanceStrategy,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl Swap {
    pub fn new(
        id: String,
        owner_id: String,
        owner_name: String,
        summary: String,
        strategy: AcceptanceStrategy,
    ) -> Self {
        Self {
            id,
            owner_id,
            owner_name,
            summary,
            state: SwapState::Available,
            strategy,
            created_at: TimeStamp::new(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// ordering delegates to the inner DateTime; a derive would demand
// `Utc: Ord`, which chrono does not provide
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

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
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    /// The auction deadline checks and the targeted-by sort both compare
    /// timestamps directly, so ordering must track the inner DateTime
    #[test]
    fn timestamps_order_chronologically() {
        let earlier = TimeStamp::new_with(2026, 1, 1, 0, 0, 0);
        let later = TimeStamp::new_with(2026, 6, 1, 0, 0, 0);

        assert!(earlier < later);
        assert!(&later >= &earlier);
        assert_eq!(
            earlier.cmp(&earlier.clone()),
            std::cmp::Ordering::Equal
        );

        let mut stamps = vec![later.clone(), earlier.clone()];
        stamps.sort();
        assert_eq!(stamps, vec![earlier, later]);
    }

    #[test]
    fn swap_encoding() {
        let swap = Swap::new(
            crate::utils::new_swap_id(),
            "user_a".into(),
            "Alice".into(),
            "Lisbon flat, wk 32".into(),
            AcceptanceStrategy::FirstMatch,
        );

        let encoded = minicbor::to_vec(&swap).unwrap();
        let decoded: Swap = minicbor::decode(&encoded).unwrap();

        assert_eq!(swap, decoded);
    }
}
