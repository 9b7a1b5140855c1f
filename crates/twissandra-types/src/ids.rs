//! Time-ordered tweet identifiers.
//!
//! A [`TweetId`] is both the primary key of a tweet and the ordering key of
//! every feed entry that points at it, so it has to sort by creation time and
//! never repeat. The layout is UUID v7 compatible with the sub-millisecond
//! part of the clock packed into the 12 `rand_a` bits:
//!
//! ```text
//!  127            80 79  76 75       64 63 62 61                 0
//! +----------------+------+-----------+-----+--------------------+
//! | unix millis    | ver  | micros in | var | tie-breaker        |
//! | (48 bits)      | 0111 | ms (12)   | 10  | (62 bits)          |
//! +----------------+------+-----------+-----+--------------------+
//! ```
//!
//! Comparing two ids as big-endian bytes (or as [`Uuid`]s) therefore compares
//! their timestamps first, then their tie-breakers.

use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of tie-breaker bits below the variant field.
const COUNTER_BITS: u32 = 62;

/// Largest tie-breaker value.
const COUNTER_MAX: u64 = (1 << COUNTER_BITS) - 1;

/// Fresh tie-breakers are drawn below this bound so a burst of ids inside one
/// microsecond has room to count upwards.
const COUNTER_SEED_MAX: u64 = 1 << (COUNTER_BITS - 1);

/// Microseconds per millisecond.
const MICROS_PER_MILLI: u64 = 1000;

/// Unique, time-ordered identifier of a tweet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TweetId(pub Uuid);

impl TweetId {
    /// Assemble an id from a microsecond timestamp and a tie-breaker.
    ///
    /// Bits of `counter` above the 62-bit tie-breaker field are discarded.
    pub const fn from_parts(unix_micros: u64, counter: u64) -> Self {
        let millis = (unix_micros / MICROS_PER_MILLI) & 0xFFFF_FFFF_FFFF;
        let sub_milli = unix_micros % MICROS_PER_MILLI;
        let high = (millis << 16) | (0x7 << 12) | sub_milli;
        let low = (0b10 << 62) | (counter & COUNTER_MAX);
        Self(Uuid::from_u64_pair(high, low))
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }

    /// Big-endian byte form; byte order equals id order.
    pub const fn to_bytes(self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    /// Rebuild an id from its big-endian byte form.
    ///
    /// Returns `None` unless `bytes` is exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Self)
    }

    /// Microseconds since the Unix epoch encoded in this id.
    pub const fn unix_micros(self) -> u64 {
        let (high, _) = self.0.as_u64_pair();
        let millis = high >> 16;
        let sub_milli = high & 0xFFF;
        millis
            .saturating_mul(MICROS_PER_MILLI)
            .saturating_add(sub_milli)
    }

    /// Tie-breaker bits of this id.
    pub const fn counter(self) -> u64 {
        self.0.as_u64_pair().1 & COUNTER_MAX
    }

    /// Creation time encoded in this id.
    pub fn timestamp(self) -> DateTime<Utc> {
        let micros = i64::try_from(self.unix_micros()).unwrap_or(i64::MAX);
        DateTime::from_timestamp_micros(micros).unwrap_or_default()
    }
}

impl core::fmt::Display for TweetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TweetId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<TweetId> for Uuid {
    fn from(id: TweetId) -> Self {
        id.0
    }
}

/// Error returned when a string is not a valid tweet id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tweet id {input:?}")]
pub struct TweetIdParseError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for TweetId {
    type Err = TweetIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .ok()
            .filter(|uuid| uuid.get_version_num() == 7)
            .map(Self)
            .ok_or_else(|| TweetIdParseError {
                input: s.to_owned(),
            })
    }
}

/// Generator behind [`TweetIdGenerator::shared`].
static SHARED: TweetIdGenerator = TweetIdGenerator::new();

/// Issues strictly increasing [`TweetId`]s.
///
/// When the clock ticks forward the tie-breaker is reseeded randomly, which
/// keeps ids from separate processes apart. When several ids fall into the
/// same microsecond, or the clock steps backwards, the generator keeps the
/// last timestamp and counts the tie-breaker upwards instead.
#[derive(Debug, Default)]
pub struct TweetIdGenerator {
    last: Mutex<Option<(u64, u64)>>,
}

impl TweetIdGenerator {
    /// Create a generator that has not issued any id yet.
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// The process-wide generator.
    ///
    /// Everything that assigns ids in one process should draw from this
    /// instance, so that ids stay strictly increasing across all of them.
    pub const fn shared() -> &'static Self {
        &SHARED
    }

    /// Issue the next id using the system clock.
    pub fn next_id(&self) -> TweetId {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        self.next_id_at(now)
    }

    /// Issue the next id as if the clock read `unix_micros`.
    pub fn next_id_at(&self, unix_micros: u64) -> TweetId {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let (micros, counter) = match *last {
            Some((prev_micros, prev_counter)) if unix_micros <= prev_micros => {
                if prev_counter < COUNTER_MAX {
                    (prev_micros, prev_counter.saturating_add(1))
                } else {
                    (prev_micros.saturating_add(1), fresh_counter())
                }
            }
            _ => (unix_micros, fresh_counter()),
        };
        *last = Some((micros, counter));
        TweetId::from_parts(micros, counter)
    }
}

fn fresh_counter() -> u64 {
    rand::random::<u64>() % COUNTER_SEED_MAX
}
