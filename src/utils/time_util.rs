use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// a wall-clock instant as seconds and nanoseconds since [UNIX_EPOCH]
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct TimeDurationStruct {
    pub sec: u64,
    pub nsec: u32,
}

/// a clock set before the epoch reads as the epoch itself
pub fn now() -> TimeDurationStruct {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    TimeDurationStruct {
        sec: now.as_secs(),
        nsec: now.subsec_nanos(),
    }
}
