// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    critical = { TimeoutTrack::Critical, 3 },
    moderate = { TimeoutTrack::Moderate, 6 },
    normal = { TimeoutTrack::Normal, 12 },
)]
fn track_timeouts(track: TimeoutTrack, secs: u64) {
    assert_eq!(track.timeout(), Duration::from_secs(secs));
}

#[test]
fn tracks_are_ordered_critical_first() {
    assert_eq!(TimeoutTrack::ALL[0], TimeoutTrack::Critical);
    assert_eq!(TimeoutTrack::ALL.len(), 3);
}

#[test]
fn handle_identity() {
    let a = Handle::new(7);
    let b = Handle::new(7);
    let c = Handle::new(8);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.raw(), 7);
    assert_eq!(a.to_string(), "handle:0x7");
}
