// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn manual_clock_clones_share_time() {
    let clock = ManualClock::new(1_000);
    let handle = clock.clone();
    handle.advance(250);
    assert_eq!(clock.now_ms(), 1_250);
    clock.set(10);
    assert_eq!(handle.now_ms(), 10);
}

#[test]
fn system_clock_is_after_2020() {
    assert!(SystemClock.now_ms() > 1_577_836_800_000);
}
