// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicI64, Ordering};

pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Source of "now" as unix epoch time.
///
/// Entry creation is stamped in microseconds so that writes within the same
/// second still order correctly; expiration works in whole seconds.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> i64;

    fn now(&self) -> i64 {
        self.now_micros().div_euclid(MICROS_PER_SECOND)
    }
}

/// Wall clock that never hands out the same microsecond twice within a
/// process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_micros();
        let mut last = LAST_MICROS.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match LAST_MICROS.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

/// 手动时钟，测试中用来推进时间（以秒为单位）
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            micros: AtomicI64::new(start * MICROS_PER_SECOND),
        }
    }

    pub fn set(&self, now: i64) {
        self.micros.store(now * MICROS_PER_SECOND, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.advance_micros(seconds * MICROS_PER_SECOND);
    }

    pub fn advance_micros(&self, micros: i64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.micros.load(Ordering::SeqCst)
    }
}
