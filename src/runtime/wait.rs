// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Consumer-visible filter state. Exactly one non-trivial transition
/// happens: `NotReady -> Ready` or `NotReady -> TimedOut`; terminal states
/// never change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FilterState {
    NotReady = 0,
    Ready = 1,
    TimedOut = 2,
}

impl FilterState {
    fn from_u8(value: u8) -> FilterState {
        match value {
            1 => FilterState::Ready,
            2 => FilterState::TimedOut,
            _ => FilterState::NotReady,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != FilterState::NotReady
    }
}

/// Execution mode of the consuming fragment: OS-thread blocking waits, or a
/// cooperative scheduler that polls at batch boundaries and wants wakeup
/// callbacks instead of parked threads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExecMode {
    Blocking,
    Cooperative,
}

type Resumer = Box<dyn Fn() + Send + Sync>;

/// Unified wait/signal primitive behind both await flavors.
///
/// The state word is the single source of truth with release on signal and
/// acquire on every read. The blocking flavor sleeps on a condvar; the
/// cooperative flavor runs registered resumer callbacks on the signalling
/// thread and never blocks the caller.
pub struct FilterSignal {
    mode: ExecMode,
    state: AtomicU8,
    lock: Mutex<()>,
    cv: Condvar,
    resumers: Mutex<Vec<Resumer>>,
}

impl FilterSignal {
    pub fn new(mode: ExecMode) -> Self {
        Self {
            mode,
            state: AtomicU8::new(FilterState::NotReady as u8),
            lock: Mutex::new(()),
            cv: Condvar::new(),
            resumers: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn current_state(&self) -> FilterState {
        FilterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.current_state() == FilterState::Ready
    }

    fn transition(&self, target: FilterState) -> bool {
        let moved = self
            .state
            .compare_exchange(
                FilterState::NotReady as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            // Hold the lock so a blocked waiter cannot miss the wakeup
            // between its state check and cv wait.
            let _guard = self.lock.lock().expect("filter signal lock");
            self.cv.notify_all();
            drop(_guard);
            let resumers = {
                let mut guard = self.resumers.lock().expect("filter signal resumers");
                std::mem::take(&mut *guard)
            };
            for resumer in resumers {
                resumer();
            }
        }
        moved
    }

    /// Signal readiness. Returns false (and does nothing) after a terminal
    /// state was reached.
    pub fn signal_ready(&self) -> bool {
        self.transition(FilterState::Ready)
    }

    /// Deadline transition; loses to a concurrent `signal_ready`.
    pub fn signal_timeout(&self) -> bool {
        self.transition(FilterState::TimedOut)
    }

    /// Register a wakeup callback for the cooperative mode. Runs
    /// immediately when the state is already terminal.
    pub fn add_resumer(&self, resumer: Resumer) {
        if self.current_state().is_terminal() {
            resumer();
            return;
        }
        {
            let mut guard = self.resumers.lock().expect("filter signal resumers");
            guard.push(resumer);
        }
        // Re-check: the transition may have drained between our check and
        // the push.
        if self.current_state().is_terminal() {
            let resumers = {
                let mut guard = self.resumers.lock().expect("filter signal resumers");
                std::mem::take(&mut *guard)
            };
            for resumer in resumers {
                resumer();
            }
        }
    }

    /// Block until terminal or until `remaining` elapses, then perform the
    /// timeout transition. Safe to call from any number of threads; calls
    /// after a terminal state return it immediately.
    ///
    /// In cooperative mode this never parks: it only checks state and, if
    /// the budget is already exhausted, transitions to timed-out. The
    /// cooperative scheduler re-polls at batch boundaries and is woken by
    /// resumers.
    pub fn await_terminal(&self, remaining: Duration) -> FilterState {
        let state = self.current_state();
        if state.is_terminal() {
            return state;
        }
        match self.mode {
            ExecMode::Cooperative => {
                if remaining.is_zero() {
                    self.signal_timeout();
                }
                self.current_state()
            }
            ExecMode::Blocking => {
                let deadline = Instant::now() + remaining;
                let mut guard = self.lock.lock().expect("filter signal lock");
                loop {
                    if self.current_state().is_terminal() {
                        return self.current_state();
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        drop(guard);
                        self.signal_timeout();
                        return self.current_state();
                    }
                    let (next, _timeout) = self
                        .cv
                        .wait_timeout(guard, deadline - now)
                        .expect("filter signal lock");
                    guard = next;
                }
            }
        }
    }
}
