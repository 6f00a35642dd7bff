//! Target-chain state machine
//!
//! Chain-changed notifications arrive out of order: after a switch request
//! the wallet commonly re-reports the chain it was on before (a stale echo)
//! ahead of the new one. The reconciler decides which notifications may
//! change the committed chain.
//!
//! ```text
//!   Idle --request_switch--> SwitchRequested(T)
//!   SwitchRequested(T) --observe(T)--> Settling(T)
//!   Settling(c) --observe(new)--> Settling(new)      (window restarts)
//!   Settling(c) --observe(last)--> Reconciled(last)  (window cancelled)
//!   Settling(c) --commit(ticket)--> Reconciled(c)
//!   Reconciled(c) --observe(new)--> Settling(new)
//! ```
//!
//! While a target is pending every other chain is discarded. The committed
//! chain only moves on a debounce commit or an explicit `settle_now`.

use std::time::Duration;

use tracing::debug;

use super::debounce::ScheduledTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SwitchRequested { target: u64 },
    Settling { chain: u64 },
    Reconciled { chain: u64 },
}

/// What a notification did to the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No session is being reconciled
    Ignored,
    /// Discarded while a different target is pending
    Stale { chain: u64 },
    /// Same as the settling candidate or the committed chain
    Duplicate { chain: u64 },
    /// Returned to the committed chain, settling window cancelled
    Reverted { chain: u64 },
    /// New candidate; arm the debounce and commit with `ticket`
    Settle { chain: u64, ticket: u64 },
}

#[derive(Debug)]
pub struct ChainReconciler {
    phase: Phase,
    pending_target: Option<u64>,
    prior_chain: Option<u64>,
    last_observed: Option<u64>,
    ticket: u64,
    window: Duration,
    debounce: ScheduledTask,
}

impl ChainReconciler {
    pub fn new(window: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            pending_target: None,
            prior_chain: None,
            last_observed: None,
            ticket: 0,
            window,
            debounce: ScheduledTask::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_target(&self) -> Option<u64> {
        self.pending_target
    }

    /// Last committed chain
    pub fn last_observed(&self) -> Option<u64> {
        self.last_observed
    }

    #[cfg(test)]
    pub(crate) fn is_settling(&self) -> bool {
        self.debounce.is_armed()
    }

    /// Mark `target` as pending before the switch request goes out
    pub fn request_switch(&mut self, target: u64, prior: Option<u64>) {
        self.cancel_window();
        self.pending_target = Some(target);
        self.prior_chain = prior;
        self.phase = Phase::SwitchRequested { target };
        debug!(target, prior = ?prior, "Switch requested");
    }

    /// Drop the pending target after a failed switch
    pub fn abandon_switch(&mut self) {
        if let Some(target) = self.pending_target.take() {
            debug!(target, "Switch abandoned");
        }
        self.prior_chain = None;
        self.phase = match self.last_observed {
            Some(chain) => Phase::Reconciled { chain },
            None => Phase::Idle,
        };
    }

    /// Filter one chain-changed notification
    pub fn observe(&mut self, chain: u64) -> Verdict {
        if self.phase == Phase::Idle {
            return Verdict::Ignored;
        }

        if let Some(target) = self.pending_target {
            if chain != target {
                if self.prior_chain == Some(chain) {
                    debug!(chain, target, "Discarding stale echo of prior chain");
                } else {
                    debug!(chain, target, "Discarding chain while switch is pending");
                }
                return Verdict::Stale { chain };
            }
            self.pending_target = None;
            self.prior_chain = None;
            return self.enter_settling(chain);
        }

        match self.phase {
            Phase::Settling { chain: candidate } if candidate == chain => {
                Verdict::Duplicate { chain }
            }
            // Wallet hopped away and back inside one window: nothing to commit
            Phase::Settling { .. } if self.last_observed == Some(chain) => {
                self.cancel_window();
                self.phase = Phase::Reconciled { chain };
                debug!(chain, "Back on committed chain, settling cancelled");
                Verdict::Reverted { chain }
            }
            _ if self.last_observed == Some(chain) => Verdict::Duplicate { chain },
            _ => self.enter_settling(chain),
        }
    }

    fn enter_settling(&mut self, chain: u64) -> Verdict {
        self.debounce.cancel();
        self.ticket += 1;
        self.phase = Phase::Settling { chain };
        Verdict::Settle {
            chain,
            ticket: self.ticket,
        }
    }

    /// Arm the debounce window. `commit` runs when it expires unless a newer
    /// notification or settle supersedes it.
    pub fn schedule_commit<F>(&mut self, commit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.debounce.schedule(self.window, commit);
    }

    /// Commit the settling candidate if `ticket` is still current
    pub fn commit(&mut self, ticket: u64) -> Option<u64> {
        match self.phase {
            Phase::Settling { chain } if ticket == self.ticket => {
                self.last_observed = Some(chain);
                self.phase = Phase::Reconciled { chain };
                Some(chain)
            }
            _ => None,
        }
    }

    /// Commit `chain` immediately. Returns true if the committed chain moved.
    pub fn settle_now(&mut self, chain: u64) -> bool {
        self.cancel_window();
        self.pending_target = None;
        self.prior_chain = None;
        let changed = self.last_observed != Some(chain);
        self.last_observed = Some(chain);
        self.phase = Phase::Reconciled { chain };
        changed
    }

    /// Back to `Idle`, forgetting everything
    pub fn reset(&mut self) {
        self.cancel_window();
        self.pending_target = None;
        self.prior_chain = None;
        self.last_observed = None;
        self.phase = Phase::Idle;
    }

    fn cancel_window(&mut self) {
        self.debounce.cancel();
        self.ticket += 1;
    }
}
