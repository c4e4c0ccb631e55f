//! State shared by every rank of a [`Universe`](super::Universe).
//!
//! One mutex guards the mailboxes and the collective rounds; one condition
//! variable wakes every blocked rank whenever either changes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::config::LocalConfig;
use crate::error::ErrorClass;
use crate::transport::CommHandle;
use crate::{ANY_SOURCE, ANY_TAG};

/// A message that has been sent but not yet received.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub comm: CommHandle,
    pub source: i32,
    pub tag: i32,
    pub payload: Vec<u8>,
}

impl Envelope {
    fn matches(&self, comm: CommHandle, source: i32, tag: i32) -> bool {
        self.comm == comm
            && (source == ANY_SOURCE || self.source == source)
            && (tag == ANY_TAG || self.tag == tag)
    }
}

/// Which collective a contribution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Barrier,
    Bcast,
    Gather,
    Allgather,
    Scatter,
    Alltoall,
    Reduce,
    Allreduce,
}

/// What one rank brings to a collective round.
#[derive(Debug)]
pub(crate) struct Contribution {
    pub kind: Kind,
    pub root: i32,
    pub datatype: i32,
    pub op: i32,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct Round {
    slots: Vec<Option<Contribution>>,
    arrived: usize,
    departed: usize,
    complete: Option<Arc<Vec<Contribution>>>,
}

#[derive(Debug)]
pub(crate) struct State {
    mailboxes: Vec<VecDeque<Envelope>>,
    rounds: HashMap<(CommHandle, u64), Round>,
    aborted: bool,
}

impl State {
    /// Remove the oldest message for `dest` matching `(comm, source, tag)`.
    pub fn take_match(
        &mut self,
        dest: i32,
        comm: CommHandle,
        source: i32,
        tag: i32,
    ) -> Option<Envelope> {
        let mailbox = self.mailboxes.get_mut(dest as usize)?;
        let pos = mailbox.iter().position(|e| e.matches(comm, source, tag))?;
        mailbox.remove(pos)
    }

    /// Look at the oldest message for `dest` matching `(comm, source, tag)`.
    pub fn peek_match(
        &self,
        dest: i32,
        comm: CommHandle,
        source: i32,
        tag: i32,
    ) -> Option<&Envelope> {
        self.mailboxes
            .get(dest as usize)?
            .iter()
            .find(|e| e.matches(comm, source, tag))
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub config: LocalConfig,
    pub epoch: Instant,
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    pub fn new(config: LocalConfig) -> Self {
        let mailboxes = (0..config.size).map(|_| VecDeque::new()).collect();
        Shared {
            config,
            epoch: Instant::now(),
            state: Mutex::new(State {
                mailboxes,
                rounds: HashMap::new(),
                aborted: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn size(&self) -> i32 {
        self.config.size as i32
    }

    /// Run `f` on the state without blocking.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock())
    }

    /// Queue `envelope` in the mailbox of `dest`.
    pub fn deliver(&self, dest: i32, envelope: Envelope) {
        let mut state = self.state.lock();
        if let Some(mailbox) = state.mailboxes.get_mut(dest as usize) {
            mailbox.push_back(envelope);
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Wake every blocked rank and make all current and future waits fail.
    pub fn abort(&self) {
        self.state.lock().aborted = true;
        self.changed.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Block until `poll` yields a value.
    ///
    /// Fails with [`ErrorClass::Other`] when the universe is aborted or the
    /// configured timeout passes first.
    pub fn block_on<T>(
        &self,
        mut poll: impl FnMut(&mut State) -> Option<T>,
    ) -> Result<T, ErrorClass> {
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return Err(ErrorClass::Other);
            }
            if let Some(value) = poll(&mut state) {
                return Ok(value);
            }
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        if let Some(value) = poll(&mut state) {
                            return Ok(value);
                        }
                        tracing::warn!(timeout = ?self.config.timeout, "local wait timed out");
                        return Err(ErrorClass::Other);
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
    }

    /// Deposit `contribution` as `rank`'s part of round `seq` on `comm` and
    /// block until every rank has deposited. Returns all contributions in
    /// rank order.
    pub fn rendezvous(
        &self,
        comm: CommHandle,
        seq: u64,
        rank: i32,
        contribution: Contribution,
    ) -> Result<Arc<Vec<Contribution>>, ErrorClass> {
        let size = self.config.size;
        let key = (comm, seq);
        {
            let mut state = self.state.lock();
            if state.aborted {
                return Err(ErrorClass::Other);
            }
            let round = state.rounds.entry(key).or_insert_with(|| Round {
                slots: (0..size).map(|_| None).collect(),
                arrived: 0,
                departed: 0,
                complete: None,
            });
            round.slots[rank as usize] = Some(contribution);
            round.arrived += 1;
        }
        self.changed.notify_all();

        let result = self.block_on(|state| {
            let round = state.rounds.get_mut(&key)?;
            if round.arrived < size {
                return None;
            }
            if round.complete.is_none() {
                let all = round.slots.iter_mut().filter_map(Option::take).collect();
                round.complete = Some(Arc::new(all));
            }
            let complete = round.complete.clone()?;
            round.departed += 1;
            if round.departed == size {
                state.rounds.remove(&key);
            }
            Some(complete)
        });

        // A rank that gave up is out of step with its peers for every later
        // round, so the whole universe goes down with it.
        if result.is_err() {
            let mut state = self.state.lock();
            state.rounds.remove(&key);
            if !state.aborted {
                tracing::warn!(rank, seq, "collective abandoned; aborting the universe");
                state.aborted = true;
            }
            drop(state);
            self.changed.notify_all();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn envelope(source: i32, tag: i32, byte: u8) -> Envelope {
        Envelope {
            comm: 0,
            source,
            tag,
            payload: vec![byte],
        }
    }

    #[test]
    fn matching_is_fifo_per_source_and_tag() {
        let shared = Shared::new(LocalConfig::new(2));
        shared.deliver(0, envelope(1, 5, 1));
        shared.deliver(0, envelope(1, 6, 2));
        shared.deliver(0, envelope(1, 5, 3));

        shared.with_state(|state| {
            assert_eq!(state.peek_match(0, 0, 1, 6).map(|e| e.payload[0]), Some(2));
            assert_eq!(state.take_match(0, 0, 1, 5).unwrap().payload, vec![1]);
            assert_eq!(state.take_match(0, 0, ANY_SOURCE, ANY_TAG).unwrap().payload, vec![2]);
            assert_eq!(state.take_match(0, 0, 1, 5).unwrap().payload, vec![3]);
            assert!(state.take_match(0, 0, ANY_SOURCE, ANY_TAG).is_none());
            // Other communicators never match
            assert!(state.take_match(1, 7, ANY_SOURCE, ANY_TAG).is_none());
        });
    }

    #[test]
    fn blocked_waits_time_out() {
        let shared = Shared::new(LocalConfig::new(1).with_timeout(Duration::from_millis(20)));
        let result = shared.block_on(|state| state.take_match(0, 0, ANY_SOURCE, ANY_TAG));
        assert_eq!(result.unwrap_err(), ErrorClass::Other);
    }

    #[test]
    fn abort_fails_waits() {
        let shared = Shared::new(LocalConfig::new(1));
        shared.abort();
        assert!(shared.is_aborted());
        let result = shared.block_on(|_| Some(()));
        assert_eq!(result, Err(ErrorClass::Other));
    }

    #[test]
    fn rendezvous_returns_contributions_in_rank_order() {
        let shared = Shared::new(LocalConfig::new(3).with_timeout(Duration::from_secs(10)));
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..3)
                .rev()
                .map(|rank| {
                    let shared = &shared;
                    s.spawn(move || {
                        let contribution = Contribution {
                            kind: Kind::Allgather,
                            root: 0,
                            datatype: 0,
                            op: 0,
                            payload: vec![rank as u8],
                        };
                        shared.rendezvous(0, 0, rank, contribution).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for all in results {
            let payloads: Vec<u8> = all.iter().map(|c| c.payload[0]).collect();
            assert_eq!(payloads, vec![0, 1, 2]);
        }
        shared.with_state(|state| assert!(state.rounds.is_empty()));
    }

    #[test]
    fn abandoned_rounds_are_removed_and_abort_the_universe() {
        let shared = Shared::new(LocalConfig::new(2).with_timeout(Duration::from_millis(20)));
        let contribution = Contribution {
            kind: Kind::Barrier,
            root: 0,
            datatype: 0,
            op: 0,
            payload: Vec::new(),
        };
        assert_eq!(shared.rendezvous(0, 0, 0, contribution).unwrap_err(), ErrorClass::Other);
        assert!(shared.is_aborted());
        shared.with_state(|state| assert!(state.rounds.is_empty()));
    }
}
