//! Submission queue: an in-memory FIFO of dispatches drained by the
//! submission loop. Pushing and taking never suspend.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::journal::OpCode;

/// Completion payload. `value` carries the result of a get and is empty for
/// set, del and check acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub value: String,
}

/// One submitted operation.
#[derive(Debug)]
pub struct Dispatch {
    pub op: OpCode,
    pub key: String,
    pub value: Option<String>,
    pub ts: u64,
    /// Replayed from the journal during recovery; must not be re-journaled.
    pub replay: bool,
    pub done: Option<oneshot::Sender<Reply>>,
}

impl Dispatch {
    #[must_use]
    pub fn new(op: OpCode, key: String, value: Option<String>, ts: u64) -> Self {
        Self { op, key, value, ts, replay: false, done: None }
    }

    /// A dispatch paired with a receiver for its completion.
    #[must_use]
    pub fn with_ack(
        op: OpCode,
        key: String,
        value: Option<String>,
        ts: u64,
    ) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let mut d = Self::new(op, key, value, ts);
        d.done = Some(tx);
        (d, rx)
    }

    /// A journal replay; carries no completion.
    #[must_use]
    pub fn replay(op: OpCode, key: String, value: Option<String>) -> Self {
        Self { op, key, value, ts: 0, replay: true, done: None }
    }

    /// Fire the completion, if any. A dropped receiver is not an error.
    pub fn complete(&mut self, value: String) {
        if let Some(tx) = self.done.take() {
            let _ = tx.send(Reply { value });
        }
    }
}

/// Cloneable handle to the FIFO.
#[derive(Clone, Default)]
pub struct SubmitQueue {
    inner: Arc<Mutex<VecDeque<Dispatch>>>,
}

impl SubmitQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, dispatch: Dispatch) {
        self.inner.lock().push_back(dispatch);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Pop the next batch. A replay run at the front is taken whole,
    /// regardless of `max`, so recovery is never split across batches and
    /// replayed records are never re-journaled; otherwise up to `max`
    /// non-replay dispatches are taken.
    #[must_use]
    pub fn take_batch(&self, max: usize) -> Vec<Dispatch> {
        let mut q = self.inner.lock();
        let mut out = Vec::new();
        let replay_batch = q.front().is_some_and(|d| d.replay);
        while let Some(d) = q.pop_front() {
            if d.replay != replay_batch || (!replay_batch && out.len() >= max) {
                q.push_front(d);
                break;
            }
            out.push(d);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_never_mix_replay_and_user_ops() {
        let q = SubmitQueue::new();
        q.push(Dispatch::replay(OpCode::Set, "a".into(), Some("1".into())));
        q.push(Dispatch::replay(OpCode::Set, "b".into(), Some("2".into())));
        q.push(Dispatch::new(OpCode::Set, "c".into(), Some("3".into()), 1));
        let replays = q.take_batch(1);
        assert_eq!(replays.len(), 2);
        assert!(replays.iter().all(|d| d.replay));
        let users = q.take_batch(8);
        assert_eq!(users.len(), 1);
        assert!(!users[0].replay);
        assert!(q.is_empty());
    }

    #[test]
    fn take_batch_respects_max_inflight() {
        let q = SubmitQueue::new();
        for i in 0..5 {
            q.push(Dispatch::new(OpCode::Set, format!("k{i}"), Some("v".into()), i));
        }
        assert_eq!(q.take_batch(3).len(), 3);
        assert_eq!(q.take_batch(3).len(), 2);
    }
}
