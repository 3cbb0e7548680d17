//! Ready queues: 16 FIFO lists of [`Pid`], linked through each PCB's
//! `next_in_queue` field rather than a separate boxed list -- the process
//! table already owns the storage, so the queue itself only needs to
//! remember each priority level's head and tail.

use spin::Mutex;

use crate::process;
use crate::process::pcb::{Pid, PRIORITY_LEVELS};

struct ReadyQueue {
    head: Option<Pid>,
    tail: Option<Pid>,
}

impl ReadyQueue {
    const fn empty() -> Self {
        Self { head: None, tail: None }
    }
}

static QUEUES: Mutex<[ReadyQueue; PRIORITY_LEVELS as usize]> =
    Mutex::new([const { ReadyQueue::empty() }; PRIORITY_LEVELS as usize]);

/// Append `pid` to the tail of `priority`'s ready queue.
pub(super) fn push_back(pid: Pid, priority: u8) {
    process::with_pcb(pid, |p| p.next_in_queue = None);

    let mut queues = QUEUES.lock();
    let q = &mut queues[priority as usize % PRIORITY_LEVELS as usize];
    match q.tail {
        Some(old_tail) => {
            process::with_pcb(old_tail, |p| p.next_in_queue = Some(pid));
        }
        None => q.head = Some(pid),
    }
    q.tail = Some(pid);
}

/// Pop the head of the highest-priority (lowest-numbered) non-empty queue.
pub(super) fn pop_front() -> Option<Pid> {
    let mut queues = QUEUES.lock();
    for q in queues.iter_mut() {
        if let Some(pid) = q.head {
            let next = process::with_pcb(pid, |p| p.next_in_queue).flatten();
            q.head = next;
            if next.is_none() {
                q.tail = None;
            }
            return Some(pid);
        }
    }
    None
}

/// Unlink `pid` from `priority`'s ready queue, wherever in the chain it
/// sits. A no-op if `pid` is not actually linked into that queue (already
/// popped, or never enqueued at this priority).
pub(super) fn remove(pid: Pid, priority: u8) {
    let mut queues = QUEUES.lock();
    let q = &mut queues[priority as usize % PRIORITY_LEVELS as usize];

    if q.head != Some(pid) {
        // Walk from the head looking for the node whose `next_in_queue`
        // points at `pid`, so it can be spliced out.
        let mut prev = q.head;
        while let Some(prev_pid) = prev {
            let next = process::with_pcb(prev_pid, |p| p.next_in_queue).flatten();
            if next == Some(pid) {
                let after = process::with_pcb(pid, |p| p.next_in_queue).flatten();
                process::with_pcb(prev_pid, |p| p.next_in_queue = after);
                if q.tail == Some(pid) {
                    q.tail = Some(prev_pid);
                }
                return;
            }
            prev = next;
        }
        return;
    }

    let next = process::with_pcb(pid, |p| p.next_in_queue).flatten();
    q.head = next;
    if next.is_none() {
        q.tail = None;
    }
}

// A full push/pop round trip needs a live process table (each entry's
// `next_in_queue` link lives on its PCB, not in `QUEUES` itself), so FIFO
// ordering is exercised by `scheduler`'s tests instead, which bootstrap one.
