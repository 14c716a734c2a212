use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::land::Command;

/// Fixed-rate tick scheduler (§4.5 "Tick loop", step 4): the next fire time
/// is computed from the scheduled start, not from `now`. A generation token
/// lets `LandKeeper` cancel the whole thread by dropping its mailbox
/// sender — `recv`/`send` failing is the cancellation signal, matching the
/// teacher's pattern of treating a closed channel as "runtime gone"
/// (`server/runtime/sync.rs` `GameHandle::event`'s `if let Err(_) = ...`).
pub fn spawn_tick_loop(mailbox: Sender<Command>, interval: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let start = Instant::now();
        let mut tick_id: i64 = 0;
        loop {
            let scheduled = start + interval * (tick_id as u32 + 1);
            let now = Instant::now();
            if scheduled > now {
                thread::sleep(scheduled - now);
            }

            if mailbox.send(Command::Tick { tick_id }).is_err() {
                break;
            }

            // If we overran by more than one interval, skip the fires we
            // missed instead of queuing a backlog burst.
            let elapsed = Instant::now().saturating_duration_since(start);
            let due = elapsed.as_nanos() / interval.as_nanos().max(1);
            tick_id = (due as i64).max(tick_id + 1);
        }
    })
}

/// Cancellable destroy-when-empty timer (§4.5 step 3 of `leave`, §5
/// "Cancellation and timeouts"). `generation` lets a subsequent `join` or a
/// non-emptying `leave` invalidate an in-flight timer without needing a
/// `JoinHandle::abort` (not available for OS threads).
pub fn spawn_destroy_timer(
    mailbox: Sender<Command>,
    generation: Arc<AtomicU64>,
    this_generation: u64,
    after: Duration,
) {
    thread::spawn(move || {
        thread::sleep(after);
        if generation.load(Ordering::Acquire) != this_generation {
            return;
        }
        let _ = mailbox.send(Command::DestroyTimeout {
            generation: this_generation,
        });
    });
}
