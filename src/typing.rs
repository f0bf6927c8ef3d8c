//! Debounces raw keystroke activity into start/stop typing signals.
//!
//! Two states, Idle and Active. The first non-empty input change emits a
//! single `true`; further activity only re-arms the inactivity timer. The
//! timer expiring, the input going empty, or an explicit [`TypingDebouncer::stop`]
//! (message sent) emits a single `false`. Emissions strictly alternate
//! `true, false, true, ...`; the consumer forwards them verbatim to the
//! typing-presence publish path.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug)]
enum Command {
    Input { empty: bool },
    Stop,
}

/// Handle to the debouncer's background task. Dropping it tears the task down.
#[derive(Debug)]
pub struct TypingDebouncer {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl TypingDebouncer {
    /// Spawn the debouncer; typing signals arrive on the returned receiver.
    pub fn spawn(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<bool>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(command_rx, signal_tx, timeout));
        (
            Self {
                commands: command_tx,
                task,
            },
            signal_rx,
        )
    }

    /// Feed the current input text on every change.
    pub fn input_changed(&self, text: &str) {
        let empty = text.trim().is_empty();
        let _ = self.commands.send(Command::Input { empty });
    }

    /// Force Idle immediately, e.g. after a message was sent.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedSender<bool>,
    timeout: Duration,
) {
    let mut active = false;
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(Command::Input { empty: false }) => {
                        if !active {
                            active = true;
                            let _ = signals.send(true);
                        }
                        deadline = Some(Instant::now() + timeout);
                    }
                    Some(Command::Input { empty: true }) | Some(Command::Stop) => {
                        if active {
                            active = false;
                            let _ = signals.send(false);
                        }
                        deadline = None;
                    }
                    None => break,
                }
            }
            _ = async { sleep_until(deadline.expect("guarded by condition")).await },
                if deadline.is_some() =>
            {
                active = false;
                deadline = None;
                let _ = signals.send(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        // Let the debouncer task drain its command queue.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<bool>) -> Vec<bool> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    fn assert_alternating(signals: &[bool]) {
        for (i, pair) in signals.windows(2).enumerate() {
            assert_ne!(pair[0], pair[1], "duplicate emission at position {i}");
        }
        if let Some(first) = signals.first() {
            assert!(*first, "first emission must be `true`");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_input_emits_true_once() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        debouncer.input_changed("h");
        debouncer.input_changed("he");
        debouncer.input_changed("hel");
        settle().await;
        assert_eq!(drain(&mut rx), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expiry_emits_false() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        debouncer.input_changed("hello");
        settle().await;
        assert_eq!(drain(&mut rx), vec![true]);

        tokio::time::advance(Duration::from_millis(3001)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_the_timer() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        debouncer.input_changed("h");
        settle().await;

        // Keep typing just before each expiry; total elapsed exceeds the
        // timeout but no `false` may fire while activity continues.
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(2000)).await;
            settle().await;
            debouncer.input_changed("more");
            settle().await;
        }
        assert_eq!(drain(&mut rx), vec![true]);

        tokio::time::advance(Duration::from_millis(3001)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_emits_false_immediately() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        debouncer.input_changed("hello");
        debouncer.input_changed("");
        settle().await;
        assert_eq!(drain(&mut rx), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn whitespace_only_input_counts_as_empty() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        debouncer.input_changed("   ");
        settle().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_emits_false_once_and_only_when_active() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        debouncer.stop();
        settle().await;
        assert!(drain(&mut rx).is_empty());

        debouncer.input_changed("draft");
        debouncer.stop();
        debouncer.stop();
        settle().await;
        assert_eq!(drain(&mut rx), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_late_false_after_stop_cancels_timer() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        debouncer.input_changed("draft");
        settle().await;
        debouncer.stop();
        settle().await;

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn emissions_strictly_alternate_over_mixed_activity() {
        let (debouncer, mut rx) = TypingDebouncer::spawn(DEFAULT_TYPING_TIMEOUT);
        let mut all = Vec::new();

        // Gaps below, at, and above the threshold, interleaved with clears.
        let script: &[(&str, u64)] = &[
            ("h", 1000),
            ("he", 4000), // expires in between
            ("x", 2999),
            ("xy", 3000), // expires exactly at the deadline
            ("", 0),
            ("z", 500),
        ];
        for (text, gap_ms) in script {
            debouncer.input_changed(text);
            settle().await;
            all.extend(drain(&mut rx));
            tokio::time::advance(Duration::from_millis(*gap_ms)).await;
            settle().await;
            all.extend(drain(&mut rx));
        }
        debouncer.stop();
        settle().await;
        all.extend(drain(&mut rx));

        assert_alternating(&all);
    }
}
