//! The per-`Tab` thread: a cooperative event loop running script, layout,
//! and render work off the UI thread, grounded on the original
//! implementation's `background/main_thread.py`. The `Tab` (and its frame
//! tree) is constructed on this thread and never leaves it; only `EventType`
//! values and `CommitData` snapshots cross the channel boundary.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::commit::CommitData;
use crate::services::Services;
use crate::tab::{Tab, TabRef};

const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Mirrors `EventType` in the original implementation: everything the UI
/// thread can ask a tab to do.
pub enum EventType {
    Load { url: String, payload: Option<String> },
    Click { x: f32, y: f32 },
    Keypress { ch: char },
    Backspace,
    ScrollDown,
    ScrollUp,
    ScrollTo { y: f32 },
    Resize { width: f32, height: f32 },
    GoBack,
    Stop,
}

/// A handle the UI thread keeps per tab: an event sender and the spawned
/// thread's join handle.
pub struct MainThreadHandle {
    event_tx: Sender<EventType>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl MainThreadHandle {
    /// Spawns the tab's thread. `initial_url` is posted as the first `Load`
    /// event once the loop is running, matching `Browser.new_tab` posting a
    /// `LOAD` event right after constructing the `MainThread`.
    pub fn spawn(tab_id: u64, services: Arc<Services>, initial_url: String, commit_tx: Sender<CommitData>) -> MainThreadHandle {
        let (event_tx, event_rx) = unbounded();

        let join_handle = thread::Builder::new()
            .name(format!("main-thread-{tab_id}"))
            .spawn(move || {
                let tab = Tab::new(tab_id, services);
                run_loop(&tab, &event_rx, &commit_tx);
            })
            .expect("spawn main thread");

        let handle = MainThreadHandle { event_tx, join_handle: Some(join_handle) };
        handle.post_event(EventType::Load { url: initial_url, payload: None });
        handle
    }

    pub fn post_event(&self, event: EventType) {
        let _ = self.event_tx.send(event);
    }

    pub fn stop(&self) {
        self.post_event(EventType::Stop);
    }
}

impl Drop for MainThreadHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn any_frame_needs_render(tab: &TabRef) -> bool {
    tab.borrow().frames.iter().any(|f| f.borrow().needs_render())
}

fn run_loop(tab: &TabRef, event_rx: &Receiver<EventType>, commit_tx: &Sender<CommitData>) {
    loop {
        match event_rx.recv_timeout(POLL_TIMEOUT) {
            Ok(EventType::Stop) => return,
            Ok(event) => {
                if !handle_event(tab, event, commit_tx) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }

        tab.borrow_mut().tick();
        if any_frame_needs_render(tab) {
            let _ = commit_tx.send(Tab::commit(tab));
        }
    }
}

/// Handles one event, committing per the original's per-event policy
/// (load/click/go-back commit unconditionally; keypress/backspace commit
/// only if they actually marked a frame dirty; scroll commits the new
/// offset without forcing a render). Returns `false` to stop the loop.
fn handle_event(tab: &TabRef, event: EventType, commit_tx: &Sender<CommitData>) -> bool {
    match event {
        EventType::Stop => return false,
        EventType::Load { url, payload } => {
            Tab::load_with_payload(tab, &url, payload, true);
            let _ = commit_tx.send(Tab::commit(tab));
        }
        EventType::Click { x, y } => {
            Tab::click(tab, x, y);
            let _ = commit_tx.send(Tab::commit(tab));
        }
        EventType::Keypress { ch } => {
            tab.borrow_mut().keypress(ch);
            if any_frame_needs_render(tab) {
                let _ = commit_tx.send(Tab::commit(tab));
            }
        }
        EventType::Backspace => {
            tab.borrow_mut().backspace();
            if any_frame_needs_render(tab) {
                let _ = commit_tx.send(Tab::commit(tab));
            }
        }
        EventType::ScrollDown => {
            tab.borrow_mut().scroll_down();
            let _ = commit_tx.send(Tab::commit(tab));
        }
        EventType::ScrollUp => {
            tab.borrow_mut().scroll_up();
            let _ = commit_tx.send(Tab::commit(tab));
        }
        EventType::ScrollTo { y } => {
            tab.borrow_mut().scroll_to(y);
            let _ = commit_tx.send(Tab::commit(tab));
        }
        EventType::Resize { width, height } => {
            Tab::resize(tab, width, height);
        }
        EventType::GoBack => {
            Tab::go_back(tab);
            let _ = commit_tx.send(Tab::commit(tab));
        }
    }
    true
}
