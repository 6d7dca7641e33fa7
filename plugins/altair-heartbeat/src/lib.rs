//! Sample synchronous plugin: prints a heartbeat every few host frames.

use std::sync::atomic::{AtomicU64, Ordering};

use altair_core::plugin::{Capabilities, PluginHost};

const BEAT_EVERY: u64 = 60;

/// Frames seen so far
#[unsafe(export_name = "heartbeat_frames")]
pub static FRAMES: AtomicU64 = AtomicU64::new(0);

/// Most recent frame number; `u64::MAX` before the first update
#[unsafe(export_name = "heartbeat_last_frame")]
pub static LAST_FRAME: AtomicU64 = AtomicU64::new(u64::MAX);

fn init(host: &PluginHost) -> bool {
    println!("[heartbeat] loaded from {}", host.path().display());
    true
}

fn update(frame: u64) -> u32 {
    let frames = FRAMES.fetch_add(1, Ordering::SeqCst) + 1;
    LAST_FRAME.store(frame, Ordering::SeqCst);
    if frame % BEAT_EVERY == 0 {
        println!("[heartbeat] frame {frame}, {frames} frames seen");
    }
    0
}

fn cleanup() -> bool {
    println!("[heartbeat] stopping after {} frames", FRAMES.load(Ordering::SeqCst));
    true
}

altair_core::declare_plugin! {
    capabilities: Capabilities::OTHER,
    init: init,
    update: update,
    cleanup: cleanup,
}
