//! Sample asynchronous plugin: ticks once a second on its own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use altair_core::plugin::{Capabilities, PluginTask};

/// Set while `proc` is running
#[unsafe(export_name = "ticker_running")]
pub static RUNNING: AtomicBool = AtomicBool::new(false);

fn run(task: &PluginTask) -> u32 {
    RUNNING.store(true, Ordering::SeqCst);
    println!("[ticker] running as {:016x}", task.uuid());

    let mut ticks = 0u64;
    while !task.wait_for_exit(Duration::from_secs(1)) {
        ticks += 1;
        println!("[ticker] tick {ticks}");
    }

    println!("[ticker] exiting after {ticks} ticks");
    RUNNING.store(false, Ordering::SeqCst);
    0
}

altair_core::declare_plugin! {
    capabilities: Capabilities::ASYNC,
    proc: run,
}
