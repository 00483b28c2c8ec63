// src/main.rs

//! `keepalive-demo`: walks a thread-pool executor through an orderly shutdown
//! while worker threads still hold keep-alives, and shows a weak reference
//! going quiet afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use log::info;

use keepalive_executor::{Executor, ThreadPoolExecutor, CONFIG};

const HOLDERS: usize = 3;
const HOLD_TIME: Duration = Duration::from_millis(10);

fn main() -> anyhow::Result<()> {
    // Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Pool config: {:?}", CONFIG.pool);
    let mut executor =
        ThreadPoolExecutor::from_config("demo").context("Failed to start thread pool executor")?;
    let weak = executor.weak_ref();
    let ran = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(Mutex::new(Vec::new()));

    let holders: Vec<_> = (0..HOLDERS)
        .map(|id| {
            let ka = executor.keep_alive();
            let ran = ran.clone();
            let released = released.clone();
            thread::spawn(move || {
                let r = ran.clone();
                ka.add(Box::new(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                }));
                thread::sleep(HOLD_TIME);
                released
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(id);
                info!("holder {id} releasing");
                drop(ka);
            })
        })
        .collect();

    info!(
        "Joining with {} keep-alives outstanding",
        executor.keep_alive_count() - 1
    );
    executor.join();
    info!(
        "Executor {} ({}); holders released: {:?}",
        executor.name(),
        executor.state(),
        released
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    );

    for holder in holders {
        holder
            .join()
            .map_err(|_| anyhow::anyhow!("holder thread panicked"))?;
    }

    let r = ran.clone();
    weak.add(Box::new(move || {
        r.fetch_add(1, Ordering::SeqCst);
    }));
    info!(
        "Tasks run: {} (weak reference add after shutdown was dropped)",
        ran.load(Ordering::SeqCst)
    );

    Ok(())
}
