// Two subscribers summing published integers.
//
// cargo run --example basic [count]
// RUST_LOG=hyperfunnel=debug cargo run --example basic 1000

use hyperfunnel::{Dispatcher, PublishError};
use std::env;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let count: i64 = env::args().nth(1).map(|s| s.parse()).transpose()?.unwrap_or(10_000);

    let dispatcher = Dispatcher::<i64>::new(2, 1024)?;
    let sum = Arc::new(AtomicI64::new(0));
    for channel in 0..dispatcher.channel_count() {
        let sum = Arc::clone(&sum);
        dispatcher.subscribe(channel, move |item| {
            sum.fetch_add(item, Ordering::Relaxed);
        })?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })?;

    println!("basic: publishing {} items over {} channels", count, dispatcher.channel_count());
    let start = std::time::Instant::now();
    let mut published = 0;

    'publish: for i in 1..=count {
        let mut item = i;
        loop {
            if !running.load(Ordering::SeqCst) {
                println!("basic: interrupted after {} items", published);
                break 'publish;
            }
            match dispatcher.publish(item) {
                Ok(_) => break,
                Err(PublishError::Backlogged(back)) => {
                    item = back;
                    dispatcher.flush()?;
                }
                Err(PublishError::ShutDown(_)) => break 'publish,
            }
        }
        published += 1;
    }

    dispatcher.shutdown()?;
    let elapsed = start.elapsed();

    let expected: i64 = (1..=published).sum();
    let got = sum.load(Ordering::Relaxed);
    println!("basic: sum = {} (expected {}) in {:.2?}", got, expected, elapsed);
    if got == expected {
        println!("basic: all items processed");
    } else {
        eprintln!("basic: sum mismatch");
        std::process::exit(1);
    }
    Ok(())
}
