// Hash messages with SHA-256 on several channels and check every digest arrives.
//
// cargo run --example fanout [channels] [messages]

use hyperfunnel::{Dispatcher, IdleStrategy, PublishError};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let channels: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(4);
    let messages: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(20_000);

    println!("fanout: precomputing {} digests...", messages);
    let expected: HashSet<String> = (0..messages).map(|i| digest(&message(i))).collect();

    let dispatcher = Dispatcher::<String>::builder()
        .with_channels(channels)
        .with_capacity(256)
        .with_idle(IdleStrategy::Backoff)
        .build()?;

    let digests = Arc::new(Mutex::new(Vec::with_capacity(messages)));
    let per_channel = Arc::new(Mutex::new(vec![0usize; channels]));
    for channel in 0..channels {
        let digests = Arc::clone(&digests);
        let per_channel = Arc::clone(&per_channel);
        dispatcher.subscribe(channel, move |msg: String| {
            let d = digest(&msg);
            digests.lock().push(d);
            per_channel.lock()[channel] += 1;
        })?;
    }

    let start = std::time::Instant::now();
    for i in 0..messages {
        let mut msg = message(i);
        loop {
            match dispatcher.publish(msg) {
                Ok(_) => break,
                Err(PublishError::Backlogged(back)) => {
                    msg = back;
                    dispatcher.flush()?;
                }
                Err(err @ PublishError::ShutDown(_)) => return Err(err.to_string().into()),
            }
        }
    }
    dispatcher.shutdown()?;
    let elapsed = start.elapsed();

    let digests = digests.lock();
    let received: HashSet<String> = digests.iter().cloned().collect();
    println!("fanout: {} digests in {:.2?}, per channel {:?}", digests.len(), elapsed, per_channel.lock());
    if digests.len() == messages && received == expected {
        println!("fanout: all digests received exactly once");
        Ok(())
    } else {
        Err(format!("fanout: {} of {} digests matched", received.intersection(&expected).count(), messages).into())
    }
}

fn message(i: usize) -> String {
    format!("message_{}", i)
}

fn digest(msg: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(msg.as_bytes());
    format!("{:x}", hasher.finalize())
}
