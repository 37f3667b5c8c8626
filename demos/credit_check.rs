//! Credit check example - composing slow services with promises

use pledge::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct User {
    id: u64,
    credit_rating: f64,
    money: f64,
}

fn user_details(id: u64) -> Promise<User> {
    submit(move || {
        tracing::info!(id, "fetching user details");
        thread::sleep(Duration::from_millis(300));
        Ok(User {
            id,
            credit_rating: 100.0,
            money: 10000.00,
        })
    })
}

fn credit_rating(user: &User) -> Promise<f64> {
    let rating = user.credit_rating;
    submit(move || {
        tracing::info!("fetching credit rating");
        thread::sleep(Duration::from_millis(300));
        Ok(rating)
    })
}

fn interest_rate() -> Promise<f64> {
    submit(|| {
        tracing::info!("fetching interest rate");
        thread::sleep(Duration::from_millis(300));
        Ok(13.0)
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Credit Check Example ===\n");

    // Sequential: the rating lookup needs the user first
    let start = Instant::now();
    let rating = user_details(1).flat_map(|user| credit_rating(&user)).wait()?;
    println!("Credit rating: {} ({:?})", rating, start.elapsed());

    // Independent: both lookups run at the same time
    let start = Instant::now();
    let interest = user_details(1)
        .combine(&interest_rate(), |user, rate| user.money * rate)
        .wait()?;
    println!("Yearly interest: {} ({:?})", interest, start.elapsed());

    // Fan-in over several users
    let users: Vec<Promise<User>> = (1..6).map(user_details).collect();
    let total: f64 = collect_all(&users)
        .map(|users| users.iter().map(|u| u.money).sum())
        .wait()?;
    println!("Total money of {} users: {}", users.len(), total);

    // Custom pool for the formatting step
    let pool = Arc::new(ThreadPool::with_threads(2)?);
    let summary = user_details(42)
        .map_on(&pool, |user| format!("user #{} holds {:.2}", user.id, user.money))
        .wait_timeout(Duration::from_secs(5))?;
    println!("{}", summary);

    // Recovering from a failed lookup
    let fallback = submit(|| -> Result<f64> { Err(Error::msg("rating service unavailable")) })
        .recover(|err| {
            tracing::warn!(error = %err, "using default rating");
            Ok(0.0)
        })
        .wait()?;
    println!("Rating with fallback: {}", fallback);

    pledge::shutdown_global();
    Ok(())
}
