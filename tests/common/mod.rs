//! Slow stand-in services used by the promise tests.

#![allow(dead_code)]

use pledge::{submit, Promise};
use std::thread;
use std::time::Duration;

pub const SERVICE_DELAY: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: u64,
    pub credit_rating: f64,
    pub money: f64,
}

pub struct UserService;

impl UserService {
    pub fn user_details(id: u64) -> Promise<User> {
        submit(move || {
            thread::sleep(SERVICE_DELAY);
            Ok(User {
                id,
                credit_rating: 100.0,
                money: 10000.00,
            })
        })
    }
}

pub struct CreditService;

impl CreditService {
    pub fn credit_rating(user: &User) -> Promise<f64> {
        let rating = user.credit_rating;
        submit(move || {
            thread::sleep(SERVICE_DELAY);
            Ok(rating)
        })
    }

    pub fn interest_rate() -> Promise<f64> {
        submit(|| {
            thread::sleep(SERVICE_DELAY);
            Ok(13.0)
        })
    }
}

/// Simulate a job that takes `millis` to finish.
pub fn long_running_job(millis: u64) {
    thread::sleep(Duration::from_millis(millis));
}
