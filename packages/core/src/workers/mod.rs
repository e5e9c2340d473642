//! Background Workers
//!
//! Long-lived periodic tasks built on the [`SleepyWorker`] primitive:
//! today only the federated issuer key refresher. Workers survive transient
//! failures and are shut down cooperatively via `finish(timeout)`.

mod refresher;
mod sleepy;

pub use refresher::KeyRefresher;
pub use sleepy::SleepyWorker;
