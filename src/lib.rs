pub mod canonical;
pub mod collect;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod handlers;
pub mod launch_time;
pub mod model;
pub mod notams;
pub mod outbox;
pub mod reconcile;
pub mod reminders;
pub mod telegram;
pub mod timer;
pub mod watch;
