pub mod fetch;
pub mod nav;
pub mod search;
pub mod setup;
pub mod ui;
pub mod watch;
