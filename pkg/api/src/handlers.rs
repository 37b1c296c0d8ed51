pub mod cluster;
pub mod faults;
pub mod resources;
pub mod runtime;
pub mod watch;
