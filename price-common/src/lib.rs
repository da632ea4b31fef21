pub mod batch;
pub mod contributors;
pub mod dedup;
pub mod fingerprint;
pub mod geo;
pub mod metrics;
pub mod notify;
pub mod observation;
pub mod report;
pub mod store;
pub mod time;
