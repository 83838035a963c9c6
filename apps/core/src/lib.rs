pub mod action_executor;
pub mod clipboard;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod model;
pub mod providers;
pub mod ranker;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod session;
pub mod usage;

#[cfg(test)]
mod tests {
    mod query_latency_test {
        include!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../tests/perf/query_latency_test.rs"
        ));
    }
}
