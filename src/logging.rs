use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the global logger exactly once. Safe to call repeatedly from
/// every test and example, the same way `small-db`'s `init_log` is called
/// from `Once::call_once` at the top of every test.
pub fn init() {
    INIT.call_once(|| {
        env_logger::Builder::from_default_env()
            .format_timestamp_micros()
            .init();
    });
}
