#[allow(unused)] // not every test binary logs
pub fn init_default_logging() {
    cobaltlib::util::log_util::init();
}
